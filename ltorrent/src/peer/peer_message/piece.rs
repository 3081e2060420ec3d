use super::message::{Message, MessageId};

/// One block of a piece message: the payload is a 4-byte piece index, a
/// 4-byte begin offset, then the block bytes.
#[derive(Debug, PartialEq)]
pub struct PieceBlock<'a> {
    pub begin: u32,
    pub block: &'a [u8],
}

/// Posible piece-body validation errors.
#[derive(Debug, PartialEq)]
pub enum PieceBlockError {
    NotAPieceMessage,
    PayloadTooShort(usize),
    IndexMismatch { expected: u32, got: u32 },
    BeginOutOfBounds { begin: u32, piece_size: usize },
    BlockOverrunsPiece { end: usize, piece_size: usize },
}

impl<'a> PieceBlock<'a> {
    /// Parses a piece message for the piece currently being assembled,
    /// rejecting blocks that name a different index.
    pub fn parse(
        message: &'a Message,
        expected_index: u32,
    ) -> Result<PieceBlock<'a>, PieceBlockError> {
        if message.id != MessageId::Piece {
            return Err(PieceBlockError::NotAPieceMessage);
        }
        if message.payload.len() < 8 {
            return Err(PieceBlockError::PayloadTooShort(message.payload.len()));
        }

        let mut index = [0; 4];
        index.copy_from_slice(&message.payload[0..4]);
        let index = u32::from_be_bytes(index);
        if index != expected_index {
            return Err(PieceBlockError::IndexMismatch {
                expected: expected_index,
                got: index,
            });
        }

        let mut begin = [0; 4];
        begin.copy_from_slice(&message.payload[4..8]);

        Ok(PieceBlock {
            begin: u32::from_be_bytes(begin),
            block: &message.payload[8..],
        })
    }

    /// Copies the block into the piece buffer at its begin offset, after
    /// checking the block lies inside the piece. Returns the number of bytes
    /// copied.
    pub fn copy_into(&self, buf: &mut [u8]) -> Result<usize, PieceBlockError> {
        let begin = self.begin as usize;
        if begin >= buf.len() {
            return Err(PieceBlockError::BeginOutOfBounds {
                begin: self.begin,
                piece_size: buf.len(),
            });
        }
        let end = begin + self.block.len();
        if end > buf.len() {
            return Err(PieceBlockError::BlockOverrunsPiece {
                end,
                piece_size: buf.len(),
            });
        }
        buf[begin..end].copy_from_slice(self.block);
        Ok(self.block.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_copy() {
        let message = build_piece_message(3, 4, vec![0xaa, 0xbb, 0xcc]);
        let mut buf = vec![0; 8];

        let block = PieceBlock::parse(&message, 3).unwrap();
        let copied = block.copy_into(&mut buf).unwrap();

        assert_eq!(copied, 3);
        assert_eq!(buf, vec![0, 0, 0, 0, 0xaa, 0xbb, 0xcc, 0]);
    }

    #[test]
    fn test_parse_rejects_wrong_message_id() {
        let message = Message::new(MessageId::Have, vec![0; 12]);
        assert_eq!(
            PieceBlock::parse(&message, 0).unwrap_err(),
            PieceBlockError::NotAPieceMessage
        );
    }

    #[test]
    fn test_parse_rejects_short_payload() {
        let message = Message::new(MessageId::Piece, vec![0; 7]);
        assert_eq!(
            PieceBlock::parse(&message, 0).unwrap_err(),
            PieceBlockError::PayloadTooShort(7)
        );
    }

    #[test]
    fn test_parse_rejects_index_mismatch() {
        let message = build_piece_message(2, 0, vec![1]);
        assert_eq!(
            PieceBlock::parse(&message, 5).unwrap_err(),
            PieceBlockError::IndexMismatch {
                expected: 5,
                got: 2
            }
        );
    }

    #[test]
    fn test_copy_rejects_begin_at_or_past_piece_size() {
        let message = build_piece_message(0, 8, vec![1]);
        let mut buf = vec![0; 8];

        let block = PieceBlock::parse(&message, 0).unwrap();
        assert_eq!(
            block.copy_into(&mut buf).unwrap_err(),
            PieceBlockError::BeginOutOfBounds {
                begin: 8,
                piece_size: 8
            }
        );
    }

    #[test]
    fn test_copy_rejects_block_overrunning_piece() {
        let message = build_piece_message(0, 6, vec![1, 2, 3]);
        let mut buf = vec![0; 8];

        let block = PieceBlock::parse(&message, 0).unwrap();
        assert_eq!(
            block.copy_into(&mut buf).unwrap_err(),
            PieceBlockError::BlockOverrunsPiece {
                end: 9,
                piece_size: 8
            }
        );
    }

    // Auxiliary functions

    fn build_piece_message(index: u32, begin: u32, block: Vec<u8>) -> Message {
        let mut payload = vec![];
        payload.extend(index.to_be_bytes());
        payload.extend(begin.to_be_bytes());
        payload.extend(block);
        Message::new(MessageId::Piece, payload)
    }
}
