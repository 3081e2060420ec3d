use std::io::{self, Read};

// Upper bound on a frame we are willing to read. The largest legitimate
// message is a piece carrying one 16 KiB block; bitfields of real torrents
// stay far below this too.
const MAX_MESSAGE_LENGTH: u32 = 10 * 16384;

/// IDs of the messages defined in the protocol. A zero-length frame carries
/// no id byte at all and is represented as `KeepAlive`.
#[derive(PartialEq, Debug, Clone)]
pub enum MessageId {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
    Port,
}

impl MessageId {
    fn from_byte(byte: u8) -> Result<MessageId, MessageError> {
        match byte {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            9 => Ok(MessageId::Port),
            other => Err(MessageError::UnknownId(other)),
        }
    }

    fn byte(&self) -> Option<u8> {
        match self {
            MessageId::KeepAlive => None,
            MessageId::Choke => Some(0),
            MessageId::Unchoke => Some(1),
            MessageId::Interested => Some(2),
            MessageId::NotInterested => Some(3),
            MessageId::Have => Some(4),
            MessageId::Bitfield => Some(5),
            MessageId::Request => Some(6),
            MessageId::Piece => Some(7),
            MessageId::Cancel => Some(8),
            MessageId::Port => Some(9),
        }
    }
}

/// A framed peer message: message ID plus payload.
#[derive(PartialEq, Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

/// Posible `Message` framing errors.
#[derive(Debug)]
pub enum MessageError {
    UnknownId(u8),
    LengthTooLong(u32),
    IoError(io::Error),
}

impl Message {
    /// Creates a new `Message` from a message ID and a payload.
    pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn keep_alive() -> Self {
        Self::new(MessageId::KeepAlive, vec![])
    }

    /// Converts a `Message` to its wire frame: a 4-byte big-endian length
    /// prefix, the id byte and the payload. Keep-alive is the bare zero
    /// length prefix.
    pub fn as_bytes(&self) -> Vec<u8> {
        let id = match self.id.byte() {
            Some(id) => id,
            None => return vec![0; 4],
        };
        let len = self.payload.len() + 1;
        let mut bytes = Vec::with_capacity(4 + len);
        bytes.extend((len as u32).to_be_bytes());
        bytes.push(id);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Reads exactly one framed message from the stream, blocking until the
    /// whole frame arrives. A zero length prefix yields the keep-alive
    /// message.
    pub fn read_from(stream: &mut dyn Read) -> Result<Message, MessageError> {
        let mut length = [0; 4];
        stream
            .read_exact(&mut length)
            .map_err(MessageError::IoError)?;
        let length = u32::from_be_bytes(length);

        if length == 0 {
            return Ok(Message::keep_alive());
        }
        if length > MAX_MESSAGE_LENGTH {
            return Err(MessageError::LengthTooLong(length));
        }

        let mut frame = vec![0; length as usize];
        stream
            .read_exact(&mut frame)
            .map_err(MessageError::IoError)?;

        Ok(Message {
            id: MessageId::from_byte(frame[0])?,
            payload: frame[1..].to_vec(),
        })
    }
}
