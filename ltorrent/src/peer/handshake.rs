/// Length of a handshake with the standard protocol string.
pub const HANDSHAKE_LEN: usize = 68;

const PSTR: &str = "BitTorrent protocol";

/// Represents a handshake message.
/// Is the first message sent to start a connection with a peer.
#[derive(Debug, PartialEq)]
pub struct Handshake {
    pub pstr: String,
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

/// Posible `Handshake` parsing errors.
#[derive(Debug, PartialEq)]
pub enum FromHandshakeError {
    InvalidLength(usize),
    InvalidPstr,
    InfoHashMismatch,
}

impl Handshake {
    /// Creates a new `Handshake` message.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            pstr: PSTR.to_string(),
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }

    /// Converts a `Handshake` message to its 68-byte wire form.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.pstr.len() as u8];
        bytes.extend(self.pstr.as_bytes());
        bytes.extend(&self.reserved);
        bytes.extend(&self.info_hash);
        bytes.extend(&self.peer_id);
        bytes
    }

    /// Parses a received handshake and checks it against the torrent we are
    /// downloading. The remote peer id is recorded but not checked.
    ///
    /// It returns an error if:
    /// - The buffer is not exactly 68 bytes.
    /// - The protocol string length is zero or not the BitTorrent one.
    /// - The info hash does not match `expected_info_hash`.
    pub fn parse(
        bytes: &[u8],
        expected_info_hash: &[u8; 20],
    ) -> Result<Handshake, FromHandshakeError> {
        if bytes.len() != HANDSHAKE_LEN {
            return Err(FromHandshakeError::InvalidLength(bytes.len()));
        }

        let pstrlen = bytes[0] as usize;
        if pstrlen == 0 || pstrlen != PSTR.len() || &bytes[1..1 + pstrlen] != PSTR.as_bytes() {
            return Err(FromHandshakeError::InvalidPstr);
        }

        let mut reserved = [0; 8];
        reserved.copy_from_slice(&bytes[20..28]);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&bytes[28..48]);
        let mut peer_id = [0; 20];
        peer_id.copy_from_slice(&bytes[48..68]);

        if &info_hash != expected_info_hash {
            return Err(FromHandshakeError::InfoHashMismatch);
        }

        Ok(Self {
            pstr: PSTR.to_string(),
            reserved,
            info_hash,
            peer_id,
        })
    }
}
