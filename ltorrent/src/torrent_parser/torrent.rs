use std::fmt::Write;

use sha1::{Digest, Sha1};

use bencoder::bencode::Bencode;

use super::info::{FromInfoError, Info, PIECE_HASH_LEN};

/// A parsed metainfo file.
///
/// The info-hash is the SHA-1 of the bencoded info dictionary, computed by
/// re-encoding the decoded dictionary so unknown keys survive the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub announce_url: String,
    pub info: Info,
    pub info_hash: [u8; 20],
}

/// Posible `Torrent` parsing errors.
#[derive(Debug, PartialEq)]
pub enum FromTorrentError {
    MissingAnnounce,
    MissingInfo,
    FromInfoError(FromInfoError),
    PieceCountMismatch,
    NotADict,
}

impl Torrent {
    pub fn from(bencode: Bencode) -> Result<Torrent, FromTorrentError> {
        let mut announce_url = None;
        let mut info = None;

        let d = match bencode {
            Bencode::BDict(d) => d,
            _ => return Err(FromTorrentError::NotADict),
        };

        for (k, v) in d.iter() {
            if k == b"announce" {
                announce_url = Some(Torrent::create_announce(v)?);
            } else if k == b"info" {
                let parsed = Info::from(v).map_err(FromTorrentError::FromInfoError)?;
                info = Some((parsed, Torrent::create_info_hash(v)));
            }
        }

        let announce_url = announce_url.ok_or(FromTorrentError::MissingAnnounce)?;
        let (info, info_hash) = info.ok_or(FromTorrentError::MissingInfo)?;

        let torrent = Torrent {
            announce_url,
            info,
            info_hash,
        };

        // Number of hashes must equal ceil(length / piece length).
        if torrent.info.pieces.len() / PIECE_HASH_LEN != torrent.total_pieces() as usize {
            return Err(FromTorrentError::PieceCountMismatch);
        }

        Ok(torrent)
    }

    fn create_announce(bencode: &Bencode) -> Result<String, FromTorrentError> {
        let announce_url = match bencode {
            Bencode::BString(s) => s,
            _ => return Err(FromTorrentError::MissingAnnounce),
        };

        String::from_utf8(announce_url.to_vec()).map_err(|_| FromTorrentError::MissingAnnounce)
    }

    fn create_info_hash(info_bencode: &Bencode) -> [u8; 20] {
        Sha1::digest(Bencode::encode(info_bencode)).into()
    }

    /// Returns the name of the torrent.
    pub fn name(&self) -> String {
        self.info.name.clone()
    }

    /// Returns the size of pieces of the torrent.
    pub fn piece_length(&self) -> u32 {
        self.info.piece_length as u32
    }

    /// Returns the length in bytes of the whole payload.
    pub fn length(&self) -> u64 {
        self.info.length as u64
    }

    /// Returns the number of pieces of the torrent.
    pub fn total_pieces(&self) -> u32 {
        ((self.info.length + self.info.piece_length - 1) / self.info.piece_length) as u32
    }

    /// Returns the size of the piece at the given index: the piece length for
    /// every piece but the last, which keeps only the remainder of the payload.
    pub fn piece_size(&self, index: u32) -> u32 {
        if index == self.total_pieces() - 1 {
            (self.info.length - (index as i64) * self.info.piece_length) as u32
        } else {
            self.piece_length()
        }
    }

    /// Returns the expected SHA-1 hash of the piece at the given index.
    pub fn piece_hash(&self, index: u32) -> [u8; 20] {
        let start = index as usize * PIECE_HASH_LEN;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.info.pieces[start..start + PIECE_HASH_LEN]);
        hash
    }

    /// Returns the info hash as a lowercase hex string, for logging.
    pub fn info_hash_hex(&self) -> String {
        let mut hex = String::with_capacity(self.info_hash.len() * 2);
        for b in self.info_hash {
            let _ = write!(&mut hex, "{:02x}", b);
        }
        hex
    }
}
