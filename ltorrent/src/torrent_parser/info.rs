use bencoder::bencode::Bencode;

/// Length in bytes of a single SHA-1 piece hash inside `pieces`.
pub const PIECE_HASH_LEN: usize = 20;

/// The info dictionary of a metainfo file.
///
/// `files` always holds at least one entry: single-file torrents synthesize
/// one whose path is the torrent name, multi-file torrents get one entry per
/// file with its path components joined under the torrent name. Offsets are
/// cumulative over the concatenated payload, so they are strictly increasing
/// and cover `[0, length)` without gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub name: String,
    pub piece_length: i64,
    pub pieces: Vec<u8>,
    pub length: i64,
    pub files: Vec<FileEntry>,
}

/// One file of the torrent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path components relative to the download root; the first one is the
    /// torrent name.
    pub path: Vec<String>,
    pub length: i64,
    /// Byte offset of this file inside the concatenated payload.
    pub offset: i64,
}

/// Posible `Info` parsing errors.
#[derive(Debug, PartialEq)]
pub enum FromInfoError {
    NotADict,
    MissingName,
    MissingPieceLength,
    InvalidPieceLength,
    MissingPieces,
    InvalidPieces,
    MissingLength,
    InvalidFiles,
}

impl Info {
    pub fn from(bencode: &Bencode) -> Result<Info, FromInfoError> {
        let mut name = None;
        let mut piece_length = None;
        let mut pieces = None;
        let mut length = None;
        let mut file_list = None;

        let d = match bencode {
            Bencode::BDict(d) => d,
            _ => return Err(FromInfoError::NotADict),
        };

        for (k, v) in d.iter() {
            if k == b"name" {
                name = Some(Info::create_name(v)?);
            } else if k == b"piece length" {
                piece_length = Some(Info::create_piece_length(v)?);
            } else if k == b"pieces" {
                pieces = Some(Info::create_pieces(v)?);
            } else if k == b"length" {
                length = Some(Info::create_length(v)?);
            } else if k == b"files" {
                file_list = Some(v);
            }
        }

        let name = name.ok_or(FromInfoError::MissingName)?;
        let piece_length = piece_length.ok_or(FromInfoError::MissingPieceLength)?;
        let pieces = pieces.ok_or(FromInfoError::MissingPieces)?;

        let files = match (length, file_list) {
            // Single-file: one synthesized entry named after the torrent.
            (Some(length), None) => vec![FileEntry {
                path: vec![name.clone()],
                length,
                offset: 0,
            }],
            (None, Some(file_list)) => Info::create_files(&name, file_list)?,
            _ => return Err(FromInfoError::MissingLength),
        };

        let length = files.iter().map(|f| f.length).sum();

        Ok(Info {
            name,
            piece_length,
            pieces,
            length,
            files,
        })
    }

    fn create_name(bencode: &Bencode) -> Result<String, FromInfoError> {
        let name = match bencode {
            Bencode::BString(s) => s,
            _ => return Err(FromInfoError::MissingName),
        };

        String::from_utf8(name.to_vec()).map_err(|_| FromInfoError::MissingName)
    }

    fn create_piece_length(bencode: &Bencode) -> Result<i64, FromInfoError> {
        let piece_length = match bencode {
            Bencode::BNumber(n) => *n,
            _ => return Err(FromInfoError::MissingPieceLength),
        };
        if piece_length <= 0 {
            return Err(FromInfoError::InvalidPieceLength);
        }
        Ok(piece_length)
    }

    fn create_pieces(bencode: &Bencode) -> Result<Vec<u8>, FromInfoError> {
        let pieces = match bencode {
            Bencode::BString(s) => s.to_vec(),
            _ => return Err(FromInfoError::MissingPieces),
        };
        if pieces.len() % PIECE_HASH_LEN != 0 {
            return Err(FromInfoError::InvalidPieces);
        }
        Ok(pieces)
    }

    fn create_length(bencode: &Bencode) -> Result<i64, FromInfoError> {
        let length = match bencode {
            Bencode::BNumber(n) => *n,
            _ => return Err(FromInfoError::MissingLength),
        };
        if length < 0 {
            return Err(FromInfoError::MissingLength);
        }
        Ok(length)
    }

    fn create_files(name: &str, bencode: &Bencode) -> Result<Vec<FileEntry>, FromInfoError> {
        let list = match bencode {
            Bencode::BList(list) => list,
            _ => return Err(FromInfoError::InvalidFiles),
        };
        if list.is_empty() {
            return Err(FromInfoError::InvalidFiles);
        }

        let mut files = Vec::with_capacity(list.len());
        let mut offset = 0;
        for entry in list {
            let d = match entry {
                Bencode::BDict(d) => d,
                _ => return Err(FromInfoError::InvalidFiles),
            };

            let length = match d.get(&b"length".to_vec()) {
                Some(Bencode::BNumber(n)) if *n >= 0 => *n,
                _ => return Err(FromInfoError::InvalidFiles),
            };

            let components = match d.get(&b"path".to_vec()) {
                Some(Bencode::BList(components)) if !components.is_empty() => components,
                _ => return Err(FromInfoError::InvalidFiles),
            };

            let mut path = vec![name.to_string()];
            for component in components {
                match component {
                    Bencode::BString(s) => path.push(
                        String::from_utf8(s.to_vec()).map_err(|_| FromInfoError::InvalidFiles)?,
                    ),
                    _ => return Err(FromInfoError::InvalidFiles),
                }
            }

            files.push(FileEntry {
                path,
                length,
                offset,
            });
            offset += length;
        }
        Ok(files)
    }
}
