use std::fs::{self, File, OpenOptions};
use std::io::{Error, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::torrent_parser::torrent::Torrent;

trait WriteWithOffset {
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> Result<(), Error>;
}

impl WriteWithOffset for File {
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> Result<(), Error> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }
}

/// The open output files of a torrent.
///
/// `create()` prepares the on-disk layout up front; `write_piece()` scatters
/// a verified piece onto every file range it overlaps. Handles are shared by
/// the writer pool, with a per-file mutex serializing the seek+write pair.
/// Pieces never overlap, so writers cannot race for the same bytes.
#[derive(Debug)]
pub struct FileStore {
    piece_length: u64,
    files: Vec<StoredFile>,
}

#[derive(Debug)]
struct StoredFile {
    offset: u64,
    length: u64,
    handle: Mutex<File>,
}

impl FileStore {
    /// Opens every file of the torrent under `download_dir`, creating parent
    /// directories and extending each file to its declared length so that
    /// positional writes never grow a file out of order.
    pub fn create(torrent: &Torrent, download_dir: &Path) -> Result<FileStore, Error> {
        let mut files = Vec::with_capacity(torrent.info.files.len());

        for entry in &torrent.info.files {
            let mut path = PathBuf::from(download_dir);
            for component in &entry.path {
                path.push(component);
            }

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?;
            file.set_len(entry.length as u64)?;

            files.push(StoredFile {
                offset: entry.offset as u64,
                length: entry.length as u64,
                handle: Mutex::new(file),
            });
        }

        Ok(FileStore {
            piece_length: torrent.piece_length() as u64,
            files,
        })
    }

    /// Writes a verified piece to disk. The piece covers the payload bytes
    /// `[index * piece_length, index * piece_length + piece.len())`; every
    /// overlapping file gets its slice at the matching file offset.
    pub fn write_piece(&self, index: u32, piece: &[u8]) -> Result<(), Error> {
        let piece_start = index as u64 * self.piece_length;
        let piece_end = piece_start + piece.len() as u64;

        for file in &self.files {
            let file_start = file.offset;
            let file_end = file.offset + file.length;

            if file_end <= piece_start || file_start >= piece_end {
                continue;
            }

            let overlap_start = piece_start.max(file_start);
            let overlap_end = piece_end.min(file_end);
            let chunk =
                &piece[(overlap_start - piece_start) as usize..(overlap_end - piece_start) as usize];

            let mut handle = file
                .handle
                .lock()
                .map_err(|_| Error::new(ErrorKind::Other, "poisoned file lock"))?;
            handle.write_all_at(chunk, overlap_start - file_start)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent_parser::info::{FileEntry, Info};

    #[test]
    fn test_create_preallocates_files() {
        let dir = test_dir("test_create_preallocates");
        let torrent = build_two_file_torrent("alpha", 100, 50, 64);

        let _store = FileStore::create(&torrent, &dir).unwrap();

        assert_eq!(fs::metadata(dir.join("alpha/a.bin")).unwrap().len(), 100);
        assert_eq!(fs::metadata(dir.join("alpha/b.bin")).unwrap().len(), 50);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_gather_across_file_boundary() {
        // Files of 100 and 50 bytes with 64-byte pieces: piece 1 covers
        // payload bytes [64, 128), so a.bin gets buf[0..36] at offset 64 and
        // b.bin gets buf[36..64] at offset 0.
        let dir = test_dir("test_write_gather");
        let torrent = build_two_file_torrent("beta", 100, 50, 64);
        let store = FileStore::create(&torrent, &dir).unwrap();

        let piece: Vec<u8> = (0..64u8).collect();
        store.write_piece(1, &piece).unwrap();

        let a = fs::read(dir.join("beta/a.bin")).unwrap();
        let b = fs::read(dir.join("beta/b.bin")).unwrap();
        assert_eq!(&a[64..100], &piece[0..36]);
        assert_eq!(&b[0..28], &piece[36..64]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_every_piece_reassembles_payload() {
        let dir = test_dir("test_write_reassembles");
        let torrent = build_two_file_torrent("gamma", 100, 50, 64);
        let store = FileStore::create(&torrent, &dir).unwrap();

        let payload: Vec<u8> = (0..150u8).collect();
        store.write_piece(0, &payload[0..64]).unwrap();
        store.write_piece(1, &payload[64..128]).unwrap();
        store.write_piece(2, &payload[128..150]).unwrap();

        let a = fs::read(dir.join("gamma/a.bin")).unwrap();
        let b = fs::read(dir.join("gamma/b.bin")).unwrap();
        assert_eq!(a, &payload[0..100]);
        assert_eq!(b, &payload[100..150]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_single_file_layout_has_no_subdirectory() {
        let dir = test_dir("test_single_file_layout");
        let torrent = build_single_file_torrent("single.bin", 40, 20);
        let store = FileStore::create(&torrent, &dir).unwrap();

        store.write_piece(0, &[1; 20]).unwrap();
        store.write_piece(1, &[2; 20]).unwrap();

        let contents = fs::read(dir.join("single.bin")).unwrap();
        assert_eq!(&contents[0..20], &[1; 20]);
        assert_eq!(&contents[20..40], &[2; 20]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_rewrite_same_piece_is_idempotent() {
        let dir = test_dir("test_rewrite_same_piece");
        let torrent = build_single_file_torrent("rewrite.bin", 40, 20);
        let store = FileStore::create(&torrent, &dir).unwrap();

        store.write_piece(0, &[7; 20]).unwrap();
        store.write_piece(0, &[7; 20]).unwrap();

        let contents = fs::read(dir.join("rewrite.bin")).unwrap();
        assert_eq!(&contents[0..20], &[7; 20]);
        fs::remove_dir_all(dir).unwrap();
    }

    // Auxiliary functions

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("ltorrent_storage_tests").join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn build_two_file_torrent(name: &str, len_a: i64, len_b: i64, piece_length: i64) -> Torrent {
        let length = len_a + len_b;
        build_torrent(
            name,
            length,
            piece_length,
            vec![
                FileEntry {
                    path: vec![name.to_string(), "a.bin".to_string()],
                    length: len_a,
                    offset: 0,
                },
                FileEntry {
                    path: vec![name.to_string(), "b.bin".to_string()],
                    length: len_b,
                    offset: len_a,
                },
            ],
        )
    }

    fn build_single_file_torrent(name: &str, length: i64, piece_length: i64) -> Torrent {
        build_torrent(
            name,
            length,
            piece_length,
            vec![FileEntry {
                path: vec![name.to_string()],
                length,
                offset: 0,
            }],
        )
    }

    fn build_torrent(
        name: &str,
        length: i64,
        piece_length: i64,
        files: Vec<FileEntry>,
    ) -> Torrent {
        let total_pieces = (length + piece_length - 1) / piece_length;
        Torrent {
            announce_url: String::from("http://example.com/announce"),
            info: Info {
                name: name.to_string(),
                piece_length,
                pieces: vec![0; (total_pieces * 20) as usize],
                length,
                files,
            },
            info_hash: [0; 20],
        }
    }
}
