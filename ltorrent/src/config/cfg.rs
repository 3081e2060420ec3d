use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::str::FromStr;

use super::constants;

/// `Cfg` struct containing the client settings.
///
/// - `tcp_port`: port reported to the tracker as our listen port,
/// - `download_directory`: directory where the downloaded files will be stored,
/// - `pipelining_size`: number of block requests kept in flight per piece,
/// - `connect_seconds_timeout`: timeout in seconds for opening a peer connection,
/// - `read_write_seconds_timeout`: timeout in seconds for the read and write operations to a peer,
/// - `writer_count`: number of writer threads persisting finished pieces,
/// - `writer_grace_seconds`: seconds a writer waits without results before giving up,
/// - `max_piece_retries`: attempts a single piece may fail before the download is abandoned,
/// - `max_worker_retries`: failures a single peer worker may cause before it exits,
///
/// Every setting has a default, so the config file is optional and may name
/// only the settings it overrides.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub tcp_port: u16,
    pub download_directory: String,
    pub pipelining_size: u32,
    pub connect_seconds_timeout: u64,
    pub read_write_seconds_timeout: u64,
    pub writer_count: u32,
    pub writer_grace_seconds: u64,
    pub max_piece_retries: u32,
    pub max_worker_retries: u32,
}

impl Default for Cfg {
    fn default() -> Self {
        Self {
            tcp_port: constants::DEFAULT_TCP_PORT,
            download_directory: String::from(constants::DEFAULT_DOWNLOAD_DIRECTORY),
            pipelining_size: constants::DEFAULT_PIPELINING_SIZE,
            connect_seconds_timeout: constants::DEFAULT_CONNECT_SECONDS_TIMEOUT,
            read_write_seconds_timeout: constants::DEFAULT_READ_WRITE_SECONDS_TIMEOUT,
            writer_count: constants::DEFAULT_WRITER_COUNT,
            writer_grace_seconds: constants::DEFAULT_WRITER_GRACE_SECONDS,
            max_piece_retries: constants::DEFAULT_MAX_PIECE_RETRIES,
            max_worker_retries: constants::DEFAULT_MAX_WORKER_RETRIES,
        }
    }
}

impl Cfg {
    /// Builds a Cfg struct from the config file at the given path.
    /// The format of the config file must be: {setting_name}={setting_value} (without brackets).
    /// Settings not named in the file keep their defaults.
    ///
    /// It returns an io::Error if:
    /// - The path to the config file does not exist or could not be open/readed.
    /// - The config file has wrong format.
    /// - A wrong setting name was in the config file.
    /// - A numeric setting is not a valid number in the config file.
    pub fn new(path: &str) -> io::Result<Self> {
        let mut cfg = Self::default();

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let current_line = line?;
            if current_line.trim().is_empty() {
                continue;
            }
            let setting: Vec<&str> = current_line.split('=').collect();

            if setting.len() != 2 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid config input: {}", current_line),
                ));
            }
            cfg = Self::load_setting(cfg, setting[0], setting[1])?;
        }
        Ok(cfg)
    }

    fn load_setting(mut self, name: &str, value: &str) -> io::Result<Self> {
        match name {
            constants::TCP_PORT => {
                self.tcp_port = self.parse_value(value, constants::TCP_PORT)?;
            }
            constants::DOWNLOAD_DIRECTORY => self.download_directory = String::from(value),

            constants::PIPELINING_SIZE => {
                self.pipelining_size = self.parse_value(value, constants::PIPELINING_SIZE)?;
            }

            constants::CONNECT_SECONDS_TIMEOUT => {
                self.connect_seconds_timeout =
                    self.parse_value(value, constants::CONNECT_SECONDS_TIMEOUT)?;
            }

            constants::READ_WRITE_SECONDS_TIMEOUT => {
                self.read_write_seconds_timeout =
                    self.parse_value(value, constants::READ_WRITE_SECONDS_TIMEOUT)?;
            }

            constants::WRITER_COUNT => {
                self.writer_count = self.parse_value(value, constants::WRITER_COUNT)?;
            }

            constants::WRITER_GRACE_SECONDS => {
                self.writer_grace_seconds =
                    self.parse_value(value, constants::WRITER_GRACE_SECONDS)?;
            }

            constants::MAX_PIECE_RETRIES => {
                self.max_piece_retries = self.parse_value(value, constants::MAX_PIECE_RETRIES)?;
            }

            constants::MAX_WORKER_RETRIES => {
                self.max_worker_retries = self.parse_value(value, constants::MAX_WORKER_RETRIES)?;
            }

            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid config setting name: {}", name),
                ))
            }
        }
        Ok(self)
    }

    fn parse_value<F>(&self, value: &str, setting: &str) -> io::Result<F>
    where
        F: FromStr,
    {
        match value.parse::<F>() {
            Err(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Invalid setting: {}, is not a valid type: {}",
                    setting, value
                ),
            )),
            Ok(parsed) => Ok(parsed),
        }
    }
}
