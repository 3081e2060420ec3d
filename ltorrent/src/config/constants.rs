// Setting names accepted in the config file.
pub const TCP_PORT: &str = "TCP_PORT";
pub const DOWNLOAD_DIRECTORY: &str = "DOWNLOAD_DIRECTORY";
pub const PIPELINING_SIZE: &str = "PIPELINING_SIZE";
pub const CONNECT_SECONDS_TIMEOUT: &str = "CONNECT_SECONDS_TIMEOUT";
pub const READ_WRITE_SECONDS_TIMEOUT: &str = "READ_WRITE_SECONDS_TIMEOUT";
pub const WRITER_COUNT: &str = "WRITER_COUNT";
pub const WRITER_GRACE_SECONDS: &str = "WRITER_GRACE_SECONDS";
pub const MAX_PIECE_RETRIES: &str = "MAX_PIECE_RETRIES";
pub const MAX_WORKER_RETRIES: &str = "MAX_WORKER_RETRIES";

// Defaults used when a setting is absent from the config file.
pub const DEFAULT_TCP_PORT: u16 = 6881;
pub const DEFAULT_DOWNLOAD_DIRECTORY: &str = "./downloads";
pub const DEFAULT_PIPELINING_SIZE: u32 = 5;
pub const DEFAULT_CONNECT_SECONDS_TIMEOUT: u64 = 5;
pub const DEFAULT_READ_WRITE_SECONDS_TIMEOUT: u64 = 30;
pub const DEFAULT_WRITER_COUNT: u32 = 3;
pub const DEFAULT_WRITER_GRACE_SECONDS: u64 = 500;
pub const DEFAULT_MAX_PIECE_RETRIES: u32 = 100;
pub const DEFAULT_MAX_WORKER_RETRIES: u32 = 100;
