use clap::Parser;
use ltorrent::{
    config::cfg::Cfg, torrent_handler::handler::TorrentHandler,
    torrent_parser::parser::TorrentParser, utils::generate_peer_id,
};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
struct Args {
    /// Path to the .torrent file to download.
    #[arg(short, long)]
    file: String,
    /// Directory the payload is written into (overrides the config file).
    #[arg(short, long)]
    download_dir: Option<String>,
    /// Path to an optional KEY=VALUE config file.
    #[arg(short, long)]
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt::init();

    if run().is_err() {
        process::exit(1);
    }
}

fn run() -> Result<(), ()> {
    let args = Args::parse();

    let torrent = match TorrentParser::parse(&PathBuf::from(args.file.trim())) {
        Ok(torrent) => torrent,
        Err(err) => {
            error!("Could not parse torrent file: {:?}", err);
            return Err(());
        }
    };
    info!(
        "Downloading {} ({} bytes, infohash {})",
        torrent.name(),
        torrent.length(),
        torrent.info_hash_hex()
    );

    let mut config = match &args.config {
        Some(path) => match Cfg::new(path.trim()) {
            Ok(config) => config,
            Err(err) => {
                error!("Could not read config file: {}", err);
                return Err(());
            }
        },
        None => Cfg::default(),
    };
    if let Some(download_dir) = args.download_dir {
        config.download_directory = download_dir;
    }

    let mut handler = TorrentHandler::new(torrent, config, generate_peer_id());
    match handler.handle() {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("Download failed: {:?}", err);
            Err(())
        }
    }
}
