use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{error, info, warn};

use super::status::AtomicDownloadStatus;
use super::work::{PieceResult, PieceWork, WorkQueue};
use crate::config::cfg::Cfg;
use crate::peer::bt_peer::BtPeer;
use crate::peer::peer_session::PeerSession;
use crate::storage_manager::manager::FileStore;
use crate::torrent_parser::torrent::Torrent;
use crate::tracker::tracker_handler::{TrackerHandler, TrackerHandlerError};

const WRITER_TICK: Duration = Duration::from_millis(500);
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);
const SUPERVISOR_TICK: Duration = Duration::from_secs(1);

/// Struct for handling the torrent download.
///
/// It owns the run topology: one worker thread per discovered peer feeding
/// off the shared piece queue, a small pool of writer threads persisting
/// verified pieces, and a supervisor that flags completion once every piece
/// is on disk.
#[derive(Debug)]
pub struct TorrentHandler {
    torrent: Arc<Torrent>,
    config: Cfg,
    client_peer_id: [u8; 20],
}

/// Posible torrent handler errors.
#[derive(Debug)]
pub enum TorrentHandlerError {
    TrackerError(TrackerHandlerError),
    EmptyPeerList,
    StorageError(std::io::Error),
    DownloadIncomplete {
        written: usize,
        failed: usize,
        total: usize,
    },
}

impl TorrentHandler {
    /// Creates a new `TorrentHandler` from a torrent, a config and our peer id.
    pub fn new(torrent: Torrent, config: Cfg, client_peer_id: [u8; 20]) -> Self {
        Self {
            torrent: Arc::new(torrent),
            config,
            client_peer_id,
        }
    }

    /// Starts the torrent download.
    ///
    /// First it asks the tracker for peers, then downloads every piece and
    /// scatters them onto the output files.
    ///
    /// # Errors
    ///
    /// - `TrackerError` if there was a problem announcing or parsing the peer list.
    /// - `EmptyPeerList` if the tracker knows no peers for this torrent.
    /// - `StorageError` if the output files could not be prepared.
    /// - `DownloadIncomplete` if not every piece could be verified and written.
    pub fn handle(&mut self) -> Result<(), TorrentHandlerError> {
        let tracker_handler = TrackerHandler::new(
            self.torrent.clone(),
            self.config.tcp_port,
            self.client_peer_id,
        )
        .map_err(TorrentHandlerError::TrackerError)?;

        let response = tracker_handler
            .get_peers_list()
            .map_err(TorrentHandlerError::TrackerError)?;
        info!("Tracker returned {} peers", response.peers.len());

        if response.peers.is_empty() {
            return Err(TorrentHandlerError::EmptyPeerList);
        }

        self.download_from_peers(&response.peers)
    }

    /// Runs the download against an already known peer list.
    pub fn download_from_peers(&self, peers: &[BtPeer]) -> Result<(), TorrentHandlerError> {
        let file_store = Arc::new(
            FileStore::create(&self.torrent, Path::new(&self.config.download_directory))
                .map_err(TorrentHandlerError::StorageError)?,
        );

        let total_pieces = self.torrent.total_pieces();
        let (status, settled_receiver) = AtomicDownloadStatus::new(total_pieces);
        let status = Arc::new(status);

        // One assignment per piece, in index order. The queue is sized to
        // the piece count so failed work always fits back in.
        let work_queue = WorkQueue::with_capacity(total_pieces as usize);
        for index in 0..total_pieces {
            let work = PieceWork::new(
                index,
                self.torrent.piece_hash(index),
                self.torrent.piece_size(index),
            );
            work_queue.sender.send(work).ok();
        }

        let (result_sender, result_receiver) = unbounded();

        let supervisor = Self::spawn_supervisor(status.clone(), settled_receiver);
        let writers = self.spawn_writers(&file_store, &result_receiver, &result_sender, &status);
        let workers = self.spawn_peer_workers(peers, &work_queue, &result_sender, &status);
        drop(result_sender);

        for worker in workers {
            worker.join().ok();
        }
        status.mark_workers_done();

        for writer in writers {
            writer.join().ok();
        }
        status.mark_done();
        supervisor.join().ok();

        // Files close when the last FileStore handle drops, right here.
        let written = status.written_pieces();
        let failed = status.failed_pieces();
        if written == total_pieces as usize {
            info!(
                "Torrent {} finished: {} pieces written",
                self.torrent.name(),
                written
            );
            Ok(())
        } else {
            Err(TorrentHandlerError::DownloadIncomplete {
                written,
                failed,
                total: total_pieces as usize,
            })
        }
    }

    /// The supervisor blocks on the settled-piece notifications and flips
    /// the done flag once every piece is written or abandoned, which winds
    /// down workers and writers.
    fn spawn_supervisor(
        status: Arc<AtomicDownloadStatus>,
        settled_receiver: Receiver<usize>,
    ) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match settled_receiver.recv_timeout(SUPERVISOR_TICK) {
                Ok(settled) => {
                    if settled >= status.total_pieces() {
                        status.mark_done();
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    // The coordinator wound the run down without completion.
                    if status.is_done() {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        })
    }

    fn spawn_writers(
        &self,
        file_store: &Arc<FileStore>,
        result_receiver: &Receiver<PieceResult>,
        result_sender: &Sender<PieceResult>,
        status: &Arc<AtomicDownloadStatus>,
    ) -> Vec<JoinHandle<()>> {
        let grace = Duration::from_secs(self.config.writer_grace_seconds);
        (0..self.config.writer_count)
            .map(|_| {
                let file_store = file_store.clone();
                let receiver = result_receiver.clone();
                let sender = result_sender.clone();
                let status = status.clone();
                thread::spawn(move || Self::run_writer(file_store, receiver, sender, status, grace))
            })
            .collect()
    }

    /// One writer: pull verified pieces off the result channel and persist
    /// them. A failed write goes back on the channel for another attempt; a
    /// long silence makes the writer give up so lost peers cannot hang the
    /// run forever.
    fn run_writer(
        file_store: Arc<FileStore>,
        receiver: Receiver<PieceResult>,
        sender: Sender<PieceResult>,
        status: Arc<AtomicDownloadStatus>,
        grace: Duration,
    ) {
        let mut idle = Duration::ZERO;
        loop {
            match receiver.recv_timeout(WRITER_TICK) {
                Ok(result) => {
                    idle = Duration::ZERO;
                    match file_store.write_piece(result.index, &result.data) {
                        Ok(()) => {
                            let written = status.piece_written();
                            info!(
                                "Piece {} written ({}/{})",
                                result.index,
                                written,
                                status.total_pieces()
                            );
                        }
                        Err(err) => {
                            warn!("Writing piece {} failed: {}", result.index, err);
                            sender.send(result).ok();
                            thread::sleep(WRITE_RETRY_DELAY);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if status.is_done() || status.workers_done() {
                        return;
                    }
                    idle += WRITER_TICK;
                    if idle >= grace {
                        warn!("No results for {:?}, writer giving up", grace);
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn spawn_peer_workers(
        &self,
        peers: &[BtPeer],
        work_queue: &WorkQueue,
        result_sender: &Sender<PieceResult>,
        status: &Arc<AtomicDownloadStatus>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(peers.len());

        for peer in peers {
            let mut session = PeerSession::new(
                peer.clone(),
                self.torrent.clone(),
                status.clone(),
                self.config.clone(),
                self.client_peer_id,
            );
            let work_queue = work_queue.clone();
            let results = result_sender.clone();
            let peer_name = peer.to_string();

            let builder = thread::Builder::new().name(format!(
                "Torrent: {} / Peer: {}",
                self.torrent.name(),
                peer_name
            ));
            match builder.spawn(move || match session.run(work_queue, results) {
                Ok(_) => (),
                Err(err) => warn!("Peer {} session ended: {:?}", peer_name, err),
            }) {
                Ok(handle) => handles.push(handle),
                Err(err) => error!("Could not spawn peer worker: {}", err),
            }
        }

        handles
    }
}
