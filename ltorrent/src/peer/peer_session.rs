use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{RecvTimeoutError, Sender};
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::config::cfg::Cfg;
use crate::torrent_handler::status::AtomicDownloadStatus;
use crate::torrent_handler::work::{PieceResult, PieceWork, WorkQueue};
use crate::torrent_parser::torrent::Torrent;

use super::bt_peer::BtPeer;
use super::handshake::{FromHandshakeError, Handshake, HANDSHAKE_LEN};
use super::peer_message::{
    Bitfield, Message, MessageError, MessageId, PieceBlock, PieceBlockError, Request,
};

/// Size of one requested block.
pub const BLOCK_SIZE: u32 = 16384;

// How long a worker blocks on the queue before re-checking for shutdown.
const QUEUE_WAIT: Duration = Duration::from_secs(1);

/// A `PeerSession` drives the download side of one peer connection: it
/// connects, handshakes, then consumes piece assignments from the shared
/// queue until the torrent is finished or the peer is given up.
pub struct PeerSession {
    torrent: Arc<Torrent>,
    peer: BtPeer,
    status: Arc<AtomicDownloadStatus>,
    config: Cfg,
    client_peer_id: [u8; 20],
    bitfield: Bitfield,
    choked: bool,
    remote_peer_id: Option<[u8; 20]>,
}

/// Posible `PeerSession` errors.
#[derive(Debug)]
pub enum PeerSessionError {
    CouldNotConnectToPeer(std::io::Error),
    ErrorSettingStreamTimeout,
    ErrorSendingHandshake(std::io::Error),
    ErrorReadingHandshake(std::io::Error),
    InvalidHandshake(FromHandshakeError),
    ExpectedBitfield(MessageId),
    ErrorSendingMessage(std::io::Error),
    ErrorReadingMessage(MessageError),
    InvalidPieceBlock(PieceBlockError),
    PieceHashDoesNotMatch(u32),
    NoPiecesLeftToDownloadInThisPeer,
    TooManyFailures,
}

impl PeerSessionError {
    /// True for errors where the peer broke the protocol and the stream
    /// state can no longer be trusted. Transport failures and bad piece
    /// data stay retryable.
    fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            PeerSessionError::InvalidPieceBlock(_)
                | PeerSessionError::ErrorReadingMessage(MessageError::UnknownId(_))
                | PeerSessionError::ErrorReadingMessage(MessageError::LengthTooLong(_))
        )
    }
}

/// Per-attempt download state: the output buffer plus the request/receive
/// counters. Lives for exactly one attempt and is never shared.
struct PieceProgress {
    index: u32,
    buf: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: u32,
}

impl PieceProgress {
    fn new(index: u32, piece_size: u32) -> Self {
        Self {
            index,
            buf: vec![0; piece_size as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.downloaded as usize >= self.buf.len()
    }
}

impl PeerSession {
    pub fn new(
        peer: BtPeer,
        torrent: Arc<Torrent>,
        status: Arc<AtomicDownloadStatus>,
        config: Cfg,
        client_peer_id: [u8; 20],
    ) -> Self {
        Self {
            torrent,
            peer,
            status,
            config,
            client_peer_id,
            bitfield: Bitfield::new(vec![]),
            choked: true,
            remote_peer_id: None,
        }
    }

    /// The peer id the remote sent in its handshake, once connected.
    pub fn remote_peer_id(&self) -> Option<[u8; 20]> {
        self.remote_peer_id
    }

    /// Connects to the peer and works the shared queue until the download
    /// is done, the queue closes, or the peer stops being useful.
    ///
    /// Piece failures re-enqueue the assignment for other workers. Hash
    /// mismatches and transport errors keep the session alive, bounded by
    /// the worker retry cap; a protocol violation ends it.
    pub fn run(
        &mut self,
        work_queue: WorkQueue,
        results: Sender<PieceResult>,
    ) -> Result<(), PeerSessionError> {
        let mut stream = self.connect()?;

        self.send_message(&mut stream, Message::new(MessageId::Unchoke, vec![]))?;
        self.send_message(&mut stream, Message::new(MessageId::Interested, vec![]))?;

        let mut failures: u32 = 0;
        let mut consecutive_misses: usize = 0;

        loop {
            if self.status.is_done() {
                return Ok(());
            }

            let mut work = match work_queue.receiver.recv_timeout(QUEUE_WAIT) {
                Ok(work) => work,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            };

            if !self.bitfield.has_piece(work.index) {
                work_queue.sender.send(work).ok();
                consecutive_misses += 1;
                // A worker whose peer has nothing we still need would
                // otherwise cycle the queue forever.
                if consecutive_misses > self.status.total_pieces() {
                    return Err(PeerSessionError::NoPiecesLeftToDownloadInThisPeer);
                }
                continue;
            }
            consecutive_misses = 0;

            match self.download_piece(&mut stream, &work) {
                Ok(data) => {
                    // The piece is verified either way; a lost courtesy
                    // `have` is not worth the session.
                    let have = Message::new(MessageId::Have, work.index.to_be_bytes().to_vec());
                    if let Err(err) = self.send_message(&mut stream, have) {
                        warn!(
                            "Peer {}: have for piece {} not sent: {:?}",
                            self.peer, work.index, err
                        );
                    }

                    self.status.piece_completed();
                    info!(
                        "Piece {} verified via {} ({}/{}, {:.1}%)",
                        work.index,
                        self.peer,
                        self.status.completed_pieces(),
                        self.status.total_pieces(),
                        self.status.progress_percent()
                    );
                    results
                        .send(PieceResult {
                            index: work.index,
                            data,
                        })
                        .ok();
                }
                Err(err) => {
                    warn!("Peer {}: piece {} failed: {:?}", self.peer, work.index, err);
                    self.bitfield.clear_piece(work.index);

                    work.retries += 1;
                    if work.retries > self.config.max_piece_retries {
                        self.status.piece_failed();
                    } else {
                        work_queue.sender.send(work).ok();
                    }

                    failures += 1;
                    if failures > self.config.max_worker_retries {
                        return Err(PeerSessionError::TooManyFailures);
                    }
                    // Hash mismatches and transport blips leave the stream
                    // usable, so the worker keeps consuming the queue; a
                    // protocol violation does not.
                    if err.is_protocol_error() {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Opens the TCP connection and runs the session preamble: handshake
    /// exchange, then the mandatory bitfield as the first message. The
    /// session starts choked until the peer says otherwise.
    fn connect(&mut self) -> Result<TcpStream, PeerSessionError> {
        let stream = TcpStream::connect_timeout(
            &self.peer.socket_addr(),
            Duration::from_secs(self.config.connect_seconds_timeout),
        )
        .map_err(PeerSessionError::CouldNotConnectToPeer)?;

        self.set_stream_timeouts(&stream)?;

        let handshake = Handshake::new(self.torrent.info_hash, self.client_peer_id);
        let mut stream = stream;
        stream
            .write_all(&handshake.as_bytes())
            .map_err(PeerSessionError::ErrorSendingHandshake)?;

        let mut response = [0; HANDSHAKE_LEN];
        stream
            .read_exact(&mut response)
            .map_err(PeerSessionError::ErrorReadingHandshake)?;
        let response = Handshake::parse(&response, &self.torrent.info_hash)
            .map_err(PeerSessionError::InvalidHandshake)?;
        self.remote_peer_id = Some(response.peer_id);

        let message = Message::read_from(&mut stream).map_err(PeerSessionError::ErrorReadingMessage)?;
        if message.id != MessageId::Bitfield {
            return Err(PeerSessionError::ExpectedBitfield(message.id));
        }
        self.bitfield = Bitfield::new(message.payload);
        self.choked = true;

        info!("Handshake with {} successful", self.peer);
        Ok(stream)
    }

    /// Downloads one piece with a bounded request backlog: as long as the
    /// peer has us unchoked, up to `pipelining_size` block requests stay in
    /// flight while responses are folded into the buffer.
    fn download_piece(
        &mut self,
        stream: &mut TcpStream,
        work: &PieceWork,
    ) -> Result<Vec<u8>, PeerSessionError> {
        let mut progress = PieceProgress::new(work.index, work.length);

        while !progress.is_complete() {
            if !self.choked {
                while progress.backlog < self.config.pipelining_size
                    && progress.requested < work.length
                {
                    let block_size = BLOCK_SIZE.min(work.length - progress.requested);
                    let request =
                        Request::new(work.index, progress.requested, block_size).into_message();
                    self.send_message(stream, request)?;
                    progress.requested += block_size;
                    progress.backlog += 1;
                }
            }

            let message =
                Message::read_from(stream).map_err(PeerSessionError::ErrorReadingMessage)?;
            self.handle_message(message, &mut progress)?;
        }

        let hash: [u8; 20] = Sha1::digest(&progress.buf).into();
        if hash != work.hash {
            return Err(PeerSessionError::PieceHashDoesNotMatch(work.index));
        }

        Ok(progress.buf)
    }

    /// Folds one received message into the session and attempt state.
    fn handle_message(
        &mut self,
        message: Message,
        progress: &mut PieceProgress,
    ) -> Result<(), PeerSessionError> {
        match message.id {
            MessageId::Unchoke => self.choked = false,
            MessageId::Choke => self.choked = true,
            MessageId::Have => {
                if message.payload.len() == 4 {
                    let mut index = [0; 4];
                    index.copy_from_slice(&message.payload);
                    self.bitfield.set_piece(u32::from_be_bytes(index));
                }
            }
            MessageId::Bitfield => self.bitfield = Bitfield::new(message.payload),
            MessageId::Piece => {
                let block = PieceBlock::parse(&message, progress.index)
                    .map_err(PeerSessionError::InvalidPieceBlock)?;
                let copied = block
                    .copy_into(&mut progress.buf)
                    .map_err(PeerSessionError::InvalidPieceBlock)?;
                progress.downloaded += copied as u32;
                progress.backlog = progress.backlog.saturating_sub(1);
            }
            // Keep-alives and anything a seeder has no business reacting to.
            _ => {}
        }
        Ok(())
    }

    fn send_message(
        &self,
        stream: &mut TcpStream,
        message: Message,
    ) -> Result<(), PeerSessionError> {
        stream
            .write_all(&message.as_bytes())
            .map_err(PeerSessionError::ErrorSendingMessage)
    }

    /// Sets read and write timeouts for the stream. The read timeout also
    /// bounds how long a download attempt can sit waiting for one block.
    fn set_stream_timeouts(&self, stream: &TcpStream) -> Result<(), PeerSessionError> {
        stream
            .set_read_timeout(Some(Duration::from_secs(
                self.config.read_write_seconds_timeout,
            )))
            .map_err(|_| PeerSessionError::ErrorSettingStreamTimeout)?;

        stream
            .set_write_timeout(Some(Duration::from_secs(
                self.config.read_write_seconds_timeout,
            )))
            .map_err(|_| PeerSessionError::ErrorSettingStreamTimeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent_parser::info::{FileEntry, Info};
    use std::net::{Ipv4Addr, TcpListener};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    #[test]
    fn test_downloads_single_piece() {
        let data = vec![0x41u8; 4000];
        let torrent = build_test_torrent(vec![data.clone()], 16384);
        let seeder = MockSeeder::spawn(MockSeederConfig {
            info_hash: torrent.info_hash,
            bitfield: vec![0b10000000],
            pieces: vec![data.clone()],
            lie: false,
            choke_first: false,
            stall_indices: vec![],
        });

        let (work_queue, results, status) = build_harness(&torrent);
        work_queue
            .sender
            .send(PieceWork::new(0, torrent.piece_hash(0), 4000))
            .unwrap();

        let worker = spawn_worker(&torrent, seeder.port, &work_queue, &results.0, &status);

        let result = results.1.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.index, 0);
        assert_eq!(result.data, data);
        assert_eq!(status.completed_pieces(), 1);

        status.mark_done();
        worker.join().unwrap().unwrap();
        assert_eq!(seeder.request_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_no_requests_while_choked_then_pipelined_burst() {
        // Six 16 KiB blocks, so a full backlog of five requests fits before
        // the first block comes back.
        let data: Vec<u8> = (0..BLOCK_SIZE as usize * 6).map(|i| i as u8).collect();
        let torrent = build_test_torrent(vec![data.clone()], BLOCK_SIZE as i64 * 6);
        let seeder = MockSeeder::spawn(MockSeederConfig {
            info_hash: torrent.info_hash,
            bitfield: vec![0b10000000],
            pieces: vec![data.clone()],
            lie: false,
            choke_first: true,
            stall_indices: vec![],
        });

        let (work_queue, results, status) = build_harness(&torrent);
        work_queue
            .sender
            .send(PieceWork::new(0, torrent.piece_hash(0), data.len() as u32))
            .unwrap();

        let worker = spawn_worker(&torrent, seeder.port, &work_queue, &results.0, &status);

        let result = results.1.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(result.data, data);

        status.mark_done();
        worker.join().unwrap().unwrap();

        let before_unchoke = seeder.ids_before_unchoke.lock().unwrap().clone();
        assert!(
            !before_unchoke.contains(&6),
            "request sent while choked: {:?}",
            before_unchoke
        );
        assert_eq!(seeder.pipelined_burst.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_hash_mismatch_reenqueues_and_clears_bitfield() {
        let data = vec![0x41u8; 2000];
        let torrent = build_test_torrent(vec![data.clone()], 16384);
        let seeder = MockSeeder::spawn(MockSeederConfig {
            info_hash: torrent.info_hash,
            bitfield: vec![0b10000000],
            pieces: vec![data],
            lie: true,
            choke_first: false,
            stall_indices: vec![],
        });

        let (work_queue, results, status) = build_harness(&torrent);
        work_queue
            .sender
            .send(PieceWork::new(0, torrent.piece_hash(0), 2000))
            .unwrap();

        let worker = spawn_worker(&torrent, seeder.port, &work_queue, &results.0, &status);

        // With its only advertised piece cleared after the mismatch, the
        // worker cycles the queue and gives the peer up.
        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            PeerSessionError::NoPiecesLeftToDownloadInThisPeer
        ));

        let requeued = work_queue.receiver.try_recv().unwrap();
        assert_eq!(requeued.index, 0);
        assert_eq!(requeued.retries, 1);
        assert_eq!(status.completed_pieces(), 0);
        assert_eq!(seeder.request_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_transport_stall_does_not_end_the_session() {
        // The seeder swallows every request for piece 0, so the read
        // deadline turns that attempt into a transport error. The same
        // session must still download piece 1 afterwards.
        let piece_a = vec![0x41u8; 1000];
        let piece_b = vec![0x42u8; 1000];
        let torrent = build_test_torrent(vec![piece_a.clone(), piece_b.clone()], 1000);
        let seeder = MockSeeder::spawn(MockSeederConfig {
            info_hash: torrent.info_hash,
            bitfield: vec![0b11000000],
            pieces: vec![piece_a, piece_b.clone()],
            lie: false,
            choke_first: false,
            stall_indices: vec![0],
        });

        let (work_queue, results, status) = build_harness(&torrent);
        work_queue
            .sender
            .send(PieceWork::new(0, torrent.piece_hash(0), 1000))
            .unwrap();
        work_queue
            .sender
            .send(PieceWork::new(1, torrent.piece_hash(1), 1000))
            .unwrap();

        let mut config = test_config();
        config.read_write_seconds_timeout = 1;
        let worker = spawn_worker_with_config(
            &torrent,
            seeder.port,
            &work_queue,
            &results.0,
            &status,
            config,
        );

        let result = results.1.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(result.index, 1);
        assert_eq!(result.data, piece_b);

        // Piece 0 went back to the queue with its retry bumped; the worker
        // leaves only once nothing its peer advertises is useful.
        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            PeerSessionError::NoPiecesLeftToDownloadInThisPeer
        ));
        let requeued = work_queue.receiver.try_recv().unwrap();
        assert_eq!(requeued.index, 0);
        assert_eq!(requeued.retries, 1);
        assert_eq!(status.completed_pieces(), 1);
    }

    #[test]
    fn test_repeated_transport_errors_hit_the_worker_cap() {
        // Every request is swallowed, so every attempt times out; the
        // session must survive each failure until its own cap trips.
        let pieces: Vec<Vec<u8>> = (0..4).map(|i| vec![i as u8; 500]).collect();
        let torrent = build_test_torrent(pieces.clone(), 500);
        let seeder = MockSeeder::spawn(MockSeederConfig {
            info_hash: torrent.info_hash,
            bitfield: vec![0b11110000],
            pieces,
            lie: false,
            choke_first: false,
            stall_indices: vec![0, 1, 2, 3],
        });

        let (work_queue, results, status) = build_harness(&torrent);
        for index in 0..4u32 {
            work_queue
                .sender
                .send(PieceWork::new(index, torrent.piece_hash(index), 500))
                .unwrap();
        }

        let mut config = test_config();
        config.read_write_seconds_timeout = 1;
        config.max_worker_retries = 3;
        let worker = spawn_worker_with_config(
            &torrent,
            seeder.port,
            &work_queue,
            &results.0,
            &status,
            config,
        );

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, PeerSessionError::TooManyFailures));
        assert_eq!(status.completed_pieces(), 0);
        assert_eq!(status.failed_pieces(), 0);
    }

    #[test]
    fn test_rejects_non_bitfield_first_message() {
        let torrent = build_test_torrent(vec![vec![0x41; 100]], 16384);
        let info_hash = torrent.info_hash;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut hs = [0u8; HANDSHAKE_LEN];
            stream.read_exact(&mut hs).unwrap();
            stream
                .write_all(&Handshake::new(info_hash, *b"-MOCK01-abcdefghijkl").as_bytes())
                .unwrap();
            stream
                .write_all(&Message::new(MessageId::Unchoke, vec![]).as_bytes())
                .unwrap();
        });

        let (work_queue, results, status) = build_harness(&torrent);
        let worker = spawn_worker(&torrent, port, &work_queue, &results.0, &status);

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            PeerSessionError::ExpectedBitfield(MessageId::Unchoke)
        ));
    }

    #[test]
    fn test_rejects_handshake_with_wrong_info_hash() {
        let torrent = build_test_torrent(vec![vec![0x41; 100]], 16384);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut hs = [0u8; HANDSHAKE_LEN];
            stream.read_exact(&mut hs).unwrap();
            stream
                .write_all(&Handshake::new([0xee; 20], *b"-MOCK01-abcdefghijkl").as_bytes())
                .unwrap();
        });

        let (work_queue, results, status) = build_harness(&torrent);
        let worker = spawn_worker(&torrent, port, &work_queue, &results.0, &status);

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            PeerSessionError::InvalidHandshake(FromHandshakeError::InfoHashMismatch)
        ));
    }

    // Auxiliary functions

    fn build_test_torrent(pieces_data: Vec<Vec<u8>>, piece_length: i64) -> Torrent {
        let length: i64 = pieces_data.iter().map(|p| p.len() as i64).sum();
        let mut pieces = Vec::new();
        for data in &pieces_data {
            let hash: [u8; 20] = Sha1::digest(data).into();
            pieces.extend(hash);
        }

        Torrent {
            announce_url: String::from("http://example.com/announce"),
            info: Info {
                name: String::from("example"),
                piece_length,
                pieces,
                length,
                files: vec![FileEntry {
                    path: vec![String::from("example")],
                    length,
                    offset: 0,
                }],
            },
            info_hash: [0xab; 20],
        }
    }

    type ResultChannel = (
        Sender<PieceResult>,
        crossbeam::channel::Receiver<PieceResult>,
    );

    fn build_harness(torrent: &Torrent) -> (WorkQueue, ResultChannel, Arc<AtomicDownloadStatus>) {
        let work_queue = WorkQueue::with_capacity(torrent.total_pieces() as usize);
        let results = crossbeam::channel::unbounded();
        let (status, _settled) = AtomicDownloadStatus::new(torrent.total_pieces());
        (work_queue, results, Arc::new(status))
    }

    fn test_config() -> Cfg {
        let mut config = Cfg::default();
        config.read_write_seconds_timeout = 5;
        config.connect_seconds_timeout = 2;
        config
    }

    fn spawn_worker(
        torrent: &Torrent,
        port: u16,
        work_queue: &WorkQueue,
        results: &Sender<PieceResult>,
        status: &Arc<AtomicDownloadStatus>,
    ) -> thread::JoinHandle<Result<(), PeerSessionError>> {
        spawn_worker_with_config(torrent, port, work_queue, results, status, test_config())
    }

    fn spawn_worker_with_config(
        torrent: &Torrent,
        port: u16,
        work_queue: &WorkQueue,
        results: &Sender<PieceResult>,
        status: &Arc<AtomicDownloadStatus>,
        config: Cfg,
    ) -> thread::JoinHandle<Result<(), PeerSessionError>> {
        let mut session = PeerSession::new(
            BtPeer::new(Ipv4Addr::LOCALHOST, port),
            Arc::new(torrent.clone()),
            status.clone(),
            config,
            *b"-LT0001-abcdefghijkl",
        );
        let work_queue = work_queue.clone();
        let results = results.clone();
        thread::spawn(move || session.run(work_queue, results))
    }

    struct MockSeederConfig {
        info_hash: [u8; 20],
        bitfield: Vec<u8>,
        pieces: Vec<Vec<u8>>,
        lie: bool,
        choke_first: bool,
        /// Requests for these piece indices are read but never answered.
        stall_indices: Vec<u32>,
    }

    struct MockSeeder {
        port: u16,
        request_count: Arc<AtomicUsize>,
        ids_before_unchoke: Arc<Mutex<Vec<u8>>>,
        pipelined_burst: Arc<AtomicUsize>,
    }

    impl MockSeeder {
        fn spawn(config: MockSeederConfig) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let request_count = Arc::new(AtomicUsize::new(0));
            let ids_before_unchoke = Arc::new(Mutex::new(Vec::new()));
            let pipelined_burst = Arc::new(AtomicUsize::new(0));

            let requests = request_count.clone();
            let choked_ids = ids_before_unchoke.clone();
            let burst = pipelined_burst.clone();

            thread::spawn(move || {
                let (mut stream, _) = listener.accept().unwrap();

                let mut hs = [0u8; HANDSHAKE_LEN];
                stream.read_exact(&mut hs).unwrap();
                stream
                    .write_all(
                        &Handshake::new(config.info_hash, *b"-MOCK01-abcdefghijkl").as_bytes(),
                    )
                    .unwrap();

                stream
                    .write_all(
                        &Message::new(MessageId::Bitfield, config.bitfield.clone()).as_bytes(),
                    )
                    .unwrap();

                if config.choke_first {
                    stream
                        .write_all(&Message::new(MessageId::Choke, vec![]).as_bytes())
                        .unwrap();
                    thread::sleep(Duration::from_millis(300));

                    // Anything the client sent while choked must not be a request.
                    stream
                        .set_read_timeout(Some(Duration::from_millis(100)))
                        .unwrap();
                    while let Ok((id, _)) = Self::read_frame(&mut stream) {
                        choked_ids.lock().unwrap().push(id);
                    }

                    stream
                        .write_all(&Message::new(MessageId::Unchoke, vec![]).as_bytes())
                        .unwrap();

                    // Count how many requests pile up before we serve any.
                    stream
                        .set_read_timeout(Some(Duration::from_millis(300)))
                        .unwrap();
                    let mut pending = Vec::new();
                    while let Ok((id, payload)) = Self::read_frame(&mut stream) {
                        if id == 6 {
                            pending.push(payload);
                        }
                    }
                    burst.store(pending.len(), Ordering::Relaxed);

                    for payload in pending {
                        requests.fetch_add(1, Ordering::Relaxed);
                        Self::serve_request(&mut stream, &config, &payload);
                    }
                } else {
                    stream
                        .write_all(&Message::new(MessageId::Unchoke, vec![]).as_bytes())
                        .unwrap();
                }

                stream
                    .set_read_timeout(Some(Duration::from_secs(2)))
                    .unwrap();
                while let Ok((id, payload)) = Self::read_frame(&mut stream) {
                    if id == 6 {
                        requests.fetch_add(1, Ordering::Relaxed);
                        Self::serve_request(&mut stream, &config, &payload);
                    }
                }
            });

            Self {
                port,
                request_count,
                ids_before_unchoke,
                pipelined_burst,
            }
        }

        fn read_frame(stream: &mut TcpStream) -> Result<(u8, Vec<u8>), std::io::Error> {
            let mut length = [0; 4];
            stream.read_exact(&mut length)?;
            let length = u32::from_be_bytes(length) as usize;
            if length == 0 {
                return Ok((0xff, vec![]));
            }
            let mut frame = vec![0; length];
            stream.read_exact(&mut frame)?;
            Ok((frame[0], frame[1..].to_vec()))
        }

        fn serve_request(stream: &mut TcpStream, config: &MockSeederConfig, payload: &[u8]) {
            let mut field = [0; 4];
            field.copy_from_slice(&payload[0..4]);
            let index = u32::from_be_bytes(field) as usize;
            if config.stall_indices.contains(&(index as u32)) {
                return;
            }
            field.copy_from_slice(&payload[4..8]);
            let begin = u32::from_be_bytes(field) as usize;
            field.copy_from_slice(&payload[8..12]);
            let length = u32::from_be_bytes(field) as usize;

            let block = if config.lie {
                vec![0x55; length]
            } else {
                config.pieces[index][begin..begin + length].to_vec()
            };

            let mut piece_payload = Vec::with_capacity(8 + block.len());
            piece_payload.extend((index as u32).to_be_bytes());
            piece_payload.extend((begin as u32).to_be_bytes());
            piece_payload.extend(block);
            stream
                .write_all(&Message::new(MessageId::Piece, piece_payload).as_bytes())
                .unwrap();
        }
    }
}
