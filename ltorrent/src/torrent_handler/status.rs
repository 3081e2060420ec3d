use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::channel::{unbounded, Receiver, Sender};

/// Shared bookkeeping of one download.
///
/// It is `Atomic`, meaning that it can be accessed from multiple threads at
/// the same time: peer workers bump `completed_pieces` when a piece passes
/// verification, writers bump `written_pieces` once it is on disk, and
/// pieces that exhausted their retries land in `failed_pieces`.
///
/// `new()` also returns a `Receiver` carrying the settled count (written
/// plus failed) after every change, so the supervisor can block on it
/// instead of polling.
#[derive(Debug)]
pub struct AtomicDownloadStatus {
    total_pieces: usize,
    completed_pieces: AtomicUsize,
    written_pieces: AtomicUsize,
    failed_pieces: AtomicUsize,
    done: AtomicBool,
    workers_done: AtomicBool,
    settled_sender: Sender<usize>,
}

impl AtomicDownloadStatus {
    pub fn new(total_pieces: u32) -> (Self, Receiver<usize>) {
        let (settled_sender, settled_receiver) = unbounded();
        (
            Self {
                total_pieces: total_pieces as usize,
                completed_pieces: AtomicUsize::new(0),
                written_pieces: AtomicUsize::new(0),
                failed_pieces: AtomicUsize::new(0),
                done: AtomicBool::new(false),
                workers_done: AtomicBool::new(false),
                settled_sender,
            },
            settled_receiver,
        )
    }

    pub fn total_pieces(&self) -> usize {
        self.total_pieces
    }

    /// Records a verified piece and returns the new count.
    pub fn piece_completed(&self) -> usize {
        self.completed_pieces.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records a piece persisted to disk and notifies the supervisor.
    pub fn piece_written(&self) -> usize {
        let written = self.written_pieces.fetch_add(1, Ordering::Relaxed) + 1;
        self.notify_settled();
        written
    }

    /// Records a piece abandoned after its retry cap was exceeded and
    /// notifies the supervisor.
    pub fn piece_failed(&self) {
        self.failed_pieces.fetch_add(1, Ordering::Relaxed);
        self.notify_settled();
    }

    fn notify_settled(&self) {
        // If the value couldn't be sent, the supervisor is already gone.
        self.settled_sender.send(self.settled_pieces()).ok();
    }

    pub fn completed_pieces(&self) -> usize {
        self.completed_pieces.load(Ordering::Relaxed)
    }

    pub fn written_pieces(&self) -> usize {
        self.written_pieces.load(Ordering::Relaxed)
    }

    pub fn failed_pieces(&self) -> usize {
        self.failed_pieces.load(Ordering::Relaxed)
    }

    /// Pieces that reached a final state, written or abandoned.
    pub fn settled_pieces(&self) -> usize {
        self.written_pieces() + self.failed_pieces()
    }

    /// True once every piece is verified and written.
    pub fn is_complete(&self) -> bool {
        self.written_pieces() == self.total_pieces
    }

    /// Signals workers and writers to wind down.
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    /// Set by the coordinator once every peer worker has exited, so writers
    /// know no further results can arrive.
    pub fn mark_workers_done(&self) {
        self.workers_done.store(true, Ordering::Relaxed);
    }

    pub fn workers_done(&self) -> bool {
        self.workers_done.load(Ordering::Relaxed)
    }

    /// Completed share of the download, for progress logging.
    pub fn progress_percent(&self) -> f64 {
        if self.total_pieces == 0 {
            return 100.0;
        }
        self.completed_pieces() as f64 * 100.0 / self.total_pieces as f64
    }
}
