use crossbeam::channel::{bounded, Receiver, Sender};

/// A piece assignment travelling through the shared work queue.
///
/// A `PieceWork` is owned by exactly one worker at a time; it is only
/// mutated outside the queue, and failed attempts re-enqueue it with the
/// retry counter bumped.
#[derive(Debug, Clone, PartialEq)]
pub struct PieceWork {
    pub index: u32,
    pub hash: [u8; 20],
    pub length: u32,
    pub retries: u32,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> Self {
        Self {
            index,
            hash,
            length,
            retries: 0,
        }
    }
}

/// A downloaded and verified piece on its way to a writer.
#[derive(Debug, Clone, PartialEq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

/// The shared piece queue: a bounded multi-producer multi-consumer channel
/// sized to the total piece count, so a re-enqueue can never block.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    pub sender: Sender<PieceWork>,
    pub receiver: Receiver<PieceWork>,
}

impl WorkQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }
}
