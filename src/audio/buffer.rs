//! PCM block buffering between the reader thread and the tick loop
//!
//! `BlockAssembler` cuts an arbitrary sample stream into analysis blocks and
//! `BlockQueue` hands those blocks to the tick loop through a lock-free
//! single-producer single-consumer queue.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One analysis block of mono samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBlock {
    pub samples: Vec<i16>,
    /// Block sequence number
    pub sequence: u64,
}

/// Cuts a sample stream into fixed-size blocks
pub struct BlockAssembler {
    chunk_size: usize,
    pending: Vec<i16>,
    next_sequence: u64,
}

impl BlockAssembler {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pending: Vec::with_capacity(chunk_size * 2),
            next_sequence: 0,
        }
    }

    /// Append samples and return every block that is now complete
    pub fn push_samples(&mut self, samples: &[i16]) -> Vec<PcmBlock> {
        self.pending.extend_from_slice(samples);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let samples: Vec<i16> = self.pending.drain(..self.chunk_size).collect();
            blocks.push(PcmBlock {
                samples,
                sequence: self.next_sequence,
            });
            self.next_sequence += 1;
        }
        blocks
    }

    /// Flush the incomplete tail as a short block, if any.
    ///
    /// The analysis engine zero-pads short blocks.
    pub fn flush(&mut self) -> Option<PcmBlock> {
        if self.pending.is_empty() {
            return None;
        }
        let block = PcmBlock {
            samples: std::mem::take(&mut self.pending),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        Some(block)
    }

    /// Samples waiting for a complete block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Lock-free queue of PCM blocks
pub struct BlockQueue {
    queue: ArrayQueue<PcmBlock>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
    finished: AtomicBool,
}

impl BlockQueue {
    /// Create a new queue with the specified capacity in blocks
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Push a block, handing it back if the queue is full
    pub fn push(&self, block: PcmBlock) -> Result<(), PcmBlock> {
        self.queue.push(block).map_err(|block| {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            block
        })
    }

    /// Pop a block, counting an underrun if none is ready
    pub fn pop(&self) -> Option<PcmBlock> {
        match self.queue.pop() {
            Some(block) => Some(block),
            None => {
                if !self.is_finished() {
                    self.underrun_count.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
        }
    }

    /// Mark the producer as done; no more blocks will arrive
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Producer finished and every block consumed
    pub fn is_drained(&self) -> bool {
        self.is_finished() && self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Times the producer found the queue full
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Times the consumer found the queue empty
    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a block queue
pub type SharedBlockQueue = Arc<BlockQueue>;

/// Create a new shared block queue
pub fn create_shared_queue(capacity: usize) -> SharedBlockQueue {
    Arc::new(BlockQueue::new(capacity))
}
