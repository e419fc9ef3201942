//! Raw PCM input
//!
//! Reads interleaved signed 16-bit little-endian PCM from any byte stream,
//! for example `ffmpeg -i song.mp3 -f s16le -ac 2 -ar 44100 - | server`.
//! Decoding compressed formats is left to such external tools.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{BlockAssembler, BlockQueue, PcmBlock, SharedBlockQueue};

/// Bytes requested from the stream per read
const READ_SIZE: usize = 8192;

/// Reads PCM frames and downmixes them to mono
pub struct PcmReader<R: Read> {
    reader: R,
    channels: usize,
    read_buffer: Vec<u8>,
    /// Bytes of an incomplete frame carried over to the next read
    carry: Vec<u8>,
}

impl<R: Read> PcmReader<R> {
    pub fn new(reader: R, channels: u16) -> Self {
        Self {
            reader,
            channels: channels.max(1) as usize,
            read_buffer: vec![0u8; READ_SIZE],
            carry: Vec::new(),
        }
    }

    /// Read the next batch of mono samples; `None` at end of stream
    pub fn read_samples(&mut self) -> io::Result<Option<Vec<i16>>> {
        let frame_bytes = 2 * self.channels;

        loop {
            let n = match self.reader.read(&mut self.read_buffer) {
                Ok(0) => {
                    if !self.carry.is_empty() {
                        tracing::debug!(
                            "Dropping {} bytes of a partial PCM frame",
                            self.carry.len()
                        );
                        self.carry.clear();
                    }
                    return Ok(None);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.carry.extend_from_slice(&self.read_buffer[..n]);
            let whole = self.carry.len() / frame_bytes * frame_bytes;
            if whole == 0 {
                continue;
            }

            let samples = self.carry[..whole]
                .chunks_exact(frame_bytes)
                .map(|frame| self.downmix(frame))
                .collect();
            self.carry.drain(..whole);
            return Ok(Some(samples));
        }
    }

    /// Average the channels of one interleaved frame
    fn downmix(&self, frame: &[u8]) -> i16 {
        let sum: i32 = frame
            .chunks_exact(2)
            .map(|bytes| i16::from_le_bytes([bytes[0], bytes[1]]) as i32)
            .sum();
        (sum / self.channels as i32) as i16
    }
}

/// Push a block, waiting while the queue is full.
///
/// Gives up once `running` is cleared; returns whether the block was queued.
fn push_waiting(queue: &BlockQueue, mut block: PcmBlock, running: &AtomicBool) -> bool {
    loop {
        match queue.push(block) {
            Ok(()) => return true,
            Err(rejected) => {
                if !running.load(Ordering::Relaxed) {
                    tracing::debug!(
                        "Reader stopped, dropping block {} ({} samples)",
                        rejected.sequence,
                        rejected.samples.len()
                    );
                    return false;
                }
                block = rejected;
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Handle to a running reader thread
pub struct PcmSource {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PcmSource {
    /// Start a thread that reads `reader`, cuts `chunk_size` blocks and
    /// pushes them into `queue`, waiting while the queue is full.
    ///
    /// The queue is marked finished at end of stream, on a read error, or
    /// after `stop()`.
    pub fn spawn<R>(
        reader: R,
        channels: u16,
        chunk_size: usize,
        queue: SharedBlockQueue,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = running.clone();

        let handle = thread::Builder::new()
            .name("pcm-reader".into())
            .spawn(move || {
                let mut pcm = PcmReader::new(reader, channels);
                let mut assembler = BlockAssembler::new(chunk_size);

                'read: while running_for_thread.load(Ordering::Relaxed) {
                    let samples = match pcm.read_samples() {
                        Ok(Some(samples)) => samples,
                        Ok(None) => {
                            tracing::info!("End of PCM stream");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("PCM read error: {}", e);
                            break;
                        }
                    };

                    for block in assembler.push_samples(&samples) {
                        if !push_waiting(&queue, block, &running_for_thread) {
                            break 'read;
                        }
                    }
                }

                if let Some(tail) = assembler.flush() {
                    push_waiting(&queue, tail, &running_for_thread);
                }
                queue.finish();
            })?;

        Ok(Self {
            running,
            thread_handle: Some(handle),
        })
    }

    /// Ask the reader thread to stop at its next opportunity.
    ///
    /// A thread blocked inside `read()` only notices once the read returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the reader thread to exit
    pub fn join(mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::create_shared_queue;
    use std::io::Cursor;
    use std::time::Instant;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_mono_passthrough() {
        let bytes = pcm_bytes(&[1, -2, 300, i16::MIN]);
        let mut reader = PcmReader::new(Cursor::new(bytes), 1);

        assert_eq!(reader.read_samples().unwrap(), Some(vec![1, -2, 300, i16::MIN]));
        assert_eq!(reader.read_samples().unwrap(), None);
    }

    #[test]
    fn test_stereo_downmix() {
        let bytes = pcm_bytes(&[100, 300, -1000, 1000, i16::MAX, i16::MAX]);
        let mut reader = PcmReader::new(Cursor::new(bytes), 2);

        assert_eq!(reader.read_samples().unwrap(), Some(vec![200, 0, i16::MAX]));
    }

    #[test]
    fn test_partial_frame_dropped_at_eof() {
        let mut bytes = pcm_bytes(&[10, 20]);
        bytes.push(0x7f);
        let mut reader = PcmReader::new(Cursor::new(bytes), 2);

        assert_eq!(reader.read_samples().unwrap(), Some(vec![15]));
        assert_eq!(reader.read_samples().unwrap(), None);
    }

    #[test]
    fn test_source_fills_queue() {
        let samples: Vec<i16> = (0..10).collect();
        let queue = create_shared_queue(8);
        let source =
            PcmSource::spawn(Cursor::new(pcm_bytes(&samples)), 1, 4, queue.clone()).unwrap();
        source.join();

        assert!(queue.is_finished());
        assert_eq!(queue.pop().unwrap().samples, vec![0, 1, 2, 3]);
        assert_eq!(queue.pop().unwrap().samples, vec![4, 5, 6, 7]);
        assert_eq!(queue.pop().unwrap().samples, vec![8, 9]);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_tail_waits_for_full_queue() {
        let samples: Vec<i16> = (0..9).collect();
        let queue = create_shared_queue(1);
        let source =
            PcmSource::spawn(Cursor::new(pcm_bytes(&samples)), 1, 4, queue.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut blocks = Vec::new();
        while !queue.is_drained() && Instant::now() < deadline {
            match queue.pop() {
                Some(block) => blocks.push(block.samples),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        source.join();

        assert_eq!(blocks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8]]);
    }
}
