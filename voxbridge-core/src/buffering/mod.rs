//! Closeable FIFO of audio chunks between the generation thread and the
//! real-time playback callback.
//!
//! ```text
//!  producer(s)                              real-time consumer
//!  push(chunk) ──► [ unbounded channel ] ──► try_take()  (never blocks)
//!  close()     ──► drop sender, set flag     is_closed_and_empty()
//! ```
//!
//! Backed by an unbounded `crossbeam_channel`. `try_recv` is lock-free, so
//! the consumer never waits on a producer. The sender sits behind a mutex
//! that only producers and `close()` touch; the real-time side never takes
//! it.

pub mod chunk;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

pub use chunk::AudioChunk;

use crate::error::{BridgeError, Result};

pub struct StreamingQueue {
    tx: Mutex<Option<Sender<AudioChunk>>>,
    rx: Receiver<AudioChunk>,
    closed: AtomicBool,
}

impl StreamingQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue one chunk. Fails with [`BridgeError::QueueClosed`] after `close()`.
    pub fn push(&self, chunk: AudioChunk) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(BridgeError::QueueClosed)?;
        tx.send(chunk).map_err(|_| BridgeError::QueueClosed)
    }

    /// Mark end of stream. Idempotent; queued chunks stay available.
    pub fn close(&self) {
        // Drop the sender under the lock so no push can land after the flag.
        let mut guard = self.tx.lock();
        guard.take();
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Non-blocking take for the real-time consumer.
    pub fn try_take(&self) -> Option<AudioChunk> {
        self.rx.try_recv().ok()
    }

    /// Blocking take for non-real-time callers. `None` at end of stream.
    pub fn take(&self) -> Option<AudioChunk> {
        self.rx.recv().ok()
    }

    /// Blocking take with a deadline. `None` on timeout or end of stream.
    pub fn take_timeout(&self, timeout: Duration) -> Option<AudioChunk> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Chunks currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// End-of-stream predicate. Once true it stays true.
    pub fn is_closed_and_empty(&self) -> bool {
        self.is_closed() && self.rx.is_empty()
    }
}

impl Default for StreamingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingQueue")
            .field("queued", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_is_preserved() {
        let q = StreamingQueue::new();
        for i in 0..4 {
            q.push(AudioChunk::from(vec![i as f32; 3])).unwrap();
        }
        for i in 0..4 {
            assert_eq!(q.try_take().unwrap().samples()[0], i as f32);
        }
        assert!(q.try_take().is_none());
    }

    #[test]
    fn push_after_close_fails() {
        let q = StreamingQueue::new();
        q.close();
        q.close();
        let err = q.push(AudioChunk::from(vec![0.0])).unwrap_err();
        assert!(matches!(err, BridgeError::QueueClosed));
    }

    #[test]
    fn close_keeps_queued_chunks() {
        let q = StreamingQueue::new();
        q.push(AudioChunk::from(vec![1.0, 2.0])).unwrap();
        q.close();

        assert!(q.is_closed());
        assert!(!q.is_closed_and_empty());
        assert_eq!(q.try_take().unwrap().len(), 2);
        assert!(q.is_closed_and_empty());
        assert!(q.try_take().is_none());
        assert!(q.is_closed_and_empty());
    }

    #[test]
    fn open_empty_queue_is_not_end_of_stream() {
        let q = StreamingQueue::new();
        assert!(q.try_take().is_none());
        assert!(!q.is_closed_and_empty());
    }

    #[test]
    fn blocking_take_returns_none_at_end_of_stream() {
        let q = Arc::new(StreamingQueue::new());
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                q.push(AudioChunk::from(vec![0.5; 8])).unwrap();
                q.close();
            })
        };
        assert_eq!(q.take().map(|c| c.len()), Some(8));
        assert!(q.take().is_none());
        producer.join().expect("producer panicked");
        assert!(q.take_timeout(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn concurrent_producers_and_consumer_drain_everything() {
        let q = Arc::new(StreamingQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for _ in 0..250 {
                        q.push(AudioChunk::from(vec![p as f32; 4])).unwrap();
                    }
                })
            })
            .collect();

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut taken = 0usize;
                loop {
                    if let Some(chunk) = q.try_take() {
                        taken += chunk.len();
                    } else if q.is_closed_and_empty() {
                        break;
                    } else {
                        thread::yield_now();
                    }
                }
                taken
            })
        };

        for p in producers {
            p.join().expect("producer panicked");
        }
        q.close();

        let taken = consumer.join().expect("consumer panicked");
        assert_eq!(taken, 4 * 250 * 4);
        assert!(q.is_closed_and_empty());
    }
}
