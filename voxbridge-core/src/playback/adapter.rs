//! Real-time side of live playback.
//!
//! `PlaybackAdapter::fill_interleaved` runs inside the output device callback.
//! It only does `try_take` on the queue, copies samples, and bumps atomic
//! counters: no locks, no logging, no blocking. Spent chunks are handed back
//! over a bounded recycle channel so their buffers are freed on the producer
//! thread; only when that channel is full does the callback free one itself.
//!
//! ```text
//!   queue: [400][300] (closed)      pulls of 256 frames
//!   ─────────────────────────────────────────────────────
//!   pull 1: 256 real                           Continue
//!   pull 2: 144 (end of chunk 1) + 112 real    Continue
//!   pull 3: 188 real + 68 silence              Continue
//!   pull 4: 256 silence                        Complete
//! ```

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::buffering::{AudioChunk, StreamingQueue};

/// What the device callback should do after this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Continue,
    /// End of stream reached; the buffer was filled with silence.
    Complete,
}

/// Chunk currently being emitted and how far into it we are.
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    chunk: Option<AudioChunk>,
    offset: usize,
}

impl PlaybackCursor {
    pub fn is_idle(&self) -> bool {
        self.chunk.is_none()
    }

    /// Samples still to emit from the current chunk.
    pub fn remaining(&self) -> usize {
        self.chunk
            .as_ref()
            .map_or(0, |c| c.len().saturating_sub(self.offset))
    }

    fn load(&mut self, chunk: AudioChunk) {
        self.chunk = Some(chunk);
        self.offset = 0;
    }

    /// Write up to `frames` frames, each sample duplicated across `channels`.
    /// Returns the number of frames written, and the chunk if it is now spent.
    fn emit(&mut self, out: &mut [f32], channels: usize, frames: usize) -> (usize, Option<AudioChunk>) {
        let Some(chunk) = self.chunk.as_ref() else {
            return (0, None);
        };
        let src = &chunk.samples()[self.offset..];
        let n = frames.min(src.len());

        if channels == 1 {
            out[..n].copy_from_slice(&src[..n]);
        } else {
            for (frame, &sample) in out.chunks_exact_mut(channels).zip(&src[..n]) {
                frame.fill(sample);
            }
        }

        self.offset += n;
        if self.offset < chunk.len() {
            return (n, None);
        }
        self.offset = 0;
        (n, self.chunk.take())
    }
}

/// Counters bumped from the real-time callback, read from anywhere.
#[derive(Debug, Default)]
pub struct PlaybackDiagnostics {
    frames_played: AtomicU64,
    silence_frames: AtomicU64,
    underruns: AtomicU64,
    callbacks: AtomicU64,
    chunks_taken: AtomicU64,
    /// Spent chunks freed in the callback because the recycle channel was full.
    recycle_overflows: AtomicU64,
    finished: AtomicBool,
}

/// Point-in-time copy of [`PlaybackDiagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub frames_played: u64,
    pub silence_frames: u64,
    pub underruns: u64,
    pub callbacks: u64,
    pub chunks_taken: u64,
    pub recycle_overflows: u64,
    pub finished: bool,
}

impl PlaybackDiagnostics {
    pub fn reset(&self) {
        self.frames_played.store(0, Ordering::Relaxed);
        self.silence_frames.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.callbacks.store(0, Ordering::Relaxed);
        self.chunks_taken.store(0, Ordering::Relaxed);
        self.recycle_overflows.store(0, Ordering::Relaxed);
        self.finished.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            frames_played: self.frames_played.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
            chunks_taken: self.chunks_taken.load(Ordering::Relaxed),
            recycle_overflows: self.recycle_overflows.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Acquire),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Drains a [`StreamingQueue`] into fixed-size device buffers.
pub struct PlaybackAdapter {
    queue: Arc<StreamingQueue>,
    cursor: PlaybackCursor,
    diagnostics: Arc<PlaybackDiagnostics>,
    /// Completion signal, sent once. `bounded(1)` so `try_send` never blocks.
    done_tx: Option<Sender<()>>,
    /// Spent chunks back to the producer side.
    recycle_tx: Option<Sender<AudioChunk>>,
}

impl PlaybackAdapter {
    pub fn new(queue: Arc<StreamingQueue>, diagnostics: Arc<PlaybackDiagnostics>) -> Self {
        Self {
            queue,
            cursor: PlaybackCursor::default(),
            diagnostics,
            done_tx: None,
            recycle_tx: None,
        }
    }

    /// Attach a completion channel. Use a `bounded(1)` channel.
    pub fn with_completion(mut self, done_tx: Sender<()>) -> Self {
        self.done_tx = Some(done_tx);
        self
    }

    /// Return spent chunks through `recycle_tx` instead of dropping them in
    /// the callback. Use a bounded channel drained by the producer.
    pub fn with_recycling(mut self, recycle_tx: Sender<AudioChunk>) -> Self {
        self.recycle_tx = Some(recycle_tx);
        self
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn diagnostics(&self) -> &Arc<PlaybackDiagnostics> {
        &self.diagnostics
    }

    /// Mono fill: one sample per frame.
    pub fn fill(&mut self, out: &mut [f32]) -> CallbackStatus {
        self.fill_interleaved(out, 1)
    }

    /// Fill an interleaved buffer of `out.len() / channels` frames, the mono
    /// signal duplicated on every channel.
    pub fn fill_interleaved(&mut self, out: &mut [f32], channels: usize) -> CallbackStatus {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let d = &self.diagnostics;
        d.callbacks.fetch_add(1, Ordering::Relaxed);

        if self.cursor.is_idle() && self.queue.is_closed_and_empty() {
            out.fill(0.0);
            d.silence_frames.fetch_add(frames as u64, Ordering::Relaxed);
            self.signal_complete();
            return CallbackStatus::Complete;
        }

        let mut written = 0;
        while written < frames {
            if self.cursor.is_idle() {
                match self.queue.try_take() {
                    Some(chunk) => {
                        d.chunks_taken.fetch_add(1, Ordering::Relaxed);
                        if chunk.is_empty() {
                            self.retire(chunk);
                            continue;
                        }
                        self.cursor.load(chunk);
                    }
                    None => break,
                }
            }
            let dst = &mut out[written * channels..frames * channels];
            let (n, spent) = self.cursor.emit(dst, channels, frames - written);
            written += n;
            if let Some(chunk) = spent {
                self.retire(chunk);
            }
        }

        if written < frames {
            out[written * channels..].fill(0.0);
            let missing = (frames - written) as u64;
            d.silence_frames.fetch_add(missing, Ordering::Relaxed);
            // Trailing silence at true end of stream is not an underrun.
            if !self.queue.is_closed_and_empty() {
                d.underruns.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            // Leftover samples when `out.len()` is not a multiple of `channels`.
            out[frames * channels..].fill(0.0);
        }

        d.frames_played.fetch_add(written as u64, Ordering::Relaxed);
        CallbackStatus::Continue
    }

    /// Hand a spent chunk back. Never blocks; with the channel full or gone
    /// the chunk is dropped here.
    fn retire(&self, chunk: AudioChunk) {
        if let Some(tx) = &self.recycle_tx {
            if let Err(TrySendError::Full(chunk) | TrySendError::Disconnected(chunk)) = tx.try_send(chunk) {
                self.diagnostics.recycle_overflows.fetch_add(1, Ordering::Relaxed);
                drop(chunk);
            }
        }
    }

    fn signal_complete(&mut self) {
        if self.diagnostics.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl std::fmt::Debug for PlaybackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackAdapter")
            .field("cursor_remaining", &self.cursor.remaining())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
