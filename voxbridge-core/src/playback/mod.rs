//! Live playback of audio that is still being generated.
//!
//! ```text
//!  generation thread                          device callback thread
//!  ────────────────                           ──────────────────────
//!  engine callback ─► ChunkProducer::push     PlaybackAdapter::fill_interleaved
//!                      │ resample (rubato)        │ try_take, splice, pad
//!                      ▼                          ▲
//!                 StreamingQueue ─────────────────┘
//!  ChunkProducer::finish ─► flush + close ──► Complete ─► wait_until_finished()
//!        ▲                                        │
//!        └──── spent chunks freed on push ◄───────┘ recycle channel
//! ```

pub mod adapter;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    audio::resample::RateConverter,
    buffering::{AudioChunk, StreamingQueue},
    error::{BridgeError, Result},
};

pub use adapter::{CallbackStatus, PlaybackAdapter, PlaybackCursor, PlaybackDiagnostics, PlaybackSnapshot};
pub use session::PlaybackSession;

/// Capacity of the channel carrying spent chunks back from the device callback.
pub const RECYCLE_DEPTH: usize = 64;

/// Playback configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output device name; `None` for the system default.
    pub preferred_device: Option<String>,
    /// Input block size for the producer-side resampler.
    pub resample_chunk: usize,
    /// How long to wait for the device to drain after generation, in milliseconds.
    pub drain_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            preferred_device: None,
            resample_chunk: 1024,
            drain_timeout_ms: 30_000,
        }
    }
}

impl PlaybackConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Trim the device name and clamp the resampler block to a sane range.
    pub fn normalize(&mut self) {
        self.preferred_device = self
            .preferred_device
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.resample_chunk = self.resample_chunk.clamp(64, 16_384);
    }
}

/// Producer half of a playback session. Clone it into generation callbacks.
///
/// Pushing after the queue was closed (by `finish` or the session's
/// `cancel`) returns [`BridgeError::QueueClosed`]; generation callbacks map
/// that to "stop generating".
#[derive(Clone)]
pub struct ChunkProducer {
    queue: Arc<StreamingQueue>,
    converter: Option<Arc<Mutex<RateConverter>>>,
    spent: Option<Receiver<AudioChunk>>,
}

impl ChunkProducer {
    /// Producer converting from `source_rate` to `device_rate` when they differ.
    pub fn new(
        queue: Arc<StreamingQueue>,
        source_rate: u32,
        device_rate: u32,
        resample_chunk: usize,
    ) -> Result<Self> {
        let converter = if source_rate == device_rate {
            None
        } else {
            Some(Arc::new(Mutex::new(RateConverter::new(
                source_rate,
                device_rate,
                resample_chunk,
            )?)))
        };
        Ok(Self {
            queue,
            converter,
            spent: None,
        })
    }

    /// Free the chunks the adapter hands back on `spent` from this side.
    pub fn with_recycling(mut self, spent: Receiver<AudioChunk>) -> Self {
        self.spent = Some(spent);
        self
    }

    /// Drop every chunk the device callback has finished with.
    fn reclaim(&self) {
        if let Some(spent) = &self.spent {
            spent.try_iter().for_each(drop);
        }
    }

    pub fn is_resampling(&self) -> bool {
        self.converter.is_some()
    }

    /// Enqueue generated samples (source rate).
    pub fn push(&self, samples: &[f32]) -> Result<()> {
        self.reclaim();
        if self.queue.is_closed() {
            return Err(BridgeError::QueueClosed);
        }
        if samples.is_empty() {
            return Ok(());
        }
        let converted = match &self.converter {
            Some(converter) => converter.lock().process(samples),
            None => samples.to_vec(),
        };
        if converted.is_empty() {
            return Ok(());
        }
        self.queue.push(AudioChunk::from(converted))
    }

    /// Flush the resampler tail and close the queue. Idempotent.
    pub fn finish(&self) {
        self.reclaim();
        if let Some(converter) = &self.converter {
            let tail = converter.lock().flush();
            if !tail.is_empty() {
                if let Err(e) = self.queue.push(AudioChunk::from(tail)) {
                    debug!(error = %e, "resampler tail dropped");
                }
            }
        }
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl std::fmt::Debug for ChunkProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkProducer")
            .field("queue", &self.queue)
            .field("resampling", &self.is_resampling())
            .finish()
    }
}
