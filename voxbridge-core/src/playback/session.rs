//! `PlaybackSession`: queue + adapter + output device for one utterance.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use tracing::{info, info_span, warn, Span};

use super::{
    ChunkProducer, PlaybackAdapter, PlaybackConfig, PlaybackDiagnostics, PlaybackSnapshot, RECYCLE_DEPTH,
};
use crate::{audio::OutputStream, buffering::StreamingQueue, error::Result};

/// One live playback.
///
/// **Not `Send`**: it owns a cpal stream. Create and drop it on one thread and
/// hand [`producer`](Self::producer) to the generation side.
pub struct PlaybackSession {
    queue: Arc<StreamingQueue>,
    diagnostics: Arc<PlaybackDiagnostics>,
    done_rx: Receiver<()>,
    producer: ChunkProducer,
    output: OutputStream,
    source_rate: u32,
    span: Span,
}

impl PlaybackSession {
    /// Open the output device and start pulling (silence until the first push).
    pub fn open(source_sample_rate: u32, config: &PlaybackConfig) -> Result<Self> {
        let span = info_span!("playback", source_rate = source_sample_rate);
        let _enter = span.enter();

        let queue = Arc::new(StreamingQueue::new());
        let diagnostics = Arc::new(PlaybackDiagnostics::default());
        let (done_tx, done_rx) = bounded(1);
        let (spent_tx, spent_rx) = bounded(RECYCLE_DEPTH);

        let adapter = PlaybackAdapter::new(Arc::clone(&queue), Arc::clone(&diagnostics))
            .with_completion(done_tx)
            .with_recycling(spent_tx);
        let output = OutputStream::open_with_preference(
            adapter,
            source_sample_rate,
            config.preferred_device.as_deref(),
        )?;

        let producer = ChunkProducer::new(
            Arc::clone(&queue),
            source_sample_rate,
            output.sample_rate,
            config.resample_chunk,
        )?
        .with_recycling(spent_rx);

        info!(
            device = output.device_name.as_str(),
            device_rate = output.sample_rate,
            channels = output.channels,
            resampling = producer.is_resampling(),
            "playback session started"
        );

        drop(_enter);
        Ok(Self {
            queue,
            diagnostics,
            done_rx,
            producer,
            output,
            source_rate: source_sample_rate,
            span,
        })
    }

    /// A producer handle for the generation side.
    pub fn producer(&self) -> ChunkProducer {
        self.producer.clone()
    }

    /// Close the queue without flushing the resampler. Already queued audio
    /// still plays; subsequent pushes fail with `QueueClosed`.
    pub fn cancel(&self) {
        let _enter = self.span.enter();
        info!("playback cancelled");
        self.queue.close();
    }

    /// Block until the device played everything, or `timeout` elapsed.
    /// Returns whether playback finished.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        let _enter = self.span.enter();
        let finished =
            self.diagnostics.is_finished() || self.done_rx.recv_timeout(timeout).is_ok();

        let snap = self.diagnostics.snapshot();
        if snap.underruns > 0 {
            warn!(
                underruns = snap.underruns,
                silence_frames = snap.silence_frames,
                "playback underran; producer slower than real time"
            );
        }
        if finished {
            info!(
                frames_played = snap.frames_played,
                callbacks = snap.callbacks,
                chunks = snap.chunks_taken,
                seconds = snap.frames_played as f64 / self.output.sample_rate.max(1) as f64,
                "playback finished"
            );
        } else {
            warn!(?timeout, frames_played = snap.frames_played, "playback did not finish in time");
        }
        finished
    }

    pub fn diagnostics(&self) -> PlaybackSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn device_rate(&self) -> u32 {
        self.output.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.output.channels
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("source_rate", &self.source_rate)
            .field("output", &self.output)
            .field("diagnostics", &self.diagnostics.snapshot())
            .finish_non_exhaustive()
    }
}
