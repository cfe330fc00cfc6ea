//! Sample-rate conversion for playback using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! The synthesizer produces audio at its model rate (16, 22.05 or 24 kHz are
//! typical). Output devices often only accept 44.1 or 48 kHz. `RateConverter`
//! bridges that gap on the producer thread, where allocation is allowed, so
//! the real-time callback only ever copies samples.
//!
//! When source rate == device rate, `RateConverter` is a passthrough and no
//! rubato session is created at all.
//!
//! rubato delays its output by `output_delay()` frames. Those leading frames
//! are discarded, and `flush` keeps draining until the output covers every
//! input sample, so the stream is exactly `input * ratio` long and aligned.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = RateConverter::new(22_050, 48_000, 1024)?;
//! let out = rc.process(&generated);   // Vec<f32> at 48 kHz
//! let tail = rc.flush();              // remainder at end of generation
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{BridgeError, Result};

/// Bound on silent blocks pushed through at flush; the delay is well under one.
const MAX_DRAIN_ROUNDS: usize = 4;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == device rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    /// Leading output frames still to discard for the resampler's delay.
    to_skip: usize,
    /// Input samples accepted since the last flush.
    input_total: usize,
    /// Output samples returned since the last flush.
    output_total: usize,
    source_rate: u32,
    target_rate: u32,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidArgument` for a zero rate or chunk size,
    /// `BridgeError::AudioStream` if rubato fails to initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 || chunk_size == 0 {
            return Err(BridgeError::InvalidArgument(format!(
                "resampler needs non-zero rates and chunk size (from={source_rate} to={target_rate} chunk={chunk_size})"
            )));
        }

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                to_skip: 0,
                input_total: 0,
                output_total: 0,
                source_rate,
                target_rate,
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| BridgeError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];
        let delay = resampler.output_delay();

        info!(source_rate, target_rate, chunk_size, max_out, delay, "playback resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
            to_skip: delay,
            input_total: 0,
            output_total: 0,
            source_rate,
            target_rate,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated internally until a full `chunk_size` block is
    /// available for rubato. Any remainder is kept for the next call or for
    /// [`flush`](Self::flush).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        self.input_total += samples.len();

        let mut result = Vec::new();
        let mut consumed_total = 0;

        while self.input_buf.len() - consumed_total >= self.chunk_size {
            let input_slice = &self.input_buf[consumed_total..consumed_total + self.chunk_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    take_output(&self.output_buf[0][..produced], &mut self.to_skip, &mut result);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            consumed_total += self.chunk_size;
        }

        self.input_buf.drain(..consumed_total);
        self.output_total += result.len();
        result
    }

    /// Convert whatever is still buffered and drain the resampler's delay
    /// line, zero-padding as needed.
    ///
    /// Output stops at the length the whole input maps to, so the padding does
    /// not become audible trailing silence. The converter is reset afterwards
    /// and can start a new stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };
        if self.input_total == 0 {
            return Vec::new();
        }

        let expected =
            (self.input_total as f64 * self.target_rate as f64 / self.source_rate as f64).round() as usize;
        let wanted = expected.saturating_sub(self.output_total);

        let mut out = Vec::with_capacity(wanted + self.output_buf[0].len());
        let input: [&[f32]; 1] = [&self.input_buf[..]];
        match resampler.process_partial_into_buffer(Some(&input[..]), &mut self.output_buf, None) {
            Ok((_consumed, produced)) => take_output(&self.output_buf[0][..produced], &mut self.to_skip, &mut out),
            Err(e) => error!("resampler flush error: {e}"),
        }

        // Each empty call pushes one block of silence through the delay line.
        let mut rounds = 0;
        while out.len() < wanted && rounds < MAX_DRAIN_ROUNDS {
            match resampler.process_partial_into_buffer(None::<&[&[f32]]>, &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    take_output(&self.output_buf[0][..produced], &mut self.to_skip, &mut out)
                }
                Err(e) => {
                    error!("resampler drain error: {e}");
                    break;
                }
            }
            rounds += 1;
        }
        out.truncate(wanted);

        resampler.reset();
        self.to_skip = resampler.output_delay();
        self.input_buf.clear();
        self.input_total = 0;
        self.output_total = 0;
        out
    }

    /// Returns `true` when source rate == device rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

/// Append `block` to `out`, first discarding up to `to_skip` frames.
fn take_output(block: &[f32], to_skip: &mut usize, out: &mut Vec<f32>) {
    let skip = (*to_skip).min(block.len());
    *to_skip -= skip;
    out.extend_from_slice(&block[skip..]);
}

impl std::fmt::Debug for RateConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateConverter")
            .field("source_rate", &self.source_rate)
            .field("target_rate", &self.target_rate)
            .field("chunk_size", &self.chunk_size)
            .field("buffered", &self.input_buf.len())
            .finish_non_exhaustive()
    }
}
