//! Typed audio chunk passed from the generation callback to the playback adapter.

use std::sync::Arc;

/// One producer push: an immutable block of mono PCM samples.
///
/// Allocated on the producer thread. Cheap to clone; the playback cursor
/// holds at most one at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Arc<[f32]>,
}

impl AudioChunk {
    pub fn new(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn from_slice(samples: &[f32]) -> Self {
        Self::new(samples)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / sample_rate as f64
    }
}

impl From<Vec<f32>> for AudioChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}
