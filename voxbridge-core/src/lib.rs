//! # voxbridge-core
//!
//! Safe Rust surface over the sherpa-onnx C API, plus live playback of
//! synthesized audio.
//!
//! ## Architecture
//!
//! ```text
//! facade (OfflineTts, OnlineRecognizer, VoiceActivityDetector, ...)
//!     │  Bindings::call(|api| ...)
//!     ▼
//! BindingRouter ──► embedded table (linked in)
//!               └─► dynamic table  (libloading)
//!
//! TTS callback ─► ChunkProducer ─► StreamingQueue ─► PlaybackAdapter ─► cpal
//!                 (resample)                         (real-time thread)
//! ```
//!
//! Engine objects live behind [`NativeHandle`], which releases them exactly
//! once. The playback callback never allocates or blocks.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod audio;
pub mod binding;
pub mod buffering;
pub mod error;
pub mod facade;
pub mod ffi;
pub mod handle;
pub mod playback;

// Convenience re-exports for downstream crates
pub use binding::{BindingConfig, BindingMode, BindingRouter, Bindings};
pub use buffering::{AudioChunk, StreamingQueue};
pub use error::{BridgeError, Result};
pub use facade::{
    CircularBuffer, GeneratedAudio, GenerationControl, OfflineRecognizer, OfflineRecognizerConfig, OfflineStream,
    OfflineTts, OfflineTtsConfig, OnlineRecognizer, OnlineRecognizerConfig, OnlineStream, SpeakerEmbeddingExtractor,
    SpeakerEmbeddingManager, SpeechSegment, VadModelConfig, VersionInfo, VoiceActivityDetector,
};
pub use handle::NativeHandle;
pub use playback::{ChunkProducer, PlaybackAdapter, PlaybackConfig, PlaybackSession, PlaybackSnapshot};
