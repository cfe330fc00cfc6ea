//! Typed handles over engine objects.
//!
//! Every facade owns one [`NativeHandle`] plus an `Arc<Bindings>` and routes
//! each call through [`Bindings::call`]. Configs are plain serde structs,
//! lowered to the `#[repr(C)]` layouts in [`crate::ffi::types`] only for the
//! duration of the create call.

pub mod circular_buffer;
pub mod offline_recognizer;
pub mod online_recognizer;
pub mod online_stream;
pub mod recognizer;
pub mod speaker;
pub mod tts;
pub mod vad;
pub mod version;

#[cfg(test)]
pub(crate) mod fake;

use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::EngineApi,
    handle::NativeHandle,
};

pub use circular_buffer::CircularBuffer;
pub use offline_recognizer::{
    OfflineModelConfig, OfflineRecognizer, OfflineRecognizerConfig, OfflineRecognizerResult, OfflineStream,
};
pub use online_recognizer::{
    EndpointConfig, OnlineModelConfig, OnlineRecognizer, OnlineRecognizerConfig, OnlineRecognizerResult,
};
pub use online_stream::OnlineStream;
pub use recognizer::{FeatureConfig, HomophoneReplacerConfig, HotwordsConfig, ModelFileConfig, TransducerModelConfig};
pub use speaker::{SpeakerEmbeddingExtractor, SpeakerEmbeddingExtractorConfig, SpeakerEmbeddingManager};
pub use tts::{
    GeneratedAudio, GenerationControl, OfflineTts, OfflineTtsConfig, OfflineTtsKittenModelConfig,
    OfflineTtsKokoroModelConfig, OfflineTtsMatchaModelConfig, OfflineTtsModelConfig,
    OfflineTtsVitsModelConfig, OfflineTtsZipvoiceModelConfig,
};
pub use vad::{SileroVadModelConfig, SpeechSegment, TenVadModelConfig, VadModelConfig, VoiceActivityDetector};
pub use version::VersionInfo;

/// Wrap the result of a create call, releasing it through `destroy` on the
/// same bindings.
pub(crate) fn own_handle(
    bindings: &Arc<Bindings>,
    raw: *mut c_void,
    kind: &'static str,
    destroy: impl Fn(&dyn EngineApi, *mut c_void) -> Result<()> + Send + Sync + 'static,
) -> Result<NativeHandle> {
    let b = Arc::clone(bindings);
    NativeHandle::create(raw, kind, move |p| b.call(|api| destroy(api, p.as_ptr())))
}

/// NUL-terminated copy of `s`. Interior NULs are an argument error.
pub(crate) fn c_string(s: &str, what: &str) -> Result<CString> {
    CString::new(s).map_err(|_| BridgeError::InvalidArgument(format!("{what} contains a NUL byte")))
}

/// Owns the C strings of one lowered config.
///
/// Pointers handed out stay valid until the arena is dropped; moving a
/// `CString` into the vector does not move its heap buffer.
#[derive(Debug, Default)]
pub(crate) struct CStringArena {
    held: Vec<CString>,
}

impl CStringArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ptr(&mut self, s: &str, what: &str) -> Result<*const c_char> {
        let c = c_string(s, what)?;
        let p = c.as_ptr();
        self.held.push(c);
        Ok(p)
    }
}

/// Slice length as the engine's `int32_t`.
pub(crate) fn len_i32(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len).map_err(|_| BridgeError::InvalidArgument(format!("{what} too long ({len})")))
}
