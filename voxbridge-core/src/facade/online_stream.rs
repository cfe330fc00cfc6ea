//! Streaming audio input shared by the speaker extractor and the online
//! recognizer. Both hand out the same engine object type.

use std::ffi::c_void;
use std::sync::Arc;

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    handle::NativeHandle,
};

use super::{len_i32, own_handle};

/// Audio input fed chunk by chunk. Created by
/// [`SpeakerEmbeddingExtractor::create_stream`](super::SpeakerEmbeddingExtractor::create_stream)
/// or [`OnlineRecognizer::create_stream`](super::OnlineRecognizer::create_stream).
pub struct OnlineStream {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl OnlineStream {
    /// Own a stream returned by the create entry point `kind`.
    pub(crate) fn from_raw(bindings: &Arc<Bindings>, raw: *mut c_void, kind: &'static str) -> Result<Self> {
        let handle = own_handle(bindings, raw, kind, |api, p| unsafe { api.destroy_online_stream(p) })?;
        Ok(Self {
            bindings: Arc::clone(bindings),
            handle,
        })
    }

    pub(crate) fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    pub fn accept_waveform(&mut self, sample_rate: i32, samples: &[f32]) -> Result<()> {
        if sample_rate <= 0 {
            return Err(BridgeError::InvalidArgument(format!("sample rate must be > 0, got {sample_rate}")));
        }
        let n = len_i32(samples.len(), "samples")?;
        self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.online_stream_accept_waveform(p, sample_rate, samples.as_ptr(), n) })
        })
    }

    /// No more audio will follow.
    pub fn input_finished(&mut self) -> Result<()> {
        self.handle
            .with(|p| self.bindings.call(|api| unsafe { api.online_stream_input_finished(p) }))
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for OnlineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnlineStream")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::fake::fake_bindings;

    fn stream(bindings: &Arc<Bindings>) -> OnlineStream {
        let raw = bindings
            .call(|api| unsafe { api.speaker_embedding_extractor_create_stream(std::ptr::null_mut()) })
            .unwrap();
        OnlineStream::from_raw(bindings, raw, "SherpaOnnxSpeakerEmbeddingExtractorCreateStream").unwrap()
    }

    #[test]
    fn null_stream_is_an_invalid_handle() {
        let (bindings, _state) = fake_bindings();
        let err = OnlineStream::from_raw(&bindings, std::ptr::null_mut(), "SherpaOnnxCreateOnlineStream").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHandle("SherpaOnnxCreateOnlineStream")));
    }

    #[test]
    fn disposed_stream_rejects_audio_and_is_freed_once() {
        let (bindings, state) = fake_bindings();
        let mut s = stream(&bindings);
        s.accept_waveform(16_000, &[0.1, 0.2]).unwrap();
        s.dispose();
        assert!(matches!(
            s.accept_waveform(16_000, &[0.3]),
            Err(BridgeError::UseAfterRelease(_))
        ));
        assert!(matches!(s.input_finished(), Err(BridgeError::UseAfterRelease(_))));
        drop(s);
        assert_eq!(state.destroyed.lock().as_slice(), ["online_stream"]);
        assert_eq!(state.live(), 0);
    }
}
