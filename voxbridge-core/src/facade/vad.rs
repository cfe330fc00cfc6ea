//! Voice activity detector (Silero or TEN VAD models).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::{copy_f32_slice, SherpaOnnxSileroVadModelConfig, SherpaOnnxTenVadModelConfig, SherpaOnnxVadModelConfig},
    handle::NativeHandle,
};

use super::{len_i32, own_handle, CStringArena};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SileroVadModelConfig {
    pub model: String,
    pub threshold: f32,
    pub min_silence_duration: f32,
    pub min_speech_duration: f32,
    pub window_size: i32,
    pub max_speech_duration: f32,
}

impl Default for SileroVadModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            threshold: 0.5,
            min_silence_duration: 0.5,
            min_speech_duration: 0.25,
            window_size: 512,
            max_speech_duration: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenVadModelConfig {
    pub model: String,
    pub threshold: f32,
    pub min_silence_duration: f32,
    pub min_speech_duration: f32,
    pub window_size: i32,
    pub max_speech_duration: f32,
}

impl Default for TenVadModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            threshold: 0.5,
            min_silence_duration: 0.5,
            min_speech_duration: 0.25,
            window_size: 256,
            max_speech_duration: 5.0,
        }
    }
}

/// Set `model` on exactly one of `silero_vad` / `ten_vad`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadModelConfig {
    pub silero_vad: SileroVadModelConfig,
    pub ten_vad: TenVadModelConfig,
    pub sample_rate: i32,
    pub num_threads: i32,
    pub provider: String,
    pub debug: bool,
}

impl Default for VadModelConfig {
    fn default() -> Self {
        Self {
            silero_vad: SileroVadModelConfig::default(),
            ten_vad: TenVadModelConfig::default(),
            sample_rate: 16_000,
            num_threads: 1,
            provider: "cpu".into(),
            debug: false,
        }
    }
}

impl VadModelConfig {
    fn lower(&self, arena: &mut CStringArena) -> Result<SherpaOnnxVadModelConfig> {
        let s = &self.silero_vad;
        let t = &self.ten_vad;
        Ok(SherpaOnnxVadModelConfig {
            silero_vad: SherpaOnnxSileroVadModelConfig {
                model: arena.ptr(&s.model, "silero_vad.model")?,
                threshold: s.threshold,
                min_silence_duration: s.min_silence_duration,
                min_speech_duration: s.min_speech_duration,
                window_size: s.window_size,
                max_speech_duration: s.max_speech_duration,
            },
            sample_rate: self.sample_rate,
            num_threads: self.num_threads,
            provider: arena.ptr(&self.provider, "provider")?,
            debug: self.debug as i32,
            ten_vad: SherpaOnnxTenVadModelConfig {
                model: arena.ptr(&t.model, "ten_vad.model")?,
                threshold: t.threshold,
                min_silence_duration: t.min_silence_duration,
                min_speech_duration: t.min_speech_duration,
                window_size: t.window_size,
                max_speech_duration: t.max_speech_duration,
            },
        })
    }
}

/// One detected utterance, copied out of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    /// Index of the first sample, counted from the detector's first input.
    pub start: i32,
    pub samples: Vec<f32>,
}

pub struct VoiceActivityDetector {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl VoiceActivityDetector {
    pub fn new(config: &VadModelConfig, buffer_size_in_seconds: f32) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), config, buffer_size_in_seconds)
    }

    pub fn with_bindings(
        bindings: Arc<Bindings>,
        config: &VadModelConfig,
        buffer_size_in_seconds: f32,
    ) -> Result<Self> {
        let mut arena = CStringArena::new();
        let c_config = config.lower(&mut arena)?;
        let raw = bindings.call(|api| unsafe {
            api.create_voice_activity_detector(&c_config, buffer_size_in_seconds)
        })?;
        drop(arena);

        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateVoiceActivityDetector", |api, p| unsafe {
            api.destroy_voice_activity_detector(p)
        })?;
        Ok(Self { bindings, handle })
    }

    pub fn accept_waveform(&mut self, samples: &[f32]) -> Result<()> {
        let n = len_i32(samples.len(), "samples")?;
        self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.vad_accept_waveform(p, samples.as_ptr(), n) })
        })
    }

    /// `true` when no completed segment is queued.
    pub fn is_empty(&self) -> Result<bool> {
        let empty = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.vad_empty(p) }))?;
        Ok(empty != 0)
    }

    pub fn is_speech_detected(&self) -> Result<bool> {
        let detected = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.vad_detected(p) }))?;
        Ok(detected != 0)
    }

    /// Drop the oldest queued segment.
    pub fn pop(&mut self) -> Result<()> {
        self.handle.with(|p| self.bindings.call(|api| unsafe { api.vad_pop(p) }))
    }

    /// Oldest queued segment. Check [`is_empty`](Self::is_empty) first.
    pub fn front(&self) -> Result<SpeechSegment> {
        self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                let seg = api.vad_front(p)?;
                if seg.is_null() {
                    return Err(BridgeError::Generation("no speech segment queued".into()));
                }
                let out = SpeechSegment {
                    start: (*seg).start,
                    samples: copy_f32_slice((*seg).samples, (*seg).n),
                };
                api.destroy_speech_segment(seg)?;
                Ok(out)
            })
        })
    }

    pub fn clear(&mut self) -> Result<()> {
        self.handle.with(|p| self.bindings.call(|api| unsafe { api.vad_clear(p) }))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.handle.with(|p| self.bindings.call(|api| unsafe { api.vad_reset(p) }))
    }

    /// Force out any segment still in progress at end of input.
    pub fn flush(&mut self) -> Result<()> {
        self.handle.with(|p| self.bindings.call(|api| unsafe { api.vad_flush(p) }))
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for VoiceActivityDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceActivityDetector")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
