//! Offline text-to-speech: synthesizer, generated audio, streaming callbacks.
//!
//! ## Callbacks
//!
//! The engine calls back once per generated chunk, synchronously, on the
//! thread that called `generate_*`. The Rust closure travels through the
//! `void *arg` of the `...WithArg` entry points:
//!
//! ```text
//!   generate_with_callback(text, .., f)
//!        │  arg = &mut f as *mut F
//!        ▼
//!   engine ──► chunk_trampoline::<F>(samples, n, arg) ──► f(&[f32]) ──► 1 | 0
//! ```
//!
//! A panic in the closure is caught in the trampoline and reported to the
//! engine as "stop".

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::{
        copy_f32_slice, EngineApi, SherpaOnnxGeneratedAudio, SherpaOnnxOfflineTtsConfig,
        SherpaOnnxOfflineTtsKittenModelConfig, SherpaOnnxOfflineTtsKokoroModelConfig,
        SherpaOnnxOfflineTtsMatchaModelConfig, SherpaOnnxOfflineTtsModelConfig,
        SherpaOnnxOfflineTtsVitsModelConfig, SherpaOnnxOfflineTtsZipvoiceModelConfig,
    },
    handle::NativeHandle,
};

use super::{c_string, len_i32, own_handle, CStringArena};

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsVitsModelConfig {
    pub model: String,
    pub lexicon: String,
    pub tokens: String,
    pub data_dir: String,
    pub noise_scale: f32,
    pub noise_scale_w: f32,
    pub length_scale: f32,
    pub dict_dir: String,
}

impl Default for OfflineTtsVitsModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            lexicon: String::new(),
            tokens: String::new(),
            data_dir: String::new(),
            noise_scale: 0.667,
            noise_scale_w: 0.8,
            length_scale: 1.0,
            dict_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsMatchaModelConfig {
    pub acoustic_model: String,
    pub vocoder: String,
    pub lexicon: String,
    pub tokens: String,
    pub data_dir: String,
    pub noise_scale: f32,
    pub length_scale: f32,
    pub dict_dir: String,
}

impl Default for OfflineTtsMatchaModelConfig {
    fn default() -> Self {
        Self {
            acoustic_model: String::new(),
            vocoder: String::new(),
            lexicon: String::new(),
            tokens: String::new(),
            data_dir: String::new(),
            noise_scale: 1.0,
            length_scale: 1.0,
            dict_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsKokoroModelConfig {
    pub model: String,
    pub voices: String,
    pub tokens: String,
    pub data_dir: String,
    pub length_scale: f32,
    pub dict_dir: String,
    pub lexicon: String,
    pub lang: String,
}

impl Default for OfflineTtsKokoroModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            voices: String::new(),
            tokens: String::new(),
            data_dir: String::new(),
            length_scale: 1.0,
            dict_dir: String::new(),
            lexicon: String::new(),
            lang: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsKittenModelConfig {
    pub model: String,
    pub voices: String,
    pub tokens: String,
    pub data_dir: String,
    pub length_scale: f32,
}

impl Default for OfflineTtsKittenModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            voices: String::new(),
            tokens: String::new(),
            data_dir: String::new(),
            length_scale: 1.0,
        }
    }
}

/// ZipVoice zero-shot voice cloning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsZipvoiceModelConfig {
    pub tokens: String,
    pub text_model: String,
    pub flow_matching_model: String,
    pub vocoder: String,
    pub data_dir: String,
    pub pinyin_dict: String,
    pub feat_scale: f32,
    pub t_shift: f32,
    pub target_rms: f32,
    pub guidance_scale: f32,
}

impl Default for OfflineTtsZipvoiceModelConfig {
    fn default() -> Self {
        Self {
            tokens: String::new(),
            text_model: String::new(),
            flow_matching_model: String::new(),
            vocoder: String::new(),
            data_dir: String::new(),
            pinyin_dict: String::new(),
            feat_scale: 0.1,
            t_shift: 0.5,
            target_rms: 0.1,
            guidance_scale: 1.0,
        }
    }
}

/// Fill in exactly one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsModelConfig {
    pub vits: OfflineTtsVitsModelConfig,
    pub matcha: OfflineTtsMatchaModelConfig,
    pub kokoro: OfflineTtsKokoroModelConfig,
    pub kitten: OfflineTtsKittenModelConfig,
    pub zipvoice: OfflineTtsZipvoiceModelConfig,
    pub num_threads: i32,
    pub debug: bool,
    pub provider: String,
}

impl Default for OfflineTtsModelConfig {
    fn default() -> Self {
        Self {
            vits: OfflineTtsVitsModelConfig::default(),
            matcha: OfflineTtsMatchaModelConfig::default(),
            kokoro: OfflineTtsKokoroModelConfig::default(),
            kitten: OfflineTtsKittenModelConfig::default(),
            zipvoice: OfflineTtsZipvoiceModelConfig::default(),
            num_threads: 1,
            debug: false,
            provider: "cpu".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineTtsConfig {
    pub model: OfflineTtsModelConfig,
    /// Comma-separated text-normalisation FSTs.
    pub rule_fsts: String,
    pub rule_fars: String,
    pub max_num_sentences: i32,
    pub silence_scale: f32,
}

impl Default for OfflineTtsConfig {
    fn default() -> Self {
        Self {
            model: OfflineTtsModelConfig::default(),
            rule_fsts: String::new(),
            rule_fars: String::new(),
            max_num_sentences: 1,
            silence_scale: 0.2,
        }
    }
}

impl OfflineTtsConfig {
    fn lower(&self, a: &mut CStringArena) -> Result<SherpaOnnxOfflineTtsConfig> {
        let m = &self.model;
        let (v, ma, k, ki, z) = (&m.vits, &m.matcha, &m.kokoro, &m.kitten, &m.zipvoice);
        Ok(SherpaOnnxOfflineTtsConfig {
            model: SherpaOnnxOfflineTtsModelConfig {
                vits: SherpaOnnxOfflineTtsVitsModelConfig {
                    model: a.ptr(&v.model, "vits.model")?,
                    lexicon: a.ptr(&v.lexicon, "vits.lexicon")?,
                    tokens: a.ptr(&v.tokens, "vits.tokens")?,
                    data_dir: a.ptr(&v.data_dir, "vits.data_dir")?,
                    noise_scale: v.noise_scale,
                    noise_scale_w: v.noise_scale_w,
                    length_scale: v.length_scale,
                    dict_dir: a.ptr(&v.dict_dir, "vits.dict_dir")?,
                },
                num_threads: m.num_threads,
                debug: m.debug as i32,
                provider: a.ptr(&m.provider, "provider")?,
                matcha: SherpaOnnxOfflineTtsMatchaModelConfig {
                    acoustic_model: a.ptr(&ma.acoustic_model, "matcha.acoustic_model")?,
                    vocoder: a.ptr(&ma.vocoder, "matcha.vocoder")?,
                    lexicon: a.ptr(&ma.lexicon, "matcha.lexicon")?,
                    tokens: a.ptr(&ma.tokens, "matcha.tokens")?,
                    data_dir: a.ptr(&ma.data_dir, "matcha.data_dir")?,
                    noise_scale: ma.noise_scale,
                    length_scale: ma.length_scale,
                    dict_dir: a.ptr(&ma.dict_dir, "matcha.dict_dir")?,
                },
                kokoro: SherpaOnnxOfflineTtsKokoroModelConfig {
                    model: a.ptr(&k.model, "kokoro.model")?,
                    voices: a.ptr(&k.voices, "kokoro.voices")?,
                    tokens: a.ptr(&k.tokens, "kokoro.tokens")?,
                    data_dir: a.ptr(&k.data_dir, "kokoro.data_dir")?,
                    length_scale: k.length_scale,
                    dict_dir: a.ptr(&k.dict_dir, "kokoro.dict_dir")?,
                    lexicon: a.ptr(&k.lexicon, "kokoro.lexicon")?,
                    lang: a.ptr(&k.lang, "kokoro.lang")?,
                },
                kitten: SherpaOnnxOfflineTtsKittenModelConfig {
                    model: a.ptr(&ki.model, "kitten.model")?,
                    voices: a.ptr(&ki.voices, "kitten.voices")?,
                    tokens: a.ptr(&ki.tokens, "kitten.tokens")?,
                    data_dir: a.ptr(&ki.data_dir, "kitten.data_dir")?,
                    length_scale: ki.length_scale,
                },
                zipvoice: SherpaOnnxOfflineTtsZipvoiceModelConfig {
                    tokens: a.ptr(&z.tokens, "zipvoice.tokens")?,
                    text_model: a.ptr(&z.text_model, "zipvoice.text_model")?,
                    flow_matching_model: a.ptr(&z.flow_matching_model, "zipvoice.flow_matching_model")?,
                    vocoder: a.ptr(&z.vocoder, "zipvoice.vocoder")?,
                    data_dir: a.ptr(&z.data_dir, "zipvoice.data_dir")?,
                    pinyin_dict: a.ptr(&z.pinyin_dict, "zipvoice.pinyin_dict")?,
                    feat_scale: z.feat_scale,
                    t_shift: z.t_shift,
                    target_rms: z.target_rms,
                    guidance_scale: z.guidance_scale,
                },
            },
            rule_fsts: a.ptr(&self.rule_fsts, "rule_fsts")?,
            max_num_sentences: self.max_num_sentences,
            rule_fars: a.ptr(&self.rule_fars, "rule_fars")?,
            silence_scale: self.silence_scale,
        })
    }
}

// ── Callbacks ────────────────────────────────────────────────────────────────

/// Return value of a generation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationControl {
    Continue,
    Stop,
}

impl GenerationControl {
    fn as_c(self) -> i32 {
        match self {
            GenerationControl::Continue => 1,
            GenerationControl::Stop => 0,
        }
    }
}

impl From<bool> for GenerationControl {
    /// `true` means keep generating.
    fn from(keep_going: bool) -> Self {
        if keep_going {
            GenerationControl::Continue
        } else {
            GenerationControl::Stop
        }
    }
}

unsafe fn chunk_slice<'a>(samples: *const f32, n: i32) -> &'a [f32] {
    if samples.is_null() || n <= 0 {
        &[]
    } else {
        // SAFETY: the engine passes `n` valid samples for the duration of the callback.
        unsafe { std::slice::from_raw_parts(samples, n as usize) }
    }
}

unsafe extern "C" fn chunk_trampoline<F>(samples: *const f32, n: i32, arg: *mut c_void) -> i32
where
    F: FnMut(&[f32]) -> GenerationControl,
{
    if arg.is_null() {
        return 0;
    }
    // SAFETY: `arg` is the `&mut F` passed by `generate_with_callback`, which
    // outlives the synchronous generate call.
    let callback = unsafe { &mut *(arg as *mut F) };
    let chunk = unsafe { chunk_slice(samples, n) };
    match catch_unwind(AssertUnwindSafe(|| callback(chunk))) {
        Ok(control) => control.as_c(),
        Err(_) => {
            warn!("generation callback panicked, stopping generation");
            0
        }
    }
}

unsafe extern "C" fn progress_trampoline<F>(
    samples: *const f32,
    n: i32,
    progress: f32,
    arg: *mut c_void,
) -> i32
where
    F: FnMut(&[f32], f32) -> GenerationControl,
{
    if arg.is_null() {
        return 0;
    }
    // SAFETY: as in `chunk_trampoline`.
    let callback = unsafe { &mut *(arg as *mut F) };
    let chunk = unsafe { chunk_slice(samples, n) };
    match catch_unwind(AssertUnwindSafe(|| callback(chunk, progress))) {
        Ok(control) => control.as_c(),
        Err(_) => {
            warn!("generation callback panicked, stopping generation");
            0
        }
    }
}

// ── Synthesizer ──────────────────────────────────────────────────────────────

pub struct OfflineTts {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl OfflineTts {
    pub fn new(config: &OfflineTtsConfig) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), config)
    }

    pub fn with_bindings(bindings: Arc<Bindings>, config: &OfflineTtsConfig) -> Result<Self> {
        let mut arena = CStringArena::new();
        let c_config = config.lower(&mut arena)?;
        let raw = bindings.call(|api| unsafe { api.create_offline_tts(&c_config) })?;
        drop(arena);

        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateOfflineTts", |api, p| unsafe {
            api.destroy_offline_tts(p)
        })?;
        Ok(Self { bindings, handle })
    }

    pub fn sample_rate(&self) -> Result<u32> {
        let rate = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.offline_tts_sample_rate(p) }))?;
        Ok(rate.max(0) as u32)
    }

    pub fn num_speakers(&self) -> Result<u32> {
        let n = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.offline_tts_num_speakers(p) }))?;
        Ok(n.max(0) as u32)
    }

    /// Synthesize `text` in one shot.
    pub fn generate(&mut self, text: &str, speed: f32, speaker_id: i32) -> Result<GeneratedAudio> {
        let text = c_string(text, "text")?;
        let audio = self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.offline_tts_generate(p, text.as_ptr(), speaker_id, speed) })
        })?;
        self.wrap_audio(audio, "SherpaOnnxOfflineTtsGenerate")
    }

    /// Synthesize `text`, handing each chunk to `callback` as soon as it is
    /// produced. Returning [`GenerationControl::Stop`] ends generation early;
    /// the returned audio then holds what was produced so far.
    pub fn generate_with_callback<F>(
        &mut self,
        text: &str,
        speed: f32,
        speaker_id: i32,
        callback: F,
    ) -> Result<GeneratedAudio>
    where
        F: FnMut(&[f32]) -> GenerationControl,
    {
        let text = c_string(text, "text")?;
        let mut callback = callback;
        let arg = &mut callback as *mut F as *mut c_void;

        let audio = self.handle.with(|p| {
            self.bindings.call(|api: &dyn EngineApi| unsafe {
                api.offline_tts_generate_with_callback(
                    p,
                    text.as_ptr(),
                    speaker_id,
                    speed,
                    Some(chunk_trampoline::<F>),
                    arg,
                )
            })
        })?;
        self.wrap_audio(audio, "SherpaOnnxOfflineTtsGenerateWithCallbackWithArg")
    }

    /// Like [`generate_with_callback`](Self::generate_with_callback), with a
    /// progress fraction in `[0, 1]` alongside each chunk.
    pub fn generate_with_progress_callback<F>(
        &mut self,
        text: &str,
        speed: f32,
        speaker_id: i32,
        callback: F,
    ) -> Result<GeneratedAudio>
    where
        F: FnMut(&[f32], f32) -> GenerationControl,
    {
        let text = c_string(text, "text")?;
        let mut callback = callback;
        let arg = &mut callback as *mut F as *mut c_void;

        let audio = self.handle.with(|p| {
            self.bindings.call(|api: &dyn EngineApi| unsafe {
                api.offline_tts_generate_with_progress_callback(
                    p,
                    text.as_ptr(),
                    speaker_id,
                    speed,
                    Some(progress_trampoline::<F>),
                    arg,
                )
            })
        })?;
        self.wrap_audio(audio, "SherpaOnnxOfflineTtsGenerateWithProgressCallbackWithArg")
    }

    /// Zero-shot voice cloning with a ZipVoice model.
    ///
    /// `prompt_samples` is the reference voice in `[-1, 1]` and `prompt_text`
    /// its transcript. Both may be empty.
    pub fn generate_with_zipvoice(
        &mut self,
        text: &str,
        prompt_text: &str,
        prompt_samples: &[f32],
        prompt_sample_rate: i32,
        speed: f32,
        num_steps: i32,
    ) -> Result<GeneratedAudio> {
        if self.handle.is_released() {
            return Err(BridgeError::UseAfterRelease(self.handle.kind()));
        }
        if text.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("text must not be blank".into()));
        }
        if !speed.is_finite() || speed <= 0.0 {
            return Err(BridgeError::InvalidArgument(format!(
                "speed must be a positive finite value, got {speed}"
            )));
        }
        if num_steps <= 0 {
            return Err(BridgeError::InvalidArgument(format!(
                "num_steps must be > 0, got {num_steps}"
            )));
        }
        if !prompt_samples.is_empty() && prompt_sample_rate <= 0 {
            return Err(BridgeError::InvalidArgument(format!(
                "prompt_sample_rate must be > 0 when prompt samples are given, got {prompt_sample_rate}"
            )));
        }

        let text = c_string(text, "text")?;
        let prompt_text = c_string(prompt_text, "prompt text")?;
        let n = len_i32(prompt_samples.len(), "prompt samples")?;
        let samples_ptr = if prompt_samples.is_empty() {
            std::ptr::null()
        } else {
            prompt_samples.as_ptr()
        };

        debug!(prompt_samples = n, prompt_sample_rate, num_steps, "zipvoice generation");
        let audio = self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                api.offline_tts_generate_with_zipvoice(
                    p,
                    text.as_ptr(),
                    prompt_text.as_ptr(),
                    samples_ptr,
                    n,
                    prompt_sample_rate,
                    speed,
                    num_steps,
                )
            })
        })?;
        self.wrap_audio(audio, "SherpaOnnxOfflineTtsGenerateWithZipvoice")
    }

    fn wrap_audio(&self, audio: *const SherpaOnnxGeneratedAudio, op: &'static str) -> Result<GeneratedAudio> {
        if audio.is_null() {
            return Err(BridgeError::Generation(format!("{op} returned no audio")));
        }
        let handle = own_handle(&self.bindings, audio as *mut c_void, op, |api, p| unsafe {
            api.destroy_generated_audio(p as *const SherpaOnnxGeneratedAudio)
        })?;
        Ok(GeneratedAudio {
            bindings: Arc::clone(&self.bindings),
            handle,
        })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for OfflineTts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineTts")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ── Generated audio ──────────────────────────────────────────────────────────

/// Engine-owned synthesis result.
pub struct GeneratedAudio {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl GeneratedAudio {
    /// Run `f` on the engine's result struct while the handle holds it open.
    fn read<T>(&self, f: impl FnOnce(&SherpaOnnxGeneratedAudio) -> Result<T>) -> Result<T> {
        self.handle.with(|p| {
            // SAFETY: live, in-flight handle to the struct the engine
            // returned; it is immutable until released.
            let audio = unsafe { &*(p as *const SherpaOnnxGeneratedAudio) };
            f(audio)
        })
    }

    /// Copy of the samples, mono f32 in `[-1, 1]`.
    pub fn samples(&self) -> Result<Vec<f32>> {
        // SAFETY: `samples` holds `n` floats owned by the audio struct.
        self.read(|audio| Ok(unsafe { copy_f32_slice(audio.samples, audio.n) }))
    }

    pub fn num_samples(&self) -> Result<usize> {
        self.read(|audio| Ok(audio.n.max(0) as usize))
    }

    pub fn sample_rate(&self) -> Result<u32> {
        self.read(|audio| Ok(audio.sample_rate.max(0) as u32))
    }

    /// Write a 16-bit mono WAV through the engine. `Ok(false)` if the engine
    /// could not write the file.
    pub fn save_to_wave_file(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| BridgeError::InvalidArgument(format!("path is not UTF-8: {}", path.display())))?;
        let filename = c_string(path_str, "path")?;

        let status = self.read(|audio| {
            let (samples, n, rate) = (audio.samples, audio.n, audio.sample_rate);
            self.bindings
                .call(|api| unsafe { api.write_wave(samples, n, rate, filename.as_ptr()) })
        })?;
        Ok(status == 1)
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for GeneratedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("GeneratedAudio");
        if let Ok((n, rate)) = self.read(|audio| Ok((audio.n, audio.sample_rate))) {
            s.field("num_samples", &n).field("sample_rate", &rate);
        }
        s.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::fake::fake_bindings;

    fn vits(model: &str) -> OfflineTtsConfig {
        OfflineTtsConfig {
            model: OfflineTtsModelConfig {
                vits: OfflineTtsVitsModelConfig {
                    model: model.into(),
                    tokens: "tokens.txt".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn create_passes_config_and_null_result_is_invalid_handle() {
        let (bindings, state) = fake_bindings();
        let tts = OfflineTts::with_bindings(Arc::clone(&bindings), &vits("vits-piper.onnx")).unwrap();
        assert_eq!(state.last_tts_model.lock().as_deref(), Some("vits-piper.onnx"));
        assert_eq!(tts.sample_rate().unwrap(), 22_050);
        assert_eq!(tts.num_speakers().unwrap(), 4);

        let err = OfflineTts::with_bindings(bindings, &vits("missing.onnx")).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHandle("SherpaOnnxCreateOfflineTts")));
    }

    #[test]
    fn generate_copies_samples_and_frees_result() {
        let (bindings, state) = fake_bindings();
        *state.tts_chunks.lock() = vec![vec![0.1; 100], vec![0.2; 50]];
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();

        let audio = tts.generate("hello", 1.0, 0).unwrap();
        assert_eq!(audio.num_samples().unwrap(), 150);
        assert_eq!(audio.sample_rate().unwrap(), 22_050);
        assert_eq!(audio.samples().unwrap().len(), 150);

        drop(audio);
        drop(tts);
        assert_eq!(state.live(), 0);
    }

    #[test]
    fn blank_text_is_a_generation_error() {
        let (bindings, _state) = fake_bindings();
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();
        let err = tts.generate("   ", 1.0, 0).unwrap_err();
        assert!(matches!(err, BridgeError::Generation(ref m) if m.contains("SherpaOnnxOfflineTtsGenerate")));
    }

    #[test]
    fn callback_sees_every_chunk_in_order() {
        let (bindings, state) = fake_bindings();
        *state.tts_chunks.lock() = vec![vec![0.1; 3], vec![0.2; 4], vec![0.3; 5]];
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();

        let mut seen = Vec::new();
        let audio = tts
            .generate_with_callback("hi", 1.0, 0, |chunk| {
                seen.push(chunk.to_vec());
                GenerationControl::Continue
            })
            .unwrap();

        assert_eq!(seen.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(seen[1][0], 0.2);
        assert_eq!(audio.num_samples().unwrap(), 12);
    }

    #[test]
    fn stop_ends_generation_early() {
        let (bindings, state) = fake_bindings();
        *state.tts_chunks.lock() = vec![vec![0.1; 3]; 5];
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();

        let mut calls = 0;
        let audio = tts
            .generate_with_callback("hi", 1.0, 0, |_| {
                calls += 1;
                GenerationControl::from(calls < 2)
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(audio.num_samples().unwrap(), 6);
    }

    #[test]
    fn panicking_callback_stops_generation_without_unwinding_into_engine() {
        let (bindings, state) = fake_bindings();
        *state.tts_chunks.lock() = vec![vec![0.1; 3]; 4];
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();

        let audio = tts
            .generate_with_callback("hi", 1.0, 0, |_| -> GenerationControl { panic!("consumer bug") })
            .unwrap();
        assert_eq!(state.callbacks_delivered.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(audio.num_samples().unwrap(), 3);
    }

    #[test]
    fn progress_callback_reports_fraction() {
        let (bindings, state) = fake_bindings();
        *state.tts_chunks.lock() = vec![vec![0.5; 2]; 4];
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();

        let mut progress = Vec::new();
        tts.generate_with_progress_callback("hi", 1.0, 0, |_, p| {
            progress.push(p);
            GenerationControl::Continue
        })
        .unwrap();
        assert_eq!(progress, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn zipvoice_validates_arguments_before_the_engine() {
        let (bindings, state) = fake_bindings();
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();
        let prompt = [0.5f32; 8];

        let cases: [(&str, &[f32], i32, f32, i32); 5] = [
            ("  ", &prompt, 24_000, 1.0, 4),
            ("hi", &prompt, 24_000, 0.0, 4),
            ("hi", &prompt, 24_000, f32::NAN, 4),
            ("hi", &prompt, 24_000, 1.0, 0),
            ("hi", &prompt, 0, 1.0, 4),
        ];
        for (text, samples, rate, speed, steps) in cases {
            let err = tts
                .generate_with_zipvoice(text, "", samples, rate, speed, steps)
                .unwrap_err();
            assert!(matches!(err, BridgeError::InvalidArgument(_)), "{text:?} {rate} {speed} {steps}");
        }

        // Empty prompt with no rate is allowed.
        let audio = tts.generate_with_zipvoice("hi", "", &[], 0, 1.0, 4).unwrap();
        assert_eq!(audio.num_samples().unwrap(), 0);

        let audio = tts.generate_with_zipvoice("hi", "a prompt", &prompt, 24_000, 1.0, 4).unwrap();
        assert_eq!(audio.samples().unwrap(), vec![2.0; 8]);
        drop(audio);
        drop(tts);
        assert_eq!(state.live(), 0);
    }

    #[test]
    fn save_to_wave_file_reports_engine_status() {
        let (bindings, state) = fake_bindings();
        *state.tts_chunks.lock() = vec![vec![0.1; 10]];
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();
        let audio = tts.generate("hello", 1.0, 0).unwrap();

        assert!(audio.save_to_wave_file("out/generated.wav").unwrap());
        assert!(!audio.save_to_wave_file("/nonexistent/dir/x.wav").unwrap());
        assert_eq!(
            state.written_waves.lock().as_slice(),
            [("out/generated.wav".to_string(), 10, 22_050)]
        );
    }

    #[test]
    fn disposed_audio_fails_fast() {
        let (bindings, state) = fake_bindings();
        let mut tts = OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap();
        let audio = tts.generate("hello", 1.0, 0).unwrap();
        audio.dispose();
        assert!(matches!(audio.samples(), Err(BridgeError::UseAfterRelease(_))));
        assert!(state.destroyed.lock().contains(&"generated_audio"));
    }

    #[test]
    fn dispose_during_an_engine_call_defers_the_destroy() {
        let (bindings, state) = fake_bindings();
        let gate = Arc::new(std::sync::Barrier::new(2));
        *state.tts_call_gate.lock() = Some(Arc::clone(&gate));
        let tts = Arc::new(OfflineTts::with_bindings(bindings, &vits("m.onnx")).unwrap());

        let caller = {
            let tts = Arc::clone(&tts);
            std::thread::spawn(move || tts.sample_rate())
        };

        // The caller is now parked inside the engine call.
        gate.wait();
        tts.dispose();
        assert!(!state.destroyed.lock().contains(&"offline_tts"));
        assert!(matches!(tts.sample_rate(), Err(BridgeError::UseAfterRelease(_))));
        gate.wait();

        assert_eq!(caller.join().expect("caller panicked").unwrap(), 22_050);
        assert_eq!(state.calls_on_destroyed.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(state.destroyed.lock().as_slice(), ["offline_tts"]);
        assert!(matches!(tts.num_speakers(), Err(BridgeError::UseAfterRelease(_))));
        assert_eq!(state.live(), 0);
    }

    #[test]
    fn config_deserializes_sparse_json() {
        let cfg: OfflineTtsConfig = serde_json::from_str(
            r#"{"model":{"kokoro":{"model":"kokoro.onnx","voices":"voices.bin"},"num_threads":2}}"#,
        )
        .unwrap();
        assert_eq!(cfg.model.kokoro.model, "kokoro.onnx");
        assert_eq!(cfg.model.num_threads, 2);
        assert_eq!(cfg.model.provider, "cpu");
        assert_eq!(cfg.max_num_sentences, 1);
        assert!((cfg.model.vits.noise_scale - 0.667).abs() < f32::EPSILON);
    }
}
