//! Non-streaming speech recognition: one stream per utterance, decoded whole.

use std::ffi::c_void;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::{
        copy_c_string, copy_c_string_array, copy_f32_slice, SherpaOnnxOfflineCanaryModelConfig,
        SherpaOnnxOfflineDolphinModelConfig, SherpaOnnxOfflineFireRedAsrModelConfig, SherpaOnnxOfflineLMConfig,
        SherpaOnnxOfflineModelConfig, SherpaOnnxOfflineMoonshineModelConfig,
        SherpaOnnxOfflineNemoEncDecCtcModelConfig, SherpaOnnxOfflineParaformerModelConfig,
        SherpaOnnxOfflineRecognizerConfig, SherpaOnnxOfflineRecognizerResult,
        SherpaOnnxOfflineSenseVoiceModelConfig, SherpaOnnxOfflineTdnnModelConfig,
        SherpaOnnxOfflineTransducerModelConfig, SherpaOnnxOfflineWenetCtcModelConfig,
        SherpaOnnxOfflineWhisperModelConfig, SherpaOnnxOfflineZipformerCtcModelConfig,
    },
    handle::{with_all, NativeHandle},
};

use super::recognizer::{
    FeatureConfig, HomophoneReplacerConfig, HotwordsConfig, ModelFileConfig, TransducerModelConfig,
};
use super::{len_i32, own_handle, CStringArena};

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineWhisperModelConfig {
    pub encoder: String,
    pub decoder: String,
    /// Empty for automatic language detection.
    pub language: String,
    /// `transcribe` or `translate`.
    pub task: String,
    /// `-1` uses the model's default.
    pub tail_paddings: i32,
}

impl Default for OfflineWhisperModelConfig {
    fn default() -> Self {
        Self {
            encoder: String::new(),
            decoder: String::new(),
            language: String::new(),
            task: "transcribe".into(),
            tail_paddings: -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineSenseVoiceModelConfig {
    pub model: String,
    pub language: String,
    /// Inverse text normalisation (digits, punctuation).
    pub use_itn: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineMoonshineModelConfig {
    pub preprocessor: String,
    pub encoder: String,
    pub uncached_decoder: String,
    pub cached_decoder: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineEncoderDecoderConfig {
    pub encoder: String,
    pub decoder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineCanaryModelConfig {
    pub encoder: String,
    pub decoder: String,
    pub src_lang: String,
    pub tgt_lang: String,
    /// Punctuation and casing in the output.
    pub use_pnc: bool,
}

impl Default for OfflineCanaryModelConfig {
    fn default() -> Self {
        Self {
            encoder: String::new(),
            decoder: String::new(),
            src_lang: "en".into(),
            tgt_lang: "en".into(),
            use_pnc: true,
        }
    }
}

/// Fill in exactly one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineModelConfig {
    pub transducer: TransducerModelConfig,
    pub paraformer: ModelFileConfig,
    pub nemo_ctc: ModelFileConfig,
    pub whisper: OfflineWhisperModelConfig,
    pub tdnn: ModelFileConfig,
    pub sense_voice: OfflineSenseVoiceModelConfig,
    pub moonshine: OfflineMoonshineModelConfig,
    pub fire_red_asr: OfflineEncoderDecoderConfig,
    pub dolphin: ModelFileConfig,
    pub zipformer_ctc: ModelFileConfig,
    pub canary: OfflineCanaryModelConfig,
    pub wenet_ctc: ModelFileConfig,
    pub telespeech_ctc: String,
    pub tokens: String,
    pub num_threads: i32,
    pub debug: bool,
    pub provider: String,
    pub model_type: String,
    pub modeling_unit: String,
    pub bpe_vocab: String,
}

impl Default for OfflineModelConfig {
    fn default() -> Self {
        Self {
            transducer: TransducerModelConfig::default(),
            paraformer: ModelFileConfig::default(),
            nemo_ctc: ModelFileConfig::default(),
            whisper: OfflineWhisperModelConfig::default(),
            tdnn: ModelFileConfig::default(),
            sense_voice: OfflineSenseVoiceModelConfig::default(),
            moonshine: OfflineMoonshineModelConfig::default(),
            fire_red_asr: OfflineEncoderDecoderConfig::default(),
            dolphin: ModelFileConfig::default(),
            zipformer_ctc: ModelFileConfig::default(),
            canary: OfflineCanaryModelConfig::default(),
            wenet_ctc: ModelFileConfig::default(),
            telespeech_ctc: String::new(),
            tokens: String::new(),
            num_threads: 1,
            debug: false,
            provider: "cpu".into(),
            model_type: String::new(),
            modeling_unit: "cjkchar".into(),
            bpe_vocab: String::new(),
        }
    }
}

/// Optional n-gram language model used during beam search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineLmConfig {
    pub model: String,
    pub scale: f32,
}

impl Default for OfflineLmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineRecognizerConfig {
    pub feat_config: FeatureConfig,
    pub model_config: OfflineModelConfig,
    pub lm_config: OfflineLmConfig,
    pub decoding_method: String,
    pub max_active_paths: i32,
    pub hotwords: HotwordsConfig,
    pub rule_fsts: String,
    pub rule_fars: String,
    pub blank_penalty: f32,
    pub hr: HomophoneReplacerConfig,
}

impl Default for OfflineRecognizerConfig {
    fn default() -> Self {
        Self {
            feat_config: FeatureConfig::default(),
            model_config: OfflineModelConfig::default(),
            lm_config: OfflineLmConfig::default(),
            decoding_method: "greedy_search".into(),
            max_active_paths: 4,
            hotwords: HotwordsConfig::default(),
            rule_fsts: String::new(),
            rule_fars: String::new(),
            blank_penalty: 0.0,
            hr: HomophoneReplacerConfig::default(),
        }
    }
}

impl OfflineRecognizerConfig {
    fn lower(&self, a: &mut CStringArena) -> Result<SherpaOnnxOfflineRecognizerConfig> {
        let m = &self.model_config;
        let (w, sv, ms, c) = (&m.whisper, &m.sense_voice, &m.moonshine, &m.canary);
        Ok(SherpaOnnxOfflineRecognizerConfig {
            feat_config: self.feat_config.lower(),
            model_config: SherpaOnnxOfflineModelConfig {
                transducer: SherpaOnnxOfflineTransducerModelConfig {
                    encoder: a.ptr(&m.transducer.encoder, "transducer.encoder")?,
                    decoder: a.ptr(&m.transducer.decoder, "transducer.decoder")?,
                    joiner: a.ptr(&m.transducer.joiner, "transducer.joiner")?,
                },
                paraformer: SherpaOnnxOfflineParaformerModelConfig {
                    model: a.ptr(&m.paraformer.model, "paraformer.model")?,
                },
                nemo_ctc: SherpaOnnxOfflineNemoEncDecCtcModelConfig {
                    model: a.ptr(&m.nemo_ctc.model, "nemo_ctc.model")?,
                },
                whisper: SherpaOnnxOfflineWhisperModelConfig {
                    encoder: a.ptr(&w.encoder, "whisper.encoder")?,
                    decoder: a.ptr(&w.decoder, "whisper.decoder")?,
                    language: a.ptr(&w.language, "whisper.language")?,
                    task: a.ptr(&w.task, "whisper.task")?,
                    tail_paddings: w.tail_paddings,
                },
                tdnn: SherpaOnnxOfflineTdnnModelConfig {
                    model: a.ptr(&m.tdnn.model, "tdnn.model")?,
                },
                tokens: a.ptr(&m.tokens, "tokens")?,
                num_threads: m.num_threads,
                debug: m.debug as i32,
                provider: a.ptr(&m.provider, "provider")?,
                model_type: a.ptr(&m.model_type, "model_type")?,
                modeling_unit: a.ptr(&m.modeling_unit, "modeling_unit")?,
                bpe_vocab: a.ptr(&m.bpe_vocab, "bpe_vocab")?,
                telespeech_ctc: a.ptr(&m.telespeech_ctc, "telespeech_ctc")?,
                sense_voice: SherpaOnnxOfflineSenseVoiceModelConfig {
                    model: a.ptr(&sv.model, "sense_voice.model")?,
                    language: a.ptr(&sv.language, "sense_voice.language")?,
                    use_itn: sv.use_itn as i32,
                },
                moonshine: SherpaOnnxOfflineMoonshineModelConfig {
                    preprocessor: a.ptr(&ms.preprocessor, "moonshine.preprocessor")?,
                    encoder: a.ptr(&ms.encoder, "moonshine.encoder")?,
                    uncached_decoder: a.ptr(&ms.uncached_decoder, "moonshine.uncached_decoder")?,
                    cached_decoder: a.ptr(&ms.cached_decoder, "moonshine.cached_decoder")?,
                },
                fire_red_asr: SherpaOnnxOfflineFireRedAsrModelConfig {
                    encoder: a.ptr(&m.fire_red_asr.encoder, "fire_red_asr.encoder")?,
                    decoder: a.ptr(&m.fire_red_asr.decoder, "fire_red_asr.decoder")?,
                },
                dolphin: SherpaOnnxOfflineDolphinModelConfig {
                    model: a.ptr(&m.dolphin.model, "dolphin.model")?,
                },
                zipformer_ctc: SherpaOnnxOfflineZipformerCtcModelConfig {
                    model: a.ptr(&m.zipformer_ctc.model, "zipformer_ctc.model")?,
                },
                canary: SherpaOnnxOfflineCanaryModelConfig {
                    encoder: a.ptr(&c.encoder, "canary.encoder")?,
                    decoder: a.ptr(&c.decoder, "canary.decoder")?,
                    src_lang: a.ptr(&c.src_lang, "canary.src_lang")?,
                    tgt_lang: a.ptr(&c.tgt_lang, "canary.tgt_lang")?,
                    use_pnc: c.use_pnc as i32,
                },
                wenet_ctc: SherpaOnnxOfflineWenetCtcModelConfig {
                    model: a.ptr(&m.wenet_ctc.model, "wenet_ctc.model")?,
                },
            },
            lm_config: SherpaOnnxOfflineLMConfig {
                model: a.ptr(&self.lm_config.model, "lm_config.model")?,
                scale: self.lm_config.scale,
            },
            decoding_method: a.ptr(&self.decoding_method, "decoding_method")?,
            max_active_paths: self.max_active_paths,
            hotwords_file: a.ptr(&self.hotwords.file, "hotwords.file")?,
            hotwords_score: self.hotwords.score,
            rule_fsts: a.ptr(&self.rule_fsts, "rule_fsts")?,
            rule_fars: a.ptr(&self.rule_fars, "rule_fars")?,
            blank_penalty: self.blank_penalty,
            hr: self.hr.lower(a)?,
        })
    }
}

// ── Result ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OfflineRecognizerResult {
    pub text: String,
    pub tokens: Vec<String>,
    /// Start time of each token, in seconds. Empty if the model has none.
    pub timestamps: Vec<f32>,
    /// Detected language, for models that report one.
    pub lang: String,
    pub emotion: String,
    pub event: String,
}

impl OfflineRecognizerResult {
    /// # Safety
    ///
    /// `r` must be a live result struct returned by the engine.
    unsafe fn copy_from(r: &SherpaOnnxOfflineRecognizerResult) -> Self {
        unsafe {
            Self {
                text: copy_c_string(r.text).unwrap_or_default(),
                tokens: copy_c_string_array(r.tokens_arr, r.count),
                timestamps: copy_f32_slice(r.timestamps, r.count),
                lang: copy_c_string(r.lang).unwrap_or_default(),
                emotion: copy_c_string(r.emotion).unwrap_or_default(),
                event: copy_c_string(r.event).unwrap_or_default(),
            }
        }
    }
}

// ── Stream ───────────────────────────────────────────────────────────────────

/// Audio of one utterance. Created by [`OfflineRecognizer::create_stream`];
/// holds its result after decoding.
pub struct OfflineStream {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl OfflineStream {
    pub fn accept_waveform(&mut self, sample_rate: i32, samples: &[f32]) -> Result<()> {
        if sample_rate <= 0 {
            return Err(BridgeError::InvalidArgument(format!("sample rate must be > 0, got {sample_rate}")));
        }
        let n = len_i32(samples.len(), "samples")?;
        self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.accept_waveform_offline(p, sample_rate, samples.as_ptr(), n) })
        })
    }

    /// Result of the last decode; empty before any.
    pub fn get_result(&self) -> Result<OfflineRecognizerResult> {
        self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                let r = api.get_offline_stream_result(p)?;
                if r.is_null() {
                    return Err(BridgeError::Generation("SherpaOnnxGetOfflineStreamResult returned no result".into()));
                }
                let out = OfflineRecognizerResult::copy_from(&*r);
                api.destroy_offline_recognizer_result(r)?;
                Ok(out)
            })
        })
    }

    /// The engine's own JSON rendering of the result.
    pub fn get_result_json(&self) -> Result<String> {
        self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                let json = api.get_offline_stream_result_as_json(p)?;
                let out = copy_c_string(json).ok_or_else(|| {
                    BridgeError::Generation("SherpaOnnxGetOfflineStreamResultAsJson returned no result".into())
                })?;
                api.destroy_offline_stream_result_json(json)?;
                Ok(out)
            })
        })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for OfflineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineStream")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ── Recognizer ───────────────────────────────────────────────────────────────

pub struct OfflineRecognizer {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl OfflineRecognizer {
    pub fn new(config: &OfflineRecognizerConfig) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), config)
    }

    pub fn with_bindings(bindings: Arc<Bindings>, config: &OfflineRecognizerConfig) -> Result<Self> {
        let mut arena = CStringArena::new();
        let c_config = config.lower(&mut arena)?;
        let raw = bindings.call(|api| unsafe { api.create_offline_recognizer(&c_config) })?;
        drop(arena);

        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateOfflineRecognizer", |api, p| unsafe {
            api.destroy_offline_recognizer(p)
        })?;
        Ok(Self { bindings, handle })
    }

    /// Swap decoding settings (method, hotwords, LM scale) on a live recognizer.
    /// Model files cannot change this way.
    pub fn set_config(&self, config: &OfflineRecognizerConfig) -> Result<()> {
        let mut arena = CStringArena::new();
        let c_config = config.lower(&mut arena)?;
        self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.offline_recognizer_set_config(p, &c_config) })
        })
    }

    pub fn create_stream(&self) -> Result<OfflineStream> {
        let raw = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.create_offline_stream(p) }))?;
        let handle = own_handle(&self.bindings, raw, "SherpaOnnxCreateOfflineStream", |api, p| unsafe {
            api.destroy_offline_stream(p)
        })?;
        Ok(OfflineStream {
            bindings: Arc::clone(&self.bindings),
            handle,
        })
    }

    pub fn decode(&self, stream: &OfflineStream) -> Result<()> {
        self.handle.with(|p| {
            stream.handle.with(|s: *mut c_void| {
                self.bindings.call(|api| unsafe { api.decode_offline_stream(p, s) })
            })
        })
    }

    /// Decode several streams in one batch.
    pub fn decode_multiple(&self, streams: &[&OfflineStream]) -> Result<()> {
        if streams.is_empty() {
            return Ok(());
        }
        let n = len_i32(streams.len(), "stream count")?;
        let mut handles = Vec::with_capacity(streams.len() + 1);
        handles.push(&self.handle);
        handles.extend(streams.iter().map(|s| &s.handle));
        debug!(streams = n, "batched offline decode");
        with_all(&handles, |ptrs| {
            let (p, rest) = (ptrs[0], &ptrs[1..]);
            self.bindings
                .call(|api| unsafe { api.decode_multiple_offline_streams(p, rest.as_ptr(), n) })
        })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for OfflineRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineRecognizer")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
