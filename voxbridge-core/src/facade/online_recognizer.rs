//! Streaming speech recognition.
//!
//! ```text
//!   create_stream ─► accept_waveform ─► while is_ready { decode } ─► get_result
//!                                                   │
//!                                  is_endpoint ─► reset (next utterance)
//! ```

use std::ffi::c_void;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::{
        copy_c_string, copy_c_string_array, copy_f32_slice, SherpaOnnxOnlineCtcFstDecoderConfig,
        SherpaOnnxOnlineModelConfig, SherpaOnnxOnlineNemoCtcModelConfig, SherpaOnnxOnlineParaformerModelConfig,
        SherpaOnnxOnlineRecognizerConfig, SherpaOnnxOnlineRecognizerResult, SherpaOnnxOnlineToneCtcModelConfig,
        SherpaOnnxOnlineTransducerModelConfig, SherpaOnnxOnlineZipformer2CtcModelConfig,
    },
    handle::{with_all, NativeHandle},
};

use super::recognizer::{
    FeatureConfig, HomophoneReplacerConfig, HotwordsConfig, ModelFileConfig, TransducerModelConfig,
};
use super::{len_i32, own_handle, CStringArena, OnlineStream};

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineParaformerModelConfig {
    pub encoder: String,
    pub decoder: String,
}

/// Fill in exactly one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineModelConfig {
    pub transducer: TransducerModelConfig,
    pub paraformer: OnlineParaformerModelConfig,
    pub zipformer2_ctc: ModelFileConfig,
    pub nemo_ctc: ModelFileConfig,
    pub t_one_ctc: ModelFileConfig,
    pub tokens: String,
    pub num_threads: i32,
    pub provider: String,
    pub debug: bool,
    /// Empty lets the engine read the type from model metadata.
    pub model_type: String,
    /// `cjkchar`, `bpe` or `cjkchar+bpe`; only used with hotwords.
    pub modeling_unit: String,
    pub bpe_vocab: String,
}

impl Default for OnlineModelConfig {
    fn default() -> Self {
        Self {
            transducer: TransducerModelConfig::default(),
            paraformer: OnlineParaformerModelConfig::default(),
            zipformer2_ctc: ModelFileConfig::default(),
            nemo_ctc: ModelFileConfig::default(),
            t_one_ctc: ModelFileConfig::default(),
            tokens: String::new(),
            num_threads: 1,
            provider: "cpu".into(),
            debug: false,
            model_type: String::new(),
            modeling_unit: "cjkchar".into(),
            bpe_vocab: String::new(),
        }
    }
}

/// Endpoint rules. An endpoint fires when any enabled rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub enable: bool,
    /// Trailing silence, in seconds, after which an utterance with no
    /// decoded text ends.
    pub rule1_min_trailing_silence: f32,
    /// Trailing silence, in seconds, after decoded text.
    pub rule2_min_trailing_silence: f32,
    /// Utterance length, in seconds, that always ends it.
    pub rule3_min_utterance_length: f32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enable: true,
            rule1_min_trailing_silence: 2.4,
            rule2_min_trailing_silence: 1.2,
            rule3_min_utterance_length: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineCtcFstDecoderConfig {
    pub graph: String,
    pub max_active: i32,
}

impl Default for OnlineCtcFstDecoderConfig {
    fn default() -> Self {
        Self {
            graph: String::new(),
            max_active: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineRecognizerConfig {
    pub feat_config: FeatureConfig,
    pub model_config: OnlineModelConfig,
    /// `greedy_search` or `modified_beam_search`.
    pub decoding_method: String,
    pub max_active_paths: i32,
    pub endpoint: EndpointConfig,
    pub hotwords: HotwordsConfig,
    pub ctc_fst_decoder_config: OnlineCtcFstDecoderConfig,
    pub rule_fsts: String,
    pub rule_fars: String,
    pub blank_penalty: f32,
    pub hr: HomophoneReplacerConfig,
}

impl Default for OnlineRecognizerConfig {
    fn default() -> Self {
        Self {
            feat_config: FeatureConfig::default(),
            model_config: OnlineModelConfig::default(),
            decoding_method: "greedy_search".into(),
            max_active_paths: 4,
            endpoint: EndpointConfig::default(),
            hotwords: HotwordsConfig::default(),
            ctc_fst_decoder_config: OnlineCtcFstDecoderConfig::default(),
            rule_fsts: String::new(),
            rule_fars: String::new(),
            blank_penalty: 0.0,
            hr: HomophoneReplacerConfig::default(),
        }
    }
}

impl OnlineRecognizerConfig {
    fn lower(&self, a: &mut CStringArena) -> Result<SherpaOnnxOnlineRecognizerConfig> {
        let m = &self.model_config;
        let e = &self.endpoint;
        Ok(SherpaOnnxOnlineRecognizerConfig {
            feat_config: self.feat_config.lower(),
            model_config: SherpaOnnxOnlineModelConfig {
                transducer: SherpaOnnxOnlineTransducerModelConfig {
                    encoder: a.ptr(&m.transducer.encoder, "transducer.encoder")?,
                    decoder: a.ptr(&m.transducer.decoder, "transducer.decoder")?,
                    joiner: a.ptr(&m.transducer.joiner, "transducer.joiner")?,
                },
                paraformer: SherpaOnnxOnlineParaformerModelConfig {
                    encoder: a.ptr(&m.paraformer.encoder, "paraformer.encoder")?,
                    decoder: a.ptr(&m.paraformer.decoder, "paraformer.decoder")?,
                },
                zipformer2_ctc: SherpaOnnxOnlineZipformer2CtcModelConfig {
                    model: a.ptr(&m.zipformer2_ctc.model, "zipformer2_ctc.model")?,
                },
                tokens: a.ptr(&m.tokens, "tokens")?,
                num_threads: m.num_threads,
                provider: a.ptr(&m.provider, "provider")?,
                debug: m.debug as i32,
                model_type: a.ptr(&m.model_type, "model_type")?,
                modeling_unit: a.ptr(&m.modeling_unit, "modeling_unit")?,
                bpe_vocab: a.ptr(&m.bpe_vocab, "bpe_vocab")?,
                tokens_buf: std::ptr::null(),
                tokens_buf_size: 0,
                nemo_ctc: SherpaOnnxOnlineNemoCtcModelConfig {
                    model: a.ptr(&m.nemo_ctc.model, "nemo_ctc.model")?,
                },
                t_one_ctc: SherpaOnnxOnlineToneCtcModelConfig {
                    model: a.ptr(&m.t_one_ctc.model, "t_one_ctc.model")?,
                },
            },
            decoding_method: a.ptr(&self.decoding_method, "decoding_method")?,
            max_active_paths: self.max_active_paths,
            enable_endpoint: e.enable as i32,
            rule1_min_trailing_silence: e.rule1_min_trailing_silence,
            rule2_min_trailing_silence: e.rule2_min_trailing_silence,
            rule3_min_utterance_length: e.rule3_min_utterance_length,
            hotwords_file: a.ptr(&self.hotwords.file, "hotwords.file")?,
            hotwords_score: self.hotwords.score,
            ctc_fst_decoder_config: SherpaOnnxOnlineCtcFstDecoderConfig {
                graph: a.ptr(&self.ctc_fst_decoder_config.graph, "ctc_fst_decoder_config.graph")?,
                max_active: self.ctc_fst_decoder_config.max_active,
            },
            rule_fsts: a.ptr(&self.rule_fsts, "rule_fsts")?,
            rule_fars: a.ptr(&self.rule_fars, "rule_fars")?,
            blank_penalty: self.blank_penalty,
            hotwords_buf: std::ptr::null(),
            hotwords_buf_size: 0,
            hr: self.hr.lower(a)?,
        })
    }
}

// ── Result ───────────────────────────────────────────────────────────────────

/// Text decoded so far on one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OnlineRecognizerResult {
    pub text: String,
    pub tokens: Vec<String>,
    /// Start time of each token, in seconds. Empty if the model has none.
    pub timestamps: Vec<f32>,
}

impl OnlineRecognizerResult {
    /// # Safety
    ///
    /// `r` must be a live result struct returned by the engine.
    unsafe fn copy_from(r: &SherpaOnnxOnlineRecognizerResult) -> Self {
        unsafe {
            Self {
                text: copy_c_string(r.text).unwrap_or_default(),
                tokens: copy_c_string_array(r.tokens_arr, r.count),
                timestamps: copy_f32_slice(r.timestamps, r.count),
            }
        }
    }
}

// ── Recognizer ───────────────────────────────────────────────────────────────

pub struct OnlineRecognizer {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl OnlineRecognizer {
    pub fn new(config: &OnlineRecognizerConfig) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), config)
    }

    pub fn with_bindings(bindings: Arc<Bindings>, config: &OnlineRecognizerConfig) -> Result<Self> {
        let mut arena = CStringArena::new();
        let c_config = config.lower(&mut arena)?;
        let raw = bindings.call(|api| unsafe { api.create_online_recognizer(&c_config) })?;
        drop(arena);

        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateOnlineRecognizer", |api, p| unsafe {
            api.destroy_online_recognizer(p)
        })?;
        Ok(Self { bindings, handle })
    }

    pub fn create_stream(&self) -> Result<OnlineStream> {
        let raw = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.create_online_stream(p) }))?;
        OnlineStream::from_raw(&self.bindings, raw, "SherpaOnnxCreateOnlineStream")
    }

    /// Run `f` with the recognizer and stream pointers both held open.
    fn with_stream<T>(
        &self,
        stream: &OnlineStream,
        f: impl FnOnce(*mut c_void, *mut c_void) -> Result<T>,
    ) -> Result<T> {
        self.handle.with(|p| stream.handle().with(|s| f(p, s)))
    }

    /// `true` while the stream holds enough frames for another `decode`.
    pub fn is_ready(&self, stream: &OnlineStream) -> Result<bool> {
        let ready = self.with_stream(stream, |p, s| {
            self.bindings.call(|api| unsafe { api.is_online_stream_ready(p, s) })
        })?;
        Ok(ready != 0)
    }

    /// Decode the frames available now. Call only when [`is_ready`](Self::is_ready).
    pub fn decode(&self, stream: &OnlineStream) -> Result<()> {
        self.with_stream(stream, |p, s| {
            self.bindings.call(|api| unsafe { api.decode_online_stream(p, s) })
        })
    }

    /// Decode several ready streams in one batch.
    pub fn decode_multiple(&self, streams: &[&OnlineStream]) -> Result<()> {
        if streams.is_empty() {
            return Ok(());
        }
        let n = len_i32(streams.len(), "stream count")?;
        let mut handles = Vec::with_capacity(streams.len() + 1);
        handles.push(&self.handle);
        handles.extend(streams.iter().map(|s| s.handle()));
        debug!(streams = n, "batched online decode");
        with_all(&handles, |ptrs| {
            let (p, rest) = (ptrs[0], &ptrs[1..]);
            self.bindings
                .call(|api| unsafe { api.decode_multiple_online_streams(p, rest.as_ptr(), n) })
        })
    }

    pub fn get_result(&self, stream: &OnlineStream) -> Result<OnlineRecognizerResult> {
        self.with_stream(stream, |p, s| {
            self.bindings.call(|api| unsafe {
                let r = api.get_online_stream_result(p, s)?;
                if r.is_null() {
                    return Err(BridgeError::Generation("SherpaOnnxGetOnlineStreamResult returned no result".into()));
                }
                let out = OnlineRecognizerResult::copy_from(&*r);
                api.destroy_online_recognizer_result(r)?;
                Ok(out)
            })
        })
    }

    /// The engine's own JSON rendering of the current result.
    pub fn get_result_json(&self, stream: &OnlineStream) -> Result<String> {
        self.with_stream(stream, |p, s| {
            self.bindings.call(|api| unsafe {
                let json = api.get_online_stream_result_as_json(p, s)?;
                let out = copy_c_string(json).ok_or_else(|| {
                    BridgeError::Generation("SherpaOnnxGetOnlineStreamResultAsJson returned no result".into())
                })?;
                api.destroy_online_stream_result_json(json)?;
                Ok(out)
            })
        })
    }

    /// `true` once an endpoint rule matched. Follow with [`reset`](Self::reset).
    pub fn is_endpoint(&self, stream: &OnlineStream) -> Result<bool> {
        let endpoint = self.with_stream(stream, |p, s| {
            self.bindings.call(|api| unsafe { api.online_stream_is_endpoint(p, s) })
        })?;
        Ok(endpoint != 0)
    }

    /// Start a new utterance on `stream`. Clears the endpoint.
    pub fn reset(&self, stream: &OnlineStream) -> Result<()> {
        self.with_stream(stream, |p, s| {
            self.bindings.call(|api| unsafe { api.online_stream_reset(p, s) })
        })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for OnlineRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnlineRecognizer")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
