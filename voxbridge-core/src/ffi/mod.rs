//! Engine entry points.
//!
//! One list of C symbols drives three expansions:
//!
//! ```text
//!   for_each_entry_point!
//!        │
//!        ├─► declare_engine_api   trait EngineApi (default: EntryPointMissing)
//!        ├─► impl_dynamic_api     DynamicApi   symbols resolved from a loaded library
//!        └─► impl_embedded_api    EmbeddedApi  symbols linked into the binary
//! ```
//!
//! Facades are written once against `&dyn EngineApi`; the router hands them
//! whichever table is active.

use std::ffi::{c_char, c_void};

use crate::error::{BridgeError, Result};

/// `-> T` in the entry-point list becomes `T`; no return becomes `()`.
macro_rules! ffi_ret {
    () => { () };
    ($t:ty) => { $t };
}

/// Invoke `$m!` with the full entry-point list.
///
/// Each line reads `fn rust_name = CSymbol(args) -> ret;`.
macro_rules! for_each_entry_point {
    ($m:ident) => {
        $m! {
            // version
            fn get_version_str = SherpaOnnxGetVersionStr() -> *const c_char;
            fn get_git_sha1 = SherpaOnnxGetGitSha1() -> *const c_char;
            fn get_git_date = SherpaOnnxGetGitDate() -> *const c_char;

            // circular buffer
            fn create_circular_buffer = SherpaOnnxCreateCircularBuffer(capacity: i32) -> *mut c_void;
            fn destroy_circular_buffer = SherpaOnnxDestroyCircularBuffer(buffer: *mut c_void);
            fn circular_buffer_push = SherpaOnnxCircularBufferPush(buffer: *mut c_void, p: *const f32, n: i32);
            fn circular_buffer_get = SherpaOnnxCircularBufferGet(buffer: *mut c_void, start_index: i32, n: i32) -> *const f32;
            fn circular_buffer_free = SherpaOnnxCircularBufferFree(p: *const f32);
            fn circular_buffer_pop = SherpaOnnxCircularBufferPop(buffer: *mut c_void, n: i32);
            fn circular_buffer_size = SherpaOnnxCircularBufferSize(buffer: *mut c_void) -> i32;
            fn circular_buffer_head = SherpaOnnxCircularBufferHead(buffer: *mut c_void) -> i32;
            fn circular_buffer_reset = SherpaOnnxCircularBufferReset(buffer: *mut c_void);

            // voice activity detection
            fn create_voice_activity_detector = SherpaOnnxCreateVoiceActivityDetector(config: *const SherpaOnnxVadModelConfig, buffer_size_in_seconds: f32) -> *mut c_void;
            fn destroy_voice_activity_detector = SherpaOnnxDestroyVoiceActivityDetector(vad: *mut c_void);
            fn vad_accept_waveform = SherpaOnnxVoiceActivityDetectorAcceptWaveform(vad: *mut c_void, samples: *const f32, n: i32);
            fn vad_empty = SherpaOnnxVoiceActivityDetectorEmpty(vad: *mut c_void) -> i32;
            fn vad_detected = SherpaOnnxVoiceActivityDetectorDetected(vad: *mut c_void) -> i32;
            fn vad_pop = SherpaOnnxVoiceActivityDetectorPop(vad: *mut c_void);
            fn vad_clear = SherpaOnnxVoiceActivityDetectorClear(vad: *mut c_void);
            fn vad_front = SherpaOnnxVoiceActivityDetectorFront(vad: *mut c_void) -> *const SherpaOnnxSpeechSegment;
            fn destroy_speech_segment = SherpaOnnxDestroySpeechSegment(segment: *const SherpaOnnxSpeechSegment);
            fn vad_reset = SherpaOnnxVoiceActivityDetectorReset(vad: *mut c_void);
            fn vad_flush = SherpaOnnxVoiceActivityDetectorFlush(vad: *mut c_void);

            // offline text-to-speech
            fn create_offline_tts = SherpaOnnxCreateOfflineTts(config: *const SherpaOnnxOfflineTtsConfig) -> *mut c_void;
            fn destroy_offline_tts = SherpaOnnxDestroyOfflineTts(tts: *mut c_void);
            fn offline_tts_sample_rate = SherpaOnnxOfflineTtsSampleRate(tts: *mut c_void) -> i32;
            fn offline_tts_num_speakers = SherpaOnnxOfflineTtsNumSpeakers(tts: *mut c_void) -> i32;
            fn offline_tts_generate = SherpaOnnxOfflineTtsGenerate(tts: *mut c_void, text: *const c_char, sid: i32, speed: f32) -> *const SherpaOnnxGeneratedAudio;
            fn offline_tts_generate_with_callback = SherpaOnnxOfflineTtsGenerateWithCallbackWithArg(tts: *mut c_void, text: *const c_char, sid: i32, speed: f32, callback: SherpaOnnxGeneratedAudioCallbackWithArg, arg: *mut c_void) -> *const SherpaOnnxGeneratedAudio;
            fn offline_tts_generate_with_progress_callback = SherpaOnnxOfflineTtsGenerateWithProgressCallbackWithArg(tts: *mut c_void, text: *const c_char, sid: i32, speed: f32, callback: SherpaOnnxGeneratedAudioProgressCallbackWithArg, arg: *mut c_void) -> *const SherpaOnnxGeneratedAudio;
            fn offline_tts_generate_with_zipvoice = SherpaOnnxOfflineTtsGenerateWithZipvoice(tts: *mut c_void, text: *const c_char, prompt_text: *const c_char, prompt_samples: *const f32, n_prompt: i32, prompt_sample_rate: i32, speed: f32, num_steps: i32) -> *const SherpaOnnxGeneratedAudio;
            fn destroy_generated_audio = SherpaOnnxDestroyOfflineTtsGeneratedAudio(audio: *const SherpaOnnxGeneratedAudio);
            fn write_wave = SherpaOnnxWriteWave(samples: *const f32, n: i32, sample_rate: i32, filename: *const c_char) -> i32;

            // speaker embedding extractor
            fn create_speaker_embedding_extractor = SherpaOnnxCreateSpeakerEmbeddingExtractor(config: *const SherpaOnnxSpeakerEmbeddingExtractorConfig) -> *mut c_void;
            fn destroy_speaker_embedding_extractor = SherpaOnnxDestroySpeakerEmbeddingExtractor(extractor: *mut c_void);
            fn speaker_embedding_extractor_dim = SherpaOnnxSpeakerEmbeddingExtractorDim(extractor: *mut c_void) -> i32;
            fn speaker_embedding_extractor_create_stream = SherpaOnnxSpeakerEmbeddingExtractorCreateStream(extractor: *mut c_void) -> *mut c_void;
            fn speaker_embedding_extractor_is_ready = SherpaOnnxSpeakerEmbeddingExtractorIsReady(extractor: *mut c_void, stream: *mut c_void) -> i32;
            fn speaker_embedding_extractor_compute_embedding = SherpaOnnxSpeakerEmbeddingExtractorComputeEmbedding(extractor: *mut c_void, stream: *mut c_void) -> *const f32;
            fn speaker_embedding_extractor_destroy_embedding = SherpaOnnxSpeakerEmbeddingExtractorDestroyEmbedding(v: *const f32);

            // online stream
            fn destroy_online_stream = SherpaOnnxDestroyOnlineStream(stream: *mut c_void);
            fn online_stream_accept_waveform = SherpaOnnxOnlineStreamAcceptWaveform(stream: *mut c_void, sample_rate: i32, samples: *const f32, n: i32);
            fn online_stream_input_finished = SherpaOnnxOnlineStreamInputFinished(stream: *mut c_void);

            // online (streaming) recognizer
            fn create_online_recognizer = SherpaOnnxCreateOnlineRecognizer(config: *const SherpaOnnxOnlineRecognizerConfig) -> *mut c_void;
            fn destroy_online_recognizer = SherpaOnnxDestroyOnlineRecognizer(recognizer: *mut c_void);
            fn create_online_stream = SherpaOnnxCreateOnlineStream(recognizer: *mut c_void) -> *mut c_void;
            fn is_online_stream_ready = SherpaOnnxIsOnlineStreamReady(recognizer: *mut c_void, stream: *mut c_void) -> i32;
            fn decode_online_stream = SherpaOnnxDecodeOnlineStream(recognizer: *mut c_void, stream: *mut c_void);
            fn decode_multiple_online_streams = SherpaOnnxDecodeMultipleOnlineStreams(recognizer: *mut c_void, streams: *const *mut c_void, n: i32);
            fn get_online_stream_result = SherpaOnnxGetOnlineStreamResult(recognizer: *mut c_void, stream: *mut c_void) -> *const SherpaOnnxOnlineRecognizerResult;
            fn destroy_online_recognizer_result = SherpaOnnxDestroyOnlineRecognizerResult(result: *const SherpaOnnxOnlineRecognizerResult);
            fn get_online_stream_result_as_json = SherpaOnnxGetOnlineStreamResultAsJson(recognizer: *mut c_void, stream: *mut c_void) -> *const c_char;
            fn destroy_online_stream_result_json = SherpaOnnxDestroyOnlineStreamResultJson(json: *const c_char);
            fn online_stream_reset = SherpaOnnxOnlineStreamReset(recognizer: *mut c_void, stream: *mut c_void);
            fn online_stream_is_endpoint = SherpaOnnxOnlineStreamIsEndpoint(recognizer: *mut c_void, stream: *mut c_void) -> i32;

            // offline (non-streaming) recognizer
            fn create_offline_recognizer = SherpaOnnxCreateOfflineRecognizer(config: *const SherpaOnnxOfflineRecognizerConfig) -> *mut c_void;
            fn offline_recognizer_set_config = SherpaOnnxOfflineRecognizerSetConfig(recognizer: *mut c_void, config: *const SherpaOnnxOfflineRecognizerConfig);
            fn destroy_offline_recognizer = SherpaOnnxDestroyOfflineRecognizer(recognizer: *mut c_void);
            fn create_offline_stream = SherpaOnnxCreateOfflineStream(recognizer: *mut c_void) -> *mut c_void;
            fn destroy_offline_stream = SherpaOnnxDestroyOfflineStream(stream: *mut c_void);
            fn accept_waveform_offline = SherpaOnnxAcceptWaveformOffline(stream: *mut c_void, sample_rate: i32, samples: *const f32, n: i32);
            fn decode_offline_stream = SherpaOnnxDecodeOfflineStream(recognizer: *mut c_void, stream: *mut c_void);
            fn decode_multiple_offline_streams = SherpaOnnxDecodeMultipleOfflineStreams(recognizer: *mut c_void, streams: *const *mut c_void, n: i32);
            fn get_offline_stream_result = SherpaOnnxGetOfflineStreamResult(stream: *mut c_void) -> *const SherpaOnnxOfflineRecognizerResult;
            fn destroy_offline_recognizer_result = SherpaOnnxDestroyOfflineRecognizerResult(result: *const SherpaOnnxOfflineRecognizerResult);
            fn get_offline_stream_result_as_json = SherpaOnnxGetOfflineStreamResultAsJson(stream: *mut c_void) -> *const c_char;
            fn destroy_offline_stream_result_json = SherpaOnnxDestroyOfflineStreamResultJson(json: *const c_char);

            // speaker embedding manager
            fn create_speaker_embedding_manager = SherpaOnnxCreateSpeakerEmbeddingManager(dim: i32) -> *mut c_void;
            fn destroy_speaker_embedding_manager = SherpaOnnxDestroySpeakerEmbeddingManager(manager: *mut c_void);
            fn speaker_embedding_manager_add = SherpaOnnxSpeakerEmbeddingManagerAdd(manager: *mut c_void, name: *const c_char, v: *const f32) -> i32;
            fn speaker_embedding_manager_add_list_flattened = SherpaOnnxSpeakerEmbeddingManagerAddListFlattened(manager: *mut c_void, name: *const c_char, v: *const f32, n: i32) -> i32;
            fn speaker_embedding_manager_remove = SherpaOnnxSpeakerEmbeddingManagerRemove(manager: *mut c_void, name: *const c_char) -> i32;
            fn speaker_embedding_manager_search = SherpaOnnxSpeakerEmbeddingManagerSearch(manager: *mut c_void, v: *const f32, threshold: f32) -> *const c_char;
            fn speaker_embedding_manager_free_search = SherpaOnnxSpeakerEmbeddingManagerFreeSearch(name: *const c_char);
            fn speaker_embedding_manager_verify = SherpaOnnxSpeakerEmbeddingManagerVerify(manager: *mut c_void, name: *const c_char, v: *const f32, threshold: f32) -> i32;
            fn speaker_embedding_manager_contains = SherpaOnnxSpeakerEmbeddingManagerContains(manager: *mut c_void, name: *const c_char) -> i32;
            fn speaker_embedding_manager_num_speakers = SherpaOnnxSpeakerEmbeddingManagerNumSpeakers(manager: *mut c_void) -> i32;
            fn speaker_embedding_manager_get_all_speakers = SherpaOnnxSpeakerEmbeddingManagerGetAllSpeakers(manager: *mut c_void) -> *const *const c_char;
            fn speaker_embedding_manager_free_all_speakers = SherpaOnnxSpeakerEmbeddingManagerFreeAllSpeakers(names: *const *const c_char);
        }
    };
}

macro_rules! declare_engine_api {
    ($(fn $name:ident = $sym:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        /// One table of engine entry points.
        ///
        /// Every method is a direct call of the C symbol of the same name.
        /// A table that lacks a symbol returns
        /// [`BridgeError::EntryPointMissing`]; that is also the default body,
        /// so in-process fakes override only what they exercise.
        ///
        /// # Safety
        ///
        /// Each method carries the contract of its C function: handles must
        /// be live objects of the matching kind and pointer/length pairs must
        /// describe valid memory for the duration of the call.
        pub trait EngineApi: Send + Sync {
            /// `"embedded"`, `"dynamic"`, or a fake's name. Used in errors and logs.
            fn binding_name(&self) -> &'static str;

            $(
                #[allow(unused_variables, clippy::too_many_arguments)]
                unsafe fn $name(&self, $($arg: $ty),*) -> Result<ffi_ret!($($ret)?)> {
                    Err(BridgeError::EntryPointMissing {
                        binding: self.binding_name(),
                        symbol: stringify!($sym),
                    })
                }
            )*
        }

        /// Every C symbol the tables resolve, in declaration order.
        pub const ENTRY_POINTS: &[&str] = &[$(stringify!($sym)),*];
    };
}

pub mod dynamic;
pub mod embedded;
pub mod types;

pub use dynamic::DynamicApi;
pub use embedded::EmbeddedApi;
pub use types::*;

for_each_entry_point!(declare_engine_api);

/// Borrow an engine-owned C string as an owned `String`. `None` for null.
///
/// # Safety
///
/// `p` must be null or point at a NUL-terminated string that stays valid for
/// the duration of the call.
pub unsafe fn copy_c_string(p: *const c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    Some(unsafe { std::ffi::CStr::from_ptr(p) }.to_string_lossy().into_owned())
}

/// Copy an engine-owned float array. Empty for null or non-positive `n`.
///
/// # Safety
///
/// `p` must be null or point at `n` readable floats.
pub unsafe fn copy_f32_slice(p: *const f32, n: i32) -> Vec<f32> {
    if p.is_null() || n <= 0 {
        return Vec::new();
    }
    // SAFETY: non-null, `n` elements per the caller's contract.
    unsafe { std::slice::from_raw_parts(p, n as usize) }.to_vec()
}

/// Copy `n` engine-owned C strings. Null entries become empty strings; a
/// null array or non-positive `n` gives an empty vector.
///
/// # Safety
///
/// `p` must be null or point at `n` readable string pointers, each null or
/// NUL-terminated.
pub unsafe fn copy_c_string_array(p: *const *const c_char, n: i32) -> Vec<String> {
    if p.is_null() || n <= 0 {
        return Vec::new();
    }
    // SAFETY: non-null, `n` elements per the caller's contract.
    let items = unsafe { std::slice::from_raw_parts(p, n as usize) };
    items
        .iter()
        .map(|&s| unsafe { copy_c_string(s) }.unwrap_or_default())
        .collect()
}
