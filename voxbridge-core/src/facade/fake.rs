//! In-process stand-in for the engine, used by facade tests.
//!
//! Objects are boxed Rust values handed out as raw pointers; `live` counts
//! every allocation not yet returned, so tests can assert nothing leaked.

use std::collections::{HashMap, VecDeque};
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use crate::binding::{BindingMode, BindingRouter, Bindings};
use crate::error::Result;
use crate::ffi::types::*;
use crate::ffi::EngineApi;

/// Samples the fake recognizers turn into one token.
pub(crate) const FAKE_FRAME: usize = 4;

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub live: AtomicIsize,
    pub destroyed: Mutex<Vec<&'static str>>,
    pub last_tts_model: Mutex<Option<String>>,
    pub last_vad_window: Mutex<Option<i32>>,
    pub written_waves: Mutex<Vec<(String, usize, i32)>>,
    pub callbacks_delivered: AtomicUsize,
    /// Chunks the fake synthesizer emits, in order.
    pub tts_chunks: Mutex<Vec<Vec<f32>>>,
    /// When set, `SherpaOnnxOfflineTtsSampleRate` meets this barrier on entry
    /// and again before it reads the synthesizer.
    pub tts_call_gate: Mutex<Option<Arc<Barrier>>>,
    /// Calls that reached an object after its destroy had already run.
    pub calls_on_destroyed: AtomicUsize,
    /// `(tokens, decoding_method)` of the last recognizer created.
    pub last_asr_config: Mutex<Option<(String, String)>>,
    /// Float arrays handed out, keyed by address, so `free` can rebuild the box.
    arrays: Mutex<HashMap<usize, usize>>,
}

impl FakeState {
    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    fn alloc<T>(&self, value: T) -> *mut c_void {
        self.live.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(value)) as *mut c_void
    }

    unsafe fn free<T>(&self, p: *mut c_void, kind: &'static str) {
        if p.is_null() {
            return;
        }
        drop(unsafe { Box::from_raw(p as *mut T) });
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.destroyed.lock().push(kind);
    }

    fn alloc_floats(&self, v: Vec<f32>) -> *const f32 {
        let len = v.len();
        let p = Box::into_raw(v.into_boxed_slice()) as *mut f32;
        self.arrays.lock().insert(p as usize, len);
        self.live.fetch_add(1, Ordering::SeqCst);
        p
    }

    unsafe fn free_floats(&self, p: *const f32) {
        if p.is_null() {
            return;
        }
        let len = self
            .arrays
            .lock()
            .remove(&(p as usize))
            .expect("freeing an array the fake never handed out");
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(p as *mut f32, len)) });
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn alloc_audio(&self, samples: Vec<f32>, sample_rate: i32) -> *const SherpaOnnxGeneratedAudio {
        let n = samples.len() as i32;
        let samples = self.alloc_floats(samples);
        self.alloc(SherpaOnnxGeneratedAudio { samples, n, sample_rate }) as *const _
    }
}

#[derive(Default)]
struct FakeRing {
    samples: VecDeque<f32>,
    head: i32,
}

struct FakeTts {
    sample_rate: i32,
}

#[derive(Default)]
struct FakeVad {
    segments: VecDeque<(i32, Vec<f32>)>,
    consumed: i32,
}

#[derive(Default)]
struct FakeStream {
    samples: Vec<f32>,
    sample_rate: i32,
    finished: bool,
    /// Samples already turned into tokens.
    decoded: usize,
    tokens: Vec<(String, f32)>,
    /// Silent frames decoded since the last token.
    trailing_silence: u32,
}

impl FakeStream {
    fn ready(&self) -> bool {
        let pending = self.samples.len() - self.decoded;
        pending >= FAKE_FRAME || (self.finished && pending > 0)
    }

    fn decode_frame(&mut self) {
        let end = (self.decoded + FAKE_FRAME).min(self.samples.len());
        match frame_token(&self.samples[self.decoded..end], self.decoded, self.sample_rate) {
            Some(token) => {
                self.tokens.push(token);
                self.trailing_silence = 0;
            }
            None => self.trailing_silence += 1,
        }
        self.decoded = end;
    }
}

struct FakeOfflineRecognizer {
    lang: String,
}

#[derive(Default)]
struct FakeOfflineStream {
    samples: Vec<f32>,
    sample_rate: i32,
    tokens: Vec<(String, f32)>,
    lang: String,
}

/// C strings and arrays a fake recognizer result points into.
struct ResultParts {
    text: CString,
    joined: CString,
    json: CString,
    lang: CString,
    empty: CString,
    tokens_arr: Vec<*const c_char>,
    timestamps: Vec<f32>,
    _tokens: Vec<CString>,
}

impl ResultParts {
    fn new(tokens: &[(String, f32)], lang: Option<&str>) -> Self {
        let text: String = tokens.iter().map(|(t, _)| t.as_str()).collect();
        let timestamps: Vec<f32> = tokens.iter().map(|(_, ts)| *ts).collect();
        let mut json = serde_json::json!({
            "text": text,
            "tokens": tokens.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
            "timestamps": timestamps,
        });
        if let Some(lang) = lang {
            json["lang"] = lang.into();
        }
        let owned: Vec<CString> = tokens
            .iter()
            .map(|(t, _)| CString::new(t.as_str()).unwrap_or_default())
            .collect();
        Self {
            joined: CString::new(tokens.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>().join(" "))
                .unwrap_or_default(),
            text: CString::new(text).unwrap_or_default(),
            json: CString::new(json.to_string()).unwrap_or_default(),
            lang: CString::new(lang.unwrap_or_default()).unwrap_or_default(),
            empty: CString::default(),
            tokens_arr: owned.iter().map(|t| t.as_ptr()).collect(),
            timestamps,
            _tokens: owned,
        }
    }
}

/// Result struct first, so the pointer handed out is also the box's.
#[repr(C)]
struct OwnedOnlineResult {
    _raw: SherpaOnnxOnlineRecognizerResult,
    _parts: ResultParts,
}

#[repr(C)]
struct OwnedOfflineResult {
    _raw: SherpaOnnxOfflineRecognizerResult,
    _parts: ResultParts,
}

/// One token per frame that is not all zeros, stamped with its start time.
fn frame_token(frame: &[f32], start: usize, sample_rate: i32) -> Option<(String, f32)> {
    frame
        .iter()
        .any(|s| *s != 0.0)
        .then(|| ("la".to_string(), start as f32 / sample_rate.max(1) as f32))
}

struct FakeExtractor {
    dim: i32,
}

#[derive(Default)]
struct FakeManager {
    dim: usize,
    speakers: Vec<(String, Vec<f32>)>,
}

pub(crate) struct FakeEngine {
    state: Arc<FakeState>,
}

/// Table with no entry points at all.
pub(crate) struct Absent;

impl EngineApi for Absent {
    fn binding_name(&self) -> &'static str {
        "embedded"
    }
}

/// Bindings whose embedded table is missing and whose dynamic table is the fake.
pub(crate) fn fake_bindings() -> (Arc<Bindings>, Arc<FakeState>) {
    let state = Arc::new(FakeState::default());
    let engine = FakeEngine { state: Arc::clone(&state) };
    let bindings = Bindings::with_tables(
        BindingRouter::new(BindingMode::PreferEmbedded),
        Box::new(Absent),
        Box::new(engine),
    );
    (Arc::new(bindings), state)
}

unsafe fn obj<'a, T>(p: *mut c_void) -> &'a Mutex<T> {
    unsafe { &*(p as *const Mutex<T>) }
}

unsafe fn floats<'a>(p: *const f32, n: i32) -> &'a [f32] {
    if p.is_null() || n <= 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(p, n as usize) }
    }
}

unsafe fn text(p: *const c_char) -> String {
    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl EngineApi for FakeEngine {
    fn binding_name(&self) -> &'static str {
        "fake"
    }

    unsafe fn get_version_str(&self) -> Result<*const c_char> {
        Ok(b"1.12.0\0".as_ptr() as *const c_char)
    }

    unsafe fn get_git_sha1(&self) -> Result<*const c_char> {
        Ok(b"4d4f3a1\0".as_ptr() as *const c_char)
    }

    unsafe fn get_git_date(&self) -> Result<*const c_char> {
        Ok(b"Fri Oct 10 2025\0".as_ptr() as *const c_char)
    }

    // ── circular buffer ──────────────────────────────────────────────────

    unsafe fn create_circular_buffer(&self, capacity: i32) -> Result<*mut c_void> {
        let ring = FakeRing {
            samples: VecDeque::with_capacity(capacity as usize),
            head: 0,
        };
        Ok(self.state.alloc(Mutex::new(ring)))
    }

    unsafe fn destroy_circular_buffer(&self, buffer: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeRing>>(buffer, "circular_buffer") };
        Ok(())
    }

    unsafe fn circular_buffer_push(&self, buffer: *mut c_void, p: *const f32, n: i32) -> Result<()> {
        let ring = unsafe { obj::<FakeRing>(buffer) };
        ring.lock().samples.extend(unsafe { floats(p, n) });
        Ok(())
    }

    unsafe fn circular_buffer_get(&self, buffer: *mut c_void, start_index: i32, n: i32) -> Result<*const f32> {
        let ring = unsafe { obj::<FakeRing>(buffer) }.lock();
        let offset = (start_index - ring.head).max(0) as usize;
        let out: Vec<f32> = ring.samples.iter().skip(offset).take(n.max(0) as usize).copied().collect();
        Ok(self.state.alloc_floats(out))
    }

    unsafe fn circular_buffer_free(&self, p: *const f32) -> Result<()> {
        unsafe { self.state.free_floats(p) };
        Ok(())
    }

    unsafe fn circular_buffer_pop(&self, buffer: *mut c_void, n: i32) -> Result<()> {
        let mut ring = unsafe { obj::<FakeRing>(buffer) }.lock();
        let n = (n.max(0) as usize).min(ring.samples.len());
        ring.samples.drain(..n);
        ring.head += n as i32;
        Ok(())
    }

    unsafe fn circular_buffer_size(&self, buffer: *mut c_void) -> Result<i32> {
        Ok(unsafe { obj::<FakeRing>(buffer) }.lock().samples.len() as i32)
    }

    unsafe fn circular_buffer_head(&self, buffer: *mut c_void) -> Result<i32> {
        Ok(unsafe { obj::<FakeRing>(buffer) }.lock().head)
    }

    unsafe fn circular_buffer_reset(&self, buffer: *mut c_void) -> Result<()> {
        let mut ring = unsafe { obj::<FakeRing>(buffer) }.lock();
        ring.samples.clear();
        ring.head = 0;
        Ok(())
    }

    // ── vad ──────────────────────────────────────────────────────────────

    unsafe fn create_voice_activity_detector(
        &self,
        config: *const SherpaOnnxVadModelConfig,
        _buffer_size_in_seconds: f32,
    ) -> Result<*mut c_void> {
        let config = unsafe { &*config };
        *self.state.last_vad_window.lock() = Some(config.silero_vad.window_size);
        Ok(self.state.alloc(Mutex::new(FakeVad::default())))
    }

    unsafe fn destroy_voice_activity_detector(&self, vad: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeVad>>(vad, "vad") };
        Ok(())
    }

    /// Every non-silent waveform becomes one segment.
    unsafe fn vad_accept_waveform(&self, vad: *mut c_void, samples: *const f32, n: i32) -> Result<()> {
        let mut v = unsafe { obj::<FakeVad>(vad) }.lock();
        let chunk = unsafe { floats(samples, n) }.to_vec();
        let start = v.consumed;
        v.consumed += n;
        if chunk.iter().any(|s| *s != 0.0) {
            v.segments.push_back((start, chunk));
        }
        Ok(())
    }

    unsafe fn vad_empty(&self, vad: *mut c_void) -> Result<i32> {
        Ok(unsafe { obj::<FakeVad>(vad) }.lock().segments.is_empty() as i32)
    }

    unsafe fn vad_detected(&self, vad: *mut c_void) -> Result<i32> {
        Ok(!unsafe { obj::<FakeVad>(vad) }.lock().segments.is_empty() as i32)
    }

    unsafe fn vad_pop(&self, vad: *mut c_void) -> Result<()> {
        let v = unsafe { obj::<FakeVad>(vad) };
        v.lock().segments.pop_front();
        Ok(())
    }

    unsafe fn vad_clear(&self, vad: *mut c_void) -> Result<()> {
        let v = unsafe { obj::<FakeVad>(vad) };
        v.lock().segments.clear();
        Ok(())
    }

    unsafe fn vad_front(&self, vad: *mut c_void) -> Result<*const SherpaOnnxSpeechSegment> {
        let v = unsafe { obj::<FakeVad>(vad) }.lock();
        let Some((start, samples)) = v.segments.front() else {
            return Ok(std::ptr::null());
        };
        let n = samples.len() as i32;
        let samples = self.state.alloc_floats(samples.clone()) as *mut f32;
        Ok(self.state.alloc(SherpaOnnxSpeechSegment { start: *start, samples, n }) as *const _)
    }

    unsafe fn destroy_speech_segment(&self, segment: *const SherpaOnnxSpeechSegment) -> Result<()> {
        if segment.is_null() {
            return Ok(());
        }
        unsafe {
            self.state.free_floats((*segment).samples);
            self.state.free::<SherpaOnnxSpeechSegment>(segment as *mut c_void, "speech_segment");
        }
        Ok(())
    }

    unsafe fn vad_reset(&self, vad: *mut c_void) -> Result<()> {
        let mut v = unsafe { obj::<FakeVad>(vad) }.lock();
        v.segments.clear();
        v.consumed = 0;
        Ok(())
    }

    unsafe fn vad_flush(&self, _vad: *mut c_void) -> Result<()> {
        Ok(())
    }

    // ── tts ──────────────────────────────────────────────────────────────

    unsafe fn create_offline_tts(&self, config: *const SherpaOnnxOfflineTtsConfig) -> Result<*mut c_void> {
        let config = unsafe { &*config };
        let model = unsafe { text(config.model.vits.model) };
        if model == "missing.onnx" {
            return Ok(std::ptr::null_mut());
        }
        *self.state.last_tts_model.lock() = Some(model);
        Ok(self.state.alloc(Mutex::new(FakeTts { sample_rate: 22_050 })))
    }

    unsafe fn destroy_offline_tts(&self, tts: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeTts>>(tts, "offline_tts") };
        Ok(())
    }

    unsafe fn offline_tts_sample_rate(&self, tts: *mut c_void) -> Result<i32> {
        let gate = self.state.tts_call_gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
            if self.state.destroyed.lock().contains(&"offline_tts") {
                self.state.calls_on_destroyed.fetch_add(1, Ordering::SeqCst);
                return Ok(-1);
            }
        }
        Ok(unsafe { obj::<FakeTts>(tts) }.lock().sample_rate)
    }

    unsafe fn offline_tts_num_speakers(&self, _tts: *mut c_void) -> Result<i32> {
        Ok(4)
    }

    unsafe fn offline_tts_generate(
        &self,
        tts: *mut c_void,
        text_ptr: *const c_char,
        _sid: i32,
        _speed: f32,
    ) -> Result<*const SherpaOnnxGeneratedAudio> {
        if unsafe { text(text_ptr) }.trim().is_empty() {
            return Ok(std::ptr::null());
        }
        let rate = unsafe { obj::<FakeTts>(tts) }.lock().sample_rate;
        let all: Vec<f32> = self.state.tts_chunks.lock().concat();
        Ok(self.state.alloc_audio(all, rate))
    }

    unsafe fn offline_tts_generate_with_callback(
        &self,
        tts: *mut c_void,
        _text: *const c_char,
        _sid: i32,
        _speed: f32,
        callback: SherpaOnnxGeneratedAudioCallbackWithArg,
        arg: *mut c_void,
    ) -> Result<*const SherpaOnnxGeneratedAudio> {
        let rate = unsafe { obj::<FakeTts>(tts) }.lock().sample_rate;
        let chunks = self.state.tts_chunks.lock().clone();
        let mut emitted = Vec::new();
        for chunk in &chunks {
            emitted.extend_from_slice(chunk);
            self.state.callbacks_delivered.fetch_add(1, Ordering::SeqCst);
            let Some(cb) = callback else { break };
            if unsafe { cb(chunk.as_ptr(), chunk.len() as i32, arg) } == 0 {
                break;
            }
        }
        Ok(self.state.alloc_audio(emitted, rate))
    }

    unsafe fn offline_tts_generate_with_progress_callback(
        &self,
        tts: *mut c_void,
        _text: *const c_char,
        _sid: i32,
        _speed: f32,
        callback: SherpaOnnxGeneratedAudioProgressCallbackWithArg,
        arg: *mut c_void,
    ) -> Result<*const SherpaOnnxGeneratedAudio> {
        let rate = unsafe { obj::<FakeTts>(tts) }.lock().sample_rate;
        let chunks = self.state.tts_chunks.lock().clone();
        let total = chunks.len().max(1) as f32;
        let mut emitted = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            emitted.extend_from_slice(chunk);
            self.state.callbacks_delivered.fetch_add(1, Ordering::SeqCst);
            let Some(cb) = callback else { break };
            let progress = (i + 1) as f32 / total;
            if unsafe { cb(chunk.as_ptr(), chunk.len() as i32, progress, arg) } == 0 {
                break;
            }
        }
        Ok(self.state.alloc_audio(emitted, rate))
    }

    unsafe fn offline_tts_generate_with_zipvoice(
        &self,
        tts: *mut c_void,
        _text: *const c_char,
        _prompt_text: *const c_char,
        prompt_samples: *const f32,
        n_prompt: i32,
        _prompt_sample_rate: i32,
        _speed: f32,
        num_steps: i32,
    ) -> Result<*const SherpaOnnxGeneratedAudio> {
        let rate = unsafe { obj::<FakeTts>(tts) }.lock().sample_rate;
        // Echo the prompt, scaled by the step count, so tests can see both arrived.
        let out: Vec<f32> = unsafe { floats(prompt_samples, n_prompt) }
            .iter()
            .map(|s| s * num_steps as f32)
            .collect();
        Ok(self.state.alloc_audio(out, rate))
    }

    unsafe fn destroy_generated_audio(&self, audio: *const SherpaOnnxGeneratedAudio) -> Result<()> {
        if audio.is_null() {
            return Ok(());
        }
        unsafe {
            self.state.free_floats((*audio).samples);
            self.state.free::<SherpaOnnxGeneratedAudio>(audio as *mut c_void, "generated_audio");
        }
        Ok(())
    }

    unsafe fn write_wave(&self, _samples: *const f32, n: i32, sample_rate: i32, filename: *const c_char) -> Result<i32> {
        let name = unsafe { text(filename) };
        let ok = !name.starts_with("/nonexistent/");
        if ok {
            self.state.written_waves.lock().push((name, n as usize, sample_rate));
        }
        Ok(ok as i32)
    }

    // ── speaker embedding extractor / online stream ─────────────────────

    unsafe fn create_speaker_embedding_extractor(
        &self,
        _config: *const SherpaOnnxSpeakerEmbeddingExtractorConfig,
    ) -> Result<*mut c_void> {
        Ok(self.state.alloc(Mutex::new(FakeExtractor { dim: 3 })))
    }

    unsafe fn destroy_speaker_embedding_extractor(&self, extractor: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeExtractor>>(extractor, "extractor") };
        Ok(())
    }

    unsafe fn speaker_embedding_extractor_dim(&self, extractor: *mut c_void) -> Result<i32> {
        Ok(unsafe { obj::<FakeExtractor>(extractor) }.lock().dim)
    }

    unsafe fn speaker_embedding_extractor_create_stream(&self, _extractor: *mut c_void) -> Result<*mut c_void> {
        Ok(self.state.alloc(Mutex::new(FakeStream::default())))
    }

    unsafe fn speaker_embedding_extractor_is_ready(&self, _extractor: *mut c_void, stream: *mut c_void) -> Result<i32> {
        let s = unsafe { obj::<FakeStream>(stream) }.lock();
        Ok((s.finished && !s.samples.is_empty()) as i32)
    }

    /// Embedding is `[mean, min, max]` of the accepted samples.
    unsafe fn speaker_embedding_extractor_compute_embedding(
        &self,
        _extractor: *mut c_void,
        stream: *mut c_void,
    ) -> Result<*const f32> {
        let s = unsafe { obj::<FakeStream>(stream) }.lock();
        if s.samples.is_empty() {
            return Ok(std::ptr::null());
        }
        let mean = s.samples.iter().sum::<f32>() / s.samples.len() as f32;
        let min = s.samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = s.samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Ok(self.state.alloc_floats(vec![mean, min, max]))
    }

    unsafe fn speaker_embedding_extractor_destroy_embedding(&self, v: *const f32) -> Result<()> {
        unsafe { self.state.free_floats(v) };
        Ok(())
    }

    unsafe fn destroy_online_stream(&self, stream: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeStream>>(stream, "online_stream") };
        Ok(())
    }

    unsafe fn online_stream_accept_waveform(
        &self,
        stream: *mut c_void,
        sample_rate: i32,
        samples: *const f32,
        n: i32,
    ) -> Result<()> {
        let mut s = unsafe { obj::<FakeStream>(stream) }.lock();
        s.sample_rate = sample_rate;
        s.samples.extend_from_slice(unsafe { floats(samples, n) });
        Ok(())
    }

    unsafe fn online_stream_input_finished(&self, stream: *mut c_void) -> Result<()> {
        let s = unsafe { obj::<FakeStream>(stream) };
        s.lock().finished = true;
        Ok(())
    }

    // ── speaker embedding manager ───────────────────────────────────────

    unsafe fn create_speaker_embedding_manager(&self, dim: i32) -> Result<*mut c_void> {
        let manager = FakeManager {
            dim: dim as usize,
            ..FakeManager::default()
        };
        Ok(self.state.alloc(Mutex::new(manager)))
    }

    unsafe fn destroy_speaker_embedding_manager(&self, manager: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeManager>>(manager, "manager") };
        Ok(())
    }

    unsafe fn speaker_embedding_manager_add(&self, manager: *mut c_void, name: *const c_char, v: *const f32) -> Result<i32> {
        let mut m = unsafe { obj::<FakeManager>(manager) }.lock();
        let dim = m.dim as i32;
        let name = unsafe { text(name) };
        if m.speakers.iter().any(|(n, _)| *n == name) {
            return Ok(0);
        }
        let v = unsafe { floats(v, dim) }.to_vec();
        m.speakers.push((name, v));
        Ok(1)
    }

    unsafe fn speaker_embedding_manager_add_list_flattened(
        &self,
        manager: *mut c_void,
        name: *const c_char,
        v: *const f32,
        n: i32,
    ) -> Result<i32> {
        let mut m = unsafe { obj::<FakeManager>(manager) }.lock();
        let dim = m.dim;
        let all = unsafe { floats(v, n * dim as i32) };
        // Average of the list, as the engine does.
        let mut mean = vec![0.0; dim];
        for row in all.chunks_exact(dim) {
            for (acc, x) in mean.iter_mut().zip(row) {
                *acc += x / n as f32;
            }
        }
        m.speakers.push((unsafe { text(name) }, mean));
        Ok(1)
    }

    unsafe fn speaker_embedding_manager_remove(&self, manager: *mut c_void, name: *const c_char) -> Result<i32> {
        let mut m = unsafe { obj::<FakeManager>(manager) }.lock();
        let name = unsafe { text(name) };
        let before = m.speakers.len();
        m.speakers.retain(|(n, _)| *n != name);
        Ok((m.speakers.len() < before) as i32)
    }

    unsafe fn speaker_embedding_manager_search(
        &self,
        manager: *mut c_void,
        v: *const f32,
        threshold: f32,
    ) -> Result<*const c_char> {
        let m = unsafe { obj::<FakeManager>(manager) }.lock();
        let query = unsafe { floats(v, m.dim as i32) };
        let best = m
            .speakers
            .iter()
            .map(|(n, e)| (n, dot(e, query)))
            .filter(|(_, score)| *score >= threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let name = best.map(|(n, _)| n.as_str()).unwrap_or("");
        self.state.live.fetch_add(1, Ordering::SeqCst);
        Ok(CString::new(name).unwrap_or_default().into_raw() as *const c_char)
    }

    unsafe fn speaker_embedding_manager_free_search(&self, name: *const c_char) -> Result<()> {
        if !name.is_null() {
            drop(unsafe { CString::from_raw(name as *mut c_char) });
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    unsafe fn speaker_embedding_manager_verify(
        &self,
        manager: *mut c_void,
        name: *const c_char,
        v: *const f32,
        threshold: f32,
    ) -> Result<i32> {
        let m = unsafe { obj::<FakeManager>(manager) }.lock();
        let name = unsafe { text(name) };
        let query = unsafe { floats(v, m.dim as i32) };
        Ok(m
            .speakers
            .iter()
            .any(|(n, e)| *n == name && dot(e, query) >= threshold) as i32)
    }

    unsafe fn speaker_embedding_manager_contains(&self, manager: *mut c_void, name: *const c_char) -> Result<i32> {
        let m = unsafe { obj::<FakeManager>(manager) }.lock();
        let name = unsafe { text(name) };
        Ok(m.speakers.iter().any(|(n, _)| *n == name) as i32)
    }

    unsafe fn speaker_embedding_manager_num_speakers(&self, manager: *mut c_void) -> Result<i32> {
        Ok(unsafe { obj::<FakeManager>(manager) }.lock().speakers.len() as i32)
    }

    /// NULL-terminated array of names.
    unsafe fn speaker_embedding_manager_get_all_speakers(&self, manager: *mut c_void) -> Result<*const *const c_char> {
        let m = unsafe { obj::<FakeManager>(manager) }.lock();
        let mut names: Vec<*const c_char> = m
            .speakers
            .iter()
            .map(|(n, _)| CString::new(n.as_str()).unwrap_or_default().into_raw() as *const c_char)
            .collect();
        names.push(std::ptr::null());
        self.state.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::into_raw(names.into_boxed_slice()) as *const *const c_char)
    }

    unsafe fn speaker_embedding_manager_free_all_speakers(&self, names: *const *const c_char) -> Result<()> {
        if names.is_null() {
            return Ok(());
        }
        let mut len = 0;
        unsafe {
            while !(*names.add(len)).is_null() {
                drop(CString::from_raw(*names.add(len) as *mut c_char));
                len += 1;
            }
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                names as *mut *const c_char,
                len + 1,
            )));
        }
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    // ── online recognizer ────────────────────────────────────────────────

    unsafe fn create_online_recognizer(&self, config: *const SherpaOnnxOnlineRecognizerConfig) -> Result<*mut c_void> {
        let config = unsafe { &*config };
        let tokens = unsafe { text(config.model_config.tokens) };
        if tokens == "missing.txt" {
            return Ok(std::ptr::null_mut());
        }
        *self.state.last_asr_config.lock() = Some((tokens, unsafe { text(config.decoding_method) }));
        Ok(self.state.alloc(Mutex::new(())))
    }

    unsafe fn destroy_online_recognizer(&self, recognizer: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<()>>(recognizer, "online_recognizer") };
        Ok(())
    }

    unsafe fn create_online_stream(&self, _recognizer: *mut c_void) -> Result<*mut c_void> {
        Ok(self.state.alloc(Mutex::new(FakeStream::default())))
    }

    unsafe fn is_online_stream_ready(&self, _recognizer: *mut c_void, stream: *mut c_void) -> Result<i32> {
        Ok(unsafe { obj::<FakeStream>(stream) }.lock().ready() as i32)
    }

    unsafe fn decode_online_stream(&self, _recognizer: *mut c_void, stream: *mut c_void) -> Result<()> {
        let mut s = unsafe { obj::<FakeStream>(stream) }.lock();
        if s.ready() {
            s.decode_frame();
        }
        Ok(())
    }

    unsafe fn decode_multiple_online_streams(
        &self,
        recognizer: *mut c_void,
        streams: *const *mut c_void,
        n: i32,
    ) -> Result<()> {
        for &stream in unsafe { std::slice::from_raw_parts(streams, n as usize) } {
            unsafe { self.decode_online_stream(recognizer, stream)? };
        }
        Ok(())
    }

    unsafe fn get_online_stream_result(
        &self,
        _recognizer: *mut c_void,
        stream: *mut c_void,
    ) -> Result<*const SherpaOnnxOnlineRecognizerResult> {
        let s = unsafe { obj::<FakeStream>(stream) }.lock();
        let parts = ResultParts::new(&s.tokens, None);
        let raw = SherpaOnnxOnlineRecognizerResult {
            text: parts.text.as_ptr(),
            tokens: parts.joined.as_ptr(),
            tokens_arr: parts.tokens_arr.as_ptr(),
            timestamps: parts.timestamps.as_ptr(),
            count: s.tokens.len() as i32,
            json: parts.json.as_ptr(),
        };
        Ok(self.state.alloc(OwnedOnlineResult { _raw: raw, _parts: parts }) as *const _)
    }

    unsafe fn destroy_online_recognizer_result(&self, result: *const SherpaOnnxOnlineRecognizerResult) -> Result<()> {
        unsafe { self.state.free::<OwnedOnlineResult>(result as *mut c_void, "online_result") };
        Ok(())
    }

    unsafe fn get_online_stream_result_as_json(&self, _recognizer: *mut c_void, stream: *mut c_void) -> Result<*const c_char> {
        let s = unsafe { obj::<FakeStream>(stream) }.lock();
        let json = ResultParts::new(&s.tokens, None).json;
        self.state.live.fetch_add(1, Ordering::SeqCst);
        Ok(json.into_raw() as *const c_char)
    }

    unsafe fn destroy_online_stream_result_json(&self, json: *const c_char) -> Result<()> {
        unsafe { self.free_json(json) };
        Ok(())
    }

    unsafe fn online_stream_reset(&self, _recognizer: *mut c_void, stream: *mut c_void) -> Result<()> {
        let mut s = unsafe { obj::<FakeStream>(stream) }.lock();
        s.tokens.clear();
        s.trailing_silence = 0;
        Ok(())
    }

    /// Endpoint after two silent frames that follow at least one token.
    unsafe fn online_stream_is_endpoint(&self, _recognizer: *mut c_void, stream: *mut c_void) -> Result<i32> {
        let s = unsafe { obj::<FakeStream>(stream) }.lock();
        Ok((!s.tokens.is_empty() && s.trailing_silence >= 2) as i32)
    }

    // ── offline recognizer ───────────────────────────────────────────────

    unsafe fn create_offline_recognizer(&self, config: *const SherpaOnnxOfflineRecognizerConfig) -> Result<*mut c_void> {
        let config = unsafe { &*config };
        let tokens = unsafe { text(config.model_config.tokens) };
        if tokens == "missing.txt" {
            return Ok(std::ptr::null_mut());
        }
        *self.state.last_asr_config.lock() = Some((tokens, unsafe { text(config.decoding_method) }));
        let lang = unsafe { text(config.model_config.whisper.language) };
        Ok(self.state.alloc(Mutex::new(FakeOfflineRecognizer { lang })))
    }

    unsafe fn offline_recognizer_set_config(
        &self,
        recognizer: *mut c_void,
        config: *const SherpaOnnxOfflineRecognizerConfig,
    ) -> Result<()> {
        let lang = unsafe { text((*config).model_config.whisper.language) };
        unsafe { obj::<FakeOfflineRecognizer>(recognizer) }.lock().lang = lang;
        Ok(())
    }

    unsafe fn destroy_offline_recognizer(&self, recognizer: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeOfflineRecognizer>>(recognizer, "offline_recognizer") };
        Ok(())
    }

    unsafe fn create_offline_stream(&self, _recognizer: *mut c_void) -> Result<*mut c_void> {
        Ok(self.state.alloc(Mutex::new(FakeOfflineStream::default())))
    }

    unsafe fn destroy_offline_stream(&self, stream: *mut c_void) -> Result<()> {
        unsafe { self.state.free::<Mutex<FakeOfflineStream>>(stream, "offline_stream") };
        Ok(())
    }

    unsafe fn accept_waveform_offline(
        &self,
        stream: *mut c_void,
        sample_rate: i32,
        samples: *const f32,
        n: i32,
    ) -> Result<()> {
        let mut s = unsafe { obj::<FakeOfflineStream>(stream) }.lock();
        s.sample_rate = sample_rate;
        s.samples.extend_from_slice(unsafe { floats(samples, n) });
        Ok(())
    }

    /// Re-decodes the whole utterance, one token per non-silent frame.
    unsafe fn decode_offline_stream(&self, recognizer: *mut c_void, stream: *mut c_void) -> Result<()> {
        let lang = unsafe { obj::<FakeOfflineRecognizer>(recognizer) }.lock().lang.clone();
        let mut s = unsafe { obj::<FakeOfflineStream>(stream) }.lock();
        let rate = s.sample_rate;
        s.tokens = s
            .samples
            .chunks(FAKE_FRAME)
            .enumerate()
            .filter_map(|(i, frame)| frame_token(frame, i * FAKE_FRAME, rate))
            .collect();
        s.lang = lang;
        Ok(())
    }

    unsafe fn decode_multiple_offline_streams(
        &self,
        recognizer: *mut c_void,
        streams: *const *mut c_void,
        n: i32,
    ) -> Result<()> {
        for &stream in unsafe { std::slice::from_raw_parts(streams, n as usize) } {
            unsafe { self.decode_offline_stream(recognizer, stream)? };
        }
        Ok(())
    }

    unsafe fn get_offline_stream_result(&self, stream: *mut c_void) -> Result<*const SherpaOnnxOfflineRecognizerResult> {
        let s = unsafe { obj::<FakeOfflineStream>(stream) }.lock();
        let parts = ResultParts::new(&s.tokens, Some(s.lang.as_str()));
        let raw = SherpaOnnxOfflineRecognizerResult {
            text: parts.text.as_ptr(),
            timestamps: parts.timestamps.as_ptr(),
            count: s.tokens.len() as i32,
            tokens: parts.joined.as_ptr(),
            tokens_arr: parts.tokens_arr.as_ptr(),
            json: parts.json.as_ptr(),
            lang: parts.lang.as_ptr(),
            emotion: parts.empty.as_ptr(),
            event: parts.empty.as_ptr(),
        };
        Ok(self.state.alloc(OwnedOfflineResult { _raw: raw, _parts: parts }) as *const _)
    }

    unsafe fn destroy_offline_recognizer_result(&self, result: *const SherpaOnnxOfflineRecognizerResult) -> Result<()> {
        unsafe { self.state.free::<OwnedOfflineResult>(result as *mut c_void, "offline_result") };
        Ok(())
    }

    unsafe fn get_offline_stream_result_as_json(&self, stream: *mut c_void) -> Result<*const c_char> {
        let s = unsafe { obj::<FakeOfflineStream>(stream) }.lock();
        let json = ResultParts::new(&s.tokens, Some(s.lang.as_str())).json;
        self.state.live.fetch_add(1, Ordering::SeqCst);
        Ok(json.into_raw() as *const c_char)
    }

    unsafe fn destroy_offline_stream_result_json(&self, json: *const c_char) -> Result<()> {
        unsafe { self.free_json(json) };
        Ok(())
    }
}

impl FakeEngine {
    unsafe fn free_json(&self, json: *const c_char) {
        if !json.is_null() {
            drop(unsafe { CString::from_raw(json as *mut c_char) });
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
