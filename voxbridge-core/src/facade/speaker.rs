//! Speaker embeddings: extractor and a named registry.

use std::ffi::c_char;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    binding::Bindings,
    error::{BridgeError, Result},
    ffi::{copy_c_string, copy_f32_slice, SherpaOnnxSpeakerEmbeddingExtractorConfig},
    handle::NativeHandle,
};

use super::{c_string, len_i32, own_handle, CStringArena, OnlineStream};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerEmbeddingExtractorConfig {
    pub model: String,
    pub num_threads: i32,
    pub debug: bool,
    pub provider: String,
}

impl Default for SpeakerEmbeddingExtractorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            num_threads: 1,
            debug: false,
            provider: "cpu".into(),
        }
    }
}

impl SpeakerEmbeddingExtractorConfig {
    fn lower(&self, arena: &mut CStringArena) -> Result<SherpaOnnxSpeakerEmbeddingExtractorConfig> {
        Ok(SherpaOnnxSpeakerEmbeddingExtractorConfig {
            model: arena.ptr(&self.model, "model")?,
            num_threads: self.num_threads,
            debug: self.debug as i32,
            provider: arena.ptr(&self.provider, "provider")?,
        })
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

pub struct SpeakerEmbeddingExtractor {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
}

impl SpeakerEmbeddingExtractor {
    pub fn new(config: &SpeakerEmbeddingExtractorConfig) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), config)
    }

    pub fn with_bindings(bindings: Arc<Bindings>, config: &SpeakerEmbeddingExtractorConfig) -> Result<Self> {
        let mut arena = CStringArena::new();
        let c_config = config.lower(&mut arena)?;
        let raw = bindings.call(|api| unsafe { api.create_speaker_embedding_extractor(&c_config) })?;
        drop(arena);

        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateSpeakerEmbeddingExtractor", |api, p| unsafe {
            api.destroy_speaker_embedding_extractor(p)
        })?;
        Ok(Self { bindings, handle })
    }

    /// Length of every embedding this model produces.
    pub fn dim(&self) -> Result<usize> {
        let dim = self
            .handle
            .with(|p| self.bindings.call(|api| unsafe { api.speaker_embedding_extractor_dim(p) }))?;
        Ok(dim.max(0) as usize)
    }

    pub fn create_stream(&self) -> Result<OnlineStream> {
        let raw = self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.speaker_embedding_extractor_create_stream(p) })
        })?;
        OnlineStream::from_raw(&self.bindings, raw, "SherpaOnnxSpeakerEmbeddingExtractorCreateStream")
    }

    /// `true` once the stream holds enough audio for an embedding.
    pub fn is_ready(&self, stream: &OnlineStream) -> Result<bool> {
        let ready = self.handle.with(|p| {
            stream.handle().with(|s| {
                self.bindings
                    .call(|api| unsafe { api.speaker_embedding_extractor_is_ready(p, s) })
            })
        })?;
        Ok(ready != 0)
    }

    pub fn compute(&self, stream: &OnlineStream) -> Result<Vec<f32>> {
        let dim = len_i32(self.dim()?, "embedding dim")?;
        self.handle.with(|p| {
            stream.handle().with(|s| {
                self.bindings.call(|api| unsafe {
                    let v = api.speaker_embedding_extractor_compute_embedding(p, s)?;
                    if v.is_null() {
                        return Err(BridgeError::Generation("stream has no audio to embed".into()));
                    }
                    let out = copy_f32_slice(v, dim);
                    api.speaker_embedding_extractor_destroy_embedding(v)?;
                    Ok(out)
                })
            })
        })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for SpeakerEmbeddingExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerEmbeddingExtractor")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ── Manager ──────────────────────────────────────────────────────────────────

/// Registry of named embeddings, all of length `dim`.
pub struct SpeakerEmbeddingManager {
    bindings: Arc<Bindings>,
    handle: NativeHandle,
    dim: usize,
}

impl SpeakerEmbeddingManager {
    pub fn new(dim: usize) -> Result<Self> {
        Self::with_bindings(Bindings::shared(), dim)
    }

    pub fn with_bindings(bindings: Arc<Bindings>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(BridgeError::InvalidArgument("embedding dim must be > 0".into()));
        }
        let c_dim = len_i32(dim, "embedding dim")?;
        let raw = bindings.call(|api| unsafe { api.create_speaker_embedding_manager(c_dim) })?;
        let handle = own_handle(&bindings, raw, "SherpaOnnxCreateSpeakerEmbeddingManager", |api, p| unsafe {
            api.destroy_speaker_embedding_manager(p)
        })?;
        Ok(Self { bindings, handle, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn check_dim(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dim {
            return Err(BridgeError::InvalidArgument(format!(
                "embedding has {} values, manager expects {}",
                embedding.len(),
                self.dim
            )));
        }
        Ok(())
    }

    /// Register `name`. `Ok(false)` if the name is already taken.
    pub fn add(&mut self, name: &str, embedding: &[f32]) -> Result<bool> {
        self.check_dim(embedding)?;
        let name = c_string(name, "speaker name")?;
        let added = self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.speaker_embedding_manager_add(p, name.as_ptr(), embedding.as_ptr()) })
        })?;
        Ok(added == 1)
    }

    /// Register `name` from several enrollment embeddings; the engine averages them.
    pub fn add_list(&mut self, name: &str, embeddings: &[Vec<f32>]) -> Result<bool> {
        if embeddings.is_empty() {
            return Err(BridgeError::InvalidArgument("no embeddings given".into()));
        }
        for e in embeddings {
            self.check_dim(e)?;
        }
        let name = c_string(name, "speaker name")?;
        let flat: Vec<f32> = embeddings.concat();
        let n = len_i32(embeddings.len(), "embedding count")?;
        let added = self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                api.speaker_embedding_manager_add_list_flattened(p, name.as_ptr(), flat.as_ptr(), n)
            })
        })?;
        Ok(added == 1)
    }

    /// `Ok(false)` if `name` was not registered.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let name = c_string(name, "speaker name")?;
        let removed = self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.speaker_embedding_manager_remove(p, name.as_ptr()) })
        })?;
        Ok(removed == 1)
    }

    /// Best match scoring at least `threshold`, if any.
    pub fn search(&self, embedding: &[f32], threshold: f32) -> Result<Option<String>> {
        self.check_dim(embedding)?;
        self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                let name = api.speaker_embedding_manager_search(p, embedding.as_ptr(), threshold)?;
                let out = copy_c_string(name).filter(|n| !n.is_empty());
                api.speaker_embedding_manager_free_search(name)?;
                Ok(out)
            })
        })
    }

    /// `true` if `embedding` matches the registered `name` at `threshold`.
    pub fn verify(&self, name: &str, embedding: &[f32], threshold: f32) -> Result<bool> {
        self.check_dim(embedding)?;
        let name = c_string(name, "speaker name")?;
        let matched = self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                api.speaker_embedding_manager_verify(p, name.as_ptr(), embedding.as_ptr(), threshold)
            })
        })?;
        Ok(matched == 1)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        let name = c_string(name, "speaker name")?;
        let found = self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.speaker_embedding_manager_contains(p, name.as_ptr()) })
        })?;
        Ok(found == 1)
    }

    pub fn num_speakers(&self) -> Result<usize> {
        let n = self.handle.with(|p| {
            self.bindings
                .call(|api| unsafe { api.speaker_embedding_manager_num_speakers(p) })
        })?;
        Ok(n.max(0) as usize)
    }

    /// Registered names, in registration order.
    pub fn all_speakers(&self) -> Result<Vec<String>> {
        if self.num_speakers()? == 0 {
            return Ok(Vec::new());
        }
        self.handle.with(|p| {
            self.bindings.call(|api| unsafe {
                let names = api.speaker_embedding_manager_get_all_speakers(p)?;
                if names.is_null() {
                    return Ok(Vec::new());
                }
                let mut out = Vec::new();
                let mut cursor: *const *const c_char = names;
                while let Some(name) = copy_c_string(*cursor) {
                    out.push(name);
                    cursor = cursor.add(1);
                }
                api.speaker_embedding_manager_free_all_speakers(names)?;
                Ok(out)
            })
        })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl std::fmt::Debug for SpeakerEmbeddingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerEmbeddingManager")
            .field("dim", &self.dim)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
