//! Config pieces shared by the online and offline recognizers.

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    ffi::{SherpaOnnxFeatureConfig, SherpaOnnxHomophoneReplacerConfig},
};

use super::CStringArena;

/// Front-end feature extraction. The engine resamples input to `sample_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: i32,
    pub feature_dim: i32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            feature_dim: 80,
        }
    }
}

impl FeatureConfig {
    pub(crate) fn lower(&self) -> SherpaOnnxFeatureConfig {
        SherpaOnnxFeatureConfig {
            sample_rate: self.sample_rate,
            feature_dim: self.feature_dim,
        }
    }
}

/// Post-recognition homophone replacement (Chinese).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomophoneReplacerConfig {
    pub dict_dir: String,
    pub lexicon: String,
    pub rule_fsts: String,
}

impl HomophoneReplacerConfig {
    pub(crate) fn lower(&self, a: &mut CStringArena) -> Result<SherpaOnnxHomophoneReplacerConfig> {
        Ok(SherpaOnnxHomophoneReplacerConfig {
            dict_dir: a.ptr(&self.dict_dir, "hr.dict_dir")?,
            lexicon: a.ptr(&self.lexicon, "hr.lexicon")?,
            rule_fsts: a.ptr(&self.rule_fsts, "hr.rule_fsts")?,
        })
    }
}

/// A model family configured by a single file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelFileConfig {
    pub model: String,
}

/// Encoder/decoder/joiner triple of a transducer model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransducerModelConfig {
    pub encoder: String,
    pub decoder: String,
    pub joiner: String,
}

/// Words the decoder should favour, with their boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotwordsConfig {
    pub file: String,
    pub score: f32,
}

impl Default for HotwordsConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            score: 1.5,
        }
    }
}
