//! TTS settings: optional JSON file, overridden by command line flags.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use voxbridge_core::{OfflineTtsConfig, PlaybackConfig};

use crate::cli::{GenerationArgs, ModelArgs};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub tts: OfflineTtsConfig,
    pub playback: PlaybackConfig,
    pub speaker_id: i32,
    pub speed: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            tts: OfflineTtsConfig::default(),
            playback: PlaybackConfig::default(),
            speaker_id: 0,
            speed: 1.0,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let model = &mut self.tts.model;
        for path in [
            &mut model.vits.model,
            &mut model.vits.lexicon,
            &mut model.vits.tokens,
            &mut model.vits.data_dir,
            &mut model.matcha.acoustic_model,
            &mut model.matcha.vocoder,
            &mut model.matcha.tokens,
            &mut model.matcha.data_dir,
            &mut model.kokoro.model,
            &mut model.kokoro.voices,
            &mut model.kokoro.tokens,
            &mut model.kokoro.data_dir,
            &mut model.kokoro.lang,
            &mut model.zipvoice.tokens,
            &mut model.zipvoice.text_model,
            &mut model.zipvoice.flow_matching_model,
            &mut model.zipvoice.vocoder,
            &mut model.zipvoice.data_dir,
            &mut self.tts.rule_fsts,
        ] {
            *path = path.trim().to_string();
        }

        model.num_threads = model.num_threads.clamp(1, 64);
        model.provider = normalize_provider(&model.provider);
        model.zipvoice.guidance_scale = model.zipvoice.guidance_scale.clamp(0.0, 10.0);
        self.tts.max_num_sentences = self.tts.max_num_sentences.clamp(1, 100);
        self.tts.silence_scale = self.tts.silence_scale.clamp(0.0, 10.0);
        self.speaker_id = self.speaker_id.max(0);
        self.speed = if self.speed.is_finite() {
            self.speed.clamp(0.1, 10.0)
        } else {
            1.0
        };
        self.playback.normalize();
    }

    /// Overlay command line flags. Only flags that were given replace values.
    pub fn apply_flags(&mut self, model: &ModelArgs, generation: &GenerationArgs) {
        let m = &mut self.tts.model;
        let set = |dst: &mut String, src: &Option<String>| {
            if let Some(v) = src {
                *dst = v.clone();
            }
        };
        set(&mut m.vits.model, &model.vits_model);
        set(&mut m.vits.lexicon, &model.vits_lexicon);
        set(&mut m.vits.tokens, &model.vits_tokens);
        set(&mut m.vits.data_dir, &model.vits_data_dir);
        set(&mut m.matcha.acoustic_model, &model.matcha_acoustic_model);
        set(&mut m.matcha.vocoder, &model.matcha_vocoder);
        set(&mut m.matcha.tokens, &model.matcha_tokens);
        set(&mut m.matcha.data_dir, &model.matcha_data_dir);
        set(&mut m.kokoro.model, &model.kokoro_model);
        set(&mut m.kokoro.voices, &model.kokoro_voices);
        set(&mut m.kokoro.tokens, &model.kokoro_tokens);
        set(&mut m.kokoro.data_dir, &model.kokoro_data_dir);
        set(&mut m.kokoro.lang, &model.kokoro_lang);
        set(&mut m.zipvoice.tokens, &model.zipvoice_tokens);
        set(&mut m.zipvoice.text_model, &model.zipvoice_text_model);
        set(&mut m.zipvoice.flow_matching_model, &model.zipvoice_flow_matching_model);
        set(&mut m.zipvoice.vocoder, &model.zipvoice_vocoder);
        set(&mut m.zipvoice.data_dir, &model.zipvoice_data_dir);
        set(&mut m.provider, &model.provider);
        set(&mut self.tts.rule_fsts, &model.rule_fsts);

        if let Some(n) = model.num_threads {
            m.num_threads = n;
        }
        if model.debug {
            m.debug = true;
        }
        if let Some(sid) = generation.sid {
            self.speaker_id = sid;
        }
        if let Some(speed) = generation.speed {
            self.speed = speed;
        }
    }
}

pub fn normalize_provider(raw: &str) -> String {
    let provider = raw.trim().to_ascii_lowercase();
    match provider.as_str() {
        "" => "cpu".into(),
        "gpu" | "nvidia" => "cuda".into(),
        "mac" | "apple" => "coreml".into(),
        _ => provider,
    }
}

/// Read a settings file. A missing path yields defaults; a malformed file is an error.
pub fn load_settings(path: Option<&Path>) -> Result<AppSettings> {
    let Some(path) = path else {
        return Ok(AppSettings::default());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let settings = serde_json::from_str::<AppSettings>(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(settings)
}

/// Settings for one run: file, then flags, then normalisation.
pub fn resolve(model: &ModelArgs, generation: &GenerationArgs) -> Result<AppSettings> {
    let mut settings = load_settings(model.config.as_deref())?;
    settings.apply_flags(model, generation);
    settings.normalize();
    Ok(settings)
}
