//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Text-to-speech through sherpa-onnx, to file or live", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the engine version and the binding in use
    Version,

    /// List audio output devices
    Devices,

    /// Synthesize text to a WAV file
    Synth(SynthArgs),

    /// Synthesize text and play it while it is being generated
    Play(PlayArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// JSON file with a full TTS config; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub vits_model: Option<String>,
    #[arg(long)]
    pub vits_lexicon: Option<String>,
    #[arg(long)]
    pub vits_tokens: Option<String>,
    #[arg(long)]
    pub vits_data_dir: Option<String>,

    #[arg(long)]
    pub matcha_acoustic_model: Option<String>,
    #[arg(long)]
    pub matcha_vocoder: Option<String>,
    #[arg(long)]
    pub matcha_tokens: Option<String>,
    #[arg(long)]
    pub matcha_data_dir: Option<String>,

    #[arg(long)]
    pub kokoro_model: Option<String>,
    #[arg(long)]
    pub kokoro_voices: Option<String>,
    #[arg(long)]
    pub kokoro_tokens: Option<String>,
    #[arg(long)]
    pub kokoro_data_dir: Option<String>,
    #[arg(long)]
    pub kokoro_lang: Option<String>,

    #[arg(long)]
    pub zipvoice_tokens: Option<String>,
    #[arg(long)]
    pub zipvoice_text_model: Option<String>,
    #[arg(long)]
    pub zipvoice_flow_matching_model: Option<String>,
    #[arg(long)]
    pub zipvoice_vocoder: Option<String>,
    #[arg(long)]
    pub zipvoice_data_dir: Option<String>,

    /// Comma-separated rule FSTs for text normalisation
    #[arg(long)]
    pub rule_fsts: Option<String>,

    #[arg(long)]
    pub num_threads: Option<i32>,

    #[arg(long)]
    pub provider: Option<String>,

    /// Let the engine print model metadata
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    /// Text to speak
    #[arg(long)]
    pub text: String,

    /// Speaker id for multi-speaker models
    #[arg(long)]
    pub sid: Option<i32>,

    /// Speech rate; larger is faster
    #[arg(long)]
    pub speed: Option<f32>,

    /// Where to write the generated audio
    #[arg(long, default_value = "generated.wav")]
    pub output: PathBuf,

    /// Reference voice for ZipVoice zero-shot cloning (WAV)
    #[arg(long)]
    pub prompt_audio: Option<PathBuf>,

    /// Transcript of --prompt-audio
    #[arg(long)]
    pub prompt_text: Option<String>,

    /// ZipVoice flow-matching steps
    #[arg(long, default_value_t = 4)]
    pub num_steps: i32,
}

#[derive(Args, Debug)]
pub struct SynthArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Output device name (see `devices`)
    #[arg(long)]
    pub device: Option<String>,
}

impl GenerationArgs {
    pub fn is_zipvoice(&self) -> bool {
        self.prompt_audio.is_some()
    }
}

/// Flags a ZipVoice run cannot do without, all reported together.
pub fn missing_zipvoice_flags(model: &ModelArgs, generation: &GenerationArgs) -> Vec<&'static str> {
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
    let mut missing = Vec::new();
    if blank(&model.zipvoice_text_model) {
        missing.push("--zipvoice-text-model");
    }
    if blank(&model.zipvoice_flow_matching_model) {
        missing.push("--zipvoice-flow-matching-model");
    }
    if blank(&model.zipvoice_vocoder) {
        missing.push("--zipvoice-vocoder");
    }
    if blank(&generation.prompt_text) {
        missing.push("--prompt-text");
    }
    missing
}
