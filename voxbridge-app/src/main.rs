//! voxbridge demo host.
//!
//! `synth` writes a WAV file; `play` starts the output device first and feeds
//! it from the synthesizer's chunk callback, so audio starts before
//! generation ends.

mod cli;
mod settings;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use voxbridge_core::{
    audio::device::list_output_devices, Bindings, GeneratedAudio, GenerationControl, OfflineTts,
    PlaybackSession, VersionInfo,
};

use cli::{Cli, Commands, GenerationArgs, ModelArgs, PlayArgs, SynthArgs};
use settings::AppSettings;

/// ZipVoice output is enqueued in pieces of this many samples.
const ENQUEUE_CHUNK: usize = 4096;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("voxbridge=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Version => print_version(),
        Commands::Devices => print_devices(),
        Commands::Synth(args) => synth(args),
        Commands::Play(args) => play(args),
    }
}

fn print_version() -> Result<()> {
    let bindings = Bindings::shared();
    let info = VersionInfo::query(&bindings).context("querying engine version")?;
    println!("binding:  {}", bindings.mode());
    println!("version:  {}", info.version);
    println!("git sha1: {}", info.git_sha1);
    println!("git date: {}", info.git_date);
    Ok(())
}

fn print_devices() -> Result<()> {
    let devices = list_output_devices();
    if devices.is_empty() {
        println!("no output devices found");
    }
    for d in devices {
        let marker = if d.is_default { "*" } else { " " };
        println!("{marker} {}", d.name);
    }
    Ok(())
}

fn check_zipvoice_flags(model: &ModelArgs, generation: &GenerationArgs) -> Result<()> {
    if !generation.is_zipvoice() {
        return Ok(());
    }
    let missing = cli::missing_zipvoice_flags(model, generation);
    if !missing.is_empty() {
        bail!("zero-shot cloning with --prompt-audio also needs: {}", missing.join(", "));
    }
    Ok(())
}

fn load_tts(model: &ModelArgs, generation: &GenerationArgs) -> Result<(OfflineTts, AppSettings)> {
    check_zipvoice_flags(model, generation)?;
    let settings = settings::resolve(model, generation)?;
    let tts = OfflineTts::new(&settings.tts).context("creating the synthesizer")?;
    info!(
        sample_rate = tts.sample_rate()?,
        speakers = tts.num_speakers()?,
        "synthesizer ready"
    );
    Ok((tts, settings))
}

/// Mono samples in `[-1, 1]` and the file's sample rate. Multi-channel files
/// keep only the first channel.
fn read_prompt(path: &Path) -> Result<(Vec<f32>, i32)> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("opening prompt {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("decoding prompt samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("decoding prompt samples")?
        }
    };

    let mono = interleaved.into_iter().step_by(channels).collect();
    Ok((mono, spec.sample_rate as i32))
}

fn generate_zipvoice(tts: &mut OfflineTts, settings: &AppSettings, generation: &GenerationArgs) -> Result<GeneratedAudio> {
    let prompt_path = generation
        .prompt_audio
        .as_deref()
        .context("--prompt-audio is required for zero-shot cloning")?;
    let (prompt, prompt_rate) = read_prompt(prompt_path)?;
    info!(samples = prompt.len(), prompt_rate, "prompt loaded");

    let audio = tts
        .generate_with_zipvoice(
            &generation.text,
            generation.prompt_text.as_deref().unwrap_or_default(),
            &prompt,
            prompt_rate,
            settings.speed,
            generation.num_steps,
        )
        .context("zero-shot generation")?;
    Ok(audio)
}

fn save(audio: &GeneratedAudio, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    if !audio.save_to_wave_file(output)? {
        bail!("engine failed to write {}", output.display());
    }
    info!(
        path = %output.display(),
        samples = audio.num_samples()?,
        sample_rate = audio.sample_rate()?,
        "saved"
    );
    Ok(())
}

fn synth(args: SynthArgs) -> Result<()> {
    let (mut tts, settings) = load_tts(&args.model, &args.generation)?;
    let g = &args.generation;

    let audio = if g.is_zipvoice() {
        generate_zipvoice(&mut tts, &settings, g)?
    } else {
        tts.generate(&g.text, settings.speed, settings.speaker_id)
            .context("generation")?
    };
    save(&audio, &g.output)
}

fn play(args: PlayArgs) -> Result<()> {
    let (mut tts, mut settings) = load_tts(&args.model, &args.generation)?;
    if args.device.is_some() {
        settings.playback.preferred_device = args.device.clone();
        settings.playback.normalize();
    }
    let g = &args.generation;

    let session = PlaybackSession::open(tts.sample_rate()?, &settings.playback).context("opening audio output")?;
    let producer = session.producer();

    let audio = if g.is_zipvoice() {
        let audio = generate_zipvoice(&mut tts, &settings, g)?;
        for piece in audio.samples()?.chunks(ENQUEUE_CHUNK) {
            if producer.push(piece).is_err() {
                break;
            }
        }
        audio
    } else {
        let callback_producer = producer.clone();
        tts.generate_with_callback(&g.text, settings.speed, settings.speaker_id, move |chunk| {
            GenerationControl::from(callback_producer.push(chunk).is_ok())
        })
        .context("generation")?
    };

    save(&audio, &g.output)?;
    producer.finish();

    if !session.wait_until_finished(settings.playback.drain_timeout()) {
        warn!("stopping before the device drained");
        session.cancel();
    }
    let snap = session.diagnostics();
    println!(
        "played {} frames ({} underruns) at {} Hz",
        snap.frames_played,
        snap.underruns,
        session.device_rate()
    );
    Ok(())
}
