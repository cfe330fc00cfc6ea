//! Audio output via cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond growing its scratch buffer once)
//! - Block on a mutex or condvar
//! - Perform I/O or logging
//!
//! This module satisfies that contract by handing the device buffer straight
//! to a [`PlaybackAdapter`], which only does non-blocking queue takes.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `OutputStream` therefore must be created and dropped on the same thread.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::{
    error::{BridgeError, Result},
    playback::PlaybackAdapter,
};

/// Handle to an active output stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on Windows/macOS.
/// Create and drop this type on the same OS thread.
pub struct OutputStream {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Negotiated device sample rate (Hz).
    pub sample_rate: u32,
    /// Negotiated channel count. The mono signal is duplicated across channels.
    pub channels: u16,
    pub device_name: String,
}

/// Sample formats the callback can write, in order of preference.
#[cfg(feature = "audio-cpal")]
const FORMAT_PREFERENCE: [SampleFormat; 3] = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

impl OutputStream {
    /// Open an output device by preferred name, otherwise fall back to the
    /// default output device and then the first available device, and start
    /// pulling from `adapter`.
    ///
    /// `source_rate` is used if the device supports it; otherwise the device
    /// default rate is used and the caller must resample.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        adapter: PlaybackAdapter,
        source_rate: u32,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred output device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list output devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_output_device() {
            default
        } else {
            let mut devices = host
                .output_devices()
                .map_err(|e| BridgeError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(BridgeError::NoDefaultOutputDevice)?;
            warn!("no default output device, falling back to first available output");
            fallback
        };

        let device_name = device.name().unwrap_or_default();
        info!(device = device_name.as_str(), "opening output device");

        let (config, sample_format) = negotiate_config(&device, source_rate)?;
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        info!(sample_rate, channels, format = ?sample_format, "output config selected");

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, adapter),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, adapter),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, adapter),
            fmt => {
                return Err(BridgeError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| BridgeError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
            device_name,
        })
    }

    /// Open the system default output device.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(adapter: PlaybackAdapter, source_rate: u32) -> Result<Self> {
        Self::open_with_preference(adapter, source_rate, None)
    }
}

/// Pick a stream config: the source rate if any supported range covers it
/// (mono preferred, then fewer channels, then [`FORMAT_PREFERENCE`]),
/// otherwise the device default.
#[cfg(feature = "audio-cpal")]
fn negotiate_config(device: &cpal::Device, source_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let exact = device
        .supported_output_configs()
        .map_err(|e| BridgeError::AudioDevice(e.to_string()))?
        .filter(|range| {
            FORMAT_PREFERENCE.contains(&range.sample_format())
                && range.min_sample_rate().0 <= source_rate
                && source_rate <= range.max_sample_rate().0
        })
        .min_by_key(|range| {
            let format_rank = FORMAT_PREFERENCE
                .iter()
                .position(|f| *f == range.sample_format())
                .unwrap_or(FORMAT_PREFERENCE.len());
            (range.channels(), format_rank)
        });

    if let Some(range) = exact {
        let supported = range.with_sample_rate(SampleRate(source_rate));
        let format = supported.sample_format();
        return Ok((
            StreamConfig {
                channels: supported.channels(),
                sample_rate: SampleRate(source_rate),
                buffer_size: cpal::BufferSize::Default,
            },
            format,
        ));
    }

    let supported = device
        .default_output_config()
        .map_err(|e| BridgeError::AudioDevice(e.to_string()))?;
    warn!(
        source_rate,
        device_rate = supported.sample_rate().0,
        "device does not support the source rate, resampling"
    );
    Ok((
        StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        },
        supported.sample_format(),
    ))
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut adapter: PlaybackAdapter,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    // Scratch for non-f32 formats; grows at most to the largest device buffer.
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let buf = &mut scratch[..data.len()];
                adapter.fill_interleaved(buf, channels);
                for (dst, src) in data.iter_mut().zip(buf.iter()) {
                    *dst = T::from_sample(*src);
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| BridgeError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl OutputStream {
    pub fn open_with_preference(
        _adapter: PlaybackAdapter,
        _source_rate: u32,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(BridgeError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(adapter: PlaybackAdapter, source_rate: u32) -> Result<Self> {
        Self::open_with_preference(adapter, source_rate, None)
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("device", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}
