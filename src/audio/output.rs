//! Audio output management using the `cpal` crate.
//!
//! This module handles device lookup, stream configuration and the real-time
//! output callback that drains the sample ring buffer and advances the
//! playback clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
    },
    time::Duration,
};

use {
    cpal::{
        BuildStreamError, Device, FromSample, Host, OutputCallbackInfo, PauseStreamError,
        PlayStreamError,
        SampleFormat::{self, F32, I16, I32, U16},
        SizedSample, Stream, StreamConfig, SupportedStreamConfigRange, default_host,
        traits::{DeviceTrait, HostTrait},
    },
    rtrb::Consumer,
    thiserror::Error,
    tracing::{debug, error, info, warn},
};

use crate::{audio::decoder::AudioFormat, config::UserSettings};

/// Largest channel count the output callback can map.
pub const MAX_CHANNELS: usize = 8;

/// Error type for audio output operations.
#[derive(Error, Debug)]
pub enum OutputError {
    /// CPAL stream construction error.
    #[error("Audio output error: {0}")]
    CpalError(#[from] BuildStreamError),
    /// Failed to start audio stream.
    #[error("Failed to start audio stream: {0}")]
    StreamStartError(#[from] PlayStreamError),
    /// Failed to pause audio stream.
    #[error("Failed to pause audio stream: {0}")]
    StreamPauseError(#[from] PauseStreamError),
    /// No suitable audio device found.
    #[error("No suitable audio device found")]
    NoDeviceFound,
    /// Device capabilities could not be queried.
    #[error("Failed to query device configuration: {0}")]
    ConfigQueryError(String),
    /// Unsupported sample format.
    #[error("Unsupported sample format: {format:?}")]
    UnsupportedSampleFormat { format: SampleFormat },
    /// Source channel count outside what the callback can map.
    #[error("Unsupported channel count: {channels}")]
    UnsupportedChannelCount { channels: u32 },
}

/// Audio output configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Preferred output device name; the default device is used when unset or missing.
    pub device_name: Option<String>,
    /// Callback timeout in milliseconds.
    pub buffer_duration_ms: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            buffer_duration_ms: 50,
        }
    }
}

impl From<&UserSettings> for OutputConfig {
    fn from(settings: &UserSettings) -> Self {
        Self {
            device_name: settings.audio_device.clone(),
            buffer_duration_ms: settings.buffer_duration_ms,
        }
    }
}

/// Stream configuration chosen for a given source format.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    /// Configuration handed to cpal.
    pub stream_config: StreamConfig,
    /// Sample type the device expects.
    pub sample_format: SampleFormat,
    /// Whether the source sample rate differs from the stream's.
    pub needs_resampling: bool,
}

/// Shared counters the output callback updates while it plays.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    /// Current playback position in milliseconds.
    pub position_ms: Arc<AtomicU64>,
    /// Position the stream started from.
    pub base_ms: u64,
    /// Raised by the decoder once the whole file has been queued.
    pub source_finished: Arc<AtomicBool>,
    /// Raised by the callback once the queue ran dry after the source finished.
    pub drained: Arc<AtomicBool>,
    /// Engine-wide seek counter.
    pub generation: Arc<AtomicU64>,
    /// Value of `generation` when this stream was built.
    pub stream_generation: u64,
}

impl PlaybackClock {
    /// Whether no seek has happened since this stream was built.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.generation.load(SeqCst) == self.stream_generation
    }

    /// Publishes the position after `frames_played` frames at `rate`.
    pub fn report_position(&self, frames_played: u64, rate: u64) {
        if self.is_current() {
            self.position_ms
                .store(self.base_ms + frames_played * 1000 / rate.max(1), SeqCst);
        }
    }

    /// Called when the queue is empty; raises `drained` once the source is done.
    pub fn report_underrun(&self) {
        if self.source_finished.load(SeqCst) && self.is_current() {
            self.drained.store(true, SeqCst);
        }
    }
}

/// Manages the output device and stream creation.
pub struct AudioOutput {
    /// The selected output device.
    device: Device,
    /// Current output configuration.
    config: OutputConfig,
}

impl AudioOutput {
    /// Opens the configured output device, falling back to the default one.
    ///
    /// # Errors
    ///
    /// Returns `OutputError::NoDeviceFound` if the host has no output device.
    pub fn new(config: OutputConfig) -> Result<Self, OutputError> {
        let host = default_host();
        let device = find_device(&host, config.device_name.as_deref())?;

        debug!(device = %device_label(&device).unwrap_or_default(), "Opened output device");

        Ok(AudioOutput { device, config })
    }

    /// Picks a stream configuration for the source format.
    ///
    /// Preference order: the source rate with the source channel count, the
    /// source rate with any channel count, then the device default (which
    /// requires resampling when its rate differs).
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if the source has too many channels or the
    /// device capabilities cannot be queried.
    pub fn select_config(&self, source: &AudioFormat) -> Result<OutputTarget, OutputError> {
        let source_channels = usize::try_from(source.channels).unwrap_or(0);
        if source_channels == 0 || source_channels > MAX_CHANNELS {
            return Err(OutputError::UnsupportedChannelCount {
                channels: source.channels,
            });
        }

        let ranges: Vec<SupportedStreamConfigRange> = self
            .device
            .supported_output_configs()
            .map_err(|e| OutputError::ConfigQueryError(e.to_string()))?
            .collect();

        let at_source_rate = |channels: Option<u16>| {
            ranges
                .iter()
                .filter(|range| channels.is_none_or(|wanted| range.channels() == wanted))
                .find_map(|range| range.clone().try_with_sample_rate(source.sample_rate))
        };

        let supported = match at_source_rate(u16::try_from(source.channels).ok())
            .or_else(|| at_source_rate(None))
        {
            Some(config) => config,
            None => self
                .device
                .default_output_config()
                .map_err(|e| OutputError::ConfigQueryError(e.to_string()))?,
        };

        let stream_config = supported.config();
        let needs_resampling = stream_config.sample_rate != source.sample_rate;

        info!(
            source_rate = source.sample_rate,
            source_channels = source.channels,
            output_rate = stream_config.sample_rate,
            output_channels = stream_config.channels,
            needs_resampling,
            "Selected output configuration"
        );

        Ok(OutputTarget {
            stream_config,
            sample_format: supported.sample_format(),
            needs_resampling,
        })
    }

    /// Creates a paused output stream reading interleaved source frames from `consumer`.
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if the sample format is unsupported or stream
    /// creation fails.
    pub fn create_stream(
        &self,
        target: &OutputTarget,
        source_channels: usize,
        consumer: Consumer<f32>,
        clock: PlaybackClock,
    ) -> Result<Stream, OutputError> {
        match target.sample_format {
            F32 => self.build_stream::<f32>(target, source_channels, consumer, clock),
            I16 => self.build_stream::<i16>(target, source_channels, consumer, clock),
            I32 => self.build_stream::<i32>(target, source_channels, consumer, clock),
            U16 => self.build_stream::<u16>(target, source_channels, consumer, clock),
            format => Err(OutputError::UnsupportedSampleFormat { format }),
        }
    }

    fn build_stream<T>(
        &self,
        target: &OutputTarget,
        source_channels: usize,
        mut consumer: Consumer<f32>,
        clock: PlaybackClock,
    ) -> Result<Stream, OutputError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let out_channels = usize::from(target.stream_config.channels).max(1);
        let rate = u64::from(target.stream_config.sample_rate).max(1);
        let timeout = Duration::from_millis(u64::from(self.config.buffer_duration_ms));

        let mut frame = [0.0_f32; MAX_CHANNELS];
        let mut frames_played: u64 = 0;

        let stream = self.device.build_output_stream(
            &target.stream_config,
            move |data: &mut [T], _: &OutputCallbackInfo| {
                for out_frame in data.chunks_mut(out_channels) {
                    // Only take whole frames so channels never drift
                    if consumer.slots() >= source_channels {
                        for slot in frame.iter_mut().take(source_channels) {
                            *slot = consumer.pop().unwrap_or(0.0);
                        }
                        frames_played += 1;
                        for (channel, sample) in out_frame.iter_mut().enumerate() {
                            let value = map_channel(&frame[..source_channels], channel);
                            *sample = T::from_sample(value.clamp(-1.0, 1.0));
                        }
                    } else {
                        out_frame.fill(T::EQUILIBRIUM);
                        clock.report_underrun();
                    }
                }

                clock.report_position(frames_played, rate);
            },
            |err| error!("Audio stream error: {err}"),
            Some(timeout),
        )?;

        Ok(stream)
    }

    /// Gets the current device name.
    #[must_use]
    pub fn device_name(&self) -> String {
        device_label(&self.device).unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Lists the names of all output devices on the default host.
#[must_use]
pub fn available_devices() -> Vec<String> {
    match default_host().output_devices() {
        Ok(devices) => devices.filter_map(|device| device_label(&device)).collect(),
        Err(_) => Vec::new(),
    }
}

/// Maps one source frame onto an output channel.
///
/// Mono is copied to every output channel; otherwise channels map one to
/// one and output channels beyond the source are silent. Source channels
/// beyond the output are dropped.
#[must_use]
pub fn map_channel(frame: &[f32], out_channel: usize) -> f32 {
    match frame {
        [] => 0.0,
        [mono] => *mono,
        _ => frame.get(out_channel).copied().unwrap_or(0.0),
    }
}

fn find_device(host: &Host, name: Option<&str>) -> Result<Device, OutputError> {
    if let Some(name) = name {
        let found = host.output_devices().ok().and_then(|mut devices| {
            devices.find(|device| device_label(device).as_deref() == Some(name))
        });

        match found {
            Some(device) => return Ok(device),
            None => warn!(
                available = ?available_devices(),
                "Output device '{name}' not found, using the default device"
            ),
        }
    }

    host.default_output_device()
        .ok_or(OutputError::NoDeviceFound)
}

fn device_label(device: &Device) -> Option<String> {
    device
        .description()
        .ok()
        .map(|description| description.name().to_string())
}
