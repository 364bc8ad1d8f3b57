//! Audio file decoding using the `symphonia` crate.
//!
//! This module handles audio file format detection, decoding, and provides
//! decoded audio samples to the output system via ring buffers.

use std::{
    fs::File,
    io::{Error as StdError, ErrorKind::UnexpectedEof},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::SeqCst},
    },
    thread::sleep,
    time::Duration,
};

use {
    rtrb::{Producer, PushError::Full},
    serde::{Deserialize, Serialize},
    symphonia::{
        core::{
            audio::{Channels, SampleBuffer, SignalSpec},
            codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions},
            errors::Error as SymphoniaError,
            formats::{FormatOptions, FormatReader, SeekMode::Accurate, SeekTo},
            io::{MediaSourceStream, MediaSourceStreamOptions},
            meta::MetadataOptions,
            probe::Hint,
            units::Time,
        },
        default::{get_codecs, get_probe},
    },
    thiserror::Error,
    tracing::{debug, warn},
};

/// Sleep duration when producer buffer is full.
const PRODUCER_SLEEP_DURATION: Duration = Duration::from_micros(100);

/// Error type for audio decoding operations.
#[derive(Error, Debug)]
pub enum DecoderError {
    /// Failed to open or read the audio file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Symphonia decoding error.
    #[error("Decoding error: {0}")]
    SymphoniaError(#[from] SymphoniaError),
    /// Unsupported audio format.
    #[error("Unsupported audio format")]
    UnsupportedFormat,
    /// No audio track found in file.
    #[error("No audio track found")]
    NoAudioTrack,
}

/// Audio format information extracted during decoding setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u32,
    /// Bits per sample.
    pub bits_per_sample: u32,
}

/// Audio decoder that reads and decodes audio files.
///
/// The decoder opens an audio file, selects its first decodable track and
/// hands out decoded packets one at a time.
pub struct AudioDecoder {
    /// Path the decoder was opened from.
    path: PathBuf,
    /// The underlying format reader.
    format_reader: Box<dyn FormatReader>,
    /// The active audio decoder.
    decoder: Box<dyn Decoder>,
    /// Container track id of the selected audio track.
    track_id: u32,
    /// Audio format information.
    pub format: AudioFormat,
    /// Signal specification from symphonia (sample rate + channel layout).
    pub signal_spec: SignalSpec,
    /// Reusable interleaving buffer for decoded packets.
    sample_buffer: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Creates a new audio decoder for the specified file.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError` if:
    /// - The file cannot be opened or read
    /// - The file format is unsupported
    /// - No audio track is found in the file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DecoderError> {
        let path = path.as_ref();

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                SymphoniaError::Unsupported(_) => DecoderError::UnsupportedFormat,
                other => DecoderError::SymphoniaError(other),
            })?;

        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecoderError::NoAudioTrack)?;

        let codec_params = &track.codec_params;
        let track_id = track.id;

        let signal_spec = SignalSpec::new(
            codec_params.sample_rate.unwrap_or(44100),
            codec_params
                .channels
                .unwrap_or(Channels::FRONT_LEFT | Channels::FRONT_RIGHT),
        );

        let format = AudioFormat {
            sample_rate: signal_spec.rate,
            channels: u32::try_from(signal_spec.channels.count()).unwrap_or(2),
            bits_per_sample: codec_params
                .bits_per_sample
                .or(codec_params.bits_per_coded_sample)
                .unwrap_or(16),
        };

        let decoder = get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(_) => DecoderError::UnsupportedFormat,
                other => DecoderError::SymphoniaError(other),
            })?;

        debug!(
            path = %path.display(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Opened audio decoder"
        );

        Ok(AudioDecoder {
            path: path.to_path_buf(),
            format_reader,
            decoder,
            track_id,
            format,
            signal_spec,
            sample_buffer: None,
        })
    }

    /// Decodes the next packet into interleaved `f32` samples.
    ///
    /// Packets that fail to decode are skipped. Returns `None` when the end
    /// of the file is reached.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError` if reading or decoding fails.
    pub fn decode_next(&mut self) -> Result<Option<&[f32]>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == UnexpectedEof => return Ok(None),
                Err(SymphoniaError::IoError(e)) => return Err(DecoderError::IoError(e)),
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecoderError::SymphoniaError(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let frames = decoded.capacity();
                    let needed = frames * spec.channels.count();

                    if self
                        .sample_buffer
                        .as_ref()
                        .is_none_or(|existing| existing.capacity() < needed)
                    {
                        self.sample_buffer = Some(SampleBuffer::new(frames as u64, spec));
                    }
                    if let Some(sample_buffer) = self.sample_buffer.as_mut() {
                        sample_buffer.copy_interleaved_ref(decoded);
                    }
                    break;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(path = %self.path.display(), "Skipping undecodable packet: {e}");
                }
                Err(e) => return Err(DecoderError::SymphoniaError(e)),
            }
        }

        Ok(self.sample_buffer.as_ref().map(|buffer| buffer.samples()))
    }

    /// Seeks to the specified time position in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError` if seeking fails.
    pub fn seek(&mut self, position_ms: u64) -> Result<(), DecoderError> {
        let seconds = position_ms / 1000;
        let frac_ms = u32::try_from(position_ms % 1000).unwrap_or(0);
        let time = Time::new(seconds, f64::from(frac_ms) / 1000.0);

        self.format_reader.seek(
            Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();

        debug!(path = %self.path.display(), position_ms, "Decoder seeked");
        Ok(())
    }

    /// Gets the duration of the audio file in milliseconds.
    ///
    /// Rounded down, so seeking to the returned value stays inside the
    /// stream.
    ///
    /// # Returns
    ///
    /// Duration in milliseconds, or `None` if unknown.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        let sample_rate = u64::from(self.format.sample_rate);
        if sample_rate == 0 {
            return None;
        }

        self.format_reader
            .tracks()
            .iter()
            .find(|track| track.id == self.track_id)
            .and_then(|track| track.codec_params.n_frames)
            .map(|frames| frames * 1000 / sample_rate)
    }
}

/// Audio producer that feeds decoded samples into a ring buffer.
///
/// This struct wraps an `AudioDecoder` and continuously decodes audio,
/// writing interleaved `f32` samples to the provided ring buffer producer.
pub struct AudioProducer {
    /// The audio decoder that provides raw audio samples.
    decoder: AudioDecoder,
    /// Ring buffer producer for writing decoded samples.
    producer: Producer<f32>,
    /// Raised once production stops, whatever the reason.
    finished: Arc<AtomicBool>,
}

impl AudioProducer {
    /// Creates a new audio producer.
    ///
    /// # Arguments
    ///
    /// * `decoder` - The audio decoder to use.
    /// * `producer` - The ring buffer producer to write samples to.
    /// * `finished` - Flag raised when production stops.
    pub fn new(decoder: AudioDecoder, producer: Producer<f32>, finished: Arc<AtomicBool>) -> Self {
        Self {
            decoder,
            producer,
            finished,
        }
    }

    /// Runs the audio production loop.
    ///
    /// This method should be run on a dedicated worker thread. It returns
    /// when the file is exhausted, when decoding fails or when the consuming
    /// side is dropped. The `finished` flag is raised on every exit so the
    /// output side can drain and report the end of the track.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError` if decoding fails.
    pub fn run(mut self) -> Result<(), DecoderError> {
        let result = self.produce();
        self.finished.store(true, SeqCst);

        match &result {
            Ok(()) => debug!("Decoder stopped"),
            Err(e) => warn!("Decoder stopped early: {e}"),
        }
        result
    }

    fn produce(&mut self) -> Result<(), DecoderError> {
        while let Some(samples) = self.decoder.decode_next()? {
            for &sample in samples {
                loop {
                    if self.producer.is_abandoned() {
                        return Ok(());
                    }
                    match self.producer.push(sample) {
                        Ok(()) => break,
                        Err(Full(_)) => sleep(PRODUCER_SLEEP_DURATION),
                    }
                }
            }
        }
        Ok(())
    }
}
