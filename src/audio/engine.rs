//! Per-file audio playback engine.
//!
//! An `AudioEngine` is opened for exactly one file and released when the
//! user picks another one. It owns a control thread that holds the `cpal`
//! stream (streams are not `Send`), the decoder thread and, when the device
//! cannot run at the file's rate, a resampling thread. Callers talk to it
//! through a command channel; position and completion are shared atomics.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
    },
    thread::{JoinHandle, spawn},
};

use {
    async_channel::{Receiver, Sender, bounded, unbounded},
    cpal::{Stream, traits::StreamTrait},
    parking_lot::RwLock,
    rtrb::RingBuffer,
    serde::{Deserialize, Serialize},
    tokio::runtime::Builder,
    tracing::{debug, error, info, warn},
};

use crate::{
    audio::{
        decoder::{AudioDecoder, AudioFormat, AudioProducer, DecoderError},
        output::{AudioOutput, OutputConfig, OutputError, OutputTarget, PlaybackClock},
        resampler::ResamplingAudioConsumer,
    },
    error::AudioError,
};

/// Buffer size must be a power of 2 for rtrb's bitmask wrapping.
const RING_BUFFER_SIZE: usize = 4096;

/// Transport state of the engine's output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// The stream is built but not running.
    Paused,
    /// The stream is running.
    Playing,
}

/// Internal control messages for the audio engine.
enum ControlMessage {
    /// Start or continue playback; the result is sent back.
    Play(Sender<Result<(), AudioError>>),
    /// Pause playback; the result is sent back.
    Pause(Sender<Result<(), AudioError>>),
    /// Rebuild the pipeline at a position in milliseconds.
    Seek(u64),
    /// Tear everything down and leave the control loop.
    Stop,
}

/// Facts shared between the engine handle, the control thread and the
/// output callback.
#[derive(Debug)]
struct SharedPlayback {
    /// Current transport state.
    state: RwLock<EngineState>,
    /// Playback position in milliseconds.
    position_ms: Arc<AtomicU64>,
    /// Raised once the whole file has been played out.
    drained: Arc<AtomicBool>,
    /// Bumped by every seek; streams built for an older value stop reporting.
    generation: Arc<AtomicU64>,
}

/// Audio playback engine bound to a single file.
pub struct AudioEngine {
    /// Path of the file being played.
    path: PathBuf,
    /// Total duration in milliseconds (0 when the container does not say).
    duration_ms: u64,
    /// Sender for control messages.
    control_tx: Sender<ControlMessage>,
    /// State shared with the control thread.
    shared: Arc<SharedPlayback>,
    /// Join handle for the control thread.
    control_thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Opens `path` for playback.
    ///
    /// The file is opened and its format read once before any audio
    /// resources are touched; that decoder feeds the first pipeline. The
    /// pipeline is built paused at the start of the file; call
    /// [`AudioEngine::play`] to start it.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::AccessDenied` if the file cannot be opened,
    /// `AudioError::DecoderError` if it is not a playable audio file, or
    /// `AudioError::OutputError` if no output stream can be created.
    pub fn open<P: AsRef<Path>>(path: P, output_config: OutputConfig) -> Result<Self, AudioError> {
        let path = path.as_ref().to_path_buf();

        let decoder = open_decoder(&path)?;
        let sample_rate = decoder.format.sample_rate;
        let duration_ms = decoder.duration_ms().unwrap_or(0);

        let shared = Arc::new(SharedPlayback {
            state: RwLock::new(EngineState::Paused),
            position_ms: Arc::new(AtomicU64::new(0)),
            drained: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        });

        let (control_tx, control_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let thread_path = path.clone();
        let thread_shared = Arc::clone(&shared);
        let control_thread = spawn(move || {
            control_thread_main(
                thread_path,
                decoder,
                output_config,
                thread_shared,
                control_rx,
                ready_tx,
            );
        });

        let ready = ready_rx
            .recv_blocking()
            .unwrap_or(Err(AudioError::EngineShutDown));
        if let Err(e) = ready {
            let _ = control_thread.join();
            return Err(e);
        }

        info!(
            path = %path.display(),
            duration_ms,
            sample_rate,
            "Audio engine ready"
        );

        Ok(AudioEngine {
            path,
            duration_ms,
            control_tx,
            shared,
            control_thread: Some(control_thread),
        })
    }

    /// Starts or continues playback.
    ///
    /// If the file has been played to the end, playback restarts from the
    /// beginning.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if the stream cannot be started.
    pub fn play(&self) -> Result<(), AudioError> {
        self.request(ControlMessage::Play)
    }

    /// Pauses playback, keeping the current position.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if the stream cannot be paused.
    pub fn pause(&self) -> Result<(), AudioError> {
        self.request(ControlMessage::Pause)
    }

    /// Requests a seek without waiting for it.
    ///
    /// The position is clamped to the file's duration and reported by
    /// [`AudioEngine::position_ms`] immediately; the running stream stops
    /// reporting until the rebuilt one takes over. Seeks queued behind each
    /// other collapse into the latest one. A seek the decoder cannot honour
    /// ends the track.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::EngineShutDown` if the control thread is gone.
    pub fn seek(&self, position_ms: u64) -> Result<(), AudioError> {
        let target = if self.duration_ms > 0 {
            position_ms.min(self.duration_ms)
        } else {
            position_ms
        };

        self.shared.generation.fetch_add(1, SeqCst);
        self.shared.position_ms.store(target, SeqCst);
        self.control_tx
            .send_blocking(ControlMessage::Seek(target))
            .map_err(|_| AudioError::EngineShutDown)
    }

    /// Gets the current playback position in milliseconds.
    #[must_use]
    pub fn position_ms(&self) -> u64 {
        let position = self.shared.position_ms.load(SeqCst);
        if self.duration_ms > 0 {
            position.min(self.duration_ms)
        } else {
            position
        }
    }

    /// Gets the duration in milliseconds (0 if unknown).
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Gets the current transport state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.shared.state.read()
    }

    /// Whether the whole file has been played out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.drained.load(SeqCst)
    }

    fn request(
        &self,
        message: impl FnOnce(Sender<Result<(), AudioError>>) -> ControlMessage,
    ) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.control_tx
            .send_blocking(message(reply_tx))
            .map_err(|_| AudioError::EngineShutDown)?;
        reply_rx
            .recv_blocking()
            .unwrap_or(Err(AudioError::EngineShutDown))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.control_tx.send_blocking(ControlMessage::Stop);
        if let Some(handle) = self.control_thread.take()
            && handle.join().is_err()
        {
            error!(path = %self.path.display(), "Audio control thread panicked");
        }
        debug!(path = %self.path.display(), "Audio engine released");
    }
}

/// Opens `path` and reads its format. A file that cannot be opened for reading is
/// reported as `AccessDenied`.
fn open_decoder(path: &Path) -> Result<AudioDecoder, AudioError> {
    AudioDecoder::new(path).map_err(|e| match e {
        DecoderError::IoError(io) => AudioError::AccessDenied {
            path: path.display().to_string(),
            reason: io.to_string(),
        },
        other => AudioError::DecoderError(other),
    })
}

/// Handle to a running decode/output pipeline.
struct StreamHandle {
    /// The CPAL audio stream.
    stream: Stream,
    /// Join handle for the decoder thread.
    decoder_handle: Option<JoinHandle<Result<(), DecoderError>>>,
    /// Resampling stage, when the device rate differs from the file's.
    resampling_consumer: Option<ResamplingAudioConsumer>,
}

impl StreamHandle {
    /// Stops the stream and joins the worker threads.
    fn shutdown(mut self) {
        if let Some(mut resampling_consumer) = self.resampling_consumer.take() {
            resampling_consumer.stop();
        }

        // Dropping the stream abandons the ring buffer, which ends the decoder loop
        drop(self.stream);

        if let Some(decoder_handle) = self.decoder_handle.take() {
            match decoder_handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Decoder thread ended with an error: {e}"),
                Err(_) => error!("Decoder thread panicked"),
            }
        }
    }
}

/// State owned by the control thread.
struct ControlLoop {
    path: PathBuf,
    output: AudioOutput,
    target: OutputTarget,
    source: AudioFormat,
    shared: Arc<SharedPlayback>,
    current: Option<StreamHandle>,
}

fn control_thread_main(
    path: PathBuf,
    decoder: AudioDecoder,
    output_config: OutputConfig,
    shared: Arc<SharedPlayback>,
    control_rx: Receiver<ControlMessage>,
    ready_tx: Sender<Result<(), AudioError>>,
) {
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send_blocking(Err(AudioError::InvalidOperation {
                reason: format!("Failed to start control runtime: {e}"),
            }));
            return;
        }
    };

    let mut control = match ControlLoop::new(path, decoder, output_config, shared) {
        Ok(control) => control,
        Err(e) => {
            let _ = ready_tx.send_blocking(Err(e));
            return;
        }
    };
    let _ = ready_tx.send_blocking(Ok(()));

    runtime.block_on(control.run(&control_rx));
    control.stop_stream();
    debug!(path = %control.path.display(), "Control loop stopped");
}

impl ControlLoop {
    fn new(
        path: PathBuf,
        decoder: AudioDecoder,
        output_config: OutputConfig,
        shared: Arc<SharedPlayback>,
    ) -> Result<Self, AudioError> {
        let output = AudioOutput::new(output_config)?;
        let source = decoder.format.clone();
        let target = output.select_config(&source)?;

        let mut control = ControlLoop {
            path,
            output,
            target,
            source,
            shared,
            current: None,
        };
        control.start_pipeline(decoder, 0, false)?;
        Ok(control)
    }

    /// Processes commands until `Stop` arrives or every sender is gone.
    async fn run(&mut self, control_rx: &Receiver<ControlMessage>) {
        let mut pending: Option<ControlMessage> = None;

        loop {
            let message = match pending.take() {
                Some(message) => message,
                None => match control_rx.recv().await {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            match message {
                ControlMessage::Play(reply) => {
                    let _ = reply.send(self.handle_play()).await;
                }
                ControlMessage::Pause(reply) => {
                    let _ = reply.send(self.handle_pause()).await;
                }
                ControlMessage::Seek(mut position_ms) => {
                    // Only the latest of several queued seeks matters
                    while let Ok(next) = control_rx.try_recv() {
                        match next {
                            ControlMessage::Seek(later) => position_ms = later,
                            other => {
                                pending = Some(other);
                                break;
                            }
                        }
                    }

                    if let Err(e) = self.handle_seek(position_ms) {
                        error!("Seek to {position_ms} ms failed, ending track: {e}");
                        self.end_track();
                    }
                }
                ControlMessage::Stop => break,
            }
        }
    }

    fn handle_play(&mut self) -> Result<(), AudioError> {
        if self.shared.drained.load(SeqCst) || self.current.is_none() {
            return self.setup_playback_stream(0, true);
        }

        if let Some(handle) = &self.current {
            handle
                .stream
                .play()
                .map_err(|e| AudioError::OutputError(e.into()))?;
        }
        *self.shared.state.write() = EngineState::Playing;
        debug!("Playback started");
        Ok(())
    }

    fn handle_pause(&mut self) -> Result<(), AudioError> {
        if let Some(handle) = &self.current {
            handle
                .stream
                .pause()
                .map_err(|e| AudioError::OutputError(e.into()))?;
        }
        *self.shared.state.write() = EngineState::Paused;
        debug!(
            position_ms = self.shared.position_ms.load(SeqCst),
            "Playback paused"
        );
        Ok(())
    }

    fn handle_seek(&mut self, position_ms: u64) -> Result<(), AudioError> {
        let was_playing = *self.shared.state.read() == EngineState::Playing;
        self.setup_playback_stream(position_ms, was_playing)
    }

    /// Replaces the running pipeline with one starting at `position_ms`.
    ///
    /// The file is opened and positioned before the running pipeline is torn
    /// down; on failure the caller decides what happens to it.
    fn setup_playback_stream(&mut self, position_ms: u64, play: bool) -> Result<(), AudioError> {
        let mut decoder = open_decoder(&self.path)?;
        if position_ms > 0 {
            decoder.seek(position_ms)?;
        }

        self.start_pipeline(decoder, position_ms, play)
    }

    /// Builds and starts a pipeline fed by `decoder`, which must already be
    /// positioned at `position_ms`.
    fn start_pipeline(
        &mut self,
        decoder: AudioDecoder,
        position_ms: u64,
        play: bool,
    ) -> Result<(), AudioError> {
        self.stop_stream();

        let channels = usize::try_from(self.source.channels).unwrap_or(2);
        let decoder_finished = Arc::new(AtomicBool::new(false));
        let source_finished = Arc::new(AtomicBool::new(false));
        self.shared.drained.store(false, SeqCst);
        self.shared.position_ms.store(position_ms, SeqCst);

        let (producer, consumer) = RingBuffer::<f32>::new(RING_BUFFER_SIZE);

        let (stream_consumer, resampling_consumer) = if self.target.needs_resampling {
            let (resampled_producer, resampled_consumer) =
                RingBuffer::<f32>::new(RING_BUFFER_SIZE);
            let resampler = ResamplingAudioConsumer::new(
                consumer,
                resampled_producer,
                self.source.sample_rate,
                self.target.stream_config.sample_rate,
                channels,
                Arc::clone(&decoder_finished),
                Arc::clone(&source_finished),
            )?;
            (resampled_consumer, Some(resampler))
        } else {
            (consumer, None)
        };
        // Without a resampler the decoder raises the stream's flag directly
        let producer_finished = if resampling_consumer.is_some() {
            decoder_finished
        } else {
            Arc::clone(&source_finished)
        };

        let clock = PlaybackClock {
            position_ms: Arc::clone(&self.shared.position_ms),
            base_ms: position_ms,
            source_finished,
            drained: Arc::clone(&self.shared.drained),
            generation: Arc::clone(&self.shared.generation),
            stream_generation: self.shared.generation.load(SeqCst),
        };
        let stream = self
            .output
            .create_stream(&self.target, channels, stream_consumer, clock)?;

        let producer = AudioProducer::new(decoder, producer, producer_finished);
        let decoder_handle = spawn(move || producer.run());

        let result: Result<(), OutputError> = if play {
            stream.play().map_err(OutputError::from)
        } else {
            stream.pause().map_err(OutputError::from)
        };

        self.current = Some(StreamHandle {
            stream,
            decoder_handle: Some(decoder_handle),
            resampling_consumer,
        });

        result.map_err(AudioError::OutputError)?;
        *self.shared.state.write() = if play {
            EngineState::Playing
        } else {
            EngineState::Paused
        };

        debug!(
            position_ms,
            play,
            device = %self.output.device_name(),
            "Playback stream ready"
        );
        Ok(())
    }

    /// Tears the pipeline down and reports the track as played out, so the
    /// caller sees the end of the track instead of a silent stream.
    fn end_track(&mut self) {
        self.stop_stream();
        self.shared.drained.store(true, SeqCst);
        debug!("Track ended after a failed rebuild");
    }

    fn stop_stream(&mut self) {
        if let Some(handle) = self.current.take() {
            debug!("Stopping audio stream");
            handle.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{env::var, io::Write};

    use tempfile::NamedTempFile;

    use crate::{
        audio::{
            engine::{AudioEngine, EngineState},
            output::OutputConfig,
        },
        error::AudioError,
    };

    #[test]
    fn test_missing_file_is_access_denied() {
        let result = AudioEngine::open("/definitely/not/here.ogg", OutputConfig::default());
        assert!(matches!(result, Err(AudioError::AccessDenied { .. })));
    }

    #[test]
    fn test_non_audio_file_is_a_decoder_error() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(b"plain text, no audio here").unwrap();

        let result = AudioEngine::open(file.path(), OutputConfig::default());
        assert!(matches!(result, Err(AudioError::DecoderError(_))));
    }

    #[test]
    #[ignore = "Requires an audio output device and PICKPLAY_TEST_FILE"]
    fn test_play_pause_seek_on_device() {
        let Ok(path) = var("PICKPLAY_TEST_FILE") else {
            return;
        };

        let engine = AudioEngine::open(&path, OutputConfig::default()).unwrap();
        assert_eq!(engine.state(), EngineState::Paused);
        assert_eq!(engine.position_ms(), 0);

        engine.play().unwrap();
        assert_eq!(engine.state(), EngineState::Playing);

        engine.seek(1_500).unwrap();
        assert!(engine.position_ms() >= 1_500);

        engine.pause().unwrap();
        assert_eq!(engine.state(), EngineState::Paused);
    }
}
