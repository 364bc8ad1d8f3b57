//! Sample rate conversion for devices that cannot run at the file's rate.
//!
//! This module provides real-time sample rate conversion using the `rubato`
//! crate. A dedicated thread pulls interleaved samples from the decoder's
//! ring buffer, resamples them and pushes them into the ring buffer the
//! output callback drains.

use std::{
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering::{Relaxed, SeqCst},
        },
    },
    thread::{JoinHandle, sleep, spawn, yield_now},
    time::Duration,
};

use {
    rtrb::{Consumer, PopError::Empty, Producer, PushError::Full},
    rubato::{FftFixedIn, Resampler},
    thiserror::Error,
    tracing::{debug, error, info},
};

/// Samples pulled from the source ring buffer per iteration.
const INPUT_BUFFER_SIZE: usize = 4096;

/// Back-off when the output ring buffer is full.
const TARGET_FULL_SLEEP: Duration = Duration::from_micros(50);

/// Error type for resampling operations.
#[derive(Error, Debug)]
pub enum ResamplingError {
    /// Rubato resampling error.
    #[error("Rubato error: {0}")]
    RubatoError(String),
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Real-time audio resampler using rubato.
///
/// Accepts interleaved input of any length, buffers partial chunks and
/// returns whatever complete chunks could be converted.
pub struct AudioResampler {
    /// Rubato resampler instance.
    resampler: FftFixedIn<f32>,
    /// Source sample rate in Hz.
    source_rate: u32,
    /// Target sample rate in Hz.
    target_rate: u32,
    /// Number of channels.
    channels: usize,
    /// Accumulated interleaved input buffer (may hold partial frames).
    input_buffer: Vec<f32>,
    /// Interleaved output of the last call.
    output_buffer: Vec<f32>,
}

impl AudioResampler {
    /// Creates a new audio resampler.
    ///
    /// # Errors
    ///
    /// Returns `ResamplingError` if the rates or channel count are invalid or
    /// rubato rejects the configuration.
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        channels: usize,
    ) -> Result<Self, ResamplingError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(ResamplingError::InvalidConfiguration(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if source_rate == target_rate {
            return Err(ResamplingError::InvalidConfiguration(
                "Source and target rates must be different".to_string(),
            ));
        }

        if channels == 0 {
            return Err(ResamplingError::InvalidConfiguration(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        let chunk_size = calculate_chunk_size(source_rate, target_rate);

        let resampler = FftFixedIn::<f32>::new(
            source_rate as usize,
            target_rate as usize,
            chunk_size,
            1, // sub_chunks
            channels,
        )
        .map_err(|e| ResamplingError::RubatoError(e.to_string()))?;

        info!(
            "Created resampler: {} Hz -> {} Hz, {} channels, chunk size: {}",
            source_rate, target_rate, channels, chunk_size
        );

        Ok(AudioResampler {
            resampler,
            source_rate,
            target_rate,
            channels,
            input_buffer: Vec::with_capacity(chunk_size * channels),
            output_buffer: Vec::new(),
        })
    }

    /// Resamples a block of interleaved samples.
    ///
    /// Input that does not fill a whole chunk is kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns `ResamplingError` if resampling fails.
    pub fn resample_block(&mut self, input_samples: &[f32]) -> Result<&[f32], ResamplingError> {
        self.input_buffer.extend_from_slice(input_samples);
        self.output_buffer.clear();

        loop {
            let needed_frames = self.resampler.input_frames_next();
            if self.input_buffer.len() / self.channels < needed_frames {
                break;
            }
            self.process_chunk(needed_frames)?;
        }

        Ok(&self.output_buffer)
    }

    /// Converts whatever input is still buffered, padding the last chunk
    /// with silence, and pushes the filter delay out after it.
    ///
    /// Call once the source has ended; the output is trimmed to the length
    /// the pending input maps to.
    ///
    /// # Errors
    ///
    /// Returns `ResamplingError` if resampling fails.
    pub fn flush(&mut self) -> Result<&[f32], ResamplingError> {
        self.output_buffer.clear();

        let ch = self.channels;
        let pending_frames = self.input_buffer.len() / ch;
        self.input_buffer.truncate(pending_frames * ch);
        if pending_frames == 0 {
            return Ok(&self.output_buffer);
        }

        let delay_frames = self.resampler.output_delay();
        let wanted = (self.expected_output_size(pending_frames) + delay_frames) * ch;

        while self.output_buffer.len() < wanted {
            let needed_frames = self.resampler.input_frames_next();
            self.input_buffer.resize(needed_frames * ch, 0.0);
            self.process_chunk(needed_frames)?;
        }

        // Anything past the pending input and the filter delay is padding
        self.output_buffer.truncate(wanted);
        Ok(&self.output_buffer)
    }

    /// Converts the first `frames` buffered frames and appends the result
    /// to the output.
    fn process_chunk(&mut self, frames: usize) -> Result<(), ResamplingError> {
        let ch = self.channels;

        let mut planar_in: Vec<Vec<f32>> = (0..ch).map(|_| Vec::with_capacity(frames)).collect();
        for frame in self.input_buffer[..frames * ch].chunks_exact(ch) {
            for (plane, &sample) in planar_in.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }

        let planar_out = self
            .resampler
            .process(&planar_in, None)
            .map_err(|e| ResamplingError::RubatoError(e.to_string()))?;

        let out_frames = planar_out.first().map_or(0, Vec::len);
        for frame in 0..out_frames {
            self.output_buffer
                .extend(planar_out.iter().map(|plane| plane[frame]));
        }

        self.input_buffer.drain(..frames * ch);
        Ok(())
    }

    /// Gets the expected output size for a given input size (per channel).
    #[must_use]
    pub fn expected_output_size(&self, input_size: usize) -> usize {
        let in_rate = u64::from(self.source_rate);
        let out_rate = u64::from(self.target_rate);
        ((input_size as u64 * out_rate) / in_rate) as usize
    }
}

/// Calculates an appropriate chunk size for resampling based on sample rates.
fn calculate_chunk_size(source_rate: u32, target_rate: u32) -> usize {
    let gcd = gcd(source_rate, target_rate);
    let lcm = (u64::from(source_rate) * u64::from(target_rate)) / u64::from(gcd);

    let base_chunk = (lcm / u64::from(source_rate)).min(4096) as usize;

    base_chunk.clamp(256, 8192)
}

/// Calculates the greatest common divisor of two numbers.
fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Resampling stage between the decoder and the output callback.
///
/// Owns a worker thread that reads from the decoder's ring buffer, resamples
/// and writes into the ring buffer drained by the output stream. Once the
/// decoder reports it is done and its buffer is empty, the tail is flushed
/// and the stage reports itself done in turn.
pub struct ResamplingAudioConsumer {
    /// Running flag for the resampling thread.
    running: Arc<AtomicBool>,
    /// Resampling thread handle.
    thread_handle: Option<JoinHandle<()>>,
}

impl ResamplingAudioConsumer {
    /// Starts a resampling thread.
    ///
    /// # Arguments
    ///
    /// * `input_finished` - Raised by the decoder after its last sample
    /// * `output_finished` - Raised here after the last resampled sample
    ///
    /// # Errors
    ///
    /// Returns `ResamplingError` if the resampler cannot be created.
    pub fn new(
        source_consumer: Consumer<f32>,
        target_producer: Producer<f32>,
        source_rate: u32,
        target_rate: u32,
        channels: usize,
        input_finished: Arc<AtomicBool>,
        output_finished: Arc<AtomicBool>,
    ) -> Result<Self, ResamplingError> {
        let resampler = AudioResampler::new(source_rate, target_rate, channels)?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let thread_handle = Some(spawn(move || {
            let stages = Stages {
                source: source_consumer,
                target: target_producer,
                input_finished,
            };
            if resampling_loop(stages, resampler, &running_clone) {
                output_finished.store(true, SeqCst);
            }
        }));

        Ok(ResamplingAudioConsumer {
            running,
            thread_handle,
        })
    }

    /// Stops the resampling thread and waits for it.
    pub fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            self.running.store(false, Relaxed);
            let _ = handle.join();
        }
    }
}

impl Drop for ResamplingAudioConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ring buffers around the resampling thread.
struct Stages {
    source: Consumer<f32>,
    target: Producer<f32>,
    /// Raised by the decoder after its last push.
    input_finished: Arc<AtomicBool>,
}

/// Main resampling loop that runs in a dedicated thread.
///
/// Returns `true` when the whole source was converted and pushed, `false`
/// when it was stopped early.
fn resampling_loop(
    mut stages: Stages,
    mut resampler: AudioResampler,
    running: &AtomicBool,
) -> bool {
    let mut input_buffer = Vec::with_capacity(INPUT_BUFFER_SIZE);

    while running.load(Relaxed) {
        // Read before popping: once set, every sample is already queued
        let source_done = stages.input_finished.load(SeqCst);

        input_buffer.clear();
        while input_buffer.len() < INPUT_BUFFER_SIZE {
            match stages.source.pop() {
                Ok(sample) => input_buffer.push(sample),
                Err(Empty) => break,
            }
        }

        if input_buffer.is_empty() {
            if source_done {
                return flush_tail(&mut stages.target, &mut resampler, running);
            }
            yield_now();
            continue;
        }

        match resampler.resample_block(&input_buffer) {
            Ok(resampled) => {
                for &sample in resampled {
                    if !push_sample(&mut stages.target, sample, running) {
                        return false;
                    }
                }
            }
            Err(e) => {
                error!("Resampling error: {}", e);

                // Keep timing by writing silence for the lost block
                let silence = resampler.expected_output_size(input_buffer.len() / resampler.channels)
                    * resampler.channels;
                for _ in 0..silence {
                    if !push_sample(&mut stages.target, 0.0, running) {
                        return false;
                    }
                }
            }
        }
    }

    debug!("Resampling loop stopped");
    false
}

/// Pushes the resampler's buffered tail. Returns `true` once it is all queued.
fn flush_tail(
    target: &mut Producer<f32>,
    resampler: &mut AudioResampler,
    running: &AtomicBool,
) -> bool {
    match resampler.flush() {
        Ok(tail) => {
            for &sample in tail {
                if !push_sample(target, sample, running) {
                    return false;
                }
            }
        }
        Err(e) => error!("Failed to flush resampler: {e}"),
    }

    debug!("Resampling finished");
    true
}

/// Pushes one sample, waiting while the target is full. Returns `false` once
/// the loop should stop.
fn push_sample(target: &mut Producer<f32>, sample: f32, running: &AtomicBool) -> bool {
    loop {
        if !running.load(Relaxed) || target.is_abandoned() {
            return false;
        }
        match target.push(sample) {
            Ok(()) => return true,
            Err(Full(_)) => sleep(TARGET_FULL_SLEEP),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering::SeqCst},
        },
        thread::sleep,
        time::{Duration, Instant},
    };

    use rtrb::RingBuffer;

    use crate::audio::resampler::{
        AudioResampler, ResamplingAudioConsumer, ResamplingError::InvalidConfiguration,
        calculate_chunk_size, gcd,
    };

    #[test]
    fn test_gcd_calculation() {
        assert_eq!(gcd(44100, 48000), 300);
        assert_eq!(gcd(96000, 48000), 48000);
        assert_eq!(gcd(192000, 48000), 48000);
    }

    #[test]
    fn test_chunk_size_calculation() {
        let chunk_size = calculate_chunk_size(44100, 48000);
        assert!((256..=8192).contains(&chunk_size));

        let chunk_size = calculate_chunk_size(192000, 48000);
        assert!((256..=8192).contains(&chunk_size));
    }

    #[test]
    fn test_invalid_resampler_creation() {
        let result = AudioResampler::new(0, 48000, 2);
        assert!(matches!(result, Err(InvalidConfiguration(_))));

        let result = AudioResampler::new(44100, 44100, 2);
        assert!(matches!(result, Err(InvalidConfiguration(_))));

        let result = AudioResampler::new(44100, 48000, 0);
        assert!(matches!(result, Err(InvalidConfiguration(_))));
    }

    #[test]
    fn test_short_input_is_buffered() {
        let mut resampler = AudioResampler::new(44100, 48000, 2).unwrap();
        let output = resampler.resample_block(&[0.0; 8]).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_output_stays_interleaved() {
        let mut resampler = AudioResampler::new(44100, 48000, 2).unwrap();
        let input = vec![0.5_f32; 2 * 8192];
        let output = resampler.resample_block(&input).unwrap();

        assert!(!output.is_empty());
        assert_eq!(output.len() % 2, 0);
    }

    #[test]
    fn test_flush_emits_buffered_tail() {
        let mut resampler = AudioResampler::new(44100, 48000, 2).unwrap();
        assert!(resampler.resample_block(&[0.5; 200]).unwrap().is_empty());

        let expected = resampler.expected_output_size(100) * 2;
        let tail = resampler.flush().unwrap();
        assert!(tail.len() >= expected);
        assert_eq!(tail.len() % 2, 0);

        // Nothing left after a flush
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_stage_finishes_after_source_finishes() {
        let (mut source_producer, source_consumer) = RingBuffer::<f32>::new(1024);
        let (target_producer, target_consumer) = RingBuffer::<f32>::new(8192);
        let input_finished = Arc::new(AtomicBool::new(false));
        let output_finished = Arc::new(AtomicBool::new(false));

        // Shorter than one chunk, so only the flush produces output
        for _ in 0..200 {
            source_producer.push(0.25).unwrap();
        }
        input_finished.store(true, SeqCst);

        let mut stage = ResamplingAudioConsumer::new(
            source_consumer,
            target_producer,
            44100,
            48000,
            1,
            Arc::clone(&input_finished),
            Arc::clone(&output_finished),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !output_finished.load(SeqCst) && Instant::now() < deadline {
            sleep(Duration::from_millis(5));
        }
        stage.stop();

        assert!(output_finished.load(SeqCst));
        assert!(target_consumer.slots() >= 200 * 48000 / 44100);
    }

    #[test]
    fn test_stage_stopped_early_is_not_finished() {
        let (_source_producer, source_consumer) = RingBuffer::<f32>::new(1024);
        let (target_producer, _target_consumer) = RingBuffer::<f32>::new(1024);
        let output_finished = Arc::new(AtomicBool::new(false));

        let mut stage = ResamplingAudioConsumer::new(
            source_consumer,
            target_producer,
            44100,
            48000,
            2,
            Arc::new(AtomicBool::new(false)),
            Arc::clone(&output_finished),
        )
        .unwrap();
        stage.stop();

        assert!(!output_finished.load(SeqCst));
    }

    #[test]
    fn test_expected_output_size() {
        let resampler = AudioResampler::new(44100, 88200, 1).unwrap();
        assert_eq!(resampler.expected_output_size(1000), 2000);
    }
}
