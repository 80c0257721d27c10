//! Audio playback module using cpal.
//!
//! Plays synthesized speech through the default output device with interrupt support.
//! Includes automatic resampling when the device sample rate differs from input.
//! Uses lock-free ring buffer to avoid mutex contention in audio callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::{Condvar, Mutex};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::resampler::resample;
use super::util::{find_best_config, get_device_name};

/// Size of the playback ring buffer in samples (~11 seconds at 48kHz)
const PLAYBACK_RING_SIZE: usize = 524288;

/// Playback completion signal shared with the audio callback.
#[derive(Default)]
struct Completion {
    lock: Mutex<()>,
    done: Condvar,
}

/// Audio player that outputs samples to the speaker.
/// The audio callback only touches atomics and the ring buffer consumer.
pub struct Player {
    /// Kept alive to maintain the audio stream
    _stream: Stream,
    device_sample_rate: u32,
    input_sample_rate: u32,
    producer: Mutex<ringbuf::HeapProd<f32>>,
    /// Set by `interrupt`, makes the callback output silence
    interrupt: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    completion: Arc<Completion>,
}

impl Player {
    /// Create a new audio player.
    ///
    /// # Arguments
    /// * `sample_rate` - The sample rate of the audio to play (24000 for Kokoro)
    ///
    /// # Errors
    /// Returns an error if no output device is available or the stream cannot be built.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().context("No output device available")?;

        info!("Using output device: {}", get_device_name(&device));

        // Prefer the device's own rate and resample into it
        let device_sample_rate = match device.default_output_config() {
            Ok(default_config) => default_config.sample_rate(),
            Err(_) => {
                let supported_configs = device.supported_output_configs().context("Failed to get supported output configs")?;
                find_best_config(supported_configs, 48000)?.sample_rate()
            }
        };

        let supported_configs = device.supported_output_configs().context("Failed to get supported output configs")?;
        let config = find_best_config(supported_configs, device_sample_rate)?;

        debug!("Audio playback config: {} Hz, {} channels, {:?}", device_sample_rate, config.channels(), config.sample_format());

        let ring = HeapRb::<f32>::new(PLAYBACK_RING_SIZE);
        let (producer, mut consumer) = ring.split();

        let interrupt = Arc::new(AtomicBool::new(false));
        let playing = Arc::new(AtomicBool::new(false));
        let completion = Arc::new(Completion::default());

        let interrupt_cb = interrupt.clone();
        let playing_cb = playing.clone();
        let completion_cb = completion.clone();

        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let err_fn = |err| {
            tracing::error!("Audio playback error: {}", err);
        };

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let interrupted = interrupt_cb.load(Ordering::Relaxed);

                for frame in data.chunks_mut(channels) {
                    let sample = if interrupted { 0.0 } else { consumer.try_pop().unwrap_or(0.0) };
                    // Duplicate mono sample to all channels
                    for channel in frame.iter_mut() {
                        *channel = sample;
                    }
                }

                if interrupted {
                    consumer.clear();
                }

                if (consumer.is_empty() || interrupted) && playing_cb.swap(false, Ordering::SeqCst) {
                    let _guard = completion_cb.lock.lock();
                    completion_cb.done.notify_all();
                }
            },
            err_fn,
            None,
        )?;

        stream.play().context("Failed to start playback stream")?;

        info!("Audio playback configured: input {} Hz -> device {} Hz", sample_rate, device_sample_rate);

        Ok(Self {
            _stream: stream,
            device_sample_rate,
            input_sample_rate: sample_rate,
            producer: Mutex::new(producer),
            interrupt,
            playing,
            completion,
        })
    }

    /// Play audio samples, blocking until they finish or playback is interrupted.
    ///
    /// # Returns
    /// `true` if playback completed, `false` if interrupted or timed out.
    /// A pending interrupt is honoured: nothing plays until `reset_interrupt`.
    pub fn play(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }
        if self.interrupt.load(Ordering::SeqCst) {
            debug!("Playback skipped, interrupt pending");
            return false;
        }

        let samples_to_play = if self.device_sample_rate != self.input_sample_rate {
            match resample(samples, self.input_sample_rate, self.device_sample_rate) {
                Ok(resampled) => resampled,
                Err(e) => {
                    tracing::error!("Resampling failed: {}, playing without resampling", e);
                    samples.to_vec()
                }
            }
        } else {
            samples.to_vec()
        };

        {
            let mut producer = self.producer.lock();
            let written = producer.push_slice(&samples_to_play);
            if written < samples_to_play.len() {
                warn!("Playback buffer overflow, dropped {} samples", samples_to_play.len() - written);
            }
        }
        self.playing.store(true, Ordering::SeqCst);

        let duration_secs = samples_to_play.len() as f64 / self.device_sample_rate as f64;
        let deadline = Instant::now() + Duration::from_secs_f64(duration_secs + 1.0);

        let mut guard = self.completion.lock.lock();
        while self.playing.load(Ordering::SeqCst) {
            if self.interrupt.load(Ordering::SeqCst) {
                debug!("Playback interrupted");
                return false;
            }
            if Instant::now() > deadline {
                warn!("Playback timeout exceeded");
                drop(guard);
                self.clear();
                return false;
            }
            // Short timeout so interrupts are noticed promptly
            self.completion.done.wait_for(&mut guard, Duration::from_millis(50));
        }

        !self.interrupt.load(Ordering::SeqCst)
    }

    /// Interrupt current playback; the callback discards what is buffered.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Re-arm the player after an interrupt.
    pub fn reset_interrupt(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }

    /// Stop playback and drain the buffer.
    pub fn clear(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        // Let the callback run once with the interrupt set
        std::thread::sleep(Duration::from_millis(20));
        self.interrupt.store(false, Ordering::SeqCst);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.interrupt.store(true, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}
