//! Microphone capture using cpal.
//!
//! A `Capturer` lives exactly as long as one recognition session. A dedicated
//! thread opens the default input device, owns the cpal stream and hands mono
//! chunks at the recognizer rate to a callback. The cpal callback only pushes
//! into a lock-free ring buffer so it never blocks on the consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{debug, info, warn};

use super::resampler::ResamplerState;
use super::util::{convert_to_mono_f32_f32, find_best_config, get_device_name};

/// Ring buffer size: 65536 samples = ~4 seconds at 16kHz
const CAPTURE_RING_SIZE: usize = 65536;

/// Samples handed to the callback per read.
const READ_CHUNK: usize = 2048;

/// Live microphone stream feeding a callback.
pub struct Capturer {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Capturer {
    /// Open the default input device and start streaming to `callback`.
    /// Returns once the stream is running or has failed to start.
    ///
    /// # Arguments
    /// * `sample_rate` - Rate expected by the recognizer (typically 16000)
    /// * `callback` - Receives mono samples at `sample_rate`
    ///
    /// # Errors
    /// Returns an error if there is no input device, access is denied,
    /// or the stream cannot be built or started.
    pub fn open<F>(sample_rate: u32, mut callback: F) -> Result<Self>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = shutdown.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let (stream, mut consumer) = match start_stream(sample_rate) {
                    Ok(started) => {
                        ready_tx.send(Ok(())).ok();
                        started
                    }
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                        return;
                    }
                };

                let mut read_buffer = vec![0.0f32; READ_CHUNK];
                while !worker_shutdown.load(Ordering::Relaxed) {
                    if consumer.occupied_len() == 0 {
                        std::thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                    let read = consumer.pop_slice(&mut read_buffer);
                    if read > 0 {
                        callback(&read_buffer[..read]);
                    }
                }

                if let Err(e) = stream.pause() {
                    debug!("Failed to pause microphone stream: {}", e);
                }
                drop(stream);
                debug!("Microphone stream released");
            })
            .context("Failed to spawn capture thread")?;

        let mut capturer = Self { shutdown, worker: Some(worker) };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(capturer),
            Ok(Err(e)) => {
                capturer.close();
                Err(e)
            }
            Err(_) => {
                capturer.close();
                anyhow::bail!("Capture thread exited before the microphone opened")
            }
        }
    }

    /// Stop the stream, release the device and join the capture thread.
    /// Safe to call more than once.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            warn!("Capture thread panicked");
        }
    }
}

/// Build and start the input stream, returning it with the consumer side of
/// its ring buffer.
fn start_stream(sample_rate: u32) -> Result<(Stream, HeapCons<f32>)> {
    let host = cpal::default_host();
    let device = host.default_input_device().context("No input device available")?;

    info!("Using input device: {}", get_device_name(&device));

    let supported_configs = device.supported_input_configs().context("Failed to get supported input configs")?;
    let config = find_best_config(supported_configs, sample_rate)?;
    let device_sample_rate = config.sample_rate();
    let channels = config.channels() as usize;

    debug!("Audio capture config: {} Hz, {} channels, {:?}", device_sample_rate, channels, config.sample_format());

    let resampler = if device_sample_rate != sample_rate { Some(ResamplerState::new(device_sample_rate, sample_rate)?) } else { None };

    let (mut producer, consumer) = HeapRb::<f32>::new(CAPTURE_RING_SIZE).split();
    let dropped = Arc::new(AtomicU64::new(0));

    let stream_config: StreamConfig = config.config();
    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = convert_to_mono_f32_f32(data, channels);
                let samples = match &resampler {
                    Some(state) => state.lock().process_samples(&mono),
                    None => Some(mono),
                };
                if let Some(samples) = samples
                    && producer.push_slice(&samples) < samples.len()
                {
                    let count = dropped.fetch_add(1, Ordering::Relaxed);
                    if count.is_multiple_of(100) {
                        warn!("Capture ring buffer full, dropped {} chunks", count + 1);
                    }
                }
            },
            |err| tracing::error!("Audio capture error: {}", err),
            None,
        )
        .context("Failed to open microphone stream")?;

    stream.play().context("Failed to start microphone stream")?;
    info!("🎙️ Microphone open: device {} Hz -> {} Hz", device_sample_rate, sample_rate);

    Ok((stream, consumer))
}

impl Drop for Capturer {
    fn drop(&mut self) {
        self.close();
    }
}
