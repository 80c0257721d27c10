//! Audio resampling with the rubato FFT resampler.
//!
//! `ResamplerState` converts microphone chunks of arbitrary size inside the
//! capture callback; `resample` converts a whole synthesized utterance for playback.

use std::sync::Arc;

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use parking_lot::Mutex;
use rubato::{Fft, FixedSync, Resampler};

/// Frames per FFT block.
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per block (higher = better quality, more CPU).
const SUB_CHUNKS: usize = 2;

fn mono_fft(from_rate: u32, to_rate: u32) -> Result<Fft<f32>> {
    Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1, FixedSync::Input).context("Failed to create resampler")
}

/// Run one full input block through `resampler`, writing into `output`.
fn process_block(resampler: &mut Fft<f32>, block: &[f32], output: &mut [f32]) -> Result<usize> {
    let frames_out = output.len();
    let input = InterleavedSlice::new(block, 1, CHUNK_SIZE).context("Failed to create input adapter")?;
    let mut output = InterleavedSlice::new_mut(output, 1, frames_out).context("Failed to create output adapter")?;
    let (_, written) = resampler.process_into_buffer(&input, &mut output, None).map_err(|e| anyhow::anyhow!("Resampling error: {}", e))?;
    Ok(written)
}

/// Streaming resampler that accumulates input until a full block is available.
pub struct ResamplerState {
    resampler: Fft<f32>,
    pending: Vec<f32>,
    output: Vec<f32>,
}

impl ResamplerState {
    /// Create a shared streaming resampler from `from_rate` to `to_rate`.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Arc<Mutex<Self>>> {
        let resampler = mono_fft(from_rate, to_rate)?;
        let output = vec![0.0f32; resampler.output_frames_max()];
        Ok(Arc::new(Mutex::new(Self { resampler, pending: Vec::with_capacity(CHUNK_SIZE * 2), output })))
    }

    /// Feed samples; returns resampled audio for every complete block, or `None`
    /// while more input is needed.
    pub fn process_samples(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut produced = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let block: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            match process_block(&mut self.resampler, &block, &mut self.output) {
                Ok(written) => produced.extend_from_slice(&self.output[..written]),
                Err(e) => {
                    tracing::debug!("Dropping capture block: {:#}", e);
                    return None;
                }
            }
        }
        (!produced.is_empty()).then_some(produced)
    }
}

/// Resample a complete buffer from `from_rate` to `to_rate`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let mut resampler = mono_fft(from_rate, to_rate)?;
    let mut block_out = vec![0.0f32; resampler.output_frames_max()];
    let expected_len = (samples.len() as f64 * to_rate as f64 / from_rate as f64) as usize;
    let mut output = Vec::with_capacity(expected_len + CHUNK_SIZE);

    for chunk in samples.chunks(CHUNK_SIZE) {
        // Zero-pad the final block
        let mut block = chunk.to_vec();
        block.resize(CHUNK_SIZE, 0.0);
        let written = process_block(&mut resampler, &block, &mut block_out)?;
        output.extend_from_slice(&block_out[..written]);
    }

    // Drop most of the padding, keep a little tail to avoid clipping the last word
    output.truncate(expected_len + 100);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_tts_to_device_rate() {
        // One second of Kokoro output played on a 48kHz device
        let samples = vec![0.0; 24000];
        let result = resample(&samples, 24000, 48000).unwrap();
        assert!(result.len() >= 48000 && result.len() <= 48100, "got {}", result.len());
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.25; 10];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_streaming_waits_for_full_block() {
        let state = ResamplerState::new(48000, 16000).unwrap();
        let mut state = state.lock();
        assert!(state.process_samples(&[0.0; 512]).is_none());
        assert!(state.process_samples(&[0.0; 512]).is_some());
    }
}
