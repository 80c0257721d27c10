//! Energy-based utterance endpointing and WAV encoding for hosted transcription.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};

/// Endpointing thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    pub sample_rate: u32,
    /// RMS level above which a frame counts as speech
    pub threshold: f32,
    /// Trailing silence that closes the utterance
    pub silence: Duration,
    /// Hard cap on the whole listening episode
    pub max_duration: Duration,
}

/// What the endpointer decided after a chunk of audio.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Keep listening.
    Pending,
    /// Speech followed by enough silence (or the length cap): the utterance samples.
    Utterance(Vec<f32>),
    /// The length cap was reached without any speech.
    NoSpeech,
}

/// Detects one utterance in a stream of mono samples by frame energy.
#[derive(Debug)]
pub struct Endpointer {
    config: EndpointConfig,
    frame_len: usize,
    frame: Vec<f32>,
    samples: Vec<f32>,
    heard_speech: bool,
    silent_samples: usize,
    elapsed: usize,
}

impl Endpointer {
    pub fn new(config: EndpointConfig) -> Self {
        // 30 ms frames
        let frame_len = (config.sample_rate as usize * 30 / 1000).max(1);
        Self { config, frame_len, frame: Vec::with_capacity(frame_len), samples: Vec::new(), heard_speech: false, silent_samples: 0, elapsed: 0 }
    }

    fn samples_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.config.sample_rate as f64) as usize
    }

    /// Feed captured samples.
    pub fn push(&mut self, chunk: &[f32]) -> Endpoint {
        for &sample in chunk {
            self.elapsed += 1;
            self.frame.push(sample);
            if self.frame.len() < self.frame_len {
                continue;
            }

            let speech = rms(&self.frame) >= self.config.threshold;
            if speech {
                self.heard_speech = true;
                self.silent_samples = 0;
            } else {
                self.silent_samples += self.frame.len();
            }
            // Leading silence is not kept
            if self.heard_speech {
                self.samples.append(&mut self.frame);
            } else {
                self.frame.clear();
            }

            if self.heard_speech && self.silent_samples >= self.samples_for(self.config.silence) {
                return Endpoint::Utterance(std::mem::take(&mut self.samples));
            }
        }

        if self.elapsed >= self.samples_for(self.config.max_duration) {
            return self.finish();
        }
        Endpoint::Pending
    }

    /// Input ended: return whatever speech was heard.
    pub fn finish(&mut self) -> Endpoint {
        if self.heard_speech {
            self.samples.append(&mut self.frame);
            Endpoint::Utterance(std::mem::take(&mut self.samples))
        } else {
            Endpoint::NoSpeech
        }
    }
}

/// Root mean square of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
///
/// # Errors
/// Returns an error if the WAV writer fails.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("Failed to start WAV encoding")?;
        for &sample in samples {
            let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(pcm).context("Failed to write WAV sample")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn config() -> EndpointConfig {
        EndpointConfig { sample_rate: RATE, threshold: 0.05, silence: Duration::from_millis(300), max_duration: Duration::from_secs(5) }
    }

    fn tone(ms: u64) -> Vec<f32> {
        let n = (RATE as u64 * ms / 1000) as usize;
        (0..n).map(|i| 0.3 * (i as f32 * 0.2).sin()).collect()
    }

    fn silence(ms: u64) -> Vec<f32> {
        vec![0.0; (RATE as u64 * ms / 1000) as usize]
    }

    #[test]
    fn test_utterance_closed_by_trailing_silence() {
        let mut endpointer = Endpointer::new(config());
        assert_eq!(endpointer.push(&silence(200)), Endpoint::Pending);
        assert_eq!(endpointer.push(&tone(600)), Endpoint::Pending);

        match endpointer.push(&silence(400)) {
            Endpoint::Utterance(samples) => {
                // Leading silence dropped, speech plus the closing silence kept
                let len = samples.len();
                assert!(len >= tone(600).len() && len < tone(600).len() + silence(400).len(), "len {}", len);
            }
            other => panic!("expected utterance, got {:?}", other),
        }
    }

    #[test]
    fn test_silence_only_reports_no_speech() {
        let mut endpointer = Endpointer::new(config());
        assert_eq!(endpointer.push(&silence(5100)), Endpoint::NoSpeech);
    }

    #[test]
    fn test_max_duration_caps_speech() {
        let mut endpointer = Endpointer::new(config());
        assert!(matches!(endpointer.push(&tone(5100)), Endpoint::Utterance(_)));
    }

    #[test]
    fn test_finish_flushes_partial_speech() {
        let mut endpointer = Endpointer::new(config());
        endpointer.push(&tone(100));
        assert!(matches!(endpointer.finish(), Endpoint::Utterance(_)));
        assert_eq!(Endpointer::new(config()).finish(), Endpoint::NoSpeech);
    }

    #[test]
    fn test_wav_round_trips_through_reader() {
        let wav = encode_wav(&[0.0, 0.5, -0.5, 1.5], RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, RATE);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);
        // Out-of-range input is clamped
        assert_eq!(samples[3], i16::MAX);
    }
}
