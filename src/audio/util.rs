//! Device helpers shared by capture and playback.

use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

/// Human-readable device name, or "Unknown".
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Pick a mono or stereo F32 configuration, at `target_sample_rate` when the
/// device supports it, otherwise at the closest supported rate.
///
/// # Errors
/// Returns an error when the device offers no mono/stereo F32 configuration.
pub fn find_best_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_sample_rate: u32) -> Result<SupportedStreamConfig> {
    let candidates: Vec<SupportedStreamConfigRange> = configs.filter(|c| c.channels() <= 2 && c.sample_format() == SampleFormat::F32).collect();

    if let Some(config) = candidates.iter().find(|c| (c.min_sample_rate()..=c.max_sample_rate()).contains(&target_sample_rate)) {
        return Ok((*config).with_sample_rate(target_sample_rate));
    }

    let config = candidates.first().ok_or_else(|| anyhow::anyhow!("No F32 audio configuration found"))?;
    let rate = target_sample_rate.clamp(config.min_sample_rate(), config.max_sample_rate());
    Ok((*config).with_sample_rate(rate))
}

/// Downmix interleaved samples to mono by averaging each frame.
pub fn convert_to_mono_f32_f32(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_to_mono_f32() {
        let data = vec![0.5f32, 1.0, -0.5, -1.0];
        assert_eq!(convert_to_mono_f32_f32(&data, 2), vec![0.75, -0.75]);
    }

    #[test]
    fn test_mono_passthrough() {
        let data = vec![0.1f32, 0.2];
        assert_eq!(convert_to_mono_f32_f32(&data, 1), data);
    }
}
