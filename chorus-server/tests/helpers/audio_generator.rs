//! Audio Test Fixture Generator

use std::path::{Path, PathBuf};

/// Configuration for a generated tone
#[derive(Debug, Clone)]
pub struct ToneConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f32,
    pub amplitude: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 3.0,
            sample_rate: 16000,
            channels: 1,
            frequency: 2000.0,
            amplitude: 0.5,
        }
    }
}

/// Write a 16-bit PCM sine tone to `path`
pub fn generate_test_wav(path: &Path, config: &ToneConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let value = config.amplitude * (2.0 * std::f32::consts::PI * config.frequency * t).sin();
        let sample = (value * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}
