//! Clip renderer: (file, window, settings) -> base64 WAV + base64 PNG
//!
//! Pipeline, in order:
//! 1. Validate the window and resolve the file
//! 2. Decode the window (resampled when a rate is requested)
//! 3. Peak-normalise, then band-pass filter when enabled
//! 4. PSD spectrogram, optional reference line, crop to the band
//! 5. Clip to the dB range, normalise, colormap (high frequencies on top)
//! 6. Optional fixed-size resize
//! 7. Encode PNG and 16-bit WAV, base64 both
//!
//! Settings are corrected once on entry; no step after that can fail because
//! of a bad setting.

use super::colormap::Colormap;
use super::decode::{decode_window, resample};
use super::dsp::{bandpass, peak_normalize, spectrogram, Spectrogram};
use super::error::RenderError;
use super::model::{ClipPayload, ClipRequest};
use super::settings::RenderSettings;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Renders one clip. Implementations must be deterministic for equal requests.
pub trait ClipRenderer: Send + Sync {
    fn render(&self, request: &ClipRequest) -> Result<ClipPayload, RenderError>;
}

/// Production renderer backed by symphonia, realfft and image
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectrogramRenderer;

impl SpectrogramRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl ClipRenderer for SpectrogramRenderer {
    fn render(&self, request: &ClipRequest) -> Result<ClipPayload, RenderError> {
        render_clip(request)
    }
}

/// Run the full pipeline for one request
pub fn render_clip(request: &ClipRequest) -> Result<ClipPayload, RenderError> {
    validate_window(request.start_time, request.end_time)?;
    if !request.file_path.is_file() {
        return Err(RenderError::FileNotFound(request.file_path.display().to_string()));
    }

    let settings = request.settings.normalized();

    let mut clip = decode_window(&request.file_path, request.start_time, request.end_time)?;
    if let Some(rate) = settings.sample_rate {
        clip = resample(clip, rate)?;
    }
    let sample_rate = clip.sample_rate;

    if settings.normalize_audio {
        peak_normalize(&mut clip.samples);
    }
    if settings.use_bandpass {
        let [low, high] = settings.bandpass_range;
        bandpass(&mut clip.samples, sample_rate, low, high);
    }

    let mut spec = spectrogram(&clip.samples, sample_rate, settings.spec_window_size)
        .map_err(RenderError::Encode)?;

    if settings.show_reference_frequency {
        let bin = spec.nearest_bin(settings.reference_frequency);
        let level = settings.db_range[1];
        spec.row_mut(bin).fill(level);
    }

    let (low_bin, high_bin) = if settings.use_bandpass {
        let [low, high] = settings.bandpass_range;
        (spec.nearest_bin(low), spec.nearest_bin(high))
    } else {
        (0, spec.bins - 1)
    };

    let mut image = spectrogram_image(&spec, low_bin, high_bin, &settings);
    if settings.resize_images {
        image = imageops::resize(
            &image,
            settings.image_width,
            settings.image_height,
            FilterType::Triangle,
        );
    }

    let png = encode_png(&image)?;
    let wav = encode_wav(&clip.samples, sample_rate)?;

    debug!(
        file = %request.file_path.display(),
        start = request.start_time,
        end = request.end_time,
        width = image.width(),
        height = image.height(),
        "Rendered clip"
    );

    Ok(ClipPayload {
        audio_base64: STANDARD.encode(wav),
        spectrogram_base64: STANDARD.encode(png),
        sample_rate,
        duration: clip.duration(),
        frequency_range: [low_bin as f32 * spec.bin_hz, high_bin as f32 * spec.bin_hz],
        file_path: request.file_path.clone(),
        start_time: request.start_time,
        end_time: request.end_time,
    })
}

fn validate_window(start: f64, end: f64) -> Result<(), RenderError> {
    if !start.is_finite() || !end.is_finite() {
        return Err(RenderError::InvalidRequest("Times must be finite".to_string()));
    }
    if start < 0.0 {
        return Err(RenderError::InvalidRequest(format!(
            "start_time must be >= 0, got {}",
            start
        )));
    }
    if end <= start {
        return Err(RenderError::InvalidRequest(format!(
            "end_time ({}) must be greater than start_time ({})",
            end, start
        )));
    }
    Ok(())
}

/// Map rows `low_bin..=high_bin` to an RGB image, highest frequency in row 0
fn spectrogram_image(
    spec: &Spectrogram,
    low_bin: usize,
    high_bin: usize,
    settings: &RenderSettings,
) -> RgbImage {
    let (low_bin, high_bin) = if low_bin <= high_bin {
        (low_bin, high_bin)
    } else {
        (high_bin, low_bin)
    };
    let rows = (high_bin - low_bin + 1) as u32;
    let cols = spec.frames as u32;
    let [db_min, db_max] = settings.db_range;
    let span = db_max - db_min;
    let colormap: Colormap = settings.spectrogram_colormap;

    RgbImage::from_fn(cols, rows, |x, y| {
        let bin = high_bin - y as usize;
        let db = spec.value(bin, x as usize);
        let t = if db.is_nan() {
            0.0
        } else {
            (db.clamp(db_min, db_max) - db_min) / span
        };
        image::Rgb(colormap.rgb(t))
    })
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(format!("PNG encoding failed: {}", e)))?;
    Ok(cursor.into_inner())
}

/// 16-bit PCM mono WAV
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, RenderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| RenderError::Encode(format!("WAV header failed: {}", e)))?;
        for &s in samples {
            let value = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer
                .write_sample(value)
                .map_err(|e| RenderError::Encode(format!("WAV write failed: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| RenderError::Encode(format!("WAV finalize failed: {}", e)))?;
    }
    Ok(cursor.into_inner())
}
