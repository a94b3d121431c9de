//! Clip rendering settings
//!
//! Every option has a documented default so partially specified settings
//! (common from browser-side storage) always resolve to a complete set.
//! Values are corrected once, at renderer entry, by [`RenderSettings::normalized`].

use super::colormap::Colormap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;

pub const DEFAULT_DB_RANGE: [f32; 2] = [-80.0, -20.0];
pub const DEFAULT_BANDPASS_RANGE: [f32; 2] = [500.0, 8000.0];
pub const DEFAULT_WINDOW_SIZE: usize = 512;
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Smallest and largest accepted STFT window
const MIN_WINDOW_SIZE: usize = 16;
const MAX_WINDOW_SIZE: usize = 16384;

/// Largest accepted output image edge in pixels
const MAX_IMAGE_SIZE: u32 = 4096;

/// Largest accepted target sample rate in Hz
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Rendering options for one clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Target sample rate; `None` keeps the file's native rate
    pub sample_rate: Option<u32>,

    /// STFT window length in samples (50% overlap)
    pub spec_window_size: usize,

    pub spectrogram_colormap: Colormap,

    /// Display range in dB; values outside are clipped
    #[serde(rename = "dB_range")]
    pub db_range: [f32; 2],

    pub use_bandpass: bool,
    pub bandpass_range: [f32; 2],

    pub show_reference_frequency: bool,
    pub reference_frequency: f32,

    /// Resize to `image_width` x `image_height`, ignoring aspect ratio
    pub resize_images: bool,
    pub image_width: u32,
    pub image_height: u32,

    /// Peak-normalise the returned audio
    pub normalize_audio: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_rate: None,
            spec_window_size: DEFAULT_WINDOW_SIZE,
            spectrogram_colormap: Colormap::default(),
            db_range: DEFAULT_DB_RANGE,
            use_bandpass: false,
            bandpass_range: DEFAULT_BANDPASS_RANGE,
            show_reference_frequency: false,
            reference_frequency: 1000.0,
            resize_images: true,
            image_width: DEFAULT_IMAGE_SIZE,
            image_height: DEFAULT_IMAGE_SIZE,
            normalize_audio: true,
        }
    }
}

impl RenderSettings {
    /// Build settings from a JSON object, filling unspecified fields with defaults
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other),
        }
    }

    /// Return a copy with out-of-range values replaced by their defaults.
    ///
    /// Never fails: an inverted or non-finite dB range, an out-of-range window,
    /// image size or sample rate is corrected with a warning.
    pub fn normalized(&self) -> Self {
        let mut s = self.clone();

        let [lo, hi] = s.db_range;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            warn!(
                db_min = lo,
                db_max = hi,
                "Invalid dB range, using {:?}",
                DEFAULT_DB_RANGE
            );
            s.db_range = DEFAULT_DB_RANGE;
        }

        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&s.spec_window_size) {
            warn!(
                window_size = s.spec_window_size,
                "Invalid spectrogram window size, using {}", DEFAULT_WINDOW_SIZE
            );
            s.spec_window_size = DEFAULT_WINDOW_SIZE;
        }

        if s.image_width == 0 || s.image_width > MAX_IMAGE_SIZE {
            s.image_width = DEFAULT_IMAGE_SIZE;
        }
        if s.image_height == 0 || s.image_height > MAX_IMAGE_SIZE {
            s.image_height = DEFAULT_IMAGE_SIZE;
        }

        if let Some(rate) = s.sample_rate {
            if rate == 0 || rate > MAX_SAMPLE_RATE {
                warn!(sample_rate = rate, "Invalid sample rate, keeping the native rate");
                s.sample_rate = None;
            }
        }

        if s.use_bandpass {
            let [low, high] = s.bandpass_range;
            if !low.is_finite() || !high.is_finite() || low < 0.0 || low >= high {
                warn!(low, high, "Invalid bandpass range, using {:?}", DEFAULT_BANDPASS_RANGE);
                s.bandpass_range = DEFAULT_BANDPASS_RANGE;
            }
        }

        if !s.reference_frequency.is_finite() || s.reference_frequency < 0.0 {
            s.show_reference_frequency = false;
        }

        s
    }
}

/// Overlay `overrides` onto `base`, key by key
pub fn merge_settings(base: Option<&Map<String, Value>>, overrides: Option<&Map<String, Value>>) -> Value {
    let mut merged = base.cloned().unwrap_or_default();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Deterministic cache key over file, time window and the settings as requested
pub fn cache_key(file_path: &Path, start_time: f64, end_time: f64, settings: &RenderSettings) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(start_time.to_bits().to_le_bytes());
    hasher.update(end_time.to_bits().to_le_bytes());
    // Serialization of a fixed struct is field-ordered, so equal settings hash equally
    if let Ok(json) = serde_json::to_vec(settings) {
        hasher.update(&json);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings = RenderSettings::from_json(json!({
            "spectrogram_colormap": "viridis",
            "dB_range": [-90, -10]
        }))
        .unwrap();

        assert_eq!(settings.spectrogram_colormap, Colormap::Viridis);
        assert_eq!(settings.db_range, [-90.0, -10.0]);
        assert_eq!(settings.spec_window_size, 512);
        assert!(settings.resize_images);
        assert_eq!(settings.sample_rate, None);
    }

    #[test]
    fn test_inverted_db_range_is_corrected() {
        let settings = RenderSettings {
            db_range: [-20.0, -80.0],
            ..Default::default()
        };
        assert_eq!(settings.normalized().db_range, DEFAULT_DB_RANGE);

        let equal = RenderSettings {
            db_range: [-40.0, -40.0],
            ..Default::default()
        };
        assert_eq!(equal.normalized().db_range, DEFAULT_DB_RANGE);
    }

    #[test]
    fn test_absurd_sample_rate_keeps_native_rate() {
        let huge = RenderSettings {
            sample_rate: Some(4_000_000_000),
            ..Default::default()
        };
        assert_eq!(huge.normalized().sample_rate, None);

        let zero = RenderSettings {
            sample_rate: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.normalized().sample_rate, None);

        let ok = RenderSettings {
            sample_rate: Some(MAX_SAMPLE_RATE),
            ..Default::default()
        };
        assert_eq!(ok.normalized().sample_rate, Some(MAX_SAMPLE_RATE));
    }

    #[test]
    fn test_valid_settings_survive_normalisation() {
        let settings = RenderSettings {
            db_range: [-100.0, 0.0],
            spec_window_size: 1024,
            use_bandpass: true,
            bandpass_range: [1000.0, 4000.0],
            ..Default::default()
        };
        assert_eq!(settings.normalized(), settings);
    }

    #[test]
    fn test_merge_overrides_replace_base_keys() {
        let base = json!({"spectrogram_colormap": "greys", "image_width": 100});
        let overrides = json!({"image_width": 300});
        let merged = merge_settings(base.as_object(), overrides.as_object());
        assert_eq!(merged, json!({"spectrogram_colormap": "greys", "image_width": 300}));
    }

    #[test]
    fn test_cache_key_changes_with_any_setting() {
        let path = PathBuf::from("/audio/a.wav");
        let base = RenderSettings::default();
        let key = cache_key(&path, 1.0, 4.0, &base);

        assert_eq!(key, cache_key(&path, 1.0, 4.0, &RenderSettings::default()));

        let variants = [
            RenderSettings {
                spectrogram_colormap: Colormap::Viridis,
                ..Default::default()
            },
            RenderSettings {
                db_range: [-81.0, -20.0],
                ..Default::default()
            },
            RenderSettings {
                use_bandpass: true,
                ..Default::default()
            },
            RenderSettings {
                image_width: 225,
                ..Default::default()
            },
            RenderSettings {
                sample_rate: Some(32000),
                ..Default::default()
            },
        ];
        for variant in &variants {
            assert_ne!(key, cache_key(&path, 1.0, 4.0, variant));
        }

        assert_ne!(key, cache_key(&path, 1.0, 4.5, &base));
        assert_ne!(key, cache_key(Path::new("/audio/b.wav"), 1.0, 4.0, &base));
    }
}
