//! Clip request and result types

use super::error::RenderError;
use super::settings::{cache_key, RenderSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One clip to render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    /// Caller-supplied identifier, echoed in the result
    pub clip_id: String,
    pub file_path: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub settings: RenderSettings,
}

impl ClipRequest {
    pub fn new(
        clip_id: impl Into<String>,
        file_path: impl Into<PathBuf>,
        start_time: f64,
        end_time: f64,
    ) -> Self {
        Self {
            clip_id: clip_id.into(),
            file_path: file_path.into(),
            start_time,
            end_time,
            settings: RenderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.file_path, self.start_time, self.end_time, &self.settings)
    }
}

/// Rendered clip: base64 WAV audio plus base64 PNG spectrogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPayload {
    pub audio_base64: String,
    pub spectrogram_base64: String,
    pub sample_rate: u32,
    /// Seconds of audio actually returned
    pub duration: f64,
    /// Displayed frequency band in Hz, low to high
    pub frequency_range: [f32; 2],
    pub file_path: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
}

impl ClipPayload {
    /// Both payloads present; anything else is treated as a corrupt entry
    pub fn is_complete(&self) -> bool {
        !self.audio_base64.is_empty() && !self.spectrogram_base64.is_empty()
    }
}

/// Per-clip outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClipOutcome {
    Success(ClipPayload),
    Error { error: String },
}

/// Result for one request, in the same position as the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipResult {
    pub clip_id: String,
    /// Served from the clip cache
    #[serde(default)]
    pub cached: bool,
    #[serde(flatten)]
    pub outcome: ClipOutcome,
}

impl ClipResult {
    pub fn success(clip_id: impl Into<String>, payload: ClipPayload, cached: bool) -> Self {
        Self {
            clip_id: clip_id.into(),
            cached,
            outcome: ClipOutcome::Success(payload),
        }
    }

    pub fn error(clip_id: impl Into<String>, error: &RenderError) -> Self {
        Self {
            clip_id: clip_id.into(),
            cached: false,
            outcome: ClipOutcome::Error {
                error: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ClipOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&ClipPayload> {
        match &self.outcome {
            ClipOutcome::Success(payload) => Some(payload),
            ClipOutcome::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            ClipOutcome::Success(_) => None,
            ClipOutcome::Error { error } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_result_serialises_flat() {
        let result = ClipResult::error("7", &RenderError::FileNotFound("/x.wav".into()));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "clip_id": "7",
                "cached": false,
                "status": "error",
                "error": "File not found: /x.wav"
            })
        );
    }

    #[test]
    fn test_success_result_serialises_flat() {
        let payload = ClipPayload {
            audio_base64: "UklGRg==".into(),
            spectrogram_base64: "iVBORw==".into(),
            sample_rate: 22050,
            duration: 3.0,
            frequency_range: [0.0, 11025.0],
            file_path: "/a.wav".into(),
            start_time: 1.0,
            end_time: 4.0,
        };
        let value = serde_json::to_value(ClipResult::success("a", payload, true)).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["cached"], true);
        assert_eq!(value["sample_rate"], 22050);
        assert_eq!(value["audio_base64"], "UklGRg==");
    }
}
