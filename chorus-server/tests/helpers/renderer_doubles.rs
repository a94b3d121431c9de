//! Clip renderer doubles

use chorus_server::clips::{ClipPayload, ClipRenderer, ClipRequest, RenderError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic payload derived from the request
pub fn fake_payload(request: &ClipRequest) -> ClipPayload {
    ClipPayload {
        audio_base64: format!("audio:{}:{}", request.file_path.display(), request.start_time),
        spectrogram_base64: format!("png:{}", request.settings.spectrogram_colormap.as_str()),
        sample_rate: 16000,
        duration: request.end_time - request.start_time,
        frequency_range: [0.0, 8000.0],
        file_path: request.file_path.clone(),
        start_time: request.start_time,
        end_time: request.end_time,
    }
}

/// Renderer that sleeps per clip and counts its calls.
///
/// Clips whose start time has an entry in `delays` sleep that long, so
/// completion order can be made to differ from request order.
pub struct DelayedRenderer {
    delays: HashMap<u64, Duration>,
    calls: AtomicUsize,
}

impl DelayedRenderer {
    pub fn new() -> Self {
        Self {
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, start_time: f64, delay: Duration) -> Self {
        self.delays.insert(start_time.to_bits(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClipRenderer for DelayedRenderer {
    fn render(&self, request: &ClipRequest) -> Result<ClipPayload, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&request.start_time.to_bits()) {
            std::thread::sleep(*delay);
        }
        if !request.file_path.exists() {
            return Err(RenderError::FileNotFound(
                request.file_path.display().to_string(),
            ));
        }
        Ok(fake_payload(request))
    }
}
