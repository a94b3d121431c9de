//! Batch clip service integration tests
//!
//! Ordering, caching and per-clip error isolation, first with a renderer
//! double and then with the real spectrogram renderer on generated WAVs.

mod helpers;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chorus_server::clips::{ClipRequest, ClipService, Colormap, RenderSettings, SpectrogramRenderer};
use helpers::{generate_test_wav, DelayedRenderer, ToneConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn touch(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"stub").unwrap();
    path
}

#[test]
fn test_batch_order_matches_request_order_despite_delays() {
    let dir = TempDir::new().unwrap();
    let file = touch(&dir, "a.wav");

    // The first clip finishes last
    let renderer = Arc::new(
        DelayedRenderer::new()
            .with_delay(0.0, Duration::from_millis(200))
            .with_delay(3.0, Duration::from_millis(50)),
    );
    let service = ClipService::new(renderer.clone(), 100, 4).unwrap();

    let requests: Vec<ClipRequest> = (0..6)
        .map(|i| ClipRequest::new(format!("clip-{}", i), &file, i as f64, i as f64 + 3.0))
        .collect();
    let results = service.render_batch(&requests);

    assert_eq!(results.len(), requests.len());
    for (request, result) in requests.iter().zip(&results) {
        assert_eq!(result.clip_id, request.clip_id);
        let payload = result.payload().expect("clip should render");
        assert_eq!(payload.start_time, request.start_time);
    }
    assert_eq!(renderer.calls(), 6);
}

#[test]
fn test_cached_render_returns_identical_payload_without_rendering() {
    let dir = TempDir::new().unwrap();
    let file = touch(&dir, "a.wav");
    let renderer = Arc::new(DelayedRenderer::new());
    let service = ClipService::new(renderer.clone(), 100, 2).unwrap();

    let request = vec![ClipRequest::new("x", &file, 1.0, 4.0)];
    let first = service.render_batch(&request);
    let second = service.render_batch(&request);

    assert_eq!(renderer.calls(), 1);
    assert!(!first[0].cached);
    assert!(second[0].cached);
    assert_eq!(first[0].payload(), second[0].payload());
}

#[test]
fn test_changing_one_setting_forces_a_new_render() {
    let dir = TempDir::new().unwrap();
    let file = touch(&dir, "a.wav");
    let renderer = Arc::new(DelayedRenderer::new());
    let service = ClipService::new(renderer.clone(), 100, 2).unwrap();

    let greys = ClipRequest::new("x", &file, 1.0, 4.0);
    let viridis = greys.clone().with_settings(RenderSettings {
        spectrogram_colormap: Colormap::Viridis,
        ..RenderSettings::default()
    });
    assert_ne!(greys.cache_key(), viridis.cache_key());

    service.render_batch(&[greys]);
    let results = service.render_batch(&[viridis]);

    assert_eq!(renderer.calls(), 2);
    assert!(!results[0].cached);
    assert_eq!(results[0].payload().unwrap().spectrogram_base64, "png:viridis");
}

#[test]
fn test_missing_file_fails_only_its_own_entry() {
    let dir = TempDir::new().unwrap();
    let file = touch(&dir, "a.wav");
    let service = ClipService::new(Arc::new(DelayedRenderer::new()), 100, 2).unwrap();

    let results = service.render_batch(&[
        ClipRequest::new("missing", dir.path().join("absent.wav"), 0.0, 3.0),
        ClipRequest::new("valid", &file, 0.0, 3.0),
    ]);

    assert_eq!(results.len(), 2);
    assert!(!results[0].is_success());
    assert!(results[0].error_message().unwrap().contains("absent.wav"));
    assert!(results[1].is_success());
    assert_eq!(service.cache_len(), 1);
}

#[test]
fn test_duplicate_requests_in_one_batch_render_once() {
    let dir = TempDir::new().unwrap();
    let file = touch(&dir, "a.wav");
    let renderer = Arc::new(DelayedRenderer::new());
    let service = ClipService::new(renderer.clone(), 100, 2).unwrap();

    let results = service.render_batch(&[
        ClipRequest::new("first", &file, 2.0, 5.0),
        ClipRequest::new("second", &file, 2.0, 5.0),
    ]);

    assert_eq!(renderer.calls(), 1);
    assert_eq!(results[0].clip_id, "first");
    assert_eq!(results[1].clip_id, "second");
    assert_eq!(results[0].payload(), results[1].payload());
}

#[test]
fn test_real_renderer_batch_produces_png_and_wav() {
    let dir = TempDir::new().unwrap();
    let wav = generate_test_wav(&dir.path().join("tone.wav"), &ToneConfig::default()).unwrap();
    let service = ClipService::new(Arc::new(SpectrogramRenderer::new()), 10, 2).unwrap();

    let inverted = RenderSettings {
        db_range: [-20.0, -80.0],
        ..RenderSettings::default()
    };
    let results = service.render_batch(&[
        ClipRequest::new("missing", dir.path().join("nope.wav"), 0.0, 1.0),
        ClipRequest::new("tone", &wav, 0.5, 2.5),
        ClipRequest::new("inverted", &wav, 0.0, 1.0).with_settings(inverted),
    ]);

    assert!(!results[0].is_success());
    for result in &results[1..] {
        let payload = result.payload().expect("tone should render");
        assert!(payload.is_complete());

        let png = STANDARD.decode(&payload.spectrogram_base64).unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert_eq!((image.width(), image.height()), (224, 224));

        let wav_bytes = STANDARD.decode(&payload.audio_base64).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(wav_bytes)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16000);
    }
    assert!((results[1].payload().unwrap().duration - 2.0).abs() < 1e-3);
}

#[test]
fn test_oversized_window_and_rate_render_truncated_clip() {
    let dir = TempDir::new().unwrap();
    let wav = generate_test_wav(&dir.path().join("tone.wav"), &ToneConfig::default()).unwrap();
    let service = ClipService::new(Arc::new(SpectrogramRenderer::new()), 10, 2).unwrap();

    let huge_rate = RenderSettings {
        sample_rate: Some(4_000_000_000),
        ..RenderSettings::default()
    };
    let results = service.render_batch(&[
        ClipRequest::new("ok", &wav, 0.0, 1.0),
        ClipRequest::new("huge-window", &wav, 0.0, 1e9),
        ClipRequest::new("huge-rate", &wav, 0.0, 1.0).with_settings(huge_rate),
    ]);

    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());

    let window = results[1].payload().expect("window should be clamped");
    assert!((window.duration - 3.0).abs() < 1e-3);
    assert_eq!(window.end_time, 1e9);

    let rate = results[2].payload().expect("rate should fall back to native");
    assert_eq!(rate.sample_rate, 16000);
}
