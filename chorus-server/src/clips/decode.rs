//! Windowed audio decoding and resampling
//!
//! Decodes `[start, end)` seconds of a file to mono f32 using symphonia.
//! The reader first seeks near the window start; if the format cannot seek,
//! decoding starts at the beginning and samples before the window are
//! skipped. Either way, packet timestamps decide which samples are kept, so
//! the window is sample-accurate.

use super::error::RenderError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Upper bound on samples reserved up front; longer windows grow on demand
const MAX_RESERVED_FRAMES: u64 = 1 << 22;

/// Mono samples for one clip window
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedClip {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode `[start, end)` seconds of `path`, mixed down to mono
pub fn decode_window(path: &Path, start: f64, end: f64) -> Result<DecodedClip, RenderError> {
    let file = std::fs::File::open(path)
        .map_err(|e| RenderError::Decode(format!("Failed to open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| RenderError::Decode(format!("Unsupported audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| RenderError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let time_base = track.codec_params.time_base;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| RenderError::Decode("Sample rate unknown".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| RenderError::Decode(format!("Unsupported codec: {}", e)))?;

    let start_frame = (start * f64::from(sample_rate)).round() as u64;
    let mut end_frame = (end * f64::from(sample_rate)).round() as u64;
    if let Some(n_frames) = track.codec_params.n_frames {
        if end_frame > n_frames {
            debug!(requested = end_frame, available = n_frames, "Clamping window to track length");
            end_frame = n_frames;
        }
    }

    if start > 0.0 {
        let seek = format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::new(start.trunc() as u64, start.fract()),
                track_id: Some(track_id),
            },
        );
        match seek {
            Ok(seeked) => {
                debug!(required_ts = seeked.required_ts, actual_ts = seeked.actual_ts, "Seeked");
                decoder.reset();
            }
            Err(e) => debug!(error = %e, "Seek unsupported, decoding from start"),
        }
    }

    // Convert a packet timestamp to a frame index at the native rate
    let ts_to_frame = |ts: u64| -> u64 {
        match time_base {
            Some(tb) => {
                let t = tb.calc_time(ts);
                ((t.seconds as f64 + t.frac) * f64::from(sample_rate)).round() as u64
            }
            None => ts,
        }
    };

    let reserve = end_frame.saturating_sub(start_frame).min(MAX_RESERVED_FRAMES);
    let mut samples: Vec<f32> = Vec::with_capacity(reserve as usize);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(RenderError::Decode(format!("Error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let packet_frame = ts_to_frame(packet.ts());
        if packet_frame >= end_frame {
            break;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = %path.display(), error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(RenderError::Decode(format!("Decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let too_small = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
        if too_small {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        for (i, frame) in buf.samples().chunks(channels).enumerate() {
            let index = packet_frame + i as u64;
            if index < start_frame {
                continue;
            }
            if index >= end_frame {
                break;
            }
            samples.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    if samples.is_empty() {
        return Err(RenderError::Decode(format!(
            "No audio in window {:.3}-{:.3}s of {}",
            start,
            end,
            path.display()
        )));
    }

    debug!(
        path = %path.display(),
        sample_rate,
        frames = samples.len(),
        "Decoded clip window"
    );

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

/// Resample mono audio to `target_rate`; a matching rate returns the input unchanged
pub fn resample(clip: DecodedClip, target_rate: u32) -> Result<DecodedClip, RenderError> {
    if clip.sample_rate == target_rate || clip.samples.is_empty() {
        return Ok(clip);
    }

    let input_frames = clip.samples.len();
    let mut resampler = FastFixedIn::<f32>::new(
        f64::from(target_rate) / f64::from(clip.sample_rate),
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        1,
    )
    .map_err(|e| RenderError::Resample(format!("Failed to create resampler: {}", e)))?;

    let mut output = resampler
        .process(&[clip.samples], None)
        .map_err(|e| RenderError::Resample(format!("Resampling failed: {}", e)))?;

    let samples = output.pop().unwrap_or_default();
    debug!(
        from = clip.sample_rate,
        to = target_rate,
        input_frames,
        output_frames = samples.len(),
        "Resampled clip"
    );

    Ok(DecodedClip {
        samples,
        sample_rate: target_rate,
    })
}
