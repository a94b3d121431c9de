//! Signal processing for clip rendering
//!
//! - Peak normalisation of the returned audio
//! - Band-pass filtering as a cascade of RBJ biquads (Direct Form II
//!   Transposed, f64 state), 4th-order Butterworth high-pass + low-pass
//! - Power spectral density spectrogram: periodic Tukey(0.25) window,
//!   50% overlap, per-segment mean removal, one-sided density scaling,
//!   converted to dB as `10 * log10(P)`

use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// Q factors of the two sections of a 4th-order Butterworth filter
const BUTTERWORTH_Q4: [f64; 2] = [0.541_196_1, 1.306_563];

/// Tukey taper fraction
const TUKEY_ALPHA: f64 = 0.25;

/// Scale samples so the largest magnitude is 1.0; silent input is unchanged
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > f32::EPSILON && peak.is_finite() {
        let gain = 1.0 / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Response {
    Lowpass,
    Highpass,
}

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(response: Response, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match response {
            Response::Lowpass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            Response::Highpass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
        };
        let a0 = 1.0 + alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Band-limit `samples` to `[low_hz, high_hz]` in place.
///
/// Edges at or beyond 0 Hz / Nyquist are skipped, so a range covering the
/// whole band leaves the signal untouched. Length is always preserved.
pub fn bandpass(samples: &mut [f32], sample_rate: u32, low_hz: f32, high_hz: f32) {
    let fs = f64::from(sample_rate);
    let nyquist = fs / 2.0;
    let mut sections = Vec::with_capacity(4);

    let low = f64::from(low_hz);
    if low > 0.0 && low < nyquist {
        sections.extend(BUTTERWORTH_Q4.iter().map(|&q| Biquad::new(Response::Highpass, low, q, fs)));
    }
    let high = f64::from(high_hz);
    if high > 0.0 && high < nyquist {
        sections.extend(BUTTERWORTH_Q4.iter().map(|&q| Biquad::new(Response::Lowpass, high, q, fs)));
    }
    if sections.is_empty() {
        return;
    }

    for s in samples.iter_mut() {
        let mut y = f64::from(*s);
        for section in sections.iter_mut() {
            y = section.process(y);
        }
        *s = y as f32;
    }
}

/// Periodic Tukey window of length `n`
pub fn tukey_window(n: usize, alpha: f64) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    // Periodic window: symmetric window of n + 1 points, last point dropped
    let m = (n + 1) as f64;
    (0..n)
        .map(|i| {
            let x = i as f64 / (m - 1.0);
            if x < alpha / 2.0 {
                0.5 * (1.0 + (2.0 * PI / alpha * (x - alpha / 2.0)).cos())
            } else if x > 1.0 - alpha / 2.0 {
                0.5 * (1.0 + (2.0 * PI / alpha * (x - 1.0 + alpha / 2.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Spectrogram in dB; row 0 is 0 Hz
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Number of frequency rows (`window / 2 + 1`)
    pub bins: usize,
    /// Number of time columns
    pub frames: usize,
    /// Frequency spacing between rows in Hz
    pub bin_hz: f32,
    /// Row-major `bins x frames` values in dB (`-inf` for zero power)
    pub data: Vec<f32>,
}

impl Spectrogram {
    pub fn value(&self, bin: usize, frame: usize) -> f32 {
        self.data[bin * self.frames + frame]
    }

    pub fn row_mut(&mut self, bin: usize) -> &mut [f32] {
        let start = bin * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Row nearest to `hz`
    pub fn nearest_bin(&self, hz: f32) -> usize {
        if self.bin_hz <= 0.0 {
            return 0;
        }
        ((hz / self.bin_hz).round().max(0.0) as usize).min(self.bins.saturating_sub(1))
    }
}

/// Compute a PSD spectrogram with a `window`-sample Tukey window and 50% overlap.
///
/// Signals shorter than one window are zero-padded to a single frame.
pub fn spectrogram(samples: &[f32], sample_rate: u32, window: usize) -> Result<Spectrogram, String> {
    if window < 2 {
        return Err(format!("Window size {} too small", window));
    }
    let hop = (window / 2).max(1);
    let taper = tukey_window(window, TUKEY_ALPHA);
    let fs = f64::from(sample_rate);
    let window_power: f64 = taper.iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * window_power);

    let frames = if samples.len() <= window {
        1
    } else {
        (samples.len() - window) / hop + 1
    };
    let bins = window / 2 + 1;

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(window);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    let mut data = vec![0.0f32; bins * frames];
    for frame in 0..frames {
        let start = frame * hop;
        let end = (start + window).min(samples.len());
        let segment = &samples[start.min(end)..end];

        let mean = if segment.is_empty() {
            0.0
        } else {
            segment.iter().map(|&s| f64::from(s)).sum::<f64>() / segment.len() as f64
        };
        for (i, slot) in input.iter_mut().enumerate() {
            // Zero padding is applied after detrending, as for a short final segment
            let x = segment.get(i).map(|&s| f64::from(s) - mean).unwrap_or(0.0);
            *slot = x * taper[i];
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|e| format!("FFT failed: {}", e))?;

        for (bin, c) in spectrum.iter().enumerate() {
            let mut power = c.norm_sqr() * scale;
            // One-sided: double everything except DC and (for even windows) Nyquist
            let is_nyquist = window % 2 == 0 && bin == bins - 1;
            if bin != 0 && !is_nyquist {
                power *= 2.0;
            }
            data[bin * frames + frame] = if power > 0.0 {
                (10.0 * power.log10()) as f32
            } else {
                f32::NEG_INFINITY
            };
        }
    }

    Ok(Spectrogram {
        bins,
        frames,
        bin_hz: sample_rate as f32 / window as f32,
        data,
    })
}
