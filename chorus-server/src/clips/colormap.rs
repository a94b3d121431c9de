//! Spectrogram colormaps
//!
//! The perceptual maps use 6th-order polynomial fits of the matplotlib
//! lookup tables; visually indistinguishable at 8 bits per channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Named colormap applied to normalised spectrogram magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Colormap {
    /// Black = quiet, white = loud
    Greys,
    /// White = quiet, black = loud
    #[default]
    GreysR,
    Viridis,
    Inferno,
    Magma,
    Plasma,
}

type Poly = [[f32; 3]; 7];

const VIRIDIS: Poly = [
    [0.277_727_33, 0.005_407_344_5, 0.334_099_8],
    [0.105_093_04, 1.404_613_5, 1.384_590_2],
    [-0.330_861_83, 0.214_847_56, 0.095_095_16],
    [-4.634_230_5, -5.799_101, -19.332_441],
    [6.228_27, 14.179_933, 56.690_553],
    [4.776_385, -13.745_145, -65.353_03],
    [-5.435_456, 4.645_852_6, 26.312_435],
];

const INFERNO: Poly = [
    [0.000_218_940_37, 0.001_651_004_6, -0.019_480_898],
    [0.106_513_42, 0.563_956_44, 3.932_712_4],
    [11.602_493, -3.972_854, -15.942_394],
    [-41.703_996, 17.436_399, 44.354_145],
    [77.162_94, -33.402_36, -81.807_31],
    [-71.319_43, 32.626_064, 73.209_52],
    [25.131_126, -12.242_669, -23.070_325],
];

const MAGMA: Poly = [
    [-0.002_136_485, -0.000_749_655, -0.005_386_128],
    [0.251_660_54, 0.677_523_24, 2.494_026_6],
    [8.353_717, -3.577_719_5, 0.314_467_9],
    [-27.668_733, 14.264_731, -13.649_213],
    [52.176_14, -27.943_606, 12.944_169],
    [-50.768_525, 29.046_583, 4.234_153],
    [18.655_705, -11.489_774, -5.601_961_5],
];

const PLASMA: Poly = [
    [0.058_732_344, 0.023_336_709, 0.543_340_2],
    [2.176_514_6, 0.238_383_42, 0.753_960_45],
    [-2.689_460_5, -7.455_851, 3.110_799_9],
    [6.130_348_4, 42.346_188, -28.518_855],
    [-11.107_436, -82.666_31, 60.139_847],
    [10.023_066, 71.413_62, -54.072_186],
    [-3.658_713_8, -22.931_535, 18.191_908],
];

impl Colormap {
    pub fn as_str(&self) -> &'static str {
        match self {
            Colormap::Greys => "greys",
            Colormap::GreysR => "greys_r",
            Colormap::Viridis => "viridis",
            Colormap::Inferno => "inferno",
            Colormap::Magma => "magma",
            Colormap::Plasma => "plasma",
        }
    }

    /// Parse a colormap name; `None` for names outside the supported set
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "greys" | "grays" | "gray" | "grey" => Some(Colormap::Greys),
            "greys_r" | "grays_r" | "gray_r" | "grey_r" => Some(Colormap::GreysR),
            "viridis" => Some(Colormap::Viridis),
            "inferno" => Some(Colormap::Inferno),
            "magma" => Some(Colormap::Magma),
            "plasma" => Some(Colormap::Plasma),
            _ => None,
        }
    }

    /// Map a normalised value in [0, 1] to RGB
    pub fn rgb(&self, value: f32) -> [u8; 3] {
        let t = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Colormap::Greys => grey(t),
            Colormap::GreysR => grey(1.0 - t),
            Colormap::Viridis => poly(&VIRIDIS, t),
            Colormap::Inferno => poly(&INFERNO, t),
            Colormap::Magma => poly(&MAGMA, t),
            Colormap::Plasma => poly(&PLASMA, t),
        }
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Colormap {
    /// Unknown names fall back to the default map
    fn from(name: String) -> Self {
        Colormap::from_name(&name).unwrap_or_else(|| {
            warn!(colormap = %name, "Unknown colormap, using {}", Colormap::default());
            Colormap::default()
        })
    }
}

impl From<Colormap> for String {
    fn from(map: Colormap) -> Self {
        map.as_str().to_string()
    }
}

fn grey(t: f32) -> [u8; 3] {
    let v = to_u8(t);
    [v, v, v]
}

fn poly(c: &Poly, t: f32) -> [u8; 3] {
    let mut out = [0u8; 3];
    for (channel, slot) in out.iter_mut().enumerate() {
        // Horner evaluation, highest order first
        let mut acc = c[6][channel];
        for k in (0..6).rev() {
            acc = acc * t + c[k][channel];
        }
        *slot = to_u8(acc);
    }
    out
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
