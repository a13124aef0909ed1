use serde::{Deserialize, Serialize};

use spectrascope_api::channel::{ChannelId, ChannelReadings};

/// CIE 1931 2-degree standard observer approximations for the AS7341 bands,
/// as [X, Y, Z] weights per band. The 860nm near-IR band and the clear
/// channel carry no meaningful visible-color weight and are excluded from
/// the matching sum.
const CIE_MATCHING_FUNCTIONS: [(ChannelId, [f64; 3]); 10] = [
    (ChannelId::Band410, [0.3362, 0.0382, 1.7721]),
    (ChannelId::Band440, [0.3483, 0.0380, 1.7726]),
    (ChannelId::Band470, [0.1421, 0.0600, 0.6791]),
    (ChannelId::Band510, [0.0049, 0.3230, 0.2720]),
    (ChannelId::Band550, [0.3362, 0.9950, 0.0203]),
    (ChannelId::Band580, [0.9786, 0.8700, 0.0017]),
    (ChannelId::Band610, [1.0263, 0.6310, 0.0000]),
    (ChannelId::Band680, [0.2835, 0.1070, 0.0000]),
    (ChannelId::Band730, [0.0741, 0.0298, 0.0000]),
    (ChannelId::Band810, [0.0096, 0.0039, 0.0000]),
];

/// The named colors scored by `detect_color`, with their display hex. Scored
/// in this fixed order; ties keep it.
const NAMED_COLORS: [(&str, &str); 6] = [
    ("Red", "#FF0000"),
    ("Orange", "#FF8000"),
    ("Yellow", "#FFFF00"),
    ("Green", "#00FF00"),
    ("Blue", "#0000FF"),
    ("Purple", "#8000FF"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Confidence score for one named color, in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorConfidence {
    pub name: &'static str,
    pub confidence: f64,
    pub hex: &'static str,
}

/// Result of color detection for one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorEstimate {
    pub name: String,
    pub hex: String,
    /// Confidence of the top-ranked color, in [0, 1].
    pub confidence: f64,
    pub rgb: Rgb,
    pub all_confidences: Vec<ColorConfidence>,
}

impl ColorEstimate {
    /// Neutral-gray fallback returned when no channel data is available.
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            hex: "#808080".to_string(),
            confidence: 0.0,
            rgb: Rgb {
                r: 128,
                g: 128,
                b: 128,
            },
            all_confidences: Vec::new(),
        }
    }
}

/// Weighted sum of spectral intensities into CIE XYZ tristimulus values.
/// Channels missing from the mapping contribute zero.
pub fn spectral_to_xyz(channels: &ChannelReadings) -> Xyz {
    let mut xyz = Xyz {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    for (channel, [x, y, z]) in CIE_MATCHING_FUNCTIONS {
        if let Some(&value) = channels.get(&channel) {
            xyz.x += value * x;
            xyz.y += value * y;
            xyz.z += value * z;
        }
    }

    xyz
}

/// sRGB gamma correction that preserves sign, so negative excursions from
/// calibration differencing survive until the final clamp.
fn gamma_correct(c: f64) -> f64 {
    let sign = if c < 0.0 { -1.0 } else { 1.0 };
    let abs = c.abs();

    if abs <= 0.0031308 {
        sign * 12.92 * abs
    } else {
        sign * (1.055 * abs.powf(1.0 / 2.4) - 0.055)
    }
}

/// XYZ to sRGB via the fixed D65 linear matrix, gamma correction, then
/// normalization by the max absolute magnitude. Red and green map through a
/// signed half-range remap centered at 127.5 to accommodate negative values;
/// blue maps through a plain 0-255 scale.
pub fn xyz_to_rgb(xyz: Xyz) -> Rgb {
    let Xyz { x, y, z } = xyz;

    let r = gamma_correct(x * 3.2406 + y * -1.5372 + z * -0.4986);
    let g = gamma_correct(x * -0.9689 + y * 1.8758 + z * 0.0415);
    let b = gamma_correct(x * 0.0557 + y * -0.2040 + z * 1.0570);

    let max = r.abs().max(g.abs()).max(b.abs()).max(0.01);

    let r = (((r / max) * 127.5) + 127.5).clamp(0.0, 255.0);
    let g = (((g / max) * 127.5) + 127.5).clamp(0.0, 255.0);
    let b = ((b / max) * 255.0).clamp(0.0, 255.0);

    Rgb {
        r: r.round() as u8,
        g: g.round() as u8,
        b: b.round() as u8,
    }
}

/// Uppercase `#RRGGBB` form.
pub fn rgb_to_hex(rgb: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb.r, rgb.g, rgb.b)
}

/// Direct spectral-to-RGB conversion for display purposes.
pub fn calculate_rgb(channels: Option<&ChannelReadings>) -> Rgb {
    match channels {
        Some(channels) => xyz_to_rgb(spectral_to_xyz(channels)),
        None => Rgb {
            r: 128,
            g: 128,
            b: 128,
        },
    }
}

/// Scores the six named colors for one sample and returns the ranked result.
///
/// When `reference` is given, calibration differencing (`raw - reference`,
/// per channel present in both) is applied before conversion. When
/// `channels` is absent entirely the neutral default is returned regardless
/// of calibration state.
pub fn detect_color(
    channels: Option<&ChannelReadings>,
    reference: Option<&ChannelReadings>,
) -> ColorEstimate {
    let Some(channels) = channels else {
        return ColorEstimate::unknown();
    };

    let adjusted: ChannelReadings = match reference {
        Some(reference) => channels
            .iter()
            .map(|(&ch, &raw)| match reference.get(&ch) {
                Some(&base) => (ch, raw - base),
                None => (ch, raw),
            })
            .collect(),
        None => channels.clone(),
    };

    let rgb = xyz_to_rgb(spectral_to_xyz(&adjusted));
    let hex = rgb_to_hex(rgb);

    let r = rgb.r as f64;
    let g = rgb.g as f64;
    let b = rgb.b as f64;
    let max = r.max(g).max(b).max(1.0);
    let min = r.min(g).min(b);
    let saturation = (max - min) / max;

    // Dominance multipliers tuned by hand.
    let scores = [
        (r / 255.0) * saturation * if r > g && r > b { 1.5 } else { 0.5 },
        ((r + g) / 510.0) * saturation * if r > b && g > b && r > g * 0.7 { 1.3 } else { 0.3 },
        ((r + g) / 510.0)
            * saturation
            * if r > b && g > b && (r - g).abs() < 50.0 {
                1.5
            } else {
                0.3
            },
        (g / 255.0) * saturation * if g > r && g > b { 1.5 } else { 0.5 },
        (b / 255.0) * saturation * if b > r && b > g { 1.5 } else { 0.5 },
        ((r + b) / 510.0) * saturation * if r > g && b > g { 1.3 } else { 0.3 },
    ];

    let mut all_confidences: Vec<ColorConfidence> = NAMED_COLORS
        .iter()
        .zip(scores)
        .map(|(&(name, hex), score)| ColorConfidence {
            name,
            confidence: (score * 100.0).min(100.0),
            hex,
        })
        .collect();

    // Stable sort keeps the fixed color order on ties.
    all_confidences.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let top = &all_confidences[0];

    ColorEstimate {
        name: top.name.to_string(),
        hex,
        confidence: top.confidence.round() / 100.0,
        rgb,
        all_confidences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(pairs: &[(ChannelId, f64)]) -> ChannelReadings {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_missing_channels_contribute_zero() {
        let sparse = readings(&[(ChannelId::Band610, 100.0)]);
        let xyz = spectral_to_xyz(&sparse);

        assert!((xyz.x - 102.63).abs() < 1e-9);
        assert!((xyz.y - 63.10).abs() < 1e-9);
        assert_eq!(xyz.z, 0.0);
    }

    #[test]
    fn test_near_ir_and_clear_are_excluded() {
        let ir_only = readings(&[(ChannelId::Band860, 500.0), (ChannelId::Clear, 500.0)]);
        let xyz = spectral_to_xyz(&ir_only);

        assert_eq!(xyz.x, 0.0);
        assert_eq!(xyz.y, 0.0);
        assert_eq!(xyz.z, 0.0);
    }

    #[test]
    fn test_detect_color_without_channels_is_neutral() {
        let estimate = detect_color(None, None);
        assert_eq!(estimate, ColorEstimate::unknown());

        let reference = readings(&[(ChannelId::Band410, 10.0)]);
        let estimate = detect_color(None, Some(&reference));
        assert_eq!(estimate, ColorEstimate::unknown());
    }

    #[test]
    fn test_detect_color_red_dominant() {
        // Strong long-wavelength energy should rank Red at the top.
        let red = readings(&[(ChannelId::Band610, 1000.0), (ChannelId::Band680, 400.0)]);
        let estimate = detect_color(Some(&red), None);

        assert_eq!(estimate.name, "Red");
        assert_eq!(estimate.all_confidences.len(), 6);
        assert!(estimate.confidence > 0.0 && estimate.confidence <= 1.0);
    }

    #[test]
    fn test_detect_color_applies_reference_differencing() {
        let sample = readings(&[(ChannelId::Band610, 100.0), (ChannelId::Band470, 100.0)]);
        let reference = readings(&[(ChannelId::Band610, 100.0)]);

        // With 610nm zeroed by the reference only the blue band remains.
        let estimate = detect_color(Some(&sample), Some(&reference));
        assert_eq!(estimate.name, "Blue");
    }

    #[test]
    fn test_rgb_hex_is_uppercase() {
        assert_eq!(
            rgb_to_hex(Rgb {
                r: 255,
                g: 10,
                b: 0
            }),
            "#FF0A00"
        );
    }

    #[test]
    fn test_calculate_rgb_default() {
        assert_eq!(
            calculate_rgb(None),
            Rgb {
                r: 128,
                g: 128,
                b: 128
            }
        );
    }

    #[test]
    fn test_confidences_are_capped() {
        let bright = readings(&[(ChannelId::Band610, 1e9)]);
        let estimate = detect_color(Some(&bright), None);

        for confidence in &estimate.all_confidences {
            assert!(confidence.confidence <= 100.0);
        }
        assert!(estimate.confidence <= 1.0);
    }
}
