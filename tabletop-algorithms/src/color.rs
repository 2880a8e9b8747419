//! Color statistics: average color, packed HSV and hue histograms

use image::{Rgb, RgbImage};
use tabletop_core::{pack_rgb, unpack_rgb, ColoredPoint3f};

/// Number of bins of a [`HueHistogram`]
pub const HUE_BINS: usize = 10;

/// Saturation or value below this (20 % of full scale) leaves hue undefined
pub const ACHROMATIC_LIMIT: u8 = 51;

/// Per-channel integer mean color of `points`, packed as `0x00RRGGBB`.
///
/// An empty slice averages to black.
pub fn average_color(points: &[ColoredPoint3f]) -> u32 {
    if points.is_empty() {
        return 0;
    }

    let mut sums = [0u64; 3];
    for point in points {
        for (sum, channel) in sums.iter_mut().zip(point.color) {
            *sum += channel as u64;
        }
    }
    let n = points.len() as u64;
    pack_rgb((sums[0] / n) as u8, (sums[1] / n) as u8, (sums[2] / n) as u8)
}

/// Convert packed `0x00RRGGBB` to packed `0x00HHSSVV`.
///
/// Hue, saturation and value are each scaled to `0..=255`: hue 255
/// corresponds to a full turn, saturation is `(max - min) / max` and value is
/// the largest channel.
pub fn rgb_to_hsv(rgb: u32) -> u32 {
    let [r, g, b] = unpack_rgb(rgb);
    let [h, s, v] = hsv_channels(r, g, b);
    pack_rgb(h, s, v)
}

/// Inverse of [`rgb_to_hsv`] up to quantization.
pub fn hsv_to_rgb(hsv: u32) -> u32 {
    let [h, s, v] = unpack_rgb(hsv);
    let value = v as f32 / 255.0;
    let saturation = s as f32 / 255.0;
    let sector = h as f32 / 255.0 * 6.0;

    let chroma = value * saturation;
    let x = chroma * (1.0 - ((sector % 2.0) - 1.0).abs());
    let m = value - chroma;
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let quantize = |c: f32| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    pack_rgb(quantize(r), quantize(g), quantize(b))
}

fn hsv_channels(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = (max - min) as f32;

    let hue_degrees = if delta == 0.0 {
        0.0
    } else if max == r {
        (60.0 * (g as f32 - b as f32) / delta).rem_euclid(360.0)
    } else if max == g {
        60.0 * ((b as f32 - r as f32) / delta + 2.0)
    } else {
        60.0 * ((r as f32 - g as f32) / delta + 4.0)
    };
    let saturation = if max == 0 { 0.0 } else { delta / max as f32 };

    [
        (hue_degrees * 255.0 / 360.0).round().min(255.0) as u8,
        (saturation * 255.0).round() as u8,
        max,
    ]
}

/// Histogram of the hue of an object's chromatic points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HueHistogram {
    bins: [u32; HUE_BINS],
    total: usize,
}

impl HueHistogram {
    /// Bin the hue of every point whose saturation and value both reach
    /// [`ACHROMATIC_LIMIT`]; other points count towards the total only.
    pub fn from_points(points: &[ColoredPoint3f]) -> Self {
        let mut bins = [0u32; HUE_BINS];
        for point in points {
            let [r, g, b] = point.color;
            let [h, s, v] = hsv_channels(r, g, b);
            if s >= ACHROMATIC_LIMIT && v >= ACHROMATIC_LIMIT {
                bins[Self::bin_of(h)] += 1;
            }
        }
        Self {
            bins,
            total: points.len(),
        }
    }

    /// Bin index of an 8 bit hue
    pub fn bin_of(hue: u8) -> usize {
        hue as usize * HUE_BINS / 256
    }

    pub fn bins(&self) -> &[u32; HUE_BINS] {
        &self.bins
    }

    /// Number of points the histogram was built from, binned or not
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of binned points
    pub fn chromatic(&self) -> usize {
        self.bins.iter().map(|&c| c as usize).sum()
    }

    /// Share of points with a defined hue
    pub fn chromatic_share(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.chromatic() as f32 / self.total as f32
    }

    /// Share of the binned points that fall into the fullest bin
    pub fn peak_share(&self) -> f32 {
        let chromatic = self.chromatic();
        if chromatic == 0 {
            return 0.0;
        }
        self.bins.iter().copied().max().unwrap_or(0) as f32 / chromatic as f32
    }

    /// Render as a bar chart, one bar per bin tinted with the bin's hue.
    ///
    /// Bars are scaled so the fullest bin spans the image height.
    pub fn render(&self, bar_width: u32, height: u32) -> RgbImage {
        let bar_width = bar_width.max(1);
        let height = height.max(1);
        let mut image = RgbImage::new(bar_width * HUE_BINS as u32, height);

        let peak = self.bins.iter().copied().max().unwrap_or(0);
        if peak == 0 {
            return image;
        }

        for (bin, &count) in self.bins.iter().enumerate() {
            let bar = (count as u64 * height as u64 / peak as u64) as u32;
            let center_hue = ((2 * bin + 1) * 256 / (2 * HUE_BINS)) as u8;
            let color = Rgb(unpack_rgb(hsv_to_rgb(pack_rgb(center_hue, 255, 255))));
            for x in bin as u32 * bar_width..(bin as u32 + 1) * bar_width {
                for y in height - bar..height {
                    image.put_pixel(x, y, color);
                }
            }
        }
        image
    }
}

/// Scores how reliable a hue histogram is as a color descriptor, `0..=255`.
///
/// Implementations must give higher scores to more concentrated
/// distributions.
pub trait HistogramScorer: Send + Sync {
    fn score(&self, histogram: &HueHistogram) -> u8;
}

/// `255 * chromatic_share * peak_share`
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakConcentration;

impl HistogramScorer for PeakConcentration {
    fn score(&self, histogram: &HueHistogram) -> u8 {
        (255.0 * histogram.chromatic_share() * histogram.peak_share()).round() as u8
    }
}

/// `255 * chromatic_share`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromaticShare;

impl HistogramScorer for ChromaticShare {
    fn score(&self, histogram: &HueHistogram) -> u8 {
        (255.0 * histogram.chromatic_share()).round() as u8
    }
}
