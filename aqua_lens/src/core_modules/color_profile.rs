// THEORY:
// The `color_profile` module is the first and cheapest analysis pass. It makes a
// single linear sweep over the raster and accumulates everything that can be
// known about an image without looking at neighbors: per-channel sums and
// 256-bin histograms, a brightness histogram, and a coarse 16x16x16 color map.
//
// The color map is what turns a photo into "a handful of colors": the five most
// populated buckets become the dominant colors, and the ratio of occupied buckets
// to pixels (`color_complexity`) is the extractor's measure of how busy the water
// looks. A perfectly uniform sample occupies one bucket, so its complexity is
// effectively zero.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::raster::Raster;
use serde::{Deserialize, Serialize};

const HISTOGRAM_BINS: usize = 256;
const COLOR_MAP_BUCKETS: usize = 16 * 16 * 16;
const DOMINANT_COLOR_COUNT: usize = 5;

/// Average and histogram of a single channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub average: f64,
    pub histogram: Vec<u64>,
}

impl ChannelStats {
    fn new() -> Self {
        Self {
            average: 0.0,
            histogram: vec![0; HISTOGRAM_BINS],
        }
    }
}

/// One of the most frequent quantized colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantColor {
    /// Lower corner of the bucket, e.g. `[240, 240, 240]` for the brightest bucket.
    pub color: [u8; 3],
    /// Fraction of pixels that fell into this bucket.
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStats {
    pub red: ChannelStats,
    pub green: ChannelStats,
    pub blue: ChannelStats,
    /// Statistics of the rounded RGB mean.
    pub brightness: ChannelStats,
    pub dominant_colors: Vec<DominantColor>,
    /// Occupied color-map buckets divided by pixel count, in [0, 1].
    pub color_complexity: f64,
}

impl ColorStats {
    /// `1 - color_complexity`.
    pub fn clarity(&self) -> f64 {
        1.0 - self.color_complexity
    }
}

pub fn analyze_colors(raster: &Raster) -> ColorStats {
    let mut red = ChannelStats::new();
    let mut green = ChannelStats::new();
    let mut blue = ChannelStats::new();
    let mut brightness = ChannelStats::new();
    let mut color_map = vec![0u64; COLOR_MAP_BUCKETS];
    let (mut sum_r, mut sum_g, mut sum_b, mut sum_brightness) = (0u64, 0u64, 0u64, 0u64);

    for pixel in raster.pixels() {
        let bin = pixel.brightness_bin();
        sum_r += pixel.red as u64;
        sum_g += pixel.green as u64;
        sum_b += pixel.blue as u64;
        sum_brightness += bin as u64;

        red.histogram[pixel.red as usize] += 1;
        green.histogram[pixel.green as usize] += 1;
        blue.histogram[pixel.blue as usize] += 1;
        brightness.histogram[bin] += 1;

        color_map[pixel.bucket_index()] += 1;
    }

    let total = raster.pixel_count() as f64;
    red.average = sum_r as f64 / total;
    green.average = sum_g as f64 / total;
    blue.average = sum_b as f64 / total;
    brightness.average = sum_brightness as f64 / total;

    // Sort by count, then by bucket index so ties are stable across runs.
    let mut occupied: Vec<(usize, u64)> = color_map
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(index, count)| (index, *count))
        .collect();
    let distinct = occupied.len();
    occupied.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let dominant_colors = occupied
        .iter()
        .take(DOMINANT_COLOR_COUNT)
        .map(|(index, count)| DominantColor {
            color: bucket_color(*index),
            frequency: *count as f64 / total,
        })
        .collect();

    ColorStats {
        red,
        green,
        blue,
        brightness,
        dominant_colors,
        color_complexity: (distinct as f64 / total).min(1.0),
    }
}

fn bucket_color(index: usize) -> [u8; 3] {
    let step = crate::core_modules::pixel::pixel::QUANTIZATION_STEP;
    let r = ((index >> 8) & 0xF) as u8;
    let g = ((index >> 4) & 0xF) as u8;
    let b = (index & 0xF) as u8;
    [r * step, g * step, b * step]
}

/// Mean color of the raster, rounded to channel values.
pub fn mean_color(stats: &ColorStats) -> Pixel {
    Pixel::new(
        stats.red.average.round() as u8,
        stats.green.average.round() as u8,
        stats.blue.average.round() as u8,
        255,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_has_one_dominant_color() {
        let raster = Raster::filled(400, 300, Pixel::new(255, 255, 255, 255)).unwrap();
        let stats = analyze_colors(&raster);

        assert_eq!(stats.dominant_colors.len(), 1);
        assert_eq!(stats.dominant_colors[0].color, [240, 240, 240]);
        assert!((stats.dominant_colors[0].frequency - 1.0).abs() < 1e-12);
        assert!(stats.color_complexity < 1e-4);
        assert!((stats.brightness.average - 255.0).abs() < 1e-9);
    }

    #[test]
    fn histograms_sum_to_pixel_count() {
        let mut data = Vec::new();
        for i in 0..(64u32 * 48) {
            data.extend_from_slice(&[(i % 256) as u8, (i * 7 % 256) as u8, (i * 13 % 256) as u8, 255]);
        }
        let raster = Raster::from_rgba(64, 48, data).unwrap();
        let stats = analyze_colors(&raster);
        let n = raster.pixel_count() as u64;

        for channel in [&stats.red, &stats.green, &stats.blue, &stats.brightness] {
            assert_eq!(channel.histogram.iter().sum::<u64>(), n);
        }
        assert!(stats.color_complexity > 0.0 && stats.color_complexity <= 1.0);
        assert_eq!(stats.dominant_colors.len(), 5);
        let freqs: Vec<f64> = stats.dominant_colors.iter().map(|d| d.frequency).collect();
        assert!(freqs.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn channel_averages_follow_halves() {
        let mut data = [0u8, 0, 200, 255].repeat(50);
        data.extend([100u8, 0, 0, 255].repeat(50));
        let raster = Raster::from_rgba(10, 10, data).unwrap();
        let stats = analyze_colors(&raster);
        assert!((stats.red.average - 50.0).abs() < 1e-9);
        assert!((stats.blue.average - 100.0).abs() < 1e-9);
        assert_eq!(mean_color(&stats), Pixel::new(50, 0, 100, 255));
    }
}
