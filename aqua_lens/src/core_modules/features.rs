// THEORY:
// The `features` module is the Pixel Feature Extractor: the first layer of the
// water-quality pipeline. It takes a decoded `Raster` and produces one
// `ImageFeatures` record summarizing color, texture, edges, regions and scan-line
// frequency content.
//
// Key architectural principles:
// 1.  **Independent Passes**: Each family of features is its own module and its
//     own O(width x height) pass. None of them depends on another's output, so
//     `extract` runs the spatial passes on scoped threads over a shared, read-only
//     brightness plane.
// 2.  **Ephemeral Output**: `ImageFeatures` is derived data. It is owned by the
//     caller for the duration of one analysis and never persisted as-is.
// 3.  **Normalized Ratios**: Densities, complexities and frequency ratios all lie
//     in [0, 1]; histograms always sum to the pixel count.

use crate::core_modules::color_profile::{ColorStats, analyze_colors};
use crate::core_modules::edge_detector::{EdgeStats, detect_edges};
use crate::core_modules::raster::{FeatureError, ImageSource, Raster};
use crate::core_modules::region::RegionStats;
use crate::core_modules::region_grower::region_grower;
use crate::core_modules::window::window::{TextureStats, analyze_texture};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const LOW_FREQUENCY_LIMIT: f64 = 10.0;
const MID_FREQUENCY_LIMIT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Share of scan-order brightness changes per magnitude band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyStats {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

/// Everything the estimator knows about an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFeatures {
    pub dimensions: Dimensions,
    pub color: ColorStats,
    pub texture: TextureStats,
    pub edges: EdgeStats,
    pub regions: RegionStats,
    pub frequency: FrequencyStats,
}

/// Compact subset of the features kept alongside a result for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub dimensions: Dimensions,
    pub brightness: f64,
    pub color_complexity: f64,
    pub uniformity: f64,
    pub contrast: f64,
    pub edge_density: f64,
    pub region_count: usize,
    pub dominant_colors: Vec<[u8; 3]>,
}

impl ImageFeatures {
    pub fn summary(&self) -> FeatureSummary {
        FeatureSummary {
            dimensions: self.dimensions,
            brightness: self.color.brightness.average,
            color_complexity: self.color.color_complexity,
            uniformity: self.texture.uniformity,
            contrast: self.texture.contrast,
            edge_density: self.edges.edge_density,
            region_count: self.regions.region_count,
            dominant_colors: self.color.dominant_colors.iter().map(|d| d.color).collect(),
        }
    }
}

fn analyze_frequency(plane: &[f64]) -> FrequencyStats {
    if plane.len() < 2 {
        return FrequencyStats {
            low: 1.0,
            mid: 0.0,
            high: 0.0,
        };
    }
    let (mut low, mut mid, mut high) = (0u64, 0u64, 0u64);
    for pair in plane.windows(2) {
        let change = (pair[1] - pair[0]).abs();
        if change < LOW_FREQUENCY_LIMIT {
            low += 1;
        } else if change < MID_FREQUENCY_LIMIT {
            mid += 1;
        } else {
            high += 1;
        }
    }
    let total = (plane.len() - 1) as f64;
    FrequencyStats {
        low: low as f64 / total,
        mid: mid as f64 / total,
        high: high as f64 / total,
    }
}

/// Runs every feature pass over an already decoded raster.
pub fn extract(raster: &Raster) -> ImageFeatures {
    let started = Instant::now();
    let (width, height) = (raster.width(), raster.height());
    let plane = raster.brightness_plane();

    let (color, texture, edges, regions, frequency) = std::thread::scope(|scope| {
        let plane = plane.as_slice();
        let color = scope.spawn(|| analyze_colors(raster));
        let texture = scope.spawn(move || analyze_texture(plane, width, height));
        let edges = scope.spawn(move || detect_edges(plane, width, height));
        let regions = scope.spawn(move || {
            let found = region_grower::find_regions(plane, width, height);
            region_grower::summarize(&found, width, height)
        });
        let frequency = analyze_frequency(plane);
        (
            join_pass(color),
            join_pass(texture),
            join_pass(edges),
            join_pass(regions),
            frequency,
        )
    });

    tracing::debug!(
        width,
        height,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "feature extraction finished"
    );

    ImageFeatures {
        dimensions: Dimensions { width, height },
        color,
        texture,
        edges,
        regions,
        frequency,
    }
}

// A pass can only fail by panicking; re-raise it on the caller's thread.
fn join_pass<T>(handle: std::thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

/// Decodes `source` at working resolution and extracts its features.
pub fn extract_from_source(source: &ImageSource, max_edge: u32) -> Result<ImageFeatures, FeatureError> {
    let raster = Raster::decode(source, max_edge)?;
    Ok(extract(&raster))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::Pixel;

    #[test]
    fn white_image_is_featureless() {
        let raster = Raster::filled(400, 300, Pixel::new(255, 255, 255, 255)).unwrap();
        let features = extract(&raster);

        assert_eq!(features.dimensions, Dimensions { width: 400, height: 300 });
        assert!(features.color.color_complexity < 1e-4);
        assert_eq!(features.edges.edge_density, 0.0);
        assert_eq!(features.texture.uniformity, 1.0);
        assert_eq!(features.regions.region_count, 1);
        assert_eq!(features.frequency.low, 1.0);
    }

    #[test]
    fn ratios_stay_in_unit_interval_for_noisy_image() {
        let (w, h) = (97u32, 61u32);
        let mut state = 12345u32;
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..w * h {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let v = (state >> 16) as u8;
            data.extend_from_slice(&[v, v.wrapping_mul(3), v.wrapping_mul(7), 255]);
        }
        let raster = Raster::from_rgba(w, h, data).unwrap();
        let f = extract(&raster);

        for ratio in [
            f.color.color_complexity,
            f.texture.uniformity,
            f.edges.edge_density,
            f.edges.sharpness,
            f.regions.region_complexity,
            f.frequency.low,
            f.frequency.mid,
            f.frequency.high,
        ] {
            assert!((0.0..=1.0).contains(&ratio), "ratio out of range: {ratio}");
        }
        let freq_sum = f.frequency.low + f.frequency.mid + f.frequency.high;
        assert!((freq_sum - 1.0).abs() < 1e-9);
        assert_eq!(f.color.red.histogram.iter().sum::<u64>(), (w * h) as u64);
    }

    #[test]
    fn decode_failure_returns_no_features() {
        let result = extract_from_source(&ImageSource::Bytes(vec![0, 1, 2, 3]), 512);
        assert!(matches!(result, Err(FeatureError::Decode(_))));
    }

    #[test]
    fn summary_mirrors_features() {
        let raster = Raster::filled(20, 20, Pixel::new(0, 0, 255, 255)).unwrap();
        let features = extract(&raster);
        let summary = features.summary();
        assert_eq!(summary.dominant_colors, vec![[0, 0, 240]]);
        assert_eq!(summary.brightness, 85.0);
    }
}
