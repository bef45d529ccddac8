// THEORY:
// A `Region` is one spatially coherent patch of similar brightness, produced by
// the region grower. Where texture windows describe an image at a fixed scale,
// regions describe it at its own scale: a glass of clear water is one huge
// region, a murky sample full of suspended particles is hundreds of small ones.
//
// Like the other output containers, `Region` is a "dumb" snapshot. It has no
// knowledge of the raster it came from beyond the numbers stored here.

use serde::{Deserialize, Serialize};

/// A pixel coordinate on the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// A contiguous, 4-connected set of pixels grown from a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Sequential identifier for the current image only.
    pub id: u64,
    /// The seed pixel the region was grown from.
    pub seed: Point,
    /// Brightness of the seed, which every member is compared against.
    pub seed_brightness: f64,
    /// Number of pixels in the region.
    pub size: usize,
    /// Top-left and bottom-right corners, inclusive.
    pub bounding_box: (Point, Point),
    /// Mean brightness of all member pixels.
    pub mean_brightness: f64,
}

impl Region {
    pub fn bounding_area(&self) -> u64 {
        let (min, max) = self.bounding_box;
        (max.x - min.x + 1) as u64 * (max.y - min.y + 1) as u64
    }
}

/// Aggregate of all regions kept for an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    pub region_count: usize,
    /// Mean size in pixels of the kept regions (0 when none were kept).
    pub average_region_size: f64,
    /// Region count relative to `area / 100`, capped at 1.
    pub region_complexity: f64,
    /// Size of the largest kept region.
    pub largest_region: usize,
}
