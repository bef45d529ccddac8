// THEORY:
// The `RegionGrower` is the segmentation pass of the extractor. It implements a
// simple seeded "region growing" algorithm over the brightness plane and reports
// how fragmented the image is.
//
// Algorithm steps:
// 1.  **Sparse Seeding**: Seeds are placed on a regular grid every
//     `SEED_SPACING` pixels. A seed that already belongs to an earlier region is
//     skipped, so each patch is grown exactly once.
// 2.  **Region Growing**: From each seed an iterative depth-first fill visits the
//     4-connected neighbors whose brightness differs from the *seed* (not from the
//     neighbor it was reached from) by at most `BRIGHTNESS_TOLERANCE`. Comparing
//     against the seed stops slow gradients from leaking across the whole image.
// 3.  **Noise Rejection**: Regions of `NOISE_REGION_SIZE` pixels or fewer are
//     discarded. Their pixels stay claimed so they are not re-grown.
// 4.  **Aggregation**: Kept regions are summarized into `RegionStats`.

use crate::core_modules::region::{Point, Region, RegionStats};

pub mod region_grower {
    use super::*;

    /// Distance between seed points on both axes.
    pub const SEED_SPACING: u32 = 10;
    /// Maximum brightness difference from the seed for a pixel to join a region.
    pub const BRIGHTNESS_TOLERANCE: f64 = 30.0;
    /// Regions at or below this many pixels are treated as noise.
    pub const NOISE_REGION_SIZE: usize = 50;

    /// Grows every region of a `width` x `height` brightness plane.
    pub fn find_regions(plane: &[f64], width: u32, height: u32) -> Vec<Region> {
        let mut visited = vec![false; plane.len()];
        let mut regions = Vec::new();
        let mut region_id_counter = 0u64;

        for y in (0..height).step_by(SEED_SPACING as usize) {
            for x in (0..width).step_by(SEED_SPACING as usize) {
                let index = (y * width + x) as usize;
                if visited[index] {
                    continue;
                }
                let region = grow_region_from_seed(Point { x, y }, plane, width, height, &mut visited, region_id_counter);
                if region.size > NOISE_REGION_SIZE {
                    regions.push(region);
                    region_id_counter += 1;
                }
            }
        }

        regions
    }

    /// Depth-first fill from `seed`; marks pixels visited as they are queued.
    fn grow_region_from_seed(
        seed: Point,
        plane: &[f64],
        width: u32,
        height: u32,
        visited: &mut [bool],
        region_id: u64,
    ) -> Region {
        let seed_brightness = plane[(seed.y * width + seed.x) as usize];
        let mut stack = vec![seed];
        visited[(seed.y * width + seed.x) as usize] = true;

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed.x, seed.y, seed.x, seed.y);
        let mut size = 0usize;
        let mut brightness_sum = 0.0;

        while let Some(current) = stack.pop() {
            size += 1;
            brightness_sum += plane[(current.y * width + current.x) as usize];
            min_x = min_x.min(current.x);
            min_y = min_y.min(current.y);
            max_x = max_x.max(current.x);
            max_y = max_y.max(current.y);

            // Check all 4 direct neighbors (not diagonals).
            for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let index = (ny as u32 * width + nx as u32) as usize;
                if visited[index] || (plane[index] - seed_brightness).abs() > BRIGHTNESS_TOLERANCE {
                    continue;
                }
                visited[index] = true;
                stack.push(Point {
                    x: nx as u32,
                    y: ny as u32,
                });
            }
        }

        Region {
            id: region_id,
            seed,
            seed_brightness,
            size,
            bounding_box: (Point { x: min_x, y: min_y }, Point { x: max_x, y: max_y }),
            mean_brightness: brightness_sum / size as f64,
        }
    }

    /// Summarizes kept regions relative to the image area.
    pub fn summarize(regions: &[Region], width: u32, height: u32) -> RegionStats {
        let area = width as f64 * height as f64;
        let total: usize = regions.iter().map(|r| r.size).sum();
        let average_region_size = if regions.is_empty() {
            0.0
        } else {
            total as f64 / regions.len() as f64
        };
        RegionStats {
            region_count: regions.len(),
            average_region_size,
            region_complexity: (regions.len() as f64 / (area / 100.0)).min(1.0),
            largest_region: regions.iter().map(|r| r.size).max().unwrap_or(0),
        }
    }

}
