// THEORY:
// The `EdgeDetector` measures how much structure an image contains. Clean water in
// a clear container is almost featureless; sediment, particles, bubbles and the
// edges of a test strip all add gradients.
//
// Algorithm:
// 1.  **Sobel Gradients**: At every interior pixel the two 3x3 Sobel kernels are
//     applied to the brightness plane, giving a horizontal (gx) and a vertical
//     (gy) derivative. Border pixels are skipped; they have no full neighborhood.
// 2.  **Thresholding**: A pixel is an edge when sqrt(gx^2 + gy^2) exceeds
//     `EDGE_MAGNITUDE_THRESHOLD`. This rejects sensor noise and JPEG ringing.
// 3.  **Orientation Buckets**: The gradient angle is folded into [0, pi). Angles
//     strictly within pi/4 of the x axis count as horizontal gradients, angles
//     strictly within pi/4 of the y axis as vertical. Only the exact pi/4 and
//     3pi/4 boundaries are left as diagonal.
// 4.  **Stateless Utility**: `detect_edges` reads a plane and returns counts. It
//     keeps no memory between images.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Minimum gradient magnitude for a pixel to count as an edge.
pub const EDGE_MAGNITUDE_THRESHOLD: f64 = 30.0;

const SOBEL_X: [[f64; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f64; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeDirections {
    pub horizontal: u64,
    pub vertical: u64,
    pub diagonal: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeStats {
    pub total_edges: u64,
    /// Edge pixels divided by all pixels, in [0, 1].
    pub edge_density: f64,
    /// Mean gradient magnitude over edge pixels (0 when there are none).
    pub edge_strength: f64,
    /// `edge_strength / 255`, capped at 1.
    pub sharpness: f64,
    pub directions: EdgeDirections,
}

/// Applies a 3x3 kernel centred on (x, y). Caller guarantees an interior pixel.
fn convolve(plane: &[f64], width: usize, x: usize, y: usize, kernel: &[[f64; 3]; 3]) -> f64 {
    let mut sum = 0.0;
    for (ky, row) in kernel.iter().enumerate() {
        let base = (y + ky - 1) * width;
        for (kx, weight) in row.iter().enumerate() {
            sum += plane[base + x + kx - 1] * weight;
        }
    }
    sum
}

fn orientation(gx: f64, gy: f64) -> Orientation {
    let mut angle = gy.atan2(gx);
    if angle < 0.0 {
        angle += PI;
    }
    if angle >= PI {
        angle -= PI;
    }
    if angle < PI / 4.0 || angle > 3.0 * PI / 4.0 {
        Orientation::Horizontal
    } else if (angle - PI / 2.0).abs() < PI / 4.0 {
        Orientation::Vertical
    } else {
        Orientation::Diagonal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
    Diagonal,
}

/// Runs Sobel edge detection over a brightness plane of `width` x `height`.
pub fn detect_edges(plane: &[f64], width: u32, height: u32) -> EdgeStats {
    let (w, h) = (width as usize, height as usize);
    let mut total_edges = 0u64;
    let mut strength_sum = 0.0;
    let mut directions = EdgeDirections::default();

    if w >= 3 && h >= 3 {
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let gx = convolve(plane, w, x, y, &SOBEL_X);
                let gy = convolve(plane, w, x, y, &SOBEL_Y);
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude <= EDGE_MAGNITUDE_THRESHOLD {
                    continue;
                }
                total_edges += 1;
                strength_sum += magnitude;
                match orientation(gx, gy) {
                    Orientation::Horizontal => directions.horizontal += 1,
                    Orientation::Vertical => directions.vertical += 1,
                    Orientation::Diagonal => directions.diagonal += 1,
                }
            }
        }
    }

    let edge_strength = if total_edges > 0 {
        strength_sum / total_edges as f64
    } else {
        0.0
    };
    EdgeStats {
        total_edges,
        edge_density: total_edges as f64 / (w * h).max(1) as f64,
        edge_strength,
        sharpness: (edge_strength / 255.0).min(1.0),
        directions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_plane_has_no_edges() {
        let plane = vec![255.0; 400 * 300];
        let stats = detect_edges(&plane, 400, 300);
        assert_eq!(stats.total_edges, 0);
        assert_eq!(stats.edge_density, 0.0);
        assert_eq!(stats.edge_strength, 0.0);
    }

    #[test]
    fn vertical_step_produces_horizontal_gradients() {
        // Left half black, right half white: the gradient points along x.
        let (w, h) = (20u32, 10u32);
        let plane: Vec<f64> = (0..w * h).map(|i| if i % w < 10 { 0.0 } else { 255.0 }).collect();
        let stats = detect_edges(&plane, w, h);

        // Columns 9 and 10 straddle the step on every interior row.
        assert_eq!(stats.total_edges, 2 * (h as u64 - 2));
        assert_eq!(stats.directions.horizontal, stats.total_edges);
        assert!((stats.edge_strength - 1020.0).abs() < 1e-9);
        assert_eq!(stats.sharpness, 1.0);
    }

    #[test]
    fn horizontal_step_produces_vertical_gradients() {
        let (w, h) = (10u32, 20u32);
        let plane: Vec<f64> = (0..w * h).map(|i| if i / w < 10 { 0.0 } else { 255.0 }).collect();
        let stats = detect_edges(&plane, w, h);
        assert!(stats.total_edges > 0);
        assert_eq!(stats.directions.vertical, stats.total_edges);
    }

    #[test]
    fn gradient_angles_use_quarter_pi_sectors() {
        // About 30 and 150 degrees: closer to the x axis.
        assert_eq!(orientation(100.0, 58.0), Orientation::Horizontal);
        assert_eq!(orientation(-100.0, 58.0), Orientation::Horizontal);
        assert_eq!(orientation(100.0, 1.0), Orientation::Horizontal);
        assert_eq!(orientation(-100.0, -1.0), Orientation::Horizontal);
        // About 60 and -60 degrees: closer to the y axis.
        assert_eq!(orientation(58.0, 100.0), Orientation::Vertical);
        assert_eq!(orientation(58.0, -100.0), Orientation::Vertical);
        assert_eq!(orientation(0.0, -50.0), Orientation::Vertical);
    }

    #[test]
    fn tiny_plane_is_handled() {
        let stats = detect_edges(&[0.0, 255.0, 0.0, 255.0], 2, 2);
        assert_eq!(stats.total_edges, 0);
    }
}
