// THEORY:
// The `Window` module represents a square neighborhood of brightness samples. It
// is the unit of texture analysis, and it plays the same role a chunk of pixels
// plays in spatial pooling: instead of reasoning about each pixel, we summarize
// small patches and then reason about the distribution of those summaries.
//
// Key architectural principles:
// 1.  **Spatial Pooling**: Windows have a half-width of 5 px (an 11x11 patch) and
//     their centres step 5 px at a time, starting 5 px in from every border so a
//     window never reads outside the raster.
// 2.  **Local Statistics**: Each window knows its own brightness variance and
//     contrast (max - min brightness). It knows nothing about its neighbours.
// 3.  **Aggregation**: `analyze_texture` averages the window statistics into the
//     three texture measures the estimator consumes. Calm, clear water has
//     near-zero variance, so `uniformity = 1 / (1 + roughness)` approaches 1.

pub mod window {
    use serde::{Deserialize, Serialize};

    /// Half-width of a texture window, which is also the grid step between centres.
    pub const WINDOW_HALF_WIDTH: u32 = 5;

    /// Summary statistics of a single window.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct WindowStats {
        pub variance: f64,
        pub contrast: f64,
    }

    /// Texture measures aggregated over every window of an image.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TextureStats {
        /// `1 / (1 + roughness)`, in (0, 1].
        pub uniformity: f64,
        /// Mean of per-window (max - min) brightness, in 0..=255.
        pub contrast: f64,
        /// Mean of per-window brightness variance.
        pub roughness: f64,
        /// Number of windows that contributed.
        pub window_count: usize,
    }

    /// A square patch of brightness samples centred on (`center_x`, `center_y`).
    pub struct Window<'a> {
        plane: &'a [f64],
        plane_width: u32,
        center_x: u32,
        center_y: u32,
        half_width: u32,
    }

    impl<'a> Window<'a> {
        /// The caller guarantees the window lies fully inside the plane.
        pub fn new(plane: &'a [f64], plane_width: u32, center_x: u32, center_y: u32, half_width: u32) -> Self {
            Self {
                plane,
                plane_width,
                center_x,
                center_y,
                half_width,
            }
        }

        pub fn stats(&self) -> WindowStats {
            let mut sum = 0.0;
            let mut sum_squares = 0.0;
            let mut min = f64::MAX;
            let mut max = f64::MIN;
            let mut count = 0usize;

            let (x0, x1) = (self.center_x - self.half_width, self.center_x + self.half_width);
            let (y0, y1) = (self.center_y - self.half_width, self.center_y + self.half_width);
            for y in y0..=y1 {
                let row = y as usize * self.plane_width as usize;
                for value in &self.plane[row + x0 as usize..=row + x1 as usize] {
                    sum += value;
                    sum_squares += value * value;
                    min = min.min(*value);
                    max = max.max(*value);
                    count += 1;
                }
            }

            let mean = sum / count as f64;
            // E[x^2] - E[x]^2 can dip a hair below zero on flat patches.
            let variance = (sum_squares / count as f64 - mean * mean).max(0.0);
            WindowStats {
                variance,
                contrast: max - min,
            }
        }
    }

    /// Aggregates window statistics over a brightness plane of `width` x `height`.
    pub fn analyze_texture(plane: &[f64], width: u32, height: u32) -> TextureStats {
        let step = WINDOW_HALF_WIDTH;
        let mut total_variance = 0.0;
        let mut total_contrast = 0.0;
        let mut windows = 0usize;

        let mut y = step;
        while y + step < height {
            let mut x = step;
            while x + step < width {
                let stats = Window::new(plane, width, x, y, step).stats();
                total_variance += stats.variance;
                total_contrast += stats.contrast;
                windows += 1;
                x += step;
            }
            y += step;
        }

        if windows == 0 {
            return TextureStats {
                uniformity: 1.0,
                contrast: 0.0,
                roughness: 0.0,
                window_count: 0,
            };
        }

        let roughness = total_variance / windows as f64;
        TextureStats {
            uniformity: 1.0 / (1.0 + roughness),
            contrast: total_contrast / windows as f64,
            roughness,
            window_count: windows,
        }
    }

}
