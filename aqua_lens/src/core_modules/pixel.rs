// THEORY (Single-Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the water-quality extractor.
// It is a "dumb" data container for a single RGBA sample plus the handful of
// single-pixel metrics every higher pass is built on. Anything that needs a
// neighbor (gradients, windows, flood fill) lives in the spatial modules.
//
// What lives here:
// - Raw channels (RGBA, 0..255).
// - Brightness as the plain RGB mean. Every spatial pass (texture, Sobel, region
//   growing) works on this value, so it is computed in exactly one place.
// - The 16-level quantization used by the dominant-color map.
//
// Key principles:
// 1) Single-pixel scope: nothing here reads neighbors or history.
// 2) Cheap: every method is a handful of integer or float operations on the
//    hot path of a 262,144-pixel scan.

pub mod pixel {
    pub type Channel = u8;
    pub type Brightness = f64;

    /// Number of bytes per pixel in every raster buffer handled by the crate.
    pub const CHANNELS: usize = 4;

    /// Quantization step of the dominant-color map (16 levels per channel).
    pub const QUANTIZATION_STEP: u8 = 16;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Mean of the three color channels, in 0.0..=255.0.
        #[inline]
        pub fn brightness(&self) -> Brightness {
            (self.red as f64 + self.green as f64 + self.blue as f64) / 3.0
        }

        /// Brightness rounded to the nearest histogram bin.
        #[inline]
        pub fn brightness_bin(&self) -> usize {
            self.brightness().round() as usize
        }

        /// Bucket coordinates in the 16x16x16 dominant-color map.
        #[inline]
        pub fn quantized(&self) -> (u8, u8, u8) {
            (
                self.red / QUANTIZATION_STEP,
                self.green / QUANTIZATION_STEP,
                self.blue / QUANTIZATION_STEP,
            )
        }

        /// Packs the quantized bucket into a single index in 0..4096.
        #[inline]
        pub fn bucket_index(&self) -> usize {
            let (r, g, b) = self.quantized();
            ((r as usize) << 8) | ((g as usize) << 4) | b as usize
        }
    }

    impl From<&[u8]> for Pixel {
        /// Reads the first four bytes of an RGBA slice. Short slices are padded
        /// with opaque black.
        fn from(bytes: &[u8]) -> Self {
            let channel = |i: usize, fallback: u8| bytes.get(i).copied().unwrap_or(fallback);
            Pixel::new(channel(0, 0), channel(1, 0), channel(2, 0), channel(3, 255))
        }
    }

}
