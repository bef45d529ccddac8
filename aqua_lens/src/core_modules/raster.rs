// THEORY:
// The `raster` module is the boundary between the outside world and the
// extractor. Whatever the caller hands us (raw file bytes, a path on disk, or a
// `data:` URL pasted from a browser) is resolved exactly once into an
// `ImageSource`, decoded with the `image` crate, converted to RGBA8 and bounded
// to a working resolution. Every later pass sees the same flat, row-major RGBA
// buffer and never has to care where it came from.
//
// Key architectural principles:
// 1.  **Tagged input**: `ImageSource` is a closed sum type. There is no guessing
//     about whether a string is a path or an encoded image.
// 2.  **Bounded cost**: decoding downscales (never upscales) so the long edge is
//     at most `max_edge` pixels. All passes are O(width x height), so this bound
//     is the whole performance story.
// 3.  **All or nothing**: a decode failure is a typed `FeatureError`. No partial
//     raster is ever returned.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageEncoder;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default bound on the long edge of the working raster.
pub const DEFAULT_MAX_EDGE: u32 = 512;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to read image source: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("raster buffer has {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Where an image to analyze comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Encoded image bytes (PNG, JPEG, ...).
    Bytes(Vec<u8>),
    /// A file on disk.
    Path(PathBuf),
    /// A `data:<mime>;base64,<payload>` URL.
    DataUrl(String),
}

impl ImageSource {
    /// Returns the encoded bytes behind this source.
    pub fn read_bytes(&self) -> Result<Vec<u8>, FeatureError> {
        match self {
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
            ImageSource::Path(path) => Ok(std::fs::read(path)?),
            ImageSource::DataUrl(url) => decode_data_url(url),
        }
    }

    /// Short description used in log lines.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Bytes(bytes) => format!("{} in-memory bytes", bytes.len()),
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::DataUrl(url) => format!("data URL ({} chars)", url.len()),
        }
    }
}

fn decode_data_url(url: &str) -> Result<Vec<u8>, FeatureError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| FeatureError::InvalidDataUrl("missing `data:` scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FeatureError::InvalidDataUrl("missing `,` separator".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(FeatureError::InvalidDataUrl(
            "only base64 payloads are supported".to_string(),
        ));
    }
    BASE64
        .decode(payload.trim())
        .map_err(|e| FeatureError::InvalidDataUrl(e.to_string()))
}

/// A decoded, row-major RGBA8 image at working resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Wraps an existing RGBA buffer. The buffer must hold exactly
    /// `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FeatureError> {
        if width == 0 || height == 0 {
            return Err(FeatureError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FeatureError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A raster where every pixel has the same color.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Result<Self, FeatureError> {
        let data = [pixel.red, pixel.green, pixel.blue, pixel.alpha]
            .repeat(width as usize * height as usize);
        Self::from_rgba(width, height, data)
    }

    /// Decodes `source` and bounds it to `max_edge` on the long edge.
    pub fn decode(source: &ImageSource, max_edge: u32) -> Result<Self, FeatureError> {
        let bytes = source.read_bytes()?;
        let decoded = image::load_from_memory(&bytes)?;
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(FeatureError::EmptyImage { width, height });
        }

        let bounded = if width.max(height) > max_edge {
            tracing::debug!(width, height, max_edge, "downscaling image for analysis");
            decoded.resize(max_edge, max_edge, FilterType::Triangle)
        } else {
            decoded
        };

        let rgba = bounded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterates every pixel in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data.chunks_exact(CHANNELS).map(Pixel::from)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Pixel::from(&self.data[start..start + CHANNELS])
    }

    /// Mean of the RGB channels at `(x, y)`.
    pub fn brightness(&self, x: u32, y: u32) -> f64 {
        self.pixel(x, y).brightness()
    }

    /// Row-major plane of per-pixel brightness, shared by the spatial passes.
    pub fn brightness_plane(&self) -> Vec<f64> {
        self.pixels().map(|p| p.brightness()).collect()
    }

    /// Writes the raster as a PNG file.
    pub fn save_png(&self, path: &Path) -> Result<(), FeatureError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder.write_image(&self.data, self.width, self.height, image::ExtendedColorType::Rgba8)?;
        Ok(())
    }

    /// Encodes the raster as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, FeatureError> {
        let mut bytes = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
        encoder.write_image(&self.data, self.width, self.height, image::ExtendedColorType::Rgba8)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Raster {
        let mut buffer = vec![255u8; (width * height * 4) as usize];
        let mut intensity = 0u8;
        for px in buffer.chunks_mut(4) {
            px[0] = intensity;
            px[1] = intensity;
            px[2] = intensity;
            intensity = intensity.wrapping_add(1);
        }
        Raster::from_rgba(width, height, buffer).expect("valid buffer")
    }

    #[test]
    fn rejects_wrong_buffer_length() {
        let err = Raster::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, FeatureError::BufferSize { expected: 16, actual: 15, .. }));
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert!(matches!(
            Raster::from_rgba(0, 10, Vec::new()),
            Err(FeatureError::EmptyImage { .. })
        ));
    }

    #[test]
    fn decode_round_trips_small_png_without_scaling() {
        let raster = gradient(40, 30);
        let bytes = raster.to_png_bytes().unwrap();
        let decoded = Raster::decode(&ImageSource::Bytes(bytes), DEFAULT_MAX_EDGE).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
        assert_eq!(decoded, raster);
    }

    #[test]
    fn decode_bounds_long_edge() {
        let raster = gradient(1024, 300);
        let bytes = raster.to_png_bytes().unwrap();
        let decoded = Raster::decode(&ImageSource::Bytes(bytes), DEFAULT_MAX_EDGE).unwrap();
        assert_eq!(decoded.width(), 512);
        assert!(decoded.height() <= 151 && decoded.height() >= 149);
    }

    #[test]
    fn decode_accepts_base64_data_url() {
        let raster = Raster::filled(8, 8, Pixel::new(10, 200, 30, 255)).unwrap();
        let url = format!("data:image/png;base64,{}", BASE64.encode(raster.to_png_bytes().unwrap()));
        let decoded = Raster::decode(&ImageSource::DataUrl(url), DEFAULT_MAX_EDGE).unwrap();
        assert_eq!(decoded.pixel(3, 3), Pixel::new(10, 200, 30, 255));
        assert_eq!(decoded.brightness(3, 3), 80.0);
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let err = Raster::decode(&ImageSource::Bytes(b"not an image".to_vec()), 512).unwrap_err();
        assert!(matches!(err, FeatureError::Decode(_)));
    }

    #[test]
    fn malformed_data_url_is_rejected() {
        let err = Raster::decode(&ImageSource::DataUrl("image/png,abc".into()), 512).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidDataUrl(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let source = ImageSource::Path(PathBuf::from("/definitely/not/here.png"));
        assert!(matches!(Raster::decode(&source, 512), Err(FeatureError::Io(_))));
    }

    #[test]
    fn save_png_writes_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("white_file.png");
        let raster = Raster::filled(50, 20, Pixel::new(255, 255, 255, 255)).unwrap();
        raster.save_png(&path).expect("Error Saving File.");
        let decoded = Raster::decode(&ImageSource::Path(path), 512).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 20));
    }
}
