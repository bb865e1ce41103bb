//! Pure Rust [`ImageProcessor`] over the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP, TIFF, BMP) | `image::load_from_memory` |
//! | Scale | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Crop | `image::DynamicImage::crop_imm` |
//! | Encode | per-format encoders from `image::codecs` |
//!
//! Everything is statically linked; no external binaries or system libraries.
//!
//! GIF output is encoded as a single frame even when `animated` is requested —
//! multi-frame re-encoding is a processor capability, not a pipeline one, and
//! a backend with full animation support can honor the same option.

use super::{Dimensions, EncodeOptions, ImageHandle, ImageProcessor, ImagingError};
use image::codecs::png;
use image::imageops::FilterType;
use image::{DynamicImage, Frame};
use std::io::Cursor;

/// Stateless processor; cheap to share across requests.
pub struct RustProcessor;

impl RustProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProcessor for RustProcessor {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ImageHandle>, ImagingError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
        Ok(Box::new(RustImage { image }))
    }
}

/// A decoded image owning its pixel buffer.
pub struct RustImage {
    image: DynamicImage,
}

impl RustImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }
}

fn encode_err(format: &str, reason: impl ToString) -> ImagingError {
    ImagingError::Encode {
        format: format.to_string(),
        reason: reason.to_string(),
    }
}

/// PNG compression strategy for a 0-9 level knob.
fn png_compression(level: Option<u32>) -> png::CompressionType {
    match level {
        Some(0..=3) => png::CompressionType::Fast,
        Some(7..) => png::CompressionType::Best,
        _ => png::CompressionType::Default,
    }
}

fn png_filter(name: Option<&str>) -> Result<png::FilterType, ImagingError> {
    match name {
        None | Some("adaptive") => Ok(png::FilterType::Adaptive),
        Some("none") => Ok(png::FilterType::NoFilter),
        Some("sub") => Ok(png::FilterType::Sub),
        Some("up") => Ok(png::FilterType::Up),
        Some("avg") => Ok(png::FilterType::Avg),
        Some("paeth") => Ok(png::FilterType::Paeth),
        Some(other) => Err(encode_err(
            "png",
            format!("unknown compression filter \"{other}\""),
        )),
    }
}

impl ImageHandle for RustImage {
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    fn scale(&self, width: u32, height: u32) -> Result<Box<dyn ImageHandle>, ImagingError> {
        Ok(Box::new(RustImage {
            image: self.image.resize_exact(width, height, FilterType::Lanczos3),
        }))
    }

    fn crop(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn ImageHandle>, ImagingError> {
        let bounds = self.dimensions();
        if x.saturating_add(width) > bounds.width || y.saturating_add(height) > bounds.height {
            return Err(ImagingError::CropOutOfBounds {
                x,
                y,
                width,
                height,
                image_width: bounds.width,
                image_height: bounds.height,
            });
        }
        Ok(Box::new(RustImage {
            image: self.image.crop_imm(x, y, width, height),
        }))
    }

    fn encode(&self, extension: &str, options: &EncodeOptions) -> Result<Vec<u8>, ImagingError> {
        let mut buffer = Cursor::new(Vec::new());

        match extension {
            "jpg" | "jpeg" | "jpe" => {
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut buffer,
                    options.jpeg_quality(),
                );
                // JPEG has no alpha channel
                self.image
                    .to_rgb8()
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(extension, e))?;
            }
            "png" => {
                let encoder = png::PngEncoder::new_with_quality(
                    &mut buffer,
                    png_compression(options.png_compression_level),
                    png_filter(options.png_compression_filter.as_deref())?,
                );
                self.image
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(extension, e))?;
            }
            "gif" => {
                let mut encoder = image::codecs::gif::GifEncoder::new(&mut buffer);
                encoder
                    .encode_frame(Frame::new(self.image.to_rgba8()))
                    .map_err(|e| encode_err(extension, e))?;
            }
            "webp" => {
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buffer);
                self.image
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(extension, e))?;
            }
            "bmp" => {
                let encoder = image::codecs::bmp::BmpEncoder::new(&mut buffer);
                self.image
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(extension, e))?;
            }
            "tif" | "tiff" => {
                let encoder = image::codecs::tiff::TiffEncoder::new(&mut buffer);
                self.image
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(extension, e))?;
            }
            other => return Err(ImagingError::UnsupportedFormat(other.to_string())),
        }

        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// A small in-memory PNG with deterministic pixel content.
    fn test_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn load_reports_dimensions() {
        let handle = RustProcessor::new().load(&test_png_bytes(64, 48)).unwrap();
        let dims = handle.dimensions();
        assert_eq!((dims.width, dims.height), (64, 48));
    }

    #[test]
    fn load_rejects_garbage() {
        assert!(matches!(
            RustProcessor::new().load(b"definitely not an image"),
            Err(ImagingError::Decode(_))
        ));
    }

    #[test]
    fn scale_produces_exact_dimensions() {
        let handle = RustProcessor::new().load(&test_png_bytes(100, 80)).unwrap();
        let scaled = handle.scale(50, 40).unwrap();
        assert_eq!(
            scaled.dimensions(),
            Dimensions {
                width: 50,
                height: 40
            }
        );
    }

    #[test]
    fn crop_within_bounds() {
        let handle = RustProcessor::new().load(&test_png_bytes(100, 80)).unwrap();
        let cropped = handle.crop(10, 10, 30, 20).unwrap();
        assert_eq!(
            cropped.dimensions(),
            Dimensions {
                width: 30,
                height: 20
            }
        );
    }

    #[test]
    fn crop_out_of_bounds_errors() {
        let handle = RustProcessor::new().load(&test_png_bytes(100, 80)).unwrap();
        assert!(matches!(
            handle.crop(90, 0, 30, 20),
            Err(ImagingError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn encode_jpeg_round_trips_through_decoder() {
        let handle = RustProcessor::new().load(&test_png_bytes(32, 32)).unwrap();
        let bytes = handle.encode("jpg", &EncodeOptions::default()).unwrap();
        // JPEG magic
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
        let reloaded = RustProcessor::new().load(&bytes).unwrap();
        assert_eq!(
            reloaded.dimensions(),
            Dimensions {
                width: 32,
                height: 32
            }
        );
    }

    #[test]
    fn encode_png_and_gif_signatures() {
        let handle = RustProcessor::new().load(&test_png_bytes(16, 16)).unwrap();

        let png_bytes = handle.encode("png", &EncodeOptions::default()).unwrap();
        assert_eq!(&png_bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);

        let gif_bytes = handle.encode("gif", &EncodeOptions::default()).unwrap();
        assert_eq!(&gif_bytes[..3], b"GIF");
    }

    #[test]
    fn encode_unsupported_format_errors() {
        let handle = RustProcessor::new().load(&test_png_bytes(16, 16)).unwrap();
        assert!(matches!(
            handle.encode("xpm", &EncodeOptions::default()),
            Err(ImagingError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn encode_png_rejects_unknown_filter() {
        let handle = RustProcessor::new().load(&test_png_bytes(16, 16)).unwrap();
        let options = EncodeOptions {
            png_compression_filter: Some("zigzag".to_string()),
            ..EncodeOptions::default()
        };
        assert!(matches!(
            handle.encode("png", &options),
            Err(ImagingError::Encode { .. })
        ));
    }

    #[test]
    fn jpeg_quality_prefers_dedicated_override() {
        let options = EncodeOptions {
            quality: 100,
            jpeg_quality: Some(40),
            ..EncodeOptions::default()
        };
        assert_eq!(options.jpeg_quality(), 40);

        let fallback = EncodeOptions {
            quality: 70,
            ..EncodeOptions::default()
        };
        assert_eq!(fallback.jpeg_quality(), 70);
    }

    #[test]
    fn png_compression_mapping() {
        assert_eq!(png_compression(Some(0)), png::CompressionType::Fast);
        assert_eq!(png_compression(Some(5)), png::CompressionType::Default);
        assert_eq!(png_compression(Some(9)), png::CompressionType::Best);
        assert_eq!(png_compression(None), png::CompressionType::Default);
    }
}
