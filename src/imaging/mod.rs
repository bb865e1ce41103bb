//! Image processing seam.
//!
//! The pipeline never touches pixels directly: filters and export go through
//! the [`ImageProcessor`] / [`ImageHandle`] traits, so the manipulation
//! library stays an external collaborator behind a narrow interface.
//!
//! - **Load**: [`ImageProcessor::load`] decodes raw bytes into a handle.
//! - **Primitives**: handles expose `dimensions`, `scale`, and `crop`; filter
//!   loaders combine them with the pure math in [`calculations`].
//! - **Export**: [`ImageHandle::encode`] produces bytes for a target format
//!   under [`EncodeOptions`].
//!
//! The production implementation is [`RustProcessor`](rust_backend::RustProcessor)
//! over the `image` crate. Handles own their pixel data; replacing the working
//! image during a filter chain drops the prior handle and frees its buffer
//! immediately rather than waiting on a collector.

pub mod calculations;
pub mod rust_backend;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image as \"{format}\": {reason}")]
    Encode { format: String, reason: String },
    #[error("unsupported output format: \"{0}\"")]
    UnsupportedFormat(String),
    #[error("crop {width}x{height}+{x}+{y} exceeds image bounds {image_width}x{image_height}")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}

/// Pixel dimensions of a working image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Export options negotiated by the filter manager.
///
/// `quality` is the generic knob; `jpeg_quality` overrides it for JPEG output,
/// and the `png_*` fields map onto the PNG encoder's compression and filter
/// strategy. `animated` only matters for GIF output.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub quality: u32,
    pub jpeg_quality: Option<u32>,
    pub png_compression_level: Option<u32>,
    pub png_compression_filter: Option<String>,
    pub animated: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: 100,
            jpeg_quality: None,
            png_compression_level: None,
            png_compression_filter: None,
            animated: false,
        }
    }
}

impl EncodeOptions {
    /// JPEG encoder quality: the dedicated override, else the generic knob.
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.unwrap_or(self.quality).clamp(1, 100) as u8
    }
}

/// An in-memory decoded image.
pub trait ImageHandle {
    fn dimensions(&self) -> Dimensions;

    /// Scale to exactly `width` x `height`.
    fn scale(&self, width: u32, height: u32) -> Result<Box<dyn ImageHandle>, ImagingError>;

    /// Crop the rectangle at (`x`, `y`) sized `width` x `height`.
    fn crop(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn ImageHandle>, ImagingError>;

    /// Encode as the format named by `extension` (e.g. `"jpg"`, `"png"`).
    fn encode(&self, extension: &str, options: &EncodeOptions) -> Result<Vec<u8>, ImagingError>;
}

/// Decodes raw bytes into an [`ImageHandle`].
pub trait ImageProcessor: Send + Sync {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ImageHandle>, ImagingError>;
}
