// SPDX-License-Identifier: MIT
//! # Image Frames
//!
//! Opaque, immutable pixel grids shared between the producer, the delivery
//! session and consumers.
//!
//! ## Memory Layout
//!
//! - Row-major, `step` bytes per row (may exceed `width * bytes_per_pixel`)
//! - Pixel data is `Arc`-wrapped: cloning a frame never copies pixels
//! - Frames produced by the transform engine are tightly packed

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Pixel encodings the engine knows how to step over.
///
/// Only the pixel size matters for cropping and point sampling; channel
/// order is carried through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelEncoding {
    Mono8,
    Mono16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Rgb16,
    Bgr16,
}

impl PixelEncoding {
    /// Bytes occupied by a single pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelEncoding::Mono8 => 1,
            PixelEncoding::Mono16 => 2,
            PixelEncoding::Rgb8 | PixelEncoding::Bgr8 => 3,
            PixelEncoding::Rgba8 | PixelEncoding::Bgra8 => 4,
            PixelEncoding::Rgb16 | PixelEncoding::Bgr16 => 6,
        }
    }

    /// Wire name of the encoding (`"bgr8"`, `"mono16"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            PixelEncoding::Mono8 => "mono8",
            PixelEncoding::Mono16 => "mono16",
            PixelEncoding::Rgb8 => "rgb8",
            PixelEncoding::Bgr8 => "bgr8",
            PixelEncoding::Rgba8 => "rgba8",
            PixelEncoding::Bgra8 => "bgra8",
            PixelEncoding::Rgb16 => "rgb16",
            PixelEncoding::Bgr16 => "bgr16",
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelEncoding {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mono8" => Ok(PixelEncoding::Mono8),
            "mono16" => Ok(PixelEncoding::Mono16),
            "rgb8" => Ok(PixelEncoding::Rgb8),
            "bgr8" => Ok(PixelEncoding::Bgr8),
            "rgba8" => Ok(PixelEncoding::Rgba8),
            "bgra8" => Ok(PixelEncoding::Bgra8),
            "rgb16" => Ok(PixelEncoding::Rgb16),
            "bgr16" => Ok(PixelEncoding::Bgr16),
            _ => Err(FrameError::UnknownEncoding(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// `step` is smaller than one row of pixels.
    StrideTooSmall { step: usize, row_bytes: usize },
    /// The buffer does not hold `step * height` bytes.
    BufferTooSmall { len: usize, required: usize },
    /// `width`, `height` and pixel size overflow `usize`.
    DimensionsOverflow,
    UnknownEncoding(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::StrideTooSmall { step, row_bytes } => {
                write!(f, "Row stride {} is smaller than one row ({} bytes)", step, row_bytes)
            }
            FrameError::BufferTooSmall { len, required } => {
                write!(f, "Pixel buffer holds {} bytes, frame needs {}", len, required)
            }
            FrameError::DimensionsOverflow => write!(f, "Frame dimensions overflow"),
            FrameError::UnknownEncoding(name) => write!(f, "Unknown pixel encoding '{}'", name),
        }
    }
}

impl std::error::Error for FrameError {}

/// An immutable camera frame.
///
/// The constructor guarantees `step >= width * bytes_per_pixel` and
/// `data.len() >= step * height`, so every row can be sliced without
/// further checks.
#[derive(Clone, Debug)]
pub struct ImageFrame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    step: usize,
    encoding: PixelEncoding,
    /// Coordinate frame the image was captured in.
    pub frame_id: String,
    /// Optional capture timestamp in nanoseconds.
    pub pts_ns: Option<u64>,
}

impl ImageFrame {
    /// Wrap an existing buffer. `step` is the number of bytes per row.
    pub fn new(
        data: impl Into<Arc<Vec<u8>>>,
        width: u32,
        height: u32,
        step: usize,
        encoding: PixelEncoding,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        let row_bytes = (width as usize)
            .checked_mul(encoding.bytes_per_pixel())
            .ok_or(FrameError::DimensionsOverflow)?;
        if step < row_bytes {
            return Err(FrameError::StrideTooSmall { step, row_bytes });
        }
        let required = step
            .checked_mul(height as usize)
            .ok_or(FrameError::DimensionsOverflow)?;
        if data.len() < required {
            return Err(FrameError::BufferTooSmall {
                len: data.len(),
                required,
            });
        }
        Ok(Self {
            data,
            width,
            height,
            step,
            encoding,
            frame_id: String::new(),
            pts_ns: None,
        })
    }

    /// Wrap a tightly packed buffer (`step == width * bytes_per_pixel`).
    pub fn packed(
        data: Vec<u8>,
        width: u32,
        height: u32,
        encoding: PixelEncoding,
    ) -> Result<Self, FrameError> {
        let step = (width as usize)
            .checked_mul(encoding.bytes_per_pixel())
            .ok_or(FrameError::DimensionsOverflow)?;
        Self::new(data, width, height, step, encoding)
    }

    /// Kernel output: already tightly packed to `width * height` pixels.
    pub(crate) fn from_kernel(data: Vec<u8>, width: u32, height: u32, encoding: PixelEncoding) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * encoding.bytes_per_pixel()
        );
        Self {
            data: Arc::new(data),
            width,
            height,
            step: width as usize * encoding.bytes_per_pixel(),
            encoding,
            frame_id: String::new(),
            pts_ns: None,
        }
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    pub fn with_pts_ns(mut self, pts_ns: u64) -> Self {
        self.pts_ns = Some(pts_ns);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    /// Raw pixel bytes, including any row padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.step;
        &self.data[start..start + self.width as usize * self.encoding.bytes_per_pixel()]
    }

    /// Bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.encoding.bytes_per_pixel();
        let start = y as usize * self.step + x as usize * bpp;
        &self.data[start..start + bpp]
    }

    /// True if both frames share the same pixel allocation.
    pub fn shares_buffer(&self, other: &ImageFrame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy of the pixels with row padding removed.
    pub fn to_packed_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.width as usize * self.height as usize * self.encoding.bytes_per_pixel(),
        );
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}
