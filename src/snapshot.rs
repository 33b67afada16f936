//! PNG snapshots of delivered frames.
//!
//! Channel order is normalised on the way out: BGR(A) frames are swapped to
//! RGB(A). 16-bit encodings are read as native-endian samples.

use std::path::Path;

use anyhow::{Context, Result};
use crop_decimate::{ImageFrame, PixelEncoding};
use image::{DynamicImage, ImageBuffer, ImageFormat};

/// Convert `frame` into an [`image::DynamicImage`].
pub fn to_dynamic_image(frame: &ImageFrame) -> Result<DynamicImage> {
    let (width, height) = (frame.width(), frame.height());
    let packed = frame.to_packed_vec();

    let image = match frame.encoding() {
        PixelEncoding::Mono8 => DynamicImage::ImageLuma8(
            ImageBuffer::from_raw(width, height, packed).context("mono8 buffer size mismatch")?,
        ),
        PixelEncoding::Mono16 => DynamicImage::ImageLuma16(
            ImageBuffer::from_raw(width, height, to_u16(&packed))
                .context("mono16 buffer size mismatch")?,
        ),
        PixelEncoding::Rgb8 => DynamicImage::ImageRgb8(
            ImageBuffer::from_raw(width, height, packed).context("rgb8 buffer size mismatch")?,
        ),
        PixelEncoding::Bgr8 => DynamicImage::ImageRgb8(
            ImageBuffer::from_raw(width, height, swap_red_blue(packed, 3))
                .context("bgr8 buffer size mismatch")?,
        ),
        PixelEncoding::Rgba8 => DynamicImage::ImageRgba8(
            ImageBuffer::from_raw(width, height, packed).context("rgba8 buffer size mismatch")?,
        ),
        PixelEncoding::Bgra8 => DynamicImage::ImageRgba8(
            ImageBuffer::from_raw(width, height, swap_red_blue(packed, 4))
                .context("bgra8 buffer size mismatch")?,
        ),
        PixelEncoding::Rgb16 => DynamicImage::ImageRgb16(
            ImageBuffer::from_raw(width, height, to_u16(&packed))
                .context("rgb16 buffer size mismatch")?,
        ),
        PixelEncoding::Bgr16 => {
            let mut samples = to_u16(&packed);
            for pixel in samples.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
            DynamicImage::ImageRgb16(
                ImageBuffer::from_raw(width, height, samples).context("bgr16 buffer size mismatch")?,
            )
        }
    };
    Ok(image)
}

/// Write `frame` to `path` as PNG.
pub fn save_png(frame: &ImageFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    to_dynamic_image(frame)?
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing snapshot to {}", path.display()))
}

fn swap_red_blue(mut data: Vec<u8>, channels: usize) -> Vec<u8> {
    for pixel in data.chunks_exact_mut(channels) {
        pixel.swap(0, 2);
    }
    data
}

fn to_u16(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}
