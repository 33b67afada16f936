// SPDX-License-Identifier: MIT
//! # crop-decimate: Region-of-Interest Cropping and Decimation for Camera Frames
//!
//! This crate is the stateless half of the crop/decimate node: it cuts a
//! rectangle out of a camera frame, point-samples it down by integer factors
//! and rederives the calibration so it stays geometrically valid for the
//! produced image.
//!
//! ## Key Components
//!
//! - [`frame`]: Arc-shared, stride-aware [`ImageFrame`]
//! - [`calibration`]: [`CameraInfo`] and its rescaling rules
//! - [`plan`]: [`TransformConfig`] resolution into a [`CropPlan`]
//! - [`cpu`]: the pixel kernel
//!
//! ## Guarantees
//!
//! - Output pixels are an exact subset of input pixels (no interpolation)
//! - A full-frame, factor-1 configuration returns the input untouched
//! - Chained transforms describe the same sensor mapping as one composed
//!   transform
//! - A transform fails only with a [`TransformError`]; it never panics on
//!   request or calibration values
//!
//! ## Usage Example
//!
//! ```rust
//! use crop_decimate::{transform, CameraInfo, ImageFrame, PixelEncoding, TransformConfig};
//!
//! let frame = ImageFrame::packed(vec![0u8; 640 * 480 * 3], 640, 480, PixelEncoding::Bgr8)?;
//! let info = CameraInfo::pinhole(640, 480, 525.0, 525.0);
//!
//! let config = TransformConfig::default()
//!     .with_decimation(2, 2)
//!     .with_region(100, 50, 200, 100);
//!
//! let (out, out_info) = transform(&config, &frame, &info)?;
//! assert_eq!((out.width(), out.height()), (100, 50));
//! assert_eq!(out_info.roi.x_offset, 100);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod calibration;
pub mod cpu;
pub mod frame;
pub mod plan;

pub use calibration::{CameraInfo, RegionOfInterest};
pub use frame::{FrameError, ImageFrame, PixelEncoding};
pub use plan::{build_plan, Axis, CropPlan, TransformConfig, TransformError};

/// Crop and decimate `frame` according to `config` and rederive `info` for
/// the result.
///
/// The frame header (`frame_id`, `pts_ns`) is carried over. The output frame
/// is tightly packed.
pub fn transform(
    config: &TransformConfig,
    frame: &ImageFrame,
    info: &CameraInfo,
) -> Result<(ImageFrame, CameraInfo), TransformError> {
    let plan = build_plan(frame.width(), frame.height(), config)?;

    if plan.is_noop(frame.width(), frame.height()) {
        return Ok((frame.clone(), info.clone()));
    }

    let out_info = calibration::rescale(info, &plan, frame.width(), frame.height())?;

    let pixels = cpu::crop_decimate_pixels(frame, &plan);
    let mut out = ImageFrame::from_kernel(pixels, plan.out_width, plan.out_height, frame.encoding());
    out.frame_id = frame.frame_id.clone();
    out.pts_ns = frame.pts_ns;

    Ok((out, out_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_frame(width: u32, height: u32) -> ImageFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
            }
        }
        ImageFrame::packed(data, width, height, PixelEncoding::Bgr8)
            .unwrap()
            .with_frame_id("camera_optical")
            .with_pts_ns(42)
    }

    #[test]
    fn passthrough_is_identity() {
        let frame = pattern_frame(64, 48);
        let info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        let (out, out_info) = transform(&TransformConfig::passthrough(), &frame, &info).unwrap();

        assert!(out.shares_buffer(&frame));
        assert_eq!(out.data(), frame.data());
        assert_eq!(out_info, info);
    }

    #[test]
    fn explicit_full_region_is_also_identity() {
        let frame = pattern_frame(64, 48);
        let info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        let cfg = TransformConfig::passthrough().with_region(0, 0, 64, 48);
        let (out, out_info) = transform(&cfg, &frame, &info).unwrap();
        assert!(out.shares_buffer(&frame));
        assert_eq!(out_info, info);
    }

    #[test]
    fn zero_region_decimates_whole_frame() {
        let frame = pattern_frame(64, 48);
        let info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        let cfg = TransformConfig::default().with_decimation(4, 4);
        let (out, out_info) = transform(&cfg, &frame, &info).unwrap();

        assert_eq!((out.width(), out.height()), (16, 12));
        assert_eq!(out.pixel(3, 2), frame.pixel(12, 8));
        assert_eq!(out_info.roi.width, 64);
        assert!(!out_info.roi.do_rectify);
    }

    #[test]
    fn header_is_carried_over() {
        let frame = pattern_frame(64, 48);
        let info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        let cfg = TransformConfig::default().with_decimation(2, 2);
        let (out, _) = transform(&cfg, &frame, &info).unwrap();
        assert_eq!(out.frame_id, "camera_optical");
        assert_eq!(out.pts_ns, Some(42));
        assert_eq!(out.step(), 32 * 3);
    }

    #[test]
    fn out_of_bounds_region_fails() {
        let frame = pattern_frame(64, 48);
        let info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        let cfg = TransformConfig::passthrough().with_region(0, 40, 10, 9);
        assert!(matches!(
            transform(&cfg, &frame, &info),
            Err(TransformError::InvalidRegion { axis: Axis::Vertical, .. })
        ));
    }

    #[test]
    fn oversized_decimation_fails() {
        let frame = pattern_frame(64, 48);
        let info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        let cfg = TransformConfig::default().with_decimation(65, 1);
        assert!(matches!(
            transform(&cfg, &frame, &info),
            Err(TransformError::DegenerateOutput { axis: Axis::Horizontal, .. })
        ));
    }

    #[test]
    fn overflowing_calibration_fails() {
        let frame = pattern_frame(64, 48);
        let mut info = CameraInfo::pinhole(64, 48, 60.0, 60.0);
        info.binning_x = 1 << 31;
        let cfg = TransformConfig::default().with_decimation(2, 1);
        assert!(matches!(
            transform(&cfg, &frame, &info),
            Err(TransformError::InvalidCalibration { axis: Axis::Horizontal, .. })
        ));
    }

    #[test]
    fn chained_transforms_match_composed_transform() {
        let frame = pattern_frame(640, 480);
        let info = CameraInfo::pinhole(640, 480, 525.0, 525.0);

        let a = TransformConfig::default()
            .with_decimation(2, 2)
            .with_region(100, 50, 400, 300);
        let b = TransformConfig::default()
            .with_decimation(3, 2)
            .with_region(10, 20, 90, 60);

        let (mid, mid_info) = transform(&a, &frame, &info).unwrap();
        let (twice, twice_info) = transform(&b, &mid, &mid_info).unwrap();

        let composed = TransformConfig::default()
            .with_decimation(2 * 3, 2 * 2)
            .with_region(100 + 10 * 2, 50 + 20 * 2, 90 * 2, 60 * 2);
        let (once, once_info) = transform(&composed, &frame, &info).unwrap();

        assert_eq!((twice.width(), twice.height()), (once.width(), once.height()));
        assert_eq!(twice.data(), once.data());
        assert_eq!(twice_info, once_info);
    }
}
