// SPDX-License-Identifier: MIT
//! # Camera Calibration Records
//!
//! Pinhole calibration that accompanies every frame, and the rules for
//! rederiving it after a crop + decimate.
//!
//! ## Conventions
//!
//! - `width`/`height` are the full sensor resolution and never change.
//! - `binning_x`/`binning_y` of `0` are read as `1`.
//! - `roi` is expressed in full-resolution sensor pixels; a zero width or
//!   height means the frame covers the whole sensor.
//! - Invariant: `roi` and binning always describe the frame they travel with,
//!   so `roi.width / binning_x` is the frame width once a region is set.
//!
//! Applying the transform repeatedly composes: offsets accumulate in sensor
//! units and binning multiplies, so two chained stages describe the same
//! mapping as one stage with the composed configuration.

use serde::{Deserialize, Serialize};

use crate::plan::{Axis, CropPlan, TransformError};

/// Sub-window of the full-resolution sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
    /// Set when the frame is a sub-window that needs its own rectification.
    #[serde(default)]
    pub do_rectify: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    /// Distortion coefficients.
    pub d: Vec<f64>,
    /// Intrinsic matrix, row-major 3x3.
    pub k: [f64; 9],
    /// Rectification rotation, row-major 3x3.
    pub r: [f64; 9],
    /// Projection matrix, row-major 3x4.
    pub p: [f64; 12],
    pub binning_x: u32,
    pub binning_y: u32,
    pub roi: RegionOfInterest,
}

impl CameraInfo {
    /// Ideal pinhole camera with no distortion, principal point at the
    /// image centre.
    pub fn pinhole(width: u32, height: u32, fx: f64, fy: f64) -> Self {
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        Self {
            width,
            height,
            distortion_model: "plumb_bob".to_string(),
            d: vec![0.0; 5],
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
            binning_x: 1,
            binning_y: 1,
            roi: RegionOfInterest::default(),
        }
    }

    pub fn effective_binning_x(&self) -> u32 {
        self.binning_x.max(1)
    }

    pub fn effective_binning_y(&self) -> u32 {
        self.binning_y.max(1)
    }

    pub fn fx(&self) -> f64 {
        self.k[0]
    }

    pub fn fy(&self) -> f64 {
        self.k[4]
    }

    pub fn cx(&self) -> f64 {
        self.k[2]
    }

    pub fn cy(&self) -> f64 {
        self.k[5]
    }
}

/// Calibration for the frame produced by `plan`.
///
/// Existing binning scales the crop offset into sensor units before it is
/// added to the recorded ROI offset. The focal lengths, principal point and
/// projection translation scale with the new decimation factors; `d` and `r`
/// pass through.
///
/// Fails with [`TransformError::InvalidCalibration`] when the incoming binning
/// or ROI is too large for the composed values to fit in `u32`.
pub fn rescale(
    info: &CameraInfo,
    plan: &CropPlan,
    src_width: u32,
    src_height: u32,
) -> Result<CameraInfo, TransformError> {
    let mut out = info.clone();

    let x = compose_axis(
        Axis::Horizontal,
        info.effective_binning_x(),
        info.roi.x_offset,
        plan.decimation_x,
        plan.x_offset,
        plan.covered_width(),
    )?;
    let y = compose_axis(
        Axis::Vertical,
        info.effective_binning_y(),
        info.roi.y_offset,
        plan.decimation_y,
        plan.y_offset,
        plan.covered_height(),
    )?;

    (out.binning_x, out.roi.x_offset, out.roi.width) = x;
    (out.binning_y, out.roi.y_offset, out.roi.height) = y;
    if plan.covered_width() != src_width || plan.covered_height() != src_height {
        out.roi.do_rectify = true;
    }

    let dx = plan.decimation_x as f64;
    let dy = plan.decimation_y as f64;

    // fx, cx / fy, cy
    out.k[0] /= dx;
    out.k[2] /= dx;
    out.k[4] /= dy;
    out.k[5] /= dy;

    // first projection row is fx' 0 cx' Tx, second 0 fy' cy' Ty
    for i in 0..4 {
        out.p[i] /= dx;
        out.p[4 + i] /= dy;
    }

    Ok(out)
}

/// New `(binning, roi_offset, roi_extent)` along one axis.
fn compose_axis(
    axis: Axis,
    binning: u32,
    roi_offset: u32,
    decimation: u32,
    crop_offset: u32,
    covered: u32,
) -> Result<(u32, u32, u32), TransformError> {
    let overflow = || TransformError::InvalidCalibration {
        axis,
        binning,
        roi_offset,
    };
    let out_binning = binning.checked_mul(decimation).ok_or_else(overflow)?;
    let out_offset = crop_offset
        .checked_mul(binning)
        .and_then(|sensor| roi_offset.checked_add(sensor))
        .ok_or_else(overflow)?;
    let out_extent = covered.checked_mul(binning).ok_or_else(overflow)?;
    Ok((out_binning, out_offset, out_extent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{build_plan, TransformConfig};

    #[test]
    fn decimation_scales_intrinsics() {
        let info = CameraInfo::pinhole(640, 480, 500.0, 400.0);
        let cfg = TransformConfig::default().with_decimation(2, 4);
        let plan = build_plan(640, 480, &cfg).unwrap();
        let out = rescale(&info, &plan, 640, 480).unwrap();

        assert_eq!(out.fx(), 250.0);
        assert_eq!(out.cx(), 160.0);
        assert_eq!(out.fy(), 100.0);
        assert_eq!(out.cy(), 60.0);
        assert_eq!(out.p[0], 250.0);
        assert_eq!(out.p[6], 60.0);
        assert_eq!((out.binning_x, out.binning_y), (2, 4));
        assert_eq!(out.d, info.d);
        assert_eq!(out.r, info.r);
    }

    #[test]
    fn roi_is_recorded_in_sensor_units() {
        let info = CameraInfo::pinhole(640, 480, 500.0, 500.0);
        let cfg = TransformConfig::default()
            .with_decimation(2, 2)
            .with_region(100, 50, 200, 100);
        let plan = build_plan(640, 480, &cfg).unwrap();
        let out = rescale(&info, &plan, 640, 480).unwrap();

        assert_eq!(
            out.roi,
            RegionOfInterest {
                x_offset: 100,
                y_offset: 50,
                width: 200,
                height: 100,
                do_rectify: true,
            }
        );
        assert_eq!(out.roi.width / out.binning_x, plan.out_width);
    }

    #[test]
    fn existing_binning_scales_offsets() {
        // Frame already binned 2x2 and cropped at (40, 20) on the sensor.
        let mut info = CameraInfo::pinhole(1280, 960, 1000.0, 1000.0);
        info.binning_x = 2;
        info.binning_y = 2;
        info.roi = RegionOfInterest {
            x_offset: 40,
            y_offset: 20,
            width: 1200,
            height: 900,
            do_rectify: true,
        };

        let cfg = TransformConfig::default()
            .with_decimation(3, 1)
            .with_region(10, 5, 90, 0);
        let plan = build_plan(600, 450, &cfg).unwrap();
        let out = rescale(&info, &plan, 600, 450).unwrap();

        assert_eq!(out.roi.x_offset, 40 + 10 * 2);
        assert_eq!(out.roi.y_offset, 20 + 5 * 2);
        assert_eq!(out.roi.width, 90 * 2);
        assert_eq!(out.roi.height, 445 * 2);
        assert_eq!((out.binning_x, out.binning_y), (6, 2));
    }

    #[test]
    fn roi_without_rectify_flag_deserializes() {
        let roi: RegionOfInterest =
            serde_json::from_str(r#"{"x_offset":4,"y_offset":2,"width":8,"height":6}"#).unwrap();
        assert_eq!((roi.x_offset, roi.width), (4, 8));
        assert!(!roi.do_rectify);
    }

    #[test]
    fn unset_binning_reads_as_one() {
        let mut info = CameraInfo::pinhole(64, 48, 50.0, 50.0);
        info.binning_x = 0;
        info.binning_y = 0;
        let cfg = TransformConfig::default().with_region(4, 2, 8, 8);
        let plan = build_plan(64, 48, &cfg).unwrap();
        let out = rescale(&info, &plan, 64, 48).unwrap();
        assert_eq!((out.binning_x, out.binning_y), (1, 1));
        assert_eq!((out.roi.x_offset, out.roi.y_offset), (4, 2));
    }

    #[test]
    fn oversized_binning_is_rejected() {
        let mut info = CameraInfo::pinhole(64, 48, 50.0, 50.0);
        info.binning_x = 1 << 31;
        let cfg = TransformConfig::default().with_decimation(2, 1);
        let plan = build_plan(64, 48, &cfg).unwrap();

        assert_eq!(
            rescale(&info, &plan, 64, 48),
            Err(TransformError::InvalidCalibration {
                axis: Axis::Horizontal,
                binning: 1 << 31,
                roi_offset: 0,
            })
        );
    }

    #[test]
    fn roi_offset_past_u32_is_rejected() {
        let mut info = CameraInfo::pinhole(64, 48, 50.0, 50.0);
        info.roi.y_offset = u32::MAX - 2;
        let cfg = TransformConfig::default().with_region(0, 10, 0, 0);
        let plan = build_plan(64, 48, &cfg).unwrap();

        let err = rescale(&info, &plan, 64, 48).unwrap_err();
        assert!(matches!(err, TransformError::InvalidCalibration { axis: Axis::Vertical, .. }));
    }
}
