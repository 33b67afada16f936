// SPDX-License-Identifier: MIT
//! # Crop Plans
//!
//! Resolves a [`TransformConfig`] against the dimensions of a source frame into
//! a concrete [`CropPlan`]: the source rectangle to read, the sampling step on
//! each axis and the output dimensions.
//!
//! ## Resolution Rules
//!
//! 1. A requested width/height of `0` means "everything from the offset to the
//!    far edge of the frame".
//! 2. The rectangle must lie inside the frame, otherwise the plan fails with
//!    [`TransformError::InvalidRegion`].
//! 3. Output dimensions are `floor(extent / factor)`; a zero dimension fails
//!    with [`TransformError::DegenerateOutput`].
//! 4. Decimation factors of `0` are read as `1`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Crop and decimation settings for one transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Keep every `decimation_x`-th column.
    pub decimation_x: u32,
    /// Keep every `decimation_y`-th row.
    pub decimation_y: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    /// Region width in source pixels, `0` for the remaining extent.
    pub width: u32,
    /// Region height in source pixels, `0` for the remaining extent.
    pub height: u32,
}

impl TransformConfig {
    /// Full frame, no decimation.
    pub fn passthrough() -> Self {
        Self {
            decimation_x: 1,
            decimation_y: 1,
            ..Self::default()
        }
    }

    pub fn with_decimation(mut self, decimation_x: u32, decimation_y: u32) -> Self {
        self.decimation_x = decimation_x;
        self.decimation_y = decimation_y;
        self
    }

    pub fn with_region(mut self, x_offset: u32, y_offset: u32, width: u32, height: u32) -> Self {
        self.x_offset = x_offset;
        self.y_offset = y_offset;
        self.width = width;
        self.height = height;
        self
    }

    /// Horizontal factor with `0` read as `1`.
    pub fn factor_x(&self) -> u32 {
        self.decimation_x.max(1)
    }

    /// Vertical factor with `0` read as `1`.
    pub fn factor_y(&self) -> u32 {
        self.decimation_y.max(1)
    }
}

/// Which axis a transform error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Horizontal => f.write_str("horizontal"),
            Axis::Vertical => f.write_str("vertical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The requested rectangle does not fit inside the source frame.
    InvalidRegion {
        axis: Axis,
        offset: u32,
        size: u32,
        limit: u32,
    },
    /// Decimation collapses an output dimension to zero.
    DegenerateOutput {
        axis: Axis,
        extent: u32,
        factor: u32,
    },
    /// The incoming calibration's binning or ROI cannot describe the output
    /// in `u32` sensor units.
    InvalidCalibration {
        axis: Axis,
        binning: u32,
        roi_offset: u32,
    },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::InvalidRegion {
                axis,
                offset,
                size,
                limit,
            } => write!(
                f,
                "Invalid region: {} offset {} + size {} exceeds frame extent {}",
                axis, offset, size, limit
            ),
            TransformError::DegenerateOutput {
                axis,
                extent,
                factor,
            } => write!(
                f,
                "Degenerate output: {} extent {} decimated by {} leaves no pixels",
                axis, extent, factor
            ),
            TransformError::InvalidCalibration {
                axis,
                binning,
                roi_offset,
            } => write!(
                f,
                "Invalid calibration: {} binning {} with ROI offset {} overflows sensor coordinates",
                axis, binning, roi_offset
            ),
        }
    }
}

impl std::error::Error for TransformError {}

/// A resolved transform, in source pixel units unless noted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropPlan {
    pub x_offset: u32,
    pub y_offset: u32,
    /// Width of the resolved region before decimation.
    pub width: u32,
    /// Height of the resolved region before decimation.
    pub height: u32,
    pub decimation_x: u32,
    pub decimation_y: u32,
    /// Output width in output pixels.
    pub out_width: u32,
    /// Output height in output pixels.
    pub out_height: u32,
}

impl CropPlan {
    /// True if the plan reproduces the source frame exactly.
    pub fn is_noop(&self, src_width: u32, src_height: u32) -> bool {
        self.decimation_x == 1
            && self.decimation_y == 1
            && self.x_offset == 0
            && self.y_offset == 0
            && self.width == src_width
            && self.height == src_height
    }

    /// Source columns actually sampled, trimmed to a multiple of the factor.
    pub fn covered_width(&self) -> u32 {
        self.out_width * self.decimation_x
    }

    /// Source rows actually sampled, trimmed to a multiple of the factor.
    pub fn covered_height(&self) -> u32 {
        self.out_height * self.decimation_y
    }
}

/// Resolve `config` against a `src_width` x `src_height` frame.
pub fn build_plan(
    src_width: u32,
    src_height: u32,
    config: &TransformConfig,
) -> Result<CropPlan, TransformError> {
    let width = resolve_extent(Axis::Horizontal, config.x_offset, config.width, src_width)?;
    let height = resolve_extent(Axis::Vertical, config.y_offset, config.height, src_height)?;

    let decimation_x = config.factor_x();
    let decimation_y = config.factor_y();
    let out_width = decimated(Axis::Horizontal, width, decimation_x)?;
    let out_height = decimated(Axis::Vertical, height, decimation_y)?;

    Ok(CropPlan {
        x_offset: config.x_offset,
        y_offset: config.y_offset,
        width,
        height,
        decimation_x,
        decimation_y,
        out_width,
        out_height,
    })
}

fn resolve_extent(axis: Axis, offset: u32, requested: u32, limit: u32) -> Result<u32, TransformError> {
    let invalid = || TransformError::InvalidRegion {
        axis,
        offset,
        size: requested,
        limit,
    };
    if offset >= limit {
        return Err(invalid());
    }
    if requested == 0 {
        return Ok(limit - offset);
    }
    match offset.checked_add(requested) {
        Some(end) if end <= limit => Ok(requested),
        _ => Err(invalid()),
    }
}

fn decimated(axis: Axis, extent: u32, factor: u32) -> Result<u32, TransformError> {
    let out = extent / factor;
    if out == 0 {
        return Err(TransformError::DegenerateOutput {
            axis,
            extent,
            factor,
        });
    }
    Ok(out)
}
