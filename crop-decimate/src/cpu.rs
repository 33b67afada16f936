// SPDX-License-Identifier: MIT
// CPU crop + point-sampling kernel.
// Any encoding in, same encoding out, tightly packed rows.

use crate::frame::ImageFrame;
use crate::plan::CropPlan;

/// Copy the pixels selected by `plan` out of `src`.
///
/// Output pixel `(i, j)` is source pixel
/// `(x_offset + i * decimation_x, y_offset + j * decimation_y)`. No pixel is
/// blended or interpolated. The plan must have been built against `src`.
pub fn crop_decimate_pixels(src: &ImageFrame, plan: &CropPlan) -> Vec<u8> {
    let bpp = src.encoding().bytes_per_pixel();
    let out_row_bytes = plan.out_width as usize * bpp;
    let mut out = Vec::with_capacity(out_row_bytes * plan.out_height as usize);

    for j in 0..plan.out_height {
        let row = src.row(plan.y_offset + j * plan.decimation_y);
        let row = &row[plan.x_offset as usize * bpp..];
        if plan.decimation_x == 1 {
            out.extend_from_slice(&row[..out_row_bytes]);
        } else {
            sample_row(row, bpp, plan.decimation_x as usize * bpp, plan.out_width as usize, &mut out);
        }
    }

    out
}

#[inline]
fn sample_row(row: &[u8], bpp: usize, pitch: usize, count: usize, out: &mut Vec<u8>) {
    for i in 0..count {
        let s = i * pitch;
        out.extend_from_slice(&row[s..s + bpp]);
    }
}
