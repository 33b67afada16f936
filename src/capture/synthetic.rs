// # Synthetic Camera
//
// Test-pattern camera used by the CLI demo and tests. Publishes frames paired
// with an ideal pinhole calibration, the way a camera driver would.

use std::time::Duration;

use camera_relay::Topic;
use crop_decimate::{CameraInfo, ImageFrame, PixelEncoding};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{RelayError, RelayResult};
use crate::processing::CameraFrame;

/// A camera producing a moving BGR gradient.
///
/// Pixel `(x, y)` of frame `n` is `[(x + n) % 256, y % 256, (x ^ y) % 256]`,
/// so every output pixel can be traced back to its source position.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_id: String,
    info: CameraInfo,
    sequence: u64,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        // ~64 degree horizontal field of view
        let focal = width as f64 * 0.8;
        Self {
            width,
            height,
            frame_id: "synthetic_camera_optical".to_string(),
            info: CameraInfo::pinhole(width, height, focal, focal),
            sequence: 0,
        }
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    pub fn calibration(&self) -> &CameraInfo {
        &self.info
    }

    /// Frames produced so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Render the next frame, stamped with `pts_ns`.
    pub fn next_frame(&mut self, pts_ns: u64) -> RelayResult<CameraFrame> {
        let shift = self.sequence;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                data.extend_from_slice(&[
                    ((x as u64 + shift) % 256) as u8,
                    (y % 256) as u8,
                    ((x ^ y) % 256) as u8,
                ]);
            }
        }
        let image = ImageFrame::packed(data, self.width, self.height, PixelEncoding::Bgr8)?
            .with_frame_id(self.frame_id.clone())
            .with_pts_ns(pts_ns);
        self.sequence += 1;
        Ok(CameraFrame::new(image, self.info.clone()))
    }

    /// Publish frames on `topic` at `fps` until the task is dropped.
    pub async fn run(mut self, topic: Topic<CameraFrame>, fps: u32) -> RelayResult<()> {
        if fps == 0 {
            return Err(RelayError::config("fps", "0", "must be greater than 0"));
        }
        let period = Duration::from_secs(1) / fps;
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            topic = topic.name(),
            width = self.width,
            height = self.height,
            fps,
            "synthetic camera started"
        );

        loop {
            interval.tick().await;
            let pts_ns = self.sequence * period.as_nanos() as u64;
            let frame = self.next_frame(pts_ns)?;
            let delivered = topic.publish(frame);
            debug!(sequence = self.sequence, delivered, "camera frame published");
        }
    }
}
