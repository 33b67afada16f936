//! # Delivery Requests
//!
//! The request message clients publish, and its decoded form.
//!
//! ## Wire Mode Byte
//!
//! | Constant | Value | Decoded mode |
//! |----------|-------|--------------|
//! | `ONCE` | 0 | [`DeliveryMode::Once`] |
//! | `PUBLISH_FREQ` | 1 | [`DeliveryMode::RateLimited`] |
//! | `ALL` | 2 | [`DeliveryMode::FreeRun`] |
//! | anything else | | [`DeliveryMode::FreeRun`] |

use std::fmt;
use std::time::Duration;

use crop_decimate::{RegionOfInterest, TransformConfig};
use serde::{Deserialize, Serialize};

/// Request message as published on the request topic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRequest {
    pub binning_x: u32,
    pub binning_y: u32,
    pub roi: RegionOfInterest,
    pub mode: u8,
    /// Desired rate in Hz, only read for `PUBLISH_FREQ`.
    pub publish_frequency: f32,
}

impl ImageRequest {
    pub const ONCE: u8 = 0;
    pub const PUBLISH_FREQ: u8 = 1;
    pub const ALL: u8 = 2;

    pub fn new(mode: u8) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_binning(mut self, binning_x: u32, binning_y: u32) -> Self {
        self.binning_x = binning_x;
        self.binning_y = binning_y;
        self
    }

    pub fn with_roi(mut self, x_offset: u32, y_offset: u32, width: u32, height: u32) -> Self {
        self.roi = RegionOfInterest {
            x_offset,
            y_offset,
            width,
            height,
            do_rectify: false,
        };
        self
    }

    pub fn with_frequency(mut self, hz: f32) -> Self {
        self.publish_frequency = hz;
        self
    }
}

/// How the session reacts to triggers once a request is active.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeliveryMode {
    /// Answer the request, then stay silent.
    Once,
    /// Publish the latest frame on a timer.
    RateLimited { hz: f64 },
    /// Publish on every frame arrival.
    FreeRun,
}

impl DeliveryMode {
    /// Decode the wire mode byte. Unknown values fall back to free-run.
    pub fn from_wire(mode: u8, publish_frequency: f32) -> Self {
        match mode {
            ImageRequest::ONCE => DeliveryMode::Once,
            ImageRequest::PUBLISH_FREQ => DeliveryMode::RateLimited {
                hz: publish_frequency as f64,
            },
            _ => DeliveryMode::FreeRun,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryMode::Once => "once",
            DeliveryMode::RateLimited { .. } => "rate-limited",
            DeliveryMode::FreeRun => "free-run",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::RateLimited { hz } => write!(f, "rate-limited@{}Hz", hz),
            other => f.write_str(other.label()),
        }
    }
}

/// A decoded request: what to cut, and when to deliver it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeliveryRequest {
    pub config: TransformConfig,
    pub mode: DeliveryMode,
}

impl From<&ImageRequest> for DeliveryRequest {
    fn from(request: &ImageRequest) -> Self {
        Self {
            config: TransformConfig {
                decimation_x: request.binning_x,
                decimation_y: request.binning_y,
                x_offset: request.roi.x_offset,
                y_offset: request.roi.y_offset,
                width: request.roi.width,
                height: request.roi.height,
            },
            mode: DeliveryMode::from_wire(request.mode, request.publish_frequency),
        }
    }
}

impl From<ImageRequest> for DeliveryRequest {
    fn from(request: ImageRequest) -> Self {
        Self::from(&request)
    }
}

/// `min(requested, ceiling)`, or `None` when the request asks for no
/// periodic delivery (non-positive or NaN).
pub fn effective_rate(requested_hz: f64, ceiling_hz: f64) -> Option<f64> {
    if requested_hz.is_nan() || requested_hz <= 0.0 {
        return None;
    }
    Some(requested_hz.min(ceiling_hz))
}

/// Timer period for [`effective_rate`]. `None` when no timer should run or
/// the rate cannot be expressed as a non-zero [`Duration`].
pub fn effective_period(requested_hz: f64, ceiling_hz: f64) -> Option<Duration> {
    let hz = effective_rate(requested_hz, ceiling_hz)?;
    Duration::try_from_secs_f64(1.0 / hz)
        .ok()
        .filter(|period| !period.is_zero())
}
