//! # Processing Module
//!
//! Message types flowing through the delivery session: camera frame pairs and
//! client requests.

pub mod camera;
pub mod request;

// Re-export commonly used types for convenience
pub use camera::CameraFrame;
pub use request::{DeliveryMode, DeliveryRequest, ImageRequest, effective_period, effective_rate};
