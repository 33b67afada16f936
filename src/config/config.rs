//! # Node Configuration
//!
//! Read-only inputs of the delivery node: topic names, the upstream queue
//! depth and the ceiling on the periodic publish rate.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Default | Description |
//! |-----------|------|---------|-------------|
//! | `queue_size` | `usize` | 5 | Upstream frame queue depth |
//! | `max_video_framerate` | `f64` | 100.0 | Ceiling for rate-limited delivery, in Hz |
//! | `input_topic` | `String` | `camera/image_raw` | Upstream camera topic |
//! | `output_topic` | `String` | `camera_out/image_raw` | Downstream camera topic |
//! | `request_topic` | `String` | `camera_out/image_request` | Request topic |
//!
//! Values are loaded from JSON; missing keys keep their defaults. The CLI
//! overrides individual fields after loading.
//!
//! ## Examples
//!
//! ```rust
//! use crop_decimate_node::config::NodeConfig;
//!
//! let config = NodeConfig::from_json_str(r#"{ "max_video_framerate": 30.0 }"#)?;
//! assert_eq!(config.queue_size, 5);
//! assert_eq!(config.max_video_framerate, 30.0);
//! assert!(config.validate().is_ok());
//! # Ok::<(), crop_decimate_node::error::RelayError>(())
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Configuration of one delivery node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Depth of the upstream frame queue.
    ///
    /// Frames arriving while the queue is full are dropped. Must be greater
    /// than 0.
    pub queue_size: usize,

    /// Hard ceiling on the rate-limited publish frequency, in Hz.
    ///
    /// Requests asking for more are clamped to this value. Must be a positive,
    /// finite number.
    pub max_video_framerate: f64,

    pub input_topic: String,
    pub output_topic: String,
    pub request_topic: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            queue_size: 5,
            max_video_framerate: 100.0,
            input_topic: "camera/image_raw".to_string(),
            output_topic: "camera_out/image_raw".to_string(),
            request_topic: "camera_out/image_request".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            RelayError::io("reading configuration", err).with_path(path.display().to_string())
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> RelayResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> RelayResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_size == 0 {
            return Err("Queue size must be greater than 0".to_string());
        }
        if !self.max_video_framerate.is_finite() || self.max_video_framerate <= 0.0 {
            return Err(format!(
                "Maximum video framerate must be a positive number, got {}",
                self.max_video_framerate
            ));
        }
        for (name, topic) in [
            ("input_topic", &self.input_topic),
            ("output_topic", &self.output_topic),
            ("request_topic", &self.request_topic),
        ] {
            if topic.trim().is_empty() {
                return Err(format!("Topic name '{}' must not be empty", name));
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) mapped into a [`RelayError`].
    pub fn check(&self) -> RelayResult<()> {
        self.validate()
            .map_err(|reason| RelayError::config("node", format!("{:?}", self), reason))
    }
}
