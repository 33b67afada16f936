//! # Error Handling
//!
//! Error types for the delivery node, with classification traits so the
//! session can decide how loudly to report a failure without ever treating it
//! as fatal.
//!
//! ## Architecture
//!
//! - **Error Types**: one [`RelayError`] variant per failure source, each
//!   carrying an [`ErrorContext`]
//! - **Severity**: [`HasSeverity`] picks the log level the session reports
//!   an error at
//!
//! Nothing is retried: a failed trigger is reported and skipped, and the next
//! natural trigger tries again.
//!
//! ## Severity Defaults
//!
//! | Variant | Severity |
//! |---------|----------|
//! | `Config` | Critical |
//! | `Transform` | Warning |
//! | `Frame` | Warning |
//! | `NoDataYet` | Debug |
//! | `Subscription` | Error |
//! | `Publish` | Error |
//! | `Timer` | Error |
//! | `Io` | Error |
//!
//! ## Usage
//!
//! ```rust
//! use crop_decimate_node::error::{ErrorSeverity, HasSeverity, RelayError};
//!
//! let error = RelayError::subscription("camera/image_raw", "thread spawn failed")
//!     .with_operation("activating upstream");
//!
//! assert_eq!(error.severity(), ErrorSeverity::Error);
//! assert_eq!(
//!     error.to_string(),
//!     "Subscription to 'camera/image_raw' failed: thread spawn failed (while activating upstream)"
//! );
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

use crop_decimate::{FrameError, TransformError};

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected conditions that only matter when debugging
    Debug,
    Info,
    /// A cycle was skipped, the next trigger may succeed
    Warning,
    /// A collaborator failed
    Error,
    /// The node cannot run as configured
    Critical,
}

/// Metadata attached to every error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    pub severity: ErrorSeverity,
}

impl ErrorContext {
    pub fn new(severity: ErrorSeverity) -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            severity,
        }
    }
}

/// Base error type for the delivery node
#[derive(Debug)]
pub enum RelayError {
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// The crop/decimate engine rejected the active request
    Transform {
        source: TransformError,
        context: ErrorContext,
    },
    /// A frame buffer did not match its declared layout
    Frame {
        source: FrameError,
        context: ErrorContext,
    },
    /// A trigger fired before any frame was cached
    NoDataYet {
        trigger: String,
        context: ErrorContext,
    },
    /// Subscribing to a topic failed
    Subscription {
        topic: String,
        reason: String,
        context: ErrorContext,
    },
    /// Handing a frame to the downstream sink failed
    Publish {
        topic: String,
        reason: String,
        context: ErrorContext,
    },
    /// Arming the periodic timer failed
    Timer {
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
}

impl RelayError {
    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Critical),
        }
    }

    pub fn transform(source: TransformError) -> Self {
        Self::Transform {
            source,
            context: ErrorContext::new(ErrorSeverity::Warning),
        }
    }

    /// Create a no-data error for the named trigger (`request`, `timer`, ...)
    pub fn no_data_yet(trigger: impl Into<String>) -> Self {
        Self::NoDataYet {
            trigger: trigger.into(),
            context: ErrorContext::new(ErrorSeverity::Debug),
        }
    }

    pub fn subscription(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Error),
        }
    }

    pub fn publish(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Error),
        }
    }

    pub fn timer(reason: impl Into<String>) -> Self {
        Self::Timer {
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Error),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(ErrorSeverity::Error),
        }
    }

    /// Attach the path an I/O error refers to. No effect on other variants.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if let Self::Io { path: slot, .. } = &mut self {
            *slot = Some(path.into());
        }
        self
    }

    /// Set the operation that was being performed
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. }
            | Self::Transform { context, .. }
            | Self::Frame { context, .. }
            | Self::NoDataYet { context, .. }
            | Self::Subscription { context, .. }
            | Self::Publish { context, .. }
            | Self::Timer { context, .. }
            | Self::Io { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. }
            | Self::Transform { context, .. }
            | Self::Frame { context, .. }
            | Self::NoDataYet { context, .. }
            | Self::Subscription { context, .. }
            | Self::Publish { context, .. }
            | Self::Timer { context, .. }
            | Self::Io { context, .. } => context,
        }
    }

    /// Short, stable name of the error kind, used as a log field
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Transform { .. } => "transform",
            Self::Frame { .. } => "frame",
            Self::NoDataYet { .. } => "no_data_yet",
            Self::Subscription { .. } => "subscription",
            Self::Publish { .. } => "publish",
            Self::Timer { .. } => "timer",
            Self::Io { .. } => "io",
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config {
                field,
                value,
                reason,
                ..
            } => write!(f, "Configuration error in field '{}' (value: '{}'): {}", field, value, reason)?,
            Self::Transform { source, .. } => write!(f, "Transform failed: {}", source)?,
            Self::Frame { source, .. } => write!(f, "Malformed frame: {}", source)?,
            Self::NoDataYet { trigger, .. } => {
                write!(f, "No frame received yet, {} trigger skipped", trigger)?
            }
            Self::Subscription { topic, reason, .. } => {
                write!(f, "Subscription to '{}' failed: {}", topic, reason)?
            }
            Self::Publish { topic, reason, .. } => {
                write!(f, "Publishing on '{}' failed: {}", topic, reason)?
            }
            Self::Timer { reason, .. } => write!(f, "Timer error: {}", reason)?,
            Self::Io {
                operation,
                path,
                source,
                ..
            } => {
                write!(f, "I/O error during '{}'", operation)?;
                if let Some(path) = path {
                    write!(f, " on '{}'", path)?;
                }
                write!(f, ": {}", source)?;
            }
        }

        let context = self.context();
        if let Some(operation) = &context.operation {
            write!(f, " (while {})", operation)?;
        }
        Ok(())
    }
}

impl StdError for RelayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transform { source, .. } => Some(source),
            Self::Frame { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type RelayResult<T> = Result<T, RelayError>;

/// Trait for errors with severity levels
pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for RelayError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

impl From<TransformError> for RelayError {
    fn from(error: TransformError) -> Self {
        Self::transform(error)
    }
}

impl From<FrameError> for RelayError {
    fn from(source: FrameError) -> Self {
        Self::Frame {
            source,
            context: ErrorContext::new(ErrorSeverity::Warning),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        Self::config("json", format!("line {}", error.line()), error.to_string())
    }
}
