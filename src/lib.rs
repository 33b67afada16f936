//! # Crop/Decimate Delivery Node
//!
//! On-demand region-of-interest cropping and decimation for camera streams.
//! Clients publish a request describing a region, a decimation factor and a
//! delivery mode; the node applies it to incoming frames and republishes the
//! result together with a rescaled calibration.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `session`: the request-driven delivery coordinator and its collaborator traits
//! - `processing`: request and camera-frame message types
//! - `relay`: collaborator traits implemented on in-process topics
//! - `timer`: periodic timers for rate-limited delivery
//! - `config`: node configuration and validation
//! - `capture`: synthetic camera source
//! - `snapshot`: PNG output of delivered frames
//! - `error`: error types and classification
//!
//! The stateless transform itself lives in the `crop_decimate` crate, the
//! topic transport in `camera_relay`.
//!
//! ## Delivery Modes
//!
//! - **Once**: answer the request with one frame
//! - **Rate-limited**: republish the latest frame on a timer, capped by
//!   `max_video_framerate`
//! - **Free-run**: republish every incoming frame
//!
//! ## Example
//!
//! ```rust,no_run
//! use camera_relay::Topic;
//! use crop_decimate_node::processing::{CameraFrame, ImageRequest};
//! use crop_decimate_node::session::DeliverySession;
//! use crop_decimate_node::timer::TokioTimerService;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let camera = Topic::<CameraFrame>::new("camera/image_raw");
//! let output = Topic::<CameraFrame>::new("camera_out/image_raw");
//! let requests = Topic::<ImageRequest>::new("camera_out/image_request");
//!
//! let session = DeliverySession::builder()
//!     .with_camera_source(camera.clone())
//!     .with_camera_sink(output.clone())
//!     .with_request_source(requests.clone())
//!     .with_timer_service(TokioTimerService::current()?)
//!     .build()?;
//!
//! let _viewer = output.subscribe(5, |frame: CameraFrame| {
//!     println!("{}x{}", frame.image.width(), frame.image.height());
//! })?;
//!
//! requests.publish(
//!     ImageRequest::new(ImageRequest::PUBLISH_FREQ)
//!         .with_binning(2, 2)
//!         .with_roi(100, 50, 200, 100)
//!         .with_frequency(30.0),
//! );
//! # drop(session);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod processing;
pub mod relay;
pub mod session;
pub mod snapshot;
pub mod telemetry;
pub mod timer;

/// Re-export error types for convenience
pub use error::{ErrorSeverity, HasSeverity, RelayError, RelayResult};

pub use config::NodeConfig;
pub use processing::{CameraFrame, DeliveryMode, DeliveryRequest, ImageRequest};
pub use session::{DeliverySession, DeliverySessionBuilder, DeliveryState, SessionStats};
