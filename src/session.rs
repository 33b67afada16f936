//! # Delivery Session
//!
//! Request-driven coordinator between an upstream camera, clients sending
//! crop/decimate requests and downstream consumers.
//!
//! ## Architecture
//!
//! 1. **Collaborator Traits**: [`CameraSource`], [`RequestSource`],
//!    [`CameraSink`] and [`TimerService`] are injected, so the session runs
//!    against in-process topics, test doubles or any other transport
//! 2. **DeliverySession**: owns the cached frame, the active request, the
//!    timer and the upstream subscription behind one mutex
//! 3. **DeliverySessionBuilder**: fluent construction and wiring
//!
//! ## Triggers
//!
//! | Trigger | Effect |
//! |---------|--------|
//! | frame | replace the cache; publish if free-running |
//! | request | replace the active request, publish once, (re)arm the timer |
//! | timer tick | publish if still rate-limited |
//! | subscriber change | (un)subscribe upstream on 0 ↔ ≥1 transitions |
//!
//! Every trigger runs to completion while holding the session lock, including
//! the transform and the publish it causes, so publishes never overtake the
//! trigger that produced them.
//!
//! ## Lazy Upstream
//!
//! The upstream camera is only subscribed while at least one downstream
//! subscriber exists. No trigger publishes while it is deactivated.
//!
//! ## Timer Replacement
//!
//! Each request bumps a generation number and cancels the armed timer. Ticks
//! carry the generation they were armed with and are ignored once it is
//! stale, so a tick racing a replacement can never publish twice.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::{ErrorSeverity, HasSeverity, RelayError, RelayResult};
use crate::processing::{
    CameraFrame, DeliveryMode, DeliveryRequest, ImageRequest, effective_period, effective_rate,
};
use crate::timer::{TimerHandle, TimerService};

pub type FrameCallback = Box<dyn FnMut(CameraFrame) + Send>;
pub type RequestCallback = Box<dyn FnMut(ImageRequest) + Send>;
pub type SubscriberCallback = Box<dyn Fn(usize) + Send + Sync>;

/// A live subscription the session can stop.
pub trait UpstreamSubscription: Send {
    fn shutdown(&mut self);
}

/// Upstream camera the session subscribes to on demand.
pub trait CameraSource: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver frames to `on_frame`, queueing at most `queue_size`.
    fn subscribe_frames(
        &self,
        queue_size: usize,
        on_frame: FrameCallback,
    ) -> Result<Box<dyn UpstreamSubscription>>;
}

/// Channel the session receives requests on. Kept subscribed for the whole
/// session lifetime.
pub trait RequestSource: Send + Sync {
    fn name(&self) -> &str;

    fn subscribe_requests(&self, on_request: RequestCallback)
    -> Result<Box<dyn UpstreamSubscription>>;
}

/// Downstream destination of transformed frames.
pub trait CameraSink: Send + Sync {
    fn name(&self) -> &str;

    fn publish_frame(&self, frame: CameraFrame) -> Result<()>;

    fn subscriber_count(&self) -> usize;

    /// Call `on_change` whenever downstream subscribers connect or disconnect.
    fn watch_subscribers(&self, on_change: SubscriberCallback);
}

/// Coarse session state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeliveryState {
    /// No request received yet. Frames are cached, never published.
    Idle,
    Active(DeliveryMode),
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Idle => f.write_str("idle"),
            DeliveryState::Active(mode) => write!(f, "active ({})", mode),
        }
    }
}

/// Counters kept over the session lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_received: u64,
    pub requests_received: u64,
    pub published: u64,
    pub transform_failures: u64,
    pub publish_failures: u64,
    /// Triggers that found no cached frame.
    pub skipped_no_data: u64,
    pub upstream_activations: u64,
}

#[derive(Clone, Copy, Debug)]
enum Trigger {
    Request,
    Frame,
    Timer,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Request => "request",
            Trigger::Frame => "frame",
            Trigger::Timer => "timer",
        }
    }
}

#[derive(Default)]
struct SessionState {
    cache: Option<CameraFrame>,
    active: Option<DeliveryRequest>,
    timer: Option<Box<dyn TimerHandle>>,
    timer_generation: u64,
    upstream: Option<Box<dyn UpstreamSubscription>>,
    requests: Option<Box<dyn UpstreamSubscription>>,
    stats: SessionStats,
    shut_down: bool,
}

struct Shared {
    state: Mutex<SessionState>,
    source: Arc<dyn CameraSource>,
    sink: Arc<dyn CameraSink>,
    requests: Arc<dyn RequestSource>,
    timers: Arc<dyn TimerService>,
    queue_size: usize,
    max_rate_hz: f64,
}

/// The delivery coordinator. Dropping it shuts it down.
pub struct DeliverySession {
    shared: Arc<Shared>,
}

impl DeliverySession {
    /// Create a new session using the builder pattern.
    pub fn builder() -> DeliverySessionBuilder {
        DeliverySessionBuilder::new()
    }

    pub fn status(&self) -> DeliveryState {
        match self.shared.lock().active {
            Some(request) => DeliveryState::Active(request.mode),
            None => DeliveryState::Idle,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.lock().stats
    }

    pub fn active_request(&self) -> Option<DeliveryRequest> {
        self.shared.lock().active
    }

    /// True while the upstream camera subscription exists.
    pub fn is_upstream_active(&self) -> bool {
        self.shared.lock().upstream.is_some()
    }

    pub fn has_cached_frame(&self) -> bool {
        self.shared.lock().cache.is_some()
    }

    /// Rate ceiling applied to rate-limited requests, in Hz.
    pub fn max_rate_hz(&self) -> f64 {
        self.shared.max_rate_hz
    }

    /// Cancel the timer and drop both subscriptions. Idempotent.
    pub fn shutdown(&self) {
        let (timer, upstream, requests) = {
            let mut state = self.shared.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            (state.timer.take(), state.upstream.take(), state.requests.take())
        };
        if let Some(mut timer) = timer {
            timer.cancel();
        }
        if let Some(mut upstream) = upstream {
            upstream.shutdown();
        }
        if let Some(mut requests) = requests {
            requests.shutdown();
        }
        info!(output = self.shared.sink.name(), "delivery session shut down");
    }
}

impl Drop for DeliverySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_frame(&self, frame: CameraFrame) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        if state.upstream.is_none() {
            trace!("frame arrived after upstream deactivation; dropped");
            return;
        }
        state.stats.frames_received += 1;
        state.cache = Some(frame);

        match state.active.map(|request| request.mode) {
            Some(DeliveryMode::FreeRun) => self.deliver(&mut state, Trigger::Frame),
            Some(DeliveryMode::Once) | Some(DeliveryMode::RateLimited { .. }) | None => {}
        }
    }

    fn on_request(self: &Arc<Self>, message: ImageRequest) {
        let request = DeliveryRequest::from(&message);
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        state.stats.requests_received += 1;
        info!(
            mode = %request.mode,
            decimation_x = request.config.decimation_x,
            decimation_y = request.config.decimation_y,
            x_offset = request.config.x_offset,
            y_offset = request.config.y_offset,
            width = request.config.width,
            height = request.config.height,
            "image request received"
        );

        if let Some(mut timer) = state.timer.take() {
            timer.cancel();
        }
        state.timer_generation += 1;
        state.active = Some(request);

        self.deliver(&mut state, Trigger::Request);

        match request.mode {
            DeliveryMode::RateLimited { hz } => self.arm_timer(&mut state, hz),
            DeliveryMode::Once | DeliveryMode::FreeRun => {}
        }
    }

    fn arm_timer(self: &Arc<Self>, state: &mut SessionState, requested_hz: f64) {
        let Some(period) = effective_period(requested_hz, self.max_rate_hz) else {
            debug!(requested_hz, "no periodic delivery for this rate; request latched");
            return;
        };

        let generation = state.timer_generation;
        let weak: Weak<Shared> = Arc::downgrade(self);
        let tick = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_timer(generation);
            }
        });

        match self.timers.arm(period, tick) {
            Ok(timer) => {
                debug!(
                    hz = effective_rate(requested_hz, self.max_rate_hz).unwrap_or_default(),
                    period_us = period.as_micros() as u64,
                    generation,
                    "publish timer armed"
                );
                state.timer = Some(timer);
            }
            Err(err) => report(&RelayError::timer(format!("{:#}", err))),
        }
    }

    fn on_timer(&self, generation: u64) {
        let mut state = self.lock();
        if state.shut_down || generation != state.timer_generation {
            trace!(generation, "stale timer tick ignored");
            return;
        }
        match state.active.map(|request| request.mode) {
            Some(DeliveryMode::RateLimited { .. }) => self.deliver(&mut state, Trigger::Timer),
            Some(DeliveryMode::Once) | Some(DeliveryMode::FreeRun) | None => {
                trace!("timer tick outside rate-limited mode ignored");
            }
        }
    }

    fn on_subscriber_change(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        self.update_upstream(&mut state);
    }

    /// Match the upstream subscription to the current downstream count.
    fn update_upstream(self: &Arc<Self>, state: &mut SessionState) {
        let subscribers = self.sink.subscriber_count();
        match (subscribers, state.upstream.is_some()) {
            (0, true) => {
                if let Some(mut upstream) = state.upstream.take() {
                    upstream.shutdown();
                }
                info!(input = self.source.name(), "unsubscribed from camera");
            }
            (n, false) if n > 0 => {
                let weak: Weak<Shared> = Arc::downgrade(self);
                let on_frame: FrameCallback = Box::new(move |frame| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_frame(frame);
                    }
                });
                match self.source.subscribe_frames(self.queue_size, on_frame) {
                    Ok(upstream) => {
                        state.upstream = Some(upstream);
                        state.stats.upstream_activations += 1;
                        info!(input = self.source.name(), subscribers = n, "subscribed to camera");
                    }
                    Err(err) => {
                        report(&RelayError::subscription(self.source.name(), format!("{:#}", err)))
                    }
                }
            }
            _ => {}
        }
    }

    /// Transform the cached pair with the active request and publish it.
    fn deliver(&self, state: &mut SessionState, trigger: Trigger) {
        if state.upstream.is_none() {
            debug!(trigger = trigger.as_str(), "no downstream subscribers; delivery skipped");
            return;
        }
        let Some(request) = state.active else {
            return;
        };
        let Some(cached) = state.cache.as_ref() else {
            state.stats.skipped_no_data += 1;
            report(&RelayError::no_data_yet(trigger.as_str()));
            return;
        };

        let output = match cached.transformed(&request.config) {
            Ok(output) => output,
            Err(err) => {
                state.stats.transform_failures += 1;
                report(&RelayError::from(err).with_operation(format!("{} delivery", trigger.as_str())));
                return;
            }
        };

        let (width, height) = (output.image.width(), output.image.height());
        match self.sink.publish_frame(output) {
            Ok(()) => {
                state.stats.published += 1;
                trace!(trigger = trigger.as_str(), width, height, "frame published");
            }
            Err(err) => {
                state.stats.publish_failures += 1;
                report(&RelayError::publish(self.sink.name(), format!("{:#}", err)));
            }
        }
    }
}

fn report(err: &RelayError) {
    let category = err.category();
    match err.severity() {
        ErrorSeverity::Debug => debug!(category, "{}", err),
        ErrorSeverity::Info => info!(category, "{}", err),
        ErrorSeverity::Warning => warn!(category, "{}", err),
        ErrorSeverity::Error | ErrorSeverity::Critical => error!(category, "{}", err),
    }
}

/// Builder for creating delivery sessions with fluent API.
pub struct DeliverySessionBuilder {
    source: Option<Arc<dyn CameraSource>>,
    sink: Option<Arc<dyn CameraSink>>,
    requests: Option<Arc<dyn RequestSource>>,
    timers: Option<Arc<dyn TimerService>>,
    queue_size: usize,
    max_rate_hz: f64,
}

impl DeliverySessionBuilder {
    pub fn new() -> Self {
        let defaults = NodeConfig::default();
        Self {
            source: None,
            sink: None,
            requests: None,
            timers: None,
            queue_size: defaults.queue_size,
            max_rate_hz: defaults.max_video_framerate,
        }
    }

    /// Take the queue depth and rate ceiling from `config`.
    pub fn with_config(mut self, config: &NodeConfig) -> Self {
        self.queue_size = config.queue_size;
        self.max_rate_hz = config.max_video_framerate;
        self
    }

    pub fn with_camera_source<S: CameraSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn with_camera_sink<S: CameraSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn with_request_source<S: RequestSource + 'static>(mut self, requests: S) -> Self {
        self.requests = Some(Arc::new(requests));
        self
    }

    pub fn with_timer_service<T: TimerService + 'static>(mut self, timers: T) -> Self {
        self.timers = Some(Arc::new(timers));
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_max_rate(mut self, hz: f64) -> Self {
        self.max_rate_hz = hz;
        self
    }

    /// Wire the session: subscribe to requests, watch downstream subscribers
    /// and activate upstream if anyone is already listening.
    pub fn build(self) -> RelayResult<DeliverySession> {
        let source = self
            .source
            .ok_or_else(|| RelayError::config("camera_source", "none", "No camera source specified"))?;
        let sink = self
            .sink
            .ok_or_else(|| RelayError::config("camera_sink", "none", "No camera sink specified"))?;
        let requests = self
            .requests
            .ok_or_else(|| RelayError::config("request_source", "none", "No request source specified"))?;
        let timers = self
            .timers
            .ok_or_else(|| RelayError::config("timer_service", "none", "No timer service specified"))?;
        if self.queue_size == 0 {
            return Err(RelayError::config("queue_size", "0", "must be greater than 0"));
        }
        if !self.max_rate_hz.is_finite() || self.max_rate_hz <= 0.0 {
            return Err(RelayError::config(
                "max_video_framerate",
                self.max_rate_hz.to_string(),
                "must be a positive number",
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::default()),
            source,
            sink,
            requests,
            timers,
            queue_size: self.queue_size,
            max_rate_hz: self.max_rate_hz,
        });

        let weak = Arc::downgrade(&shared);
        let request_subscription = shared
            .requests
            .subscribe_requests(Box::new(move |request| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_request(request);
                }
            }))
            .map_err(|err| RelayError::subscription(shared.requests.name(), format!("{:#}", err)))?;

        {
            let mut state = shared.lock();
            state.requests = Some(request_subscription);

            let weak = Arc::downgrade(&shared);
            shared.sink.watch_subscribers(Box::new(move |_count| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_subscriber_change();
                }
            }));
            shared.update_upstream(&mut state);
        }

        info!(
            input = shared.source.name(),
            output = shared.sink.name(),
            requests = shared.requests.name(),
            queue_size = shared.queue_size,
            max_rate_hz = shared.max_rate_hz,
            "delivery session started"
        );
        Ok(DeliverySession { shared })
    }
}

impl Default for DeliverySessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
