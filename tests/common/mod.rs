//! Common test utilities for the delivery session tests
//!
//! Synchronous stand-ins for the session collaborators, so tests decide
//! exactly when frames, requests, subscriber changes and timer ticks happen.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use crop_decimate::{CameraInfo, ImageFrame, PixelEncoding};
use crop_decimate_node::processing::{CameraFrame, ImageRequest};
use crop_decimate_node::session::{
    CameraSink, CameraSource, DeliverySession, FrameCallback, RequestCallback, RequestSource,
    SubscriberCallback, UpstreamSubscription,
};
use crop_decimate_node::timer::{TickFn, TimerHandle, TimerService};

/// Test frame utilities
pub mod test_frames {
    use super::*;

    pub const VGA: (u32, u32) = (640, 480);

    /// BGR frame where pixel `(x, y)` is `[x % 256, y % 256, (x / 256) * 16 + y / 256]`.
    pub fn pattern_image(width: u32, height: u32) -> ImageFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[
                    (x % 256) as u8,
                    (y % 256) as u8,
                    ((x / 256) * 16 + y / 256) as u8,
                ]);
            }
        }
        ImageFrame::packed(data, width, height, PixelEncoding::Bgr8)
            .unwrap()
            .with_frame_id("test_optical")
    }

    pub fn camera_frame(width: u32, height: u32) -> CameraFrame {
        CameraFrame::new(
            pattern_image(width, height),
            CameraInfo::pinhole(width, height, 500.0, 500.0),
        )
    }

    pub fn vga_frame() -> CameraFrame {
        camera_frame(VGA.0, VGA.1)
    }

    /// `decimation=(2,2)`, `roi=(100,50,200,100)` with the given mode.
    pub fn roi_request(mode: u8) -> ImageRequest {
        ImageRequest::new(mode)
            .with_binning(2, 2)
            .with_roi(100, 50, 200, 100)
    }
}

/// Push channel standing in for a topic the session subscribes to.
pub struct ManualChannel<T> {
    inner: Arc<ChannelInner<T>>,
}

impl<T> Clone for ManualChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

type Callback<T> = Arc<Mutex<Box<dyn FnMut(T) + Send>>>;

struct ChannelInner<T> {
    name: String,
    subscriptions: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
    subscribe_calls: AtomicUsize,
    fail_subscribe: AtomicBool,
}

impl<T: Clone + Send + 'static> ManualChannel<T> {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.to_string(),
                subscriptions: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                subscribe_calls: AtomicUsize::new(0),
                fail_subscribe: AtomicBool::new(false),
            }),
        }
    }

    /// Deliver `msg` synchronously to every subscriber. Returns how many got it.
    pub fn push(&self, msg: T) -> usize {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in &callbacks {
            let mut callback = callback.lock().unwrap();
            (*callback)(msg.clone());
        }
        callbacks.len()
    }

    pub fn is_subscribed(&self) -> bool {
        !self.inner.subscriptions.lock().unwrap().is_empty()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    fn add(&self, callback: Box<dyn FnMut(T) + Send>) -> Result<Box<dyn UpstreamSubscription>> {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            bail!("{} refused the subscription", self.inner.name);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .push((id, Arc::new(Mutex::new(callback))));
        Ok(Box::new(ManualSubscription {
            id,
            inner: self.inner.clone(),
        }))
    }
}

struct ManualSubscription<T> {
    id: u64,
    inner: Arc<ChannelInner<T>>,
}

impl<T: Send> UpstreamSubscription for ManualSubscription<T> {
    fn shutdown(&mut self) {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != self.id);
    }
}

impl CameraSource for ManualChannel<CameraFrame> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn subscribe_frames(
        &self,
        _queue_size: usize,
        on_frame: FrameCallback,
    ) -> Result<Box<dyn UpstreamSubscription>> {
        self.add(on_frame)
    }
}

impl RequestSource for ManualChannel<ImageRequest> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn subscribe_requests(&self, on_request: RequestCallback) -> Result<Box<dyn UpstreamSubscription>> {
        self.add(on_request)
    }
}

/// Sink recording every published frame, with a settable subscriber count.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<SinkInner>,
}

#[derive(Default)]
struct SinkInner {
    published: Mutex<Vec<CameraFrame>>,
    subscribers: AtomicUsize,
    watchers: Mutex<Vec<Arc<dyn Fn(usize) + Send + Sync>>>,
    fail_publish: AtomicBool,
}

impl RecordingSink {
    pub fn with_subscribers(count: usize) -> Self {
        let sink = Self::default();
        sink.inner.subscribers.store(count, Ordering::SeqCst);
        sink
    }

    /// Change the subscriber count and notify watchers, like a topic would.
    pub fn set_subscribers(&self, count: usize) {
        self.inner.subscribers.store(count, Ordering::SeqCst);
        let watchers = self.inner.watchers.lock().unwrap().clone();
        for watcher in watchers {
            (*watcher)(count);
        }
    }

    pub fn published(&self) -> Vec<CameraFrame> {
        self.inner.published.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.inner.published.lock().unwrap().len()
    }

    pub fn fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }
}

impl CameraSink for RecordingSink {
    fn name(&self) -> &str {
        "recording_sink"
    }

    fn publish_frame(&self, frame: CameraFrame) -> Result<()> {
        if self.inner.fail_publish.load(Ordering::SeqCst) {
            bail!("sink closed");
        }
        self.inner.published.lock().unwrap().push(frame);
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load(Ordering::SeqCst)
    }

    fn watch_subscribers(&self, on_change: SubscriberCallback) {
        self.inner.watchers.lock().unwrap().push(Arc::from(on_change));
    }
}

/// Timer service whose ticks only happen when the test fires them.
#[derive(Clone, Default)]
pub struct ManualTimerService {
    timers: Arc<Mutex<Vec<ManualTimer>>>,
}

struct ManualTimer {
    period: Duration,
    tick: Arc<dyn Fn() + Send + Sync>,
    cancelled: Arc<AtomicBool>,
}

impl ManualTimerService {
    /// Periods of every timer ever armed, in arming order.
    pub fn armed_periods(&self) -> Vec<Duration> {
        self.timers.lock().unwrap().iter().map(|t| t.period).collect()
    }

    pub fn active_periods(&self) -> Vec<Duration> {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .map(|t| t.period)
            .collect()
    }

    /// Fire every armed, uncancelled timer once.
    pub fn fire(&self) -> usize {
        self.fire_where(false)
    }

    /// Fire cancelled timers, as if their tick raced the cancellation.
    pub fn fire_cancelled(&self) -> usize {
        self.fire_where(true)
    }

    fn fire_where(&self, cancelled: bool) -> usize {
        let ticks: Vec<Arc<dyn Fn() + Send + Sync>> = self
            .timers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.cancelled.load(Ordering::SeqCst) == cancelled)
            .map(|t| t.tick.clone())
            .collect();
        for tick in &ticks {
            (**tick)();
        }
        ticks.len()
    }
}

impl TimerService for ManualTimerService {
    fn arm(&self, period: Duration, tick: TickFn) -> Result<Box<dyn TimerHandle>> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().unwrap().push(ManualTimer {
            period,
            tick: Arc::from(tick),
            cancelled: cancelled.clone(),
        });
        Ok(Box::new(ManualHandle { cancelled }))
    }
}

struct ManualHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualHandle {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A session wired to manual collaborators.
pub struct Harness {
    pub session: DeliverySession,
    pub camera: ManualChannel<CameraFrame>,
    pub requests: ManualChannel<ImageRequest>,
    pub sink: RecordingSink,
    pub timers: ManualTimerService,
}

impl Harness {
    /// One downstream subscriber, 100 Hz ceiling.
    pub fn new() -> Self {
        Self::with(1, 100.0)
    }

    pub fn with(subscribers: usize, max_rate_hz: f64) -> Self {
        let camera = ManualChannel::new("camera/image_raw");
        let requests = ManualChannel::new("camera_out/image_request");
        let sink = RecordingSink::with_subscribers(subscribers);
        let timers = ManualTimerService::default();
        let session = DeliverySession::builder()
            .with_camera_source(camera.clone())
            .with_camera_sink(sink.clone())
            .with_request_source(requests.clone())
            .with_timer_service(timers.clone())
            .with_max_rate(max_rate_hz)
            .build()
            .unwrap();
        Self {
            session,
            camera,
            requests,
            sink,
            timers,
        }
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
