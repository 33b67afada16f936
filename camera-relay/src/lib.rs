// SPDX-License-Identifier: MIT
//! # In-Process Topic Relay for Camera Frames
//!
//! This crate provides a small, thread-based publish/subscribe transport used
//! to wire a camera, the crop/decimate session and downstream consumers
//! together inside one process.
//!
//! ## Architecture Overview
//!
//! - **Topics**: named fan-out points; `publish()` hands a clone of the
//!   message to every subscriber
//! - **Bounded queues**: each subscription owns a crossbeam channel of
//!   `queue_size` slots, so a slow consumer never balloons memory
//! - **Delivery threads**: one worker per subscription drains its queue and
//!   runs the callback, so callbacks on different subscriptions run
//!   concurrently
//! - **Status callbacks**: observers are told the new subscriber count each
//!   time a subscription is added or removed
//!
//! ## Key Design Decisions
//!
//! ### Back-Pressure
//! - `publish()` never blocks: when a subscriber queue is full the newest
//!   message is dropped for that subscriber and counted in
//!   [`Topic::dropped_messages`]
//!
//! ### Lifecycle
//! - Dropping or shutting down a [`Subscription`] detaches it immediately;
//!   messages still queued for it are discarded, never delivered
//! - Status callbacks run on the thread that subscribed or unsubscribed,
//!   after the topic's internal lock has been released
//!
//! ## Usage
//!
//! ```rust
//! use camera_relay::Topic;
//! use std::sync::mpsc;
//!
//! let topic: Topic<u32> = Topic::new("camera/image_raw");
//! let (tx, rx) = mpsc::channel();
//! let _sub = topic.subscribe(5, move |msg| {
//!     let _ = tx.send(msg);
//! })?;
//!
//! assert_eq!(topic.subscriber_count(), 1);
//! topic.publish(7);
//! assert_eq!(rx.recv()?, 7);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Result;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use tracing::{debug, trace};

/// Observer notified with the new subscriber count.
pub type StatusCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// A named fan-out point for messages of type `T`.
///
/// Cloning a `Topic` yields another handle to the same topic.
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct TopicInner<T> {
    name: String,
    slots: Mutex<Vec<Slot<T>>>,
    observers: Mutex<Vec<StatusCallback>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

/// Per-subscription sending half.
struct Slot<T> {
    id: u64,
    tx: Sender<T>,
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TopicInner {
                name: name.into(),
                slots: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Hand `msg` to every subscriber. Returns how many queues accepted it.
    pub fn publish(&self, msg: T) -> usize {
        let slots = lock(&self.inner.slots);
        let mut delivered = 0;
        for slot in slots.iter() {
            match slot.tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(topic = %self.inner.name, subscription = slot.id, "queue full; message dropped");
                }
                // worker already gone; the slot is removed on shutdown
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        delivered
    }

    /// Start delivering messages to `callback` on a dedicated thread.
    ///
    /// At most `queue_size` messages (minimum 1) wait for the callback.
    pub fn subscribe<F>(&self, queue_size: usize, mut callback: F) -> Result<Subscription>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = bounded::<T>(queue_size.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let worker_active = active.clone();
        thread::Builder::new()
            .name(format!("{}#{}", self.inner.name, id))
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    if !worker_active.load(Ordering::Acquire) {
                        break;
                    }
                    callback(msg);
                }
            })?;

        let count = {
            let mut slots = lock(&self.inner.slots);
            slots.push(Slot { id, tx });
            slots.len()
        };
        debug!(topic = %self.inner.name, subscription = id, subscribers = count, "subscriber connected");
        self.inner.notify(count);

        let topic: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Ok(Subscription {
            id,
            active,
            topic: Some(topic),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.slots).len()
    }

    /// Register an observer for subscriber-count changes.
    pub fn on_subscriber_change<F>(&self, observer: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        lock(&self.inner.observers).push(Arc::new(observer));
    }

    /// Messages dropped because a subscriber queue was full.
    pub fn dropped_messages(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl<T> TopicInner<T> {
    fn notify(&self, count: usize) {
        let observers: Vec<StatusCallback> = lock(&self.observers).clone();
        for observer in observers {
            observer(count);
        }
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send> Detach for TopicInner<T> {
    fn detach(&self, id: u64) {
        let count = {
            let mut slots = lock(&self.slots);
            let before = slots.len();
            slots.retain(|slot| slot.id != id);
            if slots.len() == before {
                return;
            }
            slots.len()
        };
        debug!(topic = %self.name, subscription = id, subscribers = count, "subscriber disconnected");
        self.notify(count);
    }
}

/// Handle keeping a subscription alive. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    topic: Option<Weak<dyn Detach>>,
}

impl Subscription {
    /// Stop delivery. Idempotent.
    pub fn shutdown(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(topic) = self.topic.take().and_then(|weak| weak.upgrade()) {
            topic.detach(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
