//! Periodic timers driving rate-limited delivery.
//!
//! The session only needs two operations: arm a callback every `period`, and
//! cancel it. [`TokioTimerService`] runs each timer as a task on a tokio
//! runtime; cancelling aborts the task.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Callback run on every tick.
pub type TickFn = Box<dyn Fn() + Send + Sync>;

/// Schedules periodic callbacks.
pub trait TimerService: Send + Sync {
    /// Call `tick` every `period`, first after one full period.
    fn arm(&self, period: Duration, tick: TickFn) -> Result<Box<dyn TimerHandle>>;
}

/// An armed timer.
pub trait TimerHandle: Send {
    /// Stop the timer. No tick starts after this returns. Idempotent.
    fn cancel(&mut self);
}

/// Timer service backed by a tokio runtime.
#[derive(Clone)]
pub struct TokioTimerService {
    handle: Handle,
}

impl TokioTimerService {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().context("timer service needs a tokio runtime")?;
        Ok(Self::new(handle))
    }
}

impl TimerService for TokioTimerService {
    fn arm(&self, period: Duration, tick: TickFn) -> Result<Box<dyn TimerHandle>> {
        if period.is_zero() {
            bail!("timer period must be non-zero");
        }
        let task = self.handle.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick();
            }
        });
        Ok(Box::new(TokioTimer { task: Some(task) }))
    }
}

struct TokioTimer {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle for TokioTimer {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
