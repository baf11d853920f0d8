//! Benchmark timer.
//!
//! A ticker task fires at a fixed period and queues at most one
//! [`ControlEvent::TimerFired`] for the control loop. Ticks that arrive
//! while that event is still queued are dropped. The control loop takes a
//! [`FiringPermit`] when it starts executing the firing; the permit holds
//! the busy flag until the runtime commands return. A tick that finds the
//! flag still set disarms the timer and reports an overrun.

use crate::event::ControlEvent;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Default)]
struct TimerState {
    armed: AtomicBool,
    /// A firing is executing.
    busy: AtomicBool,
    /// A firing is queued but not yet started.
    pending: AtomicBool,
}

/// Exclusive right to run one firing. Releases the busy flag on drop.
#[derive(Debug)]
pub struct FiringPermit {
    state: Arc<TimerState>,
    started: DateTime<Local>,
}

impl FiringPermit {
    /// Wall-clock time the firing started executing.
    pub fn started(&self) -> DateTime<Local> {
        self.started
    }
}

impl Drop for FiringPermit {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

/// A firing overlapped the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overrun;

/// Periodic trigger for the pipeline's runtime commands.
///
/// Disarmed on creation and on drop. Arming again after a disarm starts a
/// fresh ticker.
#[derive(Debug)]
pub struct BenchmarkTimer {
    state: Arc<TimerState>,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl BenchmarkTimer {
    /// Creates a disarmed timer. `period` must be non-zero, which
    /// [`ControllerSettings::load`](crate::ControllerSettings::load) checks.
    pub fn new(period: Duration) -> Self {
        Self {
            state: Arc::new(TimerState::default()),
            period,
            task: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed.load(Ordering::Acquire)
    }

    /// True while a [`FiringPermit`] is alive.
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::Acquire)
    }

    /// True while a fired tick waits in the control loop's queue.
    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Admission check for one firing, called when the firing starts
    /// executing. Clears the queued flag.
    ///
    /// # Returns
    ///
    /// The permit for this firing, or [`Overrun`] if another firing still
    /// holds one. On overlap the timer is disarmed before the error is
    /// returned.
    pub fn try_begin(&self) -> Result<FiringPermit, Overrun> {
        self.state.pending.store(false, Ordering::Release);
        if self.state.busy.swap(true, Ordering::AcqRel) {
            error!("Previous timer firing is still running");
            self.state.armed.store(false, Ordering::Release);
            return Err(Overrun);
        }
        Ok(FiringPermit {
            state: self.state.clone(),
            started: Local::now(),
        })
    }

    /// Starts ticking into `events`. No-op when already armed.
    ///
    /// The first tick comes one period after arming.
    pub fn arm(&mut self, events: mpsc::UnboundedSender<ControlEvent>) {
        if self.state.armed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.pending.store(false, Ordering::Release);
        debug!(period_ms = self.period.as_millis() as u64, "benchmark timer armed");

        let state = self.state.clone();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !state.armed.load(Ordering::Acquire) {
                    break;
                }
                if state.busy.load(Ordering::Acquire) {
                    error!("Previous timer firing is still running");
                    state.armed.store(false, Ordering::Release);
                    let _ = events.send(ControlEvent::TimerOverrun);
                    break;
                }
                if state.pending.swap(true, Ordering::AcqRel) {
                    debug!("previous tick not yet started, tick dropped");
                    continue;
                }
                if events.send(ControlEvent::TimerFired).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn disarm(&mut self) {
        self.state.armed.store(false, Ordering::Release);
        self.state.pending.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for BenchmarkTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
