use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ALARM_KEY, IMMEDIATE_FIRE_DELAY_MS};
use crate::messages::{Action, MessageBus};

/// One scheduled tick of the recurring sync alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// The currently armed alarm, for UI countdowns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSchedule {
    pub alarm_key: &'static str,
    pub period_hours: f64,
    pub next_fire_time: DateTime<Utc>,
}

/// Owner of the one recurring sync timer.
///
/// All timers are keyed by [`ALARM_KEY`]; arming a new one always cancels
/// the previous one first, so at most one is ever alive. Re-arming is the
/// only cancellation mechanism for a cycle already underway — the fetch
/// layer has its own cancellation signal for in-flight requests.
pub struct SyncScheduler {
    bus: MessageBus,
    ticks: mpsc::UnboundedSender<Tick>,
    timer: Mutex<Option<JoinHandle<()>>>,
    schedule: Arc<Mutex<Option<SyncSchedule>>>,
}

impl SyncScheduler {
    /// Create a scheduler; ticks are delivered on the returned receiver.
    pub fn new(bus: MessageBus) -> (Self, mpsc::UnboundedReceiver<Tick>) {
        let (ticks, rx) = mpsc::unbounded_channel();
        (
            Self {
                bus,
                ticks,
                timer: Mutex::new(None),
                schedule: Arc::new(Mutex::new(None)),
            },
            rx,
        )
    }

    /// Arm the recurring timer.
    ///
    /// Cancels any existing timer first (start-while-running is
    /// stop-then-start with the new period, with no double fire). The
    /// first tick lands after [`IMMEDIATE_FIRE_DELAY_MS`] when
    /// `run_immediately`, else after one full period.
    pub fn start(&self, period_hours: f64, run_immediately: bool) {
        let period_hours = if period_hours > 0.0 {
            period_hours
        } else {
            tracing::warn!(period_hours, "non-positive sync period, using default");
            crate::config::AppConfig::default().sync.period_hours
        };
        self.cancel_timer();

        tracing::debug!(period_hours, run_immediately, "starting library sync");
        let period = Duration::from_secs_f64(period_hours * 3600.0);
        let first = if run_immediately {
            Duration::from_millis(IMMEDIATE_FIRE_DELAY_MS)
        } else {
            period
        };

        let ticks = self.ticks.clone();
        let schedule = Arc::clone(&self.schedule);
        let arm = move |delay: Duration| {
            let next = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            *schedule.lock().expect("schedule lock") = Some(SyncSchedule {
                alarm_key: ALARM_KEY,
                period_hours,
                next_fire_time: next,
            });
        };

        arm(first);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(first).await;
            loop {
                if ticks.send(Tick).is_err() {
                    return;
                }
                arm(period);
                tokio::time::sleep(period).await;
            }
        });

        *self.timer.lock().expect("timer lock") = Some(handle);
    }

    /// Cancel the timer and tell the UI sync is disabled. No-op when no
    /// timer exists.
    pub fn stop(&self) {
        tracing::debug!("stopping any running library sync");
        self.cancel_timer();
        self.bus.send_action(Action::SyncDisabled);
    }

    /// True iff a timer is currently armed.
    pub fn is_enabled(&self) -> bool {
        self.timer
            .lock()
            .expect("timer lock")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// The armed alarm, if any.
    pub fn schedule(&self) -> Option<SyncSchedule> {
        if !self.is_enabled() {
            return None;
        }
        *self.schedule.lock().expect("schedule lock")
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().expect("timer lock").take() {
            handle.abort();
        }
        *self.schedule.lock().expect("schedule lock") = None;
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
