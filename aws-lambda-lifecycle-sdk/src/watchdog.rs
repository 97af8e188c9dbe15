//! Deadline watchdog.
//!
//! The watchdog is advisory: when the remaining invocation time minus a
//! safety margin elapses before the invocation settles, it calls its
//! timeout callback once. It never cancels the invocation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_SAFETY_MARGIN;

/// Computes safety-margined deadlines and arms one-shot timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineWatchdog {
    safety_margin: Duration,
}

impl Default for DeadlineWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_MARGIN)
    }
}

impl DeadlineWatchdog {
    /// Creates a watchdog with the given safety margin.
    pub fn new(safety_margin: Duration) -> Self {
        Self { safety_margin }
    }

    /// Returns the configured safety margin.
    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Returns how long to wait before signalling a timeout.
    ///
    /// `None` when the remaining time is unknown or does not exceed the
    /// safety margin.
    pub fn deadline(&self, remaining: Option<Duration>) -> Option<Duration> {
        remaining?
            .checked_sub(self.safety_margin)
            .filter(|deadline| !deadline.is_zero())
    }

    /// Arms a one-shot timer that calls `on_timeout` when the deadline passes.
    ///
    /// Returns an inert guard when [`deadline`](Self::deadline) is `None`.
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `remaining` - Time left in the invocation, if known
    /// * `on_timeout` - Callback run at most once, on the timer task
    pub fn arm<F>(&self, remaining: Option<Duration>, on_timeout: F) -> WatchdogGuard
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(deadline) = self.deadline(remaining) else {
            tracing::debug!(
                remaining_ms = remaining.map(|r| r.as_millis() as u64),
                safety_margin_ms = self.safety_margin.as_millis() as u64,
                "Deadline watchdog not armed"
            );
            return WatchdogGuard::inert();
        };

        let (state, _) = watch::channel(TimerState::Armed);
        let state = Arc::new(state);
        let timer_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if !transition(&timer_state, TimerState::Armed, TimerState::Firing) {
                return;
            }
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "Invocation deadline reached"
            );
            on_timeout();
            timer_state.send_replace(TimerState::Fired);
        });

        WatchdogGuard {
            state,
            task: Some(task),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Armed,
    Firing,
    Fired,
    Disarmed,
}

fn transition(state: &watch::Sender<TimerState>, from: TimerState, to: TimerState) -> bool {
    state.send_if_modified(|current| {
        if *current != from {
            return false;
        }
        *current = to;
        true
    })
}

/// Handle to an armed timer. Dropping it disarms the timer.
#[derive(Debug)]
pub struct WatchdogGuard {
    state: Arc<watch::Sender<TimerState>>,
    task: Option<JoinHandle<()>>,
}

impl WatchdogGuard {
    /// Returns a guard that was never armed.
    pub fn inert() -> Self {
        let (state, _) = watch::channel(TimerState::Disarmed);
        Self {
            state: Arc::new(state),
            task: None,
        }
    }

    /// Returns true while the timer can still fire.
    pub fn is_armed(&self) -> bool {
        *self.state.borrow() == TimerState::Armed
    }

    /// Returns true once the timeout callback has started.
    pub fn has_fired(&self) -> bool {
        matches!(*self.state.borrow(), TimerState::Firing | TimerState::Fired)
    }

    /// Stops the timer without waiting.
    ///
    /// A callback already in flight keeps running on the timer task. Use
    /// [`settle`](Self::settle) to wait for it.
    pub fn disarm(&mut self) {
        if transition(&self.state, TimerState::Armed, TimerState::Disarmed) {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }

    /// Stops the timer and waits for an in-flight callback.
    ///
    /// Once this returns, the timeout callback is either complete or will
    /// never run.
    pub async fn settle(&mut self) {
        self.disarm();
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the wait only ends on a state change.
        let _ = state.wait_for(|state| *state != TimerState::Firing).await;
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}
