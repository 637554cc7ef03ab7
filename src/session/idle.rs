//! Idle tracking: activity signals and the recurring timeout check.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::SessionManager;

/// User-activity signals that count as "not idle".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

/// Outcome of one idle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleStatus {
    /// No authenticated session to watch
    Inactive,
    Active,
    /// Past the warning threshold; `remaining` until forced logout
    Warning { remaining: chrono::Duration },
    /// The session was torn down; navigate to `redirect_to`
    Expired { redirect_to: String },
}

/// Owns the background idle check. Cancelling or dropping the handle stops
/// the task so it never fires against a torn-down session.
#[derive(Debug)]
pub struct IdleMonitorHandle {
    task: JoinHandle<()>,
}

impl IdleMonitorHandle {
    pub fn cancel(self) {
        // Drop does the work
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for IdleMonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the recurring idle check for `manager`. The task ends on its own
/// once the session it watches is gone.
pub fn spawn_idle_monitor(manager: Arc<SessionManager>, every: Duration) -> IdleMonitorHandle {
    tracing::debug!(interval_secs = every.as_secs(), "Starting idle monitor");

    let task = tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        tick.tick().await;

        loop {
            tick.tick().await;
            match manager.check_idle().await {
                IdleStatus::Expired { redirect_to } => {
                    tracing::info!(redirect_to = %redirect_to, "Session expired after inactivity");
                    break;
                }
                IdleStatus::Inactive => {
                    tracing::debug!("No session left to watch, stopping idle monitor");
                    break;
                }
                IdleStatus::Active | IdleStatus::Warning { .. } => {}
            }
        }
    });

    IdleMonitorHandle { task }
}
