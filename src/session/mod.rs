//! Authentication state and its lifecycle.

pub mod idle;
pub mod manager;
pub mod store;
pub mod throttle;

pub use idle::{spawn_idle_monitor, ActivitySignal, IdleMonitorHandle, IdleStatus};
pub use manager::{LoginOutcome, SessionEvent, SessionManager};
pub use store::SessionStore;
pub use throttle::{InMemoryAttemptStore, LoginAttempt, LoginAttemptStore, LoginThrottle};
