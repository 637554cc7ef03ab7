pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod guard;
pub mod hierarchy;
pub mod models;
pub mod router;
pub mod session;
pub mod storage;
pub mod tenant;

pub use console::{Console, Navigation};
pub use error::{ApiError, SessionError};
pub use session::{LoginOutcome, SessionEvent, SessionManager};
