//! Domain models shared by the session, scope and routing layers.

pub mod activity;
pub mod hierarchy;
pub mod session;
pub mod tenant;
pub mod user;

pub use activity::*;
pub use hierarchy::*;
pub use session::*;
pub use tenant::*;
pub use user::*;
