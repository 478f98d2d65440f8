//! Best-effort side notifications.
//!
//! # Data Flow
//! ```text
//! Primary response (method, path, status)
//!     → NotificationKind::for_user_route / for_upload (trigger table)
//!     → dispatcher.rs (detached task: resolve, POST once, log outcome)
//! ```
//!
//! # Design Decisions
//! - Never retried, never allowed to change the primary response
//! - Outcome travels back through the task's join handle only

pub mod dispatcher;

pub use dispatcher::{NotificationDispatcher, NotificationKind, NotificationOutcome};
