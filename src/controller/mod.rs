//! Transaction controllers
//!
//! - [`ControllerRegistry`]: one shared controller per (user, channel)
//! - [`Controller`]: query, invoke and identity view for one channel
//! - [`CommitWaiter`]: bounded wait for a transaction's commit event

pub mod commit;
pub mod registry;
pub mod transaction;

pub use commit::{CommitWaiter, DEFAULT_COMMIT_TIMEOUT};
pub use registry::{ControllerKey, ControllerRegistry};
pub use transaction::Controller;
