//! Loyalty gateway - transaction front end for the loyalty ledger network
//!
//! The gateway submits reads and writes to a permissioned ledger on behalf of
//! enrolled users.
//!
//! ## Flow
//!
//! - **Query**: resolve identity, send a read-only proposal, return the raw payload
//! - **Invoke**: resolve identity, propose, check the endorsement, then broadcast
//!   to the ordering service while waiting (bounded) for the commit event
//!
//! ## Modules
//!
//! - [`controller`]: controller registry, transaction controller, commit waiter
//! - [`identity`]: identity store, per-controller identity session, certificate view
//! - [`network`]: WebSocket transport to peer, orderer and event source
//! - [`server`] / [`routes`]: HTTP API

pub mod config;
pub mod controller;
pub mod identity;
pub mod network;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use controller::{Controller, ControllerRegistry};
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
