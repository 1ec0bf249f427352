//! HTTP ingress and command line tooling for gather-core.
//!
//! The `gather-server` binary mounts [`build_router`] and runs the stale
//! document sweeper; `gather2md` replays captured fragments offline.

pub mod args;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod types;

pub use server::{AppState, build_router, serve, spawn_sweeper};
pub use types::{GatherResponse, HealthResponse};
