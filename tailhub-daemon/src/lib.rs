//! tailhub daemon library.
//!
//! Exposes the daemon's modules for integration testing.
//! In production, `tailhub-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod dashboard;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
