//! scanmesh Port Scanner stage
//!
//! Consumes `scan.request`, runs a pluggable [`ScanEngine`] against each
//! subnet, and emits one `host.openports` record per host with at least
//! one open port.

pub mod engine;
pub mod error;
pub mod stage;

pub use engine::{ConnectScanEngine, HostResult, ScanEngine};
pub use error::{Error, Result};
