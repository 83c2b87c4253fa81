//! scanmesh core library
//!
//! Record shapes, the bus contract, the TTL cache, and shared error/config
//! types used by every stage of the pipeline.
//!
//! # Examples
//!
//! ```
//! use scanmesh_core::types::split_cidr;
//!
//! let subnets = split_cidr("10.0.0.0/22", 24).unwrap();
//! assert_eq!(subnets.len(), 4);
//! ```

pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use bus::{BusConsumer, BusProducer, InMemoryTopic};
pub use cache::TtlCache;
pub use config::StageConfig;
pub use error::{Error, Result};
pub use types::{
    sanitize_banner, split_cidr, HostOpenPorts, HttpPayload, Observation, Protocol, ScanId,
    ScanRequest, SshPayload, TlsPayload,
};
