//! Error types for the Enricher stage.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] scanmesh_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open GeoIP database: {0}")]
    GeoDatabase(String),

    #[error("DNS resolution error: {0}")]
    Dns(String),
}
