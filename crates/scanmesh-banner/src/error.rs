//! Error types for the Banner Grabber stage

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] scanmesh_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dial timed out")]
    DialTimeout,

    #[error("probe deadline exceeded")]
    DeadlineExceeded,

    #[error("TLS handshake failed: {0}")]
    Tls(String),
}
