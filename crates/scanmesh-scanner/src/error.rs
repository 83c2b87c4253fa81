//! Error types for the Port Scanner stage

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] scanmesh_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan deadline exceeded")]
    DeadlineExceeded,
}
