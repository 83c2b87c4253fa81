//! Error types for the Indexer stage.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("core error: {0}")]
    Core(#[from] scanmesh_core::Error),

    #[error("index request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("index returned an error body: {0}")]
    IndexResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
