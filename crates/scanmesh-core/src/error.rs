//! Shared error type for the scanmesh pipeline

use std::io;
use std::net::AddrParseError;
use thiserror::Error;

/// Result type alias used throughout scanmesh crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every stage: input errors at HTTP boundaries,
/// transient transport errors, config errors, and bus/record errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("operation timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Error::Parse(format!("invalid IP address: {}", err))
    }
}

impl From<ipnetwork::IpNetworkError> for Error {
    fn from(err: ipnetwork::IpNetworkError) -> Self {
        Error::InvalidCidr(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn cidr_error_conversion() {
        use ipnetwork::IpNetwork;
        let network_err = "999.0.0.0/24".parse::<IpNetwork>().unwrap_err();
        let err: Error = network_err.into();
        assert!(matches!(err, Error::InvalidCidr(_)));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<i32>>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
