//! Ambient per-stage configuration, resolved from environment variables.
//!
//! Every stage binary reads the same handful of knobs (queue capacity,
//! worker pool size, bus/index/enrichment endpoints); this module centralizes
//! parsing and validation so each `[[bin]]` in `scanmesh-api` and each
//! worker binary does it identically.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Resolved from `QUEUE_CAPACITY` / `WORKER_COUNT` / `BANNER_DIAL_TIMEOUT_MS`.
/// §9 design note: "worker-pool sizing ... should become per-stage config
/// knobs" — this struct is that knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Bounded in-memory queue capacity between the consumer loop and the
    /// worker pool. Default 2000.
    pub queue_capacity: usize,
    /// Fixed worker pool size draining the queue. Default 8.
    pub worker_count: usize,
    /// Dial timeout ceiling for banner probes, in milliseconds. Default 5000.
    pub banner_dial_timeout_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            queue_capacity: 2000,
            worker_count: 8,
            banner_dial_timeout_ms: 5000,
        }
    }
}

impl StageConfig {
    /// Reads `QUEUE_CAPACITY`, `WORKER_COUNT`, `BANNER_DIAL_TIMEOUT_MS` from
    /// the environment, falling back to defaults when unset, then validates.
    pub fn from_env() -> Result<Self> {
        let mut cfg = StageConfig::default();

        if let Ok(v) = env::var("QUEUE_CAPACITY") {
            cfg.queue_capacity = v
                .parse()
                .map_err(|_| Error::Config(format!("QUEUE_CAPACITY not a number: {v}")))?;
        }
        if let Ok(v) = env::var("WORKER_COUNT") {
            cfg.worker_count = v
                .parse()
                .map_err(|_| Error::Config(format!("WORKER_COUNT not a number: {v}")))?;
        }
        if let Ok(v) = env::var("BANNER_DIAL_TIMEOUT_MS") {
            cfg.banner_dial_timeout_ms = v
                .parse()
                .map_err(|_| Error::Config(format!("BANNER_DIAL_TIMEOUT_MS not a number: {v}")))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be > 0".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be > 0".to_string()));
        }
        if self.banner_dial_timeout_ms == 0 {
            return Err(Error::Config(
                "banner_dial_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// `tracing-subscriber` `EnvFilter` directive. Default `scanmesh=info,warn`.
pub fn log_filter() -> String {
    env::var("RUST_LOG").unwrap_or_else(|_| "scanmesh=info,warn".to_string())
}

/// Reads a required environment variable, returning a `Config` error naming
/// it if absent — used for stage-specific endpoints (`ELASTIC_URL`,
/// `KAFKA_BROKER`, …) rather than the ambient knobs above.
pub fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("missing required env var {name}")))
}

/// Reads `KAFKA_BROKER` (falling back to `KAFKA_SEEDS`) — every stage binary
/// needs this at startup since a missing bus endpoint is a fatal error
/// (§7 item 5), even though the in-process reference transport doesn't
/// dial it yet (see DESIGN.md).
pub fn require_bus_broker() -> Result<String> {
    env::var("KAFKA_BROKER")
        .or_else(|_| env::var("KAFKA_SEEDS"))
        .map_err(|_| Error::Config("missing required env var KAFKA_BROKER or KAFKA_SEEDS".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::set_var is process-global; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec() {
        let cfg = StageConfig::default();
        assert_eq!(cfg.queue_capacity, 2000);
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.banner_dial_timeout_ms, 5000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_worker_count() {
        let cfg = StageConfig {
            worker_count: 0,
            ..StageConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_env_overrides_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("QUEUE_CAPACITY", "500");
        env::set_var("WORKER_COUNT", "4");
        env::remove_var("BANNER_DIAL_TIMEOUT_MS");
        let cfg = StageConfig::from_env().unwrap();
        assert_eq!(cfg.queue_capacity, 500);
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.banner_dial_timeout_ms, 5000);
        env::remove_var("QUEUE_CAPACITY");
        env::remove_var("WORKER_COUNT");
    }

    #[test]
    fn require_env_errors_when_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("SCANMESH_TEST_VAR_NOT_SET");
        assert!(require_env("SCANMESH_TEST_VAR_NOT_SET").is_err());
    }

    #[test]
    fn require_bus_broker_falls_back_to_seeds() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("KAFKA_BROKER");
        env::set_var("KAFKA_SEEDS", "broker-1:9092");
        assert_eq!(require_bus_broker().unwrap(), "broker-1:9092");
        env::remove_var("KAFKA_SEEDS");
    }

    #[test]
    fn require_bus_broker_errors_when_both_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("KAFKA_BROKER");
        env::remove_var("KAFKA_SEEDS");
        assert!(require_bus_broker().is_err());
    }
}
