//! `GET /health` aggregation: three independent probes (index cluster, bus,
//! control plane), each with its own timeout — a probe failure never aborts
//! the others. Grounded on `orchestrator/health.go`.

use std::time::Duration;

use serde_json::{json, Value};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up,
    Down,
}

async fn probe_http_get(url: &str) -> ProbeOutcome {
    let client = reqwest::Client::new();
    match tokio::time::timeout(PROBE_TIMEOUT, client.get(url).send()).await {
        Ok(Ok(resp)) if resp.status().is_success() => ProbeOutcome::Up,
        _ => ProbeOutcome::Down,
    }
}

pub struct HealthProbes {
    pub elastic_url: Option<String>,
    pub bus_health_url: Option<String>,
    pub k8s_metrics_api: Option<String>,
}

/// Builds the `{elasticsearch, kafka, kubernetes, status}` body. The
/// control-plane probe is entirely omitted (not an error) when
/// `K8S_METRICS_API` is unset, matching the original's `if k8sAPI != ""`
/// guard.
pub async fn aggregate_health(probes: &HealthProbes) -> (Value, u16) {
    let elastic = match &probes.elastic_url {
        Some(url) => probe_http_get(url).await,
        None => ProbeOutcome::Down,
    };
    let bus = match &probes.bus_health_url {
        Some(url) => probe_http_get(url).await,
        None => ProbeOutcome::Down,
    };
    let k8s = match &probes.k8s_metrics_api {
        Some(url) => Some(probe_http_get(url).await),
        None => None,
    };

    let mut body = serde_json::Map::new();
    body.insert("elasticsearch".to_string(), probe_field(elastic));
    body.insert("kafka".to_string(), probe_field(bus));
    if let Some(k8s) = k8s {
        body.insert("kubernetes".to_string(), probe_field(k8s));
    }

    let up_count = [Some(elastic), Some(bus), k8s].into_iter().flatten().filter(|o| *o == ProbeOutcome::Up).count();
    let required = if k8s.is_some() { 3 } else { 2 };
    let (status, code) = if up_count == required {
        ("ok", 200)
    } else if up_count == 0 {
        ("down", 503)
    } else {
        ("degraded", 200)
    };
    body.insert("status".to_string(), json!(status));

    (Value::Object(body), code)
}

fn probe_field(outcome: ProbeOutcome) -> Value {
    match outcome {
        ProbeOutcome::Up => json!({ "status": "ok" }),
        ProbeOutcome::Down => json!({ "status": "down", "error": "unreachable" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_down_returns_503() {
        let probes = HealthProbes { elastic_url: None, bus_health_url: None, k8s_metrics_api: None };
        let (body, code) = aggregate_health(&probes).await;
        assert_eq!(code, 503);
        assert_eq!(body["status"], "down");
    }

    #[tokio::test]
    async fn missing_k8s_probe_is_omitted_not_an_error() {
        let probes = HealthProbes { elastic_url: None, bus_health_url: None, k8s_metrics_api: None };
        let (body, _) = aggregate_health(&probes).await;
        assert!(!body.as_object().unwrap().contains_key("kubernetes"));
    }
}
