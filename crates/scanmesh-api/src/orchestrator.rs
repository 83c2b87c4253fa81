//! `POST /scan` handler: validates the request, splits the CIDR into
//! `/24`s, and publishes one `scan.request` per subnet under a shared
//! `scan_id`. Grounded on `orchestrator/handler.go`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use scanmesh_core::{split_cidr, BusProducer, ScanRequest};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::health::{aggregate_health, HealthProbes};

const SUBNET_PREFIX: u8 = 24;

pub struct OrchestratorState<P> {
    pub producer: Arc<P>,
    pub health: Arc<HealthProbes>,
}

// Manual impl: `#[derive(Clone)]` would add a spurious `P: Clone` bound even
// though only `Arc<P>` needs cloning.
impl<P> Clone for OrchestratorState<P> {
    fn clone(&self) -> Self {
        OrchestratorState { producer: self.producer.clone(), health: self.health.clone() }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanPostRequest {
    pub ip_range: String,
    #[serde(default = "default_ports")]
    pub ports: String,
}

fn default_ports() -> String {
    "1-1024".to_string()
}

/// `POST /scan`: 202 `{status:"queued", scan_id}` on success, 400 on bad
/// JSON, a missing `ip_range`, or an invalid CIDR.
///
/// The body is taken as a raw `Value` rather than `Json<ScanPostRequest>`
/// directly: axum's own `Json` extractor rejects a well-formed-but-wrong-shape
/// body with 422, but §6 requires 400 for a missing `ip_range` too.
pub async fn post_scan<P>(State(state): State<OrchestratorState<P>>, body: Json<serde_json::Value>) -> impl IntoResponse
where
    P: BusProducer<ScanRequest> + 'static,
{
    let body: ScanPostRequest = match serde_json::from_value(body.0) {
        Ok(body) => body,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid request body: {e}") })))
                .into_response();
        }
    };

    let subnets = match split_cidr(&body.ip_range, SUBNET_PREFIX) {
        Ok(subnets) => subnets,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid ip_range: {e}") })))
                .into_response();
        }
    };

    let scan_id = Uuid::new_v4();
    for subnet in &subnets {
        let request = ScanRequest { scan_id, ip_range: subnet.to_string(), ports: body.ports.clone() };
        if let Err(e) = state.producer.publish(request).await {
            error!(error = %e, scan_id = %scan_id, "failed to publish scan.request");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "failed to queue scan" })))
                .into_response();
        }
    }

    info!(scan_id = %scan_id, subnets = subnets.len(), "scan queued");
    (StatusCode::ACCEPTED, Json(json!({ "status": "queued", "scan_id": scan_id }))).into_response()
}

/// `GET /health`: see [`crate::health::aggregate_health`].
pub async fn get_health<P: 'static>(State(state): State<OrchestratorState<P>>) -> impl IntoResponse {
    let (body, code) = aggregate_health(&state.health).await;
    (StatusCode::from_u16(code).unwrap_or(StatusCode::OK), Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::Router;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingProducer {
        published: Mutex<Vec<ScanRequest>>,
    }

    impl BusProducer<ScanRequest> for RecordingProducer {
        async fn publish(&self, record: ScanRequest) -> scanmesh_core::Result<()> {
            self.published.lock().push(record);
            Ok(())
        }
    }

    fn router(producer: Arc<RecordingProducer>) -> Router {
        let state = OrchestratorState {
            producer,
            health: Arc::new(HealthProbes { elastic_url: None, bus_health_url: None, k8s_metrics_api: None }),
        };
        Router::new()
            .route("/scan", post(post_scan::<RecordingProducer>))
            .route("/health", get(get_health::<RecordingProducer>))
            .with_state(state)
    }

    #[tokio::test]
    async fn valid_cidr_queues_one_request_per_subnet() {
        let producer = Arc::new(RecordingProducer::default());
        let app = router(producer.clone());

        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/scan")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"ip_range":"10.0.0.0/22"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(producer.published.lock().len(), 4);
    }

    #[tokio::test]
    async fn invalid_cidr_is_rejected() {
        let producer = Arc::new(RecordingProducer::default());
        let app = router(producer);

        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/scan")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"ip_range":"not-a-cidr"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_ip_range_is_rejected_with_400() {
        let producer = Arc::new(RecordingProducer::default());
        let app = router(producer);

        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/scan")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"ports":"22"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
