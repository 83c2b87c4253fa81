//! `GET /scans` handler: parses the raw query string, builds a search
//! request, executes it, and shapes the response. Grounded on
//! `query/elastic_handler.go`'s HTTP entry point.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::querybuilder::{build_search_request, parse_query_params};
use crate::search::IndexSearcher;

pub struct QueryState<S> {
    pub searcher: Arc<S>,
}

impl<S> Clone for QueryState<S> {
    fn clone(&self) -> Self {
        QueryState { searcher: self.searcher.clone() }
    }
}

/// Decodes `a=1&b=2%20x&a=3` into `[(a,1), (b,"2 x"), (a,3)]`, preserving
/// duplicate keys (the Shodan-style `q`/`http_header.*` params repeat).
pub fn parse_query_string(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// `GET /scans`: 400 on an unrecognized or malformed parameter, 500 with
/// the upstream body on an index-side failure, 200 with the shaped
/// `{total, took_ms, timed_out, results[], aggs}` body otherwise.
pub async fn get_scans<S>(State(state): State<QueryState<S>>, RawQuery(raw): RawQuery) -> impl IntoResponse
where
    S: IndexSearcher + 'static,
{
    let pairs = parse_query_string(raw.as_deref().unwrap_or(""));
    let params = match parse_query_params(&pairs) {
        Ok(params) => params,
        Err(reason) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response(),
    };

    let request = build_search_request(&params);
    match state.searcher.search(request).await {
        Ok(raw_response) => {
            let shaped = crate::search::shape_response(&raw_response);
            (StatusCode::OK, Json(shaped)).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    struct StubSearcher {
        response: Value,
    }

    impl IndexSearcher for StubSearcher {
        async fn search(&self, _request: Value) -> Result<Value, crate::search::SearchError> {
            Ok(self.response.clone())
        }
    }

    #[test]
    fn query_string_preserves_duplicate_keys_and_decodes() {
        let pairs = parse_query_string("q=country%3AUS&q=open&size=5");
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "country:US".to_string()),
                ("q".to_string(), "open".to_string()),
                ("size".to_string(), "5".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_param_returns_400() {
        let searcher = Arc::new(StubSearcher { response: json!({}) });
        let app = Router::new()
            .route("/scans", get(get_scans::<StubSearcher>))
            .with_state(QueryState { searcher });

        let req = axum::http::Request::builder().uri("/scans?bogus=1").body(axum::body::Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_query_returns_shaped_body() {
        let raw = json!({
            "took": 3,
            "timed_out": false,
            "hits": { "total": { "value": 0 }, "hits": [] },
        });
        let searcher = Arc::new(StubSearcher { response: raw });
        let app = Router::new()
            .route("/scans", get(get_scans::<StubSearcher>))
            .with_state(QueryState { searcher });

        let req = axum::http::Request::builder().uri("/scans?port=22").body(axum::body::Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
