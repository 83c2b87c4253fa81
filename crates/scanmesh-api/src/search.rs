//! Executes a built search request against the index and shapes the
//! response into `{total, took_ms, timed_out, results[], aggs}`. Grounded
//! on `query/elastic_handler.go`'s single-retry-on-transient-error policy.

use std::time::Duration;

use serde_json::{json, Value};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const RETRY_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

pub trait IndexSearcher: Send + Sync {
    fn search(&self, request: Value) -> impl std::future::Future<Output = Result<Value, SearchError>> + Send;
}

pub struct ElasticSearcher {
    http: reqwest::Client,
    base_url: String,
    alias: String,
}

impl ElasticSearcher {
    pub fn new(base_url: impl Into<String>, alias: impl Into<String>) -> Self {
        ElasticSearcher { http: reqwest::Client::new(), base_url: base_url.into(), alias: alias.into() }
    }

    async fn execute_once(&self, request: &Value) -> Result<Value, SearchError> {
        let url = format!("{}/{}/_search", self.base_url.trim_end_matches('/'), self.alias);
        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Upstream { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }

    fn is_transient(err: &SearchError) -> bool {
        matches!(err, SearchError::Transport(e) if e.is_timeout() || e.is_connect())
    }
}

impl IndexSearcher for ElasticSearcher {
    async fn search(&self, request: Value) -> Result<Value, SearchError> {
        let attempt = tokio::time::timeout(SEARCH_TIMEOUT, self.execute_once(&request)).await;
        match attempt {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if Self::is_transient(&e) => {
                tokio::time::sleep(RETRY_DELAY).await;
                tokio::time::timeout(SEARCH_TIMEOUT, self.execute_once(&request))
                    .await
                    .map_err(|_| SearchError::Upstream { status: 504, body: "search timed out".to_string() })?
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SearchError::Upstream { status: 504, body: "search timed out".to_string() }),
        }
    }
}

/// Reshapes a raw ES-style response into the public `/scans` body.
pub fn shape_response(raw: &Value) -> Value {
    let total = raw["hits"]["total"]["value"].as_u64().unwrap_or(0);
    let took_ms = raw["took"].as_u64().unwrap_or(0);
    let timed_out = raw["timed_out"].as_bool().unwrap_or(false);

    let results: Vec<Value> = raw["hits"]["hits"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|hit| {
            let mut source = hit["_source"].clone();
            if let Some(highlight) = hit.get("highlight") {
                if let Some(obj) = source.as_object_mut() {
                    let mut meta = obj.get("meta").cloned().unwrap_or_else(|| json!({}));
                    if let Some(meta_obj) = meta.as_object_mut() {
                        meta_obj.insert("_highlight".to_string(), highlight.clone());
                    }
                    obj.insert("meta".to_string(), meta);
                }
            }
            source
        })
        .collect();

    let aggs = raw.get("aggregations").cloned().unwrap_or(Value::Null);

    json!({ "total": total, "took_ms": took_ms, "timed_out": timed_out, "results": results, "aggs": aggs })
}
