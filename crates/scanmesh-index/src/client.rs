//! Search index client. Pluggable behind a trait so the index engine itself
//! stays out of scope; the shipped implementation issues `POST
//! /<alias>/_bulk` NDJSON requests, matching
//! `worker/elasticsearch-worker/main.go`'s `esutil.BulkIndexer` usage.

use scanmesh_core::Observation;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub indexed: usize,
    /// One entry per item the index reported as failed; logged by the
    /// caller and not retried at this layer (§4.5).
    pub item_errors: Vec<String>,
}

pub trait IndexClient: Send + Sync {
    fn bulk_index(&self, alias: &str, docs: &[Observation]) -> impl std::future::Future<Output = Result<BulkOutcome>> + Send;
}

/// `action=index` (auto-ID) bulk request body, one `{"index":{...}}` /
/// document line pair per record, newline-terminated.
pub fn build_bulk_body(alias: &str, docs: &[Observation]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let action = serde_json::json!({ "index": { "_index": alias } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(doc)?);
        body.push('\n');
    }
    Ok(body)
}

pub struct ElasticClient {
    http: reqwest::Client,
    base_url: String,
}

impl ElasticClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        ElasticClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl IndexClient for ElasticClient {
    async fn bulk_index(&self, alias: &str, docs: &[Observation]) -> Result<BulkOutcome> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let body = build_bulk_body(alias, docs)?;
        let url = format!("{}/_bulk", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::IndexResponse(format!("{status}: {text}")));
        }

        let parsed: serde_json::Value = response.json().await?;
        let mut outcome = BulkOutcome { indexed: 0, item_errors: Vec::new() };
        if let Some(items) = parsed.get("items").and_then(|v| v.as_array()) {
            for item in items {
                let entry = item.get("index").or_else(|| item.get("create"));
                match entry.and_then(|e| e.get("error")) {
                    Some(err) => outcome.item_errors.push(err.to_string()),
                    None => outcome.indexed += 1,
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmesh_core::{Observation, Protocol};
    use std::net::Ipv4Addr;

    #[test]
    fn bulk_body_has_one_action_line_per_doc() {
        let docs = vec![
            Observation::new(uuid::Uuid::new_v4(), Ipv4Addr::new(1, 2, 3, 4), 80, Protocol::Http, 0),
            Observation::new(uuid::Uuid::new_v4(), Ipv4Addr::new(1, 2, 3, 5), 443, Protocol::Https, 0),
        ];
        let body = build_bulk_body("scans-000001", &docs).unwrap();
        assert_eq!(body.lines().count(), 4);
        assert!(body.lines().next().unwrap().contains("scans-000001"));
    }

    #[test]
    fn empty_doc_set_produces_empty_body() {
        let body = build_bulk_body("scans-000001", &[]).unwrap();
        assert!(body.is_empty());
    }
}
