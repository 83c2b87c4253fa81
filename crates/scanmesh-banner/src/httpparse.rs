//! Shared HTTP/1.x response parsing used by both the HTTP and HTTPS probes.
//!
//! Parses by splitting on the first `\r\n\r\n`: the head block's first line
//! is the status line, the remainder are `key: value` headers (lowercased);
//! the second block is the body. Grounded on `worker/banner/https.go`'s
//! manual head/body split (no HTTP client library is in scope here).

use sha2::{Digest, Sha256};

pub const USER_AGENT: &str = "Exploravis-Scanner";
pub const BODY_CAP: usize = 256;

pub struct ParsedResponse {
    pub status_line: String,
    pub status_code: u16,
    pub headers: serde_json::Map<String, serde_json::Value>,
    pub body: String,
}

/// `raw` is the full response buffer read off the wire (already capped by
/// the caller's read limit).
pub fn parse(raw: &[u8]) -> ParsedResponse {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = match text.split_once("\r\n\r\n") {
        Some((h, b)) => (h, b),
        None => (text.as_ref(), ""),
    };

    let mut lines = head.lines();
    let status_full = lines.next().unwrap_or("");
    // Status line drops the leading "HTTP/1.1" token, matching the Go
    // `http.Response.Status` field ("200 OK", not "HTTP/1.1 200 OK").
    let status_line = status_full
        .split_once(' ')
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default();
    let status_code = status_line
        .split_whitespace()
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .unwrap_or(0);

    let mut headers = serde_json::Map::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(
                key.trim().to_ascii_lowercase(),
                serde_json::Value::String(value.trim().to_string()),
            );
        }
    }

    let body_capped: String = body.chars().take(BODY_CAP).collect();

    ParsedResponse {
        status_line,
        status_code,
        headers,
        body: body_capped,
    }
}

/// Case-insensitive first-occurrence `<title>...</title>` extraction.
pub fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let start = lower.find("<title>")? + "<title>".len();
    let end = lower[start..].find("</title>")? + start;
    Some(body[start..end].to_string())
}

pub fn body_hash(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

/// `"redirect"` for 3xx status, `"auth-required"` if `www-authenticate`
/// header is present.
pub fn tags(status_code: u16, headers: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    let mut tags = Vec::new();
    if (300..400).contains(&status_code) {
        tags.push("redirect".to_string());
    }
    if headers.contains_key("www-authenticate") {
        tags.push("auth-required".to_string());
    }
    tags
}

/// Status line + one-line-per-header (lowercased) + body, `\n`-separated.
pub fn build_banner(status_line: &str, headers: &serde_json::Map<String, serde_json::Value>, body: &str) -> String {
    let mut lines = vec![status_line.to_string()];
    for (key, value) in headers {
        let value = value.as_str().unwrap_or_default();
        lines.push(format!("{key}: {value}"));
    }
    lines.push(body.to_string());
    lines.join("\n")
}
