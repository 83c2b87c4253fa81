//! HTTP probe: single `GET /`, no redirects, body capped at 256 bytes.
//! Grounded on `worker/banner/http.go` (User-Agent, body cap) and
//! spec.md §4.3.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use scanmesh_core::{sanitize_banner, Observation, Protocol};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::httpparse::{self, USER_AGENT};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_DEADLINE: Duration = Duration::from_secs(6);
const READ_CAP: usize = 8192;

pub async fn probe(scan_id: scanmesh_core::types::ScanId, ip: Ipv4Addr, port: u16, now: i64) -> Observation {
    let mut obs = Observation::new(scan_id, ip, port, Protocol::Http, now);

    match timeout(TOTAL_DEADLINE, run(ip, port)).await {
        Ok(Ok(parsed)) => apply(&mut obs, parsed),
        Ok(Err(e)) => obs.set_error(e.to_string()),
        Err(_) => obs.set_error("probe deadline exceeded"),
    }
    obs
}

async fn run(ip: Ipv4Addr, port: u16) -> crate::error::Result<httpparse::ParsedResponse> {
    let addr = SocketAddr::new(ip.into(), port);
    let mut stream = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    let request = format!(
        "GET / HTTP/1.1\r\nHost: {ip}\r\nUser-Agent: {USER_AGENT}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = vec![0u8; READ_CAP];
    let n = stream.read(&mut buf).await?;
    Ok(httpparse::parse(&buf[..n]))
}

fn apply(obs: &mut Observation, parsed: httpparse::ParsedResponse) {
    let title = httpparse::extract_title(&parsed.body);
    let hash = httpparse::body_hash(&parsed.body);
    let tags = httpparse::tags(parsed.status_code, &parsed.headers);
    let banner = httpparse::build_banner(&parsed.status_line, &parsed.headers, &parsed.body);

    // Every observation's banner is subject to the ASCII/length law,
    // regardless of protocol.
    obs.banner = Some(sanitize_banner(banner.as_bytes(), 512));
    obs.http = Some(scanmesh_core::HttpPayload {
        status_code: parsed.status_code,
        headers: parsed.headers,
        title,
        body_preview: parsed.body.clone(),
        body_hash: hash,
        content_length: parsed.body.len(),
        tags,
    });
    obs.meta.insert("bytes_read".to_string(), json!(parsed.body.len()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_parses_title_and_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let body = "<html><head><title>Hi</title></head></html>";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{body}"
            );
            sock.write_all(response.as_bytes()).await.unwrap();
        });

        let obs = probe(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, port, 0).await;
        let http = obs.http.expect("http payload set");
        assert_eq!(http.status_code, 200);
        assert_eq!(http.title.as_deref(), Some("Hi"));
        assert!(http.body_hash.starts_with("sha256:"));
        assert_eq!(obs.banner.unwrap().lines().next(), Some("200 OK"));
    }
}
