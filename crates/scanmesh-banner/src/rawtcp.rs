//! RawTCP probe.
//!
//! DIAL (3s) -> CONNECTED|FAIL -> READ (2s deadline, 4096 bytes) -> DONE.
//! Grounded on `worker/banner/tcp.go`'s `scanRawTCP`/`sanitizeBanner`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use scanmesh_core::{sanitize_banner, Observation, Protocol};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const READ_DEADLINE: Duration = Duration::from_secs(2);
const READ_CAP: usize = 4096;
const BANNER_CAP: usize = 512;

pub async fn probe(scan_id: scanmesh_core::types::ScanId, ip: Ipv4Addr, port: u16, now: i64) -> Observation {
    let mut obs = Observation::new(scan_id, ip, port, Protocol::Tcp, now);
    let addr = SocketAddr::new(ip.into(), port);

    let stream = match timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            obs.set_error(format!("dial failed: {e}"));
            return obs;
        }
        Err(_) => {
            obs.set_error("dial timeout");
            return obs;
        }
    };

    let mut stream = stream;
    let mut buf = vec![0u8; READ_CAP];
    let (bytes_read, timed_out) = match timeout(READ_DEADLINE, stream.read(&mut buf)).await {
        Ok(Ok(n)) => (n, false),
        Ok(Err(_)) => (0, false),
        Err(_) => (0, true),
    };

    let sanitized = sanitize_banner(&buf[..bytes_read], BANNER_CAP);
    obs.banner = Some(sanitized.clone());
    obs.raw_tcp = Some(sanitized);
    obs.meta.insert("bytes_read".to_string(), json!(bytes_read));
    obs.meta.insert("timeout".to_string(), json!(timed_out));
    obs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reads_and_sanitizes_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[0x48, 0x69, 0x00, 0x0A, 0x7F]).await.unwrap();
        });

        let obs = probe(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, port, 0).await;
        assert_eq!(obs.banner.as_deref(), Some("Hi.\n."));
        assert_eq!(obs.raw_tcp.as_deref(), Some("Hi.\n."));
        assert_eq!(obs.meta.get("timeout").unwrap(), &json!(false));
    }

    #[tokio::test]
    async fn dial_failure_sets_meta_error() {
        // Port 1 is privileged; connect should fail fast in a sandbox.
        let obs = probe(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, 1, 0).await;
        assert!(obs.meta.contains_key("error"));
        assert!(obs.banner.is_none());
    }
}
