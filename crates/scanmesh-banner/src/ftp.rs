//! FTP probe: hand-rolled client reading the welcome banner and, if offered,
//! the AUTH TLS/AUTH SSL responses. Grounded on `worker/banner/ftp.go`'s
//! zgrab2-based probe (verbose=true, implicit_tls=false) and its
//! `bannerParts` composition (`welcome | auth_tls_resp | auth_ssl_resp`).

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use scanmesh_core::{sanitize_banner, Observation, Protocol};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const LINE_TIMEOUT: Duration = Duration::from_secs(3);
const BANNER_CAP: usize = 512;

pub async fn probe(scan_id: scanmesh_core::types::ScanId, ip: Ipv4Addr, port: u16, now: i64) -> Observation {
    let mut obs = Observation::new(scan_id, ip, port, Protocol::Ftp, now);

    match run(ip, port).await {
        Ok((welcome, auth_tls_resp, auth_ssl_resp)) => {
            let parts: Vec<&str> = [&welcome, &auth_tls_resp, &auth_ssl_resp]
                .into_iter()
                .map(String::as_str)
                .filter(|s| !s.is_empty())
                .collect();
            let banner = sanitize_banner(parts.join(" | ").as_bytes(), BANNER_CAP);
            obs.banner = Some(banner);
            obs.raw_tcp = Some(welcome.clone());
            obs.meta.insert("welcome".to_string(), json!(welcome));
            obs.meta.insert("auth_tls_resp".to_string(), json!(auth_tls_resp));
            obs.meta.insert("auth_ssl_resp".to_string(), json!(auth_ssl_resp));
            obs.meta.insert("implicit_tls".to_string(), json!(false));
        }
        Err(e) => obs.set_error(e.to_string()),
    }
    obs
}

async fn run(ip: Ipv4Addr, port: u16) -> crate::error::Result<(String, String, String)> {
    let addr = SocketAddr::new(ip.into(), port);
    let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    let mut reader = BufReader::new(stream);
    let welcome = read_reply(&mut reader).await?;

    let auth_tls_resp = probe_auth(&mut reader, "AUTH TLS\r\n").await.unwrap_or_default();
    let auth_ssl_resp = probe_auth(&mut reader, "AUTH SSL\r\n").await.unwrap_or_default();

    Ok((welcome.trim().to_string(), auth_tls_resp, auth_ssl_resp))
}

async fn probe_auth(
    reader: &mut BufReader<TcpStream>,
    command: &str,
) -> crate::error::Result<String> {
    reader.get_mut().write_all(command.as_bytes()).await?;
    let reply = read_reply(reader).await?;
    Ok(reply.trim().to_string())
}

/// Reads one FTP reply line (or a multi-line reply's first line — good
/// enough for banner purposes; this probe is reconnaissance, not a
/// protocol-complete FTP client).
async fn read_reply(reader: &mut BufReader<TcpStream>) -> crate::error::Result<String> {
    let mut line = String::new();
    timeout(LINE_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reads_welcome_and_composes_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"220 Welcome to test FTP\r\n").await.unwrap();
            let mut buf = [0u8; 64];
            let _ = sock.read(&mut buf).await; // AUTH TLS
            sock.write_all(b"500 Command not understood\r\n").await.unwrap();
            let _ = sock.read(&mut buf).await; // AUTH SSL
            sock.write_all(b"500 Command not understood\r\n").await.unwrap();
        });

        let obs = probe(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, port, 0).await;
        assert!(obs.banner.unwrap().contains("Welcome to test FTP"));
        assert_eq!(
            obs.raw_tcp.as_deref(),
            Some("220 Welcome to test FTP")
        );
    }
}
