//! HTTPS probe: TLS dial with certificate verification disabled (recon
//! posture, not a trust decision), then the same HTTP request as [`crate::http`].
//! Grounded on `tls_handshake.rs`'s `AcceptAllVerifier` + `ServerInfo`
//! extraction and `worker/banner/https.go`'s field shapes.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use scanmesh_core::{sanitize_banner, Observation, Protocol, TlsPayload};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::httpparse::{self, USER_AGENT};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CAP: usize = 64 * 1024;
const BANNER_CAP: usize = 512;

/// Accepts any certificate chain — this probe is reconnaissance, not a
/// trust relationship, and needs to read past self-signed/expired certs.
struct AcceptAllVerifier;

impl ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

fn connector() -> TlsConnector {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

pub async fn probe(scan_id: scanmesh_core::types::ScanId, ip: Ipv4Addr, port: u16, now: i64) -> Observation {
    let mut obs = Observation::new(scan_id, ip, port, Protocol::Https, now);

    match run(ip, port).await {
        Ok((tls, parsed)) => apply(&mut obs, tls, parsed),
        Err(e) => obs.set_error(e.to_string()),
    }
    obs
}

async fn run(ip: Ipv4Addr, port: u16) -> crate::error::Result<(TlsPayload, httpparse::ParsedResponse)> {
    let addr = SocketAddr::new(ip.into(), port);
    let tcp = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    let server_name = ServerName::try_from(ip.to_string().as_str())
        .map_err(|e| crate::error::Error::Tls(e.to_string()))?;
    let mut tls_stream = connector()
        .connect(server_name, tcp)
        .await
        .map_err(|e| crate::error::Error::Tls(e.to_string()))?;

    let tls_payload = extract_tls_info(&tls_stream);

    let request = format!(
        "GET / HTTP/1.1\r\nHost: {ip}\r\nUser-Agent: {USER_AGENT}\r\nConnection: close\r\n\r\n"
    );
    timeout(WRITE_TIMEOUT, tls_stream.write_all(request.as_bytes()))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    let mut buf = vec![0u8; READ_CAP];
    let n = timeout(READ_TIMEOUT, tls_stream.read(&mut buf))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    Ok((tls_payload, httpparse::parse(&buf[..n])))
}

fn extract_tls_info(stream: &tokio_rustls::client::TlsStream<TcpStream>) -> TlsPayload {
    let (_, conn) = stream.get_ref();

    let version = conn
        .protocol_version()
        .map(tls_version_string)
        .unwrap_or_else(|| "unknown".to_string());
    let cipher_suite = conn.negotiated_cipher_suite().map(|cs| format!("{:?}", cs.suite()));
    let alpn = conn
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).to_string());

    let mut payload = TlsPayload {
        version,
        cipher_suite,
        handshake_ok: true,
        negotiated_protocol: alpn.clone(),
        alpn,
        ..Default::default()
    };

    if let Some(certs) = conn.peer_certificates() {
        if let Some(cert) = certs.first() {
            if let Ok((_, parsed)) = x509_parser::parse_x509_certificate(cert.as_ref()) {
                payload.subject = Some(parsed.subject().to_string());
                payload.issuer = Some(parsed.issuer().to_string());
                payload.serial = Some(parsed.raw_serial_as_string());
                payload.not_before = Some(parsed.validity().not_before.to_string());
                payload.not_after = Some(parsed.validity().not_after.to_string());
                payload.sig_alg = Some(parsed.signature_algorithm.algorithm.to_string());
                payload.dns_names = parsed
                    .subject_alternative_name()
                    .ok()
                    .flatten()
                    .map(|ext| {
                        ext.value
                            .general_names
                            .iter()
                            .filter_map(|name| match name {
                                x509_parser::extensions::GeneralName::DNSName(dns) => {
                                    Some(dns.to_string())
                                }
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
            }
        }
    }

    payload
}

fn tls_version_string(version: rustls::ProtocolVersion) -> String {
    match version {
        rustls::ProtocolVersion::SSLv2 => "unknown(0x0002)".to_string(),
        rustls::ProtocolVersion::SSLv3 => "unknown(0x0300)".to_string(),
        rustls::ProtocolVersion::TLSv1_0 => "TLS1.0".to_string(),
        rustls::ProtocolVersion::TLSv1_1 => "TLS1.1".to_string(),
        rustls::ProtocolVersion::TLSv1_2 => "TLS1.2".to_string(),
        rustls::ProtocolVersion::TLSv1_3 => "TLS1.3".to_string(),
        other => format!("unknown(0x{:04X})", u16::from(other)),
    }
}

fn apply(obs: &mut Observation, tls: TlsPayload, parsed: httpparse::ParsedResponse) {
    let title = httpparse::extract_title(&parsed.body);
    let hash = httpparse::body_hash(&parsed.body);
    let tags = httpparse::tags(parsed.status_code, &parsed.headers);
    let http_banner = httpparse::build_banner(&parsed.status_line, &parsed.headers, &parsed.body);

    let banner = format!(
        "TLS: {} {}\n{}",
        tls.version,
        tls.cipher_suite.clone().unwrap_or_default(),
        http_banner
    );
    obs.banner = Some(sanitize_banner(banner.as_bytes(), BANNER_CAP));
    obs.tls = Some(tls);
    obs.http = Some(scanmesh_core::HttpPayload {
        status_code: parsed.status_code,
        headers: parsed.headers,
        title,
        body_preview: parsed.body.clone(),
        body_hash: hash,
        content_length: parsed.body.len(),
        tags,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_version_string_maps_known_versions() {
        assert_eq!(tls_version_string(rustls::ProtocolVersion::TLSv1_3), "TLS1.3");
        assert_eq!(tls_version_string(rustls::ProtocolVersion::TLSv1_2), "TLS1.2");
    }

    #[tokio::test]
    async fn probe_against_closed_port_sets_meta_error() {
        let obs = probe(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, 1, 0).await;
        assert!(obs.meta.contains_key("error"));
        assert!(obs.tls.is_none());
    }
}
