//! Record shapes carried across the four bus topics, plus the CIDR-split
//! algorithm the orchestrator uses to fan a scan request out to subnets.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifies one client-initiated scan; carried unchanged through every
/// downstream record derived from it.
pub type ScanId = Uuid;

/// Protocol a banner observation was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Http,
    Https,
    Ftp,
    Ssh,
}

impl Protocol {
    /// Coarse service name stored alongside `protocol` (§3 supplemental).
    pub fn service_name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http | Protocol::Https => "http",
            Protocol::Ftp => "ftp",
            Protocol::Ssh => "ssh",
        }
    }
}

/// `scan.request`: orchestrator -> port scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub scan_id: ScanId,
    pub ip_range: String,
    pub ports: String,
}

/// `host.openports`: port scanner -> banner grabber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostOpenPorts {
    pub scan_id: ScanId,
    pub host: Ipv4Addr,
    pub ports: String,
    pub timestamp: i64,
}

impl HostOpenPorts {
    /// Parses the comma-separated port list into individual `u16`s, skipping
    /// malformed tokens rather than failing the whole record.
    pub fn port_list(&self) -> Vec<u16> {
        self.ports
            .split(',')
            .filter_map(|p| p.trim().parse::<u16>().ok())
            .collect()
    }
}

/// HTTP payload for `protocol=HTTP` and `protocol=HTTPS` observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpPayload {
    pub status_code: u16,
    pub headers: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body_preview: String,
    pub body_hash: String,
    pub content_length: usize,
    pub tags: Vec<String>,
}

/// TLS payload for `protocol=HTTPS` observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsPayload {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_suite: Option<String>,
    pub handshake_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiated_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig_alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// SSH payload for `protocol=SSH` observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshPayload {
    pub version: String,
    pub kex_algorithms: Vec<String>,
    pub server_host_key_algos: Vec<String>,
    pub enc_algos_c2s: Vec<String>,
    pub enc_algos_s2c: Vec<String>,
    pub mac_algos_c2s: Vec<String>,
    pub mac_algos_s2c: Vec<String>,
    #[serde(default)]
    pub compression_c2s: Vec<String>,
    #[serde(default)]
    pub compression_s2c: Vec<String>,
    #[serde(default)]
    pub languages_c2s: Vec<String>,
    #[serde(default)]
    pub languages_s2c: Vec<String>,
}

/// The central record: flows through `observation.raw` and
/// `observation.enriched` unchanged in shape, mutated only additively
/// under `meta` by the enricher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub scan_id: ScanId,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub protocol: Protocol,
    pub service: String,
    pub timestamp: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_tcp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshPayload>,

    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl Observation {
    /// Starts a bare observation identity; probes fill in the payload and
    /// `meta` before it is published to `observation.raw`.
    pub fn new(scan_id: ScanId, ip: Ipv4Addr, port: u16, protocol: Protocol, timestamp: i64) -> Self {
        Observation {
            scan_id,
            ip,
            port,
            service: protocol.service_name().to_string(),
            protocol,
            timestamp,
            banner: None,
            raw_tcp: None,
            http: None,
            tls: None,
            ssh: None,
            meta: serde_json::Map::new(),
        }
    }

    pub fn set_error(&mut self, err: impl Into<String>) {
        self.meta
            .insert("error".to_string(), serde_json::Value::String(err.into()));
    }
}

/// Sanitizes a raw byte buffer per the banner law: keep bytes in `[9,126]`,
/// replace everything else with `.`, then truncate to `max_len` bytes.
pub fn sanitize_banner(raw: &[u8], max_len: usize) -> String {
    let mut out: Vec<u8> = raw
        .iter()
        .map(|&b| if (9..=126).contains(&b) { b } else { b'.' })
        .collect();
    out.truncate(max_len);
    // Every byte is now ASCII (9..=126 or '.'), so this never fails.
    String::from_utf8(out).expect("sanitized buffer is always valid ASCII")
}

/// Splits `cidr` into `/target_prefix` subnets. If `cidr`'s prefix is
/// already `>= target_prefix`, the input is returned unchanged (single
/// element). Deterministic: subnet `i` starts at
/// `input_base + i * 2^(32 - target_prefix)`.
pub fn split_cidr(cidr: &str, target_prefix: u8) -> Result<Vec<Ipv4Network>> {
    let network: Ipv4Network = cidr
        .parse()
        .map_err(|e: ipnetwork::IpNetworkError| Error::InvalidCidr(e.to_string()))?;

    if network.prefix() >= target_prefix {
        return Ok(vec![network]);
    }

    let subnet_count = 1u32 << (target_prefix - network.prefix());
    let subnet_size = 1u32 << (32 - target_prefix);
    let base = u32::from(network.network());

    (0..subnet_count)
        .map(|i| {
            let subnet_base = Ipv4Addr::from(base + i * subnet_size);
            Ipv4Network::new(subnet_base, target_prefix)
                .map_err(|e| Error::InvalidCidr(e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_control_and_high_bytes() {
        let raw = [0x48, 0x69, 0x00, 0x0A, 0x7F];
        assert_eq!(sanitize_banner(&raw, 512), "Hi.\n.");
    }

    #[test]
    fn sanitize_truncates() {
        let raw = vec![b'A'; 1000];
        assert_eq!(sanitize_banner(&raw, 512).len(), 512);
    }

    #[test]
    fn split_cidr_produces_four_slash24s() {
        let subnets = split_cidr("10.0.0.0/22", 24).unwrap();
        assert_eq!(subnets.len(), 4);
        assert_eq!(subnets[0].to_string(), "10.0.0.0/24");
        assert_eq!(subnets[3].to_string(), "10.0.3.0/24");
    }

    #[test]
    fn split_cidr_keeps_narrower_prefix_unchanged() {
        let subnets = split_cidr("10.0.0.0/28", 24).unwrap();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].to_string(), "10.0.0.0/28");
    }

    #[test]
    fn split_cidr_rejects_garbage() {
        assert!(split_cidr("not-a-cidr", 24).is_err());
    }

    #[test]
    fn service_name_from_protocol() {
        assert_eq!(Protocol::Http.service_name(), "http");
        assert_eq!(Protocol::Https.service_name(), "http");
        assert_eq!(Protocol::Ssh.service_name(), "ssh");
    }

    #[test]
    fn host_openports_parses_port_list() {
        let rec = HostOpenPorts {
            scan_id: Uuid::new_v4(),
            host: "1.2.3.4".parse().unwrap(),
            ports: "80, 443,22".to_string(),
            timestamp: 0,
        };
        assert_eq!(rec.port_list(), vec![80, 443, 22]);
    }
}
