//! SSH probe: reads the identification string and parses the server's
//! KEXINIT packet (RFC 4253 §7.1) for its algorithm name-lists. Grounded on
//! `worker/banner-worker/ssh.go`'s field set (extended with the
//! compression/language lists the original's `sshInfo` map also carried)
//! and its banner format string.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use scanmesh_core::{sanitize_banner, Observation, Protocol, SshPayload};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(3);
const BANNER_CAP: usize = 512;

pub async fn probe(scan_id: scanmesh_core::types::ScanId, ip: Ipv4Addr, port: u16, now: i64) -> Observation {
    let mut obs = Observation::new(scan_id, ip, port, Protocol::Ssh, now);

    match run(ip, port).await {
        Ok(payload) => {
            obs.banner = Some(sanitize_banner(summary_banner(&payload).as_bytes(), BANNER_CAP));
            obs.ssh = Some(payload);
        }
        Err(e) => obs.set_error(e.to_string()),
    }
    obs
}

async fn run(ip: Ipv4Addr, port: u16) -> crate::error::Result<SshPayload> {
    let addr = SocketAddr::new(ip.into(), port);
    let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    let mut reader = BufReader::new(stream);
    let mut ident = String::new();
    timeout(READ_TIMEOUT, reader.read_line(&mut ident))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;
    let version = ident.trim_end().to_string();

    let mut len_buf = [0u8; 4];
    timeout(READ_TIMEOUT, reader.read_exact(&mut len_buf))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;
    let packet_len = u32::from_be_bytes(len_buf) as usize;

    let mut payload = vec![0u8; packet_len];
    timeout(READ_TIMEOUT, reader.read_exact(&mut payload))
        .await
        .map_err(|_| crate::error::Error::DialTimeout)??;

    parse_kexinit(&payload, version)
}

/// `payload` is the KEXINIT packet body: `padding_length(1) || message(1) ||
/// cookie(16) || 10x name-list || first_kex_packet_follows(1) || reserved(4)`.
fn parse_kexinit(payload: &[u8], version: String) -> crate::error::Result<SshPayload> {
    if payload.len() < 18 || payload[1] != 20 {
        return Err(crate::error::Error::Tls("not a KEXINIT packet".to_string()));
    }
    // Skip padding_length(1) + message_code(1) + cookie(16).
    let mut cursor = &payload[18..];
    let mut lists = Vec::with_capacity(10);
    for _ in 0..10 {
        if cursor.len() < 4 {
            lists.push(Vec::new());
            continue;
        }
        let len = u32::from_be_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]) as usize;
        cursor = &cursor[4..];
        if cursor.len() < len {
            lists.push(Vec::new());
            break;
        }
        let list = String::from_utf8_lossy(&cursor[..len]);
        cursor = &cursor[len..];
        lists.push(list.split(',').filter(|s| !s.is_empty()).map(String::from).collect());
    }
    while lists.len() < 10 {
        lists.push(Vec::new());
    }

    Ok(SshPayload {
        version,
        kex_algorithms: lists[0].clone(),
        server_host_key_algos: lists[1].clone(),
        enc_algos_c2s: lists[2].clone(),
        enc_algos_s2c: lists[3].clone(),
        mac_algos_c2s: lists[4].clone(),
        mac_algos_s2c: lists[5].clone(),
        compression_c2s: lists[6].clone(),
        compression_s2c: lists[7].clone(),
        languages_c2s: lists[8].clone(),
        languages_s2c: lists[9].clone(),
    })
}

fn summary_banner(p: &SshPayload) -> String {
    format!(
        "SSH {} kex={:?} hostkey={:?} enc_c2s={:?} enc_s2c={:?} mac_c2s={:?} mac_s2c={:?}",
        p.version,
        p.kex_algorithms,
        p.server_host_key_algos,
        p.enc_algos_c2s,
        p.enc_algos_s2c,
        p.mac_algos_c2s,
        p.mac_algos_s2c,
    )
}
