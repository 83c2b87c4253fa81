//! Port-based probe dispatch. Grounded on `worker/banner-worker/main.go`'s
//! `dispatch(port int)` switch statement.

use std::net::Ipv4Addr;

use scanmesh_core::{types::ScanId, Observation};

use crate::{ftp, http, https, rawtcp, ssh};

/// Picks a protocol probe by port number and runs it. Every branch returns a
/// fully-populated [`Observation`] even on failure (the error is recorded in
/// `meta.error`, never propagated) so the caller always has exactly one
/// record to publish per (host, port).
pub async fn dispatch(scan_id: ScanId, ip: Ipv4Addr, port: u16, now: i64) -> Observation {
    match port {
        80 | 8000 | 8080 => http::probe(scan_id, ip, port, now).await,
        443 => https::probe(scan_id, ip, port, now).await,
        22 => ssh::probe(scan_id, ip, port, now).await,
        21 => ftp::probe(scan_id, ip, port, now).await,
        _ => rawtcp::probe(scan_id, ip, port, now).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmesh_core::Protocol;

    #[tokio::test]
    async fn unmatched_port_falls_back_to_rawtcp() {
        let obs = dispatch(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, 1, 0).await;
        assert_eq!(obs.protocol, Protocol::Tcp);
    }

    #[tokio::test]
    async fn port_80_dispatches_to_http() {
        // Nothing is listening on localhost:80 in this test environment, so
        // the probe fails closed; this only asserts the port->protocol pick.
        let obs = dispatch(uuid::Uuid::new_v4(), Ipv4Addr::LOCALHOST, 80, 0).await;
        assert_eq!(obs.protocol, Protocol::Http);
    }
}
