//! GeoIP/ASN lookups behind traits so the on-disk database format stays
//! pluggable (out of scope per the pipeline's stated boundaries). The
//! shipped implementation reads MaxMind-format `.mmdb` files via
//! `maxminddb`, mirroring `enricher/geoip.go`'s `geoip2.Open` usage.

use std::net::{IpAddr, Ipv4Addr};

use maxminddb::geoip2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub number: Option<u32>,
    pub org: Option<String>,
}

pub trait GeoDatabase: Send + Sync {
    fn lookup(&self, ip: Ipv4Addr) -> Option<GeoInfo>;
}

pub trait AsnDatabase: Send + Sync {
    fn lookup(&self, ip: Ipv4Addr) -> Option<AsnInfo>;
}

/// Backed by a MaxMind City database, memory-mapped for the process
/// lifetime. A missing file at startup is fatal (§4.4) — the caller decides
/// that, this constructor just surfaces the open error.
pub struct MaxmindGeoDatabase {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxmindGeoDatabase {
    pub fn open(path: &str) -> crate::error::Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| crate::error::Error::GeoDatabase(e.to_string()))?;
        Ok(MaxmindGeoDatabase { reader })
    }
}

impl GeoDatabase for MaxmindGeoDatabase {
    fn lookup(&self, ip: Ipv4Addr) -> Option<GeoInfo> {
        let city: geoip2::City = self.reader.lookup(IpAddr::V4(ip)).ok()?;
        let country = city.country.and_then(|c| c.iso_code).map(str::to_string);
        let name = city
            .city
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").copied())
            .map(str::to_string);
        let (lat, lon) = city
            .location
            .map(|l| (l.latitude, l.longitude))
            .unwrap_or((None, None));

        if country.is_none() && name.is_none() && lat.is_none() {
            return None;
        }
        Some(GeoInfo {
            country,
            city: name,
            lat,
            lon,
        })
    }
}

/// Backed by a MaxMind ASN database. Missing at startup is a warning, not
/// fatal (§4.4), so callers hold this behind an `Option`.
pub struct MaxmindAsnDatabase {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxmindAsnDatabase {
    pub fn open(path: &str) -> crate::error::Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| crate::error::Error::GeoDatabase(e.to_string()))?;
        Ok(MaxmindAsnDatabase { reader })
    }
}

impl AsnDatabase for MaxmindAsnDatabase {
    fn lookup(&self, ip: Ipv4Addr) -> Option<AsnInfo> {
        let asn: geoip2::Asn = self.reader.lookup(IpAddr::V4(ip)).ok()?;
        let number = asn.autonomous_system_number;
        let org = asn.autonomous_system_organization.map(str::to_string);
        if number.is_none() && org.is_none() {
            return None;
        }
        Some(AsnInfo { number, org })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubGeo;
    impl GeoDatabase for StubGeo {
        fn lookup(&self, _ip: Ipv4Addr) -> Option<GeoInfo> {
            Some(GeoInfo {
                country: Some("US".to_string()),
                city: Some("Mountain View".to_string()),
                lat: Some(37.4),
                lon: Some(-122.0),
            })
        }
    }

    #[test]
    fn stub_geo_database_returns_record() {
        let db = StubGeo;
        let info = db.lookup(Ipv4Addr::new(8, 8, 8, 8)).unwrap();
        assert_eq!(info.country.as_deref(), Some("US"));
        assert_eq!(info.city.as_deref(), Some("Mountain View"));
    }

    struct StubAsn;
    impl AsnDatabase for StubAsn {
        fn lookup(&self, _ip: Ipv4Addr) -> Option<AsnInfo> {
            Some(AsnInfo {
                number: Some(15169),
                org: Some("Google LLC".to_string()),
            })
        }
    }

    #[test]
    fn stub_asn_database_returns_record() {
        let db = StubAsn;
        let info = db.lookup(Ipv4Addr::new(8, 8, 8, 8)).unwrap();
        assert_eq!(info.number, Some(15169));
    }
}
