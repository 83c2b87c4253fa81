pub mod error;
pub mod geoip;
pub mod rdns;
pub mod stage;

pub use error::{Error, Result};
pub use geoip::{AsnDatabase, AsnInfo, GeoDatabase, GeoInfo, MaxmindAsnDatabase, MaxmindGeoDatabase};
pub use rdns::RdnsResolver;
pub use stage::Enricher;
