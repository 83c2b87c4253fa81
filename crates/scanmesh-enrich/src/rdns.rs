//! Reverse-DNS resolution with its own 24h TTL cache, kept independent of
//! the combined geo/asn cache so that a resolution failure never evicts an
//! otherwise-good geo/asn entry (§3 cache invariant).

use std::net::Ipv4Addr;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use scanmesh_core::cache::{TtlCache, ENRICHMENT_TTL};

pub struct RdnsResolver {
    resolver: TokioAsyncResolver,
    cache: TtlCache<Ipv4Addr, Option<String>>,
}

impl RdnsResolver {
    pub fn new() -> crate::error::Result<Self> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Ok(RdnsResolver {
            resolver,
            cache: TtlCache::new(ENRICHMENT_TTL),
        })
    }

    /// Returns the first PTR record's hostname with its trailing dot
    /// stripped, or `None` if the lookup fails or returns nothing. Cached
    /// for 24h regardless of outcome — a repeated miss is itself cached, so
    /// a second lookup within the TTL performs zero network syscalls.
    pub async fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        if let Some(cached) = self.cache.get(&ip) {
            return cached;
        }
        let result = self
            .resolver
            .reverse_lookup(ip.into())
            .await
            .ok()
            .and_then(|lookup| lookup.iter().next().map(|name| name.to_string()))
            .map(|name| name.trim_end_matches('.').to_string());
        self.cache.insert(ip, result.clone());
        result
    }
}
