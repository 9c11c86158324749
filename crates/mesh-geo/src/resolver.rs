//! Address-to-location resolution with TTL caching
//!
//! The actual lookup is a network call behind [`GeoProvider`]; this module
//! wraps it in a `moka` cache so the hot path never repeats a lookup
//! within the TTL (default one hour).

use crate::GeoLocation;
use async_trait::async_trait;
use mesh_common::MeshError;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default cache TTL for resolved locations
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Pluggable IP-to-geolocation lookup
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Resolve an address to a location
    async fn lookup(&self, address: &str) -> Result<GeoLocation, MeshError>;
}

/// Provider backed by a fixed table; used for seeds and tests
#[derive(Debug, Default)]
pub struct StaticGeoProvider {
    entries: HashMap<String, GeoLocation>,
}

impl StaticGeoProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known address
    pub fn insert(&mut self, address: &str, location: GeoLocation) {
        self.entries.insert(address.to_string(), location);
    }
}

#[async_trait]
impl GeoProvider for StaticGeoProvider {
    async fn lookup(&self, address: &str) -> Result<GeoLocation, MeshError> {
        self.entries
            .get(address)
            .cloned()
            .ok_or_else(|| MeshError::Resolution {
                address: address.to_string(),
                reason: "address not in static table".to_string(),
            })
    }
}

/// TTL-caching resolver over a [`GeoProvider`]
pub struct GeoResolver {
    provider: Arc<dyn GeoProvider>,
    cache: Cache<String, GeoLocation>,
}

impl GeoResolver {
    /// Create a resolver with the default 1h TTL
    pub fn new(provider: Arc<dyn GeoProvider>) -> Self {
        Self::with_ttl(provider, DEFAULT_CACHE_TTL)
    }

    /// Create a resolver with a custom TTL
    pub fn with_ttl(provider: Arc<dyn GeoProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Resolve an address, hitting the cache first
    pub async fn resolve(&self, address: &str) -> Result<GeoLocation, MeshError> {
        if let Some(hit) = self.cache.get(address).await {
            return Ok(hit);
        }

        let location = self.provider.lookup(address).await?;
        self.cache
            .insert(address.to_string(), location.clone())
            .await;
        Ok(location)
    }

    /// Resolve, degrading to the unknown sentinel on failure
    ///
    /// Failures are logged, not propagated; a node without a location is
    /// still a valid mesh participant.
    pub async fn resolve_or_unknown(&self, address: &str) -> GeoLocation {
        match self.resolve(address).await {
            Ok(location) => location,
            Err(err) => {
                warn!(address, %err, "geolocation lookup failed, using unknown");
                GeoLocation::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with(address: &str, lat: f64, lon: f64) -> Arc<StaticGeoProvider> {
        let mut provider = StaticGeoProvider::new();
        provider.insert(address, GeoLocation::new(lat, lon).with_region("us-east"));
        Arc::new(provider)
    }

    #[tokio::test]
    async fn test_resolve_known_address() {
        let resolver = GeoResolver::new(provider_with("10.0.0.1", 40.7, -74.0));
        let location = resolver.resolve("10.0.0.1").await.unwrap();
        assert_eq!(location.region_label(), "us-east");
    }

    #[tokio::test]
    async fn test_resolve_failure_degrades_to_unknown() {
        let resolver = GeoResolver::new(Arc::new(StaticGeoProvider::new()));
        assert!(resolver.resolve("198.51.100.7").await.is_err());

        let location = resolver.resolve_or_unknown("198.51.100.7").await;
        assert!(location.is_unknown());
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_lookups() {
        let resolver = GeoResolver::new(provider_with("10.0.0.1", 40.7, -74.0));
        let first = resolver.resolve("10.0.0.1").await.unwrap();
        let second = resolver.resolve("10.0.0.1").await.unwrap();
        assert_eq!(first, second);
    }
}
