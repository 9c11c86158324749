//! Probe abstraction
//!
//! Real transport is pluggable; the collector only needs something that
//! can produce a reading or fail. [`StaticProber`] backs tests and
//! simulation with scripted readings.

use async_trait::async_trait;
use mesh_common::MeshError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// One successful probe observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    /// Round-trip latency in milliseconds
    pub latency_ms: f64,
    /// Measured throughput in Mbps
    pub bandwidth_mbps: f64,
    /// Uptime the node reports for itself (0-100)
    pub uptime_pct: f64,
    /// CPU load the node reports (0-100)
    pub cpu_load_pct: f64,
    /// Memory load the node reports (0-100)
    pub memory_load_pct: f64,
}

/// Round-trip prober for a node endpoint
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe an endpoint once
    ///
    /// Implementations perform the round trip and timed transfer; the
    /// collector owns the deadline, so a prober may block indefinitely.
    async fn probe(&self, address: &str, port: u16) -> Result<ProbeReading, MeshError>;
}

/// Scripted prober keyed by address
///
/// Endpoints not in the table fail, which the collector records as an
/// unreachable sample.
#[derive(Default)]
pub struct StaticProber {
    readings: RwLock<HashMap<String, ProbeReading>>,
}

impl StaticProber {
    /// Create an empty prober
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reading returned for an address
    pub fn set(&self, address: &str, reading: ProbeReading) {
        self.readings
            .write()
            .insert(address.to_string(), reading);
    }

    /// Remove an address so subsequent probes fail
    pub fn remove(&self, address: &str) {
        self.readings.write().remove(address);
    }
}

#[async_trait]
impl Prober for StaticProber {
    async fn probe(&self, address: &str, _port: u16) -> Result<ProbeReading, MeshError> {
        self.readings
            .read()
            .get(address)
            .copied()
            .ok_or_else(|| MeshError::ProbeTimeout(address.to_string()))
    }
}
