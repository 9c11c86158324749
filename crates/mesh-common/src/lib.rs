//! OpenMesh Common - Shared types for the mesh discovery core
//!
//! This crate provides the primitives shared by every other crate in the
//! workspace:
//! - Node identity and health states
//! - Metric kind tags for time-series samples
//! - Error taxonomy
//! - Seed-list configuration

#![warn(missing_docs)]

pub mod error;
pub mod seeds;

pub use error::*;
pub use seeds::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Health state of a mesh node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeHealth {
    /// Responding to heartbeats, serving traffic
    Active,
    /// Responding but under sustained strain; excluded from routing
    Degraded,
    /// Missed too many heartbeats; retained for audit, excluded from scoring
    Unreachable,
}

impl NodeHealth {
    /// Whether this node may appear in candidate scoring
    #[inline]
    pub fn is_scorable(&self) -> bool {
        !matches!(self, NodeHealth::Unreachable)
    }

    /// Whether this node may receive routed traffic
    #[inline]
    pub fn is_routable(&self) -> bool {
        matches!(self, NodeHealth::Active)
    }
}

/// Role a node advertises to the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Forwards traffic between peers
    Relay,
    /// Persists replicated data
    Storage,
    /// Executes distributed work
    Compute,
    /// Bridges to external networks
    Gateway,
    /// Recommended entry point for joining nodes
    Bootstrap,
}

/// Metric dimension tag for performance samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Round-trip latency in milliseconds
    Latency,
    /// Throughput in Mbps
    Bandwidth,
    /// Packet loss percentage
    PacketLoss,
    /// CPU load percentage
    CpuLoad,
    /// Memory load percentage
    MemoryLoad,
    /// Connection load ratio (0-1)
    ConnectionLoad,
    /// Composite quality score (0-1)
    Quality,
}

/// Clamp a score into the unit interval
#[inline(always)]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
