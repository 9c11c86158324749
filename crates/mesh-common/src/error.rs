//! Error types for OpenMesh

use thiserror::Error;

/// OpenMesh error type
///
/// Only `NoAvailableNode` and `Configuration` surface to callers of the
/// public routing/discovery API; the rest degrade in place and are logged
/// where they occur.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Geolocation lookup failed; caller degrades to the unknown location
    #[error("geolocation lookup failed for {address}: {reason}")]
    Resolution {
        /// Address that failed to resolve
        address: String,
        /// Provider-reported reason
        reason: String,
    },

    /// Probe did not complete within its deadline; recorded as unreachable
    #[error("probe timed out for node {0}")]
    ProbeTimeout(String),

    /// No eligible node for a routing request
    #[error("no available node for request")]
    NoAvailableNode,

    /// Too little history for a confident estimate
    #[error("insufficient history: have {have} samples, need {need}")]
    InsufficientHistory {
        /// Samples available
        have: usize,
        /// Samples required
        need: usize,
    },

    /// Invalid configuration; fatal at startup
    #[error("config error: {0}")]
    Configuration(String),
}

/// Result type for OpenMesh
pub type MeshResult<T> = Result<T, MeshError>;

impl MeshError {
    /// Whether this error must propagate to the caller rather than be
    /// absorbed by a worker loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MeshError::NoAvailableNode | MeshError::Configuration(_)
        )
    }
}
