//! Mesh node registry
//!
//! In-memory catalog of known nodes keyed by id. Entries are replaced
//! whole on write (arc-swap) so concurrent readers always see a
//! consistent node; enumeration returns point-in-time snapshots, never a
//! live view. Periodic workers drive sampling and heartbeat sweeps off
//! the request path.

#![warn(missing_docs)]

pub mod node;
pub mod registry;
pub mod sampler;

pub use node::{MeshNode, NodeCapabilities};
pub use registry::{NodeRegistry, RegistryConfig, StrainThresholds, TopologySummary};
pub use sampler::{HealthSweepWorker, SamplerWorker};
