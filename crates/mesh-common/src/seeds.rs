//! Bootstrap seed-list configuration
//!
//! The membership layer hands the discovery core an initial list of
//! addresses to probe and register. This is the only configuration the
//! core consumes from outside; component tuning lives with each component.

use crate::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};

/// A single seed entry from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedNode {
    /// Address (hostname or IP)
    pub address: String,
    /// Port
    pub port: u16,
}

/// Seed list consumed at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedList {
    /// Entry-point addresses for the initial join
    pub seeds: Vec<SeedNode>,
}

impl SeedList {
    /// Validate the seed list; fails fast on malformed entries
    pub fn validate(&self) -> MeshResult<()> {
        for seed in &self.seeds {
            if seed.address.is_empty() {
                return Err(MeshError::Configuration("empty seed address".into()));
            }
            if seed.port == 0 {
                return Err(MeshError::Configuration(format!(
                    "seed {} has port 0",
                    seed.address
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_seed_list() {
        let list = SeedList {
            seeds: vec![SeedNode {
                address: "seed-1.mesh.example".into(),
                port: 7700,
            }],
        };
        assert!(list.validate().is_ok());
    }

    #[test]
    fn test_rejects_port_zero() {
        let list = SeedList {
            seeds: vec![SeedNode {
                address: "seed-1.mesh.example".into(),
                port: 0,
            }],
        };
        assert!(list.validate().is_err());
    }
}
