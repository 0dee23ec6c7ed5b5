//! Synchronization configuration
//!
//! Tunables for the octree sizing policy, the per-frame environment map
//! update budget and the reference-position revalidation distance. Values
//! load from TOML and default to the engine's shipping configuration.

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

/// Configuration for the synchronization core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum octree insertion depth regardless of world size
    pub octree_min_depth: u32,

    /// Bias applied to `ceil(log2(max_world_extent))` when deriving the
    /// octree insertion depth; for a 1 km world the default yields depth 8
    /// (smallest node roughly 4 m)
    pub octree_depth_bias: i32,

    /// Number of environment maps allowed to update per prepared frame
    pub env_map_update_budget: u32,

    /// Cube-face resolution of environment maps in pixels
    pub env_map_size: u32,

    /// Distance in meters a camera may stray from the world reference
    /// position before the reference is re-centered
    pub valid_reference_distance: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            octree_min_depth: 4,
            octree_depth_bias: -2,
            env_map_update_budget: 1,
            env_map_size: 128,
            valid_reference_distance: 1e4, // 10km
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, SceneError> {
        let config: Self =
            toml::from_str(source).map_err(|e| SceneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML document
    pub fn to_toml_string(&self) -> Result<String, SceneError> {
        toml::to_string(self).map_err(|e| SceneError::Config(e.to_string()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.valid_reference_distance < 1e4 {
            return Err(SceneError::Config(format!(
                "valid_reference_distance must be at least 10000, got {}",
                self.valid_reference_distance
            )));
        }
        if self.octree_min_depth == 0 {
            return Err(SceneError::Config(
                "octree_min_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig {
            env_map_update_budget: 4,
            ..SyncConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        let parsed = SyncConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.env_map_update_budget, 4);
        assert_eq!(parsed.octree_min_depth, config.octree_min_depth);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = SyncConfig::from_toml_str("env_map_update_budget = 2\n").unwrap();
        assert_eq!(parsed.env_map_update_budget, 2);
        assert_eq!(parsed.octree_min_depth, 4);
    }

    #[test]
    fn test_reference_distance_floor_rejected() {
        let result = SyncConfig::from_toml_str("valid_reference_distance = 10.0\n");
        assert!(result.is_err());
    }
}
