//! Placement engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PlacementError, PlacementResult};

/// Weights used to rank a tier's mirrors for upload-time allocation.
///
/// Lower is better. A mirror's score is the sum of its pools' weights divided
/// by the number of pools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorWeights {
    /// Added for every pool that is not currently valid for allocation.
    pub non_writable_pool: u32,
    /// Added for every on-premise pool.
    pub on_premise_pool: u32,
    /// Added for every cloud pool.
    pub cloud_pool: u32,
}

impl Default for MirrorWeights {
    fn default() -> Self {
        Self {
            non_writable_pool: 10,
            on_premise_pool: 1,
            cloud_pool: 2,
        }
    }
}

/// Configuration for the chunk status evaluator and the special-content classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Content types whose boundary parts get extra replicas.
    pub special_content_types: Vec<String>,
    /// Multiplier applied to `tier.replicas` for special chunks.
    pub special_replica_multiplier: u32,
    /// Mirror preference weights for upload allocation.
    pub mirror_weights: MirrorWeights,
    /// Replica weight of one block on an on-premise node.
    pub on_premise_block_weight: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            special_content_types: vec!["video/mp4".to_string(), "video/webm".to_string()],
            special_replica_multiplier: 2,
            mirror_weights: MirrorWeights::default(),
            on_premise_block_weight: 1,
        }
    }
}

impl PlacementConfig {
    /// Loads a configuration from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> PlacementResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: PlacementConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(PlacementError::Config {
                    reason: format!("unsupported config file extension: {}", ext),
                })
            }
        };

        config.validate()?;
        info!(path = %path.display(), "Loaded placement config");
        Ok(config)
    }

    /// Rejects values that would make replica math degenerate.
    pub fn validate(&self) -> PlacementResult<()> {
        if self.special_replica_multiplier == 0 {
            return Err(PlacementError::Config {
                reason: "special_replica_multiplier must be at least 1".to_string(),
            });
        }
        if self.on_premise_block_weight == 0 {
            return Err(PlacementError::Config {
                reason: "on_premise_block_weight must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let config = PlacementConfig::default();
        assert_eq!(config.special_content_types, vec!["video/mp4", "video/webm"]);
        assert_eq!(config.special_replica_multiplier, 2);
        assert_eq!(config.mirror_weights.non_writable_pool, 10);
        assert_eq!(config.mirror_weights.on_premise_pool, 1);
        assert_eq!(config.mirror_weights.cloud_pool, 2);
        assert_eq!(config.on_premise_block_weight, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{
                "special_content_types": ["video/mp4", "audio/ogg"],
                "special_replica_multiplier": 3
            }}"#
        )
        .unwrap();

        let config = PlacementConfig::from_file(file.path()).unwrap();
        assert_eq!(config.special_content_types, vec!["video/mp4", "audio/ogg"]);
        assert_eq!(config.special_replica_multiplier, 3);
        assert_eq!(config.mirror_weights, MirrorWeights::default());
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
special_replica_multiplier = 4
on_premise_block_weight = 1

[mirror_weights]
non_writable_pool = 20
cloud_pool = 5
"#
        )
        .unwrap();

        let config = PlacementConfig::from_file(file.path()).unwrap();
        assert_eq!(config.special_replica_multiplier, 4);
        assert_eq!(config.mirror_weights.non_writable_pool, 20);
        assert_eq!(config.mirror_weights.on_premise_pool, 1);
        assert_eq!(config.mirror_weights.cloud_pool, 5);
        assert_eq!(config.special_content_types.len(), 2);
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "special_replica_multiplier: 2").unwrap();

        let err = PlacementConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, PlacementError::Config { .. }));
    }

    #[test]
    fn test_from_file_rejects_zero_multiplier() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "special_replica_multiplier = 0").unwrap();

        let err = PlacementConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{}", err).contains("special_replica_multiplier"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = PlacementConfig::from_file(Path::new("/nonexistent/placement.toml")).unwrap_err();
        assert!(matches!(err, PlacementError::Io(_)));
    }
}
