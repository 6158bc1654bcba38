//! Error types for the placement subsystem.
//!
//! Only misconfiguration and collaborator failures are errors. Degraded chunk
//! states (missing fragments, nothing valid to allocate on) are reported via
//! [`crate::chunk_status::ChunkStatus`] instead.

use thiserror::Error;

/// Result type alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Error variants for placement operations.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The tiering policy does not carry exactly one tier.
    #[error("Tiering policy must have exactly one tier and not {tiers}")]
    MultiTierUnsupported {
        /// Number of tiers found on the policy.
        tiers: usize,
    },

    /// The tier has no mirrors to place blocks on.
    #[error("Tier {tier} has no mirrors")]
    NoMirrors {
        /// Name of the tier.
        tier: String,
    },

    /// A mirror has an empty spread pool list.
    #[error("There are no pools in tier spread_pools")]
    EmptySpreadPools,

    /// Parts handed to a consecutive lookup leave a gap or overlap.
    #[error("Expected parts to be consecutive: expected start {expected}, found {found}")]
    NonConsecutiveParts {
        /// Offset the next part should have started at.
        expected: u64,
        /// Offset the part actually started at.
        found: u64,
    },

    /// Parts handed to a consecutive lookup come from different uploads.
    #[error("Expected parts to have same upload_part_number: expected {expected}, found {found}")]
    MixedUploadPartNumber {
        /// Upload part number of the first part.
        expected: u32,
        /// Differing upload part number.
        found: u32,
    },

    /// A consecutive lookup was asked for with no parts.
    #[error("Empty part list")]
    EmptyPartList,

    /// Invalid placement configuration.
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// Failure reported by a metadata store implementation.
    #[error("Metadata store error: {reason}")]
    Store {
        /// Description of the failure.
        reason: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
