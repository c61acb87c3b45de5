//! Error types for rustpfa-core.

use thiserror::Error;

use crate::cluster::ClusterId;
use crate::geometry::SubDetector;
use crate::hit::{CaloHitId, PseudoLayer};
use crate::track::TrackId;

/// Result type alias for rustpfa operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for rustpfa operations.
///
/// "No geometric relationship found" is deliberately absent: distance
/// searches report that as [`crate::Distance::NotApplicable`] inside `Ok`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Unknown calo hit handle.
    #[error("invalid calo hit handle: {0}")]
    InvalidCaloHit(CaloHitId),

    /// Unknown or deleted cluster handle.
    #[error("invalid cluster handle: {0}")]
    InvalidCluster(ClusterId),

    /// Unknown track handle.
    #[error("invalid track handle: {0}")]
    InvalidTrack(TrackId),

    /// The hit has not been assigned a pseudo-layer.
    #[error("pseudo-layer not set for calo hit {0}")]
    PseudoLayerNotSet(CaloHitId),

    /// Pseudo-layers are assigned once.
    #[error("pseudo-layer already set for calo hit {0}")]
    PseudoLayerAlreadySet(CaloHitId),

    /// The hit is already owned by a cluster.
    #[error("calo hit {hit} is not available (owned by cluster {owner})")]
    HitNotAvailable { hit: CaloHitId, owner: ClusterId },

    /// The hit is already stored in a layer bucket.
    #[error("calo hit {hit} already present in pseudo-layer {layer}")]
    AlreadyPresent { hit: CaloHitId, layer: PseudoLayer },

    /// The hit is not stored in the given layer bucket.
    #[error("calo hit {hit} not found in pseudo-layer {layer}")]
    NotPresent { hit: CaloHitId, layer: PseudoLayer },

    /// Track already carries a cluster association.
    #[error("track {track} is already associated with cluster {cluster}")]
    TrackAlreadyAssociated { track: TrackId, cluster: ClusterId },

    /// A distance cutoff evaluated to zero (granularity misconfiguration).
    #[error("distance cutoff evaluated to zero for calo hit {0}")]
    ZeroDistanceCut(CaloHitId),

    /// The geometry does not describe a required sub-detector.
    #[error("geometry has no parameters for {0}")]
    MissingSubDetector(SubDetector),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A cached quantity disagrees with the underlying data.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A computation received input it cannot work with.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
}

impl Error {
    /// Returns true for configuration errors (fatal for the invocation).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ZeroDistanceCut(_) | Self::MissingSubDetector(_) | Self::ConfigError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::HitNotAvailable {
            hit: CaloHitId(3),
            owner: ClusterId(1),
        };
        assert_eq!(
            err.to_string(),
            "calo hit hit#3 is not available (owned by cluster cluster#1)"
        );
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::ZeroDistanceCut(CaloHitId(0)).is_configuration());
        assert!(Error::MissingSubDetector(SubDetector::ECalEndCap).is_configuration());
        assert!(!Error::InvariantViolation("x".into()).is_configuration());
        assert!(!Error::DegenerateInput("x".into()).is_configuration());
    }
}
