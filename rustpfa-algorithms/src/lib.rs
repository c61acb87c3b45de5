//! rustpfa-algorithms: Particle flow pattern recognition.
//!
//! This crate provides the reconstruction steps that run on an event:
//! - **Inward clustering** - layer-by-layer growth from the outside in
//! - **Isolated hit merging** - folds stray hits into nearby clusters
//! - **Looping track association** - matches curling tracks to endcap clusters
//!
//! The hit-to-cluster distance measures shared by these steps live in
//! [`DistanceEngine`].
//!
#![warn(missing_docs)]

pub mod distance;
mod inward;
mod isolated;
mod looping;
mod processing;

pub use distance::{DistanceConfig, DistanceEngine};
pub use inward::{
    ClusterFormationStrategy, HitSortingStrategy, InwardClustering, InwardClusteringConfig,
    InwardClusteringStatistics,
};
pub use isolated::{IsolatedHitMerging, IsolatedHitMergingConfig, IsolatedHitMergingStatistics};
pub use looping::{
    LoopingTrackAssociation, LoopingTrackAssociationConfig, LoopingTrackAssociationStatistics,
};
pub use processing::{
    reconstruct_event, reconstruct_events, ClusterSummary, PfaSettings, ReconstructionSummary,
};
