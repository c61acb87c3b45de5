//! rustpfa-core: Object model for particle-flow calorimeter reconstruction.
//!
//! This crate provides the calo hit arena, layer-ordered hit lists,
//! clusters with cached properties, tracks, direction fitting, the geometry
//! collaborator and the per-event working set the algorithms operate on.
//!

pub mod cluster;
pub mod distance;
pub mod error;
pub mod event;
pub mod fit;
pub mod geometry;
pub mod hit;
pub mod ordered;
pub mod track;
pub mod vector;

pub use cluster::{Cluster, ClusterId, ClusterProperties};
pub use distance::Distance;
pub use error::{Error, Result};
pub use event::{Event, EventRecord};
pub use fit::{fit_layer_centroids, fit_points, fit_start, ClusterFitPoint, ClusterFitResult};
pub use geometry::{DetectorGeometry, Geometry, Granularity, SubDetector, SubDetectorParameters};
pub use hit::{
    CaloHit, CaloHitId, CaloHitParameters, CaloHitStore, DetectorRegion, HitType, McParticleId,
    PseudoLayer,
};
pub use ordered::OrderedCaloHitList;
pub use track::{Helix, Track, TrackId, TrackParameters, TrackState};
pub use vector::CartesianVector;
