//! High-level processing helpers that chain the algorithms over events.

use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;
use rustpfa_core::{
    CartesianVector, Cluster, ClusterId, Event, EventRecord, Geometry, McParticleId, PseudoLayer,
    Result, TrackId,
};

use crate::{
    InwardClustering, InwardClusteringConfig, InwardClusteringStatistics, IsolatedHitMerging,
    IsolatedHitMergingConfig, IsolatedHitMergingStatistics, LoopingTrackAssociation,
    LoopingTrackAssociationConfig, LoopingTrackAssociationStatistics,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings of the whole reconstruction chain, loaded once per run.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PfaSettings {
    /// Inward clustering.
    pub inward_clustering: InwardClusteringConfig,
    /// Isolated hit merging.
    pub isolated_hit_merging: IsolatedHitMergingConfig,
    /// Looping track association.
    pub looping_track_association: LoopingTrackAssociationConfig,
}

impl PfaSettings {
    /// Checks every algorithm configuration.
    pub fn validate(&self) -> Result<()> {
        self.inward_clustering.validate()?;
        self.isolated_hit_merging.validate()?;
        self.looping_track_association.validate()
    }
}

/// Reconstructed cluster, flattened for output.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterSummary {
    /// Cluster id within the event.
    pub id: ClusterId,
    /// Layered hits.
    pub n_hits: usize,
    /// Isolated hits.
    pub n_isolated_hits: usize,
    /// Occupied layers.
    pub n_layers: usize,
    /// Innermost occupied layer.
    pub inner_layer: Option<PseudoLayer>,
    /// Outermost occupied layer.
    pub outer_layer: Option<PseudoLayer>,
    /// Hadronic energy.
    pub hadronic_energy: f32,
    /// Electromagnetic energy.
    pub electromagnetic_energy: f32,
    /// Fraction of possible-MIP layered hits.
    pub mip_fraction: f32,
    /// MIP-track flag.
    pub is_mip_track: bool,
    /// Direction of the latest successful fit.
    pub fit_direction: Option<CartesianVector>,
    /// Associated tracks.
    pub associated_tracks: Vec<TrackId>,
    /// Truth particle contributing the most hadronic energy.
    pub dominant_mc_particle: Option<McParticleId>,
}

impl ClusterSummary {
    fn new(cluster: &Cluster, event: &Event) -> Self {
        let fit = cluster.current_fit();
        Self {
            id: cluster.id(),
            n_hits: cluster.n_hits(),
            n_isolated_hits: cluster.n_isolated_hits(),
            n_layers: cluster.n_layers(),
            inner_layer: cluster.inner_layer(),
            outer_layer: cluster.outer_layer(),
            hadronic_energy: cluster.hadronic_energy(),
            electromagnetic_energy: cluster.electromagnetic_energy(),
            mip_fraction: cluster.mip_fraction(),
            is_mip_track: cluster.is_mip_track(),
            fit_direction: fit.is_successful.then_some(fit.direction),
            associated_tracks: cluster.associated_tracks().to_vec(),
            dominant_mc_particle: dominant_mc_particle(cluster, event),
        }
    }
}

fn dominant_mc_particle(cluster: &Cluster, event: &Event) -> Option<McParticleId> {
    let mut energies: BTreeMap<McParticleId, f32> = BTreeMap::new();
    for id in cluster.all_hits() {
        let hit = &event.hits()[id];
        if let Some(particle) = hit.mc_particle() {
            *energies.entry(particle).or_default() += hit.hadronic_energy();
        }
    }
    energies
        .into_iter()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .map(|(particle, _)| particle)
}

/// Outcome of the chain for one event.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReconstructionSummary {
    /// Calo hits in the event.
    pub n_calo_hits: usize,
    /// Tracks in the event.
    pub n_tracks: usize,
    /// Hits left outside every cluster.
    pub n_unclustered_hits: usize,
    /// Surviving clusters.
    pub clusters: Vec<ClusterSummary>,
    /// Track to cluster links.
    pub associations: Vec<(TrackId, ClusterId)>,
    /// Inward clustering counters.
    pub inward_clustering: InwardClusteringStatistics,
    /// Isolated hit merging counters, if the step ran.
    pub isolated_hit_merging: Option<IsolatedHitMergingStatistics>,
    /// Looping track association counters.
    pub looping_track_association: LoopingTrackAssociationStatistics,
}

/// Runs the reconstruction chain on one event.
pub fn reconstruct_event(
    event: &mut Event,
    geometry: &dyn Geometry,
    settings: &PfaSettings,
) -> Result<ReconstructionSummary> {
    settings.validate()?;

    let inward_clustering =
        InwardClustering::new(settings.inward_clustering.clone()).cluster(event, geometry)?;

    let isolated_hit_merging = if settings.isolated_hit_merging.enabled {
        Some(IsolatedHitMerging::new(settings.isolated_hit_merging.clone()).merge(event)?)
    } else {
        None
    };

    let looping_track_association =
        LoopingTrackAssociation::new(settings.looping_track_association.clone())
            .associate(event, geometry)?;

    event.check_consistency()?;

    let store = event.hits();
    let n_unclustered_hits = store.ids().filter(|&id| store.is_available(id)).count();
    let clusters: Vec<ClusterSummary> = event
        .clusters()
        .map(|cluster| ClusterSummary::new(cluster, event))
        .collect();
    let associations = event
        .tracks()
        .iter()
        .filter_map(|track| track.associated_cluster().map(|cluster| (track.id(), cluster)))
        .collect();

    debug!(
        "event reconstructed: {} clusters, {} unclustered hits",
        clusters.len(),
        n_unclustered_hits
    );

    Ok(ReconstructionSummary {
        n_calo_hits: store.len(),
        n_tracks: event.tracks().len(),
        n_unclustered_hits,
        clusters,
        associations,
        inward_clustering,
        isolated_hit_merging,
        looping_track_association,
    })
}

/// Runs the chain on independent events in parallel.
///
/// Results are returned in input order; a failing event does not affect
/// the others.
pub fn reconstruct_events(
    records: &[EventRecord],
    geometry: &(dyn Geometry + Sync),
    settings: &PfaSettings,
) -> Vec<Result<ReconstructionSummary>> {
    records
        .par_iter()
        .enumerate()
        .map(|(index, record)| {
            let result = Event::from_record(record)
                .and_then(|mut event| reconstruct_event(&mut event, geometry, settings));
            if let Err(err) = &result {
                warn!("event {index} failed: {err}");
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpfa_core::{CaloHitParameters, DetectorGeometry, Error, SubDetector, SubDetectorParameters};

    fn geometry() -> DetectorGeometry {
        DetectorGeometry::default().with_sub_detector(
            SubDetector::ECalEndCap,
            SubDetectorParameters {
                inner_z: 2400.0,
                ..Default::default()
            },
        )
    }

    fn record(n_hits: u32) -> EventRecord {
        EventRecord {
            calo_hits: (1..=n_hits)
                .map(|layer| CaloHitParameters {
                    position: CartesianVector::new(0.0, 0.0, 2000.0 + 5.0 * layer as f32),
                    expected_direction: Some(CartesianVector::new(0.0, 0.0, 1.0)),
                    cell_normal: CartesianVector::new(0.0, 0.0, 1.0),
                    cell_size_u: 10.0,
                    cell_size_v: 10.0,
                    hadronic_energy: 0.5,
                    pseudo_layer: Some(layer),
                    mc_particle: Some(McParticleId(7)),
                    ..Default::default()
                })
                .collect(),
            tracks: Vec::new(),
        }
    }

    #[test]
    fn test_reconstruct_event_summary() {
        let mut event = Event::from_record(&record(6)).unwrap();
        let summary = reconstruct_event(&mut event, &geometry(), &PfaSettings::default()).unwrap();

        assert_eq!(summary.n_calo_hits, 6);
        assert_eq!(summary.n_unclustered_hits, 0);
        assert_eq!(summary.clusters.len(), 1);
        let cluster = &summary.clusters[0];
        assert_eq!(cluster.n_hits, 6);
        assert_eq!(cluster.inner_layer, Some(1));
        assert_eq!(cluster.dominant_mc_particle, Some(McParticleId(7)));
        assert!(summary.associations.is_empty());
        assert_eq!(summary.isolated_hit_merging.map(|s| s.clusters_dissolved), Some(0));
    }

    #[test]
    fn test_batch_reports_failures_per_event() {
        let mut invalid = record(2);
        invalid.calo_hits[0].pseudo_layer = None;
        let records = vec![record(5), invalid, record(4)];

        let results = reconstruct_events(&records, &geometry(), &PfaSettings::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().clusters.len(), 1);
        assert!(matches!(results[1], Err(Error::PseudoLayerNotSet(_))));
        assert_eq!(results[2].as_ref().unwrap().n_calo_hits, 4);
    }

    #[test]
    fn test_missing_endcap_is_a_configuration_error() {
        let mut event = Event::from_record(&record(3)).unwrap();
        let err = reconstruct_event(&mut event, &DetectorGeometry::default(), &PfaSettings::default())
            .unwrap_err();
        assert_eq!(err, Error::MissingSubDetector(SubDetector::ECalEndCap));
        assert!(err.is_configuration());
    }
}
