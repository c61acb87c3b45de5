//! End-to-end checks of inward clustering on small synthetic events.

use std::collections::HashSet;

use rustpfa_algorithms::{
    ClusterFormationStrategy, HitSortingStrategy, InwardClustering, InwardClusteringConfig,
};
use rustpfa_core::{
    CaloHit, CaloHitId, CaloHitParameters, CaloHitStore, CartesianVector, DetectorGeometry, Error,
    Event, PseudoLayer,
};

const LAYER_SPACING: f32 = 5.0;

fn hit(x: f32, layer: PseudoLayer, energy: f32, cell_size: f32) -> CaloHit {
    CaloHit::new(&CaloHitParameters {
        position: CartesianVector::new(x, 0.0, 2000.0 + LAYER_SPACING * layer as f32),
        expected_direction: Some(CartesianVector::new(0.0, 0.0, 1.0)),
        cell_normal: CartesianVector::new(0.0, 0.0, 1.0),
        cell_size_u: cell_size,
        cell_size_v: cell_size,
        hadronic_energy: energy,
        input_energy: energy,
        pseudo_layer: Some(layer),
        ..Default::default()
    })
}

fn event(hits: Vec<CaloHit>) -> Event {
    Event::new(hits.into_iter().collect::<CaloHitStore>(), &[]).unwrap()
}

/// Two straight tracks 200 mm apart plus a few hits in between.
fn two_track_event() -> Event {
    let mut hits: Vec<CaloHit> = Vec::new();
    for layer in 1..=15 {
        hits.push(hit(0.0, layer, 1.0, 10.0));
        hits.push(hit(200.0, layer, 2.0, 10.0));
    }
    hits.push(hit(100.0, 4, 0.3, 10.0));
    hits.push(hit(102.0, 4, 0.2, 10.0));
    event(hits)
}

fn run(config: InwardClusteringConfig, event: &mut Event) {
    InwardClustering::new(config)
        .cluster(event, &DetectorGeometry::default())
        .unwrap();
}

#[test]
fn test_every_hit_has_one_owner() {
    let mut event = two_track_event();
    run(InwardClusteringConfig::default(), &mut event);

    let mut seen = HashSet::new();
    for cluster in event.clusters() {
        for hit in cluster.all_hits() {
            assert!(seen.insert(hit), "{hit} appears in two clusters");
            assert_eq!(event.hits().owner(hit), Some(cluster.id()));
        }
    }
    assert_eq!(seen.len(), event.hits().len());
    event.check_consistency().unwrap();
}

#[test]
fn test_cluster_hits_sit_in_their_pseudo_layer() {
    let mut event = two_track_event();
    run(InwardClusteringConfig::default(), &mut event);

    for cluster in event.clusters() {
        let layers: Vec<PseudoLayer> = cluster.ordered_hits().iter().map(|(layer, _)| layer).collect();
        assert!(layers.windows(2).all(|pair| pair[0] < pair[1]));
        for (layer, hits) in cluster.ordered_hits().iter() {
            for &id in hits {
                assert_eq!(event.hits()[id].pseudo_layer(), Some(layer));
            }
        }
    }
}

#[test]
fn test_separated_tracks_form_separate_clusters() {
    let mut event = two_track_event();
    run(InwardClusteringConfig::default(), &mut event);

    // Two tracks and one cluster for the pair of nearby stray hits.
    assert_eq!(event.n_clusters(), 3);
    let mut sizes: Vec<usize> = event.clusters().map(|c| c.n_hits()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 15, 15]);
}

#[test]
fn test_same_layer_hits_join_the_seed() {
    // A single layer: the first hit seeds, its neighbours are absorbed.
    let mut event = event(vec![
        hit(0.0, 3, 2.0, 10.0),
        hit(20.0, 3, 1.0, 10.0),
        hit(40.0, 3, 0.5, 10.0),
        hit(500.0, 3, 0.5, 10.0),
    ]);
    let stats = InwardClustering::new(InwardClusteringConfig::default())
        .cluster(&mut event, &DetectorGeometry::default())
        .unwrap();

    assert_eq!(stats.clusters_created, 2);
    assert_eq!(stats.hits_added_in_same_layer, 2);
    let owner = event.hits().owner(CaloHitId(0));
    assert_eq!(event.hits().owner(CaloHitId(1)), owner);
    assert_eq!(event.hits().owner(CaloHitId(2)), owner);
    assert_ne!(event.hits().owner(CaloHitId(3)), owner);
}

#[test]
fn test_equal_distances_prefer_the_more_energetic_cluster() {
    // The two seeds are farther apart than the same-layer cutoff, and the
    // inner hit lies exactly between them.
    let mut event = event(vec![
        hit(-15.0, 2, 1.0, 10.0),
        hit(15.0, 2, 3.0, 10.0),
        hit(0.0, 1, 0.5, 10.0),
    ]);
    let config =
        InwardClusteringConfig::default().with_hit_sorting_strategy(HitSortingStrategy::Insertion);
    run(config, &mut event);

    assert_eq!(event.n_clusters(), 2);
    assert_eq!(event.hits().owner(CaloHitId(2)), event.hits().owner(CaloHitId(1)));
}

#[test]
fn test_best_overall_strategy_matches_on_a_track() {
    let hits = (1..=8).map(|layer| hit(0.0, layer, 1.0, 10.0)).collect();
    let mut event = event(hits);
    let config = InwardClusteringConfig::default()
        .with_cluster_formation_strategy(ClusterFormationStrategy::BestOverall);
    run(config, &mut event);

    assert_eq!(event.n_clusters(), 1);
    assert_eq!(event.clusters().next().unwrap().n_hits(), 8);
}

#[test]
fn test_cleanup_is_idempotent() {
    let mut event = two_track_event();
    run(InwardClusteringConfig::default(), &mut event);

    let ids = event.cluster_ids();
    assert_eq!(event.remove_empty_clusters(&ids).unwrap(), 0);
    assert_eq!(event.remove_empty_clusters(&ids).unwrap(), 0);
    assert_eq!(event.cluster_ids(), ids);
}

#[test]
fn test_second_pass_only_sees_unclustered_hits() {
    let mut event = two_track_event();
    run(InwardClusteringConfig::default(), &mut event);
    let n_clusters = event.n_clusters();

    let stats = InwardClustering::new(InwardClusteringConfig::default())
        .cluster(&mut event, &DetectorGeometry::default())
        .unwrap();
    assert_eq!(stats.clusters_created, 0);
    assert_eq!(event.n_clusters(), n_clusters);
}

#[test]
fn test_zero_sized_cells_are_a_configuration_error() {
    let mut event = event(vec![hit(0.0, 1, 1.0, 0.0), hit(5.0, 1, 0.5, 0.0)]);
    let err = InwardClustering::new(InwardClusteringConfig::default())
        .cluster(&mut event, &DetectorGeometry::default())
        .unwrap_err();
    assert_eq!(err, Error::ZeroDistanceCut(CaloHitId(1)));
    assert!(err.is_configuration());
}

#[test]
fn test_hits_without_pseudo_layer_are_rejected() {
    let params = CaloHitParameters {
        cell_size_u: 10.0,
        cell_size_v: 10.0,
        pseudo_layer: None,
        ..Default::default()
    };
    let mut event = event(vec![CaloHit::new(&params)]);
    let err = InwardClustering::new(InwardClusteringConfig::default())
        .cluster(&mut event, &DetectorGeometry::default())
        .unwrap_err();
    assert_eq!(err, Error::PseudoLayerNotSet(CaloHitId(0)));
}
