//! Looping track association against an endcap geometry.

use std::f32::consts::FRAC_PI_2;

use rustpfa_algorithms::{
    reconstruct_event, LoopingTrackAssociation, LoopingTrackAssociationConfig, PfaSettings,
};
use rustpfa_core::{
    CaloHit, CaloHitId, CaloHitParameters, CaloHitStore, CartesianVector, ClusterId,
    DetectorGeometry, Error, Event, Helix, SubDetector, SubDetectorParameters, TrackId,
    TrackParameters, TrackState,
};

const ENDCAP_Z: f32 = 2400.0;

fn geometry() -> DetectorGeometry {
    DetectorGeometry::default().with_sub_detector(
        SubDetector::ECalEndCap,
        SubDetectorParameters {
            inner_r: 300.0,
            inner_z: ENDCAP_Z,
            outer_r: 1800.0,
            outer_z: 2600.0,
            inner_symmetry: 8,
            outer_symmetry: 8,
        },
    )
}

fn hit(x: f32, y: f32, layer: u32, energy: f32) -> CaloHit {
    CaloHit::new(&CaloHitParameters {
        position: CartesianVector::new(x, y, ENDCAP_Z + 5.0 * layer as f32),
        expected_direction: Some(CartesianVector::new(0.0, 0.0, 1.0)),
        cell_normal: CartesianVector::new(0.0, 0.0, 1.0),
        cell_size_u: 10.0,
        cell_size_v: 10.0,
        hadronic_energy: energy,
        input_energy: energy,
        pseudo_layer: Some(layer),
        ..Default::default()
    })
}

/// Circle of radius 500 mm centred on (500, 0), steep dip angle.
fn looping_track(energy: f32) -> TrackParameters {
    TrackParameters {
        energy_at_dca: energy,
        helix_at_ecal: Helix {
            omega: 0.002,
            phi0: FRAC_PI_2,
            tan_lambda: 10.0,
            ..Default::default()
        },
        state_at_ecal: TrackState {
            position: CartesianVector::new(1000.0, 0.0, ENDCAP_Z),
            momentum: CartesianVector::new(0.0, -0.1, 1.0),
        },
        ..Default::default()
    }
}

/// One cluster sitting on the helix circle and one far off it.
fn event(tracks: &[TrackParameters]) -> (Event, ClusterId, ClusterId) {
    let mut hits: Vec<CaloHit> = (1..=6).map(|layer| hit(1000.0, 0.0, layer, 1.0)).collect();
    hits.extend((1..=6).map(|layer| hit(-600.0, 800.0, layer, 1.0)));
    let mut event = Event::new(hits.into_iter().collect::<CaloHitStore>(), tracks).unwrap();

    let on_circle = event.create_cluster(CaloHitId(0)).unwrap();
    for id in 1..6 {
        event.add_hit_to_cluster(on_circle, CaloHitId(id)).unwrap();
    }
    let off_circle = event.create_cluster(CaloHitId(6)).unwrap();
    for id in 7..12 {
        event.add_hit_to_cluster(off_circle, CaloHitId(id)).unwrap();
    }
    (event, on_circle, off_circle)
}

#[test]
fn test_track_joins_the_cluster_on_its_helix() {
    let (mut event, on_circle, off_circle) = event(&[looping_track(6.0)]);
    let stats = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &geometry())
        .unwrap();

    assert_eq!(stats.tracks_considered, 1);
    assert_eq!(stats.associations, 1);
    assert_eq!(event.track(TrackId(0)).unwrap().associated_cluster(), Some(on_circle));
    assert_eq!(event.cluster(on_circle).unwrap().associated_tracks(), &[TrackId(0)]);
    assert!(event.cluster(off_circle).unwrap().associated_tracks().is_empty());
    event.check_consistency().unwrap();
}

#[test]
fn test_incompatible_energy_blocks_the_match() {
    let (mut event, _, _) = event(&[looping_track(40.0)]);
    let stats = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &geometry())
        .unwrap();

    assert_eq!(stats.tracks_considered, 1);
    assert_eq!(stats.associations, 0);
    assert!(!event.track(TrackId(0)).unwrap().has_associated_cluster());
}

#[test]
fn test_each_cluster_takes_one_track() {
    // Both tracks fit the same cluster; the more energetic one goes first.
    let (mut event, on_circle, _) = event(&[looping_track(5.5), looping_track(6.0)]);
    let stats = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &geometry())
        .unwrap();

    assert_eq!(stats.associations, 1);
    assert_eq!(event.track(TrackId(1)).unwrap().associated_cluster(), Some(on_circle));
    assert!(!event.track(TrackId(0)).unwrap().has_associated_cluster());
}

#[test]
fn test_straight_track_is_skipped_without_error() {
    let mut track = looping_track(6.0);
    track.helix_at_ecal.omega = 0.0;
    let (mut event, _, _) = event(&[track]);
    let stats = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &geometry())
        .unwrap();

    assert_eq!(stats.straight_tracks_skipped, 1);
    assert_eq!(stats.tracks_considered, 0);
    assert_eq!(stats.associations, 0);
}

#[test]
fn test_barrel_tracks_are_ignored() {
    let mut track = looping_track(6.0);
    track.state_at_ecal.position.z = 1200.0;
    let (mut event, _, _) = event(&[track]);
    let stats = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &geometry())
        .unwrap();

    assert_eq!(stats.tracks_considered, 0);
    assert_eq!(stats.associations, 0);
}

#[test]
fn test_tracks_with_daughters_are_ignored() {
    let mut parent = looping_track(6.0);
    parent.daughters = vec![TrackId(1)];
    let mut daughter = looping_track(2.0);
    daughter.can_form_pfo = false;
    let (mut event, _, _) = event(&[parent, daughter]);
    let stats = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &geometry())
        .unwrap();

    assert_eq!(stats.tracks_considered, 0);
    assert_eq!(stats.associations, 0);
}

#[test]
fn test_missing_endcap_is_an_error() {
    let (mut event, _, _) = event(&[looping_track(6.0)]);
    let err = LoopingTrackAssociation::new(LoopingTrackAssociationConfig::default())
        .associate(&mut event, &DetectorGeometry::default())
        .unwrap_err();
    assert_eq!(err, Error::MissingSubDetector(SubDetector::ECalEndCap));
}

#[test]
fn test_full_chain_associates_the_looping_track() {
    let hits: Vec<CaloHit> = (1..=6).map(|layer| hit(1000.0, 0.0, layer, 1.0)).collect();
    let mut event = Event::new(hits.into_iter().collect(), &[looping_track(6.0)]).unwrap();

    let summary = reconstruct_event(&mut event, &geometry(), &PfaSettings::default()).unwrap();
    assert_eq!(summary.clusters.len(), 1);
    assert_eq!(summary.associations, vec![(TrackId(0), summary.clusters[0].id)]);
    assert_eq!(summary.clusters[0].associated_tracks, vec![TrackId(0)]);
}
