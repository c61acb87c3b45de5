//! Clusters of calo hits and their cached properties.
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::fit::ClusterFitResult;
use crate::hit::{CaloHit, CaloHitId, CaloHitStore, PseudoLayer};
use crate::ordered::OrderedCaloHitList;
use crate::track::TrackId;
use crate::vector::CartesianVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable handle of a cluster within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterId(pub u32);

impl ClusterId {
    /// Slot of the cluster in the event.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LayerSums {
    position_sum: CartesianVector,
    n_hits: usize,
}

/// Quantities derived from the hits of a cluster.
///
/// Kept up to date incrementally as hits are added; [`Self::compute`]
/// derives the same values from scratch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterProperties {
    /// Number of layered hits.
    pub n_hits: usize,
    /// Number of layered hits flagged as possible MIPs.
    pub n_possible_mip_hits: usize,
    /// Number of isolated hits.
    pub n_isolated_hits: usize,
    /// Electromagnetic energy of all hits.
    pub electromagnetic_energy: f32,
    /// Hadronic energy of all hits.
    pub hadronic_energy: f32,
    layer_sums: BTreeMap<PseudoLayer, LayerSums>,
}

impl ClusterProperties {
    /// Derives the properties of a hit set.
    #[must_use]
    pub fn compute(
        ordered_hits: &OrderedCaloHitList,
        isolated_hits: &[CaloHitId],
        store: &CaloHitStore,
    ) -> Self {
        let mut properties = Self::default();
        for (layer, hits) in ordered_hits.iter() {
            for &id in hits {
                properties.absorb(layer, &store[id]);
            }
        }
        for &id in isolated_hits {
            properties.absorb_isolated(&store[id]);
        }
        properties
    }

    fn absorb(&mut self, layer: PseudoLayer, hit: &CaloHit) {
        self.n_hits += 1;
        if hit.is_possible_mip() {
            self.n_possible_mip_hits += 1;
        }
        self.electromagnetic_energy += hit.electromagnetic_energy();
        self.hadronic_energy += hit.hadronic_energy();
        let sums = self.layer_sums.entry(layer).or_default();
        sums.position_sum += hit.position();
        sums.n_hits += 1;
    }

    fn absorb_isolated(&mut self, hit: &CaloHit) {
        self.n_isolated_hits += 1;
        self.electromagnetic_energy += hit.electromagnetic_energy();
        self.hadronic_energy += hit.hadronic_energy();
    }

    /// Mean hit position in a layer.
    #[must_use]
    pub fn centroid(&self, layer: PseudoLayer) -> Option<CartesianVector> {
        self.layer_sums
            .get(&layer)
            .filter(|sums| sums.n_hits > 0)
            .map(|sums| sums.position_sum * (1.0 / sums.n_hits as f32))
    }

    /// Fraction of layered hits flagged as possible MIPs.
    #[must_use]
    pub fn mip_fraction(&self) -> f32 {
        if self.n_hits == 0 {
            0.0
        } else {
            self.n_possible_mip_hits as f32 / self.n_hits as f32
        }
    }
}

/// A group of calo hits built up by the clustering algorithms.
///
/// Hit membership can only change through [`crate::Event`], which keeps the
/// hit owner column in step.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    ordered_hits: OrderedCaloHitList,
    isolated_hits: Vec<CaloHitId>,
    properties: ClusterProperties,
    initial_direction: CartesianVector,
    current_fit: ClusterFitResult,
    is_mip_track: bool,
    associated_tracks: Vec<TrackId>,
}

impl Cluster {
    pub(crate) fn from_seed(id: ClusterId, seed_id: CaloHitId, seed: &CaloHit) -> Result<Self> {
        let mut cluster = Self {
            id,
            ordered_hits: OrderedCaloHitList::new(),
            isolated_hits: Vec::new(),
            properties: ClusterProperties::default(),
            initial_direction: seed.expected_direction(),
            current_fit: ClusterFitResult::default(),
            is_mip_track: seed.is_possible_mip(),
            associated_tracks: Vec::new(),
        };
        cluster.add_hit(seed_id, seed)?;
        Ok(cluster)
    }

    pub(crate) fn add_hit(&mut self, id: CaloHitId, hit: &CaloHit) -> Result<()> {
        let layer = hit.pseudo_layer().ok_or(Error::PseudoLayerNotSet(id))?;
        self.ordered_hits.add(layer, id)?;
        self.properties.absorb(layer, hit);
        Ok(())
    }

    pub(crate) fn add_isolated_hit(&mut self, id: CaloHitId, hit: &CaloHit) -> Result<()> {
        if self.isolated_hits.contains(&id) {
            let layer = hit.pseudo_layer().unwrap_or_default();
            return Err(Error::AlreadyPresent { hit: id, layer });
        }
        self.isolated_hits.push(id);
        self.properties.absorb_isolated(hit);
        Ok(())
    }

    pub(crate) fn remove_hit(&mut self, id: CaloHitId, store: &CaloHitStore) -> Result<()> {
        if let Some(position) = self.isolated_hits.iter().position(|&hit| hit == id) {
            self.isolated_hits.remove(position);
        } else {
            let hit = store.try_get(id)?;
            let layer = hit.pseudo_layer().ok_or(Error::PseudoLayerNotSet(id))?;
            self.ordered_hits.remove(layer, id)?;
        }
        self.properties = ClusterProperties::compute(&self.ordered_hits, &self.isolated_hits, store);
        Ok(())
    }

    pub(crate) fn take_hits(&mut self) -> Vec<CaloHitId> {
        let mut hits: Vec<CaloHitId> = self.ordered_hits.hits().collect();
        hits.append(&mut self.isolated_hits);
        self.ordered_hits = OrderedCaloHitList::new();
        self.properties = ClusterProperties::default();
        hits
    }

    pub(crate) fn add_associated_track(&mut self, track: TrackId) {
        if !self.associated_tracks.contains(&track) {
            self.associated_tracks.push(track);
        }
    }

    /// Cluster handle.
    #[must_use]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Layered hits.
    #[must_use]
    pub fn ordered_hits(&self) -> &OrderedCaloHitList {
        &self.ordered_hits
    }

    /// Isolated hits attached without layer structure.
    #[must_use]
    pub fn isolated_hits(&self) -> &[CaloHitId] {
        &self.isolated_hits
    }

    /// Layered and isolated hits.
    pub fn all_hits(&self) -> impl Iterator<Item = CaloHitId> + '_ {
        self.ordered_hits
            .hits()
            .chain(self.isolated_hits.iter().copied())
    }

    /// Cached properties.
    #[must_use]
    pub fn properties(&self) -> &ClusterProperties {
        &self.properties
    }

    /// Number of layered hits.
    #[inline]
    #[must_use]
    pub fn n_hits(&self) -> usize {
        self.properties.n_hits
    }

    /// Number of isolated hits.
    #[must_use]
    pub fn n_isolated_hits(&self) -> usize {
        self.properties.n_isolated_hits
    }

    /// Number of occupied layers.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.ordered_hits.n_layers()
    }

    /// True when the cluster holds no layered hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered_hits.is_empty()
    }

    /// Innermost occupied pseudo-layer.
    #[must_use]
    pub fn inner_layer(&self) -> Option<PseudoLayer> {
        self.ordered_hits.inner_layer()
    }

    /// Outermost occupied pseudo-layer.
    #[must_use]
    pub fn outer_layer(&self) -> Option<PseudoLayer> {
        self.ordered_hits.outer_layer()
    }

    /// Mean hit position in a layer.
    #[must_use]
    pub fn centroid(&self, layer: PseudoLayer) -> Option<CartesianVector> {
        self.properties.centroid(layer)
    }

    /// Hadronic energy.
    #[inline]
    #[must_use]
    pub fn hadronic_energy(&self) -> f32 {
        self.properties.hadronic_energy
    }

    /// Electromagnetic energy.
    #[must_use]
    pub fn electromagnetic_energy(&self) -> f32 {
        self.properties.electromagnetic_energy
    }

    /// Energy compared against track momenta.
    #[must_use]
    pub fn track_comparison_energy(&self) -> f32 {
        self.properties.hadronic_energy
    }

    /// Fraction of layered hits flagged as possible MIPs.
    #[must_use]
    pub fn mip_fraction(&self) -> f32 {
        self.properties.mip_fraction()
    }

    /// Direction fixed at creation from the seed hit.
    #[must_use]
    pub fn initial_direction(&self) -> CartesianVector {
        self.initial_direction
    }

    /// Latest direction fit.
    #[must_use]
    pub fn current_fit(&self) -> &ClusterFitResult {
        &self.current_fit
    }

    /// Replaces the latest direction fit.
    pub fn set_current_fit(&mut self, fit: ClusterFitResult) {
        self.current_fit = fit;
    }

    /// Whether the cluster looks like a single minimum-ionising track.
    #[must_use]
    pub fn is_mip_track(&self) -> bool {
        self.is_mip_track
    }

    /// Sets the MIP-track flag.
    pub fn set_mip_track_flag(&mut self, flag: bool) {
        self.is_mip_track = flag;
    }

    /// Tracks associated with the cluster.
    #[must_use]
    pub fn associated_tracks(&self) -> &[TrackId] {
        &self.associated_tracks
    }

    /// Checks the cached hit count against the layered hits.
    pub fn check_consistency(&self) -> Result<()> {
        let stored = self.ordered_hits.n_hits();
        if stored != self.properties.n_hits {
            return Err(Error::InvariantViolation(format!(
                "{} caches {} hits but holds {} layered hits",
                self.id, self.properties.n_hits, stored
            )));
        }
        if self.isolated_hits.len() != self.properties.n_isolated_hits {
            return Err(Error::InvariantViolation(format!(
                "{} caches {} isolated hits but holds {}",
                self.id,
                self.properties.n_isolated_hits,
                self.isolated_hits.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::CaloHitParameters;
    use approx::assert_relative_eq;

    fn store_with(hits: &[(f32, f32, u32, bool)]) -> CaloHitStore {
        hits.iter()
            .map(|&(x, energy, layer, mip)| {
                CaloHit::new(&CaloHitParameters {
                    position: CartesianVector::new(x, 0.0, 100.0 * layer as f32),
                    hadronic_energy: energy,
                    electromagnetic_energy: energy * 0.5,
                    pseudo_layer: Some(layer),
                    is_possible_mip: mip,
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn test_incremental_properties_match_recomputation() {
        let store = store_with(&[
            (0.0, 1.0, 5, true),
            (10.0, 2.0, 5, false),
            (4.0, 0.5, 2, true),
            (8.0, 1.5, 9, false),
        ]);
        let mut cluster = Cluster::from_seed(ClusterId(0), CaloHitId(0), &store[CaloHitId(0)]).unwrap();
        for id in [CaloHitId(1), CaloHitId(2), CaloHitId(3)] {
            cluster.add_hit(id, &store[id]).unwrap();
        }

        let recomputed = ClusterProperties::compute(cluster.ordered_hits(), &[], &store);
        assert_eq!(cluster.n_hits(), recomputed.n_hits);
        assert_eq!(cluster.properties().n_possible_mip_hits, 2);
        assert_relative_eq!(cluster.hadronic_energy(), recomputed.hadronic_energy);
        assert_relative_eq!(cluster.hadronic_energy(), 5.0);
        assert_relative_eq!(cluster.electromagnetic_energy(), 2.5);
        assert_relative_eq!(cluster.mip_fraction(), 0.5);

        assert_eq!(cluster.inner_layer(), Some(2));
        assert_eq!(cluster.outer_layer(), Some(9));
        let centroid = cluster.centroid(5).unwrap();
        assert_relative_eq!(centroid.x, 5.0);
        assert_relative_eq!(centroid.z, 500.0);
        assert!(cluster.centroid(4).is_none());
        cluster.check_consistency().unwrap();
    }

    #[test]
    fn test_seed_sets_direction_and_mip_flag() {
        let store = store_with(&[(0.0, 1.0, 3, true)]);
        let cluster = Cluster::from_seed(ClusterId(4), CaloHitId(0), &store[CaloHitId(0)]).unwrap();
        assert!(cluster.is_mip_track());
        assert_eq!(cluster.initial_direction(), store[CaloHitId(0)].expected_direction());
        assert!(!cluster.current_fit().is_successful);
        assert_eq!(cluster.inner_layer(), cluster.outer_layer());
    }

    #[test]
    fn test_remove_last_hit_empties_cluster() {
        let store = store_with(&[(0.0, 1.0, 3, false), (1.0, 1.0, 4, false)]);
        let mut cluster = Cluster::from_seed(ClusterId(0), CaloHitId(0), &store[CaloHitId(0)]).unwrap();
        cluster.add_hit(CaloHitId(1), &store[CaloHitId(1)]).unwrap();

        cluster.remove_hit(CaloHitId(1), &store).unwrap();
        assert_eq!(cluster.outer_layer(), Some(3));
        cluster.remove_hit(CaloHitId(0), &store).unwrap();
        assert!(cluster.is_empty());
        assert_eq!(cluster.n_hits(), 0);
        assert_eq!(cluster.inner_layer(), None);
        cluster.check_consistency().unwrap();
    }

    #[test]
    fn test_isolated_hits_add_energy_only() {
        let store = store_with(&[(0.0, 1.0, 3, false), (1.0, 2.0, 8, false)]);
        let mut cluster = Cluster::from_seed(ClusterId(0), CaloHitId(0), &store[CaloHitId(0)]).unwrap();
        cluster.add_isolated_hit(CaloHitId(1), &store[CaloHitId(1)]).unwrap();

        assert_eq!(cluster.n_hits(), 1);
        assert_eq!(cluster.n_isolated_hits(), 1);
        assert_eq!(cluster.outer_layer(), Some(3));
        assert_relative_eq!(cluster.hadronic_energy(), 3.0);
        assert!(cluster.add_isolated_hit(CaloHitId(1), &store[CaloHitId(1)]).is_err());
        assert_eq!(cluster.all_hits().count(), 2);
    }
}
