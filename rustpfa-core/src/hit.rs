//! Calorimeter hit types and the per-event hit arena.
#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::ops::Index;

use crate::cluster::ClusterId;
use crate::error::{Error, Result};
use crate::vector::CartesianVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Discretised depth index of a hit, increasing outwards.
pub type PseudoLayer = u32;

/// Stable handle of a calo hit inside a [`CaloHitStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaloHitId(pub u32);

impl CaloHitId {
    /// Position of the hit in the arena.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CaloHitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hit#{}", self.0)
    }
}

/// Truth particle reference. Lookup only, never owned by the hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct McParticleId(pub u64);

/// Calorimeter technology of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HitType {
    /// Electromagnetic calorimeter.
    #[default]
    ECal,
    /// Hadronic calorimeter.
    HCal,
    /// Muon system.
    Muon,
}

/// Detector region of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectorRegion {
    /// Barrel region.
    #[default]
    Barrel,
    /// Endcap region.
    EndCap,
}

/// Input description of a calo hit.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CaloHitParameters {
    /// Cell centre position.
    pub position: CartesianVector,
    /// Expected particle direction; defaults to the unit position vector.
    pub expected_direction: Option<CartesianVector>,
    /// Unit normal of the cell.
    pub cell_normal: CartesianVector,
    /// Cell size along the first transverse axis.
    pub cell_size_u: f32,
    /// Cell size along the second transverse axis.
    pub cell_size_v: f32,
    /// Cell thickness.
    pub cell_thickness: f32,
    /// Radiation lengths in the cell.
    pub n_radiation_lengths: f32,
    /// Interaction lengths in the cell.
    pub n_interaction_lengths: f32,
    /// Radiation lengths from the interaction point.
    pub n_radiation_lengths_from_ip: f32,
    /// Interaction lengths from the interaction point.
    pub n_interaction_lengths_from_ip: f32,
    /// Hit time.
    pub time: f32,
    /// Raw energy.
    pub input_energy: f32,
    /// MIP-equivalent energy.
    pub mip_equivalent_energy: f32,
    /// Electromagnetic energy estimate.
    pub electromagnetic_energy: f32,
    /// Hadronic energy estimate.
    pub hadronic_energy: f32,
    /// Digital readout flag.
    pub is_digital: bool,
    /// Calorimeter technology.
    pub hit_type: HitType,
    /// Detector region.
    pub detector_region: DetectorRegion,
    /// Physical layer index.
    pub layer: u32,
    /// Pseudo-layer, if already assigned.
    pub pseudo_layer: Option<PseudoLayer>,
    /// Whether the hit is compatible with a minimum-ionising particle.
    pub is_possible_mip: bool,
    /// Whether the hit has been flagged isolated.
    pub is_isolated: bool,
    /// Truth particle reference.
    pub mc_particle: Option<McParticleId>,
}

/// A calorimeter hit.
///
/// Physical attributes are fixed at construction. The pseudo-layer is
/// assigned at most once; the MIP and isolation flags are set by external
/// classification steps. Cluster ownership lives in [`CaloHitStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaloHit {
    position: CartesianVector,
    expected_direction: CartesianVector,
    cell_normal: CartesianVector,
    cell_size_u: f32,
    cell_size_v: f32,
    cell_thickness: f32,
    n_radiation_lengths: f32,
    n_interaction_lengths: f32,
    n_radiation_lengths_from_ip: f32,
    n_interaction_lengths_from_ip: f32,
    time: f32,
    input_energy: f32,
    mip_equivalent_energy: f32,
    electromagnetic_energy: f32,
    hadronic_energy: f32,
    is_digital: bool,
    hit_type: HitType,
    detector_region: DetectorRegion,
    layer: u32,
    pseudo_layer: Option<PseudoLayer>,
    is_possible_mip: bool,
    is_isolated: bool,
    mc_particle: Option<McParticleId>,
}

impl CaloHit {
    /// Creates a hit from its parameters.
    #[must_use]
    pub fn new(parameters: &CaloHitParameters) -> Self {
        Self {
            position: parameters.position,
            expected_direction: parameters
                .expected_direction
                .unwrap_or_else(|| parameters.position.unit()),
            cell_normal: parameters.cell_normal,
            cell_size_u: parameters.cell_size_u,
            cell_size_v: parameters.cell_size_v,
            cell_thickness: parameters.cell_thickness,
            n_radiation_lengths: parameters.n_radiation_lengths,
            n_interaction_lengths: parameters.n_interaction_lengths,
            n_radiation_lengths_from_ip: parameters.n_radiation_lengths_from_ip,
            n_interaction_lengths_from_ip: parameters.n_interaction_lengths_from_ip,
            time: parameters.time,
            input_energy: parameters.input_energy,
            mip_equivalent_energy: parameters.mip_equivalent_energy,
            electromagnetic_energy: parameters.electromagnetic_energy,
            hadronic_energy: parameters.hadronic_energy,
            is_digital: parameters.is_digital,
            hit_type: parameters.hit_type,
            detector_region: parameters.detector_region,
            layer: parameters.layer,
            pseudo_layer: parameters.pseudo_layer,
            is_possible_mip: parameters.is_possible_mip,
            is_isolated: parameters.is_isolated,
            mc_particle: parameters.mc_particle,
        }
    }

    /// Cell centre position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> CartesianVector {
        self.position
    }

    /// Expected particle direction through the cell.
    #[inline]
    #[must_use]
    pub fn expected_direction(&self) -> CartesianVector {
        self.expected_direction
    }

    /// Unit normal of the cell.
    #[inline]
    #[must_use]
    pub fn cell_normal(&self) -> CartesianVector {
        self.cell_normal
    }

    /// Cell size along the first transverse axis.
    #[inline]
    #[must_use]
    pub fn cell_size_u(&self) -> f32 {
        self.cell_size_u
    }

    /// Cell size along the second transverse axis.
    #[inline]
    #[must_use]
    pub fn cell_size_v(&self) -> f32 {
        self.cell_size_v
    }

    /// Cell thickness.
    #[inline]
    #[must_use]
    pub fn cell_thickness(&self) -> f32 {
        self.cell_thickness
    }

    /// Typical transverse cell dimension, `sqrt(u * v)`.
    #[inline]
    #[must_use]
    pub fn cell_length_scale(&self) -> f32 {
        (self.cell_size_u * self.cell_size_v).sqrt()
    }

    /// Radiation lengths in the cell.
    #[must_use]
    pub fn n_radiation_lengths(&self) -> f32 {
        self.n_radiation_lengths
    }

    /// Interaction lengths in the cell.
    #[must_use]
    pub fn n_interaction_lengths(&self) -> f32 {
        self.n_interaction_lengths
    }

    /// Radiation lengths from the interaction point.
    #[must_use]
    pub fn n_radiation_lengths_from_ip(&self) -> f32 {
        self.n_radiation_lengths_from_ip
    }

    /// Interaction lengths from the interaction point.
    #[must_use]
    pub fn n_interaction_lengths_from_ip(&self) -> f32 {
        self.n_interaction_lengths_from_ip
    }

    /// Hit time.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Raw energy.
    #[inline]
    #[must_use]
    pub fn input_energy(&self) -> f32 {
        self.input_energy
    }

    /// MIP-equivalent energy.
    #[must_use]
    pub fn mip_equivalent_energy(&self) -> f32 {
        self.mip_equivalent_energy
    }

    /// Electromagnetic energy estimate.
    #[inline]
    #[must_use]
    pub fn electromagnetic_energy(&self) -> f32 {
        self.electromagnetic_energy
    }

    /// Hadronic energy estimate.
    #[inline]
    #[must_use]
    pub fn hadronic_energy(&self) -> f32 {
        self.hadronic_energy
    }

    /// Digital readout flag.
    #[must_use]
    pub fn is_digital(&self) -> bool {
        self.is_digital
    }

    /// Calorimeter technology.
    #[inline]
    #[must_use]
    pub fn hit_type(&self) -> HitType {
        self.hit_type
    }

    /// Detector region.
    #[must_use]
    pub fn detector_region(&self) -> DetectorRegion {
        self.detector_region
    }

    /// Physical layer index.
    #[must_use]
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Pseudo-layer, if assigned.
    #[inline]
    #[must_use]
    pub fn pseudo_layer(&self) -> Option<PseudoLayer> {
        self.pseudo_layer
    }

    /// Whether the hit is compatible with a minimum-ionising particle.
    #[inline]
    #[must_use]
    pub fn is_possible_mip(&self) -> bool {
        self.is_possible_mip
    }

    /// Whether the hit has been flagged isolated.
    #[inline]
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.is_isolated
    }

    /// Truth particle reference.
    #[must_use]
    pub fn mc_particle(&self) -> Option<McParticleId> {
        self.mc_particle
    }

    /// Assigns the pseudo-layer. Fails if one has already been assigned.
    pub fn set_pseudo_layer(&mut self, id: CaloHitId, pseudo_layer: PseudoLayer) -> Result<()> {
        if self.pseudo_layer.is_some() {
            return Err(Error::PseudoLayerAlreadySet(id));
        }
        self.pseudo_layer = Some(pseudo_layer);
        Ok(())
    }

    /// Sets the possible-MIP flag.
    pub fn set_possible_mip_flag(&mut self, flag: bool) {
        self.is_possible_mip = flag;
    }

    /// Sets the isolated flag.
    pub fn set_isolated_flag(&mut self, flag: bool) {
        self.is_isolated = flag;
    }
}

/// Arena of the calo hits of one event.
///
/// Hits are addressed by [`CaloHitId`]. The owner column is the single
/// source of truth for cluster membership: a hit is available exactly
/// when it has no owner.
#[derive(Debug, Clone, Default)]
pub struct CaloHitStore {
    hits: Vec<CaloHit>,
    owners: Vec<Option<ClusterId>>,
}

impl CaloHitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hits: Vec::with_capacity(capacity),
            owners: Vec::with_capacity(capacity),
        }
    }

    /// Adds a hit and returns its handle.
    ///
    /// # Panics
    /// Panics if the store already holds `u32::MAX` hits.
    pub fn push(&mut self, hit: CaloHit) -> CaloHitId {
        let id = CaloHitId(u32::try_from(self.hits.len()).expect("calo hit store overflow"));
        self.hits.push(hit);
        self.owners.push(None);
        id
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Returns the hit for a handle.
    #[must_use]
    pub fn get(&self, id: CaloHitId) -> Option<&CaloHit> {
        self.hits.get(id.index())
    }

    /// Returns the hit for a handle, or an error for unknown handles.
    pub fn try_get(&self, id: CaloHitId) -> Result<&CaloHit> {
        self.get(id).ok_or(Error::InvalidCaloHit(id))
    }

    /// Mutable access for flag and pseudo-layer assignment.
    pub fn get_mut(&mut self, id: CaloHitId) -> Result<&mut CaloHit> {
        self.hits.get_mut(id.index()).ok_or(Error::InvalidCaloHit(id))
    }

    /// Cluster owning the hit, if any.
    #[inline]
    #[must_use]
    pub fn owner(&self, id: CaloHitId) -> Option<ClusterId> {
        self.owners.get(id.index()).copied().flatten()
    }

    /// True when the hit belongs to no cluster.
    #[inline]
    #[must_use]
    pub fn is_available(&self, id: CaloHitId) -> bool {
        self.owner(id).is_none()
    }

    /// Iterates over all handles in arena order.
    pub fn ids(&self) -> impl Iterator<Item = CaloHitId> + '_ {
        (0..self.hits.len()).map(|index| CaloHitId(index as u32))
    }

    /// Iterates over handles and hits in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (CaloHitId, &CaloHit)> {
        self.hits
            .iter()
            .enumerate()
            .map(|(index, hit)| (CaloHitId(index as u32), hit))
    }

    pub(crate) fn set_owner(&mut self, id: CaloHitId, owner: Option<ClusterId>) -> Result<()> {
        let slot = self
            .owners
            .get_mut(id.index())
            .ok_or(Error::InvalidCaloHit(id))?;
        *slot = owner;
        Ok(())
    }
}

impl Index<CaloHitId> for CaloHitStore {
    type Output = CaloHit;

    fn index(&self, id: CaloHitId) -> &CaloHit {
        &self.hits[id.index()]
    }
}

impl FromIterator<CaloHit> for CaloHitStore {
    fn from_iter<I: IntoIterator<Item = CaloHit>>(iter: I) -> Self {
        let mut store = Self::new();
        for hit in iter {
            store.push(hit);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parameters() -> CaloHitParameters {
        CaloHitParameters {
            position: CartesianVector::new(0.0, 0.0, 2000.0),
            cell_size_u: 4.0,
            cell_size_v: 9.0,
            hadronic_energy: 0.5,
            pseudo_layer: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_expected_direction_defaults_to_position() {
        let hit = CaloHit::new(&parameters());
        assert_eq!(hit.expected_direction(), CartesianVector::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_cell_length_scale() {
        let hit = CaloHit::new(&parameters());
        assert_relative_eq!(hit.cell_length_scale(), 6.0);
    }

    #[test]
    fn test_pseudo_layer_is_set_once() {
        let mut hit = CaloHit::new(&CaloHitParameters::default());
        assert_eq!(hit.pseudo_layer(), None);
        hit.set_pseudo_layer(CaloHitId(0), 5).unwrap();
        assert_eq!(hit.pseudo_layer(), Some(5));
        assert_eq!(
            hit.set_pseudo_layer(CaloHitId(0), 6),
            Err(Error::PseudoLayerAlreadySet(CaloHitId(0)))
        );
        assert_eq!(hit.pseudo_layer(), Some(5));
    }

    #[test]
    fn test_store_ownership_column() {
        let mut store = CaloHitStore::new();
        let a = store.push(CaloHit::new(&parameters()));
        let b = store.push(CaloHit::new(&parameters()));
        assert_eq!(store.len(), 2);
        assert!(store.is_available(a));

        store.set_owner(a, Some(ClusterId(7))).unwrap();
        assert!(!store.is_available(a));
        assert_eq!(store.owner(a), Some(ClusterId(7)));
        assert!(store.is_available(b));
        assert!(store.set_owner(CaloHitId(9), None).is_err());
        assert!(store.try_get(CaloHitId(9)).is_err());
    }
}
