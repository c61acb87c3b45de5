//! Charged-particle tracks and their helix fits.

use std::fmt;

use crate::cluster::ClusterId;
use crate::hit::McParticleId;
use crate::vector::CartesianVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle of a track within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackId(pub u32);

impl TrackId {
    /// Position of the track in the event.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Helix parameters of a track fit.
///
/// `omega` is the signed curvature (1/mm), `phi0` the azimuth of the
/// momentum at the reference point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Helix {
    /// Signed curvature.
    pub omega: f32,
    /// Tangent of the dip angle.
    pub tan_lambda: f32,
    /// Azimuthal angle of the momentum.
    pub phi0: f32,
    /// Transverse impact parameter.
    pub d0: f32,
    /// Longitudinal impact parameter.
    pub z0: f32,
}

impl Helix {
    /// True for a straight (non-curving) helix.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_straight(&self) -> bool {
        self.omega == 0.0
    }

    /// Signed radius, `None` for a straight helix.
    #[must_use]
    pub fn radius(&self) -> Option<f32> {
        if self.is_straight() {
            None
        } else {
            Some(1.0 / self.omega)
        }
    }

    /// Centre of the projected circle in the transverse plane.
    #[must_use]
    pub fn centre_xy(&self) -> Option<(f32, f32)> {
        let radius = self.radius()?;
        let angle = self.phi0 - std::f32::consts::FRAC_PI_2;
        Some((radius * angle.cos(), radius * angle.sin()))
    }

    /// Longitudinal direction cosine.
    #[must_use]
    pub fn direction_cos_z(&self) -> f32 {
        self.tan_lambda / (1.0 + self.tan_lambda * self.tan_lambda).sqrt()
    }
}

/// Track position and momentum at a reference surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackState {
    /// Position.
    pub position: CartesianVector,
    /// Momentum.
    pub momentum: CartesianVector,
}

/// Input description of a track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackParameters {
    /// Energy at the distance of closest approach.
    pub energy_at_dca: f32,
    /// Helix fit evaluated at the ECal.
    pub helix_at_ecal: Helix,
    /// Track state at the ECal.
    pub state_at_ecal: TrackState,
    /// Daughter track indices within the event.
    pub daughters: Vec<TrackId>,
    /// Whether the track may seed a particle-flow object.
    pub can_form_pfo: bool,
    /// Truth particle reference.
    pub mc_particle: Option<McParticleId>,
}

impl Default for TrackParameters {
    fn default() -> Self {
        Self {
            energy_at_dca: 0.0,
            helix_at_ecal: Helix::default(),
            state_at_ecal: TrackState::default(),
            daughters: Vec::new(),
            can_form_pfo: true,
            mc_particle: None,
        }
    }
}

/// A reconstructed track. Read-only apart from its cluster association.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: TrackId,
    energy_at_dca: f32,
    helix_at_ecal: Helix,
    state_at_ecal: TrackState,
    daughters: Vec<TrackId>,
    can_form_pfo: bool,
    mc_particle: Option<McParticleId>,
    associated_cluster: Option<ClusterId>,
}

impl Track {
    /// Creates a track from its parameters.
    #[must_use]
    pub fn new(id: TrackId, parameters: &TrackParameters) -> Self {
        Self {
            id,
            energy_at_dca: parameters.energy_at_dca,
            helix_at_ecal: parameters.helix_at_ecal,
            state_at_ecal: parameters.state_at_ecal,
            daughters: parameters.daughters.clone(),
            can_form_pfo: parameters.can_form_pfo,
            mc_particle: parameters.mc_particle,
            associated_cluster: None,
        }
    }

    /// Track handle.
    #[must_use]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Energy at the distance of closest approach.
    #[must_use]
    pub fn energy_at_dca(&self) -> f32 {
        self.energy_at_dca
    }

    /// Helix fit at the ECal.
    #[must_use]
    pub fn helix_at_ecal(&self) -> &Helix {
        &self.helix_at_ecal
    }

    /// Track state at the ECal.
    #[must_use]
    pub fn state_at_ecal(&self) -> &TrackState {
        &self.state_at_ecal
    }

    /// Daughter tracks.
    #[must_use]
    pub fn daughters(&self) -> &[TrackId] {
        &self.daughters
    }

    /// Whether the track may seed a particle-flow object.
    #[must_use]
    pub fn can_form_pfo(&self) -> bool {
        self.can_form_pfo
    }

    /// Truth particle reference.
    #[must_use]
    pub fn mc_particle(&self) -> Option<McParticleId> {
        self.mc_particle
    }

    /// Associated cluster, if any.
    #[must_use]
    pub fn associated_cluster(&self) -> Option<ClusterId> {
        self.associated_cluster
    }

    /// True once a cluster has been associated.
    #[must_use]
    pub fn has_associated_cluster(&self) -> bool {
        self.associated_cluster.is_some()
    }

    pub(crate) fn set_associated_cluster(&mut self, cluster: ClusterId) {
        self.associated_cluster = Some(cluster);
    }

    pub(crate) fn clear_associated_cluster(&mut self) {
        self.associated_cluster = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_straight_helix_has_no_centre() {
        let helix = Helix::default();
        assert!(helix.is_straight());
        assert!(helix.radius().is_none());
        assert!(helix.centre_xy().is_none());
    }

    #[test]
    fn test_helix_centre() {
        let helix = Helix {
            omega: 0.001,
            phi0: std::f32::consts::FRAC_PI_2,
            tan_lambda: 1.0,
            ..Default::default()
        };
        let (x, y) = helix.centre_xy().unwrap();
        assert_relative_eq!(x, 1000.0, epsilon = 1e-3);
        assert_relative_eq!(y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(helix.direction_cos_z(), std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
    }

    #[test]
    fn test_track_association_link() {
        let mut track = Track::new(TrackId(2), &TrackParameters::default());
        assert!(track.can_form_pfo());
        assert!(!track.has_associated_cluster());
        track.set_associated_cluster(ClusterId(5));
        assert_eq!(track.associated_cluster(), Some(ClusterId(5)));
        assert_eq!(track.id().to_string(), "track#2");
    }
}
