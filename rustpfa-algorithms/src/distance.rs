//! Distance engine: normalised hit-to-hit and hit-to-cone distances.
//!
//! Every distance is a separation divided by a cutoff built from the cell
//! length scale of the incoming hit, so values below one mean "inside the
//! acceptance region". A cutoff of exactly zero can only come from a
//! misconfigured granularity constant or a zero-sized cell and is reported
//! as [`Error::ZeroDistanceCut`].
#![allow(clippy::float_cmp)]

use rustpfa_core::{
    CaloHit, CaloHitId, CaloHitStore, CartesianVector, Cluster, Distance, Error, Geometry,
    PseudoLayer, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distance constants, split by granularity where it matters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DistanceConfig {
    /// Acceptance cut on the generic distance.
    pub generic_distance_cut: f32,
    /// Divisor applied to the fit-direction distance of MIP-track clusters.
    pub mip_track_distance_divisor: f32,
    /// Same-layer cutoff in cell lengths, fine granularity.
    pub same_layer_pad_widths_fine: f32,
    /// Same-layer cutoff in cell lengths, coarse granularity.
    pub same_layer_pad_widths_coarse: f32,
    /// Points farther than this (mm) are never cone-matched.
    pub cone_approach_max_separation: f32,
    /// Cone half-angle tangent, fine granularity.
    pub tan_cone_angle_fine: f32,
    /// Cone half-angle tangent, coarse granularity.
    pub tan_cone_angle_coarse: f32,
    /// Constant cone width in cell lengths, fine granularity.
    pub additional_pad_widths_fine: f32,
    /// Constant cone width in cell lengths, coarse granularity.
    pub additional_pad_widths_coarse: f32,
    /// Upper bound (exclusive) of the projection along the cone axis (mm).
    pub max_cluster_dir_projection: f32,
    /// Lower bound (exclusive) of the projection along the cone axis (mm).
    pub min_cluster_dir_projection: f32,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            generic_distance_cut: 1.0,
            mip_track_distance_divisor: 2.0,
            same_layer_pad_widths_fine: 2.8,
            same_layer_pad_widths_coarse: 1.8,
            cone_approach_max_separation: 1000.0,
            tan_cone_angle_fine: 0.3,
            tan_cone_angle_coarse: 0.5,
            additional_pad_widths_fine: 2.5,
            additional_pad_widths_coarse: 2.5,
            max_cluster_dir_projection: 200.0,
            min_cluster_dir_projection: -10.0,
        }
    }
}

impl DistanceConfig {
    /// Sets the generic distance acceptance cut.
    #[must_use]
    pub fn with_generic_distance_cut(mut self, cut: f32) -> Self {
        self.generic_distance_cut = cut;
        self
    }

    /// Sets the MIP-track fit-direction divisor.
    #[must_use]
    pub fn with_mip_track_distance_divisor(mut self, divisor: f32) -> Self {
        self.mip_track_distance_divisor = divisor;
        self
    }

    /// Sets the same-layer pad widths (fine, coarse).
    #[must_use]
    pub fn with_same_layer_pad_widths(mut self, fine: f32, coarse: f32) -> Self {
        self.same_layer_pad_widths_fine = fine;
        self.same_layer_pad_widths_coarse = coarse;
        self
    }

    /// Sets the cone half-angle tangents (fine, coarse).
    #[must_use]
    pub fn with_tan_cone_angles(mut self, fine: f32, coarse: f32) -> Self {
        self.tan_cone_angle_fine = fine;
        self.tan_cone_angle_coarse = coarse;
        self
    }

    /// Sets the constant cone widths (fine, coarse).
    #[must_use]
    pub fn with_additional_pad_widths(mut self, fine: f32, coarse: f32) -> Self {
        self.additional_pad_widths_fine = fine;
        self.additional_pad_widths_coarse = coarse;
        self
    }

    /// Sets the projection window (min, max) along the cone axis.
    #[must_use]
    pub fn with_projection_window(mut self, min: f32, max: f32) -> Self {
        self.min_cluster_dir_projection = min;
        self.max_cluster_dir_projection = max;
        self
    }

    /// Sets the maximum cone-approach separation.
    #[must_use]
    pub fn with_cone_approach_max_separation(mut self, separation: f32) -> Self {
        self.cone_approach_max_separation = separation;
        self
    }

    /// Checks values the distance functions cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.generic_distance_cut <= 0.0 {
            return Err(Error::ConfigError(format!(
                "generic distance cut must be positive, got {}",
                self.generic_distance_cut
            )));
        }
        if self.mip_track_distance_divisor <= 0.0 {
            return Err(Error::ConfigError(format!(
                "MIP track distance divisor must be positive, got {}",
                self.mip_track_distance_divisor
            )));
        }
        if self.min_cluster_dir_projection >= self.max_cluster_dir_projection {
            return Err(Error::ConfigError(format!(
                "empty projection window ({}, {})",
                self.min_cluster_dir_projection, self.max_cluster_dir_projection
            )));
        }
        Ok(())
    }
}

/// Distance functions bound to a configuration and a geometry.
pub struct DistanceEngine<'a> {
    config: &'a DistanceConfig,
    geometry: &'a dyn Geometry,
}

impl<'a> DistanceEngine<'a> {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: &'a DistanceConfig, geometry: &'a dyn Geometry) -> Self {
        Self { config, geometry }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DistanceConfig {
        self.config
    }

    fn is_fine(&self, hit: &CaloHit) -> bool {
        self.geometry.granularity(hit.hit_type()).is_fine()
    }

    /// Smallest separation between a hit and a set of hits in its layer, in
    /// units of the same-layer cutoff.
    pub fn same_layer_distance(
        &self,
        hit_id: CaloHitId,
        store: &CaloHitStore,
        candidates: &[CaloHitId],
    ) -> Result<Distance> {
        let hit = store.try_get(hit_id)?;
        let pad_widths = if self.is_fine(hit) {
            self.config.same_layer_pad_widths_fine
        } else {
            self.config.same_layer_pad_widths_coarse
        };
        let cut = pad_widths * hit.cell_length_scale();
        if cut == 0.0 {
            return Err(Error::ZeroDistanceCut(hit_id));
        }

        let position = hit.position();
        let mut smallest = Distance::NotApplicable;
        for &candidate in candidates {
            let separation = (position - store.try_get(candidate)?.position()).magnitude();
            smallest = smallest.min(Distance::Found(separation / cut));
        }
        Ok(smallest)
    }

    /// Transverse distance of a hit from a cone with apex `point` and axis
    /// `direction`, in units of the cone width at the hit.
    pub fn cone_distance_to_point(
        &self,
        hit_id: CaloHitId,
        hit: &CaloHit,
        point: CartesianVector,
        direction: CartesianVector,
    ) -> Result<Distance> {
        let difference = hit.position() - point;
        if difference.magnitude() > self.config.cone_approach_max_separation {
            return Ok(Distance::NotApplicable);
        }

        let d_perp = direction.cross(&difference).magnitude();
        let d_along = direction.dot(&difference);

        let (tan_cone_angle, pad_widths) = if self.is_fine(hit) {
            (
                self.config.tan_cone_angle_fine,
                self.config.additional_pad_widths_fine,
            )
        } else {
            (
                self.config.tan_cone_angle_coarse,
                self.config.additional_pad_widths_coarse,
            )
        };
        let cut = d_along.abs() * tan_cone_angle + pad_widths * hit.cell_length_scale();
        if cut == 0.0 {
            return Err(Error::ZeroDistanceCut(hit_id));
        }

        if d_along < self.config.max_cluster_dir_projection
            && d_along > self.config.min_cluster_dir_projection
        {
            Ok(Distance::Found(d_perp / cut))
        } else {
            Ok(Distance::NotApplicable)
        }
    }

    /// Smallest cone distance of a hit over cones anchored at each of the
    /// candidate hits.
    pub fn cone_distance_to_hits(
        &self,
        hit_id: CaloHitId,
        store: &CaloHitStore,
        candidates: &[CaloHitId],
        direction: CartesianVector,
    ) -> Result<Distance> {
        let hit = store.try_get(hit_id)?;
        let mut smallest = Distance::NotApplicable;
        for &candidate in candidates {
            let point = store.try_get(candidate)?.position();
            smallest = smallest.min(self.cone_distance_to_point(hit_id, hit, point, direction)?);
        }
        Ok(smallest)
    }

    /// Distance between a hit and the hits a cluster holds in `search_layer`.
    ///
    /// Uses the same-layer metric when the search layer is the hit's own
    /// layer, otherwise the better of the cone distances along the initial
    /// cluster direction and along the latest successful fit. In both cases
    /// a result is only reported if it is strictly below `running_best`.
    pub fn generic_distance(
        &self,
        cluster: &Cluster,
        hit_id: CaloHitId,
        store: &CaloHitStore,
        search_layer: PseudoLayer,
        running_best: f32,
    ) -> Result<Distance> {
        let Some(layer_hits) = cluster.ordered_hits().layer(search_layer) else {
            return Ok(Distance::NotApplicable);
        };

        let hit = store.try_get(hit_id)?;
        if hit.pseudo_layer() == Some(search_layer) {
            let distance = self.same_layer_distance(hit_id, store, layer_hits)?;
            return Ok(improving(distance, running_best));
        }

        let initial =
            self.cone_distance_to_hits(hit_id, store, layer_hits, cluster.initial_direction())?;

        let fit = cluster.current_fit();
        let current = if fit.is_successful {
            match self.cone_distance_to_hits(hit_id, store, layer_hits, fit.direction)? {
                Distance::Found(distance)
                    if distance < self.config.generic_distance_cut && cluster.is_mip_track() =>
                {
                    Distance::Found(distance / self.config.mip_track_distance_divisor)
                }
                other => other,
            }
        } else {
            Distance::NotApplicable
        };

        Ok(improving(initial.min(current), running_best))
    }
}

fn improving(distance: Distance, running_best: f32) -> Distance {
    match distance {
        Distance::Found(value) if value < running_best && value < f32::MAX => distance,
        _ => Distance::NotApplicable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rustpfa_core::{CaloHitParameters, DetectorGeometry, HitType};

    fn hit(x: f32, y: f32, z: f32, cell: f32, hit_type: HitType) -> CaloHit {
        CaloHit::new(&CaloHitParameters {
            position: CartesianVector::new(x, y, z),
            cell_size_u: cell,
            cell_size_v: cell,
            hit_type,
            pseudo_layer: Some(1),
            ..Default::default()
        })
    }

    #[test]
    fn test_same_layer_distance_uses_granularity() {
        let store: CaloHitStore = [
            hit(0.0, 0.0, 0.0, 10.0, HitType::ECal),
            hit(28.0, 0.0, 0.0, 10.0, HitType::ECal),
            hit(56.0, 0.0, 0.0, 10.0, HitType::ECal),
            hit(18.0, 0.0, 0.0, 10.0, HitType::HCal),
        ]
        .into_iter()
        .collect();
        let config = DistanceConfig::default();
        let geometry = DetectorGeometry::default();
        let engine = DistanceEngine::new(&config, &geometry);

        let distance = engine
            .same_layer_distance(CaloHitId(0), &store, &[CaloHitId(2), CaloHitId(1)])
            .unwrap();
        assert_relative_eq!(distance.value().unwrap(), 1.0, epsilon = 1e-6);

        let coarse = engine
            .same_layer_distance(CaloHitId(3), &store, &[CaloHitId(0)])
            .unwrap();
        assert_relative_eq!(coarse.value().unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_same_layer_empty_set_and_zero_cut() {
        let store: CaloHitStore = [
            hit(0.0, 0.0, 0.0, 10.0, HitType::ECal),
            hit(0.0, 0.0, 0.0, 0.0, HitType::ECal),
        ]
        .into_iter()
        .collect();
        let config = DistanceConfig::default();
        let geometry = DetectorGeometry::default();
        let engine = DistanceEngine::new(&config, &geometry);

        assert_eq!(
            engine.same_layer_distance(CaloHitId(0), &store, &[]).unwrap(),
            Distance::NotApplicable
        );
        assert_eq!(
            engine.same_layer_distance(CaloHitId(1), &store, &[CaloHitId(0)]),
            Err(Error::ZeroDistanceCut(CaloHitId(1)))
        );
    }

    #[test]
    fn test_cone_distance_window() {
        let config = DistanceConfig::default();
        let geometry = DetectorGeometry::default();
        let engine = DistanceEngine::new(&config, &geometry);
        let axis = CartesianVector::new(0.0, 0.0, 1.0);

        // 100 mm along the axis, 10 mm off: cut = 100 * 0.3 + 2.5 * 10.
        let inside = hit(10.0, 0.0, 100.0, 10.0, HitType::ECal);
        let distance = engine
            .cone_distance_to_point(CaloHitId(0), &inside, CartesianVector::ZERO, axis)
            .unwrap();
        assert_relative_eq!(distance.value().unwrap(), 10.0 / 55.0, epsilon = 1e-6);

        let behind = hit(0.0, 0.0, -20.0, 10.0, HitType::ECal);
        assert_eq!(
            engine
                .cone_distance_to_point(CaloHitId(0), &behind, CartesianVector::ZERO, axis)
                .unwrap(),
            Distance::NotApplicable
        );

        let beyond = hit(0.0, 0.0, 250.0, 10.0, HitType::ECal);
        assert_eq!(
            engine
                .cone_distance_to_point(CaloHitId(0), &beyond, CartesianVector::ZERO, axis)
                .unwrap(),
            Distance::NotApplicable
        );

        let far = hit(2000.0, 0.0, 0.0, 10.0, HitType::ECal);
        assert_eq!(
            engine
                .cone_distance_to_point(CaloHitId(0), &far, CartesianVector::ZERO, axis)
                .unwrap(),
            Distance::NotApplicable
        );
    }

    #[test]
    fn test_cone_zero_cut_is_an_error() {
        let config = DistanceConfig::default();
        let geometry = DetectorGeometry::default();
        let engine = DistanceEngine::new(&config, &geometry);
        let zero_cell = hit(5.0, 0.0, 0.0, 0.0, HitType::ECal);
        assert_eq!(
            engine.cone_distance_to_point(
                CaloHitId(7),
                &zero_cell,
                CartesianVector::ZERO,
                CartesianVector::new(0.0, 0.0, 1.0)
            ),
            Err(Error::ZeroDistanceCut(CaloHitId(7)))
        );
    }

    #[test]
    fn test_validate() {
        assert!(DistanceConfig::default().validate().is_ok());
        assert!(DistanceConfig::default()
            .with_generic_distance_cut(0.0)
            .validate()
            .is_err());
        assert!(DistanceConfig::default()
            .with_projection_window(10.0, -10.0)
            .validate()
            .unwrap_err()
            .is_configuration());
    }
}
