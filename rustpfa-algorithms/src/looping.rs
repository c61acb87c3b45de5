//! Looping track association.
//!
//! Low transverse momentum tracks curl up before reaching the barrel and
//! enter the ECal endcap. Their helix, projected onto the transverse plane,
//! is a circle: a compatible cluster starts close to that circle, points
//! along the helix tangent and carries an energy consistent with the track.
#![allow(clippy::float_cmp)]

use log::{debug, trace};
use rustpfa_core::{
    fit_start, CartesianVector, Cluster, ClusterId, Error, Event, Geometry, PseudoLayer, Result,
    SubDetector, Track, TrackId,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Looping track association configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LoopingTrackAssociationConfig {
    /// Margin (mm) around the ECal endcap inner z used for tracks and clusters.
    pub max_endcap_delta_z: f32,
    /// Minimum layered hits in a candidate cluster.
    pub min_hits_in_cluster: usize,
    /// Minimum occupied layers in a candidate cluster.
    pub min_occupied_layers_in_cluster: usize,
    /// Candidate clusters must start at or before this pseudo-layer.
    pub max_cluster_inner_layer: PseudoLayer,
    /// Maximum absolute track/cluster energy compatibility.
    pub max_absolute_track_cluster_chi: f32,
    /// Energy resolution factor of the compatibility, in units of sqrt(GeV).
    pub hadronic_energy_resolution: f32,
    /// Upper bound (exclusive) of the radial deviation band (mm).
    pub max_delta_r: f32,
    /// Lower bound (exclusive) of the radial deviation band (mm).
    pub min_delta_r: f32,
    /// Occupied layers entering the cluster direction fit.
    pub n_cluster_fit_layers: usize,
    /// Layers after the inner layer entering the mean radial deviation.
    pub n_cluster_delta_r_layers: PseudoLayer,
    /// Minimum direction cosine unless the cluster is MIP-like.
    pub direction_cosine_cut: f32,
    /// MIP fraction from which the direction cosine cut is waived.
    pub cluster_mip_fraction_cut: f32,
    /// Tier 1 direction cosine.
    pub direction_cosine_cut1: f32,
    /// Tier 2 direction cosine.
    pub direction_cosine_cut2: f32,
    /// Tier 2 radial deviation.
    pub delta_r_cut2: f32,
    /// Tier 3 direction cosine.
    pub direction_cosine_cut3: f32,
    /// Tier 3 radial deviation.
    pub delta_r_cut3: f32,
    /// Tier 4 direction cosine.
    pub direction_cosine_cut4: f32,
    /// Tier 4 radial deviation.
    pub delta_r_cut4: f32,
}

impl Default for LoopingTrackAssociationConfig {
    fn default() -> Self {
        Self {
            max_endcap_delta_z: 50.0,
            min_hits_in_cluster: 4,
            min_occupied_layers_in_cluster: 4,
            max_cluster_inner_layer: 9,
            max_absolute_track_cluster_chi: 2.0,
            hadronic_energy_resolution: 0.6,
            max_delta_r: 50.0,
            min_delta_r: -100.0,
            n_cluster_fit_layers: 10,
            n_cluster_delta_r_layers: 9,
            direction_cosine_cut: 0.975,
            cluster_mip_fraction_cut: 0.5,
            direction_cosine_cut1: 0.925,
            direction_cosine_cut2: 0.85,
            delta_r_cut2: 50.0,
            direction_cosine_cut3: 0.75,
            delta_r_cut3: 25.0,
            direction_cosine_cut4: 0.0,
            delta_r_cut4: 10.0,
        }
    }
}

impl LoopingTrackAssociationConfig {
    /// Sets the endcap z margin.
    #[must_use]
    pub fn with_max_endcap_delta_z(mut self, delta_z: f32) -> Self {
        self.max_endcap_delta_z = delta_z;
        self
    }

    /// Sets the cluster size requirements (hits, occupied layers).
    #[must_use]
    pub fn with_min_cluster_size(mut self, hits: usize, layers: usize) -> Self {
        self.min_hits_in_cluster = hits;
        self.min_occupied_layers_in_cluster = layers;
        self
    }

    /// Sets the radial deviation band.
    #[must_use]
    pub fn with_delta_r_band(mut self, min: f32, max: f32) -> Self {
        self.min_delta_r = min;
        self.max_delta_r = max;
        self
    }

    /// Sets the energy compatibility cut and resolution.
    #[must_use]
    pub fn with_energy_compatibility(mut self, max_chi: f32, resolution: f32) -> Self {
        self.max_absolute_track_cluster_chi = max_chi;
        self.hadronic_energy_resolution = resolution;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.hadronic_energy_resolution <= 0.0 {
            return Err(Error::ConfigError(format!(
                "hadronic energy resolution must be positive, got {}",
                self.hadronic_energy_resolution
            )));
        }
        if self.min_delta_r >= self.max_delta_r {
            return Err(Error::ConfigError(format!(
                "empty delta R band ({}, {})",
                self.min_delta_r, self.max_delta_r
            )));
        }
        if self.n_cluster_fit_layers < 2 {
            return Err(Error::ConfigError(
                "n_cluster_fit_layers must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// Track/cluster energy compatibility in units of the expected spread.
    #[must_use]
    pub fn track_cluster_compatibility(&self, cluster_energy: f32, track_energy: f32) -> f32 {
        (cluster_energy - track_energy) / (self.hadronic_energy_resolution * track_energy.sqrt())
    }

    /// Whether a direction cosine and radial deviation fall in one of the
    /// four confidence tiers.
    #[must_use]
    pub fn is_possible_match(&self, direction_cosine: f32, delta_r: f32) -> bool {
        direction_cosine > self.direction_cosine_cut1
            || (direction_cosine > self.direction_cosine_cut2 && delta_r < self.delta_r_cut2)
            || (direction_cosine > self.direction_cosine_cut3 && delta_r < self.delta_r_cut3)
            || (direction_cosine > self.direction_cosine_cut4 && delta_r < self.delta_r_cut4)
    }
}

/// Counters collected over one association pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoopingTrackAssociationStatistics {
    /// Tracks passing the track-level selection.
    pub tracks_considered: usize,
    /// Tracks skipped for a straight helix.
    pub straight_tracks_skipped: usize,
    /// Associations made.
    pub associations: usize,
}

/// Circle of a helix projected onto the transverse plane.
#[derive(Clone, Copy, Debug, PartialEq)]
struct HelixProjection {
    x_centre: f32,
    y_centre: f32,
    radius: f32,
    direction_cos_z: f32,
}

impl HelixProjection {
    fn from_track(track: &Track) -> Option<Self> {
        let helix = track.helix_at_ecal();
        let radius = helix.radius()?;
        let (x_centre, y_centre) = helix.centre_xy()?;
        Some(Self {
            x_centre,
            y_centre,
            radius,
            direction_cos_z: helix.direction_cos_z(),
        })
    }

    fn offset(&self, position: CartesianVector) -> (f32, f32) {
        (position.x - self.x_centre, position.y - self.y_centre)
    }

    /// Distance of a point from the circle, positive outside.
    fn delta_r(&self, position: CartesianVector) -> f32 {
        let (dx, dy) = self.offset(position);
        dx.hypot(dy) - self.radius.abs()
    }

    /// Tangent direction of the helix at the point.
    fn direction_at(&self, position: CartesianVector) -> CartesianVector {
        let (dx, dy) = self.offset(position);
        let transverse = 1.0 - self.direction_cos_z * self.direction_cos_z;

        if dy != 0.0 {
            let mut dcos_x = (transverse / (1.0 + (dx * dx) / (dy * dy))).max(0.0).sqrt();
            if dy * self.radius < 0.0 {
                dcos_x = -dcos_x;
            }
            CartesianVector::new(dcos_x, -(dx / dy) * dcos_x, self.direction_cos_z)
        } else {
            let mut dcos_y = transverse.max(0.0).sqrt();
            if dx * self.radius > 0.0 {
                dcos_y = -dcos_y;
            }
            CartesianVector::new(0.0, dcos_y, self.direction_cos_z)
        }
    }
}

/// Looping track association algorithm.
pub struct LoopingTrackAssociation {
    config: LoopingTrackAssociationConfig,
}

impl LoopingTrackAssociation {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: LoopingTrackAssociationConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &LoopingTrackAssociationConfig {
        &self.config
    }

    /// Associates unassociated endcap tracks with compatible clusters.
    ///
    /// Requires the ECal endcap parameters from the geometry.
    pub fn associate(
        &self,
        event: &mut Event,
        geometry: &dyn Geometry,
    ) -> Result<LoopingTrackAssociationStatistics> {
        let endcap = geometry
            .sub_detector(SubDetector::ECalEndCap)
            .ok_or(Error::MissingSubDetector(SubDetector::ECalEndCap))?;
        let endcap_z = endcap.inner_z;

        let mut track_ids: Vec<TrackId> = event.tracks().iter().map(Track::id).collect();
        track_ids.sort_by(|&a, &b| {
            let energy_a = event.tracks()[a.index()].energy_at_dca();
            let energy_b = event.tracks()[b.index()].energy_at_dca();
            energy_b.total_cmp(&energy_a).then(a.cmp(&b))
        });

        let mut stats = LoopingTrackAssociationStatistics::default();
        for track_id in track_ids {
            let track = event.track(track_id)?;
            if track.has_associated_cluster() || !track.can_form_pfo() || !track.daughters().is_empty() {
                continue;
            }

            let track_z = track.state_at_ecal().position.z;
            if track_z.abs() < endcap_z - self.config.max_endcap_delta_z {
                continue;
            }

            let Some(helix) = HelixProjection::from_track(track) else {
                stats.straight_tracks_skipped += 1;
                continue;
            };

            let track_energy = track.energy_at_dca();
            if track_energy <= 0.0 {
                continue;
            }
            stats.tracks_considered += 1;

            if let Some(cluster) = self.best_cluster(event, &helix, track_z, track_energy, endcap_z)? {
                trace!("associating {track_id} with {cluster}");
                event.add_track_cluster_association(track_id, cluster)?;
                stats.associations += 1;
            }
        }

        debug!(
            "looping track association: {} associations from {} tracks",
            stats.associations, stats.tracks_considered
        );
        Ok(stats)
    }

    fn best_cluster(
        &self,
        event: &Event,
        helix: &HelixProjection,
        track_z: f32,
        track_energy: f32,
        endcap_z: f32,
    ) -> Result<Option<ClusterId>> {
        let mut best: Option<ClusterId> = None;
        let mut smallest_delta_r = f32::MAX;
        let mut min_energy_difference = f32::MAX;

        for cluster in event.clusters() {
            if !cluster.associated_tracks().is_empty()
                || cluster.n_hits() < self.config.min_hits_in_cluster
                || cluster.n_layers() < self.config.min_occupied_layers_in_cluster
            {
                continue;
            }

            let Some(inner_layer) = cluster.inner_layer() else {
                continue;
            };
            if inner_layer > self.config.max_cluster_inner_layer {
                continue;
            }
            let inner_centroid = cluster.centroid(inner_layer).ok_or_else(|| {
                Error::InvariantViolation(format!("{} has no centroid in its inner layer", cluster.id()))
            })?;

            let cluster_z = inner_centroid.z;
            if endcap_z - cluster_z.abs() > self.config.max_endcap_delta_z
                || cluster_z * track_z < 0.0
            {
                continue;
            }

            let chi = self
                .config
                .track_cluster_compatibility(cluster.track_comparison_energy(), track_energy);
            if chi.abs() > self.config.max_absolute_track_cluster_chi {
                continue;
            }

            let inner_delta_r = helix.delta_r(inner_centroid);
            let mean_delta_r = self.mean_delta_r(cluster, event, helix)?;
            let in_band = |delta_r: f32| delta_r < self.config.max_delta_r && delta_r > self.config.min_delta_r;
            if !in_band(inner_delta_r) && !in_band(mean_delta_r) {
                continue;
            }
            let delta_r = inner_delta_r.abs().min(mean_delta_r.abs());

            let helix_direction = helix.direction_at(inner_centroid);
            let Some(fit) = fit_start(cluster, event.hits(), self.config.n_cluster_fit_layers) else {
                continue;
            };
            let direction_cosine = helix_direction.dot(&fit.direction);

            if direction_cosine < self.config.direction_cosine_cut
                && cluster.mip_fraction() < self.config.cluster_mip_fraction_cut
            {
                continue;
            }

            if self.config.is_possible_match(direction_cosine, delta_r) {
                let energy_difference = (cluster.hadronic_energy() - track_energy).abs();
                if delta_r < smallest_delta_r
                    || (delta_r == smallest_delta_r && energy_difference < min_energy_difference)
                {
                    best = Some(cluster.id());
                    smallest_delta_r = delta_r;
                    min_energy_difference = energy_difference;
                }
            }
        }
        Ok(best)
    }

    /// Mean radial distance from the helix circle of the hits in the first
    /// layers of the cluster.
    fn mean_delta_r(&self, cluster: &Cluster, event: &Event, helix: &HelixProjection) -> Result<f32> {
        let Some(inner_layer) = cluster.inner_layer() else {
            return Err(Error::DegenerateInput(format!("{} has no layered hits", cluster.id())));
        };
        let end_layer = inner_layer.saturating_add(self.config.n_cluster_delta_r_layers);

        let mut sum = 0.0_f32;
        let mut n_contributions = 0_u32;
        for (layer, hits) in cluster.ordered_hits().iter() {
            if layer > end_layer {
                break;
            }
            for &id in hits {
                let (dx, dy) = helix.offset(event.hits().try_get(id)?.position());
                sum += dx.hypot(dy);
                n_contributions += 1;
            }
        }

        if n_contributions == 0 {
            return Err(Error::DegenerateInput(format!(
                "no hits of {} within {} layers of its inner layer",
                cluster.id(),
                self.config.n_cluster_delta_r_layers
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / n_contributions as f32;
        Ok(mean - helix.radius.abs())
    }
}
