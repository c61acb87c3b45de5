//! Inward clustering.
//!
//! Layers are visited from the outermost to the innermost. In each layer
//! the available hits are first offered to the clusters occupying the next
//! few outer layers, then to the clusters occupying the layer itself, and
//! whatever is left seeds new clusters. Cluster directions are refitted
//! after every layer and steer the cone searches of the following layers.
#![allow(clippy::float_cmp)]

use log::{debug, trace};
use rustpfa_core::{
    fit_layer_centroids, CaloHitId, ClusterFitResult, ClusterId, Distance, Error, Event, Geometry,
    HitType, PseudoLayer, Result,
};

use crate::distance::{DistanceConfig, DistanceEngine};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Order in which the candidate hits of a layer are processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HitSortingStrategy {
    /// Descending hadronic energy, ties by hit id.
    #[default]
    HadronicEnergy,
    /// Descending input energy, ties by hit id.
    InputEnergy,
    /// Order in which the hits appear in the layer.
    Insertion,
}

/// When a hit matched during the step-back pass is attached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusterFormationStrategy {
    /// Attach to the best cluster as soon as one step-back layer yields a match.
    #[default]
    BestPerStepBackLayer,
    /// Attach to the best cluster over all step-back layers.
    BestOverall,
}

/// Inward clustering configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InwardClusteringConfig {
    /// Candidate hit ordering.
    pub hit_sorting_strategy: HitSortingStrategy,
    /// Only cluster ECal hits.
    pub should_use_only_ecal_hits: bool,
    /// Also cluster hits flagged isolated.
    pub should_use_isolated_hits: bool,
    /// Step-back layers for fine granularity hits.
    pub layers_to_step_back_fine: PseudoLayer,
    /// Step-back layers for coarse granularity hits.
    pub layers_to_step_back_coarse: PseudoLayer,
    /// Step-back attachment strategy.
    pub cluster_formation_strategy: ClusterFormationStrategy,
    /// Distance constants.
    pub distance: DistanceConfig,
    /// Layer span above which a centroid fit is performed.
    pub n_layers_spanned_for_fit: PseudoLayer,
    /// Layer span above which an outer-minus-inner centroid direction is used.
    pub n_layers_spanned_for_approx_fit: PseudoLayer,
    /// Number of layers entering the centroid fit.
    pub n_layers_to_fit: PseudoLayer,
    /// MIP fraction at or below which the fit window is widened.
    pub n_layers_to_fit_low_mip_cut: f32,
    /// Fit window multiplier for low MIP fraction clusters.
    pub n_layers_to_fit_low_mip_multiplier: PseudoLayer,
    /// Alignment cut paired with `fit_success_chi2_cut1`.
    pub fit_success_dot_product_cut1: f32,
    /// Chi2 cut paired with `fit_success_dot_product_cut1`.
    pub fit_success_chi2_cut1: f32,
    /// Alignment cut paired with `fit_success_chi2_cut2`.
    pub fit_success_dot_product_cut2: f32,
    /// Chi2 cut paired with `fit_success_dot_product_cut2`.
    pub fit_success_chi2_cut2: f32,
    /// Fit chi2 above which the MIP-track flag is cleared.
    pub mip_track_chi2_cut: f32,
}

impl Default for InwardClusteringConfig {
    fn default() -> Self {
        Self {
            hit_sorting_strategy: HitSortingStrategy::HadronicEnergy,
            should_use_only_ecal_hits: false,
            should_use_isolated_hits: false,
            layers_to_step_back_fine: 3,
            layers_to_step_back_coarse: 3,
            cluster_formation_strategy: ClusterFormationStrategy::BestPerStepBackLayer,
            distance: DistanceConfig::default(),
            n_layers_spanned_for_fit: 6,
            n_layers_spanned_for_approx_fit: 10,
            n_layers_to_fit: 8,
            n_layers_to_fit_low_mip_cut: 0.5,
            n_layers_to_fit_low_mip_multiplier: 2,
            fit_success_dot_product_cut1: 0.75,
            fit_success_chi2_cut1: 5.0,
            fit_success_dot_product_cut2: 0.5,
            fit_success_chi2_cut2: 2.5,
            mip_track_chi2_cut: 2.5,
        }
    }
}

impl InwardClusteringConfig {
    /// Sets the candidate hit ordering.
    #[must_use]
    pub fn with_hit_sorting_strategy(mut self, strategy: HitSortingStrategy) -> Self {
        self.hit_sorting_strategy = strategy;
        self
    }

    /// Sets the step-back attachment strategy.
    #[must_use]
    pub fn with_cluster_formation_strategy(mut self, strategy: ClusterFormationStrategy) -> Self {
        self.cluster_formation_strategy = strategy;
        self
    }

    /// Sets the step-back layer counts (fine, coarse).
    #[must_use]
    pub fn with_layers_to_step_back(mut self, fine: PseudoLayer, coarse: PseudoLayer) -> Self {
        self.layers_to_step_back_fine = fine;
        self.layers_to_step_back_coarse = coarse;
        self
    }

    /// Sets the distance constants.
    #[must_use]
    pub fn with_distance(mut self, distance: DistanceConfig) -> Self {
        self.distance = distance;
        self
    }

    /// Sets the isolated and ECal-only hit filters.
    #[must_use]
    pub fn with_hit_filters(mut self, use_isolated_hits: bool, use_only_ecal_hits: bool) -> Self {
        self.should_use_isolated_hits = use_isolated_hits;
        self.should_use_only_ecal_hits = use_only_ecal_hits;
        self
    }

    /// Sets the full and approximate fit span thresholds.
    #[must_use]
    pub fn with_fit_spans(mut self, full: PseudoLayer, approximate: PseudoLayer) -> Self {
        self.n_layers_spanned_for_fit = full;
        self.n_layers_spanned_for_approx_fit = approximate;
        self
    }

    /// Sets the fit window, its low-MIP cut and multiplier.
    #[must_use]
    pub fn with_fit_window(
        mut self,
        n_layers: PseudoLayer,
        low_mip_cut: f32,
        low_mip_multiplier: PseudoLayer,
    ) -> Self {
        self.n_layers_to_fit = n_layers;
        self.n_layers_to_fit_low_mip_cut = low_mip_cut;
        self.n_layers_to_fit_low_mip_multiplier = low_mip_multiplier;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        self.distance.validate()?;
        if self.n_layers_to_fit == 0 {
            return Err(Error::ConfigError("n_layers_to_fit must be at least 1".into()));
        }
        if self.n_layers_to_fit_low_mip_multiplier == 0 {
            return Err(Error::ConfigError(
                "n_layers_to_fit_low_mip_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Number of layers entering the centroid fit of a cluster with the
    /// given MIP fraction.
    #[must_use]
    pub fn layers_to_fit(&self, mip_fraction: f32) -> PseudoLayer {
        if mip_fraction - self.n_layers_to_fit_low_mip_cut < f32::EPSILON {
            self.n_layers_to_fit
                .saturating_mul(self.n_layers_to_fit_low_mip_multiplier)
        } else {
            self.n_layers_to_fit
        }
    }
}

/// Counters collected over one clustering pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InwardClusteringStatistics {
    /// Occupied layers visited.
    pub layers_processed: usize,
    /// Hits attached to clusters in outer layers.
    pub hits_added_from_previous_layers: usize,
    /// Hits attached to clusters in their own layer.
    pub hits_added_in_same_layer: usize,
    /// Clusters seeded.
    pub clusters_created: usize,
    /// Centroid fits kept as successful.
    pub successful_fits: usize,
    /// Centroid fits marked unsuccessful for poor alignment with the
    /// initial direction.
    pub rejected_fits: usize,
    /// Approximate directions assigned.
    pub approximate_fits: usize,
    /// MIP-track flags cleared after a poor fit.
    pub mip_flags_cleared: usize,
    /// Clusters deleted at the end because they held no hits.
    pub empty_clusters_removed: usize,
}

/// Inward clustering algorithm.
pub struct InwardClustering {
    config: InwardClusteringConfig,
}

impl InwardClustering {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: InwardClusteringConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &InwardClusteringConfig {
        &self.config
    }

    /// Clusters the available hits of the event.
    ///
    /// New clusters are registered in the event; clusters left without hits
    /// are deleted before returning.
    pub fn cluster(
        &self,
        event: &mut Event,
        geometry: &dyn Geometry,
    ) -> Result<InwardClusteringStatistics> {
        let mut stats = InwardClusteringStatistics::default();
        let ordered = event.ordered_calo_hits()?;
        if ordered.is_empty() {
            return Ok(stats);
        }

        let engine = DistanceEngine::new(&self.config.distance, geometry);
        let mut clusters: Vec<ClusterId> = Vec::new();

        for (layer, hits) in ordered.iter().rev() {
            let mut candidates = self.candidates(event, hits);
            trace!("layer {layer}: {} candidate hits", candidates.len());

            self.find_hits_in_previous_layers(
                layer,
                &mut candidates,
                &clusters,
                event,
                &engine,
                geometry,
                &mut stats,
            )?;
            self.find_hits_in_same_layer(
                layer,
                &mut candidates,
                &mut clusters,
                event,
                &engine,
                &mut stats,
            )?;
            self.update_cluster_properties(&clusters, event, &mut stats)?;
            stats.layers_processed += 1;
        }

        stats.empty_clusters_removed = event.remove_empty_clusters(&clusters)?;
        debug!(
            "inward clustering: {} clusters from {} layers",
            stats.clusters_created - stats.empty_clusters_removed,
            stats.layers_processed
        );
        Ok(stats)
    }

    fn candidates(&self, event: &Event, hits: &[CaloHitId]) -> Vec<CaloHitId> {
        let store = event.hits();
        let mut candidates: Vec<CaloHitId> = hits
            .iter()
            .copied()
            .filter(|&id| {
                let hit = &store[id];
                store.is_available(id)
                    && (self.config.should_use_isolated_hits || !hit.is_isolated())
                    && (!self.config.should_use_only_ecal_hits || hit.hit_type() == HitType::ECal)
            })
            .collect();

        match self.config.hit_sorting_strategy {
            HitSortingStrategy::HadronicEnergy => candidates.sort_by(|&a, &b| {
                store[b]
                    .hadronic_energy()
                    .total_cmp(&store[a].hadronic_energy())
                    .then(a.cmp(&b))
            }),
            HitSortingStrategy::InputEnergy => candidates.sort_by(|&a, &b| {
                store[b]
                    .input_energy()
                    .total_cmp(&store[a].input_energy())
                    .then(a.cmp(&b))
            }),
            HitSortingStrategy::Insertion => {}
        }
        candidates
    }

    /// Best cluster for a hit at a search layer, starting from the given
    /// running best. Ties in distance go to the larger hadronic energy.
    fn find_best_cluster(
        &self,
        hit: CaloHitId,
        search_layer: PseudoLayer,
        clusters: &[ClusterId],
        event: &Event,
        engine: &DistanceEngine<'_>,
        best: &mut BestCluster,
    ) -> Result<()> {
        for &id in clusters {
            let cluster = event.cluster(id)?;
            let energy = cluster.hadronic_energy();
            // No running best: equal distances must reach the energy tie-break.
            let distance =
                engine.generic_distance(cluster, hit, event.hits(), search_layer, f32::MAX)?;

            if let Distance::Found(distance) = distance {
                if distance < best.distance || (distance == best.distance && energy > best.energy) {
                    best.cluster = Some(id);
                    best.energy = energy;
                    best.distance = distance;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn find_hits_in_previous_layers(
        &self,
        layer: PseudoLayer,
        candidates: &mut Vec<CaloHitId>,
        clusters: &[ClusterId],
        event: &mut Event,
        engine: &DistanceEngine<'_>,
        geometry: &dyn Geometry,
        stats: &mut InwardClusteringStatistics,
    ) -> Result<()> {
        let mut remaining = Vec::with_capacity(candidates.len());

        for &hit in candidates.iter() {
            let hit_type = event.hits().try_get(hit)?.hit_type();
            let layers_to_step_back = if geometry.granularity(hit_type).is_fine() {
                self.config.layers_to_step_back_fine
            } else {
                self.config.layers_to_step_back_coarse
            };

            let mut best = BestCluster::new(self.config.distance.generic_distance_cut);
            for step_back in 1..=layers_to_step_back.min(layer) {
                let Some(search_layer) = layer.checked_add(step_back) else {
                    break;
                };
                self.find_best_cluster(hit, search_layer, clusters, event, engine, &mut best)?;

                if self.config.cluster_formation_strategy
                    == ClusterFormationStrategy::BestPerStepBackLayer
                {
                    if let Some(cluster) = best.cluster {
                        event.add_hit_to_cluster(cluster, hit)?;
                        break;
                    }
                }
            }

            if self.config.cluster_formation_strategy == ClusterFormationStrategy::BestOverall {
                if let Some(cluster) = best.cluster {
                    event.add_hit_to_cluster(cluster, hit)?;
                }
            }

            if event.hits().is_available(hit) {
                remaining.push(hit);
            } else {
                stats.hits_added_from_previous_layers += 1;
            }
        }

        *candidates = remaining;
        Ok(())
    }

    fn find_hits_in_same_layer(
        &self,
        layer: PseudoLayer,
        candidates: &mut Vec<CaloHitId>,
        clusters: &mut Vec<ClusterId>,
        event: &mut Event,
        engine: &DistanceEngine<'_>,
        stats: &mut InwardClusteringStatistics,
    ) -> Result<()> {
        while !candidates.is_empty() {
            let mut clusters_modified = true;

            while clusters_modified {
                clusters_modified = false;
                let mut index = 0;

                while index < candidates.len() {
                    let hit = candidates[index];
                    let mut best = BestCluster::new(self.config.distance.generic_distance_cut);
                    self.find_best_cluster(hit, layer, clusters, event, engine, &mut best)?;

                    if let Some(cluster) = best.cluster {
                        event.add_hit_to_cluster(cluster, hit)?;
                        candidates.remove(index);
                        clusters_modified = true;
                        stats.hits_added_in_same_layer += 1;
                    } else {
                        index += 1;
                    }
                }
            }

            if !candidates.is_empty() {
                let seed = candidates.remove(0);
                clusters.push(event.create_cluster(seed)?);
                stats.clusters_created += 1;
            }
        }
        Ok(())
    }

    fn update_cluster_properties(
        &self,
        clusters: &[ClusterId],
        event: &mut Event,
        stats: &mut InwardClusteringStatistics,
    ) -> Result<()> {
        for &id in clusters {
            let cluster = event.cluster(id)?;
            if cluster.n_hits() < 2 {
                continue;
            }
            let (Some(inner), Some(outer)) = (cluster.inner_layer(), cluster.outer_layer()) else {
                continue;
            };
            let n_layers_spanned = outer - inner;
            let mut clear_mip_flag = false;

            let fit = if n_layers_spanned > self.config.n_layers_spanned_for_fit {
                let n_layers_to_fit = self.config.layers_to_fit(cluster.mip_fraction());
                let end_layer = if n_layers_spanned > n_layers_to_fit {
                    inner + n_layers_to_fit
                } else {
                    outer
                };

                match fit_layer_centroids(cluster, event.hits(), inner, end_layer) {
                    Some(fit) => {
                        let dot_product = fit.direction.dot(&cluster.initial_direction());
                        let poorly_aligned = (dot_product < self.config.fit_success_dot_product_cut1
                            && fit.chi2 > self.config.fit_success_chi2_cut1)
                            || (dot_product < self.config.fit_success_dot_product_cut2
                                && fit.chi2 > self.config.fit_success_chi2_cut2);
                        clear_mip_flag =
                            fit.chi2 > self.config.mip_track_chi2_cut && cluster.is_mip_track();
                        if poorly_aligned {
                            stats.rejected_fits += 1;
                        } else {
                            stats.successful_fits += 1;
                        }
                        fit.with_success(!poorly_aligned)
                    }
                    None => ClusterFitResult::default(),
                }
            } else if n_layers_spanned > self.config.n_layers_spanned_for_approx_fit {
                match (cluster.centroid(outer), cluster.centroid(inner)) {
                    (Some(outer_centroid), Some(inner_centroid)) => {
                        stats.approximate_fits += 1;
                        ClusterFitResult::from_direction((outer_centroid - inner_centroid).unit())
                    }
                    _ => ClusterFitResult::default(),
                }
            } else {
                ClusterFitResult::default()
            };

            let cluster = event.cluster_mut(id)?;
            cluster.set_current_fit(fit);
            if clear_mip_flag {
                cluster.set_mip_track_flag(false);
                stats.mip_flags_cleared += 1;
            }
        }
        Ok(())
    }
}

struct BestCluster {
    cluster: Option<ClusterId>,
    energy: f32,
    distance: f32,
}

impl BestCluster {
    fn new(distance_cut: f32) -> Self {
        Self {
            cluster: None,
            energy: 0.0,
            distance: distance_cut,
        }
    }
}
