//! Isolated hit merging.
//!
//! Dissolves clusters too small to be meaningful and hands their hits, along
//! with the hits flagged isolated, to the closest surviving cluster. Merged
//! hits are attached as isolated hits: they add energy but take no part in
//! the layer structure or the fits.

use log::debug;
use rustpfa_core::{CaloHitId, ClusterId, Error, Event, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Isolated hit merging configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IsolatedHitMergingConfig {
    /// Whether the step runs at all.
    pub enabled: bool,
    /// Clusters with fewer layered hits are dissolved.
    pub min_hits_in_cluster: usize,
    /// Maximum hit-to-cluster distance (mm) for a merge.
    pub max_recombination_distance: f32,
    /// Minimum cosine between the cluster initial direction and the hit position.
    pub min_cos_opening_angle: f32,
}

impl Default for IsolatedHitMergingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_hits_in_cluster: 4,
            max_recombination_distance: 250.0,
            min_cos_opening_angle: 0.7,
        }
    }
}

impl IsolatedHitMergingConfig {
    /// Enables or disables the step.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the minimum cluster size.
    #[must_use]
    pub fn with_min_hits_in_cluster(mut self, min_hits: usize) -> Self {
        self.min_hits_in_cluster = min_hits;
        self
    }

    /// Sets the maximum recombination distance.
    #[must_use]
    pub fn with_max_recombination_distance(mut self, distance: f32) -> Self {
        self.max_recombination_distance = distance;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_recombination_distance <= 0.0 {
            return Err(Error::ConfigError(format!(
                "max recombination distance must be positive, got {}",
                self.max_recombination_distance
            )));
        }
        if !(-1.0..=1.0).contains(&self.min_cos_opening_angle) {
            return Err(Error::ConfigError(format!(
                "min cos opening angle must lie in [-1, 1], got {}",
                self.min_cos_opening_angle
            )));
        }
        Ok(())
    }
}

/// Counters collected over one merging pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IsolatedHitMergingStatistics {
    /// Small clusters dissolved.
    pub clusters_dissolved: usize,
    /// Hits offered to the surviving clusters.
    pub candidate_hits: usize,
    /// Hits merged into a cluster.
    pub hits_merged: usize,
}

/// Isolated hit merging algorithm.
pub struct IsolatedHitMerging {
    config: IsolatedHitMergingConfig,
}

impl IsolatedHitMerging {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: IsolatedHitMergingConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &IsolatedHitMergingConfig {
        &self.config
    }

    /// Runs the merging step on the event.
    pub fn merge(&self, event: &mut Event) -> Result<IsolatedHitMergingStatistics> {
        let mut stats = IsolatedHitMergingStatistics::default();

        let mut candidates: Vec<CaloHitId> = Vec::new();
        for id in event.cluster_ids() {
            if event.cluster(id)?.n_hits() < self.config.min_hits_in_cluster {
                candidates.extend(event.delete_cluster(id)?);
                stats.clusters_dissolved += 1;
            }
        }

        let store = event.hits();
        candidates.extend(
            store
                .iter()
                .filter(|&(id, hit)| hit.is_isolated() && store.is_available(id))
                .map(|(id, _)| id),
        );
        candidates.sort_unstable();
        candidates.dedup();
        stats.candidate_hits = candidates.len();

        let clusters = event.cluster_ids();
        for hit in candidates {
            if !event.hits().is_available(hit) {
                continue;
            }
            if let Some((cluster, distance)) = self.closest_cluster(event, &clusters, hit)? {
                if distance < self.config.max_recombination_distance {
                    event.add_isolated_hit_to_cluster(cluster, hit)?;
                    stats.hits_merged += 1;
                }
            }
        }

        debug!(
            "isolated hit merging: dissolved {} clusters, merged {} of {} hits",
            stats.clusters_dissolved, stats.hits_merged, stats.candidate_hits
        );
        Ok(stats)
    }

    /// Closest cluster to a hit, measured to the cluster's non-isolated
    /// layered hits. Equal distances go to the larger hadronic energy.
    fn closest_cluster(
        &self,
        event: &Event,
        clusters: &[ClusterId],
        hit: CaloHitId,
    ) -> Result<Option<(ClusterId, f32)>> {
        let store = event.hits();
        let position = store.try_get(hit)?.position();

        let mut best: Option<(ClusterId, f32, f32)> = None;
        for &id in clusters {
            let cluster = event.cluster(id)?;
            if cluster.initial_direction().cos_opening_angle(&position)
                < self.config.min_cos_opening_angle
            {
                continue;
            }

            let Some(distance) = cluster
                .ordered_hits()
                .hits()
                .filter(|&member| !store[member].is_isolated())
                .map(|member| (position - store[member].position()).magnitude())
                .min_by(f32::total_cmp)
            else {
                continue;
            };

            let energy = cluster.hadronic_energy();
            let is_better = match best {
                None => true,
                Some((_, best_distance, best_energy)) => {
                    distance < best_distance || (distance <= best_distance && energy > best_energy)
                }
            };
            if is_better {
                best = Some((id, distance, energy));
            }
        }
        Ok(best.map(|(id, distance, _)| (id, distance)))
    }
}
