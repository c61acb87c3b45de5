//! Per-event working set: hits, clusters and tracks.
#![allow(clippy::cast_possible_truncation)]

use log::trace;

use crate::cluster::{Cluster, ClusterId, ClusterProperties};
use crate::error::{Error, Result};
use crate::hit::{CaloHit, CaloHitId, CaloHitParameters, CaloHitStore};
use crate::ordered::OrderedCaloHitList;
use crate::track::{Track, TrackId, TrackParameters};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Serialisable description of one event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EventRecord {
    /// Calo hits, in arena order.
    pub calo_hits: Vec<CaloHitParameters>,
    /// Tracks, in id order.
    pub tracks: Vec<TrackParameters>,
}

/// Mutable state of one event.
///
/// All changes of cluster membership go through this type so the hit owner
/// column and the cluster hit lists never disagree. Deleted clusters leave an
/// empty slot, so cluster ids are never reused within an event.
#[derive(Debug, Clone, Default)]
pub struct Event {
    hits: CaloHitStore,
    clusters: Vec<Option<Cluster>>,
    tracks: Vec<Track>,
}

impl Event {
    /// Creates an event from hits and tracks.
    ///
    /// Returns an error if a track lists a daughter that does not exist.
    pub fn new(hits: CaloHitStore, tracks: &[TrackParameters]) -> Result<Self> {
        let tracks: Vec<Track> = tracks
            .iter()
            .enumerate()
            .map(|(index, parameters)| Track::new(TrackId(index as u32), parameters))
            .collect();

        for track in &tracks {
            if let Some(&daughter) = track.daughters().iter().find(|d| d.index() >= tracks.len()) {
                return Err(Error::InvalidTrack(daughter));
            }
        }

        Ok(Self {
            hits,
            clusters: Vec::new(),
            tracks,
        })
    }

    /// Creates an event from its serialisable description.
    pub fn from_record(record: &EventRecord) -> Result<Self> {
        let hits = record.calo_hits.iter().map(CaloHit::new).collect();
        Self::new(hits, &record.tracks)
    }

    /// The hit arena.
    #[must_use]
    pub fn hits(&self) -> &CaloHitStore {
        &self.hits
    }

    /// Mutable access to one hit, for pseudo-layer and flag assignment.
    ///
    /// Only available hits can be changed; clustered hits feed cached
    /// cluster properties.
    pub fn hit_mut(&mut self, id: CaloHitId) -> Result<&mut CaloHit> {
        self.ensure_available(id)?;
        self.hits.get_mut(id)
    }

    /// All hits indexed by pseudo-layer.
    pub fn ordered_calo_hits(&self) -> Result<OrderedCaloHitList> {
        OrderedCaloHitList::from_store(&self.hits)
    }

    /// Tracks of the event.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// One track.
    pub fn track(&self, id: TrackId) -> Result<&Track> {
        self.tracks.get(id.index()).ok_or(Error::InvalidTrack(id))
    }

    /// A live cluster.
    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidCluster(id))
    }

    /// A live cluster, for fit and flag updates.
    pub fn cluster_mut(&mut self, id: ClusterId) -> Result<&mut Cluster> {
        self.clusters
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidCluster(id))
    }

    /// Live clusters in creation order.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().flatten()
    }

    /// Ids of the live clusters in creation order.
    #[must_use]
    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.clusters().map(Cluster::id).collect()
    }

    /// Number of live clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.clusters().count()
    }

    fn ensure_available(&self, hit: CaloHitId) -> Result<()> {
        self.hits.try_get(hit)?;
        match self.hits.owner(hit) {
            Some(owner) => Err(Error::HitNotAvailable { hit, owner }),
            None => Ok(()),
        }
    }

    /// Creates a single-hit cluster seeded by an available hit.
    pub fn create_cluster(&mut self, seed: CaloHitId) -> Result<ClusterId> {
        self.ensure_available(seed)?;
        let id = ClusterId(self.clusters.len() as u32);
        let cluster = Cluster::from_seed(id, seed, &self.hits[seed])?;
        self.hits.set_owner(seed, Some(id))?;
        self.clusters.push(Some(cluster));
        trace!("created {id} from {seed}");
        Ok(id)
    }

    /// Adds an available hit to the layered hits of a cluster.
    pub fn add_hit_to_cluster(&mut self, cluster: ClusterId, hit: CaloHitId) -> Result<()> {
        self.ensure_available(hit)?;
        let slot = self
            .clusters
            .get_mut(cluster.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidCluster(cluster))?;
        slot.add_hit(hit, &self.hits[hit])?;
        self.hits.set_owner(hit, Some(cluster))
    }

    /// Adds an available hit to a cluster as an isolated hit.
    pub fn add_isolated_hit_to_cluster(&mut self, cluster: ClusterId, hit: CaloHitId) -> Result<()> {
        self.ensure_available(hit)?;
        let slot = self
            .clusters
            .get_mut(cluster.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidCluster(cluster))?;
        slot.add_isolated_hit(hit, &self.hits[hit])?;
        self.hits.set_owner(hit, Some(cluster))
    }

    /// Removes a hit from a cluster, making it available again.
    ///
    /// The cluster stays in the working set even if it becomes empty.
    pub fn remove_hit_from_cluster(&mut self, cluster: ClusterId, hit: CaloHitId) -> Result<()> {
        let layer = self
            .hits
            .try_get(hit)?
            .pseudo_layer()
            .ok_or(Error::PseudoLayerNotSet(hit))?;
        if self.hits.owner(hit) != Some(cluster) {
            return Err(Error::NotPresent { hit, layer });
        }
        let slot = self
            .clusters
            .get_mut(cluster.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidCluster(cluster))?;
        slot.remove_hit(hit, &self.hits)?;
        self.hits.set_owner(hit, None)
    }

    /// Deletes a cluster, freeing its hits and dropping its track links.
    ///
    /// Returns the freed hits, layered hits first.
    pub fn delete_cluster(&mut self, cluster: ClusterId) -> Result<Vec<CaloHitId>> {
        let mut removed = self
            .clusters
            .get_mut(cluster.index())
            .and_then(Option::take)
            .ok_or(Error::InvalidCluster(cluster))?;

        let hits = removed.take_hits();
        for &hit in &hits {
            self.hits.set_owner(hit, None)?;
        }
        for &track in removed.associated_tracks() {
            self.tracks
                .get_mut(track.index())
                .ok_or(Error::InvalidTrack(track))?
                .clear_associated_cluster();
        }
        trace!("deleted {cluster}, freed {} hits", hits.len());
        Ok(hits)
    }

    /// Deletes those of the given clusters that hold no layered hits.
    ///
    /// Ids of already deleted clusters are ignored, so repeating the call
    /// is a no-op. Returns the number of clusters deleted.
    pub fn remove_empty_clusters(&mut self, clusters: &[ClusterId]) -> Result<usize> {
        let mut n_removed = 0;
        for &id in clusters {
            let is_empty = self
                .clusters
                .get(id.index())
                .and_then(Option::as_ref)
                .is_some_and(Cluster::is_empty);
            if is_empty {
                self.delete_cluster(id)?;
                n_removed += 1;
            }
        }
        Ok(n_removed)
    }

    /// Links a track and a cluster on both sides.
    pub fn add_track_cluster_association(&mut self, track: TrackId, cluster: ClusterId) -> Result<()> {
        let target = self.tracks.get(track.index()).ok_or(Error::InvalidTrack(track))?;
        if let Some(existing) = target.associated_cluster() {
            return Err(Error::TrackAlreadyAssociated {
                track,
                cluster: existing,
            });
        }
        self.cluster_mut(cluster)?.add_associated_track(track);
        self.tracks[track.index()].set_associated_cluster(cluster);
        Ok(())
    }

    /// Verifies that the hit owner column matches the cluster hit lists and
    /// that every cluster's cached counts match its hits.
    pub fn check_consistency(&self) -> Result<()> {
        let mut n_owned_by_clusters = 0;
        for cluster in self.clusters() {
            cluster.check_consistency()?;
            let recomputed =
                ClusterProperties::compute(cluster.ordered_hits(), cluster.isolated_hits(), &self.hits);
            if recomputed.n_possible_mip_hits != cluster.properties().n_possible_mip_hits {
                return Err(Error::InvariantViolation(format!(
                    "{} caches {} possible MIP hits but holds {}",
                    cluster.id(),
                    cluster.properties().n_possible_mip_hits,
                    recomputed.n_possible_mip_hits
                )));
            }
            for hit in cluster.all_hits() {
                if self.hits.owner(hit) != Some(cluster.id()) {
                    return Err(Error::InvariantViolation(format!(
                        "{hit} listed in {} but owned by {:?}",
                        cluster.id(),
                        self.hits.owner(hit)
                    )));
                }
                n_owned_by_clusters += 1;
            }
        }

        let n_owned = self.hits.ids().filter(|&id| !self.hits.is_available(id)).count();
        if n_owned != n_owned_by_clusters {
            return Err(Error::InvariantViolation(format!(
                "{n_owned} hits have an owner but clusters list {n_owned_by_clusters}"
            )));
        }
        Ok(())
    }
}
