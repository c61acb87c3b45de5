//! Hits indexed by pseudo-layer.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hit::{CaloHitId, CaloHitStore, PseudoLayer};

/// Mapping from pseudo-layer to the hits occupying that layer.
///
/// Ascending iteration walks outwards, `.rev()` walks inwards. Each bucket
/// keeps insertion order and empty buckets are dropped, so the first and
/// last keys are always the inner and outer occupied layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedCaloHitList {
    layers: BTreeMap<PseudoLayer, Vec<CaloHitId>>,
}

impl OrderedCaloHitList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the list of every hit in the store, in arena order within
    /// each layer.
    pub fn from_store(store: &CaloHitStore) -> Result<Self> {
        let mut list = Self::new();
        for (id, hit) in store.iter() {
            let layer = hit.pseudo_layer().ok_or(Error::PseudoLayerNotSet(id))?;
            list.add(layer, id)?;
        }
        Ok(list)
    }

    /// Builds the list of the available hits in the store.
    pub fn available_from_store(store: &CaloHitStore) -> Result<Self> {
        let mut list = Self::new();
        for (id, hit) in store.iter() {
            if !store.is_available(id) {
                continue;
            }
            let layer = hit.pseudo_layer().ok_or(Error::PseudoLayerNotSet(id))?;
            list.add(layer, id)?;
        }
        Ok(list)
    }

    /// Adds a hit to a layer bucket.
    pub fn add(&mut self, layer: PseudoLayer, hit: CaloHitId) -> Result<()> {
        let bucket = self.layers.entry(layer).or_default();
        if bucket.contains(&hit) {
            return Err(Error::AlreadyPresent { hit, layer });
        }
        bucket.push(hit);
        Ok(())
    }

    /// Removes a hit from a layer bucket, dropping the bucket if it empties.
    pub fn remove(&mut self, layer: PseudoLayer, hit: CaloHitId) -> Result<()> {
        let bucket = self
            .layers
            .get_mut(&layer)
            .ok_or(Error::NotPresent { hit, layer })?;
        let position = bucket
            .iter()
            .position(|&candidate| candidate == hit)
            .ok_or(Error::NotPresent { hit, layer })?;
        bucket.remove(position);
        if bucket.is_empty() {
            self.layers.remove(&layer);
        }
        Ok(())
    }

    /// Hits in a layer, if the layer is occupied.
    #[must_use]
    pub fn layer(&self, layer: PseudoLayer) -> Option<&[CaloHitId]> {
        self.layers.get(&layer).map(Vec::as_slice)
    }

    /// True if the hit is stored in the given layer.
    #[must_use]
    pub fn contains(&self, layer: PseudoLayer, hit: CaloHitId) -> bool {
        self.layer(layer).is_some_and(|hits| hits.contains(&hit))
    }

    /// Occupied layers with their hits, innermost first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (PseudoLayer, &[CaloHitId])> {
        self.layers
            .iter()
            .map(|(&layer, hits)| (layer, hits.as_slice()))
    }

    /// All hits, innermost layer first.
    pub fn hits(&self) -> impl Iterator<Item = CaloHitId> + '_ {
        self.layers.values().flatten().copied()
    }

    /// Smallest occupied pseudo-layer.
    #[must_use]
    pub fn inner_layer(&self) -> Option<PseudoLayer> {
        self.layers.keys().next().copied()
    }

    /// Largest occupied pseudo-layer.
    #[must_use]
    pub fn outer_layer(&self) -> Option<PseudoLayer> {
        self.layers.keys().next_back().copied()
    }

    /// Number of occupied layers.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of hits over all layers.
    #[must_use]
    pub fn n_hits(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    /// Returns true if no layer is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::{CaloHit, CaloHitParameters};

    #[test]
    fn test_add_and_remove() {
        let mut list = OrderedCaloHitList::new();
        list.add(4, CaloHitId(0)).unwrap();
        list.add(2, CaloHitId(1)).unwrap();
        list.add(4, CaloHitId(2)).unwrap();

        assert_eq!(list.n_layers(), 2);
        assert_eq!(list.n_hits(), 3);
        assert_eq!(list.inner_layer(), Some(2));
        assert_eq!(list.outer_layer(), Some(4));
        assert_eq!(list.layer(4), Some(&[CaloHitId(0), CaloHitId(2)][..]));

        assert_eq!(
            list.add(4, CaloHitId(0)),
            Err(Error::AlreadyPresent {
                hit: CaloHitId(0),
                layer: 4
            })
        );

        list.remove(2, CaloHitId(1)).unwrap();
        assert_eq!(list.inner_layer(), Some(4));
        assert!(list.layer(2).is_none());
        assert!(list.remove(2, CaloHitId(1)).is_err());
    }

    #[test]
    fn test_iteration_order() {
        let mut list = OrderedCaloHitList::new();
        for (layer, id) in [(7, 0), (1, 1), (3, 2)] {
            list.add(layer, CaloHitId(id)).unwrap();
        }
        let outward: Vec<_> = list.iter().map(|(layer, _)| layer).collect();
        let inward: Vec<_> = list.iter().rev().map(|(layer, _)| layer).collect();
        assert_eq!(outward, vec![1, 3, 7]);
        assert_eq!(inward, vec![7, 3, 1]);
    }

    #[test]
    fn test_from_store_requires_pseudo_layers() {
        let mut store = CaloHitStore::new();
        store.push(CaloHit::new(&CaloHitParameters {
            pseudo_layer: Some(1),
            ..Default::default()
        }));
        let missing = store.push(CaloHit::new(&CaloHitParameters::default()));
        assert_eq!(
            OrderedCaloHitList::from_store(&store),
            Err(Error::PseudoLayerNotSet(missing))
        );
    }
}
