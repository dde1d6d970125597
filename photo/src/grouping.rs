//! Grouping images into panoramas.

use crate::matching::Match;
use crate::stitcher::Cameras;
use pano_core::{DisjointSet, RatioRect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A set of image indices stitched together.
///
/// `ids` stay sorted and unique. Any edit that changes them drops the cached
/// cameras and crop, which were computed for the old set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pano {
    ids: Vec<usize>,
    pub cameras: Option<Cameras>,
    pub crop: Option<RatioRect>,
    pub exported: bool,
}

impl Pano {
    pub fn new(ids: impl IntoIterator<Item = usize>) -> Self {
        let mut ids: Vec<usize> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self {
            ids,
            ..Self::default()
        }
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    fn invalidate(&mut self) {
        self.cameras = None;
        self.crop = None;
        self.exported = false;
    }

    /// Returns `false` when `id` was already present.
    pub fn insert(&mut self, id: usize) -> bool {
        match self.ids.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.ids.insert(pos, id);
                self.invalidate();
                true
            }
        }
    }

    pub fn remove(&mut self, id: usize) -> bool {
        match self.ids.binary_search(&id) {
            Ok(pos) => {
                self.ids.remove(pos);
                self.invalidate();
                true
            }
            Err(_) => false,
        }
    }

    /// Moves every id `>= at` into a new pano. `None` if either side would
    /// be empty.
    pub fn split_off(&mut self, at: usize) -> Option<Pano> {
        let pos = self.ids.partition_point(|&id| id < at);
        if pos == 0 || pos == self.ids.len() {
            return None;
        }
        let tail = self.ids.split_off(pos);
        self.invalidate();
        Some(Pano::new(tail))
    }

    pub fn merge(&mut self, other: Pano) {
        let before = self.ids.len();
        self.ids.extend(other.ids);
        self.ids.sort_unstable();
        self.ids.dedup();
        if self.ids.len() != before {
            self.invalidate();
        }
    }
}

/// Connected components of the good matches, ordered by smallest member.
///
/// Images without a good match belong to no pano, so an empty result means
/// no panorama was detected. Matches below `min_shift` are still grouped;
/// they are only reported.
pub fn find_panos(matches: &[Match], match_threshold: usize, min_shift: f64) -> Vec<Pano> {
    let mut set = DisjointSet::new();
    let good: Vec<&Match> = matches.iter().filter(|m| m.is_good(match_threshold)).collect();
    for m in &good {
        set.union(m.id1, m.id2);
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for m in &good {
        for id in [m.id1, m.id2] {
            let root = set.find(id);
            groups.entry(root).or_default().push(id);
        }
    }

    let mut panos: Vec<Pano> = groups.into_values().map(Pano::new).collect();
    panos.sort_by_key(|p| p.ids.first().copied());

    let duplicates = good.iter().filter(|m| m.is_duplicate(min_shift)).count();
    if duplicates > 0 {
        tracing::debug!(duplicates, min_shift, "near-duplicate pairs among good matches");
    }
    tracing::info!(panos = panos.len(), good_matches = good.len(), "grouped images into panos");
    panos
}

/// One pano holding every image, used when matching is skipped.
pub fn single_pano(num_images: usize) -> Pano {
    Pano::new(0..num_images)
}

/// Pairs whose average shift is below `min_shift`: likely stacked shots.
pub fn duplicate_pairs(matches: &[Match], min_shift: f64) -> Vec<(usize, usize)> {
    matches
        .iter()
        .filter(|m| m.is_duplicate(min_shift))
        .map(|m| (m.id1, m.id2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::FeatureMatch;

    fn m(id1: usize, id2: usize, count: usize) -> Match {
        Match::new(id1, id2, (0..count).map(|i| FeatureMatch::new(i, i, 0.0)).collect(), 10.0)
    }

    #[test]
    fn chain_forms_one_pano() {
        let panos = find_panos(&[m(1, 2, 5), m(2, 3, 5)], 4, 0.0);
        assert_eq!(panos.len(), 1);
        assert_eq!(panos[0].ids(), &[1, 2, 3]);
        assert!(!panos.iter().any(|p| p.contains(0) || p.contains(4)));
    }

    #[test]
    fn nothing_above_threshold_is_empty() {
        assert!(find_panos(&[m(0, 1, 4), m(1, 2, 3)], 4, 0.0).is_empty());
        assert!(find_panos(&[], 4, 0.0).is_empty());
    }

    #[test]
    fn panos_sorted_by_smallest_member() {
        let panos = find_panos(&[m(7, 8, 10), m(3, 5, 10), m(0, 9, 10), m(5, 6, 10)], 4, 0.0);
        let ids: Vec<&[usize]> = panos.iter().map(Pano::ids).collect();
        assert_eq!(ids, vec![&[0, 9][..], &[3, 5, 6][..], &[7, 8][..]]);
    }

    #[test]
    fn single_pano_holds_all_images() {
        assert_eq!(single_pano(4).ids(), &[0, 1, 2, 3]);
        assert!(single_pano(0).is_empty());
    }

    #[test]
    fn edits_keep_ids_sorted_and_invalidate() {
        let mut pano = Pano::new([4, 1, 4, 2]);
        assert_eq!(pano.ids(), &[1, 2, 4]);
        pano.crop = Some(RatioRect::default());
        pano.exported = true;

        assert!(!pano.insert(2));
        assert!(pano.crop.is_some());
        assert!(pano.insert(3));
        assert_eq!(pano.ids(), &[1, 2, 3, 4]);
        assert!(pano.crop.is_none());
        assert!(!pano.exported);

        let tail = pano.split_off(3).unwrap();
        assert_eq!(pano.ids(), &[1, 2]);
        assert_eq!(tail.ids(), &[3, 4]);
        assert!(pano.split_off(1).is_none());

        pano.merge(tail);
        assert_eq!(pano.ids(), &[1, 2, 3, 4]);
        assert!(pano.remove(1));
        assert!(!pano.remove(1));
    }

    #[test]
    fn duplicates_reported_not_filtered() {
        let mut stacked = m(0, 1, 10);
        stacked.avg_shift = 0.2;
        let matches = [stacked, m(1, 2, 10)];
        assert_eq!(duplicate_pairs(&matches, 1.0), vec![(0, 1)]);
        assert_eq!(find_panos(&matches, 4, 1.0)[0].ids(), &[0, 1, 2]);
    }
}
