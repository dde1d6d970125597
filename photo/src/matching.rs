//! Pairwise matching of loaded images.

use crate::loader::Image;
use crate::options::MatchingOptions;
use nalgebra::Point2;
use pano_core::{Descriptors, FeatureMatch};
use pano_features::{estimate_homography, project_point, ratio_test_match, RansacConfig};
use serde::{Deserialize, Serialize};

/// Geometrically verified correspondences between images `id1 < id2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id1: usize,
    pub id2: usize,
    /// Inliers; `query_idx` indexes `id1`'s descriptors, `train_idx` `id2`'s.
    pub matches: Vec<FeatureMatch>,
    /// Mean displacement of the inliers, in preview pixels.
    pub avg_shift: f64,
}

impl Match {
    /// Stores the pair in canonical order, swapping the correspondences when
    /// `id1 > id2`.
    pub fn new(id1: usize, id2: usize, matches: Vec<FeatureMatch>, avg_shift: f64) -> Self {
        if id1 <= id2 {
            Self { id1, id2, matches, avg_shift }
        } else {
            Self {
                id1: id2,
                id2: id1,
                matches: matches.iter().map(FeatureMatch::swapped).collect(),
                avg_shift,
            }
        }
    }

    pub fn empty(id1: usize, id2: usize) -> Self {
        Self::new(id1, id2, Vec::new(), 0.0)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn is_good(&self, match_threshold: usize) -> bool {
        self.matches.len() > match_threshold
    }

    /// Matched images that barely moved relative to each other.
    pub fn is_duplicate(&self, min_shift: f64) -> bool {
        !self.matches.is_empty() && self.avg_shift < min_shift
    }
}

/// Matches two descriptor sets: ratio test, robust homography, then the
/// reprojection inliers.
pub fn match_descriptors(
    id1: usize,
    id2: usize,
    desc1: Option<&Descriptors>,
    desc2: Option<&Descriptors>,
    match_conf: f32,
    reprojection_threshold: f64,
) -> Match {
    let (Some(d1), Some(d2)) = (desc1, desc2) else {
        return Match::empty(id1, id2);
    };
    if d1.is_empty() || d2.is_empty() {
        return Match::empty(id1, id2);
    }

    let candidates = ratio_test_match(d1, d2, match_conf);
    if candidates.len() < 4 {
        return Match::empty(id1, id2);
    }

    let src: Vec<Point2<f64>> = candidates
        .iter()
        .map(|m| d1.descriptors[m.query_idx].keypoint.pt())
        .collect();
    let dst: Vec<Point2<f64>> = candidates
        .iter()
        .map(|m| d2.descriptors[m.train_idx].keypoint.pt())
        .collect();

    let config = RansacConfig::default().with_threshold(reprojection_threshold);
    let h = match estimate_homography(&src, &dst, &config) {
        Ok(fit) => fit.model,
        Err(e) => {
            tracing::warn!(id1, id2, error = %e, "homography estimation rejected");
            None
        }
    };
    let Some(h) = h else {
        return Match::empty(id1, id2);
    };

    let mut inliers = Vec::new();
    let mut shift = 0.0;
    for ((m, s), d) in candidates.iter().zip(&src).zip(&dst) {
        let Some(p) = project_point(&h, s) else {
            continue;
        };
        if (p - *d).norm() < reprojection_threshold {
            inliers.push(*m);
            shift += (*d - *s).norm();
        }
    }
    let avg_shift = if inliers.is_empty() { 0.0 } else { shift / inliers.len() as f64 };

    tracing::trace!(id1, id2, candidates = candidates.len(), inliers = inliers.len(), "matched pair");
    Match::new(id1, id2, inliers, avg_shift)
}

pub fn match_images(id1: usize, id2: usize, img1: &Image, img2: &Image, options: &MatchingOptions) -> Match {
    match_descriptors(
        id1,
        id2,
        img1.descriptors(),
        img2.descriptors(),
        options.match_conf,
        options.reprojection_threshold,
    )
}

/// Pairs `(i, j)` with `j - neighborhood <= i < j`, in order of `j`.
pub fn neighbor_pairs(num_images: usize, neighborhood: usize) -> Vec<(usize, usize)> {
    (0..num_images)
        .flat_map(|j| (j.saturating_sub(neighborhood)..j).map(move |i| (i, j)))
        .collect()
}

pub fn num_neighbor_pairs(num_images: usize, neighborhood: usize) -> usize {
    (0..num_images).map(|j| j - j.saturating_sub(neighborhood)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::{Descriptor, KeyPoint};

    #[test]
    fn canonical_order_swaps_correspondences() {
        let m = Match::new(5, 2, vec![FeatureMatch::new(10, 20, 3.0)], 1.5);
        assert_eq!((m.id1, m.id2), (2, 5));
        assert_eq!((m.matches[0].query_idx, m.matches[0].train_idx), (20, 10));
    }

    #[test]
    fn good_and_duplicate() {
        let matches = (0..5).map(|i| FeatureMatch::new(i, i, 0.0)).collect();
        let m = Match::new(0, 1, matches, 0.5);
        assert!(m.is_good(4));
        assert!(!m.is_good(5));
        assert!(m.is_duplicate(1.0));
        assert!(!Match::empty(0, 1).is_duplicate(1.0));
    }

    #[test]
    fn missing_keypoints_give_empty_match() {
        let d = Descriptors::new();
        let m = match_descriptors(0, 1, None, Some(&d), 0.25, 3.0);
        assert!(m.is_empty());
        let m = match_descriptors(0, 1, Some(&d), Some(&d), 0.25, 3.0);
        assert!(m.is_empty());
    }

    #[test]
    fn ambiguous_descriptors_skip_verification() {
        // Every query has two equidistant neighbours, so nothing survives the
        // ratio test.
        let kp = KeyPoint::new(1.0, 1.0);
        let d1: Descriptors = (0..8).map(|_| Descriptor::new(vec![0u8; 32], kp)).collect();
        let d2: Descriptors = (0..8).map(|_| Descriptor::new(vec![1u8; 32], kp)).collect();
        let m = match_descriptors(3, 4, Some(&d1), Some(&d2), 0.25, 3.0);
        assert!(m.is_empty());
        assert_eq!((m.id1, m.id2), (3, 4));
    }

    #[test]
    fn neighbour_pairs_window() {
        assert_eq!(neighbor_pairs(4, 2), vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
        assert_eq!(num_neighbor_pairs(4, 2), 5);
        assert_eq!(num_neighbor_pairs(10, 100), 45);
        assert!(neighbor_pairs(1, 3).is_empty());
    }
}
