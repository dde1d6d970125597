//! Registration features and all-pairs matching inside one stitch.

use crate::options::StitchAlgorithmOptions;
use image::RgbImage;
use nalgebra::{Matrix3, Point2, Vector2};
use pano_core::{Descriptors, DisjointSet};
use pano_features::{estimate_homography, ratio_test_match, FeatureDetector, RansacConfig};
use pano_imgproc::{convert_rgb_to_gray, resize_rgb, scaled_size, Interpolation};
use pano_runtime::{ProgressMonitor, ProgressType};
use rayon::prelude::*;

/// Fewest correspondences, before and after verification, for a usable pair.
const MIN_MATCHES: usize = 6;

/// Features of one image at registration scale.
#[derive(Debug, Clone)]
pub struct Features {
    pub size: (u32, u32),
    pub descriptors: Descriptors,
}

/// Verified matches between two images of the stitch.
#[derive(Debug, Clone)]
pub struct PairwiseMatch {
    pub src: usize,
    pub dst: usize,
    /// Maps `src` to `dst`, both in image-centred coordinates.
    pub h: Matrix3<f64>,
    pub num_matches: usize,
    pub num_inliers: usize,
    pub confidence: f64,
    /// Inlier pixel positions `(in src, in dst)`.
    pub points: Vec<(Point2<f64>, Point2<f64>)>,
}

impl PairwiseMatch {
    /// Homography from image `from` to the other image of the pair.
    pub fn homography_from(&self, from: usize) -> Option<Matrix3<f64>> {
        if from == self.src {
            Some(self.h)
        } else {
            self.h.try_inverse()
        }
    }

    pub fn other(&self, idx: usize) -> usize {
        if idx == self.src {
            self.dst
        } else {
            self.src
        }
    }
}

fn centre(size: (u32, u32)) -> Vector2<f64> {
    Vector2::new(size.0 as f64 * 0.5, size.1 as f64 * 0.5)
}

/// Detects features on every image scaled by `work_scale`. `None` once
/// cancelled.
pub fn find_features(
    images: &[RgbImage],
    work_scale: f64,
    options: &StitchAlgorithmOptions,
    progress: &ProgressMonitor,
) -> Option<Vec<Features>> {
    progress.reset(ProgressType::StitchFindFeatures, images.len());
    let features: Vec<Option<Features>> = images
        .par_iter()
        .map(|img| {
            if progress.is_cancelled() {
                return None;
            }
            let (w, h) = scaled_size(img.width(), img.height(), work_scale);
            let work = resize_rgb(img, w, h, Interpolation::Area);
            let detector = FeatureDetector::new(options.feature_type, options.num_features);
            let descriptors = detector.detect_and_compute(&convert_rgb_to_gray(&work));
            progress.notify_task_done();
            Some(Features { size: (w, h), descriptors })
        })
        .collect();
    features.into_iter().collect()
}

pub fn match_pair(
    src: usize,
    dst: usize,
    features: &[Features],
    options: &StitchAlgorithmOptions,
) -> Option<PairwiseMatch> {
    let (f1, f2) = (&features[src], &features[dst]);
    let matches = ratio_test_match(&f1.descriptors, &f2.descriptors, options.match_conf);
    if matches.len() < MIN_MATCHES {
        return None;
    }

    let (c1, c2) = (centre(f1.size), centre(f2.size));
    let src_pts: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| f1.descriptors.descriptors[m.query_idx].keypoint.pt() - c1)
        .collect();
    let dst_pts: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| f2.descriptors.descriptors[m.train_idx].keypoint.pt() - c2)
        .collect();

    let config = RansacConfig::default().with_threshold(options.reprojection_threshold);
    let result = match estimate_homography(&src_pts, &dst_pts, &config) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(src, dst, error = %e, "homography estimation rejected");
            return None;
        }
    };
    let h = result.model?;
    if result.num_inliers < MIN_MATCHES {
        return None;
    }

    let confidence = result.num_inliers as f64 / (8.0 + 0.3 * matches.len() as f64);

    let points = src_pts
        .iter()
        .zip(&dst_pts)
        .zip(&result.inliers)
        .filter(|(_, inlier)| **inlier)
        .map(|((s, d), _)| (*s + c1, *d + c2))
        .collect();

    Some(PairwiseMatch {
        src,
        dst,
        h,
        num_matches: matches.len(),
        num_inliers: result.num_inliers,
        confidence,
        points,
    })
}

/// Matches every pair `i < j`. `None` once cancelled.
pub fn match_all(
    features: &[Features],
    options: &StitchAlgorithmOptions,
    progress: &ProgressMonitor,
) -> Option<Vec<PairwiseMatch>> {
    let n = features.len();
    let pairs: Vec<(usize, usize)> = (0..n).flat_map(|j| (0..j).map(move |i| (i, j))).collect();
    progress.reset(ProgressType::StitchMatchFeatures, pairs.len());

    let matches: Vec<Option<PairwiseMatch>> = pairs
        .par_iter()
        .map(|&(i, j)| {
            if progress.is_cancelled() {
                return None;
            }
            let m = match_pair(i, j, features, options);
            progress.notify_task_done();
            m
        })
        .collect();

    if progress.is_cancelled() {
        return None;
    }
    Some(matches.into_iter().flatten().collect())
}

/// Indices of the largest set of images connected by pairs above
/// `conf_threshold`; ties go to the set holding the lowest index.
pub fn largest_component(num_images: usize, matches: &[PairwiseMatch], conf_threshold: f64) -> Vec<usize> {
    let mut set = DisjointSet::with_len(num_images);
    for m in matches.iter().filter(|m| m.confidence > conf_threshold) {
        set.union(m.src, m.dst);
    }
    let roots: Vec<usize> = (0..num_images).map(|i| set.find(i)).collect();
    let mut sizes = vec![0usize; num_images];
    for &r in &roots {
        sizes[r] += 1;
    }

    let mut best_root = None;
    let mut best_size = 0;
    for &r in &roots {
        if sizes[r] > best_size {
            best_size = sizes[r];
            best_root = Some(r);
        }
    }
    match best_root {
        Some(root) => (0..num_images).filter(|&i| roots[i] == root).collect(),
        None => Vec::new(),
    }
}

/// Keeps pairs above `conf_threshold` between members of `component`,
/// renumbered to positions within it.
pub fn component_pairs(matches: &[PairwiseMatch], component: &[usize], conf_threshold: f64) -> Vec<PairwiseMatch> {
    let local = |idx: usize| component.iter().position(|&c| c == idx);
    matches
        .iter()
        .filter(|m| m.confidence > conf_threshold)
        .filter_map(|m| {
            let (src, dst) = (local(m.src)?, local(m.dst)?);
            Some(PairwiseMatch { src, dst, ..m.clone() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(src: usize, dst: usize, confidence: f64) -> PairwiseMatch {
        PairwiseMatch {
            src,
            dst,
            h: Matrix3::identity(),
            num_matches: 10,
            num_inliers: 10,
            confidence,
            points: Vec::new(),
        }
    }

    #[test]
    fn largest_component_drops_minority() {
        let matches = [pair(0, 1, 2.0), pair(1, 2, 1.5), pair(3, 4, 2.0), pair(2, 3, 0.5)];
        assert_eq!(largest_component(5, &matches, 1.0), vec![0, 1, 2]);
        assert_eq!(largest_component(3, &[], 1.0), vec![0]);
        assert!(largest_component(0, &[], 1.0).is_empty());
    }

    #[test]
    fn component_pairs_are_renumbered() {
        let matches = [pair(1, 3, 2.0), pair(0, 1, 2.0), pair(3, 4, 0.2)];
        let local = component_pairs(&matches, &[1, 3, 4], 1.0);
        assert_eq!(local.len(), 1);
        assert_eq!((local[0].src, local[0].dst), (0, 1));
    }

    #[test]
    fn inverse_direction_homography() {
        let mut m = pair(0, 1, 2.0);
        m.h = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -2.0, 0.0, 0.0, 1.0);
        let back = m.homography_from(1).unwrap();
        assert!((back[(0, 2)] + 5.0).abs() < 1e-12);
        assert_eq!(m.other(1), 0);
    }
}
