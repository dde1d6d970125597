//! RANSAC homography fitting for geometric verification of matches.

use nalgebra::{Matrix3, Point2, SymmetricEigen, Vector3, SMatrix};
use crate::{FeatureError, Result};
use pano_core::{Ransac, RobustConfig, RobustModel, RobustResult};

pub type RansacConfig = RobustConfig;

#[derive(Clone, Debug)]
pub struct MatchPair {
    pub src: Point2<f64>,
    pub dst: Point2<f64>,
}

/// Normalised DLT homography estimator, `dst ~ H * src`.
pub struct HomographyEstimator;

impl RobustModel<MatchPair> for HomographyEstimator {
    type Model = Matrix3<f64>;

    fn min_sample_size(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[&MatchPair]) -> Option<Self::Model> {
        if data.len() < 4 {
            return None;
        }
        let t_src = normalizing_transform(data.iter().map(|m| m.src))?;
        let t_dst = normalizing_transform(data.iter().map(|m| m.dst))?;

        let mut ata = SMatrix::<f64, 9, 9>::zeros();
        for m in data {
            let s = t_src.transform_point(&m.src);
            let d = t_dst.transform_point(&m.dst);
            let rows = [
                [-s.x, -s.y, -1.0, 0.0, 0.0, 0.0, d.x * s.x, d.x * s.y, d.x],
                [0.0, 0.0, 0.0, -s.x, -s.y, -1.0, d.y * s.x, d.y * s.y, d.y],
            ];
            for row in rows {
                for i in 0..9 {
                    for j in 0..9 {
                        ata[(i, j)] += row[i] * row[j];
                    }
                }
            }
        }

        let eigen = SymmetricEigen::new(ata);
        let h = eigen.eigenvectors.column(eigen.eigenvalues.imin());
        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let t_dst_inv = t_dst.matrix().try_inverse()?;
        let mut model = t_dst_inv * hn * t_src.matrix();
        let scale = model[(2, 2)];
        if scale.abs() < 1e-12 {
            return None;
        }
        model /= scale;

        if model.iter().all(|v| v.is_finite()) && model.determinant().abs() > 1e-10 {
            Some(model)
        } else {
            None
        }
    }

    fn compute_error(&self, model: &Self::Model, data: &MatchPair) -> f64 {
        match project_point(model, &data.src) {
            Some(p) => (p - data.dst).norm(),
            None => f64::INFINITY,
        }
    }
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2).
fn normalizing_transform(points: impl Iterator<Item = Point2<f64>> + Clone) -> Option<nalgebra::Projective2<f64>> {
    let n = points.clone().count() as f64;
    let (sx, sy) = points.clone().fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = points.map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()).sum::<f64>() / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let m = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    Some(nalgebra::Projective2::from_matrix_unchecked(m))
}

/// Applies `h` to `p`, `None` when the point maps to infinity.
pub fn project_point(h: &Matrix3<f64>, p: &Point2<f64>) -> Option<Point2<f64>> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    if v[2].abs() > 1e-10 {
        Some(Point2::new(v[0] / v[2], v[1] / v[2]))
    } else {
        None
    }
}

pub use pano_core::robust::RobustResult as RansacResult;

/// Robust homography from point correspondences `src[i] -> dst[i]`.
pub fn estimate_homography(
    src_points: &[Point2<f64>],
    dst_points: &[Point2<f64>],
    config: &RansacConfig,
) -> Result<RobustResult<Matrix3<f64>>> {
    config.validate()?;
    if src_points.len() != dst_points.len() {
        return Err(FeatureError::MatchingError(format!(
            "{} source points but {} destination points",
            src_points.len(),
            dst_points.len()
        )));
    }
    let data: Vec<MatchPair> = src_points
        .iter()
        .zip(dst_points.iter())
        .map(|(&src, &dst)| MatchPair { src, dst })
        .collect();

    Ok(Ransac::new(config.clone()).run(&HomographyEstimator, &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<Point2<f64>> {
        (0..6)
            .flat_map(|i| (0..5).map(move |j| Point2::new(i as f64 * 37.0 + 5.0, j as f64 * 23.0 + 11.0)))
            .collect()
    }

    #[test]
    fn recovers_known_homography() {
        let h = Matrix3::new(1.02, 0.05, 12.0, -0.03, 0.98, -7.0, 1e-4, -5e-5, 1.0);
        let src = grid();
        let mut dst: Vec<Point2<f64>> = src.iter().map(|p| project_point(&h, p).unwrap()).collect();
        dst[3] = Point2::new(500.0, -300.0);
        dst[17] = Point2::new(-40.0, 900.0);

        let result = estimate_homography(&src, &dst, &RansacConfig::default()).unwrap();
        let model = result.model.expect("homography");
        assert_eq!(result.num_inliers, src.len() - 2);
        assert!(!result.inliers[3] && !result.inliers[17]);
        for (p, q) in src.iter().zip(dst.iter()).filter(|(_, q)| q.x > 0.0 && q.x < 400.0 && q.y < 400.0) {
            let r = project_point(&model, p).unwrap();
            assert!((r - *q).norm() < 1e-6);
        }
    }

    #[test]
    fn too_few_points_yields_no_model() {
        let src = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        let result = estimate_homography(&src, &src, &RansacConfig::default()).unwrap();
        assert!(result.model.is_none());
    }

    #[test]
    fn identical_points_are_degenerate() {
        let src = vec![Point2::new(3.0, 3.0); 8];
        let result = estimate_homography(&src, &src, &RansacConfig::default()).unwrap();
        assert!(result.model.is_none());
    }

    #[test]
    fn rejects_invalid_config_and_mismatched_points() {
        let src = grid();
        let bad = RansacConfig::default().with_threshold(0.0);
        assert!(matches!(estimate_homography(&src, &src, &bad), Err(FeatureError::Core(_))));
        assert!(matches!(
            estimate_homography(&src, &src[1..], &RansacConfig::default()),
            Err(FeatureError::MatchingError(_))
        ));
    }
}
