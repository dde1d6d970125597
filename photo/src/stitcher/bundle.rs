//! Ray-space bundle adjustment of focal lengths and rotations.
//!
//! Every inlier correspondence contributes the distance between the two
//! unit rays it back-projects to, scaled by the pair's mean focal so the
//! residual reads in pixels. The reference camera's rotation stays fixed.

use super::pairwise::PairwiseMatch;
use super::{CameraParams, StitchStatus};
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Rotation3, Vector3};
use pano_runtime::{ProgressMonitor, ProgressType};
use rayon::prelude::*;

const PARAMS_PER_CAMERA: usize = 4;
const JACOBIAN_EPS: f64 = 1e-4;
const MAX_LAMBDA: f64 = 1e10;

fn to_params(cameras: &[CameraParams]) -> Vec<f64> {
    cameras
        .iter()
        .flat_map(|c| {
            let omega = Rotation3::from_matrix(&c.r()).scaled_axis();
            [c.focal, omega[0], omega[1], omega[2]]
        })
        .collect()
}

fn from_params(params: &[f64], cameras: &mut [CameraParams]) {
    for (camera, p) in cameras.iter_mut().zip(params.chunks_exact(PARAMS_PER_CAMERA)) {
        camera.focal = p[0];
        camera.set_r(&Rotation3::new(Vector3::new(p[1], p[2], p[3])).into_inner());
    }
}

/// `R * K^-1` of one camera built from its 4 parameters.
fn ray_matrix(p: &[f64], camera: &CameraParams) -> Option<Matrix3<f64>> {
    let mut c = camera.clone();
    c.focal = p[0];
    let r = Rotation3::new(Vector3::new(p[1], p[2], p[3])).into_inner();
    Some(r * c.k().try_inverse()?)
}

fn ray(m: &Matrix3<f64>, pt: &Point2<f64>) -> Vector3<f64> {
    let v = m * Vector3::new(pt.x, pt.y, 1.0);
    let n = v.norm();
    if n > 0.0 {
        v / n
    } else {
        v
    }
}

/// Residuals of one pair for the local parameter block `[src(4), dst(4)]`.
fn pair_residuals(
    local: &[f64; 8],
    src: &CameraParams,
    dst: &CameraParams,
    points: &[(Point2<f64>, Point2<f64>)],
    out: &mut Vec<f64>,
) {
    out.clear();
    let (Some(m1), Some(m2)) = (ray_matrix(&local[..4], src), ray_matrix(&local[4..], dst)) else {
        out.resize(points.len() * 3, f64::NAN);
        return;
    };
    let mult = (local[0] * local[4]).abs().sqrt();
    for (p1, p2) in points {
        let d = (ray(&m1, p1) - ray(&m2, p2)) * mult;
        out.extend_from_slice(&[d.x, d.y, d.z]);
    }
}

struct Problem<'a> {
    cameras: &'a [CameraParams],
    pairs: &'a [PairwiseMatch],
}

impl Problem<'_> {
    fn local(&self, params: &[f64], m: &PairwiseMatch) -> [f64; 8] {
        let mut local = [0.0; 8];
        local[..4].copy_from_slice(&params[m.src * 4..m.src * 4 + 4]);
        local[4..].copy_from_slice(&params[m.dst * 4..m.dst * 4 + 4]);
        local
    }

    fn cost(&self, params: &[f64]) -> f64 {
        self.pairs
            .par_iter()
            .map(|m| {
                let mut r = Vec::new();
                pair_residuals(&self.local(params, m), &self.cameras[m.src], &self.cameras[m.dst], &m.points, &mut r);
                r.iter().map(|v| v * v).sum::<f64>()
            })
            .sum()
    }

    /// Normal equations `(J^T J, J^T r)` around `params`.
    fn normal_equations(&self, params: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        let n = params.len();
        self.pairs
            .par_iter()
            .map(|m| {
                let base = self.local(params, m);
                let (src, dst) = (&self.cameras[m.src], &self.cameras[m.dst]);
                let mut r0 = Vec::new();
                pair_residuals(&base, src, dst, &m.points, &mut r0);

                let mut columns = Vec::with_capacity(8);
                let (mut plus, mut minus) = (Vec::new(), Vec::new());
                for k in 0..8 {
                    let mut p = base;
                    p[k] += JACOBIAN_EPS;
                    pair_residuals(&p, src, dst, &m.points, &mut plus);
                    p[k] -= 2.0 * JACOBIAN_EPS;
                    pair_residuals(&p, src, dst, &m.points, &mut minus);
                    let col: Vec<f64> = plus
                        .iter()
                        .zip(&minus)
                        .map(|(a, b)| (a - b) / (2.0 * JACOBIAN_EPS))
                        .collect();
                    columns.push(col);
                }

                let global = |k: usize| if k < 4 { m.src * 4 + k } else { m.dst * 4 + k - 4 };
                let mut jtj = DMatrix::zeros(n, n);
                let mut jtr = DVector::zeros(n);
                for a in 0..8 {
                    let ga = global(a);
                    jtr[ga] += columns[a].iter().zip(&r0).map(|(j, r)| j * r).sum::<f64>();
                    for b in 0..8 {
                        jtj[(ga, global(b))] += columns[a].iter().zip(&columns[b]).map(|(x, y)| x * y).sum::<f64>();
                    }
                }
                (jtj, jtr)
            })
            .reduce(
                || (DMatrix::zeros(n, n), DVector::zeros(n)),
                |(a1, b1), (a2, b2)| (a1 + a2, b1 + b2),
            )
    }
}

/// Refines `cameras` in place against the inlier points of `pairs`, then
/// re-expresses every rotation relative to camera `reference`.
///
/// Fails with `ErrCameraParamsAdjustFail` when the solution degenerates and
/// with `Cancelled` once `progress` is cancelled.
pub fn adjust(
    cameras: &mut [CameraParams],
    pairs: &[PairwiseMatch],
    reference: usize,
    max_iterations: usize,
    progress: &ProgressMonitor,
) -> Result<(), StitchStatus> {
    progress.reset(ProgressType::StitchBundleAdjustment, max_iterations);
    let mut params = to_params(cameras);
    let problem = Problem { cameras: &*cameras, pairs };
    let fixed = reference * PARAMS_PER_CAMERA + 1..reference * PARAMS_PER_CAMERA + 4;

    let mut lambda = 1e-3;
    let mut cost = problem.cost(&params);
    let initial_cost = cost;

    for _ in 0..max_iterations {
        if progress.is_cancelled() {
            return Err(StitchStatus::Cancelled);
        }

        let (jtj, jtr) = problem.normal_equations(&params);
        let mut improved = false;
        while lambda < MAX_LAMBDA {
            let mut lhs = jtj.clone();
            let mut rhs = jtr.clone();
            for i in 0..lhs.nrows() {
                lhs[(i, i)] *= 1.0 + lambda;
            }
            for i in fixed.clone() {
                lhs.row_mut(i).fill(0.0);
                lhs.column_mut(i).fill(0.0);
                lhs[(i, i)] = 1.0;
                rhs[i] = 0.0;
            }

            let Some(delta) = lhs.lu().solve(&rhs) else {
                lambda *= 10.0;
                continue;
            };
            let next: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p - d).collect();
            let next_cost = problem.cost(&next);
            if next_cost.is_finite() && next_cost < cost {
                let step = delta.norm();
                params = next;
                let gain = cost - next_cost;
                cost = next_cost;
                lambda /= 10.0;
                improved = step > 1e-10 && gain > 1e-12 * cost.max(1.0);
                break;
            }
            lambda *= 10.0;
        }
        progress.notify_task_done();
        if !improved {
            break;
        }
    }

    tracing::debug!(initial_cost, final_cost = cost, "bundle adjustment finished");

    if params.iter().any(|p| !p.is_finite()) || params.chunks_exact(4).any(|p| p[0] <= 0.0) {
        return Err(StitchStatus::ErrCameraParamsAdjustFail);
    }

    from_params(&params, cameras);
    let r_ref_t = cameras[reference].r().transpose();
    for camera in cameras.iter_mut() {
        let r = r_ref_t * camera.r();
        camera.set_r(&r);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(focal: f64, r: Matrix3<f64>) -> CameraParams {
        let mut c = CameraParams {
            focal,
            aspect: 1.0,
            ppx: 160.0,
            ppy: 120.0,
            ..CameraParams::default()
        };
        c.set_r(&r);
        c
    }

    /// Exact correspondences between cameras `a` and `b` of `truth`.
    fn synthetic_pair(truth: &[CameraParams], a: usize, b: usize) -> PairwiseMatch {
        let ka = truth[a].k();
        let kb = truth[b].k();
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..5 {
                let p = Point2::new(40.0 + i as f64 * 45.0, 20.0 + j as f64 * 45.0);
                let world = truth[a].r() * ka.try_inverse().unwrap() * Vector3::new(p.x, p.y, 1.0);
                let q = kb * truth[b].r().transpose() * world;
                if q.z > 0.0 {
                    points.push((p, Point2::new(q.x / q.z, q.y / q.z)));
                }
            }
        }
        PairwiseMatch {
            src: a,
            dst: b,
            h: Matrix3::identity(),
            num_matches: points.len(),
            num_inliers: points.len(),
            confidence: 2.0,
            points,
        }
    }

    #[test]
    fn recovers_perturbed_cameras() {
        let yaw = |a: f64| Rotation3::from_euler_angles(0.0, a, 0.0).into_inner();
        let truth = [camera(420.0, yaw(-0.3)), camera(420.0, yaw(0.0)), camera(420.0, yaw(0.3))];
        let pairs = [synthetic_pair(&truth, 0, 1), synthetic_pair(&truth, 1, 2)];

        let mut cameras = [camera(380.0, yaw(-0.25)), camera(380.0, yaw(0.0)), camera(380.0, yaw(0.33))];
        let progress = ProgressMonitor::new();
        adjust(&mut cameras, &pairs, 1, 100, &progress).unwrap();

        for (got, want) in cameras.iter().zip(&truth) {
            assert!((got.focal - 420.0).abs() < 0.5, "focal {}", got.focal);
            assert!((got.r() - want.r()).norm() < 1e-3);
        }
        assert_eq!(cameras[1].r(), Matrix3::identity());
    }

    #[test]
    fn cancelled_before_first_iteration() {
        let r = Matrix3::identity();
        let truth = [camera(300.0, r), camera(300.0, r)];
        let pairs = [synthetic_pair(&truth, 0, 1)];
        let mut cameras = truth.clone();
        let progress = ProgressMonitor::new();
        progress.cancel();
        assert_eq!(
            adjust(&mut cameras, &pairs, 0, 10, &progress),
            Err(StitchStatus::Cancelled)
        );
    }
}
