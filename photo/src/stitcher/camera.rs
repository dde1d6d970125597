//! Initial camera estimate from pairwise homographies.

use super::pairwise::PairwiseMatch;
use super::CameraParams;
use nalgebra::Matrix3;
use pano_core::DisjointSet;
use std::collections::VecDeque;

/// Focal lengths `(f0, f1)` of the source and destination cameras implied
/// by a homography between image-centred coordinates of two rotated
/// cameras. Either is `None` when the homography does not constrain it.
pub fn focals_from_homography(h: &Matrix3<f64>) -> (Option<f64>, Option<f64>) {
    let h = |r: usize, c: usize| h[(r, c)];

    let d1 = h(2, 0) * h(2, 1);
    let d2 = (h(2, 1) - h(2, 0)) * (h(2, 1) + h(2, 0));
    let v1 = -(h(0, 0) * h(0, 1) + h(1, 0) * h(1, 1)) / d1;
    let v2 = (h(0, 0).powi(2) + h(1, 0).powi(2) - h(0, 1).powi(2) - h(1, 1).powi(2)) / d2;
    let f1 = pick_focal(v1, v2, d1, d2);

    let d1 = h(0, 0) * h(1, 0) + h(0, 1) * h(1, 1);
    let d2 = h(0, 0).powi(2) + h(0, 1).powi(2) - h(1, 0).powi(2) - h(1, 1).powi(2);
    let v1 = -h(0, 2) * h(1, 2) / d1;
    let v2 = (h(1, 2).powi(2) - h(0, 2).powi(2)) / d2;
    let f0 = pick_focal(v1, v2, d1, d2);

    (f0, f1)
}

/// Chooses between the two squared-focal candidates, preferring the one
/// whose denominator is better conditioned.
fn pick_focal(v1: f64, v2: f64, d1: f64, d2: f64) -> Option<f64> {
    let ok = |v: f64| v.is_finite() && v > 0.0;
    match (ok(v1), ok(v2)) {
        (true, true) => Some(if d1.abs() > d2.abs() { v1 } else { v2 }.sqrt()),
        (true, false) => Some(v1.sqrt()),
        (false, true) => Some(v2.sqrt()),
        (false, false) => None,
    }
}

/// Median-based focal shared by all cameras. Falls back to a size guess
/// when too few pairs yield a focal.
pub fn estimate_focal(sizes: &[(u32, u32)], pairs: &[PairwiseMatch]) -> f64 {
    let mut focals: Vec<f64> = pairs
        .iter()
        .filter_map(|m| match focals_from_homography(&m.h) {
            (Some(f0), Some(f1)) => Some((f0 * f1).sqrt()),
            _ => None,
        })
        .collect();

    if !focals.is_empty() && focals.len() + 1 >= sizes.len() {
        median(&mut focals)
    } else {
        let sum: f64 = sizes.iter().map(|&(w, h)| (w + h) as f64).sum();
        sum / sizes.len().max(1) as f64
    }
}

/// Median of `values`; the mean of the middle two for an even count.
pub fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => 0.5 * (values[n / 2 - 1] + values[n / 2]),
    }
}

/// Maximum spanning tree over `pairs` weighted by inlier count, as
/// adjacency lists, plus its centre (the node of least eccentricity).
pub fn max_spanning_tree(num_images: usize, pairs: &[PairwiseMatch]) -> (Vec<Vec<usize>>, usize) {
    let mut order: Vec<&PairwiseMatch> = pairs.iter().collect();
    order.sort_by(|a, b| b.num_inliers.cmp(&a.num_inliers));

    let mut set = DisjointSet::with_len(num_images);
    let mut adjacency = vec![Vec::new(); num_images];
    for m in order {
        if set.find(m.src) != set.find(m.dst) {
            set.union(m.src, m.dst);
            adjacency[m.src].push(m.dst);
            adjacency[m.dst].push(m.src);
        }
    }

    let mut centre = 0;
    let mut best = usize::MAX;
    for start in 0..num_images {
        let ecc = bfs_depths(&adjacency, start).into_iter().flatten().max().unwrap_or(0);
        if ecc < best {
            best = ecc;
            centre = start;
        }
    }
    (adjacency, centre)
}

fn bfs_depths(adjacency: &[Vec<usize>], start: usize) -> Vec<Option<usize>> {
    let mut depth = vec![None; adjacency.len()];
    depth[start] = Some(0);
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let d = depth[node].unwrap_or(0);
        for &next in &adjacency[node] {
            if depth[next].is_none() {
                depth[next] = Some(d + 1);
                queue.push_back(next);
            }
        }
    }
    depth
}

/// Nearest rotation to `m`.
pub fn orthonormalize(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let r = u * v_t;
            if r.determinant() < 0.0 {
                -r
            } else {
                r
            }
        }
        _ => *m,
    }
}

/// Cameras of a connected set of images: one shared focal, principal point
/// at the image centre, rotations chained along the spanning tree from its
/// centre. Returns the cameras and the index of the reference camera.
pub fn estimate_cameras(sizes: &[(u32, u32)], pairs: &[PairwiseMatch]) -> Option<(Vec<CameraParams>, usize)> {
    if sizes.is_empty() {
        return None;
    }
    let focal = estimate_focal(sizes, pairs);
    if !focal.is_finite() || focal <= 0.0 {
        return None;
    }

    let (tree, centre) = max_spanning_tree(sizes.len(), pairs);
    let k = Matrix3::new(focal, 0.0, 0.0, 0.0, focal, 0.0, 0.0, 0.0, 1.0);
    let k_inv = k.try_inverse()?;

    let mut rotations: Vec<Option<Matrix3<f64>>> = vec![None; sizes.len()];
    rotations[centre] = Some(Matrix3::identity());
    let mut queue = VecDeque::from([centre]);
    while let Some(from) = queue.pop_front() {
        let r_from = rotations[from]?;
        for &to in &tree[from] {
            if rotations[to].is_some() {
                continue;
            }
            let pair = pairs
                .iter()
                .find(|m| (m.src == from && m.dst == to) || (m.src == to && m.dst == from))?;
            let h_inv = pair.homography_from(from)?.try_inverse()?;
            rotations[to] = Some(orthonormalize(&(r_from * k_inv * h_inv * k)));
            queue.push_back(to);
        }
    }

    let cameras = sizes
        .iter()
        .zip(rotations)
        .map(|(&(w, h), r)| {
            let mut camera = CameraParams {
                focal,
                aspect: 1.0,
                ppx: w as f64 * 0.5,
                ppy: h as f64 * 0.5,
                ..CameraParams::default()
            };
            camera.set_r(&r?);
            Some(camera)
        })
        .collect::<Option<Vec<_>>>()?;

    Some((cameras, centre))
}
