use pano_core::{Descriptors, FeatureMatch};
use rayon::prelude::*;

/// The two nearest train descriptors of one query descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnPair {
    pub best: FeatureMatch,
    pub second: Option<FeatureMatch>,
}

/// Brute-force Hamming 2-NN search, parallel over query descriptors.
pub fn knn2_match(query: &Descriptors, train: &Descriptors) -> Vec<KnnPair> {
    if train.is_empty() {
        return Vec::new();
    }

    query
        .descriptors
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q_desc)| {
            let mut best: Option<(usize, u32)> = None;
            let mut second: Option<(usize, u32)> = None;

            for (train_idx, t_desc) in train.iter().enumerate() {
                let distance = q_desc.hamming_distance(t_desc);
                match best {
                    Some((_, best_dist)) if distance >= best_dist => {
                        if second.map_or(true, |(_, d)| distance < d) {
                            second = Some((train_idx, distance));
                        }
                    }
                    _ => {
                        second = best;
                        best = Some((train_idx, distance));
                    }
                }
            }

            let (train_idx, distance) = best?;
            Some(KnnPair {
                best: FeatureMatch::new(query_idx, train_idx, distance as f32),
                second: second.map(|(idx, d)| FeatureMatch::new(query_idx, idx, d as f32)),
            })
        })
        .collect()
}

/// Nearest-neighbour matches that pass the ratio test
/// `best < (1 - match_conf) * second`. Queries without a second neighbour
/// are dropped.
pub fn ratio_test_match(query: &Descriptors, train: &Descriptors, match_conf: f32) -> Vec<FeatureMatch> {
    let ratio = 1.0 - match_conf;
    knn2_match(query, train)
        .into_iter()
        .filter_map(|pair| {
            let second = pair.second?;
            (pair.best.distance < ratio * second.distance).then_some(pair.best)
        })
        .collect()
}
