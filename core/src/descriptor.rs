use crate::KeyPoint;
use serde::{Deserialize, Serialize};

/// Binary descriptor bound to the keypoint it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub data: Vec<u8>,
    pub keypoint: KeyPoint,
}

impl Descriptor {
    pub fn new(data: Vec<u8>, keypoint: KeyPoint) -> Self {
        Self { data, keypoint }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptors {
    pub descriptors: Vec<Descriptor>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, desc: Descriptor) {
        self.descriptors.push(desc);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn keypoints(&self) -> impl Iterator<Item = &KeyPoint> {
        self.descriptors.iter().map(|d| &d.keypoint)
    }

    /// Keeps the `n` descriptors with the strongest keypoint response.
    pub fn retain_strongest(&mut self, n: usize) {
        if self.descriptors.len() <= n {
            return;
        }
        self.descriptors.sort_by(|a, b| {
            b.keypoint
                .response
                .partial_cmp(&a.keypoint.response)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.descriptors.truncate(n);
    }
}

impl FromIterator<Descriptor> for Descriptors {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_identical_is_zero() {
        let d = Descriptor::new(vec![0b1010_1010, 0b1111_0000, 0b0000_1111], KeyPoint::default());
        assert_eq!(d.hamming_distance(&d), 0);
    }

    #[test]
    fn hamming_all_different_is_max() {
        let a = Descriptor::new(vec![0xFF; 4], KeyPoint::default());
        let b = Descriptor::new(vec![0x00; 4], KeyPoint::default());
        assert_eq!(a.hamming_distance(&b), 32);
    }

    #[test]
    fn hamming_partial_overlap() {
        let a = Descriptor::new(vec![0b1111_0000], KeyPoint::default());
        let b = Descriptor::new(vec![0b1111_1111], KeyPoint::default());
        assert_eq!(a.hamming_distance(&b), 4);
    }

    #[test]
    fn retain_strongest_keeps_highest_response() {
        let mut ds: Descriptors = (0..5)
            .map(|i| {
                Descriptor::new(vec![0u8; 4], KeyPoint::new(i as f64, 0.0).with_response(i as f64))
            })
            .collect();
        ds.retain_strongest(2);
        assert_eq!(ds.len(), 2);
        let xs: Vec<f64> = ds.keypoints().map(|kp| kp.x).collect();
        assert_eq!(xs, vec![4.0, 3.0]);
    }

    #[test]
    fn retain_strongest_is_noop_when_small() {
        let mut ds = Descriptors::new();
        ds.push(Descriptor::new(vec![1], KeyPoint::default()));
        ds.retain_strongest(10);
        assert_eq!(ds.len(), 1);
    }
}
