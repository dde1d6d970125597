use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    /// Orientation in degrees, `-1` when the detector is not rotation aware.
    pub angle: f64,
    pub response: f64,
    pub octave: i32,
}

impl KeyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            size: 1.0,
            angle: -1.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_response(mut self, response: f64) -> Self {
        self.response = response;
        self
    }

    pub fn with_octave(mut self, octave: i32) -> Self {
        self.octave = octave;
        self
    }

    pub fn pt(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn scaled_pt(&self, scale: f64) -> Point2<f64> {
        Point2::new(self.x * scale, self.y * scale)
    }
}

impl Default for KeyPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A correspondence between descriptor `query_idx` of one image and
/// descriptor `train_idx` of another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl FeatureMatch {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }

    /// The same correspondence seen from the other image.
    pub fn swapped(&self) -> Self {
        Self {
            query_idx: self.train_idx,
            train_idx: self.query_idx,
            distance: self.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypoint_builder() {
        let kp = KeyPoint::new(3.0, 4.0).with_angle(90.0).with_octave(2);
        assert_eq!(kp.angle, 90.0);
        assert_eq!(kp.octave, 2);
        assert_eq!(kp.scaled_pt(2.0), Point2::new(6.0, 8.0));
    }

    #[test]
    fn swapped_match_exchanges_indices() {
        let m = FeatureMatch::new(1, 7, 12.0).swapped();
        assert_eq!((m.query_idx, m.train_idx), (7, 1));
        assert_eq!(m.distance, 12.0);
    }
}
