//! Feature detection, description and matching.
//!
//! Two detector variants are available behind [`FeatureType`]: ORB
//! (multi-scale, rotation aware) and Harris corners with upright BRIEF
//! (single scale, cheaper). Both emit 256-bit binary descriptors that are
//! matched by Hamming distance.

pub mod brief;
pub mod fast;
pub mod harris;
pub mod matcher;
pub mod orb;
pub mod ransac;

pub use brief::Brief;
pub use fast::fast_detect;
pub use harris::harris_detect;
pub use matcher::{knn2_match, ratio_test_match, KnnPair};
pub use orb::Orb;
pub use ransac::{estimate_homography, project_point, HomographyEstimator, MatchPair, RansacConfig};

use image::GrayImage;
use pano_core::Descriptors;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Core error: {0}")]
    Core(#[from] pano_core::Error),

    #[error("Matching error: {0}")]
    MatchingError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Orb,
    Harris,
}

impl FeatureType {
    pub const ALL: [FeatureType; 2] = [FeatureType::Orb, FeatureType::Harris];

    pub fn label(&self) -> &'static str {
        match self {
            FeatureType::Orb => "ORB",
            FeatureType::Harris => "Harris + BRIEF",
        }
    }
}

/// Upright BRIEF on Harris corners.
#[derive(Debug, Clone)]
pub struct HarrisBrief {
    n_features: usize,
    quality: f64,
    brief: Brief,
}

impl HarrisBrief {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            quality: 0.01,
            brief: Brief::new(32, 31),
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn detect_and_compute(&self, image: &GrayImage) -> Descriptors {
        let border = self.brief.border(false);
        let (w, h) = (image.width() as i32, image.height() as i32);
        let mut kps = harris_detect(image, 3, 0.04, self.quality, usize::MAX);
        kps.retain(|kp| {
            let (x, y) = (kp.x as i32, kp.y as i32);
            x >= border && x < w - border && y >= border && y < h - border
        });
        kps.truncate(self.n_features);

        let smoothed = image::imageops::blur(image, 2.0);
        kps.iter()
            .filter_map(|kp| self.brief.describe(&smoothed, kp))
            .collect()
    }
}

/// An explicitly owned detector. Build one per call or per worker; it holds
/// no state shared with other instances.
#[derive(Debug, Clone)]
pub enum FeatureDetector {
    Orb(Orb),
    Harris(HarrisBrief),
}

impl FeatureDetector {
    pub fn new(kind: FeatureType, num_features: usize) -> Self {
        match kind {
            FeatureType::Orb => FeatureDetector::Orb(Orb::new().with_n_features(num_features)),
            FeatureType::Harris => FeatureDetector::Harris(HarrisBrief::new(num_features)),
        }
    }

    pub fn kind(&self) -> FeatureType {
        match self {
            FeatureDetector::Orb(_) => FeatureType::Orb,
            FeatureDetector::Harris(_) => FeatureType::Harris,
        }
    }

    pub fn detect_and_compute(&self, image: &GrayImage) -> Descriptors {
        let descriptors = match self {
            FeatureDetector::Orb(orb) => orb.detect_and_compute(image),
            FeatureDetector::Harris(harris) => harris.detect_and_compute(image),
        };
        tracing::trace!(
            kind = self.kind().label(),
            count = descriptors.len(),
            "detected features"
        );
        descriptors
    }
}
