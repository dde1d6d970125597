//! Tunable knobs of loading, matching, stitching and inpainting.
//!
//! Defaults carry the constants the pipeline was tuned with.

use pano_features::FeatureType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingOptions {
    pub preview_longer_side: u32,
    pub thumbnail_size: u32,
    pub compute_keypoints: bool,
    pub feature_type: FeatureType,
    pub num_features: usize,
}

impl Default for LoadingOptions {
    fn default() -> Self {
        Self {
            preview_longer_side: 1024,
            thumbnail_size: 256,
            compute_keypoints: true,
            feature_type: FeatureType::default(),
            num_features: 3000,
        }
    }
}

impl LoadingOptions {
    pub fn with_preview_longer_side(mut self, longer_side: u32) -> Self {
        self.preview_longer_side = longer_side;
        self
    }

    pub fn with_compute_keypoints(mut self, compute: bool) -> Self {
        self.compute_keypoints = compute;
        self
    }

    pub fn with_feature_type(mut self, feature_type: FeatureType) -> Self {
        self.feature_type = feature_type;
        self
    }

    pub fn with_num_features(mut self, n: usize) -> Self {
        self.num_features = n;
        self
    }
}

/// How loaded images are grouped into panoramas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchingType {
    /// No grouping: every pano is built by hand.
    None,
    /// All images form one pano, matching is skipped.
    SinglePano,
    #[default]
    Auto,
}

impl MatchingType {
    pub fn needs_keypoints(&self) -> bool {
        matches!(self, MatchingType::Auto)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingOptions {
    pub matching_type: MatchingType,
    pub neighborhood_search_size: usize,
    pub match_threshold: usize,
    pub match_conf: f32,
    pub reprojection_threshold: f64,
    /// Average shift, in preview pixels, below which two images count as a
    /// stacked shot.
    pub min_shift: f64,
}

impl Default for MatchingOptions {
    fn default() -> Self {
        Self {
            matching_type: MatchingType::Auto,
            neighborhood_search_size: 2,
            match_threshold: 70,
            match_conf: 0.25,
            reprojection_threshold: 3.0,
            min_shift: 0.0,
        }
    }
}

impl MatchingOptions {
    pub fn with_matching_type(mut self, matching_type: MatchingType) -> Self {
        self.matching_type = matching_type;
        self
    }

    pub fn with_neighborhood_search_size(mut self, n: usize) -> Self {
        self.neighborhood_search_size = n;
        self
    }

    pub fn with_match_threshold(mut self, threshold: usize) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn with_match_conf(mut self, conf: f32) -> Self {
        self.match_conf = conf;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveCorrection {
    Off,
    #[default]
    Auto,
    Horizontal,
    Vertical,
}

/// Target surface of the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectionType {
    Perspective,
    Cylindrical,
    #[default]
    Spherical,
    Fisheye,
    Stereographic,
    CompressedRectilinear,
    Panini,
    Mercator,
    TransverseMercator,
}

impl ProjectionType {
    pub const ALL: [ProjectionType; 9] = [
        ProjectionType::Perspective,
        ProjectionType::Cylindrical,
        ProjectionType::Spherical,
        ProjectionType::Fisheye,
        ProjectionType::Stereographic,
        ProjectionType::CompressedRectilinear,
        ProjectionType::Panini,
        ProjectionType::Mercator,
        ProjectionType::TransverseMercator,
    ];

    /// Projections whose output has not been validated on real captures.
    pub fn is_experimental(&self) -> bool {
        matches!(self, ProjectionType::Fisheye | ProjectionType::Stereographic)
    }

    pub fn has_parameters(&self) -> bool {
        matches!(self, ProjectionType::CompressedRectilinear | ProjectionType::Panini)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProjectionType::Perspective => "Perspective",
            ProjectionType::Cylindrical => "Cylindrical",
            ProjectionType::Spherical => "Spherical",
            ProjectionType::Fisheye => "*Fisheye",
            ProjectionType::Stereographic => "*Stereographic",
            ProjectionType::CompressedRectilinear => "Compressed Rectilinear",
            ProjectionType::Panini => "Panini",
            ProjectionType::Mercator => "Mercator",
            ProjectionType::TransverseMercator => "Transverse Mercator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExposureCompensator {
    None,
    #[default]
    Gain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeamFinder {
    None,
    #[default]
    Voronoi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlenderType {
    #[default]
    MultiBand,
    /// Feathered multi-band blend on the run-to-completion pool.
    Multiblend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchAlgorithmOptions {
    pub feature_type: FeatureType,
    pub num_features: usize,
    pub match_conf: f32,
    pub reprojection_threshold: f64,
    /// Pairwise confidence a match must exceed to join the stitched component.
    pub conf_threshold: f64,
    /// Megapixels of the registration (feature) images.
    pub registration_resolution: f64,
    /// Megapixels of the seam estimation images.
    pub seam_resolution: f64,
    pub wave_correction: WaveCorrection,
    pub projection: ProjectionType,
    /// `(a, b)` of the Panini and compressed rectilinear projections.
    pub projection_params: (f64, f64),
    pub exposure: ExposureCompensator,
    pub seam: SeamFinder,
    pub blender: BlenderType,
    /// Blend width as a percentage of the composite diagonal.
    pub blend_strength: f64,
    pub bundle_max_iterations: usize,
    pub max_pano_size: u32,
}

impl Default for StitchAlgorithmOptions {
    fn default() -> Self {
        Self {
            feature_type: FeatureType::default(),
            num_features: 3000,
            match_conf: 0.25,
            reprojection_threshold: 3.0,
            conf_threshold: 1.0,
            registration_resolution: 0.6,
            seam_resolution: 0.1,
            wave_correction: WaveCorrection::default(),
            projection: ProjectionType::default(),
            projection_params: (2.0, 1.0),
            exposure: ExposureCompensator::default(),
            seam: SeamFinder::default(),
            blender: BlenderType::default(),
            blend_strength: 5.0,
            bundle_max_iterations: 100,
            max_pano_size: 20000,
        }
    }
}

impl StitchAlgorithmOptions {
    pub fn with_projection(mut self, projection: ProjectionType) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_wave_correction(mut self, wave: WaveCorrection) -> Self {
        self.wave_correction = wave;
        self
    }

    pub fn with_blender(mut self, blender: BlenderType) -> Self {
        self.blender = blender;
        self
    }

    pub fn with_exposure(mut self, exposure: ExposureCompensator) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_seam(mut self, seam: SeamFinder) -> Self {
        self.seam = seam;
        self
    }

    pub fn with_feature_type(mut self, feature_type: FeatureType) -> Self {
        self.feature_type = feature_type;
        self
    }

    pub fn with_max_pano_size(mut self, max: u32) -> Self {
        self.max_pano_size = max;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InpaintingMethod {
    #[default]
    Telea,
    NavierStokes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintingOptions {
    pub method: InpaintingMethod,
    /// Neighbourhood radius, in pixels, of each filled pixel.
    pub radius: u32,
}

impl Default for InpaintingOptions {
    fn default() -> Self {
        Self {
            method: InpaintingMethod::Telea,
            radius: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experimental_projections_are_flagged() {
        let experimental: Vec<_> = ProjectionType::ALL.iter().filter(|p| p.is_experimental()).collect();
        assert_eq!(experimental, vec![&ProjectionType::Fisheye, &ProjectionType::Stereographic]);
        for p in ProjectionType::ALL {
            assert_eq!(p.label().starts_with('*'), p.is_experimental());
        }
    }

    #[test]
    fn only_auto_matching_needs_keypoints() {
        assert!(MatchingType::Auto.needs_keypoints());
        assert!(!MatchingType::SinglePano.needs_keypoints());
        assert!(!MatchingType::None.needs_keypoints());
    }

    #[test]
    fn options_fill_missing_fields_from_defaults() {
        let opts: StitchAlgorithmOptions = serde_json::from_str(r#"{"projection":"Mercator"}"#).unwrap();
        assert_eq!(opts.projection, ProjectionType::Mercator);
        assert_eq!(opts.max_pano_size, 20000);
        assert_eq!(opts.seam, SeamFinder::Voronoi);
    }
}
