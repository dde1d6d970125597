//! ORB (Oriented FAST and Rotated BRIEF) implementation
//!
//! ORB combines the FAST keypoint detector with a modified BRIEF descriptor
//! that includes orientation information for rotation invariance.

use crate::brief::Brief;
use crate::fast::fast_detect;
use image::GrayImage;
use pano_core::{Descriptors, KeyPoint};

/// ORB feature detector and descriptor
#[derive(Debug, Clone)]
pub struct Orb {
    n_features: usize,
    scale_factor: f32,
    n_levels: usize,
    patch_size: i32,
    fast_threshold: u8,
    brief: Brief,
}

impl Default for Orb {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            patch_size: 31,
            fast_threshold: 20,
            brief: Brief::new(32, 31),
        }
    }
}

impl Orb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_n_levels(mut self, n: usize) -> Self {
        self.n_levels = n.max(1);
        self
    }

    pub fn with_scale_factor(mut self, factor: f32) -> Self {
        self.scale_factor = factor.max(1.01);
        self
    }

    pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
        self.fast_threshold = threshold;
        self
    }

    /// Feature budget of each pyramid level, geometrically decreasing.
    fn level_quotas(&self) -> Vec<usize> {
        let f = 1.0 / self.scale_factor as f64;
        let first = self.n_features as f64 * (1.0 - f) / (1.0 - f.powi(self.n_levels as i32));
        let mut quotas: Vec<usize> = (0..self.n_levels)
            .map(|level| (first * f.powi(level as i32)).floor() as usize)
            .collect();
        let assigned: usize = quotas.iter().sum();
        if let Some(top) = quotas.first_mut() {
            *top += self.n_features.saturating_sub(assigned);
        }
        quotas
    }

    /// Detect FAST corners over the scale pyramid, orient them and compute
    /// steered BRIEF descriptors. Keypoints are in level-0 coordinates.
    pub fn detect_and_compute(&self, image: &GrayImage) -> Descriptors {
        let mut descriptors = Descriptors::with_capacity(self.n_features);
        let border = self.brief.border(true);
        let half_patch = self.patch_size / 2;

        for (level, quota) in self.level_quotas().into_iter().enumerate() {
            let scale = self.scale_factor.powi(level as i32);
            let level_img = if level == 0 {
                image.clone()
            } else {
                scale_image(image, scale)
            };
            let (w, h) = (level_img.width() as i32, level_img.height() as i32);
            if w <= 2 * border || h <= 2 * border {
                break;
            }

            let mut kps = fast_detect(&level_img, self.fast_threshold, usize::MAX);
            kps.retain(|kp| {
                let (x, y) = (kp.x as i32, kp.y as i32);
                x >= border && x < w - border && y >= border && y < h - border
            });
            kps.truncate(quota);

            let smoothed = image::imageops::blur(&level_img, 2.0);
            for kp in kps {
                let angle = intensity_centroid_angle(&level_img, &kp, half_patch);
                let oriented = kp.with_angle(angle);
                if let Some(mut desc) = self.brief.describe(&smoothed, &oriented) {
                    desc.keypoint = KeyPoint::new(kp.x * scale as f64, kp.y * scale as f64)
                        .with_size(self.patch_size as f64 * scale as f64)
                        .with_angle(angle)
                        .with_response(kp.response)
                        .with_octave(level as i32);
                    descriptors.push(desc);
                }
            }
        }

        descriptors
    }
}

/// Orientation in degrees `[0, 360)` from the intensity centroid of a
/// circular patch.
pub fn intensity_centroid_angle(image: &GrayImage, kp: &KeyPoint, half_patch: i32) -> f64 {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let x = kp.x as i32;
    let y = kp.y as i32;
    let radius_sq = half_patch * half_patch;

    let mut m01 = 0.0f64;
    let mut m10 = 0.0f64;

    for dy in -half_patch..=half_patch {
        for dx in -half_patch..=half_patch {
            if dx * dx + dy * dy > radius_sq {
                continue;
            }
            let px = x + dx;
            let py = y + dy;
            if px >= 0 && px < width && py >= 0 && py < height {
                let intensity = image.get_pixel(px as u32, py as u32)[0] as f64;
                m01 += intensity * dy as f64;
                m10 += intensity * dx as f64;
            }
        }
    }

    let angle = m01.atan2(m10).to_degrees();
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

fn scale_image(image: &GrayImage, scale: f32) -> GrayImage {
    let new_width = ((image.width() as f32 / scale).round() as u32).max(1);
    let new_height = ((image.height() as f32 / scale).round() as u32).max(1);

    image::imageops::resize(
        image,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    )
}

pub fn orb_detect_and_compute(image: &GrayImage, n_features: usize) -> Descriptors {
    Orb::new().with_n_features(n_features).detect_and_compute(image)
}
