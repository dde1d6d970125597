use image::GrayImage;
use pano_core::{Descriptor, KeyPoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed seed so every detector instance draws the same test pairs and
/// descriptors stay comparable across images and worker threads.
pub const PATTERN_SEED: u64 = 0x0b71_ef5e;

/// BRIEF binary test pattern, optionally steered by the keypoint angle.
#[derive(Debug, Clone)]
pub struct Brief {
    bytes: usize,
    patch_size: i32,
    pattern: Vec<[(f32, f32); 2]>,
}

impl Brief {
    pub fn new(bytes: usize, patch_size: i32) -> Self {
        Self::with_seed(bytes, patch_size, PATTERN_SEED)
    }

    pub fn with_seed(bytes: usize, patch_size: i32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let half = patch_size as f32 / 2.0;
        // Gaussian-like concentration towards the centre: average two draws.
        let mut draw = move || (rng.gen_range(-half..half) + rng.gen_range(-half..half)) * 0.5;

        let pattern = (0..bytes * 8)
            .map(|_| [(draw(), draw()), (draw(), draw())])
            .collect();

        Self {
            bytes,
            patch_size,
            pattern,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Pixels a keypoint must keep from the border to be described.
    pub fn border(&self, steered: bool) -> i32 {
        let half = self.patch_size / 2 + 1;
        if steered {
            (half as f32 * std::f32::consts::SQRT_2).ceil() as i32
        } else {
            half
        }
    }

    /// Describe `kp` on a pre-smoothed image. `kp.angle < 0` means upright.
    pub fn describe(&self, smoothed: &GrayImage, kp: &KeyPoint) -> Option<Descriptor> {
        let width = smoothed.width() as i32;
        let height = smoothed.height() as i32;
        let cx = kp.x.round() as i32;
        let cy = kp.y.round() as i32;
        let steered = kp.angle >= 0.0;
        let border = self.border(steered);

        if cx < border || cx >= width - border || cy < border || cy >= height - border {
            return None;
        }

        let (sin_a, cos_a) = if steered {
            (kp.angle.to_radians() as f32).sin_cos()
        } else {
            (0.0, 1.0)
        };

        let raw = smoothed.as_raw();
        let sample = |(px, py): (f32, f32)| {
            let rx = (cos_a * px - sin_a * py).round() as i32;
            let ry = (sin_a * px + cos_a * py).round() as i32;
            raw[((cy + ry) * width + (cx + rx)) as usize]
        };

        let mut data = vec![0u8; self.bytes];
        for (i, pair) in self.pattern.iter().enumerate() {
            if sample(pair[0]) < sample(pair[1]) {
                data[i / 8] |= 1 << (7 - i % 8);
            }
        }

        Some(Descriptor::new(data, *kp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured(seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img = GrayImage::new(64, 64);
        for p in img.pixels_mut() {
            *p = Luma([rng.gen()]);
        }
        img
    }

    #[test]
    fn same_seed_gives_same_descriptor() {
        let img = textured(1);
        let kp = KeyPoint::new(32.0, 32.0);
        let a = Brief::new(32, 31).describe(&img, &kp).expect("inside");
        let b = Brief::new(32, 31).describe(&img, &kp).expect("inside");
        assert_eq!(a.data, b.data);
        assert_eq!(a.size(), 32);
    }

    #[test]
    fn border_keypoints_are_skipped() {
        let img = textured(2);
        let brief = Brief::new(32, 31);
        assert!(brief.describe(&img, &KeyPoint::new(3.0, 32.0)).is_none());
        assert!(brief
            .describe(&img, &KeyPoint::new(20.0, 32.0).with_angle(45.0))
            .is_none());
    }
}
