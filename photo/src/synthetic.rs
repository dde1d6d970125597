//! Procedural test scenes: views of a textured sphere around the camera.
//!
//! The sphere carries a two-scale pattern of flat colour cells in
//! longitude/latitude, so every rendered view has plenty of corners and
//! overlapping views agree pixel for pixel up to resampling.

use image::{Rgb, RgbImage};
use nalgebra::{Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const COARSE_CELL: f64 = 0.09;
const FINE_CELL: f64 = 0.03;
const PALETTE_SIZE: usize = 64;

/// A seeded spherical scene.
#[derive(Debug, Clone)]
pub struct SphereScene {
    seed: u64,
    palette: Vec<[f32; 3]>,
}

fn cell_hash(seed: u64, level: u64, i: i64, j: i64) -> u64 {
    let mut h = seed ^ level.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for v in [i as u64, j as u64] {
        h ^= v.wrapping_add(0x9E37_79B9_7F4A_7C15).wrapping_add(h << 6).wrapping_add(h >> 2);
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
    }
    h
}

impl SphereScene {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let palette = (0..PALETTE_SIZE)
            .map(|_| [rng.gen_range(0.0..255.0), rng.gen_range(0.0..255.0), rng.gen_range(0.0..255.0)])
            .collect();
        Self { seed, palette }
    }

    fn cell(&self, level: u64, size: f64, lon: f64, lat: f64) -> [f32; 3] {
        let (i, j) = ((lon / size).floor() as i64, (lat / size).floor() as i64);
        self.palette[(cell_hash(self.seed, level, i, j) % PALETTE_SIZE as u64) as usize]
    }

    /// Colour seen along the world ray `dir`.
    pub fn sample(&self, dir: &Vector3<f64>) -> [f32; 3] {
        let n = dir.norm();
        let lon = dir.x.atan2(dir.z);
        let lat = (dir.y / n).clamp(-1.0, 1.0).asin();
        let coarse = self.cell(0, COARSE_CELL, lon, lat);
        let fine = self.cell(1, FINE_CELL, lon, lat);
        [0, 1, 2].map(|c| 0.55 * coarse[c] + 0.45 * fine[c])
    }

    /// Renders a `width` x `height` pinhole view with `focal` pixels,
    /// turned by `yaw` about the vertical axis and `pitch` about the
    /// horizontal one. Each pixel averages 2x2 samples.
    pub fn render(&self, yaw: f64, pitch: f64, width: u32, height: u32, focal: f64) -> RgbImage {
        let r = Rotation3::from_euler_angles(0.0, yaw, 0.0) * Rotation3::from_euler_angles(pitch, 0.0, 0.0);
        let (cx, cy) = (width as f64 * 0.5, height as f64 * 0.5);
        let mut out = RgbImage::new(width, height);
        out.par_chunks_mut(width as usize * 3).enumerate().for_each(|(y, row)| {
            for x in 0..width as usize {
                let mut acc = [0.0f32; 3];
                for (sx, sy) in [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)] {
                    let ray = Vector3::new(x as f64 + sx - cx, y as f64 + sy - cy, focal);
                    let c = self.sample(&(r * ray));
                    for k in 0..3 {
                        acc[k] += c[k] * 0.25;
                    }
                }
                row[x * 3..x * 3 + 3].copy_from_slice(&acc.map(|v| v.round().clamp(0.0, 255.0) as u8));
            }
        });
        out
    }
}

/// Renders one view of the scene of `seed`.
pub fn render_view(seed: u64, yaw: f64, pitch: f64, width: u32, height: u32, focal: f64) -> RgbImage {
    SphereScene::new(seed).render(yaw, pitch, width, height, focal)
}

/// A flat image, useful as a view that matches nothing.
pub fn blank_view(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value; 3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_seed() {
        let a = render_view(7, 0.1, 0.0, 48, 32, 40.0);
        let b = render_view(7, 0.1, 0.0, 48, 32, 40.0);
        let c = render_view(8, 0.1, 0.0, 48, 32, 40.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn overlapping_views_agree() {
        // A yaw of atan(16 / 100) moves the scene 16 px at the image centre.
        let focal = 100.0;
        let left = render_view(3, 0.0, 0.0, 64, 64, focal);
        let right = render_view(3, (16.0f64 / focal).atan(), 0.0, 64, 64, focal);
        let mut diff = 0u64;
        let mut count = 0u64;
        for y in 28..36 {
            for x in 28..36 {
                let a = left.get_pixel(x + 16, y);
                let b = right.get_pixel(x, y);
                diff += (0..3).map(|c| (a[c] as i32 - b[c] as i32).unsigned_abs() as u64).sum::<u64>();
                count += 3;
            }
        }
        assert!(diff as f64 / (count as f64) < 20.0, "mean difference {}", diff as f64 / count as f64);
    }
}
