//! Gain compensation between overlapping warped images.

use super::warpers::Warped;
use image::RgbImage;
use nalgebra::{DMatrix, DVector};
use pano_imgproc::rgb_intensity;
use rayon::prelude::*;

/// Weight of the intensity-difference term.
const ALPHA: f64 = 0.01;
/// Weight of the gain prior pulling every gain towards 1.
const BETA: f64 = 100.0;

/// Overlap pixel count and mean intensities of `a` and `b` over it.
fn overlap_stats(a: &Warped, b: &Warped) -> Option<(f64, f64, f64)> {
    let roi = a.roi().intersection(&b.roi())?;
    let mut count = 0u64;
    let (mut sum_a, mut sum_b) = (0.0f64, 0.0f64);
    for y in 0..roi.height {
        for x in 0..roi.width {
            let (gx, gy) = (roi.x + x as i32, roi.y + y as i32);
            let (ax, ay) = ((gx - a.corner.0) as u32, (gy - a.corner.1) as u32);
            let (bx, by) = ((gx - b.corner.0) as u32, (gy - b.corner.1) as u32);
            if a.mask.get_pixel(ax, ay)[0] == 0 || b.mask.get_pixel(bx, by)[0] == 0 {
                continue;
            }
            count += 1;
            sum_a += rgb_intensity(&a.image.get_pixel(ax, ay).0) as f64;
            sum_b += rgb_intensity(&b.image.get_pixel(bx, by).0) as f64;
        }
    }
    let n = count.max(1) as f64;
    Some((n, sum_a / n, sum_b / n))
}

/// Per-image gains minimising the intensity differences over overlaps.
/// Falls back to unit gains if the system is singular.
pub fn gains(warped: &[Warped]) -> Vec<f64> {
    let n = warped.len();
    let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect();
    let stats: Vec<((usize, usize), Option<(f64, f64, f64)>)> = pairs
        .par_iter()
        .map(|&(i, j)| ((i, j), overlap_stats(&warped[i], &warped[j])))
        .collect();

    let mut count = DMatrix::<f64>::zeros(n, n);
    let mut mean = DMatrix::<f64>::zeros(n, n);
    for ((i, j), s) in stats {
        if let Some((c, mi, mj)) = s {
            count[(i, j)] = c;
            count[(j, i)] = c;
            mean[(i, j)] = mi;
            mean[(j, i)] = mj;
        }
    }

    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);
    for i in 0..n {
        for j in 0..n {
            b[i] += BETA * count[(i, j)];
            a[(i, i)] += BETA * count[(i, j)];
            if j == i {
                continue;
            }
            a[(i, i)] += 2.0 * ALPHA * mean[(i, j)] * mean[(i, j)] * count[(i, j)];
            a[(i, j)] -= 2.0 * ALPHA * mean[(i, j)] * mean[(j, i)] * count[(i, j)];
        }
    }

    match a.lu().solve(&b) {
        Some(g) if g.iter().all(|v| v.is_finite() && *v > 0.0) => {
            tracing::debug!(gains = ?g.as_slice(), "exposure gains");
            g.iter().copied().collect()
        }
        _ => {
            tracing::warn!("exposure compensation failed, using unit gains");
            vec![1.0; n]
        }
    }
}

pub fn apply_gain(image: &mut RgbImage, gain: f64) {
    if (gain - 1.0).abs() < 1e-6 {
        return;
    }
    let g = gain as f32;
    image
        .as_mut()
        .par_iter_mut()
        .for_each(|v| *v = (*v as f32 * g).round().clamp(0.0, 255.0) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    fn flat(corner: (i32, i32), w: u32, value: u8) -> Warped {
        Warped {
            corner,
            image: RgbImage::from_pixel(w, 10, Rgb([value; 3])),
            mask: GrayImage::from_pixel(w, 10, Luma([255])),
        }
    }

    #[test]
    fn equal_exposures_keep_unit_gains() {
        let g = gains(&[flat((0, 0), 20, 100), flat((10, 0), 20, 100)]);
        assert!(g.iter().all(|v| (v - 1.0).abs() < 1e-3), "{g:?}");
    }

    #[test]
    fn darker_image_is_brightened() {
        let g = gains(&[flat((0, 0), 20, 120), flat((10, 0), 20, 80)]);
        assert!(g[1] > g[0], "{g:?}");
        let after = (120.0 * g[0], 80.0 * g[1]);
        assert!((after.0 - after.1).abs() < 40.0);
    }

    #[test]
    fn disjoint_images_stay_unchanged() {
        let g = gains(&[flat((0, 0), 10, 200), flat((50, 0), 10, 20)]);
        assert!(g.iter().all(|v| (v - 1.0).abs() < 1e-6), "{g:?}");
    }

    #[test]
    fn gain_saturates() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([200, 100, 0]));
        apply_gain(&mut img, 1.5);
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 150, 0]));
    }
}
