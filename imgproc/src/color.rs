use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use rayon::ThreadPool;

pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    convert_rgb_to_gray_in_pool(rgb, None)
}

/// BT.601 luma in 8-bit fixed point.
pub fn convert_rgb_to_gray_in_pool(rgb: &RgbImage, pool: Option<&ThreadPool>) -> GrayImage {
    let run = || {
        let (w, h) = rgb.dimensions();
        let mut gray = GrayImage::new(w, h);
        gray.as_mut()
            .par_iter_mut()
            .zip(rgb.as_raw().par_chunks_exact(3))
            .for_each(|(g, p)| {
                let luma = 77 * p[0] as u32 + 150 * p[1] as u32 + 29 * p[2] as u32;
                *g = (luma >> 8) as u8;
            });
        gray
    };

    if let Some(p) = pool {
        p.install(run)
    } else {
        run()
    }
}

/// Euclidean length of an RGB pixel, the intensity used for exposure gains.
pub fn rgb_intensity(p: &[u8]) -> f32 {
    let (r, g, b) = (p[0] as f32, p[1] as f32, p[2] as f32);
    (r * r + g * g + b * b).sqrt()
}
