use image::{GrayImage, RgbImage};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Linear,
    /// Box-filtered downsampling, linear when enlarging.
    Area,
}

pub fn resize(src: &GrayImage, width: u32, height: u32, interpolation: Interpolation) -> GrayImage {
    if width == 0 || height == 0 {
        return GrayImage::new(0, 0);
    }
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    if is_area_downscale(src.dimensions(), (width, height), interpolation) {
        return image::imageops::resize(src, width, height, image::imageops::FilterType::Triangle);
    }
    let data = resize_raw(src.as_raw(), src.dimensions(), 1, (width, height), interpolation);
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

pub fn resize_rgb(src: &RgbImage, width: u32, height: u32, interpolation: Interpolation) -> RgbImage {
    if width == 0 || height == 0 {
        return RgbImage::new(0, 0);
    }
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    if is_area_downscale(src.dimensions(), (width, height), interpolation) {
        return image::imageops::resize(src, width, height, image::imageops::FilterType::Triangle);
    }
    let data = resize_raw(src.as_raw(), src.dimensions(), 3, (width, height), interpolation);
    RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
}

fn is_area_downscale(src: (u32, u32), dst: (u32, u32), interpolation: Interpolation) -> bool {
    interpolation == Interpolation::Area && (dst.0 < src.0 || dst.1 < src.1)
}

/// Pixel-centre aligned resampling of an interleaved buffer.
fn resize_raw(
    src: &[u8],
    (src_w, src_h): (u32, u32),
    channels: usize,
    (width, height): (u32, u32),
    interpolation: Interpolation,
) -> Vec<u8> {
    let mut dst = vec![0u8; width as usize * height as usize * channels];
    if src_w == 0 || src_h == 0 {
        return dst;
    }
    let sx_ratio = src_w as f32 / width as f32;
    let sy_ratio = src_h as f32 / height as f32;
    let max_x = src_w as f32 - 1.0;
    let max_y = src_h as f32 - 1.0;
    let stride = src_w as usize * channels;

    dst.par_chunks_mut(width as usize * channels)
        .enumerate()
        .for_each(|(y, row)| {
            let fy = ((y as f32 + 0.5) * sy_ratio - 0.5).clamp(0.0, max_y);
            for x in 0..width as usize {
                let fx = ((x as f32 + 0.5) * sx_ratio - 0.5).clamp(0.0, max_x);
                let out = &mut row[x * channels..(x + 1) * channels];

                if interpolation == Interpolation::Nearest {
                    let idx = fy.round() as usize * stride + fx.round() as usize * channels;
                    out.copy_from_slice(&src[idx..idx + channels]);
                    continue;
                }

                let x0 = fx as usize;
                let y0 = fy as usize;
                let x1 = (x0 + 1).min(src_w as usize - 1);
                let y1 = (y0 + 1).min(src_h as usize - 1);
                let dx = fx - x0 as f32;
                let dy = fy - y0 as f32;

                for (c, o) in out.iter_mut().enumerate() {
                    let v00 = src[y0 * stride + x0 * channels + c] as f32;
                    let v10 = src[y0 * stride + x1 * channels + c] as f32;
                    let v01 = src[y1 * stride + x0 * channels + c] as f32;
                    let v11 = src[y1 * stride + x1 * channels + c] as f32;

                    let v0 = v00 * (1.0 - dx) + v10 * dx;
                    let v1 = v01 * (1.0 - dx) + v11 * dx;
                    *o = (v0 * (1.0 - dy) + v1 * dy).round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    dst
}

/// Size after bounding the longer side by `longer_side`, aspect preserved.
/// Images already within the bound keep their size.
pub fn fit_longer_side(width: u32, height: u32, longer_side: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= longer_side || longer == 0 {
        return (width, height);
    }
    let scale = longer_side as f64 / longer as f64;
    scaled_size(width, height, scale)
}

pub fn scaled_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}
