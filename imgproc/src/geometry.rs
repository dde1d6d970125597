use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// Bilinear RGB remap that also reports coverage: a destination pixel is
/// valid when its source coordinate lies inside the source raster (half a
/// pixel of slack on each side, edge pixels replicated).
pub fn remap_rgb_with_mask(
    src: &RgbImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
) -> (RgbImage, GrayImage) {
    debug_assert_eq!(map_x.len(), (width * height) as usize);
    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let raw = src.as_raw();
    let mut dst = RgbImage::new(width, height);
    let mut mask = GrayImage::new(width, height);
    if sw == 0 || sh == 0 {
        return (dst, mask);
    }

    dst.as_mut()
        .par_chunks_mut(width as usize * 3)
        .zip(mask.as_mut().par_chunks_mut(width as usize))
        .enumerate()
        .for_each(|(y, (row, mask_row))| {
            for x in 0..width as usize {
                let idx = y * width as usize + x;
                let (sx, sy) = (map_x[idx], map_y[idx]);
                if !(sx >= -0.5 && sy >= -0.5 && sx <= sw as f32 - 0.5 && sy <= sh as f32 - 0.5) {
                    continue;
                }
                let fx = sx.clamp(0.0, sw as f32 - 1.0);
                let fy = sy.clamp(0.0, sh as f32 - 1.0);
                let x0 = fx as usize;
                let y0 = fy as usize;
                let x1 = (x0 + 1).min(sw - 1);
                let y1 = (y0 + 1).min(sh - 1);
                let dx = fx - x0 as f32;
                let dy = fy - y0 as f32;

                for c in 0..3 {
                    let v00 = raw[(y0 * sw + x0) * 3 + c] as f32;
                    let v10 = raw[(y0 * sw + x1) * 3 + c] as f32;
                    let v01 = raw[(y1 * sw + x0) * 3 + c] as f32;
                    let v11 = raw[(y1 * sw + x1) * 3 + c] as f32;
                    let v0 = v00 * (1.0 - dx) + v10 * dx;
                    let v1 = v01 * (1.0 - dx) + v11 * dx;
                    row[x * 3 + c] = (v0 * (1.0 - dy) + v1 * dy).round().clamp(0.0, 255.0) as u8;
                }
                mask_row[x] = 255;
            }
        });

    (dst, mask)
}
