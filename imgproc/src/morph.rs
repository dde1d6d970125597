use image::GrayImage;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphShape {
    Rectangle,
    Cross,
}

pub fn create_morph_kernel(shape: MorphShape, width: u32, height: u32) -> Vec<(i32, i32)> {
    let cx = width as i32 / 2;
    let cy = height as i32 / 2;

    match shape {
        MorphShape::Rectangle => (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| (x - cx, y - cy)))
            .collect(),
        MorphShape::Cross => {
            let mut kernel: Vec<(i32, i32)> = (-cx..=cx).map(|i| (i, 0)).collect();
            kernel.extend((-cy..=cy).filter(|&i| i != 0).map(|i| (0, i)));
            kernel
        }
    }
}

pub fn dilate(src: &GrayImage, kernel: &[(i32, i32)], iterations: u32) -> GrayImage {
    let mut output = src.clone();
    for _ in 0..iterations {
        output = dilate_once(&output, kernel);
    }
    output
}

fn dilate_once(current: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let width = current.width() as i32;
    let height = current.height() as i32;
    let raw = current.as_raw();
    let mut output = GrayImage::new(current.width(), current.height());

    output
        .as_mut()
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for x in 0..width {
                let mut max_val = 0u8;
                for &(kx, ky) in kernel {
                    let px = x + kx;
                    let py = y + ky;
                    if px >= 0 && px < width && py >= 0 && py < height {
                        max_val = max_val.max(raw[(py * width + px) as usize]);
                    }
                }
                row[x as usize] = max_val;
            }
        });

    output
}

/// Per-pixel AND of two masks of equal size.
pub fn mask_and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = a.clone();
    out.as_mut()
        .par_iter_mut()
        .zip(b.as_raw().par_iter())
        .for_each(|(o, &v)| *o = if *o > 0 && v > 0 { 255 } else { 0 });
    out
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().par_iter().filter(|&&v| v > 0).count()
}
