//! Float images and Gaussian/Laplacian pyramids.

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// Interleaved `f32` image with an arbitrary channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl FloatImage {
    pub fn new(width: u32, height: u32, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width as usize * height as usize * channels],
        }
    }

    pub fn from_rgb(img: &RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: 3,
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    /// Mask values scaled to `[0, 1]`.
    pub fn from_mask(mask: &GrayImage) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            channels: 1,
            data: mask.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        debug_assert_eq!(self.channels, 3);
        let data = self.data.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect();
        RgbImage::from_raw(self.width, self.height, data).unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width as usize + x) * self.channels + c]
    }

    fn row_len(&self) -> usize {
        self.width as usize * self.channels
    }
}

const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

fn reflect101(i: isize, n: isize) -> usize {
    if n == 1 {
        return 0;
    }
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * n - 2 - i;
    }
    i.clamp(0, n - 1) as usize
}

/// Separable 5-tap Gaussian blur followed by 2x decimation.
pub fn pyr_down(src: &FloatImage) -> FloatImage {
    let w = ((src.width + 1) / 2).max(1);
    let h = ((src.height + 1) / 2).max(1);
    let ch = src.channels;
    let (sw, sh) = (src.width as isize, src.height as isize);

    // Horizontal pass at decimated columns, full rows.
    let mut tmp = vec![0.0f32; w as usize * src.height as usize * ch];
    tmp.par_chunks_mut(w as usize * ch)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src.data[y * src.row_len()..(y + 1) * src.row_len()];
            for x in 0..w as usize {
                for (k, weight) in KERNEL.iter().enumerate() {
                    let sx = reflect101(2 * x as isize + k as isize - 2, sw);
                    for c in 0..ch {
                        row[x * ch + c] += weight * src_row[sx * ch + c];
                    }
                }
            }
        });

    let mut dst = FloatImage::new(w, h, ch);
    let tmp_row = w as usize * ch;
    dst.data
        .par_chunks_mut(tmp_row)
        .enumerate()
        .for_each(|(y, row)| {
            for (k, weight) in KERNEL.iter().enumerate() {
                let sy = reflect101(2 * y as isize + k as isize - 2, sh);
                let src_row = &tmp[sy * tmp_row..(sy + 1) * tmp_row];
                for (o, s) in row.iter_mut().zip(src_row) {
                    *o += weight * s;
                }
            }
        });
    dst
}

/// Upsamples to `width` x `height` by zero insertion and a 4x scaled
/// 5-tap Gaussian.
pub fn pyr_up(src: &FloatImage, width: u32, height: u32) -> FloatImage {
    let ch = src.channels;
    let (sw, sh) = (src.width as isize, src.height as isize);
    let row_len = width as usize * ch;

    // Horizontal: each output column gathers the source taps that land on it.
    let mut tmp = vec![0.0f32; row_len * src.height as usize];
    tmp.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src.data[y * src.row_len()..(y + 1) * src.row_len()];
            for x in 0..width as isize {
                for (k, weight) in KERNEL.iter().enumerate() {
                    let pos = x + k as isize - 2;
                    if pos % 2 != 0 {
                        continue;
                    }
                    let sx = reflect101(pos / 2, sw).min(src.width as usize - 1);
                    for c in 0..ch {
                        row[x as usize * ch + c] += 2.0 * weight * src_row[sx * ch + c];
                    }
                }
            }
        });

    let mut dst = FloatImage::new(width, height, ch);
    dst.data
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (k, weight) in KERNEL.iter().enumerate() {
                let pos = y as isize + k as isize - 2;
                if pos % 2 != 0 {
                    continue;
                }
                let sy = reflect101(pos / 2, sh);
                let src_row = &tmp[sy * row_len..(sy + 1) * row_len];
                for (o, s) in row.iter_mut().zip(src_row) {
                    *o += 2.0 * weight * s;
                }
            }
        });
    dst
}

/// Gaussian pyramid with `levels + 1` entries, level 0 being `src`.
pub fn gaussian_pyramid(src: &FloatImage, levels: usize) -> Vec<FloatImage> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(src.clone());
    for i in 0..levels {
        let next = pyr_down(&pyramid[i]);
        pyramid.push(next);
    }
    pyramid
}

/// Laplacian pyramid: band-pass levels followed by the coarsest Gaussian level.
pub fn laplacian_pyramid(src: &FloatImage, levels: usize) -> Vec<FloatImage> {
    let gaussian = gaussian_pyramid(src, levels);
    let mut pyramid = Vec::with_capacity(levels + 1);
    for i in 0..levels {
        let up = pyr_up(&gaussian[i + 1], gaussian[i].width, gaussian[i].height);
        let mut band = gaussian[i].clone();
        band.data.par_iter_mut().zip(up.data.par_iter()).for_each(|(b, u)| *b -= u);
        pyramid.push(band);
    }
    pyramid.push(gaussian[levels].clone());
    pyramid
}

/// Inverse of [`laplacian_pyramid`].
pub fn collapse_laplacian(pyramid: &[FloatImage]) -> Option<FloatImage> {
    let mut current = pyramid.last()?.clone();
    for band in pyramid.iter().rev().skip(1) {
        let mut up = pyr_up(&current, band.width, band.height);
        up.data.par_iter_mut().zip(band.data.par_iter()).for_each(|(u, b)| *u += b);
        current = up;
    }
    Some(current)
}
