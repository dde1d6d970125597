//! Multi-band blending of warped images on the pano canvas.

use super::warpers::Roi;
use image::{GrayImage, RgbImage};
use pano_imgproc::{
    collapse_laplacian, distance_transform, gaussian_pyramid, laplacian_pyramid, pyr_down, pyr_up, FloatImage,
};
use pano_runtime::ProgressMonitor;
use rayon::prelude::*;

const WEIGHT_EPS: f32 = 1e-5;
const MAX_BANDS: usize = 10;

/// One warped image ready for blending.
pub struct BlendFeed<'a> {
    pub corner: (i32, i32),
    pub image: &'a RgbImage,
    /// Pixels seen by the camera.
    pub coverage: &'a GrayImage,
    /// Pixels this image owns after seam finding.
    pub seam: &'a GrayImage,
}

/// Band count for a blend width given in percent of the canvas diagonal.
pub fn num_bands(canvas: &Roi, blend_strength: f64) -> usize {
    let blend_width = (canvas.width as f64 * canvas.height as f64).sqrt() * blend_strength / 100.0;
    if blend_width < 1.0 {
        return 0;
    }
    ((blend_width.log2().ceil() as i64 - 1).max(0) as usize).min(MAX_BANDS)
}

/// Deepest useful pyramid for the canvas, for the automatic blender.
pub fn auto_bands(canvas: &Roi) -> usize {
    let shorter = canvas.width.min(canvas.height).max(1) as f64;
    ((shorter.log2().floor() as i64 - 3).max(1) as usize).min(MAX_BANDS)
}

fn place(feed: &BlendFeed, canvas: &Roi, values: impl Fn(u32, u32) -> [f32; 3] + Sync, channels: usize) -> FloatImage {
    let mut out = FloatImage::new(canvas.width, canvas.height, channels);
    let (w, h) = feed.image.dimensions();
    let ox = (feed.corner.0 - canvas.x) as usize;
    let oy = (feed.corner.1 - canvas.y) as usize;
    let row_len = canvas.width as usize * channels;
    out.data
        .par_chunks_mut(row_len)
        .enumerate()
        .skip(oy)
        .take(h as usize)
        .for_each(|(cy, row)| {
            let y = (cy - oy) as u32;
            for x in 0..w {
                let v = values(x, y);
                let base = (ox + x as usize) * channels;
                row[base..base + channels].copy_from_slice(&v[..channels]);
            }
        });
    out
}

/// Extends the covered colours into the uncovered canvas so that coarse
/// bands do not pull in black borders.
fn fill_uncovered(image: &FloatImage, coverage: &FloatImage, levels: usize) -> FloatImage {
    let mut premult = image.clone();
    premult
        .data
        .par_chunks_mut(3)
        .zip(coverage.data.par_iter())
        .for_each(|(p, &c)| p.iter_mut().for_each(|v| *v *= c));

    let mut colours = vec![premult];
    let mut weights = vec![coverage.clone()];
    for l in 0..levels {
        let next_c = pyr_down(&colours[l]);
        let next_w = pyr_down(&weights[l]);
        colours.push(next_c);
        weights.push(next_w);
    }

    let normalise = |c: &FloatImage, w: &FloatImage, fallback: Option<&FloatImage>| {
        let mut out = c.clone();
        out.data
            .par_chunks_mut(3)
            .zip(w.data.par_iter())
            .enumerate()
            .for_each(|(i, (p, &wt))| {
                if wt > 0.5 || (fallback.is_none() && wt > WEIGHT_EPS) {
                    p.iter_mut().for_each(|v| *v /= wt.max(WEIGHT_EPS));
                } else if let Some(f) = fallback {
                    p.copy_from_slice(&f.data[i * 3..i * 3 + 3]);
                } else {
                    p.iter_mut().for_each(|v| *v = 0.0);
                }
            });
        out
    };

    let mut filled = normalise(&colours[levels], &weights[levels], None);
    for l in (0..levels).rev() {
        let up = pyr_up(&filled, colours[l].width, colours[l].height);
        filled = normalise(&colours[l], &weights[l], Some(&up));
    }
    filled
}

/// Blends `feeds` over `canvas` with `bands` Laplacian levels. Feeds weigh
/// in through their seam masks, softened over `feather` pixels when given.
///
/// With a monitor, cancellation is checked between feeds and `None` is
/// returned once it is observed.
pub fn multi_band(
    feeds: &[BlendFeed],
    canvas: &Roi,
    bands: usize,
    feather: Option<f32>,
    cancel: Option<&ProgressMonitor>,
) -> Option<RgbImage> {
    let mut acc: Option<Vec<FloatImage>> = None;
    let mut weight_sum: Option<Vec<FloatImage>> = None;

    for feed in feeds {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return None;
        }

        let colour = place(feed, canvas, |x, y| {
            let p = feed.image.get_pixel(x, y);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        }, 3);
        let coverage = place(feed, canvas, |x, y| {
            [if feed.coverage.get_pixel(x, y)[0] > 0 { 1.0 } else { 0.0 }; 3]
        }, 1);

        let seam_weights: Vec<f32> = match feather {
            Some(width) => distance_transform(feed.seam)
                .into_iter()
                .map(|d| (d / width.max(1.0)).min(1.0))
                .collect(),
            None => feed.seam.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
        };
        let sw = feed.seam.width();
        let weight = place(feed, canvas, |x, y| [seam_weights[(y * sw + x) as usize]; 3], 1);

        let filled = fill_uncovered(&colour, &coverage, bands + 2);
        let lap = laplacian_pyramid(&filled, bands);
        let gauss = gaussian_pyramid(&weight, bands);

        let acc_levels = acc.get_or_insert_with(|| lap.iter().map(|l| FloatImage::new(l.width, l.height, 3)).collect());
        let sum_levels =
            weight_sum.get_or_insert_with(|| gauss.iter().map(|g| FloatImage::new(g.width, g.height, 1)).collect());

        for ((a, s), (l, g)) in acc_levels.iter_mut().zip(sum_levels.iter_mut()).zip(lap.iter().zip(gauss.iter())) {
            a.data
                .par_chunks_mut(3)
                .zip(s.data.par_iter_mut())
                .zip(l.data.par_chunks(3).zip(g.data.par_iter()))
                .for_each(|((ap, sp), (lp, &gw))| {
                    for c in 0..3 {
                        ap[c] += lp[c] * gw;
                    }
                    *sp += gw;
                });
        }

        if let Some(c) = cancel {
            c.notify_task_done();
        }
    }

    let mut acc = acc?;
    let weight_sum = weight_sum?;
    for (a, s) in acc.iter_mut().zip(weight_sum.iter()) {
        a.data
            .par_chunks_mut(3)
            .zip(s.data.par_iter())
            .for_each(|(p, &w)| p.iter_mut().for_each(|v| *v /= w + WEIGHT_EPS));
    }
    Some(collapse_laplacian(&acc)?.to_rgb())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn feed_data(w: u32, h: u32, value: u8) -> (RgbImage, GrayImage) {
        (RgbImage::from_pixel(w, h, Rgb([value; 3])), GrayImage::from_pixel(w, h, Luma([255])))
    }

    #[test]
    fn band_counts() {
        let canvas = Roi { x: 0, y: 0, width: 1000, height: 1000 };
        // 50 px wide blend: ceil(log2(50)) - 1 = 5.
        assert_eq!(num_bands(&canvas, 5.0), 5);
        assert_eq!(num_bands(&canvas, 0.0), 0);
        assert_eq!(auto_bands(&Roi { x: 0, y: 0, width: 64, height: 32 }), 2);
    }

    #[test]
    fn single_feed_is_reproduced() {
        let img = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 7) as u8, (y * 9) as u8, 90]));
        let mask = GrayImage::from_pixel(32, 24, Luma([255]));
        let canvas = Roi { x: 5, y: -3, width: 32, height: 24 };
        let feeds = [BlendFeed { corner: (5, -3), image: &img, coverage: &mask, seam: &mask }];
        let out = multi_band(&feeds, &canvas, 3, None, None).unwrap();
        for (a, b) in out.pixels().zip(img.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
            }
        }
    }

    #[test]
    fn seam_transition_is_smooth() {
        let (dark, full) = feed_data(40, 16, 60);
        let (bright, _) = feed_data(40, 16, 180);
        let left_seam = GrayImage::from_fn(40, 16, |x, _| Luma([if x < 30 { 255 } else { 0 }]));
        let right_seam = GrayImage::from_fn(40, 16, |x, _| Luma([if x >= 10 { 255 } else { 0 }]));
        let canvas = Roi { x: 0, y: 0, width: 60, height: 16 };
        let feeds = [
            BlendFeed { corner: (0, 0), image: &dark, coverage: &full, seam: &left_seam },
            BlendFeed { corner: (20, 0), image: &bright, coverage: &full, seam: &right_seam },
        ];
        let out = multi_band(&feeds, &canvas, 3, None, None).unwrap();
        let row: Vec<i32> = (0..60).map(|x| out.get_pixel(x, 8)[0] as i32).collect();
        assert!((row[2] - 60).abs() <= 2);
        assert!((row[57] - 180).abs() <= 2);
        for pair in row.windows(2) {
            assert!(pair[1] >= pair[0] - 2, "{row:?}");
        }
        let feathered = multi_band(&feeds, &canvas, 2, Some(4.0), None).unwrap();
        assert!((feathered.get_pixel(2, 8)[0] as i32 - 60).abs() <= 2);
    }

    #[test]
    fn cancelled_blend_returns_none() {
        let (img, mask) = feed_data(8, 8, 10);
        let monitor = ProgressMonitor::new();
        monitor.cancel();
        let feeds = [BlendFeed { corner: (0, 0), image: &img, coverage: &mask, seam: &mask }];
        let canvas = Roi { x: 0, y: 0, width: 8, height: 8 };
        assert!(multi_band(&feeds, &canvas, 1, None, Some(&monitor)).is_none());
    }
}
