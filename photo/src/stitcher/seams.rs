//! Seam estimation: which image owns each overlapping pano pixel.

use super::warpers::Warped;
use image::GrayImage;
use pano_imgproc::distance_transform;
use rayon::prelude::*;

/// Voronoi-style seams: an overlapping pixel goes to the image whose own
/// border is farthest away, ties to the lower index. The returned masks
/// are subsets of the warped masks.
pub fn voronoi_seams(warped: &[Warped]) -> Vec<GrayImage> {
    let distances: Vec<Vec<f32>> = warped.par_iter().map(|w| distance_transform(&w.mask)).collect();

    warped
        .par_iter()
        .enumerate()
        .map(|(i, wi)| {
            let (w, h) = wi.mask.dimensions();
            let mut seam = wi.mask.clone();
            let others: Vec<usize> = (0..warped.len())
                .filter(|&j| j != i && wi.roi().intersection(&warped[j].roi()).is_some())
                .collect();

            for y in 0..h {
                for x in 0..w {
                    if wi.mask.get_pixel(x, y)[0] == 0 {
                        continue;
                    }
                    let di = distances[i][(y * w + x) as usize];
                    let (gx, gy) = (wi.corner.0 + x as i32, wi.corner.1 + y as i32);
                    let loses = others.iter().any(|&j| {
                        let wj = &warped[j];
                        let (lx, ly) = (gx - wj.corner.0, gy - wj.corner.1);
                        if lx < 0 || ly < 0 || lx >= wj.mask.width() as i32 || ly >= wj.mask.height() as i32 {
                            return false;
                        }
                        if wj.mask.get_pixel(lx as u32, ly as u32)[0] == 0 {
                            return false;
                        }
                        let dj = distances[j][(ly as u32 * wj.mask.width() + lx as u32) as usize];
                        dj > di || (dj == di && j < i)
                    });
                    if loses {
                        seam.put_pixel(x, y, image::Luma([0]));
                    }
                }
            }
            seam
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    fn block(corner: (i32, i32), w: u32, h: u32) -> Warped {
        Warped {
            corner,
            image: RgbImage::new(w, h),
            mask: GrayImage::from_pixel(w, h, Luma([255])),
        }
    }

    #[test]
    fn overlap_is_split_without_gaps() {
        let warped = [block((0, 0), 40, 20), block((20, 0), 40, 20)];
        let seams = voronoi_seams(&warped);
        for gx in 0..60 {
            for gy in 0..20 {
                let owners = warped
                    .iter()
                    .zip(&seams)
                    .filter(|(w, s)| {
                        let lx = gx - w.corner.0;
                        lx >= 0 && lx < 40 && s.get_pixel(lx as u32, gy as u32)[0] > 0
                    })
                    .count();
                assert_eq!(owners, 1, "pixel ({gx}, {gy})");
            }
        }
        // Each image keeps the half of the overlap nearer its own centre.
        assert!(seams[0].get_pixel(22, 10)[0] > 0);
        assert_eq!(seams[0].get_pixel(37, 10)[0], 0);
        assert!(seams[1].get_pixel(17, 10)[0] > 0);
    }

    #[test]
    fn lone_image_keeps_its_mask() {
        let warped = [block((0, 0), 10, 10), block((100, 0), 10, 10)];
        let seams = voronoi_seams(&warped);
        assert_eq!(seams[0], warped[0].mask);
        assert_eq!(seams[1], warped[1].mask);
    }
}
