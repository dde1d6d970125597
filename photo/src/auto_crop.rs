//! Approximate largest fully-valid rectangle of a validity mask.
//!
//! Every column is reduced to its single longest run of valid pixels.
//! Starting from a few seed columns, a rectangle grows one column at a time
//! towards whichever side keeps the larger area, until neither side can
//! grow. A column without a run (or whose run does not overlap the current
//! rows) stops growth in its direction, so the search is a heuristic and
//! not an exact solution.

use image::GrayImage;
use pano_core::CropRect;

/// Number of strided seed columns, spaced `width / SEED_COUNT` apart, tried
/// besides the middle one.
const SEED_COUNT: u32 = 16;

/// Inclusive `(top, bottom)` of the longest valid run in each column.
fn longest_runs(mask: &GrayImage) -> Vec<Option<(u32, u32)>> {
    let (w, h) = mask.dimensions();
    (0..w)
        .map(|x| {
            let mut best: Option<(u32, u32)> = None;
            let mut start: Option<u32> = None;
            for y in 0..=h {
                let valid = y < h && mask.get_pixel(x, y)[0] > 0;
                match (valid, start) {
                    (true, None) => start = Some(y),
                    (false, Some(s)) => {
                        let len = y - s;
                        if best.map_or(true, |(t, b)| len > b + 1 - t) {
                            best = Some((s, y - 1));
                        }
                        start = None;
                    }
                    _ => {}
                }
            }
            best
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

impl Candidate {
    fn area(&self) -> u64 {
        (self.right - self.left + 1) as u64 * (self.bottom - self.top + 1) as u64
    }

    /// The candidate widened to column `x`, if its run overlaps.
    fn extend(&self, x: u32, run: Option<(u32, u32)>) -> Option<Candidate> {
        let (t, b) = run?;
        let top = self.top.max(t);
        let bottom = self.bottom.min(b);
        if bottom < top {
            return None;
        }
        Some(Candidate {
            left: self.left.min(x),
            right: self.right.max(x),
            top,
            bottom,
        })
    }
}

fn grow_from(seed: u32, runs: &[Option<(u32, u32)>]) -> Option<Candidate> {
    let (top, bottom) = runs[seed as usize]?;
    let mut current = Candidate { left: seed, right: seed, top, bottom };
    let mut best = current;
    let width = runs.len() as u32;

    loop {
        let left = current
            .left
            .checked_sub(1)
            .and_then(|x| current.extend(x, runs[x as usize]));
        let right = (current.right + 1 < width)
            .then(|| current.extend(current.right + 1, runs[current.right as usize + 1]))
            .flatten();

        current = match (left, right) {
            (None, None) => break,
            (Some(l), None) => l,
            (None, Some(r)) => r,
            (Some(l), Some(r)) => {
                if l.area() > r.area() {
                    l
                } else {
                    r
                }
            }
        };
        if current.area() > best.area() {
            best = current;
        }
    }
    Some(best)
}

fn seeds(width: u32) -> Vec<u32> {
    let stride = (width / SEED_COUNT).max(1);
    let mut seeds = vec![width / 2];
    seeds.extend((0..width).step_by(stride as usize).filter(|&x| x != width / 2));
    seeds
}

/// Largest rectangle of valid pixels found from the seed columns, with an
/// inclusive end corner. `None` for an empty or fully invalid mask.
pub fn find_largest_crop(mask: &GrayImage) -> Option<CropRect> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let runs = longest_runs(mask);

    let mut best: Option<Candidate> = None;
    for seed in seeds(w) {
        if let Some(c) = grow_from(seed, &runs) {
            if best.map_or(true, |b| c.area() > b.area()) {
                best = Some(c);
            }
        }
    }

    let best = best?;
    tracing::debug!(
        left = best.left,
        top = best.top,
        right = best.right,
        bottom = best.bottom,
        "auto crop"
    );
    Some(CropRect::new((best.left, best.top), (best.right, best.bottom)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask(w: u32, h: u32, valid: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([if valid(x, y) { 255 } else { 0 }]))
    }

    #[test]
    fn full_mask_is_fully_cropped() {
        let crop = find_largest_crop(&mask(20, 10, |_, _| true)).unwrap();
        assert_eq!(crop, CropRect::new((0, 0), (19, 9)));
    }

    #[test]
    fn invalid_and_empty_masks() {
        assert!(find_largest_crop(&mask(20, 10, |_, _| false)).is_none());
        assert!(find_largest_crop(&GrayImage::new(0, 0)).is_none());
    }

    #[test]
    fn invalid_column_truncates_growth() {
        let crop = find_largest_crop(&mask(20, 10, |x, _| x != 5)).unwrap();
        assert_eq!(crop, CropRect::new((6, 0), (19, 9)));
    }

    #[test]
    fn longest_run_per_column_only() {
        // Column runs: rows 0..=1 (short) and 4..=9 (long).
        let crop = find_largest_crop(&mask(8, 10, |_, y| y < 2 || y > 3)).unwrap();
        assert_eq!(crop, CropRect::new((0, 4), (7, 9)));
    }

    #[test]
    fn trades_height_for_width() {
        // A tall narrow block in the middle and a wide short band.
        let crop = find_largest_crop(&mask(30, 20, |x, y| (12..=14).contains(&x) || (8..=11).contains(&y))).unwrap();
        assert_eq!(crop, CropRect::new((0, 8), (29, 11)));
        assert_eq!(crop.area(), 120);
    }

    #[test]
    fn warped_border_is_avoided() {
        // A slanted top edge, as left by a rotated image.
        let m = mask(40, 30, |x, y| y >= x / 4);
        let crop = find_largest_crop(&m).unwrap();
        for y in crop.start.1..=crop.end.1 {
            for x in crop.start.0..=crop.end.0 {
                assert!(m.get_pixel(x, y)[0] > 0);
            }
        }
        assert!(crop.area() >= 500);
    }
}
