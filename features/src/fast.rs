use image::GrayImage;
use pano_core::KeyPoint;
use rayon::prelude::*;

/// Bresenham circle of radius 3 around the candidate pixel.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Minimum contiguous arc length (FAST-9).
const ARC_LENGTH: usize = 9;

/// FAST-9 corners with 3x3 non-maximum suppression, strongest first.
pub fn fast_detect(image: &GrayImage, threshold: u8, max_keypoints: usize) -> Vec<KeyPoint> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width < 7 || height < 7 {
        return Vec::new();
    }

    let raw = image.as_raw();
    let mut scores = vec![0u32; (width * height) as usize];
    scores
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            if y < 3 || y >= height - 3 {
                return;
            }
            for x in 3..width - 3 {
                row[x as usize] = corner_score(raw, width, x, y, threshold);
            }
        });

    let mut keypoints: Vec<KeyPoint> = (3..height - 3)
        .into_par_iter()
        .flat_map_iter(|y| {
            let scores = &scores;
            (3..width - 3).filter_map(move |x| {
                let score = scores[(y * width + x) as usize];
                if score == 0 || !is_local_max(scores, width, x, y, score) {
                    return None;
                }
                Some(KeyPoint::new(x as f64, y as f64).with_response(score as f64))
            })
        })
        .collect();

    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keypoints.truncate(max_keypoints);
    keypoints
}

/// Sum of absolute differences over the winning arc class, 0 when the pixel
/// is not a corner.
pub fn corner_score(raw: &[u8], width: i32, x: i32, y: i32, threshold: u8) -> u32 {
    let p = raw[(y * width + x) as usize] as i32;
    let t = threshold as i32;

    let mut classes = [0i8; 16];
    let mut diffs = [0i32; 16];
    for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let v = raw[((y + dy) * width + (x + dx)) as usize] as i32;
        diffs[i] = v - p;
        classes[i] = if v > p + t {
            1
        } else if v < p - t {
            -1
        } else {
            0
        };
    }

    for sign in [1i8, -1] {
        let mut run = 0;
        let mut longest = 0;
        for i in 0..32 {
            if classes[i % 16] == sign {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        if longest >= ARC_LENGTH {
            let score: i32 = classes
                .iter()
                .zip(diffs.iter())
                .filter(|(&c, _)| c == sign)
                .map(|(_, &d)| d.abs() - t)
                .sum();
            return score.max(1) as u32;
        }
    }
    0
}

/// Ties are broken in raster order so flat plateaus keep exactly one pixel.
fn is_local_max(scores: &[u32], width: i32, x: i32, y: i32, score: u32) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let other = scores[((y + dy) * width + (x + dx)) as usize];
            let earlier = dy < 0 || (dy == 0 && dx < 0);
            if other > score || (earlier && other == score) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_image() -> GrayImage {
        let mut img = GrayImage::from_pixel(40, 40, Luma([20]));
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, Luma([220]));
            }
        }
        img
    }

    #[test]
    fn detects_square_corners() {
        let kps = fast_detect(&square_image(), 20, 100);
        assert!(!kps.is_empty());
        for (cx, cy) in [(10.0, 10.0), (29.0, 10.0), (10.0, 29.0), (29.0, 29.0)] {
            assert!(
                kps.iter().any(|kp| (kp.x - cx).abs() <= 2.0 && (kp.y - cy).abs() <= 2.0),
                "no corner near ({cx}, {cy})"
            );
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(32, 32, Luma([128]));
        assert!(fast_detect(&img, 10, 100).is_empty());
    }

    #[test]
    fn tiny_image_is_ignored() {
        let img = GrayImage::from_pixel(5, 5, Luma([0]));
        assert!(fast_detect(&img, 10, 100).is_empty());
    }

    #[test]
    fn respects_keypoint_budget() {
        let kps = fast_detect(&square_image(), 20, 2);
        assert!(kps.len() <= 2);
    }
}
