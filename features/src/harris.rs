use image::GrayImage;
use pano_core::KeyPoint;
use rayon::prelude::*;

/// Harris corner response with 3x3 non-maximum suppression.
///
/// `quality` is relative to the strongest response in the image, the way
/// corner trackers usually threshold it. At most `max_keypoints` strongest
/// corners are returned.
pub fn harris_detect(
    image: &GrayImage,
    block_size: i32,
    k: f64,
    quality: f64,
    max_keypoints: usize,
) -> Vec<KeyPoint> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let half_block = block_size / 2;
    let border = half_block + 2;
    if width <= 2 * border || height <= 2 * border {
        return Vec::new();
    }

    let ix = compute_sobel(image, [-1, 0, 1, -2, 0, 2, -1, 0, 1]);
    let iy = compute_sobel(image, [-1, -2, -1, 0, 0, 0, 1, 2, 1]);

    let mut responses = vec![0.0f64; (width * height) as usize];
    responses
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            if y < half_block + 1 || y >= height - half_block - 1 {
                return;
            }
            for x in (half_block + 1)..(width - half_block - 1) {
                let mut i_xx = 0.0f64;
                let mut i_yy = 0.0f64;
                let mut i_xy = 0.0f64;

                for by in -half_block..=half_block {
                    for bx in -half_block..=half_block {
                        let idx = ((y + by) * width + (x + bx)) as usize;
                        let gx = ix[idx] as f64;
                        let gy = iy[idx] as f64;
                        i_xx += gx * gx;
                        i_yy += gy * gy;
                        i_xy += gx * gy;
                    }
                }

                let det = i_xx * i_yy - i_xy * i_xy;
                let trace = i_xx + i_yy;
                row[x as usize] = det - k * trace * trace;
            }
        });

    let max_response = responses.iter().cloned().fold(0.0f64, f64::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = quality * max_response;

    let mut keypoints = Vec::new();
    for y in border..(height - border) {
        for x in border..(width - border) {
            let idx = (y * width + x) as usize;
            let response = responses[idx];
            if response <= threshold {
                continue;
            }

            let mut is_max = true;
            'window: for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let other = responses[((y + dy) * width + (x + dx)) as usize];
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if other > response || (earlier && other == response) {
                        is_max = false;
                        break 'window;
                    }
                }
            }

            if is_max {
                keypoints.push(KeyPoint::new(x as f64, y as f64).with_response(response));
            }
        }
    }

    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keypoints.truncate(max_keypoints);
    keypoints
}

fn compute_sobel(image: &GrayImage, kernel: [i32; 9]) -> Vec<i16> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let raw = image.as_raw();
    let mut result = vec![0i16; (width * height) as usize];

    result
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            if y < 1 || y >= height - 1 {
                return;
            }
            for x in 1..width - 1 {
                let mut sum = 0i32;
                for ky in 0..3 {
                    for kx in 0..3 {
                        let val = raw[((y + ky - 1) * width + (x + kx - 1)) as usize] as i32;
                        sum += val * kernel[(ky * 3 + kx) as usize];
                    }
                }
                row[x as usize] = sum.clamp(-32768, 32767) as i16;
            }
        });

    result
}
