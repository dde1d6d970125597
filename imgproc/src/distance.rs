use image::GrayImage;

/// Chamfer (3-4) distance, in pixels, from every non-zero pixel to the
/// nearest zero pixel or to the raster border. Zero pixels get 0.
pub fn distance_transform(mask: &GrayImage) -> Vec<f32> {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    let raw = mask.as_raw();
    const A: f32 = 1.0;
    const B: f32 = 1.4;

    // Pixels outside the raster count as background.
    let mut dist: Vec<f32> = raw.iter().map(|&v| if v > 0 { f32::MAX } else { 0.0 }).collect();
    let get = |dist: &[f32], x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            dist[y as usize * w + x as usize]
        }
    };

    for y in 0..h as isize {
        for x in 0..w as isize {
            let idx = y as usize * w + x as usize;
            if dist[idx] == 0.0 {
                continue;
            }
            let d = (get(&dist, x - 1, y) + A)
                .min(get(&dist, x, y - 1) + A)
                .min(get(&dist, x - 1, y - 1) + B)
                .min(get(&dist, x + 1, y - 1) + B);
            dist[idx] = dist[idx].min(d);
        }
    }
    for y in (0..h as isize).rev() {
        for x in (0..w as isize).rev() {
            let idx = y as usize * w + x as usize;
            if dist[idx] == 0.0 {
                continue;
            }
            let d = (get(&dist, x + 1, y) + A)
                .min(get(&dist, x, y + 1) + A)
                .min(get(&dist, x + 1, y + 1) + B)
                .min(get(&dist, x - 1, y + 1) + B);
            dist[idx] = dist[idx].min(d);
        }
    }
    dist
}
