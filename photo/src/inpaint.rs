//! Hole filling for pixels outside a pano's validity mask.
//!
//! Holes are filled in fast-marching order from the known border inwards,
//! each pixel taking a weighted mean of the known pixels around it.
//! Navier-Stokes mode then relaxes the filled pixels towards a harmonic
//! solution. Only holes inside the bounding box of the valid pixels are
//! touched.

use crate::options::{InpaintingMethod, InpaintingOptions};
use crate::{PhotoError, Result};
use image::{GrayImage, RgbImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const DIFFUSION_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

/// Min-heap entry ordered by arrival time.
#[derive(Debug, Clone, Copy)]
struct Front {
    t: f32,
    idx: usize,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.t == other.t && self.idx == other.idx
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other.t.total_cmp(&self.t).then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Working window of the image: the bounding box of the valid pixels.
struct Window {
    x0: u32,
    y0: u32,
    w: usize,
    h: usize,
}

impl Window {
    fn of(mask: &GrayImage) -> Option<Self> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in mask.enumerate_pixels() {
            if p[0] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        let (x0, y0, x1, y1) = bounds?;
        Some(Self {
            x0,
            y0,
            w: (x1 - x0 + 1) as usize,
            h: (y1 - y0 + 1) as usize,
        })
    }

    fn neighbours(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let (x, y) = ((idx % self.w) as i64, (idx / self.w) as i64);
        [(-1, 0), (1, 0), (0, -1), (0, 1)]
            .into_iter()
            .map(move |(dx, dy)| (x + dx, y + dy))
            .filter(|&(nx, ny)| nx >= 0 && ny >= 0 && nx < self.w as i64 && ny < self.h as i64)
            .map(|(nx, ny)| ny as usize * self.w + nx as usize)
    }
}

/// Fills the pixels of `image` where `mask` is zero. Returns the filled
/// image and the number of pixels filled.
pub fn inpaint(image: &RgbImage, mask: &GrayImage, options: &InpaintingOptions) -> Result<(RgbImage, usize)> {
    if image.dimensions() != mask.dimensions() {
        return Err(PhotoError::InvalidInput(format!(
            "mask {:?} does not match image {:?}",
            mask.dimensions(),
            image.dimensions()
        )));
    }
    let Some(window) = Window::of(mask) else {
        return Ok((image.clone(), 0));
    };

    let n = window.w * window.h;
    let mut colours = vec![[0.0f32; 3]; n];
    let mut state = vec![State::Inside; n];
    let mut times = vec![f32::INFINITY; n];
    for idx in 0..n {
        let (x, y) = (window.x0 + (idx % window.w) as u32, window.y0 + (idx / window.w) as u32);
        if mask.get_pixel(x, y)[0] > 0 {
            let p = image.get_pixel(x, y);
            colours[idx] = [p[0] as f32, p[1] as f32, p[2] as f32];
            state[idx] = State::Known;
            times[idx] = 0.0;
        }
    }

    let holes: Vec<usize> = (0..n).filter(|&i| state[i] == State::Inside).collect();
    if holes.is_empty() {
        return Ok((image.clone(), 0));
    }

    let mut heap = BinaryHeap::new();
    for &idx in &holes {
        if window.neighbours(idx).any(|q| state[q] == State::Known) {
            state[idx] = State::Band;
            times[idx] = 1.0;
            heap.push(Front { t: 1.0, idx });
        }
    }

    let radius = options.radius.max(1) as i64;
    while let Some(Front { idx, .. }) = heap.pop() {
        if state[idx] == State::Known {
            continue;
        }
        colours[idx] = weighted_mean(&window, &colours, &state, &times, idx, radius);
        state[idx] = State::Known;

        for q in window.neighbours(idx) {
            if state[q] == State::Known {
                continue;
            }
            let t = arrival_time(&window, &state, &times, q);
            if t < times[q] {
                times[q] = t;
                state[q] = State::Band;
                heap.push(Front { t, idx: q });
            }
        }
    }

    if options.method == InpaintingMethod::NavierStokes {
        diffuse(&window, &mut colours, &holes);
    }

    let mut out = image.clone();
    for &idx in &holes {
        let (x, y) = (window.x0 + (idx % window.w) as u32, window.y0 + (idx / window.w) as u32);
        let c = colours[idx];
        out.put_pixel(x, y, image::Rgb(c.map(|v| v.round().clamp(0.0, 255.0) as u8)));
    }
    tracing::debug!(filled = holes.len(), method = ?options.method, "inpainted holes");
    Ok((out, holes.len()))
}

/// Eikonal update from the known 4-neighbours of `idx`.
fn arrival_time(window: &Window, state: &[State], times: &[f32], idx: usize) -> f32 {
    let (x, y) = (idx % window.w, idx / window.w);
    let known = |i: usize| if state[i] == State::Known { times[i] } else { f32::INFINITY };
    let mut a = f32::INFINITY;
    if x > 0 {
        a = a.min(known(idx - 1));
    }
    if x + 1 < window.w {
        a = a.min(known(idx + 1));
    }
    let mut b = f32::INFINITY;
    if y > 0 {
        b = b.min(known(idx - window.w));
    }
    if y + 1 < window.h {
        b = b.min(known(idx + window.w));
    }

    if a.is_finite() && b.is_finite() && (a - b).abs() < 1.0 {
        let d = a - b;
        (a + b + (2.0 - d * d).sqrt()) * 0.5
    } else {
        a.min(b) + 1.0
    }
}

fn weighted_mean(
    window: &Window,
    colours: &[[f32; 3]],
    state: &[State],
    times: &[f32],
    idx: usize,
    radius: i64,
) -> [f32; 3] {
    let (x, y) = ((idx % window.w) as i64, (idx / window.w) as i64);
    let t_at = |xx: i64, yy: i64| -> Option<f32> {
        if xx < 0 || yy < 0 || xx >= window.w as i64 || yy >= window.h as i64 {
            return None;
        }
        let i = yy as usize * window.w + xx as usize;
        (state[i] == State::Known).then_some(times[i])
    };
    let t_p = times[idx];
    let grad = |lo: Option<f32>, hi: Option<f32>| match (lo, hi) {
        (Some(l), Some(h)) => (h - l) * 0.5,
        (Some(l), None) => t_p - l,
        (None, Some(h)) => h - t_p,
        (None, None) => 0.0,
    };
    let gx = grad(t_at(x - 1, y), t_at(x + 1, y));
    let gy = grad(t_at(x, y - 1), t_at(x, y + 1));
    let gnorm = (gx * gx + gy * gy).sqrt();

    let mut sum = [0.0f32; 3];
    let mut total = 0.0f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius || (dx == 0 && dy == 0) {
                continue;
            }
            let Some(t_q) = t_at(x + dx, y + dy) else {
                continue;
            };
            let (rx, ry) = (-dx as f32, -dy as f32);
            let d2 = rx * rx + ry * ry;
            let dir = if gnorm > 0.0 {
                ((rx * gx + ry * gy) / (d2.sqrt() * gnorm)).abs().max(1e-3)
            } else {
                1.0
            };
            let dst = 1.0 / d2;
            let lev = 1.0 / (1.0 + (t_q - t_p).abs());
            let weight = dir * dst * lev;

            let q = &colours[(y + dy) as usize * window.w + (x + dx) as usize];
            for c in 0..3 {
                sum[c] += weight * q[c];
            }
            total += weight;
        }
    }

    if total > 0.0 {
        sum.map(|v| v / total)
    } else {
        // The band always touches a known pixel, so this only guards rounding.
        window
            .neighbours(idx)
            .find(|&q| state[q] == State::Known)
            .map_or([0.0; 3], |q| colours[q])
    }
}

/// Jacobi relaxation of the filled pixels towards the mean of their
/// neighbours, holding the known pixels fixed.
fn diffuse(window: &Window, colours: &mut [[f32; 3]], holes: &[usize]) {
    for _ in 0..DIFFUSION_ITERATIONS {
        let next: Vec<[f32; 3]> = holes
            .iter()
            .map(|&idx| {
                let mut sum = [0.0f32; 3];
                let mut count = 0.0f32;
                for q in window.neighbours(idx) {
                    for c in 0..3 {
                        sum[c] += colours[q][c];
                    }
                    count += 1.0;
                }
                sum.map(|v| v / count.max(1.0))
            })
            .collect();
        for (&idx, c) in holes.iter().zip(next) {
            colours[idx] = c;
        }
    }
}
