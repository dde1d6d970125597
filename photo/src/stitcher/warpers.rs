//! Projection of camera rays onto the composite surface.
//!
//! Pano coordinates are `scale` times the surface coordinates of a ray in
//! the world frame. Each projection is an invertible pair: `forward` takes a
//! world ray to pano coordinates, `backward` inverts it.

use crate::options::ProjectionType;
use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Vector3};
use pano_imgproc::remap_rgb_with_mask;
use rayon::prelude::*;
use std::f64::consts::{FRAC_PI_2, PI};

const EPS: f64 = 1e-9;

/// Integer pixel rectangle in pano coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn union(&self, other: &Roi) -> Roi {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Roi {
            x,
            y,
            width: (self.right().max(other.right()) - x as i64) as u32,
            height: (self.bottom().max(other.bottom()) - y as i64) as u32,
        }
    }

    pub fn intersection(&self, other: &Roi) -> Option<Roi> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        (r > x as i64 && b > y as i64).then(|| Roi {
            x,
            y,
            width: (r - x as i64) as u32,
            height: (b - y as i64) as u32,
        })
    }
}

/// An image warped onto the pano surface.
#[derive(Debug, Clone)]
pub struct Warped {
    pub corner: (i32, i32),
    pub image: RgbImage,
    pub mask: GrayImage,
}

impl Warped {
    pub fn roi(&self) -> Roi {
        Roi {
            x: self.corner.0,
            y: self.corner.1,
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Projector {
    kind: ProjectionType,
    scale: f64,
    a: f64,
    b: f64,
}

fn lon_lat(ray: &Vector3<f64>) -> Option<(f64, f64)> {
    let r = ray.norm();
    if r < EPS {
        return None;
    }
    Some((ray.x.atan2(ray.z), (ray.y / r).clamp(-1.0, 1.0).asin()))
}

fn from_lon_lat(lon: f64, lat: f64) -> Vector3<f64> {
    Vector3::new(lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos())
}

/// Polar angle from the optical axis and azimuth in the image plane.
fn polar(ray: &Vector3<f64>) -> Option<(f64, f64)> {
    let r = ray.norm();
    if r < EPS {
        return None;
    }
    Some(((ray.z / r).clamp(-1.0, 1.0).acos(), ray.y.atan2(ray.x)))
}

fn from_polar(theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
}

impl Projector {
    pub fn new(kind: ProjectionType, scale: f64, params: (f64, f64)) -> Self {
        Self {
            kind,
            scale,
            a: params.0,
            b: params.1,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn forward(&self, ray: &Vector3<f64>) -> Option<(f64, f64)> {
        let (u, v) = match self.kind {
            ProjectionType::Perspective => {
                if ray.z <= EPS {
                    return None;
                }
                (ray.x / ray.z, ray.y / ray.z)
            }
            ProjectionType::Cylindrical => {
                let h = (ray.x * ray.x + ray.z * ray.z).sqrt();
                if h < EPS {
                    return None;
                }
                (ray.x.atan2(ray.z), ray.y / h)
            }
            ProjectionType::Spherical => lon_lat(ray)?,
            ProjectionType::Fisheye => {
                let (theta, phi) = polar(ray)?;
                (theta * phi.cos(), theta * phi.sin())
            }
            ProjectionType::Stereographic => {
                let (theta, phi) = polar(ray)?;
                if theta > PI - 1e-3 {
                    return None;
                }
                let rho = 2.0 * (theta / 2.0).tan();
                (rho * phi.cos(), rho * phi.sin())
            }
            ProjectionType::CompressedRectilinear => {
                let (lon, lat) = lon_lat(ray)?;
                let c = (lon / self.b).cos();
                if (lon / self.a).abs() >= FRAC_PI_2 - 1e-3 || c <= EPS || lat.abs() >= FRAC_PI_2 - 1e-3 {
                    return None;
                }
                (self.a * (lon / self.a).tan(), self.b * lat.tan() / c)
            }
            ProjectionType::Panini => {
                let (lon, lat) = lon_lat(ray)?;
                let denom = self.a + lon.cos();
                if denom <= EPS || lat.abs() >= FRAC_PI_2 - 1e-3 {
                    return None;
                }
                let s = (self.a + 1.0) / denom;
                (s * lon.sin(), self.b * s * lat.tan())
            }
            ProjectionType::Mercator => {
                let (lon, lat) = lon_lat(ray)?;
                if lat.abs() >= FRAC_PI_2 - 1e-3 {
                    return None;
                }
                (lon, (PI / 4.0 + lat / 2.0).tan().ln())
            }
            ProjectionType::TransverseMercator => {
                let r = ray.norm();
                if r < EPS {
                    return None;
                }
                let b = ray.x / r;
                if b.abs() >= 1.0 - 1e-6 {
                    return None;
                }
                (b.atanh(), ray.y.atan2(ray.z))
            }
        };
        Some((self.scale * u, self.scale * v))
    }

    pub fn backward(&self, u: f64, v: f64) -> Option<Vector3<f64>> {
        let (u, v) = (u / self.scale, v / self.scale);
        let ray = match self.kind {
            ProjectionType::Perspective => Vector3::new(u, v, 1.0),
            ProjectionType::Cylindrical => {
                if u.abs() > PI {
                    return None;
                }
                Vector3::new(u.sin(), v, u.cos())
            }
            ProjectionType::Spherical => {
                if u.abs() > PI || v.abs() > FRAC_PI_2 {
                    return None;
                }
                from_lon_lat(u, v)
            }
            ProjectionType::Fisheye => {
                let theta = (u * u + v * v).sqrt();
                if theta > PI {
                    return None;
                }
                from_polar(theta, v.atan2(u))
            }
            ProjectionType::Stereographic => {
                let rho = (u * u + v * v).sqrt();
                from_polar(2.0 * (rho / 2.0).atan(), v.atan2(u))
            }
            ProjectionType::CompressedRectilinear => {
                let lon = self.a * (u / self.a).atan();
                let lat = (v * (lon / self.b).cos() / self.b).atan();
                from_lon_lat(lon, lat)
            }
            ProjectionType::Panini => {
                let d = self.a;
                let k = u * u / ((d + 1.0) * (d + 1.0));
                let disc = k * k * d * d - (k + 1.0) * (k * d * d - 1.0);
                if disc < 0.0 {
                    return None;
                }
                let cos_lon = (-k * d + disc.sqrt()) / (k + 1.0);
                let s = (d + 1.0) / (d + cos_lon);
                let lon = u.atan2(s * cos_lon);
                let lat = (v / (s * self.b)).atan();
                from_lon_lat(lon, lat)
            }
            ProjectionType::Mercator => {
                if u.abs() > PI {
                    return None;
                }
                from_lon_lat(u, v.sinh().atan())
            }
            ProjectionType::TransverseMercator => {
                let sech = 1.0 / u.cosh();
                Vector3::new(u.tanh(), sech * v.sin(), sech * v.cos())
            }
        };
        Some(ray)
    }
}

/// Maps image pixels to the pano for a camera with intrinsics `k` and
/// camera-to-world rotation `r`.
#[derive(Debug, Clone, Copy)]
pub struct CameraWarper {
    projector: Projector,
    r_kinv: Matrix3<f64>,
    k_rinv: Matrix3<f64>,
}

impl CameraWarper {
    pub fn new(projector: Projector, k: &Matrix3<f64>, r: &Matrix3<f64>) -> Option<Self> {
        let k_inv = k.try_inverse()?;
        Some(Self {
            projector,
            r_kinv: r * k_inv,
            k_rinv: k * r.transpose(),
        })
    }

    pub fn map_forward(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.projector.forward(&(self.r_kinv * Vector3::new(x, y, 1.0)))
    }

    pub fn map_backward(&self, u: f64, v: f64) -> Option<(f64, f64)> {
        let ray = self.projector.backward(u, v)?;
        let p = self.k_rinv * ray;
        if p.z <= EPS {
            return None;
        }
        Some((p.x / p.z, p.y / p.z))
    }

    /// Bounding box of the image border mapped onto the pano. `None` when
    /// no border pixel is visible.
    pub fn roi(&self, width: u32, height: u32) -> Option<Roi> {
        let (w, h) = (width as f64, height as f64);
        let border = (0..width)
            .flat_map(|x| [(x as f64, 0.0), (x as f64, h - 1.0)])
            .chain((0..height).flat_map(|y| [(0.0, y as f64), (w - 1.0, y as f64)]));

        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for (x, y) in border {
            let Some((u, v)) = self.map_forward(x, y) else {
                continue;
            };
            if !u.is_finite() || !v.is_finite() {
                continue;
            }
            bounds = Some(match bounds {
                None => (u, v, u, v),
                Some((u0, v0, u1, v1)) => (u0.min(u), v0.min(v), u1.max(u), v1.max(v)),
            });
        }

        let (u0, v0, u1, v1) = bounds?;
        // Border pixels landing on integer coordinates must not widen the box.
        let snap = |t: f64| if (t - t.round()).abs() < 1e-6 { t.round() } else { t };
        let (x0, y0) = (snap(u0).floor(), snap(v0).floor());
        let (x1, y1) = (snap(u1).ceil(), snap(v1).ceil());
        if x0 < i32::MIN as f64 || y0 < i32::MIN as f64 || x1 > i32::MAX as f64 || y1 > i32::MAX as f64 {
            return None;
        }
        Some(Roi {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32 + 1,
            height: (y1 - y0) as u32 + 1,
        })
    }

    /// Resamples `image` over `roi`; the mask marks pixels seen by the camera.
    pub fn warp(&self, image: &RgbImage, roi: &Roi) -> Warped {
        let (w, h) = (roi.width as usize, roi.height as usize);
        let mut map_x = vec![f32::NAN; w * h];
        let mut map_y = vec![f32::NAN; w * h];
        map_x
            .par_chunks_mut(w)
            .zip(map_y.par_chunks_mut(w))
            .enumerate()
            .for_each(|(y, (row_x, row_y))| {
                let v = (roi.y as i64 + y as i64) as f64;
                for x in 0..w {
                    let u = (roi.x as i64 + x as i64) as f64;
                    if let Some((sx, sy)) = self.map_backward(u, v) {
                        row_x[x] = sx as f32;
                        row_y[x] = sy as f32;
                    }
                }
            });

        let (warped, mask) = remap_rgb_with_mask(image, &map_x, &map_y, roi.width, roi.height);
        Warped {
            corner: (roi.x, roi.y),
            image: warped,
            mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use nalgebra::Rotation3;

    fn rays() -> Vec<Vector3<f64>> {
        let mut rays = Vec::new();
        for lon in [-0.6, -0.2, 0.0, 0.3, 0.7] {
            for lat in [-0.5, -0.1, 0.0, 0.25, 0.45] {
                rays.push(from_lon_lat(lon, lat));
            }
        }
        rays
    }

    #[test]
    fn every_projection_inverts() {
        for kind in ProjectionType::ALL {
            let p = Projector::new(kind, 400.0, (2.0, 1.0));
            for ray in rays() {
                let (u, v) = p.forward(&ray).unwrap_or_else(|| panic!("{kind:?} forward"));
                let back = p.backward(u, v).unwrap_or_else(|| panic!("{kind:?} backward"));
                let diff = (back.normalize() - ray).norm();
                assert!(diff < 1e-6, "{kind:?}: {diff}");
            }
        }
    }

    #[test]
    fn perspective_rejects_rays_behind_camera() {
        let p = Projector::new(ProjectionType::Perspective, 1.0, (0.0, 0.0));
        assert!(p.forward(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn identity_camera_roi_and_warp() {
        let k = Matrix3::new(100.0, 0.0, 32.0, 0.0, 100.0, 24.0, 0.0, 0.0, 1.0);
        let r = Matrix3::identity();
        let proj = Projector::new(ProjectionType::Perspective, 100.0, (0.0, 0.0));
        let warper = CameraWarper::new(proj, &k, &r).unwrap();

        let roi = warper.roi(64, 48).unwrap();
        assert_eq!((roi.x, roi.y, roi.width, roi.height), (-32, -24, 64, 48));

        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8 * 3, y as u8 * 5, 7]));
        let warped = warper.warp(&img, &roi);
        assert_eq!(warped.image.dimensions(), (64, 48));
        assert!(warped.mask.pixels().all(|p| p[0] == 255));
        assert_eq!(warped.image.get_pixel(10, 20), img.get_pixel(10, 20));
    }

    #[test]
    fn rotated_camera_shifts_roi() {
        let k = Matrix3::new(200.0, 0.0, 50.0, 0.0, 200.0, 50.0, 0.0, 0.0, 1.0);
        let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), 0.3).into_inner();
        let proj = Projector::new(ProjectionType::Spherical, 200.0, (0.0, 0.0));
        let centre = CameraWarper::new(proj, &k, &Matrix3::identity()).unwrap().roi(100, 100).unwrap();
        let turned = CameraWarper::new(proj, &k, &yaw).unwrap().roi(100, 100).unwrap();
        let shift = (turned.x - centre.x) as f64;
        assert!((shift - 60.0).abs() <= 2.0, "shift {shift}");
    }

    #[test]
    fn roi_union_and_intersection() {
        let a = Roi { x: 0, y: 0, width: 10, height: 10 };
        let b = Roi { x: 5, y: -5, width: 10, height: 10 };
        assert_eq!(a.union(&b), Roi { x: 0, y: -5, width: 15, height: 15 });
        assert_eq!(a.intersection(&b), Some(Roi { x: 5, y: 0, width: 5, height: 5 }));
        assert!(a.intersection(&Roi { x: 10, y: 0, width: 3, height: 3 }).is_none());
    }
}
