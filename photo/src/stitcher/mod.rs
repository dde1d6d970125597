//! Stitch engine: registration, warping, exposure, seams and blending.
//!
//! [`stitch`] runs the stages in order and stops at the first failure,
//! reporting a [`StitchStatus`] rather than an error. Cameras estimated by
//! a successful run can be handed back in to skip registration.

pub mod blenders;
pub mod bundle;
pub mod camera;
pub mod exposure;
pub mod pairwise;
pub mod seams;
pub mod warpers;
pub mod wave;

use crate::options::{BlenderType, ExposureCompensator, SeamFinder, StitchAlgorithmOptions, WaveCorrection};
use blenders::BlendFeed;
use image::{GrayImage, Luma, RgbImage};
use nalgebra::Matrix3;
use pano_imgproc::{create_morph_kernel, dilate, mask_and, resize, resize_rgb, scaled_size, Interpolation, MorphShape};
use pano_runtime::{Executor, ProgressMonitor, ProgressType};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use warpers::{CameraWarper, Projector, Roi, Warped};
use wave::WaveDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StitchStatus {
    Success,
    Cancelled,
    ErrNeedMoreImgs,
    ErrHomographyEstFail,
    ErrCameraParamsAdjustFail,
    ErrPanoTooLarge,
}

impl StitchStatus {
    pub fn is_success(&self) -> bool {
        *self == StitchStatus::Success
    }
}

/// Intrinsics and camera-to-world rotation of one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub focal: f64,
    pub aspect: f64,
    pub ppx: f64,
    pub ppy: f64,
    /// Row-major rotation.
    pub rotation: [[f64; 3]; 3],
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            focal: 1.0,
            aspect: 1.0,
            ppx: 0.0,
            ppy: 0.0,
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl CameraParams {
    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal,
            0.0,
            self.ppx,
            0.0,
            self.focal * self.aspect,
            self.ppy,
            0.0,
            0.0,
            1.0,
        )
    }

    pub fn r(&self) -> Matrix3<f64> {
        let m = &self.rotation;
        Matrix3::new(
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        )
    }

    pub fn set_r(&mut self, r: &Matrix3<f64>) {
        for (row, out) in self.rotation.iter_mut().enumerate() {
            for (col, v) in out.iter_mut().enumerate() {
                *v = r[(row, col)];
            }
        }
    }

    /// The same camera for the image resized by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            focal: self.focal * factor,
            ppx: self.ppx * factor,
            ppy: self.ppy * factor,
            ..self.clone()
        }
    }
}

/// Registration of one stitch, cached on the pano for re-stitching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cameras {
    pub cameras: Vec<CameraParams>,
    /// Positions of the registered images within the stitched image list.
    pub indices: Vec<usize>,
    pub warp_scale: f64,
    pub work_scale: f64,
    /// Registration size of the first registered image.
    pub work_size: (u32, u32),
    /// Result was produced sideways and is rotated back.
    pub rotate_result: bool,
}

impl Cameras {
    /// Whether these cameras describe `images`, at any resolution.
    pub fn is_compatible(&self, images: &[RgbImage]) -> bool {
        let Some(&first) = self.indices.first() else {
            return false;
        };
        if self.cameras.len() != self.indices.len() || self.indices.iter().any(|&i| i >= images.len()) {
            return false;
        }
        let (w, h) = images[first].dimensions();
        let (ww, wh) = self.work_size;
        if w == 0 || h == 0 || ww == 0 || wh == 0 {
            return false;
        }
        let aspect = w as f64 / h as f64;
        let work_aspect = ww as f64 / wh as f64;
        (aspect - work_aspect).abs() < 0.02 * aspect.max(work_aspect)
    }
}

#[derive(Debug, Clone)]
pub struct StitchResult {
    pub status: StitchStatus,
    pub pano: Option<RgbImage>,
    /// Non-zero where some image covers the pano.
    pub mask: Option<GrayImage>,
    pub cameras: Option<Cameras>,
}

impl StitchResult {
    fn failed(status: StitchStatus) -> Self {
        Self {
            status,
            pano: None,
            mask: None,
            cameras: None,
        }
    }
}

/// Where a stitch reports progress and runs run-to-completion blending.
#[derive(Clone, Copy)]
pub struct StitchContext<'a> {
    pub progress: &'a ProgressMonitor,
    pub blend_pool: Option<&'a Executor>,
}

impl<'a> StitchContext<'a> {
    pub fn new(progress: &'a ProgressMonitor) -> Self {
        Self {
            progress,
            blend_pool: None,
        }
    }

    pub fn with_blend_pool(mut self, pool: &'a Executor) -> Self {
        self.blend_pool = Some(pool);
        self
    }
}

/// Scale bounding the first image's area to `megapixels`, never enlarging.
fn resolution_scale(image: &RgbImage, megapixels: f64) -> f64 {
    let area = image.width() as f64 * image.height() as f64;
    if area <= 0.0 || megapixels <= 0.0 {
        return 1.0;
    }
    (megapixels * 1e6 / area).sqrt().min(1.0)
}

/// Stitches `images` into one pano. With compatible `cameras` the
/// registration stages are skipped.
pub fn stitch(
    images: &[RgbImage],
    cameras: Option<&Cameras>,
    options: &StitchAlgorithmOptions,
    ctx: &StitchContext,
) -> StitchResult {
    if images.len() < 2 {
        return StitchResult::failed(StitchStatus::ErrNeedMoreImgs);
    }

    let cameras = match cameras.filter(|c| c.is_compatible(images)) {
        Some(cached) => {
            tracing::debug!(images = cached.indices.len(), "reusing cached cameras");
            cached.clone()
        }
        None => match estimate(images, options, ctx.progress) {
            Ok(estimated) => estimated,
            Err(status) => {
                tracing::info!(?status, "registration stopped");
                return StitchResult::failed(status);
            }
        },
    };

    compose(images, cameras, options, ctx)
}

fn estimate(
    images: &[RgbImage],
    options: &StitchAlgorithmOptions,
    progress: &ProgressMonitor,
) -> Result<Cameras, StitchStatus> {
    let work_scale = resolution_scale(&images[0], options.registration_resolution);
    let features = pairwise::find_features(images, work_scale, options, progress).ok_or(StitchStatus::Cancelled)?;
    let matches = pairwise::match_all(&features, options, progress).ok_or(StitchStatus::Cancelled)?;

    let component = pairwise::largest_component(images.len(), &matches, options.conf_threshold);
    if component.len() < 2 {
        return Err(StitchStatus::ErrNeedMoreImgs);
    }
    if component.len() < images.len() {
        tracing::info!(kept = component.len(), total = images.len(), "dropping unconnected images");
    }
    let pairs = pairwise::component_pairs(&matches, &component, options.conf_threshold);
    let sizes: Vec<(u32, u32)> = component.iter().map(|&i| features[i].size).collect();

    progress.reset(ProgressType::StitchEstimateHomography, 1);
    let (mut cams, reference) = camera::estimate_cameras(&sizes, &pairs).ok_or(StitchStatus::ErrHomographyEstFail)?;
    progress.notify_task_done();

    bundle::adjust(&mut cams, &pairs, reference, options.bundle_max_iterations, progress)?;

    let direction = match options.wave_correction {
        WaveCorrection::Off => None,
        WaveCorrection::Horizontal => Some(WaveDirection::Horizontal),
        WaveCorrection::Vertical => Some(WaveDirection::Vertical),
        WaveCorrection::Auto => Some(wave::detect_wave_direction(&cams)),
    };
    if let Some(direction) = direction {
        wave::wave_correct(&mut cams, direction);
    }

    let mut focals: Vec<f64> = cams.iter().map(|c| c.focal).collect();
    let warp_scale = camera::median(&mut focals);
    tracing::debug!(warp_scale, ?direction, "cameras estimated");

    Ok(Cameras {
        cameras: cams,
        warp_scale,
        work_scale,
        work_size: sizes[0],
        rotate_result: direction == Some(WaveDirection::Vertical),
        indices: component,
    })
}

fn warper_for(camera: &CameraParams, projector: Projector) -> Option<CameraWarper> {
    CameraWarper::new(projector, &camera.k(), &camera.r())
}

fn compose(
    images: &[RgbImage],
    cameras: Cameras,
    options: &StitchAlgorithmOptions,
    ctx: &StitchContext,
) -> StitchResult {
    let progress = ctx.progress;
    let first = &images[cameras.indices[0]];
    let compose_scale = first.width() as f64 / cameras.work_size.0 as f64;
    let seam_scale = resolution_scale(first, options.seam_resolution);
    let selected: Vec<&RgbImage> = cameras.indices.iter().map(|&i| &images[i]).collect();
    let n = selected.len();

    // Seam estimation images.
    progress.reset(ProgressType::StitchSeamsPrepare, n);
    let seam_projector = Projector::new(
        options.projection,
        cameras.warp_scale * compose_scale * seam_scale,
        options.projection_params,
    );
    let mut seam_warped = Vec::with_capacity(n);
    for (img, cam) in selected.iter().zip(&cameras.cameras) {
        if progress.is_cancelled() {
            return StitchResult::failed(StitchStatus::Cancelled);
        }
        let (w, h) = scaled_size(img.width(), img.height(), seam_scale);
        let small = resize_rgb(img, w, h, Interpolation::Area);
        let scale = compose_scale * w as f64 / img.width() as f64;
        let Some(warper) = warper_for(&cam.scaled(scale), seam_projector) else {
            return StitchResult::failed(StitchStatus::ErrCameraParamsAdjustFail);
        };
        let Some(roi) = warper.roi(w, h) else {
            return StitchResult::failed(StitchStatus::ErrCameraParamsAdjustFail);
        };
        seam_warped.push(warper.warp(&small, &roi));
        progress.notify_task_done();
    }

    let gains = match options.exposure {
        ExposureCompensator::Gain => exposure::gains(&seam_warped),
        ExposureCompensator::None => vec![1.0; n],
    };

    progress.reset(ProgressType::StitchSeamsFind, 1);
    let seam_masks: Vec<GrayImage> = match options.seam {
        SeamFinder::Voronoi => seams::voronoi_seams(&seam_warped),
        SeamFinder::None => seam_warped.iter().map(|w| w.mask.clone()).collect(),
    };
    drop(seam_warped);
    progress.notify_task_done();
    if progress.is_cancelled() {
        return StitchResult::failed(StitchStatus::Cancelled);
    }

    // Full-resolution compose.
    progress.reset(ProgressType::StitchCompose, n);
    let projector = Projector::new(options.projection, cameras.warp_scale * compose_scale, options.projection_params);
    let mut warpers = Vec::with_capacity(n);
    let mut canvas: Option<Roi> = None;
    for (img, cam) in selected.iter().zip(&cameras.cameras) {
        let roi = warper_for(&cam.scaled(compose_scale), projector)
            .and_then(|warper| warper.roi(img.width(), img.height()).map(|roi| (warper, roi)));
        let Some((warper, roi)) = roi else {
            return StitchResult::failed(StitchStatus::ErrCameraParamsAdjustFail);
        };
        canvas = Some(canvas.map_or(roi, |c| c.union(&roi)));
        warpers.push((warper, roi));
    }
    let Some(canvas) = canvas else {
        return StitchResult::failed(StitchStatus::ErrNeedMoreImgs);
    };
    if canvas.width > options.max_pano_size || canvas.height > options.max_pano_size {
        tracing::warn!(width = canvas.width, height = canvas.height, "pano exceeds maximum size");
        return StitchResult::failed(StitchStatus::ErrPanoTooLarge);
    }

    let dilate_kernel = create_morph_kernel(MorphShape::Rectangle, 3, 3);
    let mut composed: Vec<(Warped, GrayImage)> = Vec::with_capacity(n);
    for (((warper, roi), img), (seam, gain)) in warpers.iter().zip(&selected).zip(seam_masks.iter().zip(&gains)) {
        if progress.is_cancelled() {
            return StitchResult::failed(StitchStatus::Cancelled);
        }
        let mut warped = warper.warp(img, roi);
        if (*gain - 1.0).abs() > 1e-6 {
            exposure::apply_gain(&mut warped.image, *gain);
        }
        let seam = dilate(seam, &dilate_kernel, 1);
        let seam = resize(&seam, roi.width, roi.height, Interpolation::Linear);
        let seam = mask_and(&seam, &warped.mask);
        composed.push((warped, seam));
        progress.notify_task_done();
    }

    progress.reset(ProgressType::StitchBlend, n);
    let feeds: Vec<BlendFeed> = composed
        .iter()
        .map(|(w, seam)| BlendFeed {
            corner: w.corner,
            image: &w.image,
            coverage: &w.mask,
            seam,
        })
        .collect();

    let blended = match options.blender {
        BlenderType::MultiBand => {
            let bands = blenders::num_bands(&canvas, options.blend_strength);
            blenders::multi_band(&feeds, &canvas, bands, None, Some(progress))
        }
        BlenderType::Multiblend => {
            let width = ((canvas.width as f64 * canvas.height as f64).sqrt() * options.blend_strength / 100.0) as f32;
            let bands = blenders::auto_bands(&canvas);
            let run = || blenders::multi_band(&feeds, &canvas, bands, Some(width.max(1.0)), None);
            match ctx.blend_pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        }
    };
    let Some(mut pano) = blended else {
        return StitchResult::failed(StitchStatus::Cancelled);
    };
    if progress.is_cancelled() {
        return StitchResult::failed(StitchStatus::Cancelled);
    }

    let mut mask = coverage_mask(&composed, &canvas);
    pano.par_chunks_mut(3)
        .zip(mask.as_raw().par_iter())
        .for_each(|(p, &m)| {
            if m == 0 {
                p.fill(0);
            }
        });

    if cameras.rotate_result {
        pano = image::imageops::rotate90(&pano);
        mask = image::imageops::rotate90(&mask);
    }

    tracing::info!(width = pano.width(), height = pano.height(), images = n, "stitched pano");
    StitchResult {
        status: StitchStatus::Success,
        pano: Some(pano),
        mask: Some(mask),
        cameras: Some(cameras),
    }
}

fn coverage_mask(composed: &[(Warped, GrayImage)], canvas: &Roi) -> GrayImage {
    let mut mask = GrayImage::new(canvas.width, canvas.height);
    for (warped, _) in composed {
        let ox = (warped.corner.0 - canvas.x) as u32;
        let oy = (warped.corner.1 - canvas.y) as u32;
        for (x, y, p) in warped.mask.enumerate_pixels() {
            if p[0] > 0 {
                mask.put_pixel(ox + x, oy + y, Luma([255]));
            }
        }
    }
    mask
}
