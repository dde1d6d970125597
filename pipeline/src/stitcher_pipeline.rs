//! Request orchestration on the worker pools.
//!
//! Every `run_*` call first cancels the request in flight: its monitor is
//! flagged, queued work of the primary pool is purged, and work already
//! running observes the flag and unwinds by itself. The blend pool is never
//! purged; blending there runs to completion and its output is ignored.

use crate::export::{crop_image, write_image};
use crate::options::{ExportOptions, MatchingOptions, MatchingType, PipelineConfig, StitchingOptions};
use crate::{PipelineError, Result};
use image::{GrayImage, RgbImage};
use pano_core::RatioRect;
use pano_photo::{
    find_largest_crop, find_panos, inpaint, match_images, neighbor_pairs, single_pano, stitch, Cameras, Image,
    InpaintingOptions, LoadingOptions, Match, Pano, StitchContext, StitchStatus,
};
use pano_runtime::{
    wait_all, Executor, ExecutorKind, ProgressMonitor, ProgressReport, ProgressType, TaskError, TaskHandle,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Images, matches and detected panos of one loading request.
#[derive(Debug, Clone, Default)]
pub struct StitcherData {
    pub images: Vec<Image>,
    pub matches: Vec<Match>,
    pub panos: Vec<Pano>,
}

impl StitcherData {
    /// Records a finished stitch on its pano. Cancelled and failed stitches
    /// leave the pano untouched.
    pub fn apply_stitch_result(&mut self, result: &StitchingResult) {
        if !result.status.is_success() {
            return;
        }
        let Some(pano) = self.panos.get_mut(result.pano_id) else {
            return;
        };
        if let Some(cameras) = &result.cameras {
            pano.cameras = Some(cameras.clone());
        }
        if pano.crop.is_none() {
            pano.crop = result.auto_crop;
        }
        if result.export_path.is_some() {
            pano.exported = true;
        }
    }
}

#[derive(Debug, Clone)]
pub struct StitchingResult {
    pub pano_id: usize,
    pub full_res: bool,
    pub status: StitchStatus,
    pub pano: Option<RgbImage>,
    pub mask: Option<GrayImage>,
    pub cameras: Option<Cameras>,
    /// Suggested crop, computed for full resolution stitches.
    pub auto_crop: Option<RatioRect>,
    pub export_path: Option<PathBuf>,
}

impl StitchingResult {
    fn failed(options: &StitchingOptions, status: StitchStatus) -> Self {
        Self {
            pano_id: options.pano_id,
            full_res: options.full_res,
            status,
            pano: None,
            mask: None,
            cameras: None,
            auto_crop: None,
            export_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub pano_id: usize,
    pub export_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InpaintingResult {
    pub pano: RgbImage,
    pub pixels_inpainted: usize,
}

/// A submitted request: its eventual result and its own progress.
pub struct Task<T> {
    handle: TaskHandle<Result<T>>,
    progress: Arc<ProgressMonitor>,
}

impl<T> Task<T> {
    pub fn progress(&self) -> &Arc<ProgressMonitor> {
        &self.progress
    }

    pub fn is_ready(&mut self) -> bool {
        self.handle.is_ready()
    }

    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        self.handle.wait_timeout(timeout)
    }

    /// Blocks for the result. A request cancelled before its result is
    /// taken resolves as cancelled, whatever it computed.
    pub fn get(self) -> Result<T> {
        let result = self.handle.get()?;
        if self.progress.is_cancelled() {
            return Err(cancelled());
        }
        result
    }
}

pub struct StitcherPipeline {
    config: PipelineConfig,
    pool: Arc<Executor>,
    blend_pool: Arc<Executor>,
    current: Mutex<Option<Arc<ProgressMonitor>>>,
}

impl StitcherPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let pool = Executor::new("pano-pipeline", config.num_threads.max(2), ExecutorKind::CancelSafe)?;
        let blend_pool = Executor::new("pano-blend", config.blend_threads.max(1), ExecutorKind::RunToCompletion)?;
        Ok(Self {
            config,
            pool: Arc::new(pool),
            blend_pool: Arc::new(blend_pool),
            current: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Progress of the request in flight.
    pub fn progress(&self) -> ProgressReport {
        self.current.lock().as_ref().map(|p| p.report()).unwrap_or_default()
    }

    /// Cancels the request in flight, if any.
    pub fn cancel(&self) {
        let Some(progress) = self.current.lock().take() else {
            return;
        };
        progress.cancel();
        progress.set_task_type(ProgressType::Cancelling);
        self.pool.purge();
        tracing::info!(load = self.pool.load(), "cancelled request in flight");
    }

    fn begin(&self) -> Arc<ProgressMonitor> {
        self.cancel();
        let progress = Arc::new(ProgressMonitor::new());
        *self.current.lock() = Some(Arc::clone(&progress));
        progress
    }

    fn submit<T, F>(&self, f: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<ProgressMonitor>) -> Result<T> + Send + 'static,
    {
        let progress = self.begin();
        let task_progress = Arc::clone(&progress);
        let handle = self.pool.submit(move || f(&task_progress));
        Task { handle, progress }
    }

    /// Loads `paths` and, unless `matching` says otherwise, matches
    /// neighbouring images and groups them into panos.
    pub fn run_loading(
        &self,
        paths: Vec<PathBuf>,
        loading: LoadingOptions,
        matching: MatchingOptions,
    ) -> Task<StitcherData> {
        let pool = Arc::clone(&self.pool);
        let poll = self.config.poll_timeout;
        self.submit(move |progress| {
            let loading = loading.with_compute_keypoints(matching.matching_type.needs_keypoints());
            let images = load_images(&pool, progress, paths, &loading, poll)?;
            match_and_group(&pool, progress, images, &matching, poll)
        })
    }

    /// Stitches pano `options.pano_id` of `data`.
    pub fn run_stitching(&self, data: Arc<StitcherData>, options: StitchingOptions) -> Task<StitchingResult> {
        let pool = Arc::clone(&self.pool);
        let blend_pool = Arc::clone(&self.blend_pool);
        let poll = self.config.poll_timeout;
        self.submit(move |progress| stitch_pano(&pool, &blend_pool, progress, &data, &options, poll))
    }

    /// Crops and writes an already stitched pano.
    pub fn run_export(&self, pano: RgbImage, options: ExportOptions) -> Task<ExportResult> {
        self.submit(move |progress| {
            progress.reset(ProgressType::Export, 1);
            let cropped = crop_image(&pano, &options.crop);
            let source = options.metadata_source.as_deref();
            let export_path = export(&cropped, &options.export_path, &options.compression, source);
            progress.notify_task_done();
            Ok(ExportResult {
                pano_id: options.pano_id,
                export_path,
            })
        })
    }

    /// Fills the pixels of `pano` outside `mask`.
    pub fn run_inpainting(
        &self,
        pano: RgbImage,
        mask: GrayImage,
        options: InpaintingOptions,
    ) -> Task<InpaintingResult> {
        self.submit(move |progress| {
            progress.reset(ProgressType::Inpainting, 1);
            let (pano, pixels_inpainted) = inpaint(&pano, &mask, &options)?;
            progress.notify_task_done();
            Ok(InpaintingResult { pano, pixels_inpainted })
        })
    }
}

impl Drop for StitcherPipeline {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn cancelled() -> PipelineError {
    TaskError::Cancelled.into()
}

fn load_images(
    pool: &Executor,
    progress: &Arc<ProgressMonitor>,
    paths: Vec<PathBuf>,
    options: &LoadingOptions,
    poll: Duration,
) -> Result<Vec<Image>> {
    let kind = if options.compute_keypoints {
        ProgressType::DetectingKeypoints
    } else {
        ProgressType::LoadingImages
    };
    progress.reset(kind, paths.len());

    let handles: Vec<TaskHandle<Option<Image>>> = paths
        .into_iter()
        .map(|path| {
            let progress = Arc::clone(progress);
            let options = options.clone();
            pool.submit(move || {
                if progress.is_cancelled() {
                    return None;
                }
                let image = Image::load(&path, &options);
                progress.notify_task_done();
                match image {
                    Ok(image) => Some(image),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load image");
                        None
                    }
                }
            })
        })
        .collect();

    let total = handles.len();
    let results = wait_all(handles, &progress.token(), poll)?;
    let images: Vec<Image> = results.into_iter().filter_map(|r| r.ok().flatten()).collect();
    if progress.is_cancelled() {
        return Err(cancelled());
    }
    if images.len() < total {
        tracing::warn!(failed = total - images.len(), "some images could not be loaded");
    }
    Ok(images)
}

fn match_and_group(
    pool: &Executor,
    progress: &Arc<ProgressMonitor>,
    images: Vec<Image>,
    options: &MatchingOptions,
    poll: Duration,
) -> Result<StitcherData> {
    if images.is_empty() {
        return Ok(StitcherData::default());
    }
    match options.matching_type {
        MatchingType::None => {
            return Ok(StitcherData {
                images,
                ..StitcherData::default()
            })
        }
        MatchingType::SinglePano => {
            let panos = vec![single_pano(images.len())];
            return Ok(StitcherData {
                images,
                matches: Vec::new(),
                panos,
            });
        }
        MatchingType::Auto => {}
    }

    let pairs = neighbor_pairs(images.len(), options.neighborhood_search_size);
    progress.reset(ProgressType::MatchingImages, pairs.len() + 1);

    let images = Arc::new(images);
    let handles: Vec<TaskHandle<Match>> = pairs
        .into_iter()
        .map(|(i, j)| {
            let (images, progress, options) = (Arc::clone(&images), Arc::clone(progress), options.clone());
            pool.submit(move || {
                if progress.is_cancelled() {
                    return Match::empty(i, j);
                }
                let m = match_images(i, j, &images[i], &images[j], &options);
                progress.notify_task_done();
                m
            })
        })
        .collect();

    let results = wait_all(handles, &progress.token(), poll)?;
    if progress.is_cancelled() {
        return Err(cancelled());
    }
    let matches: Vec<Match> = results.into_iter().collect::<std::result::Result<_, TaskError>>()?;
    let panos = find_panos(&matches, options.match_threshold, options.min_shift);
    progress.notify_task_done();

    let images = Arc::try_unwrap(images).unwrap_or_else(|shared| (*shared).clone());
    Ok(StitcherData { images, matches, panos })
}

fn stitch_pano(
    pool: &Executor,
    blend_pool: &Executor,
    progress: &Arc<ProgressMonitor>,
    data: &StitcherData,
    options: &StitchingOptions,
    poll: Duration,
) -> Result<StitchingResult> {
    let Some(pano) = data.panos.get(options.pano_id) else {
        return Err(PipelineError::InvalidInput(format!("no pano {}", options.pano_id)));
    };
    let members: Vec<&Image> = pano.ids().iter().filter_map(|&id| data.images.get(id)).collect();
    if members.len() < pano.len() {
        return Err(PipelineError::InvalidInput(format!("pano {} refers to missing images", options.pano_id)));
    }

    progress.reset(ProgressType::LoadingImages, members.len());

    let (images, reloaded_all) = if options.full_res {
        reload_full_res(pool, progress, &members, poll)?
    } else {
        let previews = members
            .iter()
            .map(|image| {
                progress.notify_task_done();
                image.preview().clone()
            })
            .collect();
        (previews, true)
    };

    progress.reset(ProgressType::StitchingPano, 1);
    let cameras = pano.cameras.as_ref().filter(|_| reloaded_all);
    let ctx = StitchContext::new(progress).with_blend_pool(blend_pool);
    let result = stitch(&images, cameras, &options.stitch, &ctx);
    if result.status == StitchStatus::Cancelled || progress.is_cancelled() {
        return Err(cancelled());
    }
    let (Some(composite), Some(mask)) = (result.pano, result.mask) else {
        tracing::info!(status = ?result.status, pano = options.pano_id, "stitch failed");
        return Ok(StitchingResult::failed(options, result.status));
    };

    let mut auto_crop = None;
    if options.full_res {
        progress.reset(ProgressType::AutoCrop, 1);
        auto_crop = find_largest_crop(&mask).map(|crop| RatioRect::from_crop(&crop, mask.width(), mask.height()));
        progress.notify_task_done();
        if progress.is_cancelled() {
            return Err(cancelled());
        }
    }

    let mut export_path = None;
    if let Some(path) = &options.export_path {
        progress.reset(ProgressType::Export, 1);
        let source = options
            .metadata
            .copy_from_first_image
            .then(|| members.first().map(|image| image.path()))
            .flatten();
        export_path = export(&composite, path, &options.compression, source);
        progress.notify_task_done();
        if progress.is_cancelled() {
            return Err(cancelled());
        }
    }

    Ok(StitchingResult {
        pano_id: options.pano_id,
        full_res: options.full_res,
        status: result.status,
        pano: Some(composite),
        mask: Some(mask),
        cameras: result.cameras,
        auto_crop,
        export_path,
    })
}

/// Decodes the full-resolution members in parallel. Members that fail to
/// decode are dropped; the flag tells whether all of them made it.
fn reload_full_res(
    pool: &Executor,
    progress: &Arc<ProgressMonitor>,
    members: &[&Image],
    poll: Duration,
) -> Result<(Vec<RgbImage>, bool)> {
    let handles: Vec<TaskHandle<Option<RgbImage>>> = members
        .iter()
        .map(|&image| {
            let (image, progress) = (image.clone(), Arc::clone(progress));
            pool.submit(move || {
                if progress.is_cancelled() {
                    return None;
                }
                let full = image.full_res();
                progress.notify_task_done();
                match full {
                    Ok(full) => Some(full),
                    Err(e) => {
                        tracing::warn!(path = %image.path().display(), error = %e, "failed to reload image");
                        None
                    }
                }
            })
        })
        .collect();

    let results = wait_all(handles, &progress.token(), poll)?;
    if progress.is_cancelled() {
        return Err(cancelled());
    }
    let images: Vec<RgbImage> = results.into_iter().filter_map(|r| r.ok().flatten()).collect();
    let complete = images.len() == members.len();
    Ok((images, complete))
}

fn export(
    image: &RgbImage,
    path: &Path,
    compression: &crate::options::CompressionOptions,
    metadata_source: Option<&Path>,
) -> Option<PathBuf> {
    match write_image(image, path, compression, metadata_source) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "export failed");
            None
        }
    }
}
