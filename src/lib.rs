//! Panorama detection and stitching.
//!
//! Re-exports the workspace crates under short names:
//!
//! - [`core`]: disjoint sets, crop rectangles, robust estimation, thread pool setup
//! - [`features`]: keypoints, descriptors, matching and homographies
//! - [`imgproc`]: resizing, remapping, pyramids, morphology
//! - [`runtime`]: executors, task handles and progress monitoring
//! - [`photo`]: image loading, pano detection, stitching, auto-crop, inpainting
//! - [`pipeline`]: the asynchronous request pipeline and export

pub use pano_core as core;
pub use pano_features as features;
pub use pano_imgproc as imgproc;
pub use pano_pipeline as pipeline;
pub use pano_photo as photo;
pub use pano_runtime as runtime;

/// Initialize the global Rayon thread pool used by CPU-parallel routines.
///
/// Call once at startup, before the first stitch. Repeated calls return the
/// first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `PANO_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    pano_core::init_global_thread_pool(num_threads)
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Returns `false` if a global subscriber was already set.
pub fn init_logging() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}
