//! Asynchronous panorama pipeline: loading, stitching, export and
//! inpainting requests on a cancellable worker pool.

pub mod config;
pub mod export;
#[cfg(feature = "metadata")]
pub mod metadata;
pub mod options;
pub mod paths;
pub mod stitcher_pipeline;

pub use config::{load_options, save_options, OptionsLoad};
pub use export::{crop_image, encode_image, write_image};
pub use options::*;
pub use paths::{filter_supported, is_supported_extension, supports_metadata};
pub use stitcher_pipeline::{
    ExportResult, InpaintingResult, StitcherData, StitcherPipeline, StitchingResult, Task,
};

use pano_runtime::TaskError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Photo error: {0}")]
    Photo(#[from] pano_photo::PhotoError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] pano_runtime::Error),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Task(TaskError::Cancelled | TaskError::Purged))
    }
}
