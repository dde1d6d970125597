//! Panorama detection and stitching.
//!
//! # Modules
//!
//! - **loader**: decoding, previews, thumbnails and optional features
//! - **matching**: ratio-tested, homography-verified pairwise matches
//! - **grouping**: connected components of good matches as [`Pano`]s
//! - **stitcher**: camera estimation, warping, exposure, seams, blending
//! - **auto_crop**: largest fully-valid rectangle of a validity mask
//! - **inpaint**: hole filling outside the validity mask
//!
//! # Example
//!
//! ```no_run
//! # use pano_photo::{find_panos, Match};
//! let matches: Vec<Match> = Vec::new();
//! let panos = find_panos(&matches, 70, 0.0);
//! assert!(panos.is_empty());
//! ```

pub mod auto_crop;
pub mod grouping;
pub mod inpaint;
pub mod loader;
pub mod matching;
pub mod options;
pub mod stitcher;
pub mod synthetic;

pub use auto_crop::find_largest_crop;
pub use grouping::{duplicate_pairs, find_panos, single_pano, Pano};
pub use inpaint::inpaint;
pub use loader::{pano_name, Image};
pub use matching::{match_images, neighbor_pairs, num_neighbor_pairs, Match};
pub use options::*;
pub use stitcher::{stitch, CameraParams, Cameras, StitchContext, StitchResult, StitchStatus};

pub type Result<T> = std::result::Result<T, PhotoError>;

#[derive(Debug, thiserror::Error)]
pub enum PhotoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] ::image::ImageError),

    #[error("Image processing error: {0}")]
    Imgproc(#[from] pano_imgproc::ImgprocError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
