//! Core types shared by the panorama crates: keypoints and binary
//! descriptors, a generic RANSAC engine, the disjoint set used to group
//! images, and crop rectangles.

pub mod descriptor;
pub mod disjoint_set;
pub mod keypoint;
pub mod rect;
pub mod robust;
pub mod runtime;

pub use descriptor::*;
pub use disjoint_set::DisjointSet;
pub use keypoint::*;
pub use rect::*;
pub use robust::{Ransac, RobustConfig, RobustModel, RobustResult};
pub use runtime::{current_cpu_threads, init_global_thread_pool};

pub use image::{GrayImage, RgbImage};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
