//! Image processing primitives used by the stitcher: resizing, bilinear
//! remapping with validity masks, Gaussian and Laplacian pyramids on float
//! images, morphology and distance transforms.

pub mod color;
pub mod distance;
pub mod geometry;
pub mod morph;
pub mod pyramid;
pub mod resize;

pub use color::*;
pub use distance::*;
pub use geometry::*;
pub use morph::*;
pub use pyramid::*;
pub use resize::*;

pub type Result<T> = std::result::Result<T, ImgprocError>;

#[derive(Debug, thiserror::Error)]
pub enum ImgprocError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Rejects empty rasters before they reach the resampling code.
pub fn ensure_non_empty(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ImgprocError::DimensionMismatch(format!("empty {width}x{height} image")));
    }
    Ok(())
}
