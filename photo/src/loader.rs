//! Image loading: decoded buffers, previews, thumbnails and features.

use crate::options::LoadingOptions;
use crate::Result;
use image::{DynamicImage, RgbImage};
use pano_core::Descriptors;
use pano_features::FeatureDetector;
use pano_imgproc::{convert_rgb_to_gray, ensure_non_empty, fit_longer_side, resize_rgb, Interpolation};
use std::path::{Path, PathBuf};

/// A loaded input image.
///
/// Only the preview stays in memory; the full-resolution buffer is decoded
/// again by [`Image::full_res`] when a final render needs it.
#[derive(Debug, Clone)]
pub struct Image {
    path: PathBuf,
    full_size: (u32, u32),
    preview: RgbImage,
    thumbnail: RgbImage,
    descriptors: Option<Descriptors>,
    raw: bool,
}

/// Decodes `path`, coercing anything above 8 bits per channel to 8-bit RGB.
/// The flag tells whether such a conversion happened.
fn decode(path: &Path) -> Result<(RgbImage, bool)> {
    let decoded = image::open(path)?;
    ensure_non_empty(decoded.width(), decoded.height())?;
    let color = decoded.color();
    let high_bit_depth = color.bytes_per_pixel() > color.channel_count();
    if high_bit_depth {
        tracing::warn!(path = %path.display(), ?color, "high bit depth image converted to 8 bits");
    }
    Ok((to_rgb8(decoded), high_bit_depth))
}

fn to_rgb8(img: DynamicImage) -> RgbImage {
    match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    }
}

impl Image {
    pub fn load(path: impl AsRef<Path>, options: &LoadingOptions) -> Result<Self> {
        let path = path.as_ref();
        let (full, raw) = decode(path)?;
        Ok(Self::from_rgb(path, full, raw, options))
    }

    /// Builds an image from an already decoded buffer.
    pub fn from_rgb(path: impl Into<PathBuf>, full: RgbImage, raw: bool, options: &LoadingOptions) -> Self {
        let full_size = full.dimensions();
        let (pw, ph) = fit_longer_side(full_size.0, full_size.1, options.preview_longer_side);
        let preview = if (pw, ph) == full_size {
            full
        } else {
            resize_rgb(&full, pw, ph, Interpolation::Area)
        };
        let t = options.thumbnail_size.max(1);
        let thumbnail = resize_rgb(&preview, t, t, Interpolation::Area);

        let descriptors = options.compute_keypoints.then(|| {
            let detector = FeatureDetector::new(options.feature_type, options.num_features);
            detector.detect_and_compute(&convert_rgb_to_gray(&preview))
        });

        Self {
            path: path.into(),
            full_size,
            preview,
            thumbnail,
            descriptors,
            raw,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn full_size(&self) -> (u32, u32) {
        self.full_size
    }

    pub fn preview(&self) -> &RgbImage {
        &self.preview
    }

    pub fn thumbnail(&self) -> &RgbImage {
        &self.thumbnail
    }

    /// Ratio of preview to full-resolution width.
    pub fn preview_scale(&self) -> f64 {
        self.preview.width() as f64 / self.full_size.0.max(1) as f64
    }

    pub fn descriptors(&self) -> Option<&Descriptors> {
        self.descriptors.as_ref()
    }

    pub fn has_keypoints(&self) -> bool {
        self.descriptors.as_ref().is_some_and(|d| !d.is_empty())
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Decodes the source file again at full resolution.
    pub fn full_res(&self) -> Result<RgbImage> {
        if self.preview.dimensions() == self.full_size {
            return Ok(self.preview.clone());
        }
        let (full, _) = decode(&self.path)?;
        Ok(full)
    }

    /// Frees keypoints and descriptors once matching is done.
    pub fn release_features(&mut self) {
        self.descriptors = None;
    }
}

fn file_stem(image: &Image) -> String {
    image
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pano".to_string())
}

/// Output file name of a pano, `"{first}-{last}.jpg"` from the member file
/// stems. A single member gives `"{first}.jpg"`.
pub fn pano_name(ids: &[usize], images: &[Image]) -> String {
    let first = ids.first().and_then(|&i| images.get(i));
    let last = ids.last().and_then(|&i| images.get(i));
    match (first, last) {
        (Some(a), Some(b)) if ids.len() > 1 => format!("{}-{}.jpg", file_stem(a), file_stem(b)),
        (Some(a), _) => format!("{}.jpg", file_stem(a)),
        _ => "pano.jpg".to_string(),
    }
}
