//! Encoding and writing of finished panos.

use crate::options::CompressionOptions;
use crate::{PipelineError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage};
use pano_core::RatioRect;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// `image` restricted to `crop`, or the whole image for a full or empty crop.
pub fn crop_image(image: &RgbImage, crop: &RatioRect) -> RgbImage {
    if crop.is_full() {
        return image.clone();
    }
    match crop.to_crop(image.width(), image.height()) {
        Some(rect) => {
            image::imageops::crop_imm(image, rect.start.0, rect.start.1, rect.width(), rect.height()).to_image()
        }
        None => image.clone(),
    }
}

fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encodes `image` in the format implied by `path`'s extension.
pub fn encode_image(image: &RgbImage, path: &Path, compression: &CompressionOptions) -> Result<Vec<u8>> {
    let format = ImageFormat::from_path(path)?;
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            if compression.jpeg_progressive || compression.jpeg_optimize {
                tracing::debug!("progressive and optimized JPEG are not supported by the encoder");
            }
            tracing::trace!(subsampling = compression.jpeg_subsampling.label(), "encoding JPEG");
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, compression.jpeg_quality.clamp(1, 100));
            encoder.encode_image(image)?;
        }
        ImageFormat::Png => {
            let level = png_compression(compression.png_compression);
            let encoder = PngEncoder::new_with_quality(&mut bytes, level, FilterType::Adaptive);
            encoder.write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)?;
        }
        ImageFormat::Tiff | ImageFormat::Bmp => {
            image.write_to(&mut Cursor::new(&mut bytes), format)?;
        }
        other => {
            return Err(PipelineError::InvalidInput(format!("unsupported export format {other:?}")));
        }
    }
    Ok(bytes)
}

/// Encodes and writes `image` to `path`, copying the EXIF data of
/// `metadata_source` when given. Metadata failures are logged only.
pub fn write_image(
    image: &RgbImage,
    path: &Path,
    compression: &CompressionOptions,
    metadata_source: Option<&Path>,
) -> Result<PathBuf> {
    #[allow(unused_mut)]
    let mut bytes = encode_image(image, path, compression)?;

    #[cfg(feature = "metadata")]
    if let Some(source) = metadata_source {
        if let Err(e) = crate::metadata::copy_exif(source, path, image.dimensions(), &mut bytes) {
            tracing::warn!(from = %source.display(), to = %path.display(), error = %e, "could not copy metadata");
        }
    }
    #[cfg(not(feature = "metadata"))]
    let _ = metadata_source;

    std::fs::write(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "exported pano");
    Ok(path.to_path_buf())
}
