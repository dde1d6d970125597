//! Pipeline-level options and the aggregate persisted [`Options`].

use pano_core::RatioRect;
pub use pano_photo::{
    InpaintingOptions, LoadingOptions, MatchingOptions, MatchingType, StitchAlgorithmOptions,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Version of the persisted [`Options`]; bump on any breaking change to
/// the option structs, including enum changes serde would still accept.
pub const OPTIONS_VERSION: u32 = 2;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;
pub const DEFAULT_PNG_COMPRESSION: u8 = 6;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    K444,
    #[default]
    K422,
    K420,
}

impl ChromaSubsampling {
    pub const ALL: [ChromaSubsampling; 3] = [ChromaSubsampling::K444, ChromaSubsampling::K422, ChromaSubsampling::K420];

    pub fn label(&self) -> &'static str {
        match self {
            ChromaSubsampling::K444 => "Off",
            ChromaSubsampling::K422 => "Half",
            ChromaSubsampling::K420 => "Quarter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub jpeg_quality: u8,
    pub jpeg_progressive: bool,
    pub jpeg_optimize: bool,
    pub jpeg_subsampling: ChromaSubsampling,
    /// 0 (fastest) to 9 (smallest).
    pub png_compression: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            jpeg_progressive: false,
            jpeg_optimize: false,
            jpeg_subsampling: ChromaSubsampling::default(),
            png_compression: DEFAULT_PNG_COMPRESSION,
        }
    }
}

impl CompressionOptions {
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_png_compression(mut self, level: u8) -> Self {
        self.png_compression = level.min(9);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataOptions {
    pub copy_from_first_image: bool,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            copy_from_first_image: cfg!(feature = "metadata"),
        }
    }
}

/// Everything the user can tune, persisted by [`crate::config`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub metadata: MetadataOptions,
    pub compression: CompressionOptions,
    pub loading: LoadingOptions,
    pub inpaint: InpaintingOptions,
    pub matching: MatchingOptions,
    pub stitch: StitchAlgorithmOptions,
}

/// One stitch request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StitchingOptions {
    pub pano_id: usize,
    /// Reload full-resolution images instead of stitching the previews.
    pub full_res: bool,
    pub export_path: Option<PathBuf>,
    pub compression: CompressionOptions,
    pub metadata: MetadataOptions,
    pub stitch: StitchAlgorithmOptions,
}

impl StitchingOptions {
    pub fn new(pano_id: usize) -> Self {
        Self {
            pano_id,
            ..Self::default()
        }
    }

    pub fn with_full_res(mut self, full_res: bool) -> Self {
        self.full_res = full_res;
        self
    }

    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    pub fn with_stitch(mut self, stitch: StitchAlgorithmOptions) -> Self {
        self.stitch = stitch;
        self
    }
}

/// One export request of an already stitched pano.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub pano_id: usize,
    pub export_path: PathBuf,
    pub compression: CompressionOptions,
    pub crop: RatioRect,
    /// Image whose EXIF data is copied into the export.
    pub metadata_source: Option<PathBuf>,
}

impl ExportOptions {
    pub fn new(pano_id: usize, export_path: impl Into<PathBuf>) -> Self {
        Self {
            pano_id,
            export_path: export_path.into(),
            compression: CompressionOptions::default(),
            crop: RatioRect::default(),
            metadata_source: None,
        }
    }

    pub fn with_crop(mut self, crop: RatioRect) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_metadata_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_source = Some(path.into());
        self
    }
}

/// Worker pools of a [`crate::StitcherPipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Threads of the cancellable pool, at least 2.
    pub num_threads: usize,
    /// Threads of the run-to-completion blend pool.
    pub blend_threads: usize,
    /// How often waiting requests check for cancellation.
    pub poll_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        Self {
            num_threads: threads.max(2),
            blend_threads: threads,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(2);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.compression.jpeg_quality, 95);
        assert_eq!(options.compression.png_compression, 6);
        assert_eq!(options.compression.jpeg_subsampling.label(), "Half");
        assert_eq!(options.matching.match_threshold, 70);
        assert_eq!(PipelineConfig::default().poll_timeout, Duration::from_millis(500));
        assert!(PipelineConfig::default().with_threads(1).num_threads >= 2);
    }

    #[test]
    fn compression_builders_clamp() {
        let c = CompressionOptions::default().with_jpeg_quality(0).with_png_compression(12);
        assert_eq!((c.jpeg_quality, c.png_compression), (1, 9));
    }
}
