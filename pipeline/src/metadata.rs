//! EXIF copy from a source photo into an encoded pano.

use crate::{PipelineError, Result};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const SOFTWARE: &str = concat!("panorama ", env!("CARGO_PKG_VERSION"));

fn file_type(path: &Path) -> Option<FileExtension> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(FileExtension::JPEG),
        "png" => Some(FileExtension::PNG { as_zTXt_chunk: true }),
        "tif" | "tiff" => Some(FileExtension::TIFF),
        _ => None,
    }
}

fn ascii(field: &exif::Field) -> String {
    match &field.value {
        exif::Value::Ascii(values) => values
            .iter()
            .map(|v| String::from_utf8_lossy(v).trim_matches(char::from(0)).to_string())
            .collect::<Vec<_>>()
            .join(" "),
        _ => field.display_value().to_string().replace('"', "").trim().to_string(),
    }
}

/// Tags copied verbatim from the source.
fn copied_tags(exif: &exif::Exif) -> Vec<ExifTag> {
    let mut tags = Vec::new();
    let mut copy = |tag: exif::Tag, make: fn(String) -> ExifTag| {
        if let Some(field) = exif.get_field(tag, exif::In::PRIMARY) {
            tags.push(make(ascii(field)));
        }
    };
    copy(exif::Tag::Make, ExifTag::Make);
    copy(exif::Tag::Model, ExifTag::Model);
    copy(exif::Tag::LensModel, ExifTag::LensModel);
    copy(exif::Tag::Artist, ExifTag::Artist);
    copy(exif::Tag::Copyright, ExifTag::Copyright);
    copy(exif::Tag::DateTimeOriginal, ExifTag::DateTimeOriginal);
    tags
}

/// Writes the EXIF data of `source` into `encoded`, the bytes of an image
/// about to be written to `target`. Orientation is reset, the dimensions
/// describe the pano and the software tag names this crate.
pub fn copy_exif(source: &Path, target: &Path, dimensions: (u32, u32), encoded: &mut Vec<u8>) -> Result<()> {
    let Some(kind) = file_type(target) else {
        return Err(PipelineError::Metadata(format!("no metadata support for {}", target.display())));
    };

    let mut metadata = Metadata::new();
    let file = File::open(source)?;
    match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => copied_tags(&exif).into_iter().for_each(|tag| metadata.set_tag(tag)),
        Err(e) => tracing::debug!(source = %source.display(), error = %e, "source has no EXIF data"),
    }
    metadata.set_tag(ExifTag::Software(SOFTWARE.to_string()));
    metadata.set_tag(ExifTag::Orientation(vec![1u16]));
    metadata.set_tag(ExifTag::ImageWidth(vec![dimensions.0]));
    metadata.set_tag(ExifTag::ImageHeight(vec![dimensions.1]));

    // little_exif may panic on unusual input.
    let written = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| metadata.write_to_vec(encoded, kind)));
    match written {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PipelineError::Metadata(e.to_string())),
        Err(_) => Err(PipelineError::Metadata("metadata writer panicked".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_target_is_rejected() {
        let mut bytes = Vec::new();
        let err = copy_exif(Path::new("a.jpg"), Path::new("out.bmp"), (1, 1), &mut bytes);
        assert!(matches!(err, Err(PipelineError::Metadata(_))));
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let mut bytes = Vec::new();
        let err = copy_exif(Path::new("/nonexistent/a.jpg"), Path::new("out.jpg"), (1, 1), &mut bytes);
        assert!(matches!(err, Err(PipelineError::Io(_))));
    }
}
