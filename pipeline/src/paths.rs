//! Input allow-list.

use std::path::{Path, PathBuf};

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "tif", "tiff", "png", "bmp"];
pub const METADATA_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "tif", "tiff"];

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

pub fn is_supported_extension(path: &Path) -> bool {
    lowercase_extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether exported metadata can be written to `path`.
pub fn supports_metadata(path: &Path) -> bool {
    lowercase_extension(path).is_some_and(|ext| METADATA_EXTENSIONS.contains(&ext.as_str()))
}

/// Keeps the supported inputs, in order.
pub fn filter_supported<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| is_supported_extension(p.as_ref()))
        .map(|p| p.as_ref().to_path_buf())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_case_insensitive() {
        assert!(is_supported_extension(Path::new("a/IMG_01.JPG")));
        assert!(is_supported_extension(Path::new("scan.TiFf")));
        assert!(!is_supported_extension(Path::new("raw.cr2")));
        assert!(!is_supported_extension(Path::new("no_extension")));
        assert!(supports_metadata(Path::new("out.png")));
        assert!(!supports_metadata(Path::new("out.bmp")));
    }

    #[test]
    fn filter_keeps_order() {
        let kept = filter_supported(["b.png", "notes.txt", "a.jpeg", ".hidden"]);
        assert_eq!(kept, vec![PathBuf::from("b.png"), PathBuf::from("a.jpeg")]);
    }
}
