//! Versioned JSON persistence of [`Options`].

use crate::options::{Options, OPTIONS_VERSION};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const OPTIONS_FILENAME: &str = "options.json";

/// Outcome of [`load_options`].
#[derive(Debug, Clone, PartialEq)]
pub enum OptionsLoad {
    Loaded(Options),
    NoSuchFile,
    /// Stored by another options version; defaults apply.
    BreakingChange,
    UnknownError,
}

#[derive(Serialize)]
struct StoredRef<'a> {
    version: u32,
    options: &'a Options,
}

#[derive(Deserialize)]
struct StoredVersion {
    version: u32,
}

#[derive(Deserialize)]
struct Stored {
    options: Options,
}

pub fn save_options(dir: &Path, options: &Options) -> Result<()> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(&StoredRef {
        version: OPTIONS_VERSION,
        options,
    })?;
    fs::write(dir.join(OPTIONS_FILENAME), json)?;
    tracing::debug!(dir = %dir.display(), "saved options");
    Ok(())
}

pub fn load_options(dir: &Path) -> OptionsLoad {
    let path = dir.join(OPTIONS_FILENAME);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return OptionsLoad::NoSuchFile,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read options");
            return OptionsLoad::UnknownError;
        }
    };

    match serde_json::from_str::<StoredVersion>(&text) {
        Ok(stored) if stored.version != OPTIONS_VERSION => {
            tracing::info!(stored = stored.version, current = OPTIONS_VERSION, "options version changed");
            return OptionsLoad::BreakingChange;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed options file");
            return OptionsLoad::UnknownError;
        }
    }

    match serde_json::from_str::<Stored>(&text) {
        Ok(stored) => OptionsLoad::Loaded(stored.options),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed options file");
            OptionsLoad::UnknownError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_photo::ProjectionType;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = Options::default();
        options.compression.jpeg_quality = 80;
        options.stitch = options.stitch.with_projection(ProjectionType::Mercator);
        save_options(dir.path(), &options).unwrap();
        assert_eq!(load_options(dir.path()), OptionsLoad::Loaded(options));
    }

    #[test]
    fn missing_stale_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_options(dir.path()), OptionsLoad::NoSuchFile);

        fs::write(dir.path().join(OPTIONS_FILENAME), r#"{"version": 1, "options": {}}"#).unwrap();
        assert_eq!(load_options(dir.path()), OptionsLoad::BreakingChange);

        fs::write(dir.path().join(OPTIONS_FILENAME), "not json").unwrap();
        assert_eq!(load_options(dir.path()), OptionsLoad::UnknownError);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let json = format!(r#"{{"version": {OPTIONS_VERSION}, "options": {{"compression": {{"jpeg_quality": 70}}}}}}"#);
        fs::write(dir.path().join(OPTIONS_FILENAME), json).unwrap();
        let OptionsLoad::Loaded(options) = load_options(dir.path()) else {
            panic!("expected loaded options");
        };
        assert_eq!(options.compression.jpeg_quality, 70);
        assert_eq!(options.compression.png_compression, 6);
        assert_eq!(options.stitch, pano_photo::StitchAlgorithmOptions::default());
    }
}
