use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replaces the snapshot at `path` with `text`. The text is staged in a
/// sibling `.tmp` file and flushed before being renamed over the old
/// snapshot, so readers only ever see a complete file.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    let staging = staging_path(path)?;
    if let Some(dir) = staging.parent() {
        fs::create_dir_all(dir)?;
    }

    let result = stage(&staging, text).and_then(|()| fs::rename(&staging, path));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn stage(staging: &Path, text: &str) -> io::Result<()> {
    let mut file = File::create(staging)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()
}

fn staging_path(path: &Path) -> io::Result<PathBuf> {
    let Some(name) = path.file_name() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("snapshot path '{}' has no file name", path.display()),
        ));
    };
    let mut staged = OsString::from(name);
    staged.push(".tmp");
    Ok(path.with_file_name(staged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_previous_snapshot_and_cleans_staging() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("saves").join("registry.json");

        write_text_atomic(&path, r#"{"version":1}"#).expect("first save");
        write_text_atomic(&path, r#"{"version":2}"#).expect("second save");

        assert_eq!(fs::read_to_string(&path).expect("read"), r#"{"version":2}"#);
        assert!(!dir.path().join("saves").join("registry.json.tmp").exists());
    }

    #[test]
    fn path_without_file_name_is_rejected() {
        let error = write_text_atomic(Path::new("/"), "{}").expect_err("root has no file name");
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }
}
