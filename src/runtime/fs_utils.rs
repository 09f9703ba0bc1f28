//! File system utilities
//!
//! Directory checks, atomic document writes and path/URI conversions used by
//! process saving, config generation and the engine runner.

use crate::runtime::error::{IntoRuntimeError, RuntimeError, RuntimeResult};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Create a directory and all parent directories if they don't exist
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> RuntimeResult<()> {
    let path = path.as_ref();
    fs::create_dir_all(path)
        .runtime_context_with_path("Failed to create directory", &path.display().to_string())
}

/// Copy a file from source to destination
pub fn copy_file<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> RuntimeResult<u64> {
    let from = from.as_ref();
    let to = to.as_ref();

    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }

    fs::copy(from, to).runtime_context(&format!(
        "Failed to copy file from {} to {}",
        from.display(),
        to.display()
    ))
}

/// Write content to a file atomically
pub fn write_file_atomic<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    contents: C,
) -> RuntimeResult<()> {
    let path = path.as_ref();
    let contents = contents.as_ref();

    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    // Write to temporary file first
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents).runtime_context_with_path(
        "Failed to write temporary file",
        &temp_path.display().to_string(),
    )?;

    fs::rename(&temp_path, path).runtime_context(&format!(
        "Failed to move temporary file {} to {}",
        temp_path.display(),
        path.display()
    ))
}

/// Read file contents as string
pub fn read_file_to_string<P: AsRef<Path>>(path: P) -> RuntimeResult<String> {
    let path = path.as_ref();
    fs::read_to_string(path)
        .runtime_context_with_path("Failed to read file", &path.display().to_string())
}

/// Check that a path is an existing regular file and return it resolved
pub fn file_exists<P: AsRef<Path>>(path: P) -> RuntimeResult<PathBuf> {
    let path = path.as_ref();
    let resolved = path
        .canonicalize()
        .runtime_context_with_path("File does not exist", &path.display().to_string())?;
    if !resolved.is_file() {
        return Err(RuntimeError::NotAFile {
            path: resolved.display().to_string(),
        });
    }
    Ok(resolved)
}

/// Check that a path is an existing directory and return it resolved
pub fn directory_exists<P: AsRef<Path>>(path: P) -> RuntimeResult<PathBuf> {
    let path = path.as_ref();
    let resolved = path
        .canonicalize()
        .runtime_context_with_path("Directory does not exist", &path.display().to_string())?;
    if !resolved.is_dir() {
        return Err(RuntimeError::NotADirectory {
            path: resolved.display().to_string(),
        });
    }
    Ok(resolved)
}

/// Convert an absolute path into a `file://` URI
pub fn path_to_uri<P: AsRef<Path>>(path: P) -> RuntimeResult<String> {
    let path = path.as_ref();
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| {
            RuntimeError::configuration_error(
                format!("{} is not an absolute path", path.display()),
                None,
            )
        })
}

/// Convert a `file://` URI (or a plain path) back into a path
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        Ok(_) => None,
        Err(_) => Some(PathBuf::from(uri)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_atomic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("doc.cwl");

        write_file_atomic(&path, "cwlVersion: v1.2\n").unwrap();
        assert_eq!(read_file_to_string(&path).unwrap(), "cwlVersion: v1.2\n");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_and_directory_checks() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        assert!(file_exists(&file).is_ok());
        assert!(matches!(
            file_exists(temp_dir.path()),
            Err(RuntimeError::NotAFile { .. })
        ));
        assert!(directory_exists(temp_dir.path()).is_ok());
        assert!(matches!(
            directory_exists(&file),
            Err(RuntimeError::NotADirectory { .. })
        ));
        assert!(file_exists(temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_uri_round_trip() {
        let uri = path_to_uri("/data/workflows/wf.cwl").unwrap();
        assert_eq!(uri, "file:///data/workflows/wf.cwl");
        assert_eq!(
            uri_to_path(&uri),
            Some(PathBuf::from("/data/workflows/wf.cwl"))
        );
        assert_eq!(uri_to_path("https://example.org/wf.cwl"), None);
        assert!(path_to_uri("relative/wf.cwl").is_err());
    }
}
