//! Versioned catalog of CWL documents on disk
//!
//! A catalog indexes every `*.cwl` document below a root directory by process
//! name and revision. The revision is read from `s:softwareVersion` (or a
//! plain `version` key) and must be a semantic version. Indexing is fail-soft:
//! a document that cannot be indexed is reported and skipped.

use crate::error::{CwlError, CwlResult};
use crate::runtime::fs_utils;
use crate::version::Version;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

const VERSION_KEYS: [&str; 2] = ["s:softwareVersion", "version"];

/// A document that could not be indexed
#[derive(Debug)]
pub struct CatalogFailure {
    pub path: PathBuf,
    pub error: CwlError,
}

/// Outcome of [`ProcessCatalog::refresh`]
#[derive(Debug, Default)]
pub struct CatalogReport {
    /// Number of documents indexed
    pub indexed: usize,
    pub failures: Vec<CatalogFailure>,
}

impl CatalogReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessCatalog {
    root: PathBuf,
    index: BTreeMap<String, BTreeMap<Version, PathBuf>>,
}

impl ProcessCatalog {
    /// Create an empty catalog over `root`. Call [`refresh`](Self::refresh) to index it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the index from the documents currently under the root.
    pub fn refresh(&mut self) -> CwlResult<CatalogReport> {
        let root = fs_utils::directory_exists(&self.root)?;
        let pattern = root.join("**").join("*.cwl");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| CwlError::bad_document(pattern.to_string(), e))?;

        self.index.clear();
        let mut report = CatalogReport::default();
        for entry in entries {
            let outcome = entry
                .map_err(|e| {
                    let path = e.path().to_path_buf();
                    (path.clone(), CwlError::bad_document(path.display().to_string(), e))
                })
                .and_then(|path| match self.index_document(&path) {
                    Ok(()) => Ok(path),
                    Err(error) => Err((path, error)),
                });
            match outcome {
                Ok(path) => {
                    debug!(path = %path.display(), "indexed cwl document");
                    report.indexed += 1;
                }
                Err((path, error)) => {
                    warn!(path = %path.display(), error = %error, "skipping cwl document");
                    report.failures.push(CatalogFailure { path, error });
                }
            }
        }
        info!(
            root = %root.display(),
            indexed = report.indexed,
            failed = report.failures.len(),
            "refreshed process catalog"
        );
        Ok(report)
    }

    fn index_document(&mut self, path: &Path) -> CwlResult<()> {
        let text = fs_utils::read_file_to_string(path)?;
        let document: JsonValue = serde_yaml::from_str(&text)
            .map_err(|e| CwlError::bad_document(path.display().to_string(), e))?;

        let version = VERSION_KEYS
            .iter()
            .find_map(|key| document.get(*key))
            .ok_or_else(|| {
                CwlError::bad_document(path.display().to_string(), "document has no version")
            })?;
        let version = match version {
            JsonValue::String(version) => Version::parse(version)?,
            other => Version::parse(&other.to_string())?,
        };
        let name = document_name(&document, path);

        let revisions = self.index.entry(name.clone()).or_default();
        match revisions.get(&version) {
            Some(existing) if existing != path => Err(CwlError::DuplicateVersion {
                name,
                version: version.to_string(),
            }),
            _ => {
                revisions.insert(version, path.to_path_buf());
                Ok(())
            }
        }
    }

    /// Path of a revision, or of the latest one when no version is given.
    pub fn get(&self, name: &str, version: Option<&Version>) -> Option<&Path> {
        let revisions = self.index.get(name)?;
        let path = match version {
            Some(version) => revisions.get(version),
            None => revisions.values().next_back(),
        };
        path.map(PathBuf::as_path)
    }

    /// Indexed revisions of a process, oldest first.
    pub fn versions(&self, name: &str) -> Vec<&Version> {
        self.index
            .get(name)
            .map(|revisions| revisions.keys().collect())
            .unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Forget everything indexed so far.
    pub fn invalidate(&mut self) {
        self.index.clear();
    }
}

/// Stem of the declared id, falling back to the file stem.
fn document_name(document: &JsonValue, path: &Path) -> String {
    let from_id = document
        .get("id")
        .and_then(JsonValue::as_str)
        .and_then(|id| {
            let path = match Url::parse(id) {
                Ok(url) => url.path().to_string(),
                Err(_) => id.trim_start_matches('#').to_string(),
            };
            Path::new(&path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .filter(|stem| !stem.is_empty());
    from_id.unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tool(version: &str) -> String {
        format!(
            "cwlVersion: v1.2\nclass: CommandLineTool\ns:softwareVersion: {}\ninputs: []\noutputs: []\n",
            version
        )
    }

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_refresh_indexes_revisions() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "v1/echo.cwl", &tool("1.0.0"));
        write(temp_dir.path(), "v2/echo.cwl", &tool("1.2.0"));
        write(temp_dir.path(), "v2/beta/echo.cwl", &tool("2.0.0-beta.1"));
        write(
            temp_dir.path(),
            "misc/anything.cwl",
            "class: CommandLineTool\nid: file:///tools/wc.cwl\nversion: 0.1.0\n",
        );

        let mut catalog = ProcessCatalog::new(temp_dir.path());
        let report = catalog.refresh().unwrap();
        assert_eq!(report.indexed, 4);
        assert!(report.is_clean());
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["echo", "wc"]);
        assert_eq!(
            catalog
                .versions("echo")
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>(),
            vec!["1.0.0", "1.2.0", "2.0.0-beta.1"]
        );

        let latest = catalog.get("echo", None).unwrap();
        assert!(latest.ends_with("v2/beta/echo.cwl"));
        let pinned = catalog
            .get("echo", Some(&Version::parse("1.0.0").unwrap()))
            .unwrap();
        assert!(pinned.ends_with("v1/echo.cwl"));
        assert!(catalog.get("echo", Some(&Version::new(9, 9, 9))).is_none());
        assert!(catalog.get("missing", None).is_none());
    }

    #[test]
    fn test_refresh_is_fail_soft() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a/echo.cwl", &tool("1.0.0"));
        write(temp_dir.path(), "b/echo.cwl", &tool("1.0.0"));
        write(temp_dir.path(), "c/echo.cwl", &tool("not-a-version"));
        write(temp_dir.path(), "d/echo.cwl", "class: CommandLineTool\n");
        write(temp_dir.path(), "e/echo.cwl", "class: [broken");
        write(temp_dir.path(), "f/echo.cwl", &tool("1.1.0"));

        let mut catalog = ProcessCatalog::new(temp_dir.path());
        let report = catalog.refresh().unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failures.len(), 4);
        assert!(report
            .failures
            .iter()
            .any(|failure| matches!(failure.error, CwlError::DuplicateVersion { .. })));
        assert!(report
            .failures
            .iter()
            .any(|failure| matches!(failure.error, CwlError::InvalidVersion { .. })));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_invalidate_and_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "echo.cwl", &tool("1.0.0"));

        let mut catalog = ProcessCatalog::new(temp_dir.path());
        catalog.refresh().unwrap();
        assert!(!catalog.is_empty());
        catalog.invalidate();
        assert!(catalog.is_empty());
        assert!(catalog.get("echo", None).is_none());

        let mut missing = ProcessCatalog::new(temp_dir.path().join("nope"));
        assert!(missing.refresh().is_err());
    }
}
