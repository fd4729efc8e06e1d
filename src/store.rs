//! Index Store
//!
//! Persists a [`ResourceIndex`] as pretty-printed JSON. A save serializes the
//! whole index first, writes it to a temporary file next to the target, syncs
//! it, and only then renames it over the target. Readers see either the old
//! index or the new one, never a partial file.

use crate::resource::model::ResourceIndex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const INDEX_FILE_NAME: &str = "resources.json";

/// Index persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no index at {0}")]
    NotFound(PathBuf),
    #[error("index {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write index {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk location of the resource index
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

/// A fully written temporary index that has not replaced the target yet
///
/// Dropping it without [`StagedIndex::commit`] removes the temporary file.
#[derive(Debug)]
pub struct StagedIndex {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default index location: `<data_dir>/awsf/resources.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("awsf").join(INDEX_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the stored index
    pub fn save(&self, index: &ResourceIndex) -> Result<(), StoreError> {
        if let Err(e) = self.stage(index).and_then(StagedIndex::commit) {
            tracing::error!("Failed to save index: {}", e);
            return Err(e);
        }
        tracing::info!(
            "Saved index with {} resource(s) to {:?}",
            index.resources.len(),
            self.path
        );
        Ok(())
    }

    /// Serialize and write the index to a temporary file
    pub fn stage(&self, index: &ResourceIndex) -> Result<StagedIndex, StoreError> {
        let content = serde_json::to_vec_pretty(index)?;

        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|source| self.write_err(source))?;
        self.sweep_orphans(&dir);

        let temp = dir.join(format!(
            ".{}.{}.tmp",
            self.file_name(),
            uuid::Uuid::new_v4().simple()
        ));

        // Owns the temp file from here on, so early returns clean it up
        let staged = StagedIndex {
            temp,
            target: self.path.clone(),
            committed: false,
        };

        let mut file = File::create(&staged.temp).map_err(|source| self.write_err(source))?;
        file.write_all(&content)
            .and_then(|_| file.sync_all())
            .map_err(|source| self.write_err(source))?;

        tracing::debug!("Staged index at {:?}", staged.temp);
        Ok(staged)
    }

    /// Load the stored index
    pub fn load(&self) -> Result<ResourceIndex, StoreError> {
        let content = fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StoreError::NotFound(self.path.clone())
            } else {
                StoreError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| INDEX_FILE_NAME.to_string())
    }

    fn write_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }

    /// Remove temporary files left behind by an interrupted save
    fn sweep_orphans(&self, dir: &Path) {
        let prefix = format!(".{}.", self.file_name());
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".tmp") {
                match fs::remove_file(entry.path()) {
                    Ok(()) => tracing::debug!("Removed orphaned temp file {:?}", entry.path()),
                    Err(e) => tracing::warn!("Failed to remove {:?}: {}", entry.path(), e),
                }
            }
        }
    }
}

impl StagedIndex {
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Replace the target with the staged file
    pub fn commit(mut self) -> Result<(), StoreError> {
        fs::rename(&self.temp, &self.target).map_err(|source| StoreError::Write {
            path: self.target.clone(),
            source,
        })?;
        self.committed = true;

        if let Some(parent) = self.target.parent() {
            sync_dir(parent);
        }
        Ok(())
    }
}

/// Persist the rename itself
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(dir) = File::open(dir) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

impl Drop for StagedIndex {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::environment::Environment;
    use crate::resource::model::{Resource, Service};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn index(names: &[&str]) -> ResourceIndex {
        let mut index = ResourceIndex::new("us-east-1", Some("dev"));
        index.resources = names
            .iter()
            .map(|n| Resource {
                id: format!("arn:aws:lambda:us-east-1:1:function:{}", n),
                name: n.to_string(),
                service: Service::Lambda,
                region: Some("us-east-1".to_string()),
                environment: crate::resource::environment::classify(n),
                metadata: BTreeMap::from([("Runtime".to_string(), serde_json::json!("go"))]),
                console_path_template_key: "function".to_string(),
            })
            .collect();
        index
    }

    fn tmp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("nested").join("resources.json"));

        let mut original = index(&["svc-prod-auth", "svc-dev-auth"]);
        original.partial = true;
        original.failed_services = vec![Service::Rds];
        store.save(&original).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.resources[0].environment, Environment::Prod);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("resources.json"));
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resources.json");
        fs::write(&path, "{\"resources\": [").unwrap();

        let store = IndexStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_crash_before_rename_keeps_previous_index() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("resources.json"));

        let previous = index(&["checkout-svc"]);
        store.save(&previous).unwrap();

        // Simulate a crash between writing the temp file and the rename
        let staged = store.stage(&index(&["a", "b", "c"])).unwrap();
        assert!(staged.temp_path().exists());
        std::mem::forget(staged);

        assert_eq!(store.load().unwrap(), previous);
        assert_eq!(tmp_files(dir.path()), 1);

        // The next save sweeps the orphan
        store.save(&index(&["d"])).unwrap();
        assert_eq!(tmp_files(dir.path()), 0);
        assert_eq!(store.load().unwrap().resources.len(), 1);
    }

    #[test]
    fn test_dropped_stage_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("resources.json"));

        let staged = store.stage(&index(&["x"])).unwrap();
        let temp = staged.temp_path().to_path_buf();
        drop(staged);

        assert!(!temp.exists());
        assert!(!store.exists());
    }

    #[test]
    fn test_write_failure_leaves_previous_untouched() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("resources.json"));
        let previous = index(&["kept"]);
        store.save(&previous).unwrap();

        // A directory where the index should be makes the rename fail
        let blocked = IndexStore::new(dir.path().join("blocked"));
        fs::create_dir(dir.path().join("blocked")).unwrap();
        fs::write(dir.path().join("blocked").join("keep"), "x").unwrap();
        assert!(matches!(
            blocked.save(&index(&["new"])),
            Err(StoreError::Write { .. })
        ));

        assert_eq!(store.load().unwrap(), previous);
        assert_eq!(tmp_files(dir.path()), 0);
    }
}
