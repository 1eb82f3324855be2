//! File-system persistence for published datasets and cached intermediate
//! results (CSV exports, scoresheet PDFs, JSON stages).

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    cache_dir: PathBuf,
    skip_cache: bool,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache_dir: cache_dir.into(),
            skip_cache: false,
        }
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn cache_path(&self, subdir: Option<&str>, filename: &str) -> PathBuf {
        match subdir {
            Some(dir) => self.cache_dir.join(dir).join(filename),
            None => self.cache_dir.join(filename),
        }
    }

    pub fn data_path(&self, filename: &str) -> PathBuf {
        self.data_dir.join(filename)
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, data: &T) -> Result<()> {
        Self::ensure_parent(path)?;
        let content = serde_json::to_string_pretty(data)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn read_cached_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if self.skip_cache || !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        Self::ensure_parent(path)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn read_cached_text(&self, path: &Path) -> Result<Option<String>> {
        if self.skip_cache || !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    pub fn write_bytes(&self, path: &Path, content: &[u8]) -> Result<()> {
        Self::ensure_parent(path)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn read_cached_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        if self.skip_cache || !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        rank: usize,
    }

    #[test]
    fn json_round_trip_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("data"), tmp.path().join("cache"));
        let path = store.cache_path(Some("stages"), "sample.json");

        let sample = Sample {
            name: "USC Münster".to_string(),
            rank: 1,
        };
        store.write_json(&path, &sample).unwrap();

        let loaded: Option<Sample> = store.read_cached_json(&path).unwrap();
        assert_eq!(loaded, Some(sample));
    }

    #[test]
    fn missing_cache_entries_read_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("data"), tmp.path().join("cache"));
        let path = store.cache_path(None, "absent.json");
        let loaded: Option<Sample> = store.read_cached_json(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn skip_cache_ignores_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("data"), tmp.path().join("cache"));
        let path = store.cache_path(None, "schedule.csv");
        store.write_text(&path, "cached").unwrap();

        let bypassing = store.clone().with_skip_cache(true);
        assert!(bypassing.read_cached_text(&path).unwrap().is_none());
        assert_eq!(
            store.read_cached_text(&path).unwrap().as_deref(),
            Some("cached")
        );
    }
}
