//! On-disk JSON cache for vendor responses.
//!
//! Credentials, user data, houses and the device inventory are cached
//! between runs so a restart does not hammer the vendor API. An absent
//! or corrupt file simply means "fetch again".

use crate::error::CloudResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names used by the bridge, kept in one place.
pub mod files {
    pub const CREDENTIALS: &str = "credentials.json";
    pub const USER: &str = "userData.json";
    pub const HOUSES: &str = "houses.json";
    pub const DEVICES: &str = "devices.json";
}

/// JSON file cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read and decode a cached value. Absent or undecodable files
    /// yield `None`.
    pub async fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("cached file {path:?} is unreadable: {e}");
                None
            }
        }
    }

    /// Persist a value as pretty-printed JSON, creating the cache
    /// directory if needed.
    pub async fn write<T: Serialize>(&self, name: &str, value: &T) -> CloudResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(self.dir.join(name), bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());

        let value = Sample {
            name: "dev1".to_string(),
            count: 3,
        };
        cache.write("sample.json", &value).await.unwrap();

        let back: Sample = cache.read("sample.json").await.unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn test_absent_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        assert!(cache.read::<Sample>("missing.json").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{ nope").unwrap();

        let cache = DiskCache::new(dir.path());
        assert!(cache.read::<Sample>("bad.json").await.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("cache");
        let cache = DiskCache::new(&nested);

        cache
            .write(
                "sample.json",
                &Sample {
                    name: "x".to_string(),
                    count: 0,
                },
            )
            .await
            .unwrap();
        assert!(nested.join("sample.json").exists());
    }
}
