//! Content Store (C2): a content-addressed directory tree under a
//! configured root, used to dedup identical transcode outputs and to serve
//! manifests/segments while a session is still producing them.
//!
//! Hash becomes the path, sidecar metadata travels alongside the data; a
//! defensive filename-pattern check runs before any destructive sweep.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};
use crate::models::ContentHash;

/// Sidecar record stored as `<content_dir>/metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub hash: String,
    pub media_id: String,
    pub format: String,
    pub segment_duration_secs: f64,
    pub status: String,
    pub segment_count: u64,
    pub quality_levels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Placement of one media segment within a content directory.
#[derive(Debug, Clone, Copy)]
pub struct SegmentInfo {
    pub index: u64,
}

const SUBDIRS: [&str; 5] = ["segments", "manifests", "init", "video", "audio"];
const METADATA_FILE: &str = "metadata.json";

/// The manifest filename a content directory's `manifests/` subdirectory
/// holds for a given output container, per the on-disk layout in §6.3.
#[must_use]
pub fn manifest_file_name(container: &str) -> &'static str {
    match container {
        "hls" => "master.m3u8",
        "mp4" => "output.mp4",
        _ => "manifest.mpd",
    }
}

/// A content hash must be a non-empty run of hex digits before it is
/// allowed to reach a filesystem path, so a malformed or path-traversal
/// hash (`../..`, an absolute path, empty string) can never steer a
/// destructive sweep outside the store root.
fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Two-character shard prefix keeps any one directory level from
    /// accumulating tens of thousands of entries.
    fn shard_for(hash: &str) -> &str {
        if hash.len() >= 2 { &hash[..2] } else { hash }
    }

    #[must_use]
    pub fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(Self::shard_for(hash.as_str())).join(hash.as_str())
    }

    /// Atomically publishes artifacts already written to `source_dir` under
    /// the canonical content directory for `hash`. Rejects if the hash
    /// already exists — callers must dedup before calling this.
    pub async fn store(
        &self,
        hash: &ContentHash,
        source_dir: &Path,
        metadata: ContentMetadata,
    ) -> Result<PathBuf> {
        let dest = self.path_for(hash);
        if fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(Error::Conflict(format!("content hash {hash} already stored")));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(source_dir, &dest).await?;

        for subdir in SUBDIRS {
            fs::create_dir_all(dest.join(subdir)).await?;
        }
        self.write_metadata(&dest, &metadata).await?;

        Ok(dest)
    }

    /// Allocates an empty content directory up front, for the common case
    /// where a provider writes segments incrementally while running rather
    /// than producing a finished tree to `store()` in one shot.
    pub async fn allocate(&self, hash: &ContentHash, metadata: ContentMetadata) -> Result<PathBuf> {
        let dest = self.path_for(hash);
        if fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(Error::Conflict(format!("content hash {hash} already stored")));
        }
        for subdir in SUBDIRS {
            fs::create_dir_all(dest.join(subdir)).await?;
        }
        self.write_metadata(&dest, &metadata).await?;
        Ok(dest)
    }

    pub async fn exists(&self, hash: &ContentHash) -> bool {
        fs::try_exists(self.path_for(hash)).await.unwrap_or(false)
    }

    pub async fn get(&self, hash: &ContentHash) -> Result<(ContentMetadata, PathBuf)> {
        let dir = self.path_for(hash);
        let metadata = self.read_metadata(&dir).await?;
        Ok((metadata, dir))
    }

    pub async fn get_metadata(&self, hash: &ContentHash) -> Result<ContentMetadata> {
        self.read_metadata(&self.path_for(hash)).await
    }

    pub async fn get_segments(&self, hash: &ContentHash) -> Result<Vec<PathBuf>> {
        let segments_dir = self.path_for(hash).join("segments");
        let mut paths = Vec::new();
        let mut entries = match fs::read_dir(&segments_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Publishes a segment by writing to a private temp path first, then
    /// renaming into place — readers never observe a partially-written
    /// file. Duplicate indices overwrite the previous segment.
    pub async fn add_segment(
        &self,
        hash: &ContentHash,
        source_path: &Path,
        segment_info: SegmentInfo,
    ) -> Result<PathBuf> {
        let dir = self.path_for(hash);
        let extension = source_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("m4s");
        let dest = dir.join("segments").join(format!("{:010}.{extension}", segment_info.index));

        let tmp = dir.join("segments").join(format!(".tmp-{:010}", segment_info.index));
        fs::copy(source_path, &tmp).await?;
        fs::rename(&tmp, &dest).await?;

        let mut metadata = self.read_metadata(&dir).await?;
        metadata.segment_count = metadata.segment_count.max(segment_info.index + 1);
        metadata.updated_at = Utc::now();
        self.write_metadata(&dir, &metadata).await?;

        Ok(dest)
    }

    pub async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let mut stack = vec![path.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if let Ok(metadata) = entry.metadata().await {
                    total += metadata.len();
                }
            }
        }
        Ok(total)
    }

    pub async fn total_size(&self) -> Result<u64> {
        self.directory_size(&self.root).await
    }

    /// Lists content directories ordered oldest-`updated_at`-first, for the
    /// Cleanup Service's disk-budget eviction pass.
    pub async fn oldest_sessions(&self, n: usize) -> Result<Vec<(ContentHash, ContentMetadata)>> {
        let mut found = Vec::new();
        let mut shard_entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(err) => return Err(err.into()),
        };

        while let Some(shard) = shard_entries.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut hash_entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = hash_entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                if let Ok(metadata) = self.read_metadata(&entry.path()).await {
                    found.push((ContentHash(metadata.hash.clone()), metadata));
                }
            }
        }

        found.sort_by_key(|(_, m)| m.updated_at);
        found.truncate(n);
        Ok(found)
    }

    /// Removes a content directory entirely. Errors are surfaced but the
    /// caller (Cleanup Service) is expected to log and continue rather than
    /// abort the whole sweep over one bad directory.
    pub async fn remove(&self, hash: &ContentHash) -> Result<()> {
        if !is_valid_hash(hash.as_str()) {
            return Err(Error::Validation(format!("refusing to remove malformed content hash {hash}")));
        }
        let dir = self.path_for(hash);
        fs::remove_dir_all(&dir).await.map_err(Error::from)
    }

    async fn write_metadata(&self, dir: &Path, metadata: &ContentMetadata) -> Result<()> {
        let tmp = dir.join(format!(".tmp-{METADATA_FILE}"));
        let json = serde_json::to_vec_pretty(metadata)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, dir.join(METADATA_FILE)).await?;
        Ok(())
    }

    async fn read_metadata(&self, dir: &Path) -> Result<ContentMetadata> {
        let path = dir.join(METADATA_FILE);
        let bytes = fs::read(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("no content stored at {}", dir.display()))
            } else {
                Error::from(err)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[must_use]
pub fn system_time_age_secs(modified: SystemTime) -> u64 {
    SystemTime::now()
        .duration_since(modified)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_metadata(hash: &str) -> ContentMetadata {
        let now = Utc::now();
        ContentMetadata {
            hash: hash.to_string(),
            media_id: "media-1".to_string(),
            format: "dash".to_string(),
            segment_duration_secs: 6.0,
            status: "running".to_string(),
            segment_count: 0,
            quality_levels: vec!["720p".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn allocate_then_exists() {
        let root = tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let hash = ContentHash("abc123".to_string());
        store.allocate(&hash, sample_metadata("abc123")).await.unwrap();
        assert!(store.exists(&hash).await);
    }

    #[tokio::test]
    async fn duplicate_allocate_is_conflict() {
        let root = tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let hash = ContentHash("dup".to_string());
        store.allocate(&hash, sample_metadata("dup")).await.unwrap();
        let err = store.allocate(&hash, sample_metadata("dup")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn add_segment_then_list() {
        let root = tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let hash = ContentHash("seg1".to_string());
        store.allocate(&hash, sample_metadata("seg1")).await.unwrap();

        let source = root.path().join("source.m4s");
        fs::write(&source, b"data").await.unwrap();
        store
            .add_segment(&hash, &source, SegmentInfo { index: 0 })
            .await
            .unwrap();

        let segments = store.get_segments(&hash).await.unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[tokio::test]
    async fn oldest_sessions_orders_by_updated_at() {
        let root = tempdir().unwrap();
        let store = ContentStore::new(root.path());

        let mut older = sample_metadata("older");
        older.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.allocate(&ContentHash("older".to_string()), older).await.unwrap();

        store
            .allocate(&ContentHash("newer".to_string()), sample_metadata("newer"))
            .await
            .unwrap();

        let oldest = store.oldest_sessions(1).await.unwrap();
        assert_eq!(oldest[0].0.as_str(), "older");
    }

    #[tokio::test]
    async fn remove_deletes_directory() {
        let root = tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let hash = ContentHash("deadbeef01".to_string());
        store.allocate(&hash, sample_metadata("deadbeef01")).await.unwrap();
        store.remove(&hash).await.unwrap();
        assert!(!store.exists(&hash).await);
    }

    #[tokio::test]
    async fn remove_rejects_malformed_hash() {
        let root = tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let err = store.remove(&ContentHash("../../etc".to_string())).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
