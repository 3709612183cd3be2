//! Local Cache Store
//!
//! Maps resource paths onto the cache root and materializes downloads
//! atomically: data is streamed into a hidden temporary file next to the
//! destination and renamed into place only once the transfer completed.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::path::ResourcePath;

/// Reserved prefix and suffix for in-progress downloads
const TEMP_PREFIX: &str = ".mirror-";
const TEMP_SUFFIX: &str = ".tmp";

/// On-disk cache rooted at a single directory
#[derive(Debug)]
pub struct CacheStore {
    /// Root directory mirroring the origin hierarchy
    root: PathBuf,
}

impl CacheStore {
    /// Open the cache at `root`, creating it if needed
    ///
    /// Leftover temporary files from interrupted downloads are removed.
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {:?}", root))?;

        let store = Self { root };
        let removed = store.cleanup();

        info!(
            cache_dir = %store.root.display(),
            stale_temp_files = removed,
            "Cache store initialized"
        );

        Ok(store)
    }

    /// Get the cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of a resource under the cache root
    pub fn local_path(&self, path: &ResourcePath) -> PathBuf {
        self.root.join(path.relative())
    }

    /// Filesystem metadata of the cache entry, `None` when it does not exist
    pub fn metadata(&self, path: &ResourcePath) -> io::Result<Option<Metadata>> {
        match fs::metadata(self.local_path(path)) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a fully materialized cache entry exists
    pub fn contains(&self, path: &ResourcePath) -> bool {
        matches!(self.metadata(path), Ok(Some(m)) if m.is_file())
    }

    /// Start materializing a cache entry
    ///
    /// The returned entry writes to a temporary file colocated with the
    /// destination. Nothing is visible under the final name until
    /// [`PendingEntry::commit`] succeeds.
    pub fn begin(&self, path: &ResourcePath) -> Result<PendingEntry> {
        let dest = self.local_path(path);
        let file_name = path
            .file_name()
            .with_context(|| format!("Cannot store the mirror root as a file: {}", path))?;

        let parent = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache subdirectory: {:?}", parent))?;

        let tmp = tempfile::Builder::new()
            .prefix(&format!("{}{}.", TEMP_PREFIX, file_name))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .context("Failed to create temp file for cache")?;
        let (file, temp_path) = tmp.into_parts();

        debug!(path = %path, temp = %temp_path.display(), "Started cache entry");

        Ok(PendingEntry {
            file: tokio::fs::File::from_std(file),
            temp_path,
            dest,
            written: 0,
        })
    }

    /// Remove temp files left behind by interrupted downloads
    ///
    /// Returns the number of files removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let Ok(read_dir) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in read_dir.flatten() {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push(path);
                } else if is_temp_name(&entry.file_name().to_string_lossy()) {
                    debug!(path = %path.display(), "Removing stale temp file");
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }

        removed
    }
}

/// Files carrying the reserved prefix and suffix are in-progress downloads
fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

/// A cache entry being downloaded
///
/// Dropping it without committing deletes the temporary file.
pub struct PendingEntry {
    file: tokio::fs::File,
    temp_path: TempPath,
    dest: PathBuf,
    written: u64,
}

impl PendingEntry {
    /// Append a chunk of the resource body
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("Failed to write temp file: {:?}", &*self.temp_path))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and atomically rename onto the final path
    ///
    /// # Returns
    /// Number of bytes in the committed entry
    pub async fn commit(mut self) -> Result<u64> {
        self.file.flush().await.context("Failed to flush temp file")?;
        self.file.sync_all().await.context("Failed to sync temp file")?;
        drop(self.file);

        self.temp_path
            .persist(&self.dest)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to persist cache file: {:?}", self.dest))?;

        Ok(self.written)
    }

    /// Final path the entry will be committed to
    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    fn temp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_temp_name(&p.file_name().unwrap().to_string_lossy()))
            .collect()
    }

    #[test]
    fn test_new_creates_root() {
        let (_dir, store) = store();
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_metadata_missing_is_none() {
        let (_dir, store) = store();
        let path = ResourcePath::parse("nope.rockspec").unwrap();
        assert!(store.metadata(&path).unwrap().is_none());
        assert!(!store.contains(&path));
    }

    #[test]
    fn test_contains_ignores_directories() {
        let (_dir, store) = store();
        fs::create_dir_all(store.root().join("manifests")).unwrap();
        let path = ResourcePath::parse("manifests").unwrap();
        assert!(store.metadata(&path).unwrap().is_some());
        assert!(!store.contains(&path));
    }

    #[tokio::test]
    async fn test_commit_is_atomic() {
        let (_dir, store) = store();
        let path = ResourcePath::parse("foo/bar-1.0.zip").unwrap();

        let mut pending = store.begin(&path).unwrap();
        pending.write(b"first half ").await.unwrap();
        assert!(!store.contains(&path), "partial entry must not be visible");
        assert!(!pending.dest().exists());

        pending.write(b"second half").await.unwrap();
        let written = pending.commit().await.unwrap();

        assert_eq!(written, 22);
        assert_eq!(
            fs::read(store.local_path(&path)).unwrap(),
            b"first half second half"
        );
        assert!(temp_files(&store.root().join("foo")).is_empty());
    }

    #[tokio::test]
    async fn test_commit_overwrites_previous_entry() {
        let (_dir, store) = store();
        let path = ResourcePath::parse("index.html").unwrap();
        fs::write(store.local_path(&path), b"old").unwrap();

        let mut pending = store.begin(&path).unwrap();
        pending.write(b"new").await.unwrap();
        assert_eq!(fs::read(store.local_path(&path)).unwrap(), b"old");

        pending.commit().await.unwrap();
        assert_eq!(fs::read(store.local_path(&path)).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_dropped_entry_removes_temp_file() {
        let (_dir, store) = store();
        let path = ResourcePath::parse("lib-2.0.rock").unwrap();

        let mut pending = store.begin(&path).unwrap();
        pending.write(b"partial").await.unwrap();
        assert_eq!(temp_files(store.root()).len(), 1);

        drop(pending);
        assert!(temp_files(store.root()).is_empty());
        assert!(!store.contains(&path));
    }

    #[test]
    fn test_begin_rejects_root() {
        let (_dir, store) = store();
        let root = ResourcePath::parse("/").unwrap();
        assert!(store.begin(&root).is_err());
    }

    #[test]
    fn test_cleanup_removes_stale_temp_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join(".mirror-a.zip.x1y2.tmp"), b"stale").unwrap();
        fs::write(root.join("nested").join(".mirror-b.rock.z9.tmp"), b"stale").unwrap();
        fs::write(root.join("visible.tmp"), b"mirrored file").unwrap();
        fs::write(root.join(".hidden.tmp"), b"mirrored hidden file").unwrap();
        fs::write(root.join("index.html"), b"index").unwrap();

        let store = CacheStore::new(root.clone()).unwrap();

        assert!(!root.join(".mirror-a.zip.x1y2.tmp").exists());
        assert!(!root.join("nested").join(".mirror-b.rock.z9.tmp").exists());
        assert!(root.join("visible.tmp").exists());
        assert!(root.join(".hidden.tmp").exists());
        assert!(root.join("index.html").exists());
        assert_eq!(store.cleanup(), 0);
    }
}
