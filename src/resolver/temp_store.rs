// Temp Asset Store - scoped directory for files the pipeline materializes
//
// A TempAsset owns its file. Dropping the handle deletes the file, so the
// last owner (usually the delivery stream) decides when the bytes go away.
// Nothing here sweeps orphans left by a crashed process.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};
use time::OffsetDateTime;

use super::models::RequestId;
use super::platform::Platform;

#[derive(Debug)]
pub struct TempAssetStore {
    root: PathBuf,
    sequence: AtomicU64,
}

impl TempAssetStore {
    /// Create (if needed) and open the store directory
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "temp asset store opened");
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a unique path for a new asset. The file itself is created
    /// by whoever writes the bytes.
    pub fn allocate(&self, platform: Platform, ext: &str, owner: RequestId) -> TempAsset {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let ext = sanitize_extension(ext);
        let path = self
            .root
            .join(format!("{}-{}-{}.{}", platform.as_str(), owner, seq, ext));

        TempAsset {
            path,
            created_at: OffsetDateTime::now_utc(),
            owner_request_id: owner,
        }
    }
}

/// The default store location: `<cache_dir>/media-resolver/assets`, or the
/// OS temp dir when no cache dir exists
pub fn default_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("media-resolver").join("assets"))
        .unwrap_or_else(|| std::env::temp_dir().join("media-resolver-assets"))
}

fn sanitize_extension(ext: &str) -> String {
    let cleaned: String = ext
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    if cleaned.is_empty() {
        "bin".to_string()
    } else {
        cleaned.to_ascii_lowercase()
    }
}

/// One transient file. Not `Clone`: there is at most one live owner.
#[derive(Debug)]
pub struct TempAsset {
    path: PathBuf,
    created_at: OffsetDateTime,
    owner_request_id: RequestId,
}

impl TempAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner_request_id(&self) -> RequestId {
        self.owner_request_id
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }

    /// Delete the file now. Same as dropping the handle.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for TempAsset {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                let age = OffsetDateTime::now_utc() - self.created_at;
                tracing::debug!(
                    path = %self.path.display(),
                    age_ms = age.whole_milliseconds() as i64,
                    "temp asset removed"
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp asset");
            }
        }
    }
}

impl Serialize for TempAsset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.path.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let owner = RequestId::new();

        let a = store.allocate(Platform::YouTube, "mp4", owner);
        let b = store.allocate(Platform::YouTube, ".MP4", owner);

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        let name = a.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("youtube-"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(b.extension(), Some("mp4"));
        assert_eq!(a.owner_request_id(), owner);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let asset = store.allocate(Platform::SoundCloud, "mp3", RequestId::new());
        std::fs::write(asset.path(), b"ID3data").unwrap();
        let path = asset.path().to_path_buf();

        assert!(path.exists());
        asset.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_without_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempAssetStore::open(dir.path()).unwrap();
        let asset = store.allocate(Platform::Vimeo, "", RequestId::new());
        assert_eq!(asset.extension(), Some("bin"));
        drop(asset);
    }
}
