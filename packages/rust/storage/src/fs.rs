//! One-file-per-key report store on the local filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use jobsignal_shared::{JobSignalError, Result};

use crate::ReportStore;
use crate::entry::{CacheEntry, StoreKey};

/// Stores entries as `<root>/cache/<key>.json`.
///
/// Writes land in a uniquely named temp file and are renamed over the target,
/// so readers see either the old or the new entry. Writers of the same key
/// are serialized; reads never lock.
pub struct FsReportStore {
    dir: PathBuf,
    locks: Mutex<HashMap<StoreKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl FsReportStore {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("cache"),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn lock_for(&self, key: &StoreKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }
}

impl ReportStore for FsReportStore {
    async fn load(&self, key: &StoreKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobSignalError::io(&path, e)),
        };

        match CacheEntry::decode(key, &bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(%key, path = %path.display(), error = %e, "ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &StoreKey, entry: &CacheEntry) -> Result<()> {
        let bytes = entry.encode()?;
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| JobSignalError::io(&self.dir, e))?;

        let target = self.path_for(key);
        let temp = self.dir.join(format!(".{key}.{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| JobSignalError::io(&temp, e))?;

        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(JobSignalError::io(&target, e));
        }

        debug!(%key, bytes = bytes.len(), "cache entry saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Artifact, resolve};
    use jobsignal_shared::{CacheStatus, InputFingerprint};

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("js_store_{}", Uuid::now_v7()))
    }

    fn entry(fingerprint: &str, text: &str) -> CacheEntry {
        CacheEntry::new(InputFingerprint::from_hex(fingerprint), Artifact::Text(text.into()))
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let root = temp_root();
        let store = FsReportStore::new(&root);
        let key = StoreKey::new("scope", "summary").unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let root = temp_root();
        let store = FsReportStore::new(&root);
        let key = StoreKey::new("scope", "summary").unwrap();

        store.save(&key, &entry("abc", "hello")).await.unwrap();
        let loaded = store.load(&key).await.unwrap().expect("entry");
        assert_eq!(loaded.artifact, Artifact::Text("hello".into()));
        assert!(store.path_for(&key).exists());

        // No temp files left behind.
        let leftovers = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn stale_fingerprint_resolves_outdated() {
        let root = temp_root();
        let store = FsReportStore::new(&root);
        let key = StoreKey::new("scope", "summary").unwrap();

        store.save(&key, &entry("xyz", "old")).await.unwrap();
        let resolution = resolve(
            store.load(&key).await.unwrap(),
            &InputFingerprint::from_hex("abc"),
        );
        assert_eq!(resolution.status, CacheStatus::Outdated);
        assert_eq!(resolution.artifact, Some(Artifact::Text("old".into())));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn corrupt_entry_is_absent() {
        let root = temp_root();
        let store = FsReportStore::new(&root);
        let key = StoreKey::new("scope", "summary").unwrap();

        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.path_for(&key), b"{\"schema_version\": 1, \"trunc").unwrap();
        assert!(store.load(&key).await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn concurrent_writers_leave_a_whole_entry() {
        let root = temp_root();
        let store = Arc::new(FsReportStore::new(&root));
        let key = StoreKey::new("scope", "summary").unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(&key, &entry(&format!("fp{i}"), &"x".repeat(1000 + i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = store.load(&key).await.unwrap().expect("entry");
        let text = loaded.artifact.as_text().unwrap();
        let suffix = &loaded.input_fingerprint.as_str()[2..];
        assert_eq!(text.len(), 1000 + suffix.parse::<usize>().unwrap());

        let _ = std::fs::remove_dir_all(&root);
    }
}
