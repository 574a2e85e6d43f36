use std::fs;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{ClipError, Result};

/// Loads and saves a whole collection as a single JSON document. Loading is
/// tolerant: a missing or malformed file yields an empty collection, and
/// individual records that fail to decode are skipped rather than poisoning
/// the rest. Saving replaces the document atomically (temp file + rename).
pub struct SnapshotStore<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Digest of the document bytes currently on disk, `None` when the
    /// file is missing. Lets a holder of an in-memory copy notice writes
    /// made by another process.
    pub fn digest(&self) -> Option<String> {
        let raw = fs::read(&self.path).ok()?;
        Some(format!("{:x}", Sha256::digest(&raw)))
    }

    pub fn load(&self) -> Vec<T> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("malformed snapshot at {:?}, starting empty: {}", self.path, e);
                return Vec::new();
            }
        };
        values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!("skipping undecodable record: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn save(&self, records: &[T]) -> Result<()> {
        let raw = serde_json::to_string(records)
            .map_err(|e| ClipError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ClipError::Storage(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|e| ClipError::Storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| ClipError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ClipKind, ClipboardItem};
    use tempfile::TempDir;

    fn test_store(dir: &TempDir) -> SnapshotStore<ClipboardItem> {
        SnapshotStore::new(dir.path().join("history.json"))
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(test_store(&dir).load().is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("history.json"), "{oops").unwrap();
        assert!(test_store(&dir).load().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let items = vec![
            ClipboardItem::new(ClipKind::Text, "hello"),
            ClipboardItem::new(ClipKind::Url, "https://example.com"),
        ];
        store.save(&items).unwrap();
        let loaded = store.load();
        assert_eq!(loaded, items);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store: SnapshotStore<ClipboardItem> =
            SnapshotStore::new(dir.path().join("nested/deep/history.json"));
        store.save(&[ClipboardItem::new(ClipKind::Text, "x")]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.save(&[ClipboardItem::new(ClipKind::Text, "one")]).unwrap();
        store.save(&[ClipboardItem::new(ClipKind::Text, "two")]).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].display_text, "two");
        assert!(!dir.path().join("history.json.tmp").exists());
    }

    #[test]
    fn test_digest_tracks_file_changes() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        assert!(store.digest().is_none());

        store.save(&[ClipboardItem::new(ClipKind::Text, "one")]).unwrap();
        let first = store.digest().unwrap();
        assert_eq!(store.digest().unwrap(), first);

        store.save(&[ClipboardItem::new(ClipKind::Text, "two")]).unwrap();
        assert_ne!(store.digest().unwrap(), first);
    }

    #[test]
    fn test_load_skips_undecodable_records() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("history.json"),
            r#"[{"kind": "text", "displayText": "keep"}, 42]"#,
        )
        .unwrap();
        let loaded = test_store(&dir).load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].display_text, "keep");
    }

    #[test]
    fn test_load_accepts_legacy_records() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("history.json"),
            r#"[{"content": "from the old format"}]"#,
        )
        .unwrap();
        let loaded = test_store(&dir).load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].kind, ClipKind::Text);
        assert_eq!(loaded[0].display_text, "from the old format");
    }
}
