//! Content-addressed file store for photo and voice payloads.
//!
//! Files live at `{root}/{category}/{chat_id}/{message_id}`. At most one file
//! per address; overwrites are not versioned.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Content category under which a file is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Photo,
    Voice,
}

impl FileCategory {
    fn dir_name(self) -> &'static str {
        match self {
            FileCategory::Photo => "photo",
            FileCategory::Voice => "voice",
        }
    }
}

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    fn path_for(&self, category: FileCategory, chat_id: i64, message_id: i64) -> PathBuf {
        self.root
            .join(category.dir_name())
            .join(chat_id.to_string())
            .join(message_id.to_string())
    }

    pub fn store(
        &self,
        category: FileCategory,
        chat_id: i64,
        message_id: i64,
        data: &[u8],
    ) -> Result<(), String> {
        let path = self.path_for(category, chat_id, message_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {:?}: {e}", parent))?;
        }
        std::fs::write(&path, data).map_err(|e| format!("Failed to write {:?}: {e}", path))?;
        debug!("Stored {} bytes at {:?}", data.len(), path);
        Ok(())
    }

    /// Load a file, or `None` if nothing is stored at that address.
    pub fn load(&self, category: FileCategory, chat_id: i64, message_id: i64) -> Option<Vec<u8>> {
        let path = self.path_for(category, chat_id, message_id);
        match std::fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read {:?}: {e}", path);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.store(FileCategory::Photo, -1, 42, b"jpeg bytes").unwrap();
        assert_eq!(store.load(FileCategory::Photo, -1, 42).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_missing_address_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load(FileCategory::Voice, -1, 42).is_none());
    }

    #[test]
    fn test_categories_are_separate_addresses() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.store(FileCategory::Photo, -1, 42, b"photo").unwrap();
        assert!(store.load(FileCategory::Voice, -1, 42).is_none());
        assert_eq!(store.load(FileCategory::Photo, -1, 42).unwrap(), b"photo");
    }

    #[test]
    fn test_overwrite_replaces() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.store(FileCategory::Voice, -1, 7, b"old").unwrap();
        store.store(FileCategory::Voice, -1, 7, b"new").unwrap();
        assert_eq!(store.load(FileCategory::Voice, -1, 7).unwrap(), b"new");
    }
}
