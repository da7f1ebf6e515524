// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Storage for conditional-optimum tables between UTIL and VALUE.
//!
//! UTIL stores one [`OptTable`] per variable; VALUE loads it once and
//! deletes it. On-disk storage bounds the memory held by agents with large
//! separators while the rest of the tree is still propagating.

use crate::domain::config::OptTableStoreConfig;
use crate::domain::utility::OptTable;
use crate::domain::variable::AgentId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No table stored under key '{0}'")]
    NotFound(String),

    #[error("Table store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Key/value cache of opt tables, keyed by variable name.
pub trait OptTableStore: Send + Sync {
    fn store(&self, key: &str, table: OptTable) -> Result<(), StoreError>;

    fn load(&self, key: &str) -> Result<OptTable, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOptTableStore {
    tables: Mutex<HashMap<String, OptTable>>,
}

impl InMemoryOptTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OptTableStore for InMemoryOptTableStore {
    fn store(&self, key: &str, table: OptTable) -> Result<(), StoreError> {
        self.tables.lock().insert(key.to_string(), table);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<OptTable, StoreError> {
        self.tables
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

/// Hex keeps arbitrary variable and agent names filesystem-safe: no
/// separators, no `..`.
fn hex_name(name: &str) -> String {
    name.bytes().map(|b| format!("{b:02x}")).collect()
}

/// One bincode file per table under a per-agent directory.
#[derive(Debug)]
pub struct OnDiskOptTableStore {
    directory: PathBuf,
}

impl OnDiskOptTableStore {
    pub fn new(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.table", hex_name(key)))
    }
}

impl OptTableStore for OnDiskOptTableStore {
    fn store(&self, key: &str, table: OptTable) -> Result<(), StoreError> {
        let path = self.path_of(key);
        let bytes = bincode::serialize(&table)?;
        std::fs::write(&path, bytes)?;
        debug!(key, path = %path.display(), "Stored opt table");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<OptTable, StoreError> {
        let bytes = match std::fs::read(self.path_of(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(bincode::deserialize(&bytes)?)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Build the store configured for `agent`.
pub fn build_store(config: &OptTableStoreConfig, agent: &AgentId) -> Result<Arc<dyn OptTableStore>, StoreError> {
    match config {
        OptTableStoreConfig::InMemory => Ok(Arc::new(InMemoryOptTableStore::new())),
        OptTableStoreConfig::OnDisk { directory } => {
            Ok(Arc::new(OnDiskOptTableStore::new(directory.join(hex_name(agent.as_str())))?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::addable::Direction;
    use crate::domain::utility::UtilitySpace;
    use crate::domain::variable::Assignment;

    fn table() -> OptTable {
        let space = UtilitySpace::<i64>::from_fn(
            "d",
            vec!["x".into(), "y".into()],
            vec![vec![0, 1], vec![0, 1]],
            i64::MAX,
            |t| i64::from(t[0] == t[1]),
        )
        .unwrap();
        space.project(&["y"], Direction::Minimize).unwrap().1
    }

    fn exercise(store: &dyn OptTableStore) {
        store.store("y", table()).unwrap();
        let loaded = store.load("y").unwrap();
        assert_eq!(loaded, table());
        let context = Assignment::from([("x".to_string(), 0)]);
        assert_eq!(loaded.resolve(&context).unwrap().get("y"), Some(&1));

        store.delete("y").unwrap();
        assert!(matches!(store.load("y"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("y"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryOptTableStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_on_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = OnDiskOptTableStore::new(dir.path().join("agent")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_build_store_uses_per_agent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = OptTableStoreConfig::OnDisk {
            directory: dir.path().to_path_buf(),
        };
        let store = build_store(&config, &AgentId::from("a7")).unwrap();
        store.store("x/1", table()).unwrap();
        assert!(dir.path().join("6137").join("782f31.table").exists());
    }

    #[test]
    fn test_agent_names_cannot_escape_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let directory = root.path().join("tables");
        let config = OptTableStoreConfig::OnDisk {
            directory: directory.clone(),
        };
        let store = build_store(&config, &AgentId::from("../x")).unwrap();
        store.store("y", table()).unwrap();

        assert!(!root.path().join("x").exists());
        let entries: Vec<_> = std::fs::read_dir(&directory)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("2e2e2f78")]);
    }
}
