//! The file-backed datastore store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use canopy_core::{ClientId, Modstate};
use canopy_tree::{ConfigTree, NodeRepr};

use crate::error::{StoreError, StoreResult};

/// On-disk envelope of one datastore.
#[derive(Debug, Serialize, Deserialize)]
struct DatastoreFile {
    /// Module revisions the content was authored against.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    modstate: Option<Modstate>,
    /// The configuration tree.
    config: NodeRepr,
}

/// A directory of named datastores with locks and dirty bits.
#[derive(Debug)]
pub struct DatastoreStore {
    dir: PathBuf,
    locks: HashMap<String, ClientId>,
    dirty: HashMap<String, bool>,
}

impl DatastoreStore {
    /// Open (creating if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: HashMap::new(),
            dirty: HashMap::new(),
        })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    // ========== Files ==========

    /// True if the datastore has a file.
    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    /// Load a datastore: tree plus its embedded module-state record.
    ///
    /// The tree comes back unbound and unsorted; callers bind against
    /// the schema they are upgrading to.
    pub fn load(&self, name: &str) -> StoreResult<(ConfigTree, Option<Modstate>)> {
        let path = self.file_path(name);
        let bytes = match fs::read_to_string(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let file: DatastoreFile = serde_json::from_str(&bytes)?;
        let tree = ConfigTree::from_repr(&file.config)?;
        debug!(db = name, "datastore loaded");
        Ok((tree, file.modstate))
    }

    /// Save a tree as the datastore's new content, atomically
    /// (write-then-rename).
    pub fn save(
        &mut self,
        name: &str,
        tree: &ConfigTree,
        modstate: Option<&Modstate>,
    ) -> StoreResult<()> {
        let file = DatastoreFile {
            modstate: modstate.cloned(),
            config: tree.to_repr(tree.root())?,
        };
        let mut bytes = serde_json::to_string_pretty(&file)?;
        bytes.push('\n');
        self.write_atomic(&self.file_path(name), &bytes)?;
        debug!(db = name, "datastore saved");
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> StoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Copy one datastore file onto another (content and modstate).
    pub fn copy(&mut self, src: &str, dst: &str) -> StoreResult<()> {
        let path = self.file_path(src);
        let bytes = match fs::read_to_string(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(src.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.write_atomic(&self.file_path(dst), &bytes)?;
        debug!(src, dst, "datastore copied");
        Ok(())
    }

    /// Reset a datastore to an empty tree.
    pub fn reset(&mut self, name: &str, modstate: Option<&Modstate>) -> StoreResult<()> {
        info!(db = name, "datastore reset");
        self.save(name, &ConfigTree::new(), modstate)?;
        self.dirty.insert(name.to_string(), false);
        Ok(())
    }

    /// Delete a datastore file. Missing files are fine.
    pub fn delete(&mut self, name: &str) -> StoreResult<()> {
        match fs::remove_file(self.file_path(name)) {
            Ok(()) => {
                debug!(db = name, "datastore deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ========== Locks ==========

    /// The session holding the lock, 0 when unlocked.
    pub fn locked_by(&self, name: &str) -> ClientId {
        self.locks.get(name).copied().unwrap_or(0)
    }

    /// Take the advisory lock for a client.
    pub fn lock(&mut self, name: &str, client: ClientId) -> StoreResult<()> {
        let holder = self.locked_by(name);
        if holder != 0 && holder != client {
            return Err(StoreError::LockHeld {
                db: name.to_string(),
                holder,
            });
        }
        self.locks.insert(name.to_string(), client);
        Ok(())
    }

    /// Release the lock held by a client.
    pub fn unlock(&mut self, name: &str, client: ClientId) -> StoreResult<()> {
        let holder = self.locked_by(name);
        if holder != client {
            return Err(StoreError::NotHolder {
                db: name.to_string(),
                client,
            });
        }
        self.locks.remove(name);
        Ok(())
    }

    /// Drop every lock a disconnecting session holds.
    pub fn unlock_all(&mut self, client: ClientId) {
        self.locks.retain(|_, holder| *holder != client);
    }

    // ========== Dirty bits ==========

    /// True if the datastore was mutated since its last save point.
    pub fn modified(&self, name: &str) -> bool {
        self.dirty.get(name).copied().unwrap_or(false)
    }

    /// Set or clear the dirty bit.
    pub fn set_modified(&mut self, name: &str, dirty: bool) {
        self.dirty.insert(name.to_string(), dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree.add_element(root, "system", Some("urn:example:sys")).unwrap();
        tree.add_leaf(system, "hostname", None, "router1").unwrap();
        tree
    }

    #[test]
    fn test_save_load_round_trip() {
        // GIVEN
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        let tree = sample_tree();
        let mut ms = Modstate::new();
        ms.push("sys", "urn:example:sys", canopy_core::Revision(20240115));

        // WHEN
        store.save("candidate", &tree, Some(&ms)).unwrap();
        let (loaded, loaded_ms) = store.load("candidate").unwrap();

        // THEN
        assert!(tree.deep_equal(&loaded));
        assert_eq!(loaded_ms, Some(ms));
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatastoreStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load("running"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_copy_carries_modstate() {
        // GIVEN
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        let mut ms = Modstate::new();
        ms.push("sys", "urn:example:sys", canopy_core::Revision(20240115));
        store.save("candidate", &sample_tree(), Some(&ms)).unwrap();

        // WHEN
        store.copy("candidate", "running").unwrap();

        // THEN
        let (tree, loaded_ms) = store.load("running").unwrap();
        assert!(tree.deep_equal(&sample_tree()));
        assert_eq!(loaded_ms, Some(ms));
    }

    #[test]
    fn test_reset_writes_empty_tree() {
        // GIVEN
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        store.save("running", &sample_tree(), None).unwrap();

        // WHEN
        store.reset("running", None).unwrap();

        // THEN
        let (tree, _) = store.load("running").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        store.save("tmp", &sample_tree(), None).unwrap();
        store.delete("tmp").unwrap();
        store.delete("tmp").unwrap();
        assert!(!store.exists("tmp"));
    }

    #[test]
    fn test_lock_semantics() {
        // GIVEN
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();

        // WHEN - session 1 locks, session 2 tries
        store.lock("running", 1).unwrap();
        let denied = store.lock("running", 2);

        // THEN
        assert!(matches!(denied, Err(StoreError::LockHeld { holder: 1, .. })));
        assert_eq!(store.locked_by("running"), 1);

        // Relocking by the holder is fine; unlocking by others is not.
        store.lock("running", 1).unwrap();
        assert!(matches!(
            store.unlock("running", 2),
            Err(StoreError::NotHolder { .. })
        ));
        store.unlock("running", 1).unwrap();
        assert_eq!(store.locked_by("running"), 0);
    }

    #[test]
    fn test_unlock_all_for_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        store.lock("running", 5).unwrap();
        store.lock("candidate", 5).unwrap();
        store.lock("startup", 6).unwrap();

        store.unlock_all(5);

        assert_eq!(store.locked_by("running"), 0);
        assert_eq!(store.locked_by("candidate"), 0);
        assert_eq!(store.locked_by("startup"), 6);
    }

    #[test]
    fn test_dirty_bit() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        assert!(!store.modified("candidate"));
        store.set_modified("candidate", true);
        assert!(store.modified("candidate"));
        store.set_modified("candidate", false);
        assert!(!store.modified("candidate"));
    }
}
