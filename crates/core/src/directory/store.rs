//! The narrow interface through which registered-service entries reach a
//! directory, plus an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use super::entry::{DirectoryEntry, OBJECT_CLASS_ATTRIBUTE};
use crate::errors::DirectoryError;

/// Storage backend for directory entries.
///
/// Implementations own transport, pooling and retries. Callers only deal in
/// whole [`DirectoryEntry`] values.
pub trait DirectoryStore: Send + Sync {
    /// Fetch the entry with exactly this DN.
    fn load(&self, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError>;

    /// All entries under `base_dn` carrying `object_class`.
    fn search(&self, base_dn: &str, object_class: &str)
        -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Add the entry, or replace every attribute of an existing one.
    fn save(&self, entry: &DirectoryEntry) -> Result<(), DirectoryError>;

    /// Delete the entry. Returns `false` if nothing existed at `dn`.
    fn delete(&self, dn: &str) -> Result<bool, DirectoryError>;
}

/// Thread-safe directory held entirely in memory, keyed by normalized DN.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: RwLock<BTreeMap<String, DirectoryEntry>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// DNs compare case-insensitively and ignore spaces around separators.
fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| rdn.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

fn is_under(dn: &str, base_dn: &str) -> bool {
    let dn = normalize_dn(dn);
    let base = normalize_dn(base_dn);
    base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base))
}

fn has_object_class(entry: &DirectoryEntry, object_class: &str) -> bool {
    entry
        .values(OBJECT_CLASS_ATTRIBUTE)
        .map(|classes| classes.iter().any(|c| c.eq_ignore_ascii_case(object_class)))
        .unwrap_or(false)
}

impl DirectoryStore for MemoryDirectory {
    fn load(&self, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DirectoryError::LockPoisoned("memory directory".into()))?;
        Ok(entries.get(&normalize_dn(dn)).cloned())
    }

    fn search(
        &self,
        base_dn: &str,
        object_class: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DirectoryError::LockPoisoned("memory directory".into()))?;
        let found: Vec<DirectoryEntry> = entries
            .values()
            .filter(|e| is_under(e.dn(), base_dn) && has_object_class(e, object_class))
            .cloned()
            .collect();
        debug!(base_dn, object_class, count = found.len(), "memory search");
        Ok(found)
    }

    fn save(&self, entry: &DirectoryEntry) -> Result<(), DirectoryError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DirectoryError::LockPoisoned("memory directory".into()))?;
        entries.insert(normalize_dn(entry.dn()), entry.clone());
        Ok(())
    }

    fn delete(&self, dn: &str) -> Result<bool, DirectoryError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DirectoryError::LockPoisoned("memory directory".into()))?;
        Ok(entries.remove(&normalize_dn(dn)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_entry(dn: &str) -> DirectoryEntry {
        DirectoryEntry::new(dn).with_attribute("objectClass", ["top", "casRegisteredService"])
    }

    #[test]
    fn test_save_and_load_normalizes_dn() {
        let store = MemoryDirectory::new();
        store
            .save(&service_entry("uid=1,ou=Services,dc=example,dc=org"))
            .unwrap();

        let loaded = store.load("UID=1, ou=services, dc=example, dc=org").unwrap();
        assert!(loaded.is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_replaces_entry() {
        let store = MemoryDirectory::new();
        store.save(&service_entry("uid=1,ou=s")).unwrap();
        store
            .save(&service_entry("uid=1,ou=s").with_attribute("cn", ["New"]))
            .unwrap();
        assert_eq!(store.len(), 1);
        let loaded = store.load("uid=1,ou=s").unwrap().unwrap();
        assert_eq!(loaded.get_string("cn"), Some("New"));
    }

    #[test]
    fn test_search_filters_base_and_class() {
        let store = MemoryDirectory::new();
        store.save(&service_entry("uid=1,ou=services,dc=org")).unwrap();
        store.save(&service_entry("uid=2,ou=other,dc=org")).unwrap();
        store
            .save(&DirectoryEntry::new("uid=3,ou=services,dc=org").with_attribute("objectClass", ["person"]))
            .unwrap();

        let found = store
            .search("ou=services,dc=org", "casregisteredservice")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn(), "uid=1,ou=services,dc=org");
    }

    #[test]
    fn test_delete() {
        let store = MemoryDirectory::new();
        store.save(&service_entry("uid=1,ou=s")).unwrap();
        assert!(store.delete("uid=1,ou=s").unwrap());
        assert!(!store.delete("uid=1,ou=s").unwrap());
        assert!(store.is_empty());
    }
}
