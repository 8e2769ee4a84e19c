//! Repository of registered services kept in a directory.
//!
//! [`ServiceRegistry`] combines a [`ServiceMapper`] with a
//! [`DirectoryStore`]: the mapper decides what an entry looks like, the
//! store decides how it gets to the directory.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::directory::DirectoryStore;
use crate::errors::{DirectoryError, MappingError};
use crate::mapper::ServiceMapper;
use crate::service::RegisteredService;

pub struct ServiceRegistry {
    mapper: ServiceMapper,
    store: Arc<dyn DirectoryStore>,
    base_dn: String,
}

impl ServiceRegistry {
    pub fn new(
        mapper: ServiceMapper,
        store: Arc<dyn DirectoryStore>,
        base_dn: impl Into<String>,
    ) -> Self {
        Self {
            mapper,
            store,
            base_dn: base_dn.into(),
        }
    }

    pub fn mapper(&self) -> &ServiceMapper {
        &self.mapper
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Persist `service`, assigning it an identifier first if it has none.
    /// Returns the identifier it was stored under.
    pub fn save(&self, service: &mut RegisteredService) -> Result<i64, DirectoryError> {
        let entry = self.mapper.to_entry(&self.base_dn, service)?;
        self.store.save(&entry)?;
        let id = service
            .id
            .ok_or_else(|| MappingError::UnassignedIdentifier(service.service_id.clone()))?;
        info!(id, dn = %entry.dn(), "saved registered service");
        Ok(id)
    }

    /// Load the service stored under `id`. `None` when no entry exists or
    /// the entry is not a service record.
    pub fn load_by_id(&self, id: i64) -> Result<Option<RegisteredService>, DirectoryError> {
        let dn = self.mapper.dn_for_id(&self.base_dn, id);
        let Some(entry) = self.store.load(&dn)? else {
            debug!(id, dn = %dn, "no entry for service");
            return Ok(None);
        };
        Ok(self.mapper.from_entry(&entry)?)
    }

    /// Every service under the base DN, ordered by evaluation order, then id.
    ///
    /// Entries that are not service records are skipped. A malformed service
    /// entry fails the whole call.
    pub fn load_all(&self) -> Result<Vec<RegisteredService>, DirectoryError> {
        let entries = self
            .store
            .search(&self.base_dn, self.mapper.schema().object_class())?;

        let mut services = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.mapper.from_entry(entry)? {
                Some(service) => services.push(service),
                None => warn!(dn = %entry.dn(), "skipping entry that is not a registered service"),
            }
        }
        services.sort_by_key(|s| (s.evaluation_order, s.id));
        debug!(count = services.len(), "loaded registered services");
        Ok(services)
    }

    /// The first enabled service, in evaluation order, whose pattern covers
    /// `service_url`.
    pub fn find_matching(&self, service_url: &str) -> Result<Option<RegisteredService>, DirectoryError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|s| s.enabled && s.matches(service_url)))
    }

    /// Delete the service stored under `id`. Returns `false` if none existed.
    pub fn delete(&self, id: i64) -> Result<bool, DirectoryError> {
        let dn = self.mapper.dn_for_id(&self.base_dn, id);
        let deleted = self.store.delete(&dn)?;
        if deleted {
            info!(id, dn = %dn, "deleted registered service");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryEntry, MemoryDirectory};
    use crate::mapper::AttributeSchema;
    use crate::service::ProxyPolicy;

    const BASE: &str = "ou=services,dc=example,dc=org";

    fn registry() -> (ServiceRegistry, Arc<MemoryDirectory>) {
        let store = Arc::new(MemoryDirectory::new());
        let mapper = ServiceMapper::new(AttributeSchema::default()).unwrap();
        (ServiceRegistry::new(mapper, store.clone(), BASE), store)
    }

    #[test]
    fn test_save_and_load() {
        let (registry, store) = registry();
        let mut svc = RegisteredService::regex(r"https://app\.example\.org/.*", "App");
        let id = registry.save(&mut svc).unwrap();
        assert_eq!(svc.id, Some(id));
        assert_eq!(store.len(), 1);

        let loaded = registry.load_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.name, "App");
        assert_eq!(loaded.proxy_policy, Some(ProxyPolicy::Refuse));
    }

    #[test]
    fn test_save_twice_updates_in_place() {
        let (registry, store) = registry();
        let mut svc = RegisteredService::regex("https://app", "App");
        let id = registry.save(&mut svc).unwrap();
        svc.name = "Renamed".into();
        assert_eq!(registry.save(&mut svc).unwrap(), id);
        assert_eq!(store.len(), 1);
        assert_eq!(registry.load_by_id(id).unwrap().unwrap().name, "Renamed");
    }

    #[test]
    fn test_load_missing() {
        let (registry, _) = registry();
        assert!(registry.load_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_load_all_orders_and_skips() {
        let (registry, store) = registry();
        let mut late = RegisteredService::regex("https://late", "Late");
        late.evaluation_order = 10;
        let mut early = RegisteredService::regex("https://early", "Early");
        early.evaluation_order = 1;
        registry.save(&mut late).unwrap();
        registry.save(&mut early).unwrap();

        store
            .save(
                &DirectoryEntry::new(format!("uid=9,{}", BASE))
                    .with_attribute("objectClass", ["top", "casRegisteredService"])
                    .with_attribute("uid", ["9"]),
            )
            .unwrap();

        let all = registry.load_all().unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Early", "Late"]);
    }

    #[test]
    fn test_find_matching_respects_order_and_enabled() {
        let (registry, _) = registry();
        let mut disabled = RegisteredService::regex("https://app/.*", "Disabled");
        disabled.enabled = false;
        let mut broad = RegisteredService::regex("https://.*", "Broad");
        broad.evaluation_order = 100;
        let mut narrow = RegisteredService::regex("https://app/.*", "Narrow");
        narrow.evaluation_order = 5;
        for svc in [&mut disabled, &mut broad, &mut narrow] {
            registry.save(svc).unwrap();
        }

        let found = registry.find_matching("https://app/home").unwrap().unwrap();
        assert_eq!(found.name, "Narrow");
        let found = registry.find_matching("https://other/home").unwrap().unwrap();
        assert_eq!(found.name, "Broad");
        assert!(registry.find_matching("ftp://app").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let (registry, _) = registry();
        let mut svc = RegisteredService::regex("https://app", "App");
        let id = registry.save(&mut svc).unwrap();
        assert!(registry.delete(id).unwrap());
        assert!(!registry.delete(id).unwrap());
        assert!(registry.load_by_id(id).unwrap().is_none());
    }

    #[test]
    fn test_malformed_entry_fails_load_all() {
        let (registry, store) = registry();
        store
            .save(
                &DirectoryEntry::new(format!("uid=3,{}", BASE))
                    .with_attribute("objectClass", ["top", "casRegisteredService"])
                    .with_attribute("uid", ["3"])
                    .with_attribute("casServiceUrlPattern", ["https://app"])
                    .with_attribute("casServiceProxyPolicy", ["{not json"]),
            )
            .unwrap();
        assert!(matches!(
            registry.load_all(),
            Err(DirectoryError::Mapping(_))
        ));
    }
}
