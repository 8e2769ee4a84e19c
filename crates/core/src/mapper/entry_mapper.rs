//! Conversion between [`RegisteredService`] values and directory entries.

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::codec;
use super::schema::AttributeSchema;
use crate::directory::entry::{bool_token, OBJECT_CLASS_ATTRIBUTE};
use crate::directory::DirectoryEntry;
use crate::errors::MappingError;
use crate::service::{resolver, Policy, RegisteredService};

/// Object class every service entry carries alongside the configured one.
const TOP_OBJECT_CLASS: &str = "top";

/// Maps registered services to directory entries and back.
///
/// Holds nothing but a validated [`AttributeSchema`], so one mapper can be
/// shared freely between threads.
#[derive(Debug, Clone)]
pub struct ServiceMapper {
    schema: AttributeSchema,
}

impl ServiceMapper {
    /// Validate `schema` and build a mapper around it.
    pub fn new(schema: AttributeSchema) -> Result<Self, MappingError> {
        schema.validate()?;
        info!(
            object_class = %schema.object_class(),
            id_attribute = %schema.id_attribute(),
            "service mapper ready"
        );
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// DN of the service with identifier `id` under `parent_dn`.
    pub fn dn_for_id(&self, parent_dn: &str, id: i64) -> String {
        format!("{}={},{}", self.schema.id_attribute(), id, parent_dn)
    }

    /// DN of an already-identified service.
    pub fn dn_for(&self, parent_dn: &str, service: &RegisteredService) -> Result<String, MappingError> {
        let id = service
            .id
            .ok_or_else(|| MappingError::UnassignedIdentifier(service.service_id.clone()))?;
        Ok(self.dn_for_id(parent_dn, id))
    }

    /// Build the directory entry for `service` under `parent_dn`.
    ///
    /// A service without an identifier is given one here, and the caller's
    /// value is updated to carry it. Blank text fields are normalized on the
    /// caller's value too (an all-whitespace name or description becomes
    /// empty, a blank theme becomes `None`), since they are not written.
    /// Missing policies are written as their defaults; the caller's value
    /// keeps `None` for those.
    ///
    /// The variant is not stored: it is resolved again from the pattern on
    /// read. A service whose pattern resolves to another variant is refused.
    pub fn to_entry(
        &self,
        parent_dn: &str,
        service: &mut RegisteredService,
    ) -> Result<DirectoryEntry, MappingError> {
        let resolved = resolver::resolve(&service.service_id);
        if resolved != Some(service.variant) {
            return Err(MappingError::VariantMismatch {
                service_id: service.service_id.clone(),
                declared: service.variant,
                resolved: resolved
                    .map(|v| v.label().to_string())
                    .unwrap_or_else(|| "nothing".to_string()),
            });
        }
        normalize_blank_fields(service);

        let id = service.ensure_id();
        let dn = self.dn_for_id(parent_dn, id);
        debug!(dn = %dn, "creating entry");

        let s = &self.schema;
        let mut entry = DirectoryEntry::new(dn);
        entry.insert(s.id_attribute(), [id.to_string()]);
        entry.insert(s.service_id_attribute(), [service.service_id.as_str()]);
        insert_non_blank(&mut entry, s.service_name_attribute(), &service.name);
        insert_non_blank(&mut entry, s.service_description_attribute(), &service.description);
        entry.insert(s.service_enabled_attribute(), [bool_token(service.enabled)]);
        entry.insert(s.service_sso_enabled_attribute(), [bool_token(service.sso_enabled)]);
        entry.insert(
            s.evaluation_order_attribute(),
            [service.evaluation_order.to_string()],
        );
        if let Some(ref theme) = service.theme {
            insert_non_blank(&mut entry, s.service_theme_attribute(), theme);
        }

        embed_or_default(
            &mut entry,
            service.attribute_release_policy.as_ref(),
            s.attribute_release_policy_attribute(),
        )?;
        embed_or_default(
            &mut entry,
            service.proxy_policy.as_ref(),
            s.service_proxy_policy_attribute(),
        )?;
        embed_or_default(
            &mut entry,
            service.username_attribute_provider.as_ref(),
            s.username_attribute_provider_attribute(),
        )?;

        if !service.required_handlers.is_empty() {
            entry.insert(
                s.required_handlers_attribute(),
                service.required_handlers.iter().cloned(),
            );
        }

        entry.insert(OBJECT_CLASS_ATTRIBUTE, [TOP_OBJECT_CLASS, s.object_class()]);
        Ok(entry)
    }

    /// Rebuild a service from `entry`.
    ///
    /// Returns `None` when the entry is not a service record: it has no
    /// service pattern, or the pattern resolves to no variant. Policies that
    /// are absent stay `None`.
    pub fn from_entry(&self, entry: &DirectoryEntry) -> Result<Option<RegisteredService>, MappingError> {
        let s = &self.schema;

        let Some(pattern) = entry.get_string(s.service_id_attribute()) else {
            debug!(dn = %entry.dn(), "entry has no service pattern");
            return Ok(None);
        };
        let Some(variant) = resolver::resolve(pattern) else {
            debug!(dn = %entry.dn(), pattern, "unresolved service pattern, skipping entry");
            return Ok(None);
        };

        let id = match entry.get_i64(s.id_attribute()) {
            Some(id) => id,
            None => {
                let id = id_from_dn(entry.dn());
                warn!(
                    dn = %entry.dn(),
                    attribute = %s.id_attribute(),
                    id,
                    "identifier missing or unparsable, derived one from the DN"
                );
                id
            }
        };

        let mut service = RegisteredService::new(
            variant,
            pattern,
            entry.get_string(s.service_name_attribute()).unwrap_or_default(),
        );
        service.id = Some(id);
        service.description = entry
            .get_string(s.service_description_attribute())
            .unwrap_or_default()
            .to_string();
        service.enabled = entry.get_bool(s.service_enabled_attribute());
        service.sso_enabled = entry.get_bool(s.service_sso_enabled_attribute());
        service.theme = entry.get_string(s.service_theme_attribute()).map(str::to_string);
        service.evaluation_order = entry
            .get_i64(s.evaluation_order_attribute())
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or_default();
        service.required_handlers = entry
            .get_all(s.required_handlers_attribute())
            .into_iter()
            .collect();

        service.username_attribute_provider =
            codec::extract(entry, s.username_attribute_provider_attribute())?;
        service.attribute_release_policy =
            codec::extract(entry, s.attribute_release_policy_attribute())?;
        service.proxy_policy = codec::extract(entry, s.service_proxy_policy_attribute())?;

        Ok(Some(service))
    }
}

fn normalize_blank_fields(service: &mut RegisteredService) {
    if service.name.trim().is_empty() {
        service.name.clear();
    }
    if service.description.trim().is_empty() {
        service.description.clear();
    }
    if service.theme.as_deref().is_some_and(|t| t.trim().is_empty()) {
        service.theme = None;
    }
}

fn insert_non_blank(entry: &mut DirectoryEntry, attribute: &str, value: &str) {
    if !value.trim().is_empty() {
        entry.insert(attribute, [value]);
    }
}

fn embed_or_default<P: Policy + Default>(
    entry: &mut DirectoryEntry,
    policy: Option<&P>,
    attribute: &str,
) -> Result<(), MappingError> {
    match policy {
        Some(policy) => codec::embed(entry, policy, attribute),
        None => codec::embed(entry, &P::default(), attribute),
    }
}

/// Stable, non-negative identifier derived from a DN. Lossy: distinct DNs can
/// collide, so this is only a recovery path for damaged entries.
fn id_from_dn(dn: &str) -> i64 {
    let digest = Sha256::digest(dn.to_ascii_lowercase().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) >> 1) as i64
}
