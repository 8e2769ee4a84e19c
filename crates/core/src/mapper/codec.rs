//! Embedding policy objects as JSON documents in single directory attributes.

use tracing::debug;

use crate::directory::DirectoryEntry;
use crate::errors::MappingError;
use crate::service::Policy;

/// Serialize `policy` into the single value of `attribute`. A policy that
/// could not be read back is refused.
pub fn embed<P: Policy>(
    entry: &mut DirectoryEntry,
    policy: &P,
    attribute: &str,
) -> Result<(), MappingError> {
    policy
        .validate()
        .map_err(|detail| MappingError::PolicySerialization {
            kind: P::KIND,
            attribute: attribute.to_string(),
            source: <serde_json::Error as serde::ser::Error>::custom(detail),
        })?;
    let json = serde_json::to_string(policy).map_err(|source| {
        MappingError::PolicySerialization {
            kind: P::KIND,
            attribute: attribute.to_string(),
            source,
        }
    })?;
    debug!(attribute, kind = P::KIND, "embedding policy document");
    entry.insert(attribute, [json]);
    Ok(())
}

/// Parse the policy stored in `attribute`.
///
/// Absent or blank values yield `None`. A document that is not valid JSON,
/// lacks `@type`, names a variant this build does not know, or carries a
/// value the policy cannot enforce is an error: silently skipping it could
/// widen or narrow what the service is granted.
pub fn extract<P: Policy>(
    entry: &DirectoryEntry,
    attribute: &str,
) -> Result<Option<P>, MappingError> {
    let data = match entry.get_string(attribute) {
        Some(data) if !data.trim().is_empty() => data,
        _ => return Ok(None),
    };

    let deserialization_error = |source: serde_json::Error| MappingError::PolicyDeserialization {
        kind: P::KIND,
        attribute: attribute.to_string(),
        source,
    };
    let policy: P = serde_json::from_str(data).map_err(deserialization_error)?;
    policy.validate().map_err(|detail| {
        deserialization_error(<serde_json::Error as serde::de::Error>::custom(detail))
    })?;
    Ok(Some(policy))
}
