//! Error types for the svcreg core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::service::ServiceVariant;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Mapping errors
// ---------------------------------------------------------------------------

/// Errors raised while converting between services and directory entries.
///
/// All variants are fatal for the call that produced them: no partial entry
/// or service is ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A physical attribute name in the schema is blank or clashes with
    /// another field.
    #[error("attribute schema misconfigured for '{field}': {detail}")]
    SchemaMisconfiguration {
        field: String,
        detail: String,
    },

    /// A policy object could not be encoded as JSON.
    #[error("failed to serialize {kind} into attribute '{attribute}': {source}")]
    PolicySerialization {
        kind: &'static str,
        attribute: String,
        #[source]
        source: serde_json::Error,
    },

    /// An embedded policy document is malformed or carries an unknown `@type`.
    #[error("failed to deserialize {kind} from attribute '{attribute}': {source}")]
    PolicyDeserialization {
        kind: &'static str,
        attribute: String,
        #[source]
        source: serde_json::Error,
    },

    /// A DN was requested for a service that has no identifier yet.
    #[error("registered service '{0}' has no identifier assigned")]
    UnassignedIdentifier(String),

    /// The service pattern would be read back as a different variant than
    /// the one the service declares.
    #[error("service pattern '{service_id}' is declared {declared} but resolves to {resolved}")]
    VariantMismatch {
        service_id: String,
        declared: ServiceVariant,
        resolved: String,
    },
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from directory store implementations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport-level failure from the LDAP client.
    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    /// The server answered with a non-success result code.
    #[error("directory operation on '{dn}' failed (rc {rc}): {detail}")]
    OperationFailed {
        dn: String,
        rc: u32,
        detail: String,
    },

    /// An internal lock was poisoned by a panicking thread.
    #[error("directory lock poisoned: {0}")]
    LockPoisoned(String),

    /// The entry could not be mapped to or from a service.
    #[error("directory mapping error: {0}")]
    Mapping(#[from] MappingError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// The `[schema]` table failed validation.
    #[error("configuration schema error: {0}")]
    Schema(#[from] MappingError),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
