//! svcreg core library.
//!
//! Maps the registered services of an authentication gateway onto entries of
//! an LDAP-style directory and back: the attribute schema, the embedded
//! policy codec, service-variant resolution, the entry mapper itself, and a
//! small repository over pluggable directory stores.

pub mod config;
pub mod directory;
pub mod errors;
pub mod mapper;
pub mod registry;
pub mod service;

// Re-exports for convenience.
pub use config::AppConfig;
pub use directory::{DirectoryEntry, DirectoryStore, LdapDirectory, MemoryDirectory};
pub use mapper::{AttributeSchema, ServiceMapper};
pub use registry::ServiceRegistry;
pub use service::RegisteredService;
