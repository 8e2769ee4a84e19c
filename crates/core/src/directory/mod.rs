//! Directory-side types: the entry model and the stores that hold entries.
//!
//! The mapper only ever produces and consumes [`DirectoryEntry`] values;
//! moving them to and from a real directory is the job of a
//! [`DirectoryStore`].

pub mod entry;
pub mod ldap;
pub mod store;

pub use entry::DirectoryEntry;
pub use ldap::LdapDirectory;
pub use store::{DirectoryStore, MemoryDirectory};
