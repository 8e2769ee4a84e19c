//! The registered-service domain model: the entity, its policies, and the
//! heuristic that picks a variant from a service pattern.

pub mod policy;
pub mod registered;
pub mod resolver;

pub use policy::{AttributeReleasePolicy, Policy, ProxyPolicy, UsernameAttributeProvider};
pub use registered::RegisteredService;
pub use resolver::ServiceVariant;
