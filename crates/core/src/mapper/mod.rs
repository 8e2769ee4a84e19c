//! Mapping registered services onto directory entries.
//!
//! - [`schema`]: which physical attribute holds each field
//! - [`codec`]: policy objects embedded as JSON attribute values
//! - [`entry_mapper`]: the two conversions, service -> entry and entry -> service

pub mod codec;
pub mod entry_mapper;
pub mod schema;

pub use entry_mapper::ServiceMapper;
pub use schema::AttributeSchema;
