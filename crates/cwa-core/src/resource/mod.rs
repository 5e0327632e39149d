//! Hypermedia resources and their normalized, categorized store state.

pub mod diff;
pub mod iri;
pub mod model;
pub mod state;

pub use diff::DiffExclusions;
pub use iri::{endpoint_iri, iri_id, iri_prefix, validate_iri, Category};
pub use model::{
    Resource, ResourceType, COMPONENT_GROUP, COMPONENT_POSITION, LAYOUT, PAGE, ROUTE,
};
pub use state::{ResourceState, SetOutcome, SetResourceOptions, TypePartition};
