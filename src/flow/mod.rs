//! Flow definitions: the data model, lookup index, static validation and
//! the in-process registry.

pub mod graph;
pub mod manager;
pub mod model;
pub mod validate;

pub use graph::FlowIndex;
pub use manager::FlowManager;
pub use model::*;
pub use validate::{Severity, ValidationIssue, ValidationReport, validate};
