//! Schema documents and the registry of bundled table schemas.

mod document;
mod registry;

pub use document::{FieldConstraints, FieldSpec, FieldType, SchemaDoc};
pub use registry::TableKind;
