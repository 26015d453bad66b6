//! Benchsync: validation and synchronization of tabular lab data into a LIMS.
//!
//! Benchsync ingests spreadsheet-like files describing media recipes, strain
//! lineages, fermentation physiology, plate screens and omics measurements,
//! validates each file against a declared schema plus domain cross-reference
//! checks, and pushes the normalized result into a remote laboratory
//! information system through a resource gateway.
//!
//! # Core principles
//!
//! - **Fail fast**: all validation and in-memory transformation happens when
//!   an uploader is constructed, before any remote call is attempted.
//! - **Sequential sync**: remote calls are strictly ordered (parents before
//!   children, experiments before phases before scalars).
//! - **Explicit caching**: identifier lookups run against an injected
//!   [`IdentifierCache`], never against the remote store per cell.
//!
//! # Example
//!
//! ```no_run
//! use benchsync::{MediaUploader, MediaOptions, Project};
//! use benchsync::gateway::MemoryGateway;
//!
//! let project = Project::new("DEM");
//! let content = std::fs::read("media.csv").unwrap();
//! let uploader = MediaUploader::from_content(&project, &content, MediaOptions::default()).unwrap();
//!
//! let gateway = MemoryGateway::new();
//! uploader.upload(&gateway).unwrap();
//! ```

pub mod cache;
pub mod error;
pub mod gateway;
pub mod genotype;
pub mod input;
pub mod measurement;
pub mod schema;
pub mod upload;
pub mod validation;
pub mod vocab;

pub use cache::{CacheView, IdentifierCache, RefreshScope};
pub use error::{BenchsyncError, Result};
pub use gateway::{EntityType, Filter, Gateway, Project, Record, XrefKind};
pub use input::{DataTable, Parser, SourceMetadata};
pub use measurement::{measurement_test, TestDescriptor};
pub use schema::{FieldType, SchemaDoc, TableKind};
pub use upload::{
    FermentationOptions, FermentationUploader, MediaOptions, MediaUploader, ScreenOptions,
    ScreenUploader, StrainsUploader, Uploader, XrefMeasurementUploader, XrefOptions,
};
pub use validation::{Issue, ValidationReport};
pub use vocab::{chebi_mapper, identity_mapper, CompoundName, SynonymMapper, COMPOUND_SKIP};
