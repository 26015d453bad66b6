//! Remote entity gateway: the interface the core needs from the LIMS.
//!
//! The LIMS is the system of record; the core only requests and relays
//! opaque record handles, it never owns remote state.

mod http;
mod mock;

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::measurement::TestDescriptor;

pub use http::HttpGateway;
pub use mock::MemoryGateway;

/// Remote entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Medium,
    Strain,
    Pool,
    Experiment,
    ExperimentPhase,
    Plate,
    Sample,
    ChemicalEntity,
    Xref,
}

impl EntityType {
    /// Resource route segment for the REST gateway.
    pub fn resource(&self) -> &'static str {
        match self {
            EntityType::Project => "projects",
            EntityType::Medium => "media",
            EntityType::Strain => "strains",
            EntityType::Pool => "pools",
            EntityType::Experiment => "experiments",
            EntityType::ExperimentPhase => "experiment-phases",
            EntityType::Plate => "plates",
            EntityType::Sample => "samples",
            EntityType::ChemicalEntity => "chemical-entities",
            EntityType::Xref => "xrefs",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

/// External cross-reference subject kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XrefKind {
    Protein,
    Reaction,
}

impl XrefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            XrefKind::Protein => "protein",
            XrefKind::Reaction => "reaction",
        }
    }
}

/// A resolved project handle. The HTTP front end resolves the project code
/// before the core runs; filters are scoped with the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project code, e.g. `DEM`.
    pub code: String,
}

impl Project {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// An opaque handle to a remote record, obtained by query or creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Remote identifier.
    pub id: String,
    /// Entity type of the record.
    pub entity: EntityType,
    /// Remote field values, as returned by the gateway.
    pub fields: Value,
}

impl Record {
    /// Get a string field, if present.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Get a numeric field, if present.
    pub fn number_field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }
}

/// An equality filter over remote field values, in insertion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter(pub IndexMap<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Check whether a record's fields satisfy every condition.
    pub fn matches(&self, fields: &Value) -> bool {
        self.0
            .iter()
            .all(|(name, expected)| fields.get(name) == Some(expected))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// One scalar measurement batch entry submitted with `add_samples`.
#[derive(Debug, Clone, Serialize)]
pub struct Scalar {
    /// Test descriptor the measurements belong to.
    pub test: TestDescriptor,
    /// Measured values keyed by sample key (reactor or sample id).
    pub measurements: IndexMap<String, Vec<f64>>,
    /// Phase record id, when the measurement is phase-bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Full `{samples, scalars}` payload for one experiment.
#[derive(Debug, Clone, Serialize)]
pub struct SampleBatch {
    /// Per-sample description keyed by sample key.
    pub samples: IndexMap<String, Value>,
    /// Scalar measurement batches.
    pub scalars: Vec<Scalar>,
}

/// One `add_xref_measurements` submission for a sample.
#[derive(Debug, Clone, Serialize)]
pub struct XrefMeasurements {
    /// Phase record id.
    pub phase: String,
    /// Subject kind of the accessions.
    #[serde(rename = "type")]
    pub subject: XrefKind,
    /// Measured values, index-aligned with `accessions`.
    pub values: Vec<f64>,
    /// External accessions.
    pub accessions: Vec<String>,
    /// Shared source database name.
    pub db_name: String,
    /// Shared measurement mode.
    pub mode: String,
}

/// Gateway-level errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Zero matches for a `first`/`one` lookup.
    #[error("{entity} not found ({detail})")]
    NotFound { entity: EntityType, detail: String },

    /// More than one match for a strict `one` lookup.
    #[error("expected one {entity}, found {count}")]
    Ambiguous { entity: EntityType, count: usize },

    /// Remote rejected the request.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Network/protocol failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Interface to the remote LIMS consumed by the core.
///
/// `first` and `one` are derived from `query`; implementations only supply
/// the primitive operations. Timeouts and retries are the implementation's
/// concern; the core treats any failure as terminal for the current upload.
pub trait Gateway {
    /// Return all records of the given type matching the filter.
    fn query(&self, entity: EntityType, filter: &Filter) -> GatewayResult<Vec<Record>>;

    /// Create a record with the given fields.
    fn create(&self, entity: EntityType, fields: Value) -> GatewayResult<Record>;

    /// Replace a record's contents (medium ingredients, plate wells).
    fn update_contents(&self, record: &Record, contents: Value) -> GatewayResult<()>;

    /// Archive a record, removing it from active lookups.
    fn archive(&self, record: &Record) -> GatewayResult<()>;

    /// Submit a full sample/scalar payload for an experiment.
    fn add_samples(&self, experiment: &Record, batch: &SampleBatch) -> GatewayResult<()>;

    /// Submit cross-reference measurements for a sample.
    fn add_xref_measurements(
        &self,
        sample: &Record,
        measurements: &XrefMeasurements,
    ) -> GatewayResult<()>;

    /// Return the set of known accessions for a cross-reference kind.
    fn subset(&self, kind: XrefKind) -> GatewayResult<HashSet<String>>;

    /// Return the first record matching the filter, or `NotFound`.
    fn first(&self, entity: EntityType, filter: &Filter) -> GatewayResult<Record> {
        self.query(entity, filter)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound {
                entity,
                detail: filter.to_string(),
            })
    }

    /// Return the single record matching the filter; `NotFound` on zero
    /// matches, `Ambiguous` on more than one.
    fn one(&self, entity: EntityType, filter: &Filter) -> GatewayResult<Record> {
        let mut records = self.query(entity, filter)?;
        match records.len() {
            0 => Err(GatewayError::NotFound {
                entity,
                detail: filter.to_string(),
            }),
            1 => Ok(records.remove(0)),
            count => Err(GatewayError::Ambiguous { entity, count }),
        }
    }
}
