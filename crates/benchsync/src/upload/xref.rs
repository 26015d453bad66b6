//! Cross-reference measurement uploader: fluxes and protein abundances.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{BenchsyncError, Result};
use crate::gateway::{
    EntityType, Filter, Gateway, GatewayError, Project, Record, XrefKind, XrefMeasurements,
};
use crate::input::{load_table, DataTable};
use crate::schema::TableKind;
use crate::validation::RowCheck;

use super::experiment::{condition_value, get_or_create_phase, ExperimentRow, ExperimentSync};
use super::parse_number;

const EXPERIMENT_KEYS: [&str; 5] = ["project", "experiment", "description", "date", "temperature"];

/// Configuration for [`XrefMeasurementUploader`].
pub struct XrefOptions {
    /// Subject kind of the accessions; selects the schema (fluxes for
    /// reactions, protein abundances for proteins).
    pub subject: XrefKind,
    /// Archive and recreate an existing experiment whose date differs.
    pub overwrite: bool,
    /// Additional semantic row checks.
    pub checks: Vec<Box<dyn RowCheck>>,
}

impl XrefOptions {
    pub fn for_subject(subject: XrefKind) -> Self {
        Self {
            subject,
            overwrite: true,
            checks: Vec::new(),
        }
    }
}

/// One measurement keyed by its external accession.
#[derive(Debug, Clone)]
struct XrefRow {
    experiment: String,
    sample_name: String,
    strain: String,
    medium: String,
    phase_start: f64,
    phase_end: f64,
    db_name: String,
    accession: String,
    mode: String,
    value: f64,
}

/// Uploads measurements attached to entities defined in external databases,
/// e.g. reaction fluxes or protein abundances.
#[derive(Debug)]
pub struct XrefMeasurementUploader {
    project: Project,
    subject: XrefKind,
    sync: ExperimentSync,
    rows: Vec<XrefRow>,
}

impl XrefMeasurementUploader {
    /// Validate and transform fluxes or protein abundances CSV content.
    pub fn from_content(
        project: &Project,
        content: &[u8],
        options: XrefOptions,
    ) -> Result<Self> {
        let kind = match options.subject {
            XrefKind::Reaction => TableKind::Fluxes,
            XrefKind::Protein => TableKind::ProteinAbundances,
        };
        let table = load_table(content, &kind.schema()?, &options.checks)?;

        let mut rows = Vec::new();
        for index in 0..table.row_count() {
            let cell = |column: &str| table.value(index, column).unwrap_or("").trim().to_string();

            let Some(value) = parse_number(&cell("value")) else {
                continue;
            };
            let phase_start = parse_number(&cell("phase_start")).ok_or_else(|| {
                BenchsyncError::AmbiguousData(format!("row {index} has no phase_start"))
            })?;
            let phase_end = parse_number(&cell("phase_end")).ok_or_else(|| {
                BenchsyncError::AmbiguousData(format!("row {index} has no phase_end"))
            })?;
            let xref_id = cell("xref_id");
            let (db_name, accession) = xref_id.split_once(':').ok_or_else(|| {
                BenchsyncError::AmbiguousData(format!(
                    "xref id {xref_id} is not of the form db:accession"
                ))
            })?;

            rows.push(XrefRow {
                experiment: cell("experiment"),
                sample_name: cell("sample_name"),
                strain: cell("strain"),
                medium: cell("medium"),
                phase_start,
                phase_end,
                db_name: db_name.to_string(),
                accession: accession.to_string(),
                mode: cell("mode"),
                value,
            });
        }

        // Each (sample, phase) grouping becomes one submission and can only
        // carry one mode and one source database.
        for group in group_measurements(&rows).values() {
            let modes: std::collections::HashSet<&str> =
                group.iter().map(|row| row.mode.as_str()).collect();
            let dbs: std::collections::HashSet<&str> =
                group.iter().map(|row| row.db_name.as_str()).collect();
            if modes.len() > 1 || dbs.len() > 1 {
                return Err(BenchsyncError::AmbiguousData(
                    "multiple mode/db_names in upload not supported".to_string(),
                ));
            }
        }

        let sync = ExperimentSync {
            experiment_type: "fermentation",
            overwrite: options.overwrite,
            experiments: experiment_rows(project, &table)?,
        };

        Ok(Self {
            project: project.clone(),
            subject: options.subject,
            sync,
            rows,
        })
    }

    /// Number of accession measurements prepared for upload.
    pub fn measurement_count(&self) -> usize {
        self.rows.len()
    }

    /// Sync experiments, ensure samples exist, then submit each grouping.
    pub fn upload(&self, gateway: &dyn Gateway) -> Result<()> {
        self.sync.sync(gateway, &self.project)?;
        self.upload_sample_info(gateway)?;
        self.upload_measurements(gateway)
    }

    fn experiment_record(&self, gateway: &dyn Gateway, identifier: &str) -> Result<Record> {
        Ok(gateway.one(
            EntityType::Experiment,
            &Filter::new()
                .field("identifier", identifier)
                .field("project", self.project.code.as_str()),
        )?)
    }

    fn upload_sample_info(&self, gateway: &dyn Gateway) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for row in &self.rows {
            if !seen.insert((row.experiment.as_str(), row.sample_name.as_str())) {
                continue;
            }
            let experiment = self.experiment_record(gateway, &row.experiment)?;
            let filter = Filter::new()
                .field("name", row.sample_name.as_str())
                .field("experiment", experiment.id.as_str());
            match gateway.one(EntityType::Sample, &filter) {
                Ok(_) => continue,
                Err(GatewayError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }

            info!(sample = %row.sample_name, "creating new sample");
            let medium = gateway.one(
                EntityType::Medium,
                &Filter::new().field("name", row.medium.as_str()),
            )?;
            let strain = gateway.one(
                EntityType::Strain,
                &Filter::new()
                    .field("alias", row.strain.as_str())
                    .field("project", self.project.code.as_str()),
            )?;
            gateway.create(
                EntityType::Sample,
                json!({
                    "experiment": experiment.id,
                    "project": self.project.code,
                    "name": row.sample_name,
                    "medium": medium.id,
                    "strain": strain.id,
                }),
            )?;
        }
        Ok(())
    }

    fn upload_measurements(&self, gateway: &dyn Gateway) -> Result<()> {
        for (key, group) in group_measurements(&self.rows) {
            let (sample_name, _, _) = key;
            let first = group[0];
            let experiment = self.experiment_record(gateway, &first.experiment)?;
            let sample = gateway.one(
                EntityType::Sample,
                &Filter::new()
                    .field("name", sample_name)
                    .field("experiment", experiment.id.as_str()),
            )?;
            let phase =
                get_or_create_phase(gateway, &experiment, first.phase_start, first.phase_end)?;

            gateway.add_xref_measurements(
                &sample,
                &XrefMeasurements {
                    phase: phase.id,
                    subject: self.subject,
                    values: group.iter().map(|row| row.value).collect(),
                    accessions: group.iter().map(|row| row.accession.clone()).collect(),
                    db_name: first.db_name.clone(),
                    mode: first.mode.clone(),
                },
            )?;
        }
        Ok(())
    }
}

type GroupKey<'a> = (&'a str, String, String);

/// Group rows by `(sample_name, phase_start, phase_end)`, preserving the
/// order groupings first appear in the file.
fn group_measurements(rows: &[XrefRow]) -> IndexMap<GroupKey<'_>, Vec<&XrefRow>> {
    let mut grouped: IndexMap<GroupKey<'_>, Vec<&XrefRow>> = IndexMap::new();
    for row in rows {
        let key = (
            row.sample_name.as_str(),
            row.phase_start.to_string(),
            row.phase_end.to_string(),
        );
        grouped.entry(key).or_default().push(row);
    }
    grouped
}

/// One [`ExperimentRow`] per distinct experiment in the table.
fn experiment_rows(project: &Project, table: &DataTable) -> Result<Vec<ExperimentRow>> {
    let mut by_experiment: IndexMap<String, usize> = IndexMap::new();
    for index in 0..table.row_count() {
        let identifier = table.value(index, "experiment").unwrap_or("").trim().to_string();
        by_experiment.entry(identifier).or_insert(index);
    }

    let mut experiments = Vec::with_capacity(by_experiment.len());
    for (identifier, first) in by_experiment {
        let cell = |column: &str| table.value(first, column).unwrap_or("").trim().to_string();

        let mut conditions = IndexMap::new();
        conditions.insert("project".to_string(), Value::String(project.code.clone()));
        for key in EXPERIMENT_KEYS.iter().skip(1) {
            if let Some(value) = condition_value(&cell(key)) {
                conditions.insert((*key).to_string(), value);
            }
        }

        let temperature = parse_number(&cell("temperature")).ok_or_else(|| {
            BenchsyncError::AmbiguousData(format!(
                "experiment {identifier} has a non-numeric temperature"
            ))
        })?;

        experiments.push(ExperimentRow {
            identifier,
            date: cell("date"),
            description: cell("description"),
            temperature,
            conditions,
            operation: IndexMap::new(),
        });
    }
    Ok(experiments)
}
