//! Plate screening uploader.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{BenchsyncError, Result};
use crate::gateway::{EntityType, Filter, Gateway, GatewayError, Project, SampleBatch, Scalar};
use crate::input::{load_table, DataTable};
use crate::measurement::measurement_test;
use crate::schema::TableKind;
use crate::validation::RowCheck;
use crate::vocab::{identity_mapper, SynonymMapper};

use super::experiment::{condition_value, ExperimentRow, ExperimentSync};
use super::{parse_number, resolve_compound};

const EXPERIMENT_KEYS: [&str; 5] = ["project", "experiment", "description", "date", "temperature"];

/// Configuration for [`ScreenUploader`].
pub struct ScreenOptions {
    /// Archive and recreate an existing experiment whose date differs.
    pub overwrite: bool,
    /// Compound synonym resolver applied to the ratio compound columns.
    pub synonym_mapper: SynonymMapper,
    /// Additional semantic row checks.
    pub checks: Vec<Box<dyn RowCheck>>,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            synonym_mapper: identity_mapper(),
            checks: Vec::new(),
        }
    }
}

/// One screen well measurement with its derived identifiers.
#[derive(Debug, Clone)]
struct WellRow {
    experiment: String,
    barcode: String,
    well: String,
    sample_id: String,
    strain: String,
    medium: String,
    plate_model: String,
    quantity: String,
    parameter: String,
    numerator_chebi: Option<String>,
    denominator_chebi: Option<String>,
    unit: String,
    test_id: String,
    value: f64,
}

/// Uploads plate screen measurements.
///
/// Derived identifiers follow the plate layout:
/// `barcode = {project}_{experiment}_{plate_name}`, `well = {row}{column}`,
/// `sample_id = {barcode}_{well}`. Rows without a measured value are
/// dropped. Plates are created on first sight and have their contents
/// replaced on every later upload.
#[derive(Debug)]
pub struct ScreenUploader {
    project: Project,
    sync: ExperimentSync,
    rows: Vec<WellRow>,
}

impl ScreenUploader {
    /// Validate and transform screen CSV content.
    pub fn from_content(
        project: &Project,
        content: &[u8],
        options: ScreenOptions,
    ) -> Result<Self> {
        let schema = TableKind::Screen.schema()?;
        let table = load_table(content, &schema, &options.checks)?;

        let mut rows = Vec::new();
        for index in 0..table.row_count() {
            let cell = |column: &str| table.value(index, column).unwrap_or("").trim().to_string();

            let Some(value) = parse_number(&cell("value")) else {
                continue;
            };
            let experiment = cell("experiment");
            let barcode = format!("{}_{}_{}", project.code, experiment, cell("plate_name"));
            let well = format!("{}{}", cell("row"), cell("column"));
            let numerator_chebi = resolve_compound(
                &options.synonym_mapper,
                &cell("numerator_compound_name"),
            )?;
            let denominator_chebi = resolve_compound(
                &options.synonym_mapper,
                &cell("denominator_compound_name"),
            )?;
            let test_id = [
                cell("unit"),
                cell("parameter"),
                numerator_chebi.clone().unwrap_or_else(|| "nan".to_string()),
                denominator_chebi.clone().unwrap_or_else(|| "nan".to_string()),
            ]
            .join("_");

            rows.push(WellRow {
                sample_id: format!("{barcode}_{well}"),
                experiment,
                barcode,
                well,
                strain: cell("strain"),
                medium: cell("medium"),
                plate_model: cell("plate_model"),
                quantity: cell("quantity"),
                parameter: cell("parameter"),
                numerator_chebi,
                denominator_chebi,
                unit: cell("unit"),
                test_id,
                value,
            });
        }

        let mut seen = std::collections::HashSet::new();
        for row in &rows {
            if !seen.insert((row.sample_id.clone(), row.test_id.clone())) {
                return Err(BenchsyncError::AmbiguousData(
                    "found duplicated rows, should not have happened".to_string(),
                ));
            }
        }

        let sync = ExperimentSync {
            experiment_type: "screening",
            overwrite: options.overwrite,
            experiments: experiment_rows(project, &table)?,
        };

        Ok(Self {
            project: project.clone(),
            sync,
            rows,
        })
    }

    /// Number of well measurements prepared for upload.
    pub fn well_count(&self) -> usize {
        self.rows.len()
    }

    /// Sync experiments, upsert plates, then submit screen scalars.
    pub fn upload(&self, gateway: &dyn Gateway) -> Result<()> {
        self.sync.sync(gateway, &self.project)?;
        self.upload_plates(gateway)?;
        self.upload_screen(gateway)
    }

    fn by_experiment(&self) -> IndexMap<&str, Vec<&WellRow>> {
        let mut grouped: IndexMap<&str, Vec<&WellRow>> = IndexMap::new();
        for row in &self.rows {
            grouped.entry(&row.experiment).or_default().push(row);
        }
        grouped
    }

    fn experiment_record(
        &self,
        gateway: &dyn Gateway,
        identifier: &str,
    ) -> Result<crate::gateway::Record> {
        Ok(gateway.one(
            EntityType::Experiment,
            &Filter::new()
                .field("identifier", identifier)
                .field("project", self.project.code.as_str()),
        )?)
    }

    fn upload_plates(&self, gateway: &dyn Gateway) -> Result<()> {
        for (experiment_id, rows) in self.by_experiment() {
            let experiment = self.experiment_record(gateway, experiment_id)?;

            let mut by_barcode: IndexMap<&str, Vec<&WellRow>> = IndexMap::new();
            for row in rows {
                by_barcode.entry(&row.barcode).or_default().push(row);
            }

            for (barcode, wells) in by_barcode {
                let mut contents: IndexMap<String, Value> = IndexMap::new();
                for well in &wells {
                    if contents.contains_key(&well.well) {
                        continue;
                    }
                    let strain = gateway.one(
                        EntityType::Strain,
                        &Filter::new()
                            .field("alias", well.strain.as_str())
                            .field("project", self.project.code.as_str()),
                    )?;
                    let medium = gateway.one(
                        EntityType::Medium,
                        &Filter::new().field("name", well.medium.as_str()),
                    )?;
                    contents.insert(
                        well.well.clone(),
                        json!({"strain": strain.id, "medium": medium.id}),
                    );
                }

                let filter = Filter::new()
                    .field("barcode", barcode)
                    .field("project", self.project.code.as_str());
                match gateway.one(EntityType::Plate, &filter) {
                    Ok(plate) => {
                        info!(barcode, "replacing plate contents");
                        gateway.update_contents(&plate, serde_json::to_value(&contents)?)?;
                    }
                    Err(GatewayError::NotFound { .. }) => {
                        info!(barcode, "creating plate");
                        gateway.create(
                            EntityType::Plate,
                            json!({
                                "barcode": barcode,
                                "experiment": experiment.id,
                                "contents": contents,
                                "type": wells[0].plate_model,
                                "project": self.project.code,
                            }),
                        )?;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }

    fn upload_screen(&self, gateway: &dyn Gateway) -> Result<()> {
        for (experiment_id, rows) in self.by_experiment() {
            let experiment = self.experiment_record(gateway, experiment_id)?;

            let mut samples: IndexMap<String, Value> = IndexMap::new();
            for row in &rows {
                if samples.contains_key(&row.sample_id) {
                    continue;
                }
                let plate = gateway.one(
                    EntityType::Plate,
                    &Filter::new()
                        .field("barcode", row.barcode.as_str())
                        .field("project", self.project.code.as_str()),
                )?;
                samples.insert(
                    row.sample_id.clone(),
                    json!({"plate": plate.id, "position": row.well}),
                );
            }

            let mut by_test: IndexMap<&str, Vec<&WellRow>> = IndexMap::new();
            for row in &rows {
                by_test.entry(&row.test_id).or_default().push(row);
            }
            let mut scalars = Vec::new();
            for assay in by_test.values() {
                let row = assay[0];
                let test = measurement_test(
                    &row.unit,
                    &row.parameter,
                    row.numerator_chebi.as_deref(),
                    row.denominator_chebi.as_deref(),
                    Some(&row.quantity),
                )?;
                let mut values: IndexMap<String, Vec<f64>> = IndexMap::new();
                for row in assay {
                    values.insert(row.sample_id.clone(), vec![row.value]);
                }
                scalars.push(Scalar {
                    test,
                    measurements: values,
                    phase: None,
                });
            }

            info!(
                experiment = experiment_id,
                samples = samples.len(),
                scalars = scalars.len(),
                "submitting screen samples"
            );
            gateway.add_samples(&experiment, &SampleBatch { samples, scalars })?;
        }
        Ok(())
    }
}

/// One [`ExperimentRow`] per distinct experiment in the screen table. Rows
/// without a measured value are dropped first, so an experiment whose rows
/// are all value-less is never created.
fn experiment_rows(project: &Project, table: &DataTable) -> Result<Vec<ExperimentRow>> {
    let mut by_experiment: IndexMap<String, Vec<usize>> = IndexMap::new();
    for index in 0..table.row_count() {
        if parse_number(table.value(index, "value").unwrap_or("")).is_none() {
            continue;
        }
        let identifier = table.value(index, "experiment").unwrap_or("").trim().to_string();
        by_experiment.entry(identifier).or_default().push(index);
    }

    let mut experiments = Vec::with_capacity(by_experiment.len());
    for (identifier, indices) in by_experiment {
        let first = indices[0];
        let cell = |column: &str| table.value(first, column).unwrap_or("").trim().to_string();

        let mut conditions = IndexMap::new();
        conditions.insert("project".to_string(), Value::String(project.code.clone()));
        for key in EXPERIMENT_KEYS.iter().skip(1) {
            if let Some(value) = condition_value(&cell(key)) {
                conditions.insert((*key).to_string(), value);
            }
        }

        let mut operation = IndexMap::new();
        if table.column_index("operation").is_some() {
            for &index in &indices {
                let well = format!(
                    "{}{}",
                    table.value(index, "row").unwrap_or("").trim(),
                    table.value(index, "column").unwrap_or("").trim()
                );
                let value = table.value(index, "operation").unwrap_or("");
                if let Some(value) = condition_value(value) {
                    operation.insert(well, value);
                }
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
            operation,
        });
    }
    Ok(experiments)
}
