//! Fermentation uploader: experiment and sample descriptions plus the
//! associated physiology measurements.
//!
//! Takes two files. The samples file tabulates each experiment and its
//! reactors; the physiology file is wide, one measurement column per sample
//! id. The physiology schema is derived per upload by appending one numeric
//! field for every sample id found in the samples file, then the wide table
//! is melted to long form and joined back onto the sample metadata.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{BenchsyncError, Result};
use crate::gateway::{EntityType, Filter, Gateway, Project, SampleBatch, Scalar};
use crate::input::{load_table, DataTable};
use crate::measurement::measurement_test;
use crate::schema::TableKind;
use crate::validation::RowCheck;
use crate::vocab::{identity_mapper, SynonymMapper};

use super::experiment::{condition_value, get_or_create_phase, ExperimentRow, ExperimentSync};
use super::{parse_number, resolve_compound};

/// Columns describing the experiment rather than a single reactor.
const EXPERIMENT_KEYS: [&str; 10] = [
    "experiment",
    "description",
    "date",
    "do",
    "gas",
    "gasflow",
    "ph_set",
    "ph_correction",
    "stirrer",
    "temperature",
];

/// Identifier columns of the wide physiology table; everything else is a
/// per-sample measurement column.
const PHYSIOLOGY_ID_COLUMNS: [&str; 7] = [
    "phase_start",
    "phase_end",
    "quantity",
    "parameter",
    "numerator_compound_name",
    "denominator_compound_name",
    "unit",
];

/// Configuration for [`FermentationUploader`].
pub struct FermentationOptions {
    /// Archive and recreate an existing experiment whose date differs.
    pub overwrite: bool,
    /// Compound synonym resolver applied to the ratio compound columns.
    pub synonym_mapper: SynonymMapper,
    /// Additional semantic row checks, applied to both files.
    pub checks: Vec<Box<dyn RowCheck>>,
}

impl Default for FermentationOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            synonym_mapper: identity_mapper(),
            checks: Vec::new(),
        }
    }
}

/// One melted physiology measurement joined with its sample metadata.
#[derive(Debug, Clone)]
struct MeasurementRow {
    sample_id: String,
    experiment: String,
    reactor: String,
    feed_medium: String,
    batch_medium: String,
    strain: String,
    phase_start: f64,
    phase_end: f64,
    quantity: String,
    parameter: String,
    numerator_chebi: Option<String>,
    denominator_chebi: Option<String>,
    unit: String,
    test_id: String,
    value: f64,
}

/// Uploads fermentation experiments with reactor samples and physiology
/// scalars.
#[derive(Debug)]
pub struct FermentationUploader {
    project: Project,
    sync: ExperimentSync,
    measurements: Vec<MeasurementRow>,
}

impl FermentationUploader {
    /// Validate and transform the samples and physiology CSV contents.
    pub fn from_content(
        project: &Project,
        samples_content: &[u8],
        physiology_content: &[u8],
        options: FermentationOptions,
    ) -> Result<Self> {
        let samples_schema = TableKind::SampleInformation.schema()?;
        let samples = load_table(samples_content, &samples_schema, &options.checks)?;

        // Sample ids name the physiology measurement columns.
        let mut sample_ids: Vec<String> = (0..samples.row_count())
            .map(|index| sample_id(&samples, index))
            .collect();
        sample_ids.sort();

        let physiology_schema = TableKind::Physiology
            .schema()?
            .with_extra_number_fields(sample_ids.iter().cloned());
        let physiology = load_table(physiology_content, &physiology_schema, &options.checks)?;

        let samples_by_id: IndexMap<String, usize> = (0..samples.row_count())
            .map(|index| (sample_id(&samples, index), index))
            .collect();

        let measurements = melt_physiology(
            &physiology,
            &samples,
            &samples_by_id,
            &options.synonym_mapper,
        )?;

        let mut seen = std::collections::HashSet::new();
        for row in &measurements {
            if !seen.insert((row.sample_id.clone(), row.test_id.clone())) {
                return Err(BenchsyncError::AmbiguousData(
                    "found duplicated rows, should not have happened".to_string(),
                ));
            }
        }

        let sync = ExperimentSync {
            experiment_type: "fermentation",
            overwrite: options.overwrite,
            experiments: experiment_rows(&samples)?,
        };

        Ok(Self {
            project: project.clone(),
            sync,
            measurements,
        })
    }

    /// Number of melted measurements prepared for upload.
    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    /// Sync experiments, then submit samples and scalars per experiment.
    pub fn upload(&self, gateway: &dyn Gateway) -> Result<()> {
        self.sync.sync(gateway, &self.project)?;
        self.upload_physiology(gateway)
    }

    fn upload_physiology(&self, gateway: &dyn Gateway) -> Result<()> {
        let mut by_experiment: IndexMap<&str, Vec<&MeasurementRow>> = IndexMap::new();
        for row in &self.measurements {
            by_experiment.entry(&row.experiment).or_default().push(row);
        }

        for (experiment_id, rows) in by_experiment {
            let experiment = gateway.one(
                EntityType::Experiment,
                &Filter::new()
                    .field("identifier", experiment_id)
                    .field("project", self.project.code.as_str()),
            )?;

            let mut samples: IndexMap<String, Value> = IndexMap::new();
            for row in &rows {
                if samples.contains_key(&row.reactor) {
                    continue;
                }
                let strain = gateway.one(
                    EntityType::Strain,
                    &Filter::new()
                        .field("alias", row.strain.as_str())
                        .field("project", self.project.code.as_str()),
                )?;
                let medium = gateway.one(
                    EntityType::Medium,
                    &Filter::new().field("name", row.batch_medium.as_str()),
                )?;
                let feed_medium = gateway.one(
                    EntityType::Medium,
                    &Filter::new().field("name", row.feed_medium.as_str()),
                )?;
                samples.insert(
                    row.reactor.clone(),
                    json!({
                        "name": row.reactor,
                        "strain": strain.id,
                        "medium": medium.id,
                        "feed_medium": feed_medium.id,
                    }),
                );
            }

            let mut scalars = Vec::new();
            let mut by_phase: IndexMap<(String, String), Vec<&MeasurementRow>> = IndexMap::new();
            for row in &rows {
                let key = (row.phase_start.to_string(), row.phase_end.to_string());
                by_phase.entry(key).or_default().push(row);
            }
            for rows_in_phase in by_phase.values() {
                let first = rows_in_phase[0];
                let phase =
                    get_or_create_phase(gateway, &experiment, first.phase_start, first.phase_end)?;

                let mut by_test: IndexMap<&str, Vec<&MeasurementRow>> = IndexMap::new();
                for row in rows_in_phase {
                    by_test.entry(&row.test_id).or_default().push(row);
                }
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
                        values.insert(row.reactor.clone(), vec![row.value]);
                    }
                    scalars.push(Scalar {
                        test,
                        measurements: values,
                        phase: Some(phase.id.clone()),
                    });
                }
            }

            info!(
                experiment = experiment_id,
                samples = samples.len(),
                scalars = scalars.len(),
                "submitting fermentation samples"
            );
            gateway.add_samples(&experiment, &SampleBatch { samples, scalars })?;
        }
        Ok(())
    }
}

fn sample_id(samples: &DataTable, index: usize) -> String {
    format!(
        "{}_{}",
        samples.value(index, "experiment").unwrap_or("").trim(),
        samples.value(index, "reactor").unwrap_or("").trim()
    )
}

/// Melt the wide physiology table to long form: one row per (assay row,
/// sample column) pair with a non-empty value, joined with the sample's
/// metadata.
fn melt_physiology(
    physiology: &DataTable,
    samples: &DataTable,
    samples_by_id: &IndexMap<String, usize>,
    mapper: &SynonymMapper,
) -> Result<Vec<MeasurementRow>> {
    let value_columns: Vec<(usize, &str)> = physiology
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| !PHYSIOLOGY_ID_COLUMNS.contains(&header.as_str()))
        .map(|(index, header)| (index, header.as_str()))
        .collect();

    let mut measurements = Vec::new();
    for index in 0..physiology.row_count() {
        let cell = |column: &str| physiology.value(index, column).unwrap_or("").trim().to_string();

        let phase_start = parse_number(&cell("phase_start")).ok_or_else(|| {
            BenchsyncError::AmbiguousData(format!("physiology row {index} has no phase_start"))
        })?;
        let phase_end = parse_number(&cell("phase_end")).ok_or_else(|| {
            BenchsyncError::AmbiguousData(format!("physiology row {index} has no phase_end"))
        })?;
        let numerator_chebi = resolve_compound(mapper, &cell("numerator_compound_name"))?;
        let denominator_chebi = resolve_compound(mapper, &cell("denominator_compound_name"))?;
        let test_id = [
            cell("unit"),
            cell("parameter"),
            numerator_chebi.clone().unwrap_or_else(|| "nan".to_string()),
            denominator_chebi.clone().unwrap_or_else(|| "nan".to_string()),
            phase_start.to_string(),
            phase_end.to_string(),
        ]
        .join("_");

        for &(column_index, sample_column) in &value_columns {
            let raw = physiology.get(index, column_index).unwrap_or("");
            let Some(value) = parse_number(raw) else {
                continue;
            };
            let Some(&sample_index) = samples_by_id.get(sample_column) else {
                continue;
            };
            let sample = |column: &str| {
                samples
                    .value(sample_index, column)
                    .unwrap_or("")
                    .trim()
                    .to_string()
            };
            measurements.push(MeasurementRow {
                sample_id: sample_column.to_string(),
                experiment: sample("experiment"),
                reactor: sample("reactor"),
                feed_medium: sample("feed_medium"),
                batch_medium: sample("batch_medium"),
                strain: sample("strain"),
                phase_start,
                phase_end,
                quantity: cell("quantity"),
                parameter: cell("parameter"),
                numerator_chebi: numerator_chebi.clone(),
                denominator_chebi: denominator_chebi.clone(),
                unit: cell("unit"),
                test_id: test_id.clone(),
                value,
            });
        }
    }
    Ok(measurements)
}

/// One [`ExperimentRow`] per distinct experiment in the samples table.
fn experiment_rows(samples: &DataTable) -> Result<Vec<ExperimentRow>> {
    let mut by_experiment: IndexMap<String, Vec<usize>> = IndexMap::new();
    for index in 0..samples.row_count() {
        let identifier = samples.value(index, "experiment").unwrap_or("").trim().to_string();
        by_experiment.entry(identifier).or_default().push(index);
    }

    let mut experiments = Vec::with_capacity(by_experiment.len());
    for (identifier, indices) in by_experiment {
        let first = indices[0];
        let cell = |column: &str| samples.value(first, column).unwrap_or("").trim().to_string();

        let mut conditions = IndexMap::new();
        for key in EXPERIMENT_KEYS {
            if let Some(value) = condition_value(&cell(key)) {
                conditions.insert(key.to_string(), value);
            }
        }

        let mut operation = IndexMap::new();
        if samples.column_index("operation").is_some() {
            for &index in &indices {
                let reactor = samples.value(index, "reactor").unwrap_or("").trim().to_string();
                let value = samples.value(index, "operation").unwrap_or("");
                if let Some(value) = condition_value(value) {
                    operation.insert(reactor, value);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    const SAMPLES_CSV: &[u8] = b"experiment,description,date,do,gas,gasflow,ph_set,ph_correction,stirrer,temperature,reactor,operation,feed_medium,batch_medium,strain\n\
        E0001,batch fermentation,2024-03-25,20,air,1.0,7.0,KOH,800,30,R1,batch,FeedA,M9,scref\n\
        E0001,batch fermentation,2024-03-25,20,air,1.0,7.0,KOH,800,30,R2,batch,FeedA,M9,eggs\n";

    const PHYSIOLOGY_CSV: &[u8] = b"phase_start,phase_end,quantity,parameter,numerator_compound_name,denominator_compound_name,unit,E0001_R1,E0001_R2\n\
        0,10,mass,concentration,glc,,mg/L,1.5,2.5\n\
        0,10,,growth-rate,,,h-1,0.21,0.25\n\
        10,20,mass,concentration,glc,,mg/L,0.4,\n";

    fn prepared_gateway() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.seed(
            EntityType::Strain,
            json!({"alias": "scref", "project": "DEM"}),
        );
        gateway.seed(
            EntityType::Strain,
            json!({"alias": "eggs", "project": "DEM"}),
        );
        gateway.seed(EntityType::Medium, json!({"name": "M9"}));
        gateway.seed(EntityType::Medium, json!({"name": "FeedA"}));
        gateway
    }

    fn uploader() -> FermentationUploader {
        FermentationUploader::from_content(
            &Project::new("DEM"),
            SAMPLES_CSV,
            PHYSIOLOGY_CSV,
            FermentationOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_melt_drops_empty_cells() {
        // 2 samples x 2 assays in the first phase, 1 value in the second.
        assert_eq!(uploader().measurement_count(), 5);
    }

    #[test]
    fn test_end_to_end_batch() {
        let gateway = prepared_gateway();
        uploader().upload(&gateway).unwrap();

        assert_eq!(gateway.created_count(EntityType::Experiment), 1);
        assert_eq!(gateway.created_count(EntityType::ExperimentPhase), 2);

        let batches = gateway.sample_batches();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0].1;
        assert_eq!(batch.samples.len(), 2);
        assert!(batch.samples.contains_key("R1"));
        // Two tests in the first phase plus one in the second.
        assert_eq!(batch.scalars.len(), 3);
        let concentration = &batch.scalars[0];
        assert_eq!(concentration.measurements["R1"], vec![1.5]);
        assert_eq!(concentration.measurements["R2"], vec![2.5]);
        assert!(concentration.phase.is_some());
    }

    #[test]
    fn test_duplicate_sample_test_pair_rejected() {
        let physiology = b"phase_start,phase_end,quantity,parameter,numerator_compound_name,denominator_compound_name,unit,E0001_R1,E0001_R2\n\
            0,10,mass,concentration,glc,,mg/L,1.5,2.5\n\
            0,10,mass,concentration,glc,,mg/L,1.6,2.6\n";
        let err = FermentationUploader::from_content(
            &Project::new("DEM"),
            SAMPLES_CSV,
            physiology,
            FermentationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BenchsyncError::AmbiguousData(_)));
        assert!(err.to_string().contains("found duplicated rows"));
    }

    #[test]
    fn test_unknown_sample_column_is_a_validation_error() {
        let physiology = b"phase_start,phase_end,quantity,parameter,numerator_compound_name,denominator_compound_name,unit,E0001_R9\n\
            0,10,mass,concentration,glc,,mg/L,1.5\n";
        let err = FermentationUploader::from_content(
            &Project::new("DEM"),
            SAMPLES_CSV,
            physiology,
            FermentationOptions::default(),
        )
        .unwrap_err();
        match err {
            BenchsyncError::Validation(report) => {
                assert!(report.summary().contains("extra header"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_experiment_attributes() {
        let sync = &uploader().sync;
        assert_eq!(sync.experiments.len(), 1);
        let experiment = &sync.experiments[0];
        assert_eq!(experiment.identifier, "E0001");
        assert_eq!(experiment.date, "2024-03-25");
        assert_eq!(experiment.temperature, 30.0);
        assert_eq!(experiment.conditions["gas"], json!("air"));
        assert_eq!(experiment.conditions["stirrer"], json!(800.0));
        assert_eq!(experiment.operation["R1"], json!("batch"));
        assert_eq!(experiment.operation["R2"], json!("batch"));
    }
}
