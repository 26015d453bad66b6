//! Experiment synchronization shared by the sample-bearing uploaders.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{BenchsyncError, Result};
use crate::gateway::{EntityType, Filter, Gateway, GatewayError, Project, Record};

use super::parse_number;

/// One experiment's description, extracted from the sample rows.
#[derive(Debug, Clone)]
pub(crate) struct ExperimentRow {
    pub identifier: String,
    /// Experiment date as `%Y-%m-%d`; compared as a string against the
    /// remote date.
    pub date: String,
    pub description: String,
    pub temperature: f64,
    /// Experiment-level columns, numbers where the cell parses as one.
    pub conditions: IndexMap<String, Value>,
    /// Operation mode keyed by the variant's sample column (reactor or
    /// well). Empty when the table has no operation column.
    pub operation: IndexMap<String, Value>,
}

/// Reconciles experiment records ahead of sample submission.
#[derive(Debug, Clone)]
pub(crate) struct ExperimentSync {
    pub experiment_type: &'static str,
    pub overwrite: bool,
    pub experiments: Vec<ExperimentRow>,
}

impl ExperimentSync {
    /// Bring the remote experiments in line with the table, in order.
    ///
    /// An existing experiment with the same date is reused untouched. On a
    /// date mismatch the existing record is archived and recreated when
    /// `overwrite` is set, otherwise the sync fails with a conflict.
    pub(crate) fn sync(&self, gateway: &dyn Gateway, project: &Project) -> Result<()> {
        for experiment in &self.experiments {
            let filter = Filter::new()
                .field("identifier", experiment.identifier.as_str())
                .field("project", project.code.as_str());
            match gateway.one(EntityType::Experiment, &filter) {
                Ok(existing) => {
                    let remote_date: String = existing
                        .str_field("date")
                        .unwrap_or_default()
                        .chars()
                        .take(10)
                        .collect();
                    if remote_date == experiment.date {
                        debug!(identifier = %experiment.identifier, "reusing existing experiment");
                        continue;
                    }
                    if !self.overwrite {
                        return Err(BenchsyncError::Conflict(format!(
                            "existing mismatching experiment {}",
                            experiment.identifier
                        )));
                    }
                    info!(identifier = %experiment.identifier, "archiving existing experiment");
                    gateway.archive(&existing)?;
                    self.create(gateway, project, experiment)?;
                }
                Err(GatewayError::NotFound { .. }) => {
                    self.create(gateway, project, experiment)?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn create(
        &self,
        gateway: &dyn Gateway,
        project: &Project,
        experiment: &ExperimentRow,
    ) -> Result<()> {
        info!(identifier = %experiment.identifier, "creating new experiment");
        let mut attributes = json!({
            "conditions": experiment.conditions,
            "temperature": experiment.temperature,
        });
        if !experiment.operation.is_empty() {
            attributes["operation"] = serde_json::to_value(&experiment.operation)?;
        }
        gateway.create(
            EntityType::Experiment,
            json!({
                "project": project.code,
                "type": self.experiment_type,
                "identifier": experiment.identifier,
                "date": experiment.date,
                "description": experiment.description,
                "attributes": attributes,
            }),
        )?;
        Ok(())
    }
}

/// Condition values: numeric cells become numbers, other non-empty cells
/// stay strings, empty cells are dropped.
pub(crate) fn condition_value(value: &str) -> Option<Value> {
    if crate::input::DataTable::is_null_value(value) {
        return None;
    }
    match parse_number(value) {
        Some(number) => serde_json::Number::from_f64(number).map(Value::Number),
        None => Some(Value::String(value.trim().to_string())),
    }
}

/// Fetch or create the phase record for a `(start, end)` window of an
/// experiment. New phases are titled `{start}__{end}`.
pub(crate) fn get_or_create_phase(
    gateway: &dyn Gateway,
    experiment: &Record,
    start: f64,
    end: f64,
) -> Result<Record> {
    let filter = Filter::new()
        .field("start", start)
        .field("end", end)
        .field("experiment", experiment.id.as_str());
    match gateway.one(EntityType::ExperimentPhase, &filter) {
        Ok(phase) => Ok(phase),
        Err(GatewayError::NotFound { .. }) => {
            let phase = gateway.create(
                EntityType::ExperimentPhase,
                json!({
                    "experiment": experiment.id,
                    "start": start,
                    "end": end,
                    "title": format!("{start}__{end}"),
                }),
            )?;
            Ok(phase)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn row(identifier: &str, date: &str) -> ExperimentRow {
        ExperimentRow {
            identifier: identifier.to_string(),
            date: date.to_string(),
            description: "test run".to_string(),
            temperature: 30.0,
            conditions: IndexMap::new(),
            operation: IndexMap::new(),
        }
    }

    fn sync_with(rows: Vec<ExperimentRow>, overwrite: bool) -> ExperimentSync {
        ExperimentSync {
            experiment_type: "fermentation",
            overwrite,
            experiments: rows,
        }
    }

    #[test]
    fn test_creates_missing_experiment() {
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        sync_with(vec![row("E1", "2024-03-25")], true)
            .sync(&gateway, &project)
            .unwrap();
        assert_eq!(gateway.created_count(EntityType::Experiment), 1);
        let records = gateway.records_of(EntityType::Experiment);
        assert_eq!(records[0].str_field("type"), Some("fermentation"));
        assert_eq!(records[0].str_field("date"), Some("2024-03-25"));
    }

    #[test]
    fn test_reuses_matching_experiment() {
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        gateway.seed(
            EntityType::Experiment,
            json!({"identifier": "E1", "project": "DEM", "date": "2024-03-25"}),
        );
        sync_with(vec![row("E1", "2024-03-25")], true)
            .sync(&gateway, &project)
            .unwrap();
        assert_eq!(gateway.created_count(EntityType::Experiment), 0);
        assert_eq!(gateway.archived_count(EntityType::Experiment), 0);
    }

    #[test]
    fn test_date_mismatch_archives_and_recreates() {
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        gateway.seed(
            EntityType::Experiment,
            json!({"identifier": "E1", "project": "DEM", "date": "2023-01-01"}),
        );
        sync_with(vec![row("E1", "2024-03-25")], true)
            .sync(&gateway, &project)
            .unwrap();
        assert_eq!(gateway.archived_count(EntityType::Experiment), 1);
        assert_eq!(gateway.created_count(EntityType::Experiment), 1);
    }

    #[test]
    fn test_date_mismatch_without_overwrite_conflicts() {
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        gateway.seed(
            EntityType::Experiment,
            json!({"identifier": "E1", "project": "DEM", "date": "2023-01-01"}),
        );
        let err = sync_with(vec![row("E1", "2024-03-25")], false)
            .sync(&gateway, &project)
            .unwrap_err();
        assert!(matches!(err, BenchsyncError::Conflict(_)));
        assert!(err.to_string().contains("existing mismatching experiment E1"));
        assert_eq!(gateway.archived_count(EntityType::Experiment), 0);
    }

    #[test]
    fn test_phase_is_created_once() {
        let gateway = MemoryGateway::new();
        let experiment = gateway.seed(EntityType::Experiment, json!({"identifier": "E1"}));
        let first = get_or_create_phase(&gateway, &experiment, 10.0, 20.0).unwrap();
        let second = get_or_create_phase(&gateway, &experiment, 10.0, 20.0).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.str_field("title"), Some("10__20"));
        assert_eq!(gateway.created_count(EntityType::ExperimentPhase), 1);
    }

    #[test]
    fn test_condition_value_casting() {
        assert_eq!(condition_value("7.2"), Some(json!(7.2)));
        assert_eq!(condition_value("batch"), Some(json!("batch")));
        assert_eq!(condition_value("nan"), None);
        assert_eq!(condition_value(""), None);
    }
}
