//! In-memory gateway for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use super::{
    EntityType, Filter, Gateway, GatewayError, GatewayResult, Record, SampleBatch,
    XrefKind, XrefMeasurements,
};

#[derive(Default)]
struct State {
    records: HashMap<EntityType, Vec<StoredRecord>>,
    next_id: u64,
    created: Vec<(EntityType, String)>,
    contents_updates: Vec<(String, Value)>,
    sample_batches: Vec<(String, SampleBatch)>,
    xref_calls: Vec<(String, XrefMeasurements)>,
    xref_ids: HashMap<XrefKind, HashSet<String>>,
}

struct StoredRecord {
    record: Record,
    archived: bool,
}

/// Gateway keeping all records in memory, with call recording.
///
/// Returns predictable ids and lets tests inspect exactly which remote
/// operations an upload performed.
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Configure the known accession set for a cross-reference kind.
    pub fn with_xref_ids<I, S>(self, kind: XrefKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock().expect("gateway state poisoned");
            state
                .xref_ids
                .insert(kind, ids.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Insert a pre-existing record without counting it as a create.
    pub fn seed(&self, entity: EntityType, fields: Value) -> Record {
        let mut state = self.state.lock().expect("gateway state poisoned");
        let record = Self::store(&mut state, entity, fields);
        record
    }

    fn store(state: &mut State, entity: EntityType, mut fields: Value) -> Record {
        state.next_id += 1;
        let id = format!("{}-{}", entity.resource(), state.next_id);
        if let Value::Object(map) = &mut fields {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        let record = Record {
            id,
            entity,
            fields,
        };
        state.records.entry(entity).or_default().push(StoredRecord {
            record: record.clone(),
            archived: false,
        });
        record
    }

    /// Number of records created (not seeded) for an entity type.
    pub fn created_count(&self, entity: EntityType) -> usize {
        let state = self.state.lock().expect("gateway state poisoned");
        state.created.iter().filter(|(e, _)| *e == entity).count()
    }

    /// Active (non-archived) records of an entity type.
    pub fn records_of(&self, entity: EntityType) -> Vec<Record> {
        let state = self.state.lock().expect("gateway state poisoned");
        state
            .records
            .get(&entity)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| !r.archived)
                    .map(|r| r.record.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of archived records of an entity type.
    pub fn archived_count(&self, entity: EntityType) -> usize {
        let state = self.state.lock().expect("gateway state poisoned");
        state
            .records
            .get(&entity)
            .map(|records| records.iter().filter(|r| r.archived).count())
            .unwrap_or(0)
    }

    /// All `update_contents` calls as (record id, contents) pairs.
    pub fn contents_updates(&self) -> Vec<(String, Value)> {
        let state = self.state.lock().expect("gateway state poisoned");
        state.contents_updates.clone()
    }

    /// All `add_samples` calls as (experiment id, batch) pairs.
    pub fn sample_batches(&self) -> Vec<(String, SampleBatch)> {
        let state = self.state.lock().expect("gateway state poisoned");
        state.sample_batches.clone()
    }

    /// All `add_xref_measurements` calls as (sample id, payload) pairs.
    pub fn xref_calls(&self) -> Vec<(String, XrefMeasurements)> {
        let state = self.state.lock().expect("gateway state poisoned");
        state.xref_calls.clone()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway for MemoryGateway {
    fn query(&self, entity: EntityType, filter: &Filter) -> GatewayResult<Vec<Record>> {
        let state = self.state.lock().expect("gateway state poisoned");
        Ok(state
            .records
            .get(&entity)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| !r.archived && filter.matches(&r.record.fields))
                    .map(|r| r.record.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create(&self, entity: EntityType, fields: Value) -> GatewayResult<Record> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        let record = Self::store(&mut state, entity, fields);
        state.created.push((entity, record.id.clone()));
        Ok(record)
    }

    fn update_contents(&self, record: &Record, contents: Value) -> GatewayResult<()> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        state.contents_updates.push((record.id.clone(), contents));
        Ok(())
    }

    fn archive(&self, record: &Record) -> GatewayResult<()> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        let stored = state
            .records
            .get_mut(&record.entity)
            .and_then(|records| records.iter_mut().find(|r| r.record.id == record.id))
            .ok_or_else(|| GatewayError::NotFound {
                entity: record.entity,
                detail: format!("id={}", record.id),
            })?;
        stored.archived = true;
        Ok(())
    }

    fn add_samples(&self, experiment: &Record, batch: &SampleBatch) -> GatewayResult<()> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        state
            .sample_batches
            .push((experiment.id.clone(), batch.clone()));
        Ok(())
    }

    fn add_xref_measurements(
        &self,
        sample: &Record,
        measurements: &XrefMeasurements,
    ) -> GatewayResult<()> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        state
            .xref_calls
            .push((sample.id.clone(), measurements.clone()));
        Ok(())
    }

    fn subset(&self, kind: XrefKind) -> GatewayResult<HashSet<String>> {
        let state = self.state.lock().expect("gateway state poisoned");
        Ok(state.xref_ids.get(&kind).cloned().unwrap_or_default())
    }
}
