//! Identifier cache: snapshots of remote identifier sets used by the
//! semantic row checks.
//!
//! Validation must not hit the LIMS per cell, so identifier membership is
//! checked against an in-process snapshot. Readers clone cheap `Arc` handles
//! and keep a consistent view for the whole validation pass even if a
//! refresh lands midway.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::error::Result;
use crate::gateway::{EntityType, Filter, Gateway, XrefKind};

/// Bundled ChEBI compound names, loaded once on full refresh.
const COMPOUNDS_JSON: &str = include_str!("../data/compounds.json");

/// How much of the cache to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// Everything, including the large compound and accession sets.
    Full,
    /// Only the volatile sets: media names, experiment and strain aliases.
    Lite,
}

/// An immutable snapshot of the cached identifier sets.
///
/// `experiments` and `strains` are keyed by `(project_code, identifier)`
/// because those names are only unique within a project.
#[derive(Debug, Clone, Default)]
pub struct CacheView {
    pub compounds: Arc<HashSet<String>>,
    pub media: Arc<HashSet<String>>,
    pub proteins: Arc<HashSet<String>>,
    pub reactions: Arc<HashSet<String>>,
    pub experiments: Arc<HashSet<(String, String)>>,
    pub strains: Arc<HashSet<(String, String)>>,
}

impl CacheView {
    /// Whether a medium name is known.
    pub fn has_medium(&self, name: &str) -> bool {
        self.media.contains(name)
    }

    /// Whether an experiment identifier is known within a project.
    pub fn has_experiment(&self, project: &str, identifier: &str) -> bool {
        self.experiments
            .contains(&(project.to_string(), identifier.to_string()))
    }

    /// Whether a strain alias is known within a project.
    pub fn has_strain(&self, project: &str, alias: &str) -> bool {
        self.strains
            .contains(&(project.to_string(), alias.to_string()))
    }
}

/// Shared identifier cache with atomic snapshot swap.
#[derive(Debug, Default)]
pub struct IdentifierCache {
    snapshot: RwLock<CacheView>,
}

#[derive(Deserialize)]
struct CompoundEntry {
    name: String,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; cheap to clone, stable for the caller's lifetime.
    pub fn view(&self) -> CacheView {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Rebuild the cached sets from the gateway and swap them in.
    ///
    /// The new snapshot is assembled off-lock; the write lock is held only
    /// for the swap, so validation passes never block on a refresh.
    pub fn refresh(&self, gateway: &dyn Gateway, scope: RefreshScope) -> Result<()> {
        let previous = self.view();

        let media = Arc::new(Self::load_names(gateway, EntityType::Medium, "name")?);
        let experiments = Arc::new(Self::load_scoped(gateway, EntityType::Experiment, "identifier")?);
        let strains = Arc::new(Self::load_scoped(gateway, EntityType::Strain, "alias")?);

        let (compounds, proteins, reactions) = match scope {
            RefreshScope::Full => (
                Arc::new(Self::load_compounds()?),
                Arc::new(gateway.subset(XrefKind::Protein)?),
                Arc::new(gateway.subset(XrefKind::Reaction)?),
            ),
            RefreshScope::Lite => (
                previous.compounds,
                previous.proteins,
                previous.reactions,
            ),
        };

        let next = CacheView {
            compounds,
            media,
            proteins,
            reactions,
            experiments,
            strains,
        };
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next;
        Ok(())
    }

    fn load_compounds() -> Result<HashSet<String>> {
        let entries: Vec<CompoundEntry> = serde_json::from_str(COMPOUNDS_JSON)?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    fn load_names(
        gateway: &dyn Gateway,
        entity: EntityType,
        field: &str,
    ) -> Result<HashSet<String>> {
        let records = gateway.query(entity, &Filter::new())?;
        Ok(records
            .iter()
            .filter_map(|r| r.str_field(field))
            .map(str::to_string)
            .collect())
    }

    fn load_scoped(
        gateway: &dyn Gateway,
        entity: EntityType,
        field: &str,
    ) -> Result<HashSet<(String, String)>> {
        let records = gateway.query(entity, &Filter::new())?;
        Ok(records
            .iter()
            .filter_map(|r| {
                let project = r.str_field("project")?;
                let value = r.str_field(field)?;
                Some((project.to_string(), value.to_string()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::json;

    #[test]
    fn test_full_refresh_loads_everything() {
        let gateway = MemoryGateway::new()
            .with_xref_ids(XrefKind::Protein, ["P0A796"])
            .with_xref_ids(XrefKind::Reaction, ["PFK"]);
        gateway.seed(EntityType::Medium, json!({"name": "M9 glucose"}));
        gateway.seed(
            EntityType::Experiment,
            json!({"identifier": "E0001", "project": "DEM"}),
        );
        gateway.seed(
            EntityType::Strain,
            json!({"alias": "scref", "project": "DEM"}),
        );

        let cache = IdentifierCache::new();
        cache.refresh(&gateway, RefreshScope::Full).unwrap();
        let view = cache.view();

        assert!(view.has_medium("M9 glucose"));
        assert!(view.has_experiment("DEM", "E0001"));
        assert!(!view.has_experiment("NPC", "E0001"));
        assert!(view.has_strain("DEM", "scref"));
        assert!(view.proteins.contains("P0A796"));
        assert!(view.reactions.contains("PFK"));
        assert!(view.compounds.contains("aldehydo-D-glucose"));
    }

    #[test]
    fn test_lite_refresh_keeps_heavy_sets() {
        let gateway = MemoryGateway::new().with_xref_ids(XrefKind::Protein, ["P0A796"]);
        let cache = IdentifierCache::new();
        cache.refresh(&gateway, RefreshScope::Full).unwrap();

        gateway.seed(EntityType::Medium, json!({"name": "LB"}));
        // Lite refresh must not call subset again; drop the accession to prove it.
        let cache_view_before = cache.view();
        assert!(cache_view_before.proteins.contains("P0A796"));

        cache.refresh(&gateway, RefreshScope::Lite).unwrap();
        let view = cache.view();
        assert!(view.has_medium("LB"));
        assert!(view.proteins.contains("P0A796"));
        assert!(view.compounds.contains("dioxygen"));
    }

    #[test]
    fn test_view_is_stable_across_refresh() {
        let gateway = MemoryGateway::new();
        gateway.seed(EntityType::Medium, json!({"name": "M9"}));
        let cache = IdentifierCache::new();
        cache.refresh(&gateway, RefreshScope::Full).unwrap();

        let view = cache.view();
        gateway.seed(EntityType::Medium, json!({"name": "LB"}));
        cache.refresh(&gateway, RefreshScope::Lite).unwrap();

        // The older view still reflects the first snapshot.
        assert!(view.has_medium("M9"));
        assert!(!view.has_medium("LB"));
        assert!(cache.view().has_medium("LB"));
    }
}
