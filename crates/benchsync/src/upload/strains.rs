//! Strain lineage uploader.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{BenchsyncError, Result};
use crate::gateway::{EntityType, Filter, Gateway, GatewayError, Project, Record};
use crate::input::{load_table, DataTable};
use crate::schema::TableKind;
use crate::validation::genotype_not_gnomic;

#[derive(Debug, Clone)]
struct StrainRow {
    pool: String,
    pool_type: String,
    parent_pool: Option<String>,
    genotype_pool: String,
    strain: String,
    parent_strain: Option<String>,
    genotype: String,
    is_reference: bool,
    organism: String,
}

/// Uploads strain and pool definitions.
///
/// Rows are sorted by lineage depth so that parents are created before their
/// children. A parent alias that does not occur in the file is assumed to be
/// defined remotely already and gets depth 0. Already-registered strains are
/// skipped, so re-uploading the same file creates nothing.
#[derive(Debug)]
pub struct StrainsUploader {
    project: Project,
    rows: Vec<StrainRow>,
}

impl StrainsUploader {
    /// Validate and transform strains CSV content.
    pub fn from_content(project: &Project, content: &[u8]) -> Result<Self> {
        let schema = TableKind::Strains.schema()?;
        let table = load_table(content, &schema, &[genotype_not_gnomic()])?;

        let optional = |index: usize, column: &str| -> Option<String> {
            table
                .value(index, column)
                .filter(|v| !DataTable::is_null_value(v))
                .map(|v| v.trim().to_string())
        };
        let text = |index: usize, column: &str| -> String {
            optional(index, column).unwrap_or_default()
        };

        let mut rows: Vec<StrainRow> = (0..table.row_count())
            .map(|index| StrainRow {
                pool: text(index, "pool"),
                pool_type: text(index, "pool_type"),
                parent_pool: optional(index, "parent_pool"),
                genotype_pool: text(index, "genotype_pool"),
                strain: text(index, "strain"),
                parent_strain: optional(index, "parent_strain"),
                genotype: text(index, "genotype_strain"),
                is_reference: table
                    .value(index, "reference")
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .unwrap_or(0)
                    != 0,
                organism: text(index, "organism"),
            })
            .collect();

        let pool_depths: Vec<usize> = (0..rows.len())
            .map(|i| lineage_depth(&rows, i, |r| &r.pool, |r| r.parent_pool.as_deref()))
            .collect();
        let strain_depths: Vec<usize> = (0..rows.len())
            .map(|i| lineage_depth(&rows, i, |r| &r.strain, |r| r.parent_strain.as_deref()))
            .collect();

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by_key(|&i| (pool_depths[i], strain_depths[i]));
        rows = order.into_iter().map(|i| rows[i].clone()).collect();

        Ok(Self {
            project: project.clone(),
            rows,
        })
    }

    /// Strain aliases in upload order.
    pub fn strain_aliases(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.strain.as_str()).collect()
    }

    /// Create every strain not yet registered, with its pool and parents.
    pub fn upload(&self, gateway: &dyn Gateway) -> Result<()> {
        for row in &self.rows {
            let filter = self.scoped(Filter::new().field("alias", row.strain.as_str()));
            match gateway.one(EntityType::Strain, &filter) {
                Ok(_) => {
                    debug!(strain = %row.strain, "strain already registered, skipping");
                    continue;
                }
                Err(GatewayError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }

            let pool = self.resolve_pool(gateway, row)?;
            let parent_strain = match &row.parent_strain {
                Some(alias) => Some(self.require_strain(gateway, alias)?),
                None => None,
            };

            info!(strain = %row.strain, pool = %row.pool, "creating strain");
            gateway.create(
                EntityType::Strain,
                json!({
                    "alias": row.strain,
                    "pool": pool.id,
                    "project": self.project.code,
                    "parent_strain": parent_strain.map(|r| Value::String(r.id)),
                    "is_reference": row.is_reference,
                    "organism": row.organism,
                    "genotype": row.genotype,
                }),
            )?;
        }
        Ok(())
    }

    fn scoped(&self, filter: Filter) -> Filter {
        filter.field("project", self.project.code.as_str())
    }

    fn resolve_pool(&self, gateway: &dyn Gateway, row: &StrainRow) -> Result<Record> {
        let filter = self.scoped(Filter::new().field("alias", row.pool.as_str()));
        match gateway.one(EntityType::Pool, &filter) {
            Ok(pool) => Ok(pool),
            Err(GatewayError::NotFound { .. }) => {
                let parent_pool = match &row.parent_pool {
                    Some(alias) => {
                        let parent_filter =
                            self.scoped(Filter::new().field("alias", alias.as_str()));
                        match gateway.one(EntityType::Pool, &parent_filter) {
                            Ok(parent) => Some(parent),
                            Err(GatewayError::NotFound { .. }) => {
                                return Err(BenchsyncError::NotFound(format!(
                                    "missing pool {alias}"
                                )));
                            }
                            Err(err) => return Err(err.into()),
                        }
                    }
                    None => None,
                };
                info!(pool = %row.pool, "creating pool");
                let pool = gateway.create(
                    EntityType::Pool,
                    json!({
                        "alias": row.pool,
                        "project": self.project.code,
                        "parent_pool": parent_pool.map(|r| Value::String(r.id)),
                        "genotype": row.genotype_pool,
                        "type": row.pool_type,
                    }),
                )?;
                Ok(pool)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn require_strain(&self, gateway: &dyn Gateway, alias: &str) -> Result<Record> {
        let filter = self.scoped(Filter::new().field("alias", alias));
        match gateway.one(EntityType::Strain, &filter) {
            Ok(strain) => Ok(strain),
            Err(GatewayError::NotFound { .. }) => {
                Err(BenchsyncError::NotFound(format!("missing strain {alias}")))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Number of ancestors of row `i` present in the file, following the
/// `parent` column through the `key` column. A parent not found in the file
/// is assumed to exist remotely and terminates the walk. Bounded by the row
/// count, so cyclic references cannot loop forever.
fn lineage_depth<'a>(
    rows: &'a [StrainRow],
    start: usize,
    key: impl Fn(&'a StrainRow) -> &'a str,
    parent: impl Fn(&'a StrainRow) -> Option<&'a str>,
) -> usize {
    let mut depth = 0;
    let mut current = start;
    while depth < rows.len() {
        let Some(parent_key) = parent(&rows[current]) else {
            break;
        };
        let Some(parent_index) = rows.iter().position(|row| key(row) == parent_key) else {
            break;
        };
        depth += 1;
        current = parent_index;
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    const STRAINS_CSV: &[u8] = b"pool,parent_pool,pool_type,genotype_pool,strain,parent_strain,genotype_strain,reference,organism\n\
        p2,p1,diversity,,eggs,scref,+geneX,0,Saccharomyces cerevisiae\n\
        p1,,diversity,,scref,,,1,Saccharomyces cerevisiae\n";

    #[test]
    fn test_rows_sorted_parents_first() {
        let uploader =
            StrainsUploader::from_content(&Project::new("DEM"), STRAINS_CSV).unwrap();
        assert_eq!(uploader.strain_aliases(), vec!["scref", "eggs"]);
    }

    #[test]
    fn test_unresolved_parent_gets_depth_zero() {
        let data = b"pool,parent_pool,pool_type,genotype_pool,strain,parent_strain,genotype_strain,reference,organism\n\
            p1,p0,diversity,,child,ancestor,,0,Escherichia coli\n";
        // `p0` and `ancestor` are not in the file; the row sorts first anyway.
        let uploader = StrainsUploader::from_content(&Project::new("DEM"), data).unwrap();
        assert_eq!(uploader.strain_aliases(), vec!["child"]);
    }

    #[test]
    fn test_upload_creates_lineage() {
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        let uploader = StrainsUploader::from_content(&project, STRAINS_CSV).unwrap();
        uploader.upload(&gateway).unwrap();

        assert_eq!(gateway.created_count(EntityType::Pool), 2);
        assert_eq!(gateway.created_count(EntityType::Strain), 2);

        let strains = gateway.records_of(EntityType::Strain);
        let eggs = strains
            .iter()
            .find(|r| r.str_field("alias") == Some("eggs"))
            .unwrap();
        let scref = strains
            .iter()
            .find(|r| r.str_field("alias") == Some("scref"))
            .unwrap();
        assert_eq!(eggs.str_field("parent_strain"), Some(scref.id.as_str()));
        assert_eq!(scref.fields["is_reference"], true);
    }

    #[test]
    fn test_reupload_is_idempotent() {
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        let uploader = StrainsUploader::from_content(&project, STRAINS_CSV).unwrap();
        uploader.upload(&gateway).unwrap();
        uploader.upload(&gateway).unwrap();

        assert_eq!(gateway.created_count(EntityType::Pool), 2);
        assert_eq!(gateway.created_count(EntityType::Strain), 2);
    }

    #[test]
    fn test_missing_remote_parent_strain_fails() {
        let data = b"pool,parent_pool,pool_type,genotype_pool,strain,parent_strain,genotype_strain,reference,organism\n\
            p1,,diversity,,child,ghost,,0,Escherichia coli\n";
        let gateway = MemoryGateway::new();
        let project = Project::new("DEM");
        let uploader = StrainsUploader::from_content(&project, data).unwrap();
        let err = uploader.upload(&gateway).unwrap_err();
        assert!(err.to_string().contains("missing strain ghost"));
    }

    #[test]
    fn test_bad_genotype_rejected_at_construction() {
        let data = b"pool,parent_pool,pool_type,genotype_pool,strain,parent_strain,genotype_strain,reference,organism\n\
            p1,,diversity,,s1,,this is not a genotype!,0,Escherichia coli\n";
        let err = StrainsUploader::from_content(&Project::new("DEM"), data).unwrap_err();
        match err {
            BenchsyncError::Validation(report) => {
                assert!(report.summary().contains("expected gnomic"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
