//! Media recipe uploader.

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::error::{BenchsyncError, Result};
use crate::gateway::{EntityType, Gateway, Project};
use crate::input::load_table;
use crate::schema::TableKind;
use crate::validation::RowCheck;
use crate::vocab::{identity_mapper, CompoundName, SynonymMapper};

/// Configuration for [`MediaUploader`].
pub struct MediaOptions {
    /// Compound synonym resolver; the identity mapper passes names through.
    pub synonym_mapper: SynonymMapper,
    /// Additional semantic row checks to run during validation.
    pub checks: Vec<Box<dyn RowCheck>>,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            synonym_mapper: identity_mapper(),
            checks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Ingredient {
    compound: String,
    concentration: f64,
}

#[derive(Debug, Clone)]
struct MediumItem {
    name: String,
    identifier: String,
    ph: f64,
    ingredients: Vec<Ingredient>,
}

/// Uploads media definitions.
///
/// Rows are grouped by medium name; each group becomes one medium with its
/// ingredient list. Compounds on the skip list are excluded from the recipe.
/// Every upload creates a fresh revision: the remote identifier is the
/// medium name suffixed with the preparation timestamp.
#[derive(Debug)]
pub struct MediaUploader {
    project: Project,
    items: Vec<MediumItem>,
}

impl MediaUploader {
    /// Validate and transform media CSV content.
    pub fn from_content(
        project: &Project,
        content: &[u8],
        options: MediaOptions,
    ) -> Result<Self> {
        let schema = TableKind::Media.schema()?;
        let table = load_table(content, &schema, &options.checks)?;

        struct Group {
            ph_values: Vec<f64>,
            ingredients: Vec<Ingredient>,
        }
        let mut groups: IndexMap<String, Group> = IndexMap::new();

        for index in 0..table.row_count() {
            let medium = table.value(index, "medium").unwrap_or("").trim().to_string();
            let synonym = table.value(index, "compound_name").unwrap_or("");
            let compound = match (options.synonym_mapper)(synonym)? {
                CompoundName::Chebi(name) => name,
                CompoundName::Skip | CompoundName::Missing => continue,
            };
            let concentration = table
                .value(index, "concentration")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    BenchsyncError::AmbiguousData(format!(
                        "medium {medium} has a non-numeric concentration for {compound}"
                    ))
                })?;
            let ph = table
                .value(index, "pH")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    BenchsyncError::AmbiguousData(format!("medium {medium} has a non-numeric pH"))
                })?;

            let group = groups.entry(medium).or_insert_with(|| Group {
                ph_values: Vec::new(),
                ingredients: Vec::new(),
            });
            if !group.ph_values.contains(&ph) {
                group.ph_values.push(ph);
            }
            group.ingredients.push(Ingredient {
                compound,
                concentration,
            });
        }

        let now = Utc::now().format("%Y-%m-%d-%H-%M-%S");
        let mut items = Vec::with_capacity(groups.len());
        for (name, group) in groups {
            if group.ph_values.len() > 1 {
                return Err(BenchsyncError::AmbiguousData(
                    "expected only one pH per medium".to_string(),
                ));
            }
            let ph = group.ph_values.first().copied().unwrap_or_default();
            items.push(MediumItem {
                identifier: format!("{name}_{now}"),
                name,
                ph,
                ingredients: group.ingredients,
            });
        }
        Ok(Self {
            project: project.clone(),
            items,
        })
    }

    /// Number of media prepared for upload.
    pub fn medium_count(&self) -> usize {
        self.items.len()
    }

    /// Create every medium and submit its ingredient list.
    pub fn upload(&self, gateway: &dyn Gateway) -> Result<()> {
        for item in &self.items {
            info!(medium = %item.name, "creating medium revision");
            let record = gateway.create(
                EntityType::Medium,
                json!({
                    "name": item.name,
                    "identifier": item.identifier,
                    "ph": item.ph,
                    "organization": self.project.code,
                }),
            )?;
            gateway.update_contents(&record, serde_json::to_value(&item.ingredients)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::chebi_mapper;
    use crate::CacheView;

    const MEDIA_CSV: &[u8] = b"medium,compound_name,concentration,pH\n\
        M9 glucose,glc,2.0,7.0\n\
        M9 glucose,kanamycin,0.05,7.0\n\
        LB,Yeast Extract,5.0,6.8\n";

    fn uploader(content: &[u8]) -> Result<MediaUploader> {
        let options = MediaOptions {
            synonym_mapper: chebi_mapper(&CacheView::default()),
            checks: Vec::new(),
        };
        MediaUploader::from_content(&Project::new("DEM"), content, options)
    }

    #[test]
    fn test_groups_by_medium_and_maps_synonyms() {
        let uploader = uploader(MEDIA_CSV).unwrap();
        assert_eq!(uploader.medium_count(), 2);
        let m9 = &uploader.items[0];
        assert_eq!(m9.name, "M9 glucose");
        assert_eq!(m9.ph, 7.0);
        assert_eq!(m9.ingredients.len(), 2);
        assert_eq!(m9.ingredients[0].compound, "aldehydo-D-glucose");
        assert_eq!(m9.ingredients[1].compound, "kanamycin X");
        assert!(m9.identifier.starts_with("M9 glucose_"));
    }

    #[test]
    fn test_skip_list_rows_are_excluded() {
        let data = b"medium,compound_name,concentration,pH\n\
            M9,glc,2.0,7.0\n\
            M9,Antifoam 204,0.1,7.0\n";
        let uploader = uploader(data).unwrap();
        assert_eq!(uploader.items[0].ingredients.len(), 1);
    }

    #[test]
    fn test_conflicting_ph_rejected() {
        let data = b"medium,compound_name,concentration,pH\n\
            M9,glc,2.0,7.0\n\
            M9,kanamycin,0.05,6.5\n";
        let err = uploader(data).unwrap_err();
        assert!(matches!(err, BenchsyncError::AmbiguousData(_)));
        assert!(err.to_string().contains("expected only one pH per medium"));
    }

    #[test]
    fn test_unknown_compound_fails_before_upload() {
        let data = b"medium,compound_name,concentration,pH\nM9,unobtainium,1.0,7.0\n";
        let err = uploader(data).unwrap_err();
        assert!(err.to_string().contains("failed to map unobtainium to chebi"));
    }

    #[test]
    fn test_upload_creates_and_fills_media() {
        use crate::gateway::MemoryGateway;

        let uploader = uploader(MEDIA_CSV).unwrap();
        let gateway = MemoryGateway::new();
        uploader.upload(&gateway).unwrap();

        assert_eq!(gateway.created_count(EntityType::Medium), 2);
        let contents = gateway.contents_updates();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].1[0]["compound"], "aldehydo-D-glucose");
        assert_eq!(contents[0].1[0]["concentration"], 2.0);
    }
}
