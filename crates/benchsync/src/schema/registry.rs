//! Registry mapping logical table kinds to bundled schema resources.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::document::SchemaDoc;

/// Logical table kind handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Media,
    Strains,
    SampleInformation,
    Physiology,
    Screen,
    Fluxes,
    ProteinAbundances,
}

impl TableKind {
    /// Raw JSON for the bundled schema document.
    fn raw(&self) -> &'static str {
        match self {
            TableKind::Media => include_str!("../../schemas/media_schema.json"),
            TableKind::Strains => include_str!("../../schemas/strains_schema.json"),
            TableKind::SampleInformation => {
                include_str!("../../schemas/sample_information_schema.json")
            }
            TableKind::Physiology => include_str!("../../schemas/physiology_schema.json"),
            TableKind::Screen => include_str!("../../schemas/screen_schema.json"),
            TableKind::Fluxes => include_str!("../../schemas/fluxes_schema.json"),
            TableKind::ProteinAbundances => {
                include_str!("../../schemas/protein_abundances_schema.json")
            }
        }
    }

    /// Parse the bundled schema document for this table kind.
    pub fn schema(&self) -> Result<SchemaDoc> {
        Ok(serde_json::from_str(self.raw())?)
    }

    /// Logical name, as used in upload requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Media => "media",
            TableKind::Strains => "strains",
            TableKind::SampleInformation => "sample_information",
            TableKind::Physiology => "physiology",
            TableKind::Screen => "screen",
            TableKind::Fluxes => "fluxes",
            TableKind::ProteinAbundances => "protein_abundances",
        }
    }
}
