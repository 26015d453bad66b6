//! Table validation: structural schema checks plus pluggable semantic row
//! checks, reported in a single machine-readable structure.

mod checks;
mod engine;
mod report;

pub use checks::{
    compound_name_unknown, experiment_identifier_unknown, genotype_not_gnomic,
    medium_name_unknown, protein_id_unknown, reaction_id_unknown, strain_alias_unknown,
    RowCheck, RowContext,
};
pub use engine::validate;
pub use report::{Issue, TableReport, ValidationReport};
