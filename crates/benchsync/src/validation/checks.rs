//! Semantic row checks: cross-reference and grammar checks that run after
//! the structural schema pass.

use crate::cache::CacheView;
use crate::error::Result;
use crate::gateway::Project;
use crate::genotype::parse_genotype;
use crate::input::DataTable;
use crate::vocab::SynonymMapper;

use super::report::Issue;

/// Issue code shared by all semantic checks.
const BAD_VALUE: &str = "bad-value";

/// One row handed to a semantic check.
pub struct RowContext<'a> {
    /// One-based row number counting the header as row 1.
    pub row_number: usize,
    pub headers: &'a [String],
    pub cells: &'a [String],
}

impl<'a> RowContext<'a> {
    /// Non-null cells whose header satisfies the predicate, as
    /// (one-based column number, value) pairs.
    pub fn cells_where<F>(&self, header_matches: F) -> impl Iterator<Item = (usize, &'a str)>
    where
        F: Fn(&str) -> bool,
    {
        let headers = self.headers;
        let cells = self.cells;
        headers
            .iter()
            .zip(cells.iter())
            .enumerate()
            .filter(move |(_, (header, value))| {
                header_matches(header) && !DataTable::is_null_value(value)
            })
            .map(|(index, (_, value))| (index + 1, value.as_str()))
    }
}

/// A semantic check applied to each data row.
///
/// A returned `Err` damages only the current row; the engine converts it to
/// a single `check-error` finding and keeps validating.
pub trait RowCheck: Send + Sync {
    fn inspect(&self, row: &RowContext<'_>) -> Result<Vec<Issue>>;
}

type HeaderPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;
type ValuePredicate = Box<dyn Fn(&str) -> Result<bool> + Send + Sync>;

/// Generic identifier membership check. Flags every non-null cell in
/// matching columns whose value the predicate does not recognize.
struct IdentifierCheck {
    header_matches: HeaderPredicate,
    known: ValuePredicate,
    /// Message template with `{row_number}`, `{value}` and `{column_number}`
    /// placeholders. These messages are stable contracts; downstream
    /// consumers dispatch on their content.
    message: &'static str,
}

impl RowCheck for IdentifierCheck {
    fn inspect(&self, row: &RowContext<'_>) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        for (column_number, value) in row.cells_where(&self.header_matches) {
            if (self.known)(value)? {
                continue;
            }
            let message = self
                .message
                .replace("{row_number}", &row.row_number.to_string())
                .replace("{value}", value)
                .replace("{column_number}", &column_number.to_string());
            issues.push(Issue::cell(BAD_VALUE, message, row.row_number, column_number));
        }
        Ok(issues)
    }
}

/// Flags compound synonyms the mapper cannot resolve to a ChEBI name.
/// Applies to any column whose header contains `compound_name`.
pub fn compound_name_unknown(mapper: SynonymMapper) -> Box<dyn RowCheck> {
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("compound_name")),
        known: Box::new(move |value| Ok(mapper(value).is_ok())),
        message: "Row {row_number} has unknown compound name \"{value}\" in column \
                  {column_number}, expected valid chebi name, see https://www.ebi.ac.uk/chebi/",
    })
}

/// Flags medium names absent from the cache. Applies to any column whose
/// header contains `medium`.
pub fn medium_name_unknown(view: &CacheView) -> Box<dyn RowCheck> {
    let media = view.media.clone();
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("medium")),
        known: Box::new(move |value| Ok(media.contains(value))),
        message: "Row {row_number} has unknown medium name \"{value}\" in column \
                  {column_number} definition perhaps not uploaded yet",
    })
}

/// Flags strain aliases not registered within the project.
pub fn strain_alias_unknown(view: &CacheView, project: &Project) -> Box<dyn RowCheck> {
    let strains = view.strains.clone();
    let code = project.code.clone();
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("strain")),
        known: Box::new(move |value| Ok(strains.contains(&(code.clone(), value.to_string())))),
        message: "Row {row_number} has unknown strain alias \"{value}\" in column \
                  {column_number} definition perhaps not uploaded yet",
    })
}

/// Flags experiment identifiers not registered within the project.
pub fn experiment_identifier_unknown(view: &CacheView, project: &Project) -> Box<dyn RowCheck> {
    let experiments = view.experiments.clone();
    let code = project.code.clone();
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("experiment")),
        known: Box::new(move |value| {
            Ok(experiments.contains(&(code.clone(), value.to_string())))
        }),
        message: "Row {row_number} has unknown experiment \"{value}\" in column \
                  {column_number} definition perhaps not uploaded yet",
    })
}

fn accession_of(xref_id: &str) -> &str {
    xref_id
        .split_once(':')
        .map(|(_, accession)| accession)
        .unwrap_or(xref_id)
}

/// Flags `xref_id` values whose accession is not a known reaction.
pub fn reaction_id_unknown(view: &CacheView) -> Box<dyn RowCheck> {
    let reactions = view.reactions.clone();
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("xref_id")),
        known: Box::new(move |value| Ok(reactions.contains(accession_of(value)))),
        message: "Row {row_number} has unknown reaction identifier \"{value}\" in column \
                  {column_number}",
    })
}

/// Flags `xref_id` values whose accession is not a known protein.
pub fn protein_id_unknown(view: &CacheView) -> Box<dyn RowCheck> {
    let proteins = view.proteins.clone();
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("xref_id")),
        known: Box::new(move |value| Ok(proteins.contains(accession_of(value)))),
        message: "Row {row_number} has unknown protein identifier \"{value}\" in column \
                  {column_number}",
    })
}

/// Flags genotype cells that do not parse as gnomic. Applies to any column
/// whose header contains `genotype`.
pub fn genotype_not_gnomic() -> Box<dyn RowCheck> {
    Box::new(IdentifierCheck {
        header_matches: Box::new(|header| header.contains("genotype")),
        known: Box::new(|value| Ok(parse_genotype(value).is_ok())),
        message: "Row {row_number} has bad genotype definition \"{value}\" in column \
                  {column_number}, expected gnomic",
    })
}
