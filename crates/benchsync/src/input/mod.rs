//! Tabular input: CSV parsing and the in-memory table structure.

mod parser;
mod table;

pub use parser::{load_table, Parser, ParserConfig};
pub use table::{DataTable, SourceMetadata};
