pub mod csv;
pub mod rules;

pub use crate::csv::{
    ColumnAliases, ColumnHints, FormatError, IngestionParser, ParsedBatch, ParserConfig,
    RowDefect, RowDefectError,
};
pub use rules::{match_description, RuleMatcher, RuleSnapshot};
