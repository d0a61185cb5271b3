//! CSV ingestion: maps heterogeneous bank-export layouts onto
//! [`TransactionDraft`]s.
//!
//! Layout problems (no data, unknown columns) fail the whole batch with a
//! [`FormatError`]. Problems confined to one row become a [`RowDefect`] and the
//! row is left out of the drafts.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smartspend_core::{Money, TransactionDraft};
use std::str::FromStr;
use thiserror::Error;

/// Header names accepted for each logical field, compared after trimming and
/// lower-casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub date: Vec<String>,
    pub amount: Vec<String>,
    pub description: Vec<String>,
    pub debit: Vec<String>,
    pub credit: Vec<String>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            date: owned(&[
                "date",
                "transaction_date",
                "transaction date",
                "posted_date",
                "posted date",
                "trans_date",
            ]),
            amount: owned(&[
                "amount",
                "value",
                "trans_amount",
                "transaction amount",
            ]),
            description: owned(&[
                "description",
                "payee",
                "details",
                "memo",
                "transaction_details",
                "transaction details",
                "narrative",
            ]),
            debit: owned(&["debit", "withdrawal", "money out"]),
            credit: owned(&["credit", "deposit", "money in"]),
        }
    }
}

impl ColumnAliases {
    /// Appends extra aliases after the built-in ones.
    pub fn extend(&mut self, extra: ColumnAliases) {
        fn merge(into: &mut Vec<String>, from: Vec<String>) {
            for name in from {
                let name = normalize_header(&name);
                if !name.is_empty() && !into.contains(&name) {
                    into.push(name);
                }
            }
        }
        merge(&mut self.date, extra.date);
        merge(&mut self.amount, extra.amount);
        merge(&mut self.description, extra.description);
        merge(&mut self.debit, extra.debit);
        merge(&mut self.credit, extra.credit);
    }
}

/// Per-upload overrides naming the exact header for a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnHints {
    pub date: Option<String>,
    pub amount: Option<String>,
    pub description: Option<String>,
}

impl ColumnHints {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.amount.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub aliases: ColumnAliases,
    pub delimiter: char,
    /// Tried first; the common US/EU/ISO forms are tried after it.
    pub date_format: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            aliases: ColumnAliases::default(),
            delimiter: ',',
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Empty upload: no header or data rows")]
    Empty,
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("Invalid CSV format. Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("Column hint for {field} names '{header}', which is not in the header row")]
    UnknownHintColumn { field: &'static str, header: String },
    #[error("No data rows")]
    NoDataRows,
    #[error("No usable rows: all {} data rows are defective", .0.len())]
    NoUsableRows(Vec<RowDefect>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowDefectError {
    #[error("missing date")]
    MissingDate,
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error("missing amount")]
    MissingAmount,
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
    #[error("unreadable row: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDefect {
    /// 1-based data row number.
    pub row: usize,
    pub error: RowDefectError,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub drafts: Vec<TransactionDraft>,
    pub defects: Vec<RowDefect>,
}

impl ParsedBatch {
    pub fn total_rows(&self) -> usize {
        self.drafts.len() + self.defects.len()
    }
}

enum AmountColumns {
    Signed(usize),
    Split { debit: usize, credit: usize },
}

struct Layout {
    date: usize,
    description: usize,
    amount: AmountColumns,
}

pub struct IngestionParser {
    config: ParserConfig,
}

impl Default for IngestionParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl IngestionParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse(
        &self,
        raw_batch: &[u8],
        hints: Option<&ColumnHints>,
    ) -> Result<ParsedBatch, FormatError> {
        if raw_batch.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(FormatError::Empty);
        }

        let delimiter = u8::try_from(self.config.delimiter).unwrap_or(b',');
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(::csv::Trim::All)
            .delimiter(delimiter)
            .from_reader(raw_batch);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(FormatError::Empty);
        }
        let layout = self.resolve_layout(&headers, hints.unwrap_or(&ColumnHints::default()))?;

        let mut batch = ParsedBatch::default();
        for (idx, result) in reader.records().enumerate() {
            let row = idx + 1;
            let parsed = result
                .map_err(|e| RowDefectError::Unreadable(e.to_string()))
                .and_then(|record| self.parse_record(row, &record, &layout));
            match parsed {
                Ok(draft) => batch.drafts.push(draft),
                Err(error) => {
                    tracing::debug!(row, %error, "row excluded from batch");
                    batch.defects.push(RowDefect { row, error });
                }
            }
        }

        if batch.total_rows() == 0 {
            return Err(FormatError::NoDataRows);
        }
        if batch.drafts.is_empty() {
            return Err(FormatError::NoUsableRows(batch.defects));
        }
        Ok(batch)
    }

    fn resolve_layout(
        &self,
        headers: &[String],
        hints: &ColumnHints,
    ) -> Result<Layout, FormatError> {
        let aliases = &self.config.aliases;
        let date = find_column(headers, "date", hints.date.as_deref(), &aliases.date)?;
        let description = find_column(
            headers,
            "description",
            hints.description.as_deref(),
            &aliases.description,
        )?;
        let amount = match find_column(headers, "amount", hints.amount.as_deref(), &aliases.amount)? {
            Some(col) => Some(AmountColumns::Signed(col)),
            None => match (
                find_alias(headers, &aliases.debit),
                find_alias(headers, &aliases.credit),
            ) {
                (Some(debit), Some(credit)) => Some(AmountColumns::Split { debit, credit }),
                _ => None,
            },
        };

        let mut missing = Vec::new();
        if description.is_none() {
            missing.push("description");
        }
        if amount.is_none() {
            missing.push("amount");
        }
        if date.is_none() {
            missing.push("date");
        }
        match (date, description, amount) {
            (Some(date), Some(description), Some(amount)) => Ok(Layout {
                date,
                description,
                amount,
            }),
            _ => Err(FormatError::MissingColumns(missing)),
        }
    }

    fn parse_record(
        &self,
        row: usize,
        record: &::csv::StringRecord,
        layout: &Layout,
    ) -> Result<TransactionDraft, RowDefectError> {
        let cell = |col: usize| record.get(col).map(str::trim).filter(|s| !s.is_empty());

        let date = cell(layout.date).ok_or(RowDefectError::MissingDate)?;
        let date = parse_date(date, &self.config.date_format)?;

        let amount = match layout.amount {
            AmountColumns::Signed(col) => {
                parse_amount(cell(col).ok_or(RowDefectError::MissingAmount)?)?
            }
            AmountColumns::Split { debit, credit } => {
                let d = cell(debit).map(parse_amount).transpose()?;
                let c = cell(credit).map(parse_amount).transpose()?;
                match (d, c) {
                    (None, None) => return Err(RowDefectError::MissingAmount),
                    (d, c) => {
                        let d = d.unwrap_or_default().abs();
                        let c = c.unwrap_or_default().abs();
                        c - d
                    }
                }
            }
        };

        let description = cell(layout.description).unwrap_or_default().to_string();

        Ok(TransactionDraft {
            row,
            date,
            amount: Money::from_decimal(amount),
            description,
        })
    }
}

fn normalize_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn find_alias(headers: &[String], aliases: &[String]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
}

fn find_column(
    headers: &[String],
    field: &'static str,
    hint: Option<&str>,
    aliases: &[String],
) -> Result<Option<usize>, FormatError> {
    match hint {
        Some(hint) => {
            let wanted = normalize_header(hint);
            headers
                .iter()
                .position(|h| *h == wanted)
                .map(Some)
                .ok_or_else(|| FormatError::UnknownHintColumn {
                    field,
                    header: hint.to_string(),
                })
        }
        None => Ok(find_alias(headers, aliases)),
    }
}

fn parse_date(s: &str, format: &str) -> Result<NaiveDate, RowDefectError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Ok(date);
    }

    for fmt in &[
        "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    for fmt in &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    Err(RowDefectError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str) -> Result<Decimal, RowDefectError> {
    let s = s.trim();
    let (negative, inner) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned = inner.replace([',', '$', '€', '£', ' '], "");
    let dec = Decimal::from_str(&cleaned).map_err(|_| RowDefectError::InvalidAmount(s.to_string()))?;
    Ok(if negative { -dec } else { dec })
}
