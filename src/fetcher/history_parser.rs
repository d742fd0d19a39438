//! Market history archive parsing
//!
//! An archive is a bzip2-compressed CSV file. The first row is a header that
//! must name every column in [`REQUIRED_COLUMNS`] (case-insensitive, any
//! order); extra columns are ignored. Any malformed row fails the whole file.

use bzip2::read::BzDecoder;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::io::Read;
use std::str::FromStr;
use tracing::debug;

use super::RawDayBlob;
use crate::{MarketDay, NumericId, RecordRow};

/// Columns every archive header must contain
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "date",
    "region_id",
    "type_id",
    "average",
    "highest",
    "lowest",
    "volume",
    "order_count",
];

/// Parse errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Payload is not valid bzip2
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Header row lacks required columns
    #[error("header missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    /// CSV structure error (ragged row, invalid UTF-8, ...)
    #[error("malformed CSV at line {line}: {message}")]
    Csv {
        /// 1-based line number
        line: u64,
        /// Reader error
        message: String,
    },

    /// A field could not be converted to its type
    #[error("invalid {field} at line {line}: {value:?}")]
    InvalidField {
        /// 1-based line number
        line: u64,
        /// Column name
        field: &'static str,
        /// Raw field text
        value: String,
    },

    /// A row belongs to a different day than the archive
    #[error("row at line {line} is dated {found}, expected {expected}")]
    DateMismatch {
        /// 1-based line number
        line: u64,
        /// Archive date
        expected: NaiveDate,
        /// Row date
        found: NaiveDate,
    },

    /// A (region, type) pair appears twice
    #[error("duplicate region {region_id} / type {type_id} at line {line}")]
    DuplicateKey {
        /// 1-based line number
        line: u64,
        /// Region id
        region_id: NumericId,
        /// Type id
        type_id: NumericId,
    },

    /// A row failed record validation
    #[error("invalid record at line {line}: {message}")]
    InvalidRecord {
        /// 1-based line number
        line: u64,
        /// Validation message
        message: String,
    },
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    date: usize,
    region_id: usize,
    type_id: usize,
    average: usize,
    highest: usize,
    lowest: usize,
    volume: usize,
    order_count: usize,
}

impl ColumnIndices {
    fn from_header(header: &StringRecord) -> Result<Self, ParseError> {
        let position = |name: &str| {
            header
                .iter()
                .position(|column| column.trim().eq_ignore_ascii_case(name))
        };

        let found: Vec<Option<usize>> = REQUIRED_COLUMNS.iter().map(|name| position(name)).collect();
        let missing: Vec<&'static str> = REQUIRED_COLUMNS
            .iter()
            .zip(&found)
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingColumns(missing));
        }

        let idx: Vec<usize> = found.into_iter().flatten().collect();
        Ok(Self {
            date: idx[0],
            region_id: idx[1],
            type_id: idx[2],
            average: idx[3],
            highest: idx[4],
            lowest: idx[5],
            volume: idx[6],
            order_count: idx[7],
        })
    }
}

/// Decompress a bzip2 payload
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut decoder = BzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Decompress(e.to_string()))?;
    Ok(out)
}

/// Decompress and parse one archive into a [`MarketDay`]
pub fn parse_day(blob: &RawDayBlob) -> Result<MarketDay, ParseError> {
    let csv = decompress(&blob.bytes)?;
    debug!(date = %blob.date, compressed = blob.bytes.len(), decompressed = csv.len(), "Archive decompressed");
    parse_csv(blob.date, csv.as_slice())
}

/// Parse uncompressed CSV text for `date`
pub fn parse_csv<R: Read>(date: NaiveDate, reader: R) -> Result<MarketDay, ParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let header = reader.headers().map_err(|e| csv_error(&e))?.clone();
    let columns = ColumnIndices::from_header(&header)?;

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for result in reader.records() {
        let row = result.map_err(|e| csv_error(&e))?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let record = parse_row(&columns, &row, line)?;

        if record.date != date {
            return Err(ParseError::DateMismatch {
                line,
                expected: date,
                found: record.date,
            });
        }
        record
            .validate()
            .map_err(|message| ParseError::InvalidRecord { line, message })?;
        if !seen.insert(record.key()) {
            return Err(ParseError::DuplicateKey {
                line,
                region_id: record.region_id,
                type_id: record.type_id,
            });
        }

        records.push(record);
    }

    Ok(MarketDay::new(date, records))
}

fn csv_error(e: &csv::Error) -> ParseError {
    ParseError::Csv {
        line: e.position().map(|p| p.line()).unwrap_or_default(),
        message: e.to_string(),
    }
}

fn parse_row(columns: &ColumnIndices, row: &StringRecord, line: u64) -> Result<RecordRow, ParseError> {
    let field = |idx: usize| row.get(idx).unwrap_or("");
    let invalid = |name: &'static str, idx: usize| ParseError::InvalidField {
        line,
        field: name,
        value: field(idx).to_string(),
    };

    let date = NaiveDate::parse_from_str(field(columns.date), "%Y-%m-%d")
        .map_err(|_| invalid("date", columns.date))?;
    let region_id = field(columns.region_id)
        .parse::<NumericId>()
        .map_err(|_| invalid("region_id", columns.region_id))?;
    let type_id = field(columns.type_id)
        .parse::<NumericId>()
        .map_err(|_| invalid("type_id", columns.type_id))?;
    let average = parse_decimal(field(columns.average)).ok_or_else(|| invalid("average", columns.average))?;
    let highest = parse_decimal(field(columns.highest)).ok_or_else(|| invalid("highest", columns.highest))?;
    let lowest = parse_decimal(field(columns.lowest)).ok_or_else(|| invalid("lowest", columns.lowest))?;
    let volume = field(columns.volume)
        .parse::<u64>()
        .map_err(|_| invalid("volume", columns.volume))?;
    let order_count = field(columns.order_count)
        .parse::<u64>()
        .map_err(|_| invalid("order_count", columns.order_count))?;

    Ok(RecordRow {
        date,
        region_id,
        type_id,
        average,
        highest,
        lowest,
        volume,
        order_count,
    })
}

/// Plain or scientific notation ("0.01", "1e-05")
fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
