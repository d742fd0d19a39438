//! Price and volume series over stored market days
//!
//! A [`MarketQuery`] selects up to [`MAX_QUERY_REGIONS`] regions and
//! [`MAX_QUERY_TYPES`] types over an inclusive date range. Daily series are
//! returned newest first in pages of at most [`DAILY_PAGE_SIZE`] rows; a page
//! only ever holds whole days, and [`MarketSeries::next_before`] is the cursor
//! for the following page. Monthly and annual series aggregate every matching
//! day and are not paged.

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::NumericId;

/// Most regions one query may select
pub const MAX_QUERY_REGIONS: usize = 5;

/// Most types one query may select
pub const MAX_QUERY_TYPES: usize = 5;

/// Rows per page of a daily series
pub const DAILY_PAGE_SIZE: usize = 30;

/// Rejected query parameters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// More than [`MAX_QUERY_REGIONS`] regions
    #[error("too many regions selected ({0}); must be {MAX_QUERY_REGIONS} or fewer")]
    TooManyRegions(usize),

    /// More than [`MAX_QUERY_TYPES`] types
    #[error("too many types selected ({0}); must be {MAX_QUERY_TYPES} or fewer")]
    TooManyTypes(usize),

    /// Range start after range end
    #[error("date range starts after it ends: {start} > {end}")]
    InvertedRange {
        /// Range start
        start: NaiveDate,
        /// Range end
        end: NaiveDate,
    },
}

/// Time bucket of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One row per stored day
    Daily,
    /// Aggregated per calendar month
    Monthly,
    /// Aggregated per calendar year
    Annual,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
            Granularity::Annual => "annual",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Granularity::Daily),
            "monthly" => Ok(Granularity::Monthly),
            "annual" => Ok(Granularity::Annual),
            _ => Err(format!(
                "Invalid granularity: {s}. Valid options: daily, monthly, annual"
            )),
        }
    }
}

/// Series selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketQuery {
    /// Time bucket
    pub granularity: Granularity,
    /// First day of the range (inclusive)
    pub start: NaiveDate,
    /// Last day of the range (inclusive)
    pub end: NaiveDate,
    /// Selected regions
    pub regions: BTreeSet<NumericId>,
    /// Selected types
    pub types: BTreeSet<NumericId>,
    /// Daily paging cursor: only days strictly before this one
    pub before: Option<NaiveDate>,
}

impl MarketQuery {
    /// Query over `start..=end` with nothing selected yet
    pub fn new(granularity: Granularity, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            granularity,
            start,
            end,
            regions: BTreeSet::new(),
            types: BTreeSet::new(),
            before: None,
        }
    }

    /// Select regions
    pub fn regions(mut self, ids: impl IntoIterator<Item = NumericId>) -> Self {
        self.regions.extend(ids);
        self
    }

    /// Select types
    pub fn types(mut self, ids: impl IntoIterator<Item = NumericId>) -> Self {
        self.types.extend(ids);
        self
    }

    /// Continue a daily series from a previous page's cursor
    ///
    /// Ignored by monthly and annual queries.
    pub fn before(mut self, day: NaiveDate) -> Self {
        self.before = Some(day);
        self
    }

    /// Check selection limits and the range
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.regions.len() > MAX_QUERY_REGIONS {
            return Err(QueryError::TooManyRegions(self.regions.len()));
        }
        if self.types.len() > MAX_QUERY_TYPES {
            return Err(QueryError::TooManyTypes(self.types.len()));
        }
        if self.start > self.end {
            return Err(QueryError::InvertedRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// True when nothing can match
    pub fn selects_nothing(&self) -> bool {
        self.regions.is_empty() || self.types.is_empty()
    }
}

/// Bucket a series row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Period {
    /// One day
    Day(NaiveDate),
    /// One calendar month
    Month {
        /// Year
        year: i32,
        /// Month, 1-based
        month: u32,
    },
    /// One calendar year
    Year(i32),
}

impl Period {
    /// The day of a daily row
    pub fn day(&self) -> Option<NaiveDate> {
        match self {
            Period::Day(day) => Some(*day),
            _ => None,
        }
    }

    /// Year the period falls in
    pub fn year(&self) -> i32 {
        match self {
            Period::Day(day) => day.year(),
            Period::Month { year, .. } | Period::Year(year) => *year,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day(day) => write!(f, "{day}"),
            Period::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Period::Year(year) => write!(f, "{year:04}"),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Region or type id with its stored label, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelledId {
    /// Numeric id
    pub id: NumericId,
    /// Stored label; `None` when the id was never labelled
    pub name: Option<String>,
}

/// Price statistics of one region/type in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    /// Bucket
    pub period: Period,
    /// Region
    pub region: LabelledId,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: LabelledId,
    /// Mean of the daily averages
    pub average: f64,
    /// Highest daily high
    pub highest: f64,
    /// Lowest daily low
    pub lowest: f64,
}

/// Traded volume of one region/type in one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumePoint {
    /// Bucket
    pub period: Period,
    /// Region
    pub region: LabelledId,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: LabelledId,
    /// Units traded
    pub volume: u64,
    /// Orders filled
    pub order_count: u64,
}

/// Row of a series
pub trait SeriesPoint {
    /// Bucket of the row
    fn period(&self) -> Period;
}

impl SeriesPoint for PricePoint {
    fn period(&self) -> Period {
        self.period
    }
}

impl SeriesPoint for VolumePoint {
    fn period(&self) -> Period {
        self.period
    }
}

/// One page of a series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSeries<T> {
    /// Rows, newest period first
    pub rows: Vec<T>,
    /// Cursor for the next daily page; `None` when this page is the last
    pub next_before: Option<NaiveDate>,
}

impl<T> MarketSeries<T> {
    /// Series with no rows and no further page
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            next_before: None,
        }
    }
}

/// Cut newest-first daily rows to one page of whole days
///
/// `rows` holds up to `page_size + 1` rows; the extra row only signals that
/// another page exists. A day that straddles the page boundary is left for
/// the next page unless it is the only day on this one.
pub fn paginate<T: SeriesPoint>(mut rows: Vec<T>, page_size: usize) -> MarketSeries<T> {
    if rows.len() <= page_size {
        return MarketSeries {
            rows,
            next_before: None,
        };
    }

    let boundary = rows[page_size].period().day();
    rows.truncate(page_size);

    if boundary.is_some() {
        let whole_days = rows
            .iter()
            .rposition(|row| row.period().day() != boundary)
            .map_or(0, |last| last + 1);
        if whole_days > 0 {
            rows.truncate(whole_days);
        }
    }

    let next_before = rows.last().and_then(|row| row.period().day());
    MarketSeries { rows, next_before }
}
