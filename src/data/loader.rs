//! CSV tick loader
//!
//! Reads equity and option tick files, normalizes their headers, coerces
//! cell values and drops unusable rows. Every dropped row is counted by
//! reason in a [`LoadReport`] so nothing disappears without a trace.
//!
//! Required columns:
//! - equity: Timestamp, LTP, BuyPrice
//! - options: Timestamp, LTP, BuyPrice, StrikePrice, OpenInterest,
//!   OptionsType and one of DTE / ExpiryDate
//!
//! Optional option columns: IV, Delta (used as-is when present).

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};

use super::columns::{Column, ColumnMap};
use crate::core::{EquityTick, OptionTick, OptionType, SurfaceError, SurfaceResult};

pub const EQUITY_COLUMNS: &[Column] = &[Column::Timestamp, Column::Ltp, Column::BuyPrice];

pub const OPTION_COLUMNS: &[Column] = &[
    Column::Timestamp,
    Column::Ltp,
    Column::BuyPrice,
    Column::StrikePrice,
    Column::OpenInterest,
    Column::OptionsType,
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%Y%m%d", "%d-%b-%Y", "%d/%m/%Y", "%d%b%Y"];

/// Why a row was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    MissingLtp,
    NonPositiveLtp,
    BadTimestamp,
    BadStrike,
    BadOptionType,
    MissingExpiry,
    /// No underlying price at or before the option tick
    NoSpot,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::MissingLtp => "missing LTP",
            DropReason::NonPositiveLtp => "non-positive LTP",
            DropReason::BadTimestamp => "unparseable timestamp",
            DropReason::BadStrike => "missing or non-positive strike",
            DropReason::BadOptionType => "unknown option type",
            DropReason::MissingExpiry => "missing DTE / expiry",
            DropReason::NoSpot => "no spot price available",
        };
        f.write_str(s)
    }
}

/// Row-count audit of one load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub source: String,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl LoadReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_insert(0) += 1;
    }

    /// Drop a row that was already counted as kept
    pub fn demote(&mut self, reason: DropReason) {
        self.rows_kept = self.rows_kept.saturating_sub(1);
        self.record_drop(reason);
    }

    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn log(&self) {
        tracing::info!(
            "Loaded {}: {} rows read, {} kept, {} dropped",
            self.source,
            self.rows_read,
            self.rows_kept,
            self.dropped_total()
        );
        for (reason, count) in &self.dropped {
            tracing::warn!("{}: dropped {} row(s) with {}", self.source, count, reason);
        }
    }
}

/// Coercive number parsing: blanks, `-`, `NaN` and junk are missing.
/// Thousands separators are ignored.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| *c != ',').collect();
    match cleaned.trim() {
        "" | "-" => None,
        text => text.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Parse the timestamp spellings seen in vendor files.
/// Offsets are dropped, keeping exchange wall-clock time.
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let text = cell.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse an expiry date, accepting any timestamp spelling as well
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let text = cell.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    parse_timestamp(text).map(|dt| dt.date())
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader)
}

fn open(path: &Path) -> SurfaceResult<File> {
    if !path.exists() {
        return Err(SurfaceError::invalid_input(format!(
            "input file not found: {}",
            path.display()
        )));
    }
    Ok(File::open(path)?)
}

/// Fields every tick shares; `None` means the row was dropped
fn base_fields(
    map: &ColumnMap,
    record: &StringRecord,
    report: &mut LoadReport,
) -> Option<(NaiveDateTime, f64)> {
    let ltp = match map.get(record, Column::Ltp).and_then(parse_number) {
        Some(v) => v,
        None => {
            report.record_drop(DropReason::MissingLtp);
            return None;
        }
    };
    if ltp <= 0.0 {
        report.record_drop(DropReason::NonPositiveLtp);
        return None;
    }

    match map.get(record, Column::Timestamp).and_then(parse_timestamp) {
        Some(ts) => Some((ts, ltp)),
        None => {
            report.record_drop(DropReason::BadTimestamp);
            None
        }
    }
}

/// Read equity ticks from any CSV source
pub fn read_equity_ticks<R: Read>(
    reader: R,
    source: &str,
) -> SurfaceResult<(Vec<EquityTick>, LoadReport)> {
    let mut rdr = csv_reader(reader);
    let map = ColumnMap::from_headers(rdr.headers()?);
    map.require(EQUITY_COLUMNS)?;

    let mut report = LoadReport::new(source);
    let mut ticks = Vec::new();

    for record in rdr.records() {
        let record = record?;
        report.rows_read += 1;

        let Some((timestamp, ltp)) = base_fields(&map, &record, &mut report) else {
            continue;
        };
        ticks.push(EquityTick {
            timestamp,
            ltp,
            buy_price: map.get(&record, Column::BuyPrice).and_then(parse_number),
        });
    }

    ticks.sort_by_key(|t| t.timestamp);
    report.rows_kept = ticks.len();
    Ok((ticks, report))
}

/// Read option ticks from any CSV source
pub fn read_option_ticks<R: Read>(
    reader: R,
    source: &str,
) -> SurfaceResult<(Vec<OptionTick>, LoadReport)> {
    let mut rdr = csv_reader(reader);
    let map = ColumnMap::from_headers(rdr.headers()?);
    map.require(OPTION_COLUMNS)?;
    map.require_any(&[Column::Dte, Column::ExpiryDate])?;

    let mut report = LoadReport::new(source);
    let mut ticks = Vec::new();

    for record in rdr.records() {
        let record = record?;
        report.rows_read += 1;

        let Some((timestamp, ltp)) = base_fields(&map, &record, &mut report) else {
            continue;
        };

        let strike = match map.get(&record, Column::StrikePrice).and_then(parse_number) {
            Some(k) if k > 0.0 => k,
            _ => {
                report.record_drop(DropReason::BadStrike);
                continue;
            }
        };

        let Some(option_type) = map.get(&record, Column::OptionsType).and_then(OptionType::from_label) else {
            report.record_drop(DropReason::BadOptionType);
            continue;
        };

        let dte = match map.get(&record, Column::Dte).and_then(parse_number) {
            Some(d) => Some(d.max(0.0)),
            None => map
                .get(&record, Column::ExpiryDate)
                .and_then(parse_date)
                .map(|expiry| ((expiry - timestamp.date()).num_days() as f64).max(0.0)),
        };
        let Some(dte) = dte else {
            report.record_drop(DropReason::MissingExpiry);
            continue;
        };

        ticks.push(OptionTick {
            timestamp,
            ltp,
            buy_price: map.get(&record, Column::BuyPrice).and_then(parse_number),
            strike,
            option_type,
            open_interest: map.get(&record, Column::OpenInterest).and_then(parse_number),
            dte,
            implied_vol: map
                .get(&record, Column::ImpliedVol)
                .and_then(parse_number)
                .filter(|v| *v > 0.0),
            delta: map.get(&record, Column::Delta).and_then(parse_number),
        });
    }

    ticks.sort_by_key(|t| t.timestamp);
    report.rows_kept = ticks.len();
    Ok((ticks, report))
}

/// Load an equity tick CSV
pub fn load_equity_ticks(path: &Path) -> SurfaceResult<(Vec<EquityTick>, LoadReport)> {
    let file = open(path)?;
    let (ticks, report) = read_equity_ticks(file, &path.display().to_string())?;
    report.log();
    Ok((ticks, report))
}

/// Load an option tick CSV
pub fn load_option_ticks(path: &Path) -> SurfaceResult<(Vec<OptionTick>, LoadReport)> {
    let file = open(path)?;
    let (ticks, report) = read_option_ticks(file, &path.display().to_string())?;
    report.log();
    Ok((ticks, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("105.5"), Some(105.5));
        assert_eq!(parse_number(" 1,234.5 "), Some(1234.5));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-3"), Some(-3.0));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 5, 29)
            .unwrap()
            .and_hms_opt(9, 15, 30)
            .unwrap();

        assert_eq!(parse_timestamp("2025-05-29 09:15:30"), Some(expected));
        assert_eq!(parse_timestamp("2025-05-29T09:15:30"), Some(expected));
        assert_eq!(parse_timestamp("29-05-2025 09:15:30"), Some(expected));
        assert_eq!(parse_timestamp("2025-05-29T09:15:30+05:30"), Some(expected));
        assert!(parse_timestamp("2025-05-29 09:15:30.250").is_some());
        assert_eq!(
            parse_timestamp("2025-05-29"),
            NaiveDate::from_ymd_opt(2025, 5, 29).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_parse_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 5, 29);
        assert_eq!(parse_date("20250529"), expected);
        assert_eq!(parse_date("29-May-2025"), expected);
        assert_eq!(parse_date("2025-05-29 15:30:00"), expected);
    }

    #[test]
    fn test_equity_rows_dropped_and_counted() {
        let csv = "\
Timestamp,LTP,BuyPrice
2025-05-29 09:15:02,1401.5,1401.0
2025-05-29 09:15:01,1400.0,
2025-05-29 09:15:03,,1400.0
2025-05-29 09:15:04,0,1400.0
not a time,1402.0,1401.0
2025-05-29 09:15:05,-1,1400.0
";
        let (ticks, report) = read_equity_ticks(csv.as_bytes(), "test").unwrap();

        assert_eq!(report.rows_read, 6);
        assert_eq!(report.rows_kept, 2);
        assert_eq!(report.dropped_for(DropReason::MissingLtp), 1);
        assert_eq!(report.dropped_for(DropReason::NonPositiveLtp), 2);
        assert_eq!(report.dropped_for(DropReason::BadTimestamp), 1);
        assert_eq!(report.rows_kept + report.dropped_total(), report.rows_read);

        // Sorted by timestamp, missing buy price kept as None
        assert_eq!(ticks[0].ltp, 1400.0);
        assert_eq!(ticks[0].buy_price, None);
        assert_eq!(ticks[1].buy_price, Some(1401.0));
    }

    #[test]
    fn test_equity_missing_column() {
        let csv = "Timestamp,LTP\n2025-05-29 09:15:00,100\n";
        let err = read_equity_ticks(csv.as_bytes(), "test").unwrap_err();
        assert!(err.is_data_format());
    }

    #[test]
    fn test_option_rows() {
        let csv = "\
Timestamp,LTP,BuyPrice,StrikePrice,OpenInterest,OptionsType,ExpiryDate,IV
2025-05-20 09:15:00,105,104,100,1200,CE,29-May-2025,
2025-05-20 09:16:00,95,94,110,800,PE,2025-05-29,0.25
2025-05-20 09:17:00,95,94,0,800,PE,2025-05-29,
2025-05-20 09:18:00,95,94,110,800,FUT,2025-05-29,
2025-05-20 09:19:00,95,94,110,800,PE,,
";
        let (ticks, report) = read_option_ticks(csv.as_bytes(), "test").unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(report.dropped_for(DropReason::BadStrike), 1);
        assert_eq!(report.dropped_for(DropReason::BadOptionType), 1);
        assert_eq!(report.dropped_for(DropReason::MissingExpiry), 1);

        assert_eq!(ticks[0].option_type, OptionType::Call);
        assert_eq!(ticks[0].dte, 9.0);
        assert_eq!(ticks[0].open_interest, Some(1200.0));
        assert_eq!(ticks[0].implied_vol, None);
        assert_eq!(ticks[1].implied_vol, Some(0.25));
    }

    #[test]
    fn test_option_needs_expiry_column() {
        let csv = "Timestamp,LTP,BuyPrice,StrikePrice,OpenInterest,OptionsType\n";
        let err = read_option_ticks(csv.as_bytes(), "test").unwrap_err();
        assert!(err.is_data_format());
        assert!(err.to_string().contains("DTE"));
    }
}
