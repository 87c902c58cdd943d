//! Column names and header normalization
//!
//! Vendor files disagree on spelling (`LTP`, `Last Price`, `last_traded_price`
//! ...). Headers are reduced to lowercase alphanumerics and matched against
//! an alias table; the first matching header wins.

use std::collections::HashMap;

use csv::StringRecord;

use crate::core::{SurfaceError, SurfaceResult};

/// Logical input columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Timestamp,
    Ltp,
    BuyPrice,
    StrikePrice,
    OpenInterest,
    OptionsType,
    Dte,
    ExpiryDate,
    ImpliedVol,
    Delta,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Timestamp,
        Column::Ltp,
        Column::BuyPrice,
        Column::StrikePrice,
        Column::OpenInterest,
        Column::OptionsType,
        Column::Dte,
        Column::ExpiryDate,
        Column::ImpliedVol,
        Column::Delta,
    ];

    /// Name used in messages and documentation
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Column::Timestamp => "Timestamp",
            Column::Ltp => "LTP",
            Column::BuyPrice => "BuyPrice",
            Column::StrikePrice => "StrikePrice",
            Column::OpenInterest => "OpenInterest",
            Column::OptionsType => "OptionsType",
            Column::Dte => "DTE",
            Column::ExpiryDate => "ExpiryDate",
            Column::ImpliedVol => "IV",
            Column::Delta => "Delta",
        }
    }

    /// Normalized header spellings accepted for this column
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Column::Timestamp => &["timestamp", "time", "datetime", "tradetime", "date"],
            Column::Ltp => &["ltp", "lasttradedprice", "lastprice", "last"],
            Column::BuyPrice => &["buyprice", "bidprice", "bid", "buy"],
            Column::StrikePrice => &["strikeprice", "strike"],
            Column::OpenInterest => &["openinterest", "oi"],
            Column::OptionsType => &["optionstype", "optiontype", "opttype", "type", "right"],
            Column::Dte => &["dte", "daystoexpiry", "daystoexpiration"],
            Column::ExpiryDate => &["expirydate", "expiry", "expiration", "expirationdate"],
            Column::ImpliedVol => &["iv", "impliedvolatility", "impliedvol"],
            Column::Delta => &["delta"],
        }
    }
}

/// Lowercase, alphanumerics only: `" Strike_Price "` -> `"strikeprice"`
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Header position of each recognised column
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    indices: HashMap<Column, usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let mut indices = HashMap::new();

        for column in Column::ALL {
            let found = column
                .aliases()
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias));
            if let Some(idx) = found {
                indices.insert(column, idx);
            }
        }

        Self { indices }
    }

    pub fn has(&self, column: Column) -> bool {
        self.indices.contains_key(&column)
    }

    /// Fail with a `DataFormat` error naming every absent column
    pub fn require(&self, columns: &[Column]) -> SurfaceResult<()> {
        let missing: Vec<&str> = columns
            .iter()
            .filter(|c| !self.has(**c))
            .map(|c| c.canonical_name())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SurfaceError::data_format(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Require at least one of `columns`
    pub fn require_any(&self, columns: &[Column]) -> SurfaceResult<()> {
        if columns.iter().any(|c| self.has(*c)) {
            Ok(())
        } else {
            let names: Vec<&str> = columns.iter().map(|c| c.canonical_name()).collect();
            Err(SurfaceError::data_format(format!(
                "missing required column: one of {}",
                names.join(" / ")
            )))
        }
    }

    /// Trimmed cell text; `None` when the column is absent or the cell is blank
    pub fn get<'r>(&self, record: &'r StringRecord, column: Column) -> Option<&'r str> {
        let idx = *self.indices.get(&column)?;
        let value = record.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Strike_Price "), "strikeprice");
        assert_eq!(normalize_header("Last Traded Price"), "lasttradedprice");
        assert_eq!(normalize_header("OI"), "oi");
    }

    #[test]
    fn test_column_map() {
        let headers = StringRecord::from(vec!["Time Stamp", "ltp", "Buy Price", "Strike", "OI", "Option_Type", "DTE"]);
        let map = ColumnMap::from_headers(&headers);

        assert!(map.has(Column::Timestamp));
        assert!(map.has(Column::StrikePrice));
        assert!(map.has(Column::OpenInterest));
        assert!(!map.has(Column::ImpliedVol));
        assert!(map.require(&[Column::Timestamp, Column::Ltp, Column::BuyPrice]).is_ok());
        assert!(map.require_any(&[Column::Dte, Column::ExpiryDate]).is_ok());

        let record = StringRecord::from(vec!["2025-05-29 09:15:00", " 105.5 ", "", "100", "10", "CE", "5"]);
        assert_eq!(map.get(&record, Column::Ltp), Some("105.5"));
        assert_eq!(map.get(&record, Column::BuyPrice), None);
        assert_eq!(map.get(&record, Column::Delta), None);
    }

    #[test]
    fn test_missing_columns_reported() {
        let headers = StringRecord::from(vec!["Timestamp", "Price"]);
        let map = ColumnMap::from_headers(&headers);
        let err = map.require(&[Column::Timestamp, Column::Ltp, Column::BuyPrice]).unwrap_err();

        assert!(err.is_data_format());
        let msg = err.to_string();
        assert!(msg.contains("LTP"));
        assert!(msg.contains("BuyPrice"));
        assert!(!msg.contains("Timestamp"));
    }
}
