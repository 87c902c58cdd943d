//! Tick records
//!
//! One cleaned CSV row each. Records are built once by the loader and never
//! mutated afterwards.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::option::OptionType;

/// Fields shared by every tick the signal stage looks at
pub trait PriceObservation {
    fn timestamp(&self) -> NaiveDateTime;
    /// Last traded price, always > 0 after cleaning
    fn ltp(&self) -> f64;
    fn buy_price(&self) -> Option<f64>;
}

/// Equity trade tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityTick {
    pub timestamp: NaiveDateTime,
    pub ltp: f64,
    pub buy_price: Option<f64>,
}

impl PriceObservation for EquityTick {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn ltp(&self) -> f64 {
        self.ltp
    }

    fn buy_price(&self) -> Option<f64> {
        self.buy_price
    }
}

/// Option trade tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTick {
    pub timestamp: NaiveDateTime,
    pub ltp: f64,
    pub buy_price: Option<f64>,
    pub strike: f64,
    pub option_type: OptionType,
    pub open_interest: Option<f64>,
    /// Days to expiry
    pub dte: f64,
    /// Vendor-supplied implied volatility, if the file carries one
    pub implied_vol: Option<f64>,
    /// Vendor-supplied delta, if the file carries one
    pub delta: Option<f64>,
}

impl OptionTick {
    /// Log-moneyness ln(S/K) against the given spot
    pub fn log_moneyness(&self, spot: f64) -> f64 {
        (spot / self.strike).ln()
    }

    /// Time to expiry in years
    pub fn time_to_expiry(&self, day_count: f64) -> f64 {
        self.dte / day_count
    }
}

impl PriceObservation for OptionTick {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn ltp(&self) -> f64 {
        self.ltp
    }

    fn buy_price(&self) -> Option<f64> {
        self.buy_price
    }
}

/// Underlying prices used as the spot reference for option rows
///
/// Lookups are backward as-of: the last price at or before the query time.
#[derive(Debug, Clone, Default)]
pub struct SpotSeries {
    points: Vec<(NaiveDateTime, f64)>,
}

impl SpotSeries {
    pub fn from_ticks(ticks: &[EquityTick]) -> Self {
        let mut points: Vec<(NaiveDateTime, f64)> =
            ticks.iter().map(|t| (t.timestamp, t.ltp)).collect();
        points.sort_by_key(|(ts, _)| *ts);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Last spot at or before `ts`
    pub fn spot_at(&self, ts: NaiveDateTime) -> Option<f64> {
        let idx = self.points.partition_point(|(t, _)| *t <= ts);
        if idx == 0 {
            None
        } else {
            Some(self.points[idx - 1].1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_spot_asof_lookup() {
        let ticks = vec![
            EquityTick { timestamp: ts(9, 30), ltp: 1400.0, buy_price: None },
            EquityTick { timestamp: ts(9, 15), ltp: 1390.0, buy_price: None },
            EquityTick { timestamp: ts(10, 0), ltp: 1410.0, buy_price: None },
        ];
        let spots = SpotSeries::from_ticks(&ticks);

        assert_eq!(spots.len(), 3);
        assert_eq!(spots.spot_at(ts(9, 0)), None);
        assert_eq!(spots.spot_at(ts(9, 15)), Some(1390.0));
        assert_eq!(spots.spot_at(ts(9, 45)), Some(1400.0));
        assert_eq!(spots.spot_at(ts(15, 30)), Some(1410.0));
    }

    #[test]
    fn test_log_moneyness() {
        let tick = OptionTick {
            timestamp: ts(9, 15),
            ltp: 105.0,
            buy_price: Some(104.0),
            strike: 100.0,
            option_type: OptionType::Call,
            open_interest: None,
            dte: 73.0,
            implied_vol: None,
            delta: None,
        };

        assert!((tick.log_moneyness(105.0) - (1.05f64).ln()).abs() < 1e-12);
        assert!((tick.time_to_expiry(365.0) - 0.2).abs() < 1e-12);
    }
}
