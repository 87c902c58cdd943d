//! Per-row market signals
//!
//! Derived for every cleaned tick, in timestamp order:
//! - smoothed return: trailing mean of simple returns
//! - entropy: `ln(1 + s)`, `s` the trailing sample std of returns (0 when
//!   fewer than two returns are available), so always finite and >= 0
//! - volatility shock: entropy strictly above its `vol_shock_quantile`
//!   quantile over the whole series (linear interpolation between ranks)
//! - open gap: `|LTP - BuyPrice| > gap_threshold`
//! - event day: the timestamp occurs more than once in the series

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::rolling::{pct_change, quantile_linear, rolling_mean, rolling_std};
use crate::core::PriceObservation;

/// Signal thresholds and windows shared by both transforms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Rows in the trailing window for return dispersion
    pub entropy_window: usize,
    /// Quantile of the entropy distribution above which a shock is flagged
    pub vol_shock_quantile: f64,
    /// Absolute LTP / buy-price distance that counts as a gap
    pub gap_threshold: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            entropy_window: 5,
            vol_shock_quantile: 0.85,
            gap_threshold: 5.0,
        }
    }
}

/// Signals for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSignals {
    /// Trailing mean return, 0 when undefined
    pub smoothed_return: f64,
    pub entropy: f64,
    pub vol_shock: bool,
    pub open_gap: bool,
    pub event_day: bool,
}

/// Derive signals for rows already sorted by timestamp
pub fn derive_signals<T: PriceObservation>(
    rows: &[T],
    return_window: usize,
    config: &SignalConfig,
) -> Vec<RowSignals> {
    let prices: Vec<f64> = rows.iter().map(|r| r.ltp()).collect();
    let returns = pct_change(&prices);
    // Partial windows average the returns they have
    let smoothed = rolling_mean(&returns, return_window, 1);
    let dispersion = rolling_std(&returns, config.entropy_window);

    let entropy: Vec<f64> = dispersion.iter().map(|s| s.unwrap_or(0.0).ln_1p()).collect();
    let shocks = vol_shock_flags(&entropy, config.vol_shock_quantile);
    let timestamps: Vec<NaiveDateTime> = rows.iter().map(|r| r.timestamp()).collect();
    let events = event_day_flags(&timestamps);

    rows.iter()
        .enumerate()
        .map(|(i, row)| RowSignals {
            smoothed_return: smoothed[i].unwrap_or(0.0),
            entropy: entropy[i],
            vol_shock: shocks[i],
            open_gap: open_gap(row.ltp(), row.buy_price(), config.gap_threshold),
            event_day: events[i],
        })
        .collect()
}

/// `entropy > quantile(entropy, q)` element-wise
pub fn vol_shock_flags(entropy: &[f64], q: f64) -> Vec<bool> {
    match quantile_linear(entropy, q) {
        Some(threshold) => entropy.iter().map(|&e| e > threshold).collect(),
        None => vec![false; entropy.len()],
    }
}

/// True for every timestamp that appears more than once
pub fn event_day_flags(timestamps: &[NaiveDateTime]) -> Vec<bool> {
    let mut counts: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(timestamps.len());
    for ts in timestamps {
        *counts.entry(*ts).or_insert(0) += 1;
    }
    timestamps.iter().map(|ts| counts[ts] > 1).collect()
}

/// A missing buy price never counts as a gap
pub fn open_gap(ltp: f64, buy_price: Option<f64>, threshold: f64) -> bool {
    buy_price.map(|b| (ltp - b).abs() > threshold).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EquityTick;
    use chrono::NaiveDate;

    fn tick(sec: u32, ltp: f64, buy: Option<f64>) -> EquityTick {
        EquityTick {
            timestamp: NaiveDate::from_ymd_opt(2025, 5, 29)
                .unwrap()
                .and_hms_opt(9, 15, sec)
                .unwrap(),
            ltp,
            buy_price: buy,
        }
    }

    #[test]
    fn test_entropy_non_negative() {
        let rows: Vec<EquityTick> = [100.0, 101.0, 99.5, 103.0, 98.0, 100.0, 100.0, 120.0]
            .iter()
            .enumerate()
            .map(|(i, &p)| tick(i as u32, p, Some(p)))
            .collect();
        let signals = derive_signals(&rows, 5, &SignalConfig::default());

        assert_eq!(signals.len(), rows.len());
        assert!(signals.iter().all(|s| s.entropy.is_finite() && s.entropy >= 0.0));
        // Fewer than two returns: no dispersion yet
        assert_eq!(signals[0].entropy, 0.0);
        assert_eq!(signals[1].entropy, 0.0);
        assert!(signals[2].entropy > 0.0);
        assert_eq!(signals[0].smoothed_return, 0.0);
        assert!((signals[1].smoothed_return - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_vol_shock_matches_quantile() {
        let entropy = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        // h = 10 * 0.85 = 8.5 -> threshold 0.85
        let flags = vol_shock_flags(&entropy, 0.85);
        let flagged: Vec<f64> = entropy.iter().zip(&flags).filter(|(_, f)| **f).map(|(e, _)| *e).collect();
        assert_eq!(flagged, vec![0.9, 1.0]);

        // Constant series never exceeds its own quantile
        assert!(vol_shock_flags(&[0.2; 4], 0.85).iter().all(|f| !f));
        assert!(vol_shock_flags(&[], 0.85).is_empty());
    }

    #[test]
    fn test_event_day_flags_every_duplicate() {
        let rows = vec![tick(0, 100.0, None), tick(0, 101.0, None), tick(1, 102.0, None)];
        let timestamps: Vec<_> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(event_day_flags(&timestamps), vec![true, true, false]);
    }

    #[test]
    fn test_open_gap_is_absolute() {
        assert!(open_gap(100.0, Some(94.0), 5.0));
        assert!(open_gap(94.0, Some(100.0), 5.0));
        assert!(!open_gap(100.0, Some(95.0), 5.0));
        assert!(!open_gap(100.0, None, 5.0));
    }
}
