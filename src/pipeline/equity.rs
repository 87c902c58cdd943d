//! Equity transform
//!
//! Equity ticks -> (synthetic time x single point) grid. Every cleaned row is
//! its own time step on `linspace(0, 1, N)`; the underlying sits at zero
//! log-moneyness, so `x = [0]`.

use std::path::Path;

use ndarray::{Array1, Array2};
use num_complex::Complex32;

use super::config::PipelineConfig;
use super::report::TransformReport;
use crate::core::{Axis, EquityTick, SurfaceBundle, SurfaceError, SurfaceResult};
use crate::data::{load_equity_ticks, write_bundle, LoadReport};
use crate::features::derive_signals;

/// Feature channel order of an equity bundle
pub const EQUITY_FEATURES: [&str; 4] = ["Entropy", "EventDay", "OpenGap", "VolShock"];

fn flag(value: bool) -> f32 {
    f32::from(u8::from(value))
}

/// Build an equity bundle from cleaned, timestamp-sorted ticks
pub fn build_equity_bundle(
    ticks: &[EquityTick],
    load: LoadReport,
    expiry: &str,
    config: &PipelineConfig,
) -> SurfaceResult<(SurfaceBundle, TransformReport)> {
    let mut report = TransformReport::new(load);
    if ticks.is_empty() {
        return Err(SurfaceError::data_format(format!(
            "{}: no equity rows left after cleaning",
            report.load.source
        )));
    }

    let signals = derive_signals(ticks, config.equity.return_window, &config.signals);
    let n = ticks.len();

    let uu = Array2::from_shape_fn((n, 1), |(i, _)| {
        Complex32::new(ticks[i].ltp as f32, signals[i].smoothed_return as f32)
    });
    let features = Array2::from_shape_fn((n, EQUITY_FEATURES.len()), |(i, k)| {
        let s = &signals[i];
        match k {
            0 => s.entropy as f32,
            1 => flag(s.event_day),
            2 => flag(s.open_gap),
            _ => flag(s.vol_shock),
        }
    });

    let bundle = SurfaceBundle {
        x: Array1::from(vec![0.0]),
        tt: Array1::from(Axis::linspace(0.0, 1.0, n).values().to_vec()),
        uu,
        features: features.into_dyn(),
        mask: Array2::from_elem((n, 1), true),
        symbol: config.symbol.clone(),
        expiry: expiry.to_string(),
    };
    bundle.validate()?;

    report.nt = n;
    report.nx = 1;
    report.valid_cells = n;
    Ok((bundle, report))
}

/// Load an equity CSV, transform it and write the bundle to `output`
pub fn create_equity_mat(
    equity_csv: &Path,
    expiry: &str,
    output: &Path,
    config: &PipelineConfig,
) -> SurfaceResult<TransformReport> {
    tracing::info!("Equity transform: {} (expiry {})", equity_csv.display(), expiry);

    let (ticks, load) = load_equity_ticks(equity_csv)?;
    let (bundle, report) = build_equity_bundle(&ticks, load, expiry, config)?;
    write_bundle(&bundle, output)?;
    report.log();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn test_shapes() {
        let ticks: Vec<EquityTick> = (0..6).map(|i| tick(i, 100.0 + i as f64, Some(100.0))).collect();
        let (bundle, report) =
            build_equity_bundle(&ticks, LoadReport::new("test"), "20250529", &PipelineConfig::default()).unwrap();

        assert_eq!(bundle.x.to_vec(), vec![0.0]);
        let expected = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
        assert_eq!(bundle.tt.len(), expected.len());
        assert!(bundle.tt.iter().zip(expected).all(|(t, e)| (t - e).abs() < 1e-12));
        assert_eq!(bundle.uu.dim(), (6, 1));
        assert_eq!(bundle.features.shape(), &[6, 4]);
        assert!(bundle.mask.iter().all(|&m| m));
        assert_eq!(report.valid_cells, 6);
        assert_eq!(bundle.uu[[3, 0]].re, 103.0);

        // LTP 105 vs buy 100 is not above the threshold
        assert_eq!(bundle.features[[5, 2]], 0.0);
    }

    #[test]
    fn test_repeated_timestamp_flags_event_day() {
        let ticks = vec![tick(0, 100.0, None), tick(0, 101.0, None)];
        let (bundle, _) =
            build_equity_bundle(&ticks, LoadReport::new("test"), "20250529", &PipelineConfig::default()).unwrap();

        assert_eq!(bundle.features[[0, 1]], 1.0);
        assert_eq!(bundle.features[[1, 1]], 1.0);
    }

    #[test]
    fn test_gap_flag() {
        let ticks = vec![tick(0, 100.0, Some(90.0)), tick(1, 100.0, Some(99.0))];
        let (bundle, _) =
            build_equity_bundle(&ticks, LoadReport::new("test"), "20250529", &PipelineConfig::default()).unwrap();

        assert_eq!(bundle.features[[0, 2]], 1.0);
        assert_eq!(bundle.features[[1, 2]], 0.0);
    }

    #[test]
    fn test_empty_input() {
        let err = build_equity_bundle(&[], LoadReport::new("test"), "20250529", &PipelineConfig::default())
            .unwrap_err();
        assert!(err.is_data_format());
    }
}
