//! Options transform
//!
//! Option ticks -> (normalized time-to-expiry x log-moneyness) grid.
//!
//! 1. Resolve a spot per row (as-of equity join, or the row's own LTP)
//! 2. Derive row signals, implied volatility and delta
//! 3. Place rows on the grid and average them per cell
//! 4. Fill missing IV in valid cells over the populated cells, then price a
//!    delta for cells that lack one from the filled IV
//! 5. Pack surface, features and mask into a bundle

use std::path::Path;

use ndarray::{Array1, Array2, Array3};
use num_complex::Complex32;

use super::config::PipelineConfig;
use super::report::{IvStats, TransformReport};
use crate::core::{Axis, OptionTick, OptionType, RunningMean, SpotSeries, SurfaceBundle, SurfaceError, SurfaceResult};
use crate::data::{load_equity_ticks, load_option_ticks, write_bundle, DropReason, LoadReport};
use crate::features::{derive_signals, quantile_linear, RowSignals};
use crate::models::{black_scholes, fill_missing, implied_volatility};

/// Feature channel order of an options bundle
pub const OPTION_FEATURES: [&str; 7] = [
    "OpenInterest",
    "Delta",
    "Entropy",
    "VolShock",
    "OpenGap",
    "EventDay",
    "IV",
];

/// Per-row quantities that go onto the grid
#[derive(Debug, Clone, Copy)]
struct RowValues {
    x: f64,
    t: f64,
    ltp: f64,
    iv: f64,
    delta: f64,
    open_interest: f64,
    option_type: OptionType,
    signals: RowSignals,
}

#[derive(Debug, Clone, Copy, Default)]
struct CellAccumulator {
    rows: usize,
    ltp: RunningMean,
    smoothed_return: RunningMean,
    iv: RunningMean,
    delta: RunningMean,
    open_interest: RunningMean,
    entropy: RunningMean,
    open_gap: bool,
    event_day: bool,
    calls: usize,
    puts: usize,
}

impl CellAccumulator {
    fn push(&mut self, row: &RowValues) {
        self.rows += 1;
        match row.option_type {
            OptionType::Call => self.calls += 1,
            OptionType::Put => self.puts += 1,
        }
        self.ltp.push(row.ltp);
        self.smoothed_return.push(row.signals.smoothed_return);
        self.iv.push(row.iv);
        self.delta.push(row.delta);
        self.open_interest.push(row.open_interest);
        self.entropy.push(row.signals.entropy);
        self.open_gap |= row.signals.open_gap;
        self.event_day |= row.signals.event_day;
    }

    /// Majority option type of the cell, calls on a tie
    fn option_type(&self) -> OptionType {
        if self.puts > self.calls {
            OptionType::Put
        } else {
            OptionType::Call
        }
    }
}

/// Keep rows with a spot; drops are moved into the load report
fn resolve_spots(
    ticks: Vec<OptionTick>,
    spots: Option<&SpotSeries>,
    load: &mut LoadReport,
) -> (Vec<OptionTick>, Vec<f64>) {
    let mut kept = Vec::with_capacity(ticks.len());
    let mut spot_values = Vec::with_capacity(ticks.len());

    for tick in ticks {
        let spot = match spots {
            Some(series) => series.spot_at(tick.timestamp),
            None => Some(tick.ltp),
        };
        match spot {
            Some(s) if s > 0.0 => {
                kept.push(tick);
                spot_values.push(s);
            }
            _ => load.demote(DropReason::NoSpot),
        }
    }

    if let Some(series) = spots {
        let dropped = load.dropped_for(DropReason::NoSpot);
        if dropped > 0 {
            tracing::warn!(
                "{} option row(s) precede the first of {} equity ticks and were dropped",
                dropped,
                series.len()
            );
        }
    }

    (kept, spot_values)
}

/// Supplied IV, else Black-Scholes inversion; NaN when inversion fails
fn row_implied_vol(tick: &OptionTick, spot: f64, config: &PipelineConfig, stats: &mut IvStats) -> f64 {
    if let Some(iv) = tick.implied_vol.filter(|v| v.is_finite()) {
        stats.supplied += 1;
        return iv;
    }

    let o = &config.options;
    match implied_volatility(
        tick.ltp,
        spot,
        tick.strike,
        o.risk_free_rate,
        tick.time_to_expiry(o.day_count),
        tick.option_type,
        &o.iv_solver,
    ) {
        Ok(iv) => {
            stats.solved += 1;
            iv
        }
        Err(e) => {
            stats.failed += 1;
            tracing::debug!(
                "IV solve failed at {} (K={}, {}, LTP={}): {}",
                tick.timestamp,
                tick.strike,
                tick.option_type,
                tick.ltp,
                e
            );
            f64::NAN
        }
    }
}

fn row_delta(tick: &OptionTick, spot: f64, iv: f64, config: &PipelineConfig) -> f64 {
    if let Some(d) = tick.delta.filter(|v| v.is_finite()) {
        return d;
    }
    if !iv.is_finite() {
        return f64::NAN;
    }
    let o = &config.options;
    black_scholes::delta(
        spot,
        tick.strike,
        o.risk_free_rate,
        iv,
        tick.time_to_expiry(o.day_count),
        tick.option_type,
    )
}

fn zero_if_non_finite(v: f64) -> f32 {
    if v.is_finite() {
        v as f32
    } else {
        0.0
    }
}

/// Build an options bundle from cleaned, timestamp-sorted ticks
///
/// `spots` is the underlying series for the as-of join; without it each
/// row is its own spot reference.
pub fn build_options_bundle(
    ticks: Vec<OptionTick>,
    load: LoadReport,
    spots: Option<&SpotSeries>,
    expiry: &str,
    config: &PipelineConfig,
) -> SurfaceResult<(SurfaceBundle, TransformReport)> {
    let mut report = TransformReport::new(load);
    let (ticks, spot_values) = resolve_spots(ticks, spots, &mut report.load);

    if ticks.is_empty() {
        return Err(SurfaceError::data_format(format!(
            "{}: no option rows left after cleaning",
            report.load.source
        )));
    }

    let signals = derive_signals(&ticks, config.options.return_window, &config.signals);

    let max_dte = ticks.iter().map(|t| t.dte).fold(0.0, f64::max);
    let rows: Vec<RowValues> = ticks
        .iter()
        .zip(&spot_values)
        .zip(&signals)
        .map(|((tick, &spot), &sig)| {
            let iv = row_implied_vol(tick, spot, config, &mut report.iv);
            RowValues {
                x: tick.log_moneyness(spot),
                t: if max_dte > 0.0 { tick.dte / max_dte } else { 0.0 },
                ltp: tick.ltp,
                iv,
                delta: row_delta(tick, spot, iv, config),
                open_interest: tick.open_interest.unwrap_or(f64::NAN),
                option_type: tick.option_type,
                signals: sig,
            }
        })
        .collect();

    if report.iv.failed > 0 {
        tracing::warn!(
            "IV inversion failed for {} of {} rows; those cells are gap-filled",
            report.iv.failed,
            rows.len()
        );
    }

    // Grid
    let xs: Vec<f64> = rows.iter().map(|r| r.x).collect();
    let ts: Vec<f64> = rows.iter().map(|r| r.t).collect();
    let space = Axis::from_samples(&xs, config.options.space_axis)?;
    let time = Axis::from_samples(&ts, config.options.time_axis)?;
    let (nt, nx) = (time.len(), space.len());

    let mut cells = Array2::<CellAccumulator>::default((nt, nx));
    for row in &rows {
        cells[[time.nearest_index(row.t), space.nearest_index(row.x)]].push(row);
    }

    let mask = cells.map(|c| c.rows > 0);
    let mean_or_nan = |f: fn(&CellAccumulator) -> RunningMean| cells.map(|c| f(c).value().unwrap_or(f64::NAN));

    let mut iv = mean_or_nan(|c| c.iv);
    let mut delta = mean_or_nan(|c| c.delta);
    let ltp = mean_or_nan(|c| c.ltp);
    let smoothed = mean_or_nan(|c| c.smoothed_return);
    let open_interest = mean_or_nan(|c| c.open_interest);
    let entropy = mean_or_nan(|c| c.entropy);

    // Gap filling over valid cells only
    let extrapolation = config.options.extrapolation;
    report.iv_fill = fill_missing(&mut iv, &mask, time.values(), space.values(), extrapolation);

    // Cells without a row delta get one priced at the filled IV, with the cell's own option type.
    // Delta is interpolated only when no IV source existed at all.
    if report.iv_fill.unfilled == 0 {
        let o = &config.options;
        for ((ti, xi), d) in delta.indexed_iter_mut() {
            let vol = iv[[ti, xi]];
            if !mask[[ti, xi]] || d.is_finite() || !vol.is_finite() {
                continue;
            }
            // d1 needs only ln(S/K): a unit strike at spot e^x
            let years = time.values()[ti] * max_dte / o.day_count;
            *d = black_scholes::delta(
                space.values()[xi].exp(),
                1.0,
                o.risk_free_rate,
                vol,
                years,
                cells[[ti, xi]].option_type(),
            );
            report.delta_priced += 1;
        }
    }
    report.delta_fill = fill_missing(&mut delta, &mask, time.values(), space.values(), extrapolation);

    // Vol shock on cell-mean entropy, thresholded over valid cells
    let valid_entropy: Vec<f64> = entropy
        .iter()
        .zip(mask.iter())
        .filter(|(_, m)| **m)
        .map(|(&e, _)| e)
        .collect();
    let shock_threshold = quantile_linear(&valid_entropy, config.signals.vol_shock_quantile);

    let mut uu = Array2::<Complex32>::zeros((nt, nx));
    let mut features = Array3::<f32>::zeros((nt, nx, OPTION_FEATURES.len()));

    for ((ti, xi), cell) in cells.indexed_iter() {
        if cell.rows == 0 {
            continue;
        }
        uu[[ti, xi]] = Complex32::new(zero_if_non_finite(ltp[[ti, xi]]), zero_if_non_finite(smoothed[[ti, xi]]));

        let e = entropy[[ti, xi]];
        let vol_shock = shock_threshold.map(|q| e > q).unwrap_or(false);
        let channels = [
            zero_if_non_finite(open_interest[[ti, xi]]),
            zero_if_non_finite(delta[[ti, xi]]),
            zero_if_non_finite(e),
            f32::from(u8::from(vol_shock)),
            f32::from(u8::from(cell.open_gap)),
            f32::from(u8::from(cell.event_day)),
            zero_if_non_finite(iv[[ti, xi]]),
        ];
        for (k, v) in channels.into_iter().enumerate() {
            features[[ti, xi, k]] = v;
        }
    }

    let bundle = SurfaceBundle {
        x: Array1::from(space.values().to_vec()),
        tt: Array1::from(time.values().to_vec()),
        uu,
        features: features.into_dyn(),
        mask,
        symbol: config.symbol.clone(),
        expiry: expiry.to_string(),
    };
    bundle.validate()?;

    report.nt = nt;
    report.nx = nx;
    report.valid_cells = bundle.valid_cells();
    Ok((bundle, report))
}

/// Load an option CSV (plus an optional equity CSV for spot), transform it
/// and write the bundle to `output`
pub fn create_options_mat(
    options_csv: &Path,
    expiry: &str,
    output: &Path,
    equity_csv: Option<&Path>,
    config: &PipelineConfig,
) -> SurfaceResult<TransformReport> {
    tracing::info!("Options transform: {} (expiry {})", options_csv.display(), expiry);

    let (ticks, load) = load_option_ticks(options_csv)?;
    let spots = match equity_csv {
        Some(path) => {
            let (equity, _) = load_equity_ticks(path)?;
            Some(SpotSeries::from_ticks(&equity))
        }
        None => None,
    };

    let (bundle, report) = build_options_bundle(ticks, load, spots.as_ref(), expiry, config)?;
    write_bundle(&bundle, output)?;
    report.log();
    Ok(report)
}
