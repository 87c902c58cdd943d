//! Transform summaries

use crate::data::LoadReport;
use crate::models::FillStats;

/// Where each row's implied volatility came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IvStats {
    /// Taken from an IV column
    pub supplied: usize,
    /// Solved by Black-Scholes inversion
    pub solved: usize,
    /// Inversion failed; the row carries the NaN sentinel
    pub failed: usize,
}

/// Outcome of one transform
#[derive(Debug, Clone, PartialEq)]
pub struct TransformReport {
    pub load: LoadReport,
    /// Time points
    pub nt: usize,
    /// Space points
    pub nx: usize,
    pub valid_cells: usize,
    pub iv: IvStats,
    pub iv_fill: FillStats,
    /// Cells whose delta was priced from the gap-filled IV
    pub delta_priced: usize,
    pub delta_fill: FillStats,
}

impl TransformReport {
    pub fn new(load: LoadReport) -> Self {
        Self {
            load,
            nt: 0,
            nx: 0,
            valid_cells: 0,
            iv: IvStats::default(),
            iv_fill: FillStats::default(),
            delta_priced: 0,
            delta_fill: FillStats::default(),
        }
    }

    pub fn total_cells(&self) -> usize {
        self.nt * self.nx
    }

    pub fn log(&self) {
        tracing::info!(
            "{}: {} x {} grid, {}/{} valid cells from {} rows",
            self.load.source,
            self.nt,
            self.nx,
            self.valid_cells,
            self.total_cells(),
            self.load.rows_kept
        );
        if self.iv != IvStats::default() {
            tracing::info!(
                "IV: {} supplied, {} solved, {} failed; {} cells interpolated, {} extrapolated",
                self.iv.supplied,
                self.iv.solved,
                self.iv.failed,
                self.iv_fill.interpolated,
                self.iv_fill.extrapolated
            );
        }
        if self.delta_priced > 0 {
            tracing::info!("Delta priced from filled IV in {} cells", self.delta_priced);
        }
        if self.iv_fill.unfilled > 0 || self.delta_fill.unfilled > 0 {
            tracing::warn!(
                "{} IV and {} delta cells had no source values and were zero-filled",
                self.iv_fill.unfilled,
                self.delta_fill.unfilled
            );
        }
    }
}
