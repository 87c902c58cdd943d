//! Configuration for the surface pipeline

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{AxisSpec, SurfaceError, SurfaceResult};
use crate::features::SignalConfig;
use crate::models::{Extrapolation, IvSolverConfig};

/// Configuration for both transforms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Underlying symbol written into every bundle
    pub symbol: String,
    /// Thresholds shared by both transforms
    pub signals: SignalConfig,
    pub options: OptionsConfig,
    pub equity: EquityConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbol: "RELIANCE".to_string(),
            signals: SignalConfig::default(),
            options: OptionsConfig::default(),
            equity: EquityConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file; absent keys keep their defaults
    pub fn from_toml_file(path: &Path) -> SurfaceResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> SurfaceResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SurfaceError::config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SurfaceResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(SurfaceError::config("symbol must not be empty"));
        }

        let s = &self.signals;
        if s.entropy_window == 0 {
            return Err(SurfaceError::config("signals.entropy_window must be positive"));
        }
        if !(0.0..=1.0).contains(&s.vol_shock_quantile) {
            return Err(SurfaceError::config(format!(
                "signals.vol_shock_quantile {} outside [0, 1]",
                s.vol_shock_quantile
            )));
        }
        if !(s.gap_threshold >= 0.0) {
            return Err(SurfaceError::config("signals.gap_threshold must be non-negative"));
        }

        let o = &self.options;
        if o.return_window == 0 {
            return Err(SurfaceError::config("options.return_window must be positive"));
        }
        if !(o.day_count > 0.0) {
            return Err(SurfaceError::config("options.day_count must be positive"));
        }
        if !o.risk_free_rate.is_finite() {
            return Err(SurfaceError::config("options.risk_free_rate must be finite"));
        }
        let iv = &o.iv_solver;
        if !(iv.lower > 0.0 && iv.upper > iv.lower) {
            return Err(SurfaceError::config(format!(
                "options.iv_solver bracket [{}, {}] is empty",
                iv.lower, iv.upper
            )));
        }
        if iv.max_iter == 0 {
            return Err(SurfaceError::config("options.iv_solver.max_iter must be positive"));
        }
        for (name, spec) in [("time_axis", o.time_axis), ("space_axis", o.space_axis)] {
            if let AxisSpec::Bins { count: 0 } = spec {
                return Err(SurfaceError::config(format!("options.{} bin count must be positive", name)));
            }
        }

        if self.equity.return_window == 0 {
            return Err(SurfaceError::config("equity.return_window must be positive"));
        }

        Ok(())
    }
}

/// Options transform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Annual risk-free rate
    pub risk_free_rate: f64,
    /// Days per year for T = DTE / day_count
    pub day_count: f64,
    /// Rows in the smoothed-return window
    pub return_window: usize,
    pub iv_solver: IvSolverConfig,
    pub time_axis: AxisSpec,
    pub space_axis: AxisSpec,
    /// Policy for cells outside the convex hull of known values
    pub extrapolation: Extrapolation,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            day_count: 365.0,
            return_window: 3,
            iv_solver: IvSolverConfig::default(),
            time_axis: AxisSpec::Unique,
            space_axis: AxisSpec::Unique,
            extrapolation: Extrapolation::Nearest,
        }
    }
}

/// Equity transform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EquityConfig {
    /// Rows in the smoothed-return window
    pub return_window: usize,
}

impl Default for EquityConfig {
    fn default() -> Self {
        Self { return_window: 5 }
    }
}
