//! # psi-surface - Tick Data to PINN Training Bundles
//!
//! Converts raw option and equity tick CSVs into fixed-shape tensors for a
//! physics-informed network that models price as a complex "wavefunction"
//! ψ = price level + i · smoothed return.
//!
//! ## Overview
//!
//! Both transforms run the same single pass:
//! load -> clean -> derive signals -> grid -> aggregate / fill -> bundle.
//!
//! - **Options**: (normalized time-to-expiry x log-moneyness) grid with seven
//!   feature channels (open interest, delta, entropy, volatility shock, open
//!   gap, event day, implied volatility)
//! - **Equity**: (synthetic time x single point) grid with four channels
//!
//! ## Key Components
//!
//! - **Loader**: header aliases, coercive parsing, per-reason drop counts
//! - **Black-Scholes**: pricing, delta and Brent implied-volatility inversion
//! - **Gap filling**: linear interpolation over a Delaunay triangulation,
//!   with a fixed extrapolation policy outside the hull
//! - **MAT v5**: the bundle container read by MATLAB and scipy
//!
//! ## Usage
//!
//! ```rust,no_run
//! use psi_surface::prelude::*;
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let report = create_options_mat(
//!     Path::new("OPT_RELIANCE_20250529.csv"),
//!     "20250529",
//!     Path::new("OPT_PINN_TRAIN_DATA_20250529.mat"),
//!     Some(Path::new("EQT_RELIANCE_20250529.csv")),
//!     &config,
//! ).unwrap();
//! println!("{} valid cells", report.valid_cells);
//!
//! let bundle = read_bundle(Path::new("OPT_PINN_TRAIN_DATA_20250529.mat")).unwrap();
//! assert_eq!(bundle.features.shape()[2], OPTION_FEATURES.len());
//! ```
//!
//! ## What This Crate Does NOT Do
//!
//! - Train or evaluate the network
//! - Stream or ingest ticks in real time
//! - Read compressed (v7) or HDF5-based (v7.3) MAT files

pub mod core;
pub mod data;
pub mod features;
pub mod models;
pub mod pipeline;

/// Prelude with commonly used types
pub mod prelude {
    // Core types
    pub use crate::core::{
        Axis, AxisSpec, EquityTick, OptionTick, OptionType, PriceObservation, SpotSeries,
        SurfaceBundle, SurfaceError, SurfaceResult, BUNDLE_ENTRIES,
    };

    // Data
    pub use crate::data::{
        load_equity_ticks, load_option_ticks, read_bundle, read_mat_file, write_bundle, DropReason,
        LoadReport, MatData, MatVariable,
    };

    // Features
    pub use crate::features::{derive_signals, RowSignals, SignalConfig};

    // Models
    pub use crate::models::{
        delta as bs_delta, implied_volatility, norm_cdf, price as bs_price, Extrapolation,
        IvSolverConfig, ScatteredInterpolator,
    };

    // Pipeline
    pub use crate::pipeline::{
        build_equity_bundle, build_options_bundle, create_equity_mat, create_options_mat,
        run_batch, BatchPlan, BatchSummary, EquityConfig, OptionsConfig, PipelineConfig,
        TransformReport, EQUITY_FEATURES, OPTION_FEATURES,
    };
}

// Re-export main types at crate root
pub use crate::core::{SurfaceBundle, SurfaceError, SurfaceResult};
pub use crate::pipeline::PipelineConfig;
