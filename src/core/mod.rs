//! Core data types for the surface pipeline
//!
//! Defines fundamental types:
//! - OptionType: call / put side of a contract
//! - EquityTick / OptionTick: cleaned input rows
//! - Axis / RunningMean: grid coordinates and cell aggregation
//! - SurfaceBundle: the packaged output

pub mod option;
pub mod tick;
pub mod grid;
pub mod bundle;
pub mod error;

pub use option::*;
pub use tick::*;
pub use grid::*;
pub use bundle::*;
pub use error::*;
