//! Data input and output
//!
//! Handles:
//! - Header normalization for vendor tick CSVs
//! - Loading and cleaning equity / option ticks
//! - MAT v5 serialization of surface bundles

pub mod columns;
pub mod loader;
pub mod matfile;

pub use columns::*;
pub use loader::*;
pub use matfile::*;
