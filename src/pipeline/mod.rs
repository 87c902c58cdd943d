//! Transform pipeline
//!
//! Load -> clean -> derive signals -> grid -> aggregate / fill -> bundle.
//! The options and equity transforms share everything up to the grid.

pub mod batch;
pub mod config;
pub mod equity;
pub mod options;
pub mod report;

pub use batch::*;
pub use config::*;
pub use equity::*;
pub use options::*;
pub use report::*;
