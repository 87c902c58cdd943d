//! Feature engineering
//!
//! Rolling statistics and the per-row signals (smoothed return, entropy,
//! volatility shock, open gap, event day) that feed the grid.

pub mod rolling;
pub mod signals;

pub use rolling::*;
pub use signals::*;
