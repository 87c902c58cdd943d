//! Numerical models
//!
//! Implements:
//! - Black-Scholes (pricing, delta, implied volatility)
//! - Brent's bracketed root finder
//! - Delaunay triangulation and piecewise-linear gap filling

pub mod black_scholes;
pub mod brent;
pub mod delaunay;
pub mod interpolation;

pub use black_scholes::*;
pub use brent::*;
pub use delaunay::*;
pub use interpolation::*;
