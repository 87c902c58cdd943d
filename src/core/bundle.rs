//! Output bundle
//!
//! The complete artifact of one transform: grid axes, complex surface ψ,
//! feature tensor, validity mask and the two identifying strings. A bundle
//! is inert data; serializing and reloading it reproduces it exactly.

use ndarray::{Array1, Array2, ArrayD};
use num_complex::Complex32;

use super::error::{SurfaceError, SurfaceResult};

/// Named entries of a serialized bundle, in write order
pub const BUNDLE_ENTRIES: [&str; 7] = ["x", "tt", "uu", "features", "mask", "symbol", "expiry"];

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceBundle {
    /// Spatial grid (log-moneyness), length Nx
    pub x: Array1<f64>,
    /// Time grid, length Nt
    pub tt: Array1<f64>,
    /// ψ = price level + i · smoothed return, shape (Nt, Nx)
    pub uu: Array2<Complex32>,
    /// (Nt, Nx, F) for options, (Nt, F) for equity
    pub features: ArrayD<f32>,
    /// True where the cell had at least one valid observation
    pub mask: Array2<bool>,
    pub symbol: String,
    pub expiry: String,
}

impl SurfaceBundle {
    /// (Nt, Nx)
    pub fn shape(&self) -> (usize, usize) {
        (self.tt.len(), self.x.len())
    }

    pub fn feature_count(&self) -> usize {
        self.features.shape().last().copied().unwrap_or(0)
    }

    pub fn valid_cells(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Check that every array agrees with the grid axes
    pub fn validate(&self) -> SurfaceResult<()> {
        let (nt, nx) = self.shape();

        if self.uu.dim() != (nt, nx) {
            return Err(SurfaceError::invalid_input(format!(
                "uu has shape {:?}, expected ({}, {})",
                self.uu.dim(),
                nt,
                nx
            )));
        }
        if self.mask.dim() != (nt, nx) {
            return Err(SurfaceError::invalid_input(format!(
                "mask has shape {:?}, expected ({}, {})",
                self.mask.dim(),
                nt,
                nx
            )));
        }

        let shape = self.features.shape();
        let ok = match shape.len() {
            3 => shape[0] == nt && shape[1] == nx,
            2 => shape[0] == nt && nx == 1,
            _ => false,
        };
        if !ok {
            return Err(SurfaceError::invalid_input(format!(
                "features has shape {:?}, incompatible with grid ({}, {})",
                shape, nt, nx
            )));
        }

        Ok(())
    }
}
