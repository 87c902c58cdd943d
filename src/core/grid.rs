//! Grid axes and cell aggregation
//!
//! A grid is the product of a time axis and a space axis. Rows are placed in
//! the cell whose axis values are nearest to the row's coordinates; several
//! rows in one cell are combined with [`RunningMean`] (continuous channels)
//! or logical OR (flags).

use serde::{Deserialize, Serialize};

use super::error::{SurfaceError, SurfaceResult};

/// Relative tolerance used to merge nearly-equal samples on a `Unique` axis
const UNIQUE_TOLERANCE: f64 = 1e-12;

/// How an axis is derived from row coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AxisSpec {
    /// One grid point per distinct sample value
    Unique,
    /// `count` uniform bins between the sample min and max, keyed by centre
    Bins { count: usize },
}

impl Default for AxisSpec {
    fn default() -> Self {
        Self::Unique
    }
}

/// A sorted, strictly increasing set of grid coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    values: Vec<f64>,
}

impl Axis {
    /// Build an axis from row samples. Non-finite samples are ignored.
    pub fn from_samples(samples: &[f64], spec: AxisSpec) -> SurfaceResult<Self> {
        let mut finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(SurfaceError::invalid_input("axis has no finite samples"));
        }
        finite.sort_by(f64::total_cmp);

        match spec {
            AxisSpec::Unique => {
                let mut values: Vec<f64> = Vec::with_capacity(finite.len());
                for v in finite {
                    match values.last() {
                        Some(&last) if (v - last).abs() <= UNIQUE_TOLERANCE * last.abs().max(1.0) => {}
                        _ => values.push(v),
                    }
                }
                Ok(Self { values })
            }
            AxisSpec::Bins { count } => {
                if count == 0 {
                    return Err(SurfaceError::config("bin count must be positive"));
                }
                let lo = finite[0];
                let hi = finite[finite.len() - 1];
                if hi - lo <= UNIQUE_TOLERANCE * lo.abs().max(1.0) {
                    return Ok(Self::single(lo));
                }
                let width = (hi - lo) / count as f64;
                let values = (0..count).map(|i| lo + (i as f64 + 0.5) * width).collect();
                Ok(Self { values })
            }
        }
    }

    /// Axis holding one point
    pub fn single(value: f64) -> Self {
        Self { values: vec![value] }
    }

    /// `n` evenly spaced points from `start` to `end` inclusive.
    /// A single point sits at `start`.
    pub fn linspace(start: f64, end: f64, n: usize) -> Self {
        let values = match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { end } else { start + i as f64 * step })
                    .collect()
            }
        };
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the grid point nearest to `value`; ties go to the lower index
    pub fn nearest_index(&self, value: f64) -> usize {
        let n = self.values.len();
        if n <= 1 {
            return 0;
        }
        let idx = self.values.partition_point(|&v| v < value);
        if idx == 0 {
            return 0;
        }
        if idx >= n {
            return n - 1;
        }
        let below = value - self.values[idx - 1];
        let above = self.values[idx] - value;
        if above < below {
            idx
        } else {
            idx - 1
        }
    }
}

/// Incremental mean that skips non-finite contributions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) {
        if value.is_finite() {
            self.sum += value;
            self.count += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_axis() {
        let axis = Axis::from_samples(&[0.3, 0.1, 0.3, f64::NAN, 0.2, 0.1 + 1e-15], AxisSpec::Unique)
            .unwrap();
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.values(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_binned_axis() {
        let axis = Axis::from_samples(&[0.0, 1.0, 0.4], AxisSpec::Bins { count: 4 }).unwrap();
        assert_eq!(axis.len(), 4);
        assert!((axis.values()[0] - 0.125).abs() < 1e-12);
        assert!((axis.values()[3] - 0.875).abs() < 1e-12);
        assert_eq!(axis.nearest_index(0.4), 1);
        assert_eq!(axis.nearest_index(1.0), 3);

        // Degenerate range collapses to one point
        let flat = Axis::from_samples(&[2.0, 2.0], AxisSpec::Bins { count: 8 }).unwrap();
        assert_eq!(flat.values(), &[2.0]);

        assert!(Axis::from_samples(&[1.0], AxisSpec::Bins { count: 0 }).is_err());
        assert!(Axis::from_samples(&[f64::NAN], AxisSpec::Unique).is_err());
    }

    #[test]
    fn test_nearest_index() {
        let axis = Axis::from_samples(&[0.0, 1.0, 2.0], AxisSpec::Unique).unwrap();
        assert_eq!(axis.nearest_index(-5.0), 0);
        assert_eq!(axis.nearest_index(0.4), 0);
        assert_eq!(axis.nearest_index(0.5), 0); // tie goes low
        assert_eq!(axis.nearest_index(0.6), 1);
        assert_eq!(axis.nearest_index(2.0), 2);
        assert_eq!(axis.nearest_index(9.0), 2);
    }

    #[test]
    fn test_linspace() {
        assert_eq!(Axis::linspace(0.0, 1.0, 1).values(), &[0.0]);
        assert_eq!(Axis::linspace(0.0, 1.0, 3).values(), &[0.0, 0.5, 1.0]);
        assert!(Axis::linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_running_mean() {
        let mut mean = RunningMean::default();
        assert_eq!(mean.value(), None);
        mean.push(1.0);
        mean.push(f64::NAN);
        mean.push(3.0);
        assert_eq!(mean.count(), 2);
        assert_eq!(mean.value(), Some(2.0));
    }
}
