//! Gap filling on the (time, log-moneyness) grid
//!
//! Missing cells are filled from populated cells with a piecewise-linear
//! (degree-1) spline over the Delaunay triangulation of the populated cells.
//! Coordinates are rescaled to the unit square first so that the time and
//! moneyness axes weigh equally.
//!
//! When the populated cells all lie on one line (a single expiry, or a
//! single strike) the hull is that segment and values are interpolated
//! linearly along it.
//!
//! Outside the convex hull of the populated cells the value comes from the
//! [`Extrapolation`] policy. Spline extrapolation is never used.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::delaunay::Triangulation;

/// Policy for query points outside the convex hull of the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// Value of the nearest populated cell (lowest index on ties)
    #[default]
    Nearest,
    /// Zero
    Zero,
}

/// Distance (in unit-square coordinates) within which a query counts as
/// lying on a degenerate hull
const LINE_TOL: f64 = 1e-9;

/// Sources sorted along the line through a collinear point set
#[derive(Debug, Clone)]
struct LineHull {
    anchor: [f64; 2],
    direction: [f64; 2],
    /// (position along `direction`, source index), ascending
    stations: Vec<(f64, usize)>,
}

impl LineHull {
    fn new(points: &[[f64; 2]]) -> Self {
        let anchor = points[0];
        let far = points
            .iter()
            .map(|p| (p[0] - anchor[0]).hypot(p[1] - anchor[1]))
            .enumerate()
            .fold((0, 0.0), |best, (i, d)| if d > best.1 { (i, d) } else { best });

        let direction = if far.1 > 0.0 {
            let p = points[far.0];
            [(p[0] - anchor[0]) / far.1, (p[1] - anchor[1]) / far.1]
        } else {
            [1.0, 0.0]
        };

        let mut line = Self { anchor, direction, stations: Vec::with_capacity(points.len()) };
        for (i, p) in points.iter().enumerate() {
            let (s, _) = line.project(*p);
            line.stations.push((s, i));
        }
        line.stations.sort_by(|a, b| a.0.total_cmp(&b.0));
        line
    }

    /// Position along the line and perpendicular distance from it
    fn project(&self, q: [f64; 2]) -> (f64, f64) {
        let (dx, dy) = (q[0] - self.anchor[0], q[1] - self.anchor[1]);
        let along = dx * self.direction[0] + dy * self.direction[1];
        let across = dx * self.direction[1] - dy * self.direction[0];
        (along, across.abs())
    }

    fn interpolate(&self, q: [f64; 2], values: &[f64]) -> Option<f64> {
        let (s, off) = self.project(q);
        let (first, last) = (self.stations.first()?, self.stations.last()?);
        if off > LINE_TOL || s < first.0 - LINE_TOL || s > last.0 + LINE_TOL {
            return None;
        }

        let hi = self.stations.partition_point(|(pos, _)| *pos < s);
        if hi == 0 {
            return Some(values[first.1]);
        }
        if hi == self.stations.len() {
            return Some(values[last.1]);
        }
        let (s0, i0) = self.stations[hi - 1];
        let (s1, i1) = self.stations[hi];
        let span = s1 - s0;
        if span <= 0.0 {
            return Some(values[i1]);
        }
        let w = (s - s0) / span;
        Some((1.0 - w) * values[i0] + w * values[i1])
    }
}

/// Piecewise-linear interpolant over scattered 2-D points
#[derive(Debug, Clone)]
pub struct ScatteredInterpolator {
    triangulation: Triangulation,
    /// Set when the points span no triangle
    line: Option<LineHull>,
    values: Vec<f64>,
    origin: [f64; 2],
    scale: [f64; 2],
}

impl ScatteredInterpolator {
    /// `points` must be distinct and the same length as `values`.
    /// Returns `None` when there are no points.
    pub fn new(points: &[[f64; 2]], values: &[f64]) -> Option<Self> {
        if points.is_empty() || points.len() != values.len() {
            return None;
        }

        let mut origin = [f64::INFINITY; 2];
        let mut upper = [f64::NEG_INFINITY; 2];
        for p in points {
            for k in 0..2 {
                origin[k] = origin[k].min(p[k]);
                upper[k] = upper[k].max(p[k]);
            }
        }
        let mut scale = [1.0; 2];
        for k in 0..2 {
            let span = upper[k] - origin[k];
            if span > 0.0 {
                scale[k] = span;
            }
        }

        let normalized: Vec<[f64; 2]> = points
            .iter()
            .map(|p| [(p[0] - origin[0]) / scale[0], (p[1] - origin[1]) / scale[1]])
            .collect();

        let triangulation = Triangulation::new(&normalized);
        let line = triangulation.is_empty().then(|| LineHull::new(&normalized));

        Some(Self {
            triangulation,
            line,
            values: values.to_vec(),
            origin,
            scale,
        })
    }

    fn normalize(&self, q: [f64; 2]) -> [f64; 2] {
        [
            (q[0] - self.origin[0]) / self.scale[0],
            (q[1] - self.origin[1]) / self.scale[1],
        ]
    }

    /// Interpolated value inside the hull, `None` outside
    pub fn interpolate(&self, q: [f64; 2]) -> Option<f64> {
        let q = self.normalize(q);
        if let Some(line) = &self.line {
            return line.interpolate(q, &self.values);
        }
        let (t, w) = self.triangulation.locate(q)?;
        Some(w[0] * self.values[t[0]] + w[1] * self.values[t[1]] + w[2] * self.values[t[2]])
    }

    /// Value of the nearest data point
    pub fn nearest(&self, q: [f64; 2]) -> f64 {
        let q = self.normalize(q);
        let mut best = (f64::INFINITY, 0usize);
        for (i, p) in self.triangulation.points().iter().enumerate() {
            let d = (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2);
            if d < best.0 {
                best = (d, i);
            }
        }
        self.values[best.1]
    }

    pub fn evaluate(&self, q: [f64; 2], extrapolation: Extrapolation) -> f64 {
        match self.interpolate(q) {
            Some(v) => v,
            None => match extrapolation {
                Extrapolation::Nearest => self.nearest(q),
                Extrapolation::Zero => 0.0,
            },
        }
    }
}

/// Outcome of filling one grid channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStats {
    /// Cells filled from inside the convex hull
    pub interpolated: usize,
    /// Cells filled by the extrapolation policy
    pub extrapolated: usize,
    /// Target cells left at zero because no source existed
    pub unfilled: usize,
}

impl FillStats {
    pub fn filled(&self) -> usize {
        self.interpolated + self.extrapolated
    }
}

/// Fill non-finite entries of `values` at cells where `target` is true,
/// using finite entries at cells where `target` is also true as sources.
///
/// `values` is indexed `[time, space]`; `times` and `spaces` are the axis
/// coordinates. Cells outside `target` are left untouched.
pub fn fill_missing(
    values: &mut Array2<f64>,
    target: &Array2<bool>,
    times: &[f64],
    spaces: &[f64],
    extrapolation: Extrapolation,
) -> FillStats {
    let mut points = Vec::new();
    let mut known = Vec::new();
    let mut missing = Vec::new();

    for ((ti, si), &v) in values.indexed_iter() {
        if !target[[ti, si]] {
            continue;
        }
        if v.is_finite() {
            points.push([spaces[si], times[ti]]);
            known.push(v);
        } else {
            missing.push((ti, si));
        }
    }

    let mut stats = FillStats::default();
    if missing.is_empty() {
        return stats;
    }

    let interpolator = match ScatteredInterpolator::new(&points, &known) {
        Some(interp) => interp,
        None => {
            for &(ti, si) in &missing {
                values[[ti, si]] = 0.0;
            }
            stats.unfilled = missing.len();
            return stats;
        }
    };

    for (ti, si) in missing {
        let q = [spaces[si], times[ti]];
        values[[ti, si]] = match interpolator.interpolate(q) {
            Some(v) => {
                stats.interpolated += 1;
                v
            }
            None => {
                stats.extrapolated += 1;
                interpolator.evaluate(q, extrapolation)
            }
        };
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproduces_plane() {
        // A linear function is recovered exactly inside the hull
        let f = |x: f64, t: f64| 0.2 + 0.5 * x - 0.1 * t;
        let pts = [[-0.2, 0.0], [0.2, 0.0], [-0.2, 1.0], [0.2, 1.0], [0.0, 0.5]];
        let vals: Vec<f64> = pts.iter().map(|p| f(p[0], p[1])).collect();
        let interp = ScatteredInterpolator::new(&pts, &vals).unwrap();

        let v = interp.interpolate([0.1, 0.25]).unwrap();
        assert!((v - f(0.1, 0.25)).abs() < 1e-12);
        assert!(interp.interpolate([0.5, 0.5]).is_none());
    }

    #[test]
    fn test_extrapolation_policies() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let vals = [1.0, 2.0, 3.0];
        let interp = ScatteredInterpolator::new(&pts, &vals).unwrap();

        assert_eq!(interp.evaluate([2.0, 0.1], Extrapolation::Nearest), 2.0);
        assert_eq!(interp.evaluate([2.0, 0.1], Extrapolation::Zero), 0.0);
    }

    #[test]
    fn test_collinear_sources_interpolate_along_segment() {
        // Single expiry: all sources on one time row
        let pts = [[0.0, 1.0], [2.0, 1.0], [1.0, 1.0]];
        let vals = [0.1, 0.3, 0.2];
        let interp = ScatteredInterpolator::new(&pts, &vals).unwrap();

        assert!((interp.interpolate([1.5, 1.0]).unwrap() - 0.25).abs() < 1e-12);
        assert!((interp.interpolate([2.0, 1.0]).unwrap() - 0.3).abs() < 1e-12);

        // Past the segment end, or off the line, the policy applies
        assert!(interp.interpolate([2.5, 1.0]).is_none());
        assert!(interp.interpolate([1.0, 1.5]).is_none());
        assert_eq!(interp.evaluate([2.5, 1.0], Extrapolation::Nearest), 0.3);
        assert_eq!(interp.evaluate([2.5, 1.0], Extrapolation::Zero), 0.0);
    }

    #[test]
    fn test_diagonal_sources_interpolate_along_segment() {
        let pts = [[0.0, 0.0], [1.0, 2.0], [3.0, 6.0]];
        let vals = [1.0, 2.0, 4.0];
        let interp = ScatteredInterpolator::new(&pts, &vals).unwrap();
        assert!((interp.interpolate([2.0, 4.0]).unwrap() - 3.0).abs() < 1e-9);
        assert!(interp.interpolate([2.0, 3.0]).is_none());
    }

    #[test]
    fn test_single_source_only_matches_itself() {
        let interp = ScatteredInterpolator::new(&[[0.5, 0.5]], &[7.0]).unwrap();
        assert_eq!(interp.interpolate([0.5, 0.5]), Some(7.0));
        assert!(interp.interpolate([0.6, 0.5]).is_none());
        assert_eq!(interp.evaluate([0.6, 0.5], Extrapolation::Nearest), 7.0);
    }

    #[test]
    fn test_single_time_row_fills_interior_cell() {
        let times = [1.0];
        let spaces = [-0.1, 0.0, 0.1];
        let target = Array2::from_elem((1, 3), true);

        for policy in [Extrapolation::Nearest, Extrapolation::Zero] {
            let mut values = Array2::from_shape_vec((1, 3), vec![0.2, f64::NAN, 0.4]).unwrap();
            let stats = fill_missing(&mut values, &target, &times, &spaces, policy);
            assert_eq!(stats.interpolated, 1);
            assert_eq!(stats.extrapolated, 0);
            assert!((values[[0, 1]] - 0.3).abs() < 1e-12, "{:?}", policy);
        }
    }

    #[test]
    fn test_single_time_row_extrapolates_beyond_ends() {
        let times = [1.0];
        let spaces = [-0.2, -0.1, 0.0, 0.1];
        let target = Array2::from_elem((1, 4), true);
        let mut values = Array2::from_shape_vec((1, 4), vec![f64::NAN, 0.2, 0.3, f64::NAN]).unwrap();

        let stats = fill_missing(&mut values, &target, &times, &spaces, Extrapolation::Zero);
        assert_eq!(stats.extrapolated, 2);
        assert_eq!(values[[0, 0]], 0.0);
        assert_eq!(values[[0, 3]], 0.0);
    }

    #[test]
    fn test_fill_missing_grid() {
        let times = [0.0, 0.5, 1.0];
        let spaces = [-0.1, 0.0, 0.1];
        let mut values = Array2::from_shape_fn((3, 3), |(ti, si)| 0.2 + times[ti] + spaces[si]);
        values[[1, 1]] = f64::NAN; // interior
        values[[0, 0]] = f64::NAN; // hull corner
        values[[2, 2]] = f64::NAN; // not a target

        let mut target = Array2::from_elem((3, 3), true);
        target[[2, 2]] = false;

        let stats = fill_missing(&mut values, &target, &times, &spaces, Extrapolation::Nearest);

        assert_eq!(stats.interpolated, 1);
        assert_eq!(stats.extrapolated, 1);
        assert_eq!(stats.filled(), 2);
        assert!((values[[1, 1]] - 0.7).abs() < 1e-12);
        // Corner lies outside the hull; two sources tie for nearest and the first one wins
        assert!((values[[0, 0]] - 0.2).abs() < 1e-12);
        assert!(values[[2, 2]].is_nan());
    }

    #[test]
    fn test_fill_without_sources() {
        let mut values = Array2::from_elem((1, 2), f64::NAN);
        let target = Array2::from_elem((1, 2), true);
        let stats = fill_missing(&mut values, &target, &[1.0], &[0.0, 1.0], Extrapolation::Nearest);
        assert_eq!(stats.unfilled, 2);
        assert!(values.iter().all(|&v| v == 0.0));
    }
}
