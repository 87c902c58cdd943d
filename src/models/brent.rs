//! Brent's method for bracketed scalar root finding
//!
//! Combines inverse quadratic / secant steps with bisection. Converges
//! whenever `f(lower)` and `f(upper)` have opposite signs.

use crate::core::{SurfaceError, SurfaceResult};

/// Solver tolerances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrentOptions {
    /// Absolute x tolerance
    pub xtol: f64,
    /// Relative x tolerance
    pub rtol: f64,
    pub max_iter: usize,
}

impl Default for BrentOptions {
    fn default() -> Self {
        Self {
            xtol: 2e-12,
            rtol: 4.0 * f64::EPSILON,
            max_iter: 100,
        }
    }
}

/// Find a root of `f` in `[lower, upper]`
pub fn brent_root<F>(mut f: F, lower: f64, upper: f64, opts: &BrentOptions) -> SurfaceResult<f64>
where
    F: FnMut(f64) -> f64,
{
    if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
        return Err(SurfaceError::numerical(format!(
            "invalid bracket [{}, {}]",
            lower, upper
        )));
    }

    let mut xpre = lower;
    let mut xcur = upper;
    let mut fpre = f(xpre);
    let mut fcur = f(xcur);

    if !(fpre.is_finite() && fcur.is_finite()) {
        return Err(SurfaceError::numerical("objective not finite at bracket ends"));
    }
    if fpre == 0.0 {
        return Ok(xpre);
    }
    if fcur == 0.0 {
        return Ok(xcur);
    }
    if fpre.signum() == fcur.signum() {
        return Err(SurfaceError::numerical(format!(
            "root not bracketed: f({}) = {}, f({}) = {}",
            lower, fpre, upper, fcur
        )));
    }

    let mut xblk = 0.0;
    let mut fblk = 0.0;
    let mut spre = 0.0;
    let mut scur = 0.0;

    for _ in 0..opts.max_iter {
        if fpre != 0.0 && fcur != 0.0 && fpre.signum() != fcur.signum() {
            xblk = xpre;
            fblk = fpre;
            spre = xcur - xpre;
            scur = spre;
        }
        if fblk.abs() < fcur.abs() {
            xpre = xcur;
            xcur = xblk;
            xblk = xpre;

            fpre = fcur;
            fcur = fblk;
            fblk = fpre;
        }

        let delta = (opts.xtol + opts.rtol * xcur.abs()) / 2.0;
        let sbis = (xblk - xcur) / 2.0;
        if fcur == 0.0 || sbis.abs() < delta {
            return Ok(xcur);
        }

        if spre.abs() > delta && fcur.abs() < fpre.abs() {
            let stry = if xpre == xblk {
                // secant
                -fcur * (xcur - xpre) / (fcur - fpre)
            } else {
                // inverse quadratic
                let dpre = (fpre - fcur) / (xpre - xcur);
                let dblk = (fblk - fcur) / (xblk - xcur);
                -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
            };

            if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                spre = scur;
                scur = stry;
            } else {
                spre = sbis;
                scur = sbis;
            }
        } else {
            spre = sbis;
            scur = sbis;
        }

        xpre = xcur;
        fpre = fcur;
        if scur.abs() > delta {
            xcur += scur;
        } else {
            xcur += if sbis > 0.0 { delta } else { -delta };
        }

        fcur = f(xcur);
        if !fcur.is_finite() {
            return Err(SurfaceError::numerical(format!(
                "objective not finite at x = {}",
                xcur
            )));
        }
    }

    Err(SurfaceError::numerical(format!(
        "Brent solver did not converge in {} iterations",
        opts.max_iter
    )))
}
