//! Trailing-window statistics over series with undefined entries
//!
//! `None` marks an undefined observation (e.g. the first return). Windows
//! count positions, not observations: a window of 5 covers the current row
//! and the four before it, whatever is defined among them.

/// Simple returns `x[i] / x[i-1] - 1`; undefined for the first entry and
/// after a zero or non-finite price
pub fn pct_change(prices: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    for i in 0..prices.len() {
        if i == 0 {
            out.push(None);
            continue;
        }
        let prev = prices[i - 1];
        let r = prices[i] / prev - 1.0;
        out.push(if prev != 0.0 && r.is_finite() { Some(r) } else { None });
    }
    out
}

fn window(series: &[Option<f64>], end: usize, len: usize) -> impl Iterator<Item = f64> + '_ {
    let start = (end + 1).saturating_sub(len);
    series[start..=end].iter().filter_map(|v| *v)
}

/// Trailing mean over `window` positions with at least `min_periods`
/// defined observations
pub fn rolling_mean(series: &[Option<f64>], window_len: usize, min_periods: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| {
            let (sum, n) = window(series, i, window_len).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n >= min_periods.max(1) {
                Some(sum / n as f64)
            } else {
                None
            }
        })
        .collect()
}

/// Trailing sample standard deviation (ddof = 1); needs at least two
/// defined observations in the window
pub fn rolling_std(series: &[Option<f64>], window_len: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| {
            let values: Vec<f64> = window(series, i, window_len).collect();
            let n = values.len();
            if n < 2 {
                return None;
            }
            let mean = values.iter().sum::<f64>() / n as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Some(var.max(0.0).sqrt())
        })
        .collect()
}

/// Quantile with linear interpolation between closest ranks,
/// `h = (n - 1) q`. Non-finite values are ignored.
pub fn quantile_linear(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_change() {
        let r = pct_change(&[100.0, 110.0, 99.0, 0.0, 5.0]);
        assert_eq!(r[0], None);
        assert!((r[1].unwrap() - 0.1).abs() < 1e-12);
        assert!((r[2].unwrap() + 0.1).abs() < 1e-12);
        assert_eq!(r[3], Some(-1.0));
        assert_eq!(r[4], None);
    }

    #[test]
    fn test_rolling_mean() {
        let s = [None, Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let m = rolling_mean(&s, 3, 1);
        assert_eq!(m, vec![None, Some(1.0), Some(1.5), Some(2.0), Some(3.0)]);

        let strict = rolling_mean(&s, 3, 3);
        assert_eq!(strict, vec![None, None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_rolling_std() {
        let s = [None, Some(1.0), Some(3.0), Some(5.0)];
        let sd = rolling_std(&s, 5);
        assert_eq!(sd[0], None);
        assert_eq!(sd[1], None);
        assert!((sd[2].unwrap() - 2f64.sqrt()).abs() < 1e-12);
        assert!((sd[3].unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_linear() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_linear(&v, 0.0), Some(1.0));
        assert_eq!(quantile_linear(&v, 1.0), Some(5.0));
        assert_eq!(quantile_linear(&v, 0.5), Some(3.0));
        // h = 4 * 0.85 = 3.4
        assert!((quantile_linear(&v, 0.85).unwrap() - 4.4).abs() < 1e-12);
        assert_eq!(quantile_linear(&[f64::NAN], 0.5), None);
        assert_eq!(quantile_linear(&[7.0], 0.85), Some(7.0));
    }
}
