//! Black-Scholes Model
//!
//! Provides:
//! - European option pricing (no dividends)
//! - Delta
//! - Implied volatility by Brent inversion over a fixed bracket
//!
//! Used to turn traded option premiums into implied volatilities and, when
//! the tick file does not carry one, a delta.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use super::brent::{brent_root, BrentOptions};
use crate::core::{OptionType, SurfaceError, SurfaceResult};

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Black-Scholes d1 parameter
pub fn d1(spot: f64, strike: f64, rate: f64, vol: f64, time: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * vol * vol) * time) / (vol * time.sqrt())
}

/// Black-Scholes d2 parameter
pub fn d2(spot: f64, strike: f64, rate: f64, vol: f64, time: f64) -> f64 {
    d1(spot, strike, rate, vol, time) - vol * time.sqrt()
}

/// Black-Scholes European option price
pub fn price(
    spot: f64,
    strike: f64,
    rate: f64,
    vol: f64,
    time: f64,
    option_type: OptionType,
) -> f64 {
    if time <= 0.0 {
        return option_type.intrinsic(spot, strike);
    }

    let df = (-rate * time).exp();

    if vol <= 0.0 {
        // Zero vol = discounted intrinsic on the forward
        let forward = spot / df;
        return df * option_type.intrinsic(forward, strike);
    }

    let d1 = d1(spot, strike, rate, vol, time);
    let d2 = d2(spot, strike, rate, vol, time);

    match option_type {
        OptionType::Call => spot * norm_cdf(d1) - strike * df * norm_cdf(d2),
        OptionType::Put => strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

/// Black-Scholes delta
pub fn delta(
    spot: f64,
    strike: f64,
    rate: f64,
    vol: f64,
    time: f64,
    option_type: OptionType,
) -> f64 {
    if time <= 0.0 || vol <= 0.0 {
        // At expiry or zero vol
        return match option_type {
            OptionType::Call => {
                if spot > strike {
                    1.0
                } else {
                    0.0
                }
            }
            OptionType::Put => {
                if spot < strike {
                    -1.0
                } else {
                    0.0
                }
            }
        };
    }

    let d1 = d1(spot, strike, rate, vol, time);
    match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => norm_cdf(d1) - 1.0,
    }
}

/// Implied volatility solver settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvSolverConfig {
    /// Lower end of the volatility bracket
    pub lower: f64,
    /// Upper end of the volatility bracket
    pub upper: f64,
    pub max_iter: usize,
    pub xtol: f64,
}

impl Default for IvSolverConfig {
    fn default() -> Self {
        Self {
            lower: 1e-6,
            upper: 5.0,
            max_iter: 100,
            xtol: 2e-12,
        }
    }
}

impl IvSolverConfig {
    fn brent_options(&self) -> BrentOptions {
        BrentOptions {
            xtol: self.xtol,
            max_iter: self.max_iter,
            ..Default::default()
        }
    }
}

/// Implied volatility by Brent's method on `[config.lower, config.upper]`
///
/// Fails when the inputs are non-positive or the market price is not
/// attainable by any volatility inside the bracket.
pub fn implied_volatility(
    market_price: f64,
    spot: f64,
    strike: f64,
    rate: f64,
    time: f64,
    option_type: OptionType,
    config: &IvSolverConfig,
) -> SurfaceResult<f64> {
    // Sanity checks
    if !(market_price > 0.0) {
        return Err(SurfaceError::numerical("Non-positive option price"));
    }
    if !(time > 0.0) {
        return Err(SurfaceError::numerical("Non-positive time to expiry"));
    }
    if !(spot > 0.0 && strike > 0.0) {
        return Err(SurfaceError::numerical("Non-positive spot or strike"));
    }

    brent_root(
        |vol| price(spot, strike, rate, vol, time, option_type) - market_price,
        config.lower,
        config.upper,
        &config.brent_options(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_cdf() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-10);
        assert!((norm_cdf(1.96) - 0.975).abs() < 0.001);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 0.001);
    }

    #[test]
    fn test_bs_price() {
        // ATM call, 20% vol, 1 year, 5% rate
        let call_price = price(100.0, 100.0, 0.05, 0.20, 1.0, OptionType::Call);

        // Should be around 10.45 for these parameters
        assert!(call_price > 10.0 && call_price < 11.0);

        // Put-call parity check
        let put_price = price(100.0, 100.0, 0.05, 0.20, 1.0, OptionType::Put);
        let df = (-0.05_f64).exp();
        let parity = call_price - put_price - (100.0 - 100.0 * df);
        assert!(parity.abs() < 1e-10);
    }

    #[test]
    fn test_expired_price_is_intrinsic() {
        assert_eq!(price(105.0, 100.0, 0.05, 0.3, 0.0, OptionType::Call), 5.0);
        assert_eq!(price(105.0, 100.0, 0.05, 0.3, 0.0, OptionType::Put), 0.0);
    }

    #[test]
    fn test_delta() {
        let call = delta(100.0, 100.0, 0.05, 0.20, 1.0, OptionType::Call);
        let put = delta(100.0, 100.0, 0.05, 0.20, 1.0, OptionType::Put);

        // ATM call delta should be around 0.5-0.7
        assert!(call > 0.5 && call < 0.7);
        assert!((call - put - 1.0).abs() < 1e-12);

        assert_eq!(delta(110.0, 100.0, 0.05, 0.2, 0.0, OptionType::Call), 1.0);
        assert_eq!(delta(110.0, 100.0, 0.05, 0.2, 0.0, OptionType::Put), 0.0);
        assert_eq!(delta(90.0, 100.0, 0.05, 0.2, 0.0, OptionType::Call), 0.0);
        assert_eq!(delta(90.0, 100.0, 0.05, 0.0, 1.0, OptionType::Put), -1.0);
    }

    #[test]
    fn test_implied_vol() {
        let spot = 100.0;
        let strike = 100.0;
        let rate = 0.05;
        let vol = 0.25;
        let time = 0.5;

        let market_price = price(spot, strike, rate, vol, time, OptionType::Call);
        let iv = implied_volatility(
            market_price, spot, strike, rate, time, OptionType::Call, &IvSolverConfig::default(),
        )
        .unwrap();

        assert!((iv - vol).abs() < 1e-8);
    }

    #[test]
    fn test_iv_otm_put() {
        let spot = 1400.0;
        let strike = 1300.0;
        let rate = 0.05;
        let vol = 0.30;
        let time = 30.0 / 365.0;

        let market_price = price(spot, strike, rate, vol, time, OptionType::Put);
        let iv = implied_volatility(
            market_price, spot, strike, rate, time, OptionType::Put, &IvSolverConfig::default(),
        )
        .unwrap();

        assert!((iv - vol).abs() < 1e-6);
    }

    #[test]
    fn test_iv_unattainable_price() {
        // A call can never be worth more than the underlying
        let result = implied_volatility(
            120.0, 100.0, 100.0, 0.05, 0.25, OptionType::Call, &IvSolverConfig::default(),
        );
        assert!(result.is_err());

        let expired = implied_volatility(
            5.0, 100.0, 100.0, 0.05, 0.0, OptionType::Call, &IvSolverConfig::default(),
        );
        assert!(expired.is_err());
    }
}
