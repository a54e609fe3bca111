// Black-Scholes pricing in log-moneyness coordinates, where the strike is carried as
// k = ln(K e^{-rT} / S). Provides call/put prices, put/call parity conversions and the
// implied-volatility inversion used by the calibrator.

use std::fmt;
use std::str::FromStr;

use crate::error::{DupireError, Result};
use crate::math::{normal_cdf, NewtonSolver};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Vanilla payoff at `spot` for `strike`.
    pub fn payoff(self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        }
    }
}

impl FromStr for OptionType {
    type Err = DupireError;

    /// Accepts `Call`, `call`, `C`, `c`, `Put`, `put`, `P`, `p` (any letter case).
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(OptionType::Call),
            "put" | "p" => Ok(OptionType::Put),
            _ => Err(DupireError::UnrecognizedOptionType(s.to_string())),
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Discount-adjusted log-moneyness `ln(K e^{-rT} / S)`.
#[allow(non_snake_case)]
pub fn log_moneyness(strike: f64, S: f64, r: f64, T: f64) -> f64 {
    (strike * (-r * T).exp() / S).ln()
}

/// Price of a European call with volatility `sigma`, spot `S`, log-moneyness `k`.
#[allow(non_snake_case)]
pub fn bs_call_price(sigma: f64, S: f64, k: f64, r: f64, T: f64) -> f64 {
    let sqrt_t = T.sqrt();
    let d1 = (-r * T - k + (r + 0.5 * sigma * sigma) * T) / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;
    S * normal_cdf(d1) - S * k.exp() * normal_cdf(d2)
}

/// Price of a European put, obtained from the call through put/call parity.
#[allow(non_snake_case)]
pub fn bs_put_price(sigma: f64, S: f64, k: f64, r: f64, T: f64) -> f64 {
    put_from_call(S, k, bs_call_price(sigma, S, k, r, T))
}

/// `put = call - S + S e^k`
#[allow(non_snake_case)]
pub fn put_from_call(S: f64, k: f64, call_price: f64) -> f64 {
    call_price - S + k.exp() * S
}

/// `call = put - S e^k + S`
#[allow(non_snake_case)]
pub fn call_from_put(S: f64, k: f64, put_price: f64) -> f64 {
    put_price - k.exp() * S + S
}

/// Price of a European option of the given type.
#[allow(non_snake_case)]
pub fn bs_price(option_type: OptionType, sigma: f64, S: f64, k: f64, r: f64, T: f64) -> f64 {
    match option_type {
        OptionType::Call => bs_call_price(sigma, S, k, r, T),
        OptionType::Put => bs_put_price(sigma, S, k, r, T),
    }
}

/// Newton search settings for implied-volatility inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImpliedVolSettings {
    /// Starting volatility of the Newton search.
    pub initial_guess: f64,
    /// Price tolerance `|observed - model| < max_error`.
    pub max_error: f64,
    pub max_iterations: usize,
}

impl Default for ImpliedVolSettings {
    fn default() -> Self {
        Self {
            initial_guess: 0.5,
            max_error: 1e-6,
            max_iterations: 10_000,
        }
    }
}

/// Implied volatility from an observed call price.
///
/// # Errors
/// Propagates [`DupireError::DerivativeTooSmall`] and [`DupireError::DidNotConverge`]
/// from the Newton search.
#[allow(non_snake_case)]
pub fn implied_vol_call(
    call_price: f64,
    S: f64,
    k: f64,
    r: f64,
    T: f64,
    settings: &ImpliedVolSettings,
) -> Result<f64> {
    let objective = |sigma: f64| call_price - bs_call_price(sigma, S, k, r, T);
    NewtonSolver::new(settings.max_error, settings.max_iterations).solve(
        objective,
        None,
        settings.initial_guess,
    )
}

/// Implied volatility from an observed put price.
///
/// # Errors
/// [`DupireError::ParityViolation`] if the put implies a negative call price, otherwise
/// the errors of [`implied_vol_call`].
#[allow(non_snake_case)]
pub fn implied_vol_put(
    put_price: f64,
    S: f64,
    k: f64,
    r: f64,
    T: f64,
    settings: &ImpliedVolSettings,
) -> Result<f64> {
    let call_price = call_from_put(S, k, put_price);
    if call_price < 0.0 {
        return Err(DupireError::ParityViolation { call_price });
    }
    implied_vol_call(call_price, S, k, r, T, settings)
}

/// Implied volatility from an observed price of the given type.
#[allow(non_snake_case)]
pub fn implied_vol(
    option_type: OptionType,
    price: f64,
    S: f64,
    k: f64,
    r: f64,
    T: f64,
    settings: &ImpliedVolSettings,
) -> Result<f64> {
    match option_type {
        OptionType::Call => implied_vol_call(price, S, k, r, T, settings),
        OptionType::Put => implied_vol_put(price, S, k, r, T, settings),
    }
}
