//! # Dupire-Lib: SSVI Local-Volatility Pricing and Calibration
//!
//! `dupire-lib` prices equity derivatives under a Dupire local-volatility model whose
//! implied-variance surface is the parametric SSVI surface, and calibrates that surface to
//! observed option prices.
//!
//! ## Core Features
//!
//! - **SSVI Surface**: Total implied variance `w(t, k)` in discounted log-moneyness
//!   `k = ln(K e^{-rT} / S)` with a finite-difference Dupire local volatility
//! - **Monte Carlo**: Euler-Maruyama path simulation (sequential or rayon-parallel) and
//!   European, Asian, lookback and barrier pricers
//! - **Black-Scholes**: Closed-form prices and Newton implied-volatility inversion in
//!   log-moneyness coordinates
//! - **Two-Stage Calibration**: ATM term structure first, then the wings, using L-BFGS-B
//!   with an optional CMA-ES global search
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dupire_lib::{calibrate_ssvi, default_configs, FixedParameters, MarketQuote, MonteCarloPricer};
//!
//! # fn load_quotes() -> Vec<MarketQuote> { vec![] }
//! let quotes: Vec<MarketQuote> = load_quotes();
//! let fixed = FixedParameters { r: 0.025, spot: 100.0 };
//!
//! // Fit alpha/beta to the ATM term structure, then gamma/eta/rho to the smile
//! let calibration = calibrate_ssvi(quotes, fixed, default_configs::fast())?;
//!
//! // Price a one-year down-and-out put on the calibrated local volatility
//! let pricer = MonteCarloPricer::new(calibration.surface, fixed.r, 10_000, 128).with_seed(42);
//! let price = pricer.barrier_put(100.0, 102.0, 1.0, "D", "O", 80.0)?;
//! println!("down-and-out put: {price:.4}");
//! # Ok::<(), dupire_lib::DupireError>(())
//! ```
//!
//! ## Configuration Presets
//!
//! The library provides several calibration configuration presets:
//! - `production()`: Tight tolerances with a CMA-ES pre-search
//! - `fast()`: Balanced speed/accuracy for development
//! - `research()`: High-precision settings for research
//! - `minimal()`: Quick validation settings
//!
//! ## Logging
//!
//! The crate emits `tracing` events (calibration stages at `info`, simulations and
//! solver failures at `debug`, optimiser iterations at `trace`) and never installs a
//! subscriber itself.

// ================================================================================================
// MODULES
// ================================================================================================

pub mod calibration;
pub mod error;
pub mod math;
pub mod models;
pub mod monte_carlo;

// ================================================================================================
// IMPORTS
// ================================================================================================

use std::cmp::Ordering;

use models::{bs::log_moneyness, utils::price_option};

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

pub use error::{DupireError, Result};

// Core types for market data and configuration
pub use calibration::{
    config::{CalibrationConfig, GlobalSearchConfig, ParameterBounds},
    pipeline::LbfgsbMinimizer,
    types::{
        CalibrationOutcome, CalibrationReport, FixedParameters, MarketQuote, Minimizer,
        MinimizerReport, MinimizerSettings, PricingResult, Termination,
    },
};

// Black-Scholes and root finding
pub use math::{NewtonSolver, NormalSampler, StdNormalSampler};
pub use models::bs::{ImpliedVolSettings, OptionType};

// SSVI model types
pub use models::ssvi::{SsviCalibrator, SsviParams, SsviSurface};
pub use models::traits::{LocalVolatility, SurfaceModel};

// Monte Carlo simulation and pricing
pub use monte_carlo::{
    ExecutionMode, MonteCarloPricer, PathEnsemble, PathSimulator, Payoff, SimulationConfig,
};

// ================================================================================================
// DEFAULT CONFIGURATIONS
// ================================================================================================

/// Pre-configured calibration settings for common use cases.
///
/// # Available Configurations
///
/// - [`production()`]: Production-grade settings
/// - [`fast()`]: Development-optimized settings
/// - [`research()`]: High-precision settings for research
/// - [`minimal()`]: Quick validation settings
pub mod default_configs {
    use crate::calibration::config::CalibrationConfig;

    /// Production-grade configuration.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 1,000 per stage
    /// - Optimiser tolerance: 1e-8
    /// - CMA-ES pre-search with 3 BIPOP restarts before L-BFGS-B
    ///
    /// # Example
    ///
    /// ```rust
    /// use dupire_lib::default_configs;
    ///
    /// let config = default_configs::production();
    /// assert!(config.global_search.is_some());
    /// ```
    pub fn production() -> CalibrationConfig {
        CalibrationConfig::production()
    }

    /// Fast configuration optimized for development and testing.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 300 per stage
    /// - Optimiser tolerance: 1e-6
    /// - L-BFGS-B only
    pub fn fast() -> CalibrationConfig {
        CalibrationConfig::fast()
    }

    /// High-precision configuration for research and backtesting.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 10,000 per stage
    /// - Optimiser tolerance: 1e-10, implied-vol tolerance 1e-9
    /// - Extended CMA-ES search
    pub fn research() -> CalibrationConfig {
        CalibrationConfig::research()
    }

    /// Minimal configuration for quick validation and debugging.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 100 per stage
    /// - Optimiser tolerance: 1e-4
    pub fn minimal() -> CalibrationConfig {
        CalibrationConfig::minimal()
    }
}

/// Reports of both calibration stages and the fitted surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SsviCalibration {
    pub atm: CalibrationReport,
    pub wings: CalibrationReport,
    pub surface: SsviSurface,
}

/// Calibrate SSVI parameters to observed option prices.
///
/// Runs the ATM stage (`alpha`, `beta`) followed by the wings stage (`gamma`, `eta`,
/// `rho`) starting from `config.guess`.
///
/// # Arguments
///
/// * `quotes` - Observed option prices across any number of maturities
/// * `fixed` - Spot and risk-free rate
/// * `config` - Optimiser settings; see [`default_configs`]
///
/// # Errors
///
/// * [`DupireError::NoCalibrationData`] if `quotes` is empty
/// * [`DupireError::UnrecognizedOptionType`] or implied-volatility errors from a quote
/// * [`DupireError::CalibrationFailed`] if a stage stops abnormally
///
/// Hitting the iteration cap is not an error; check the stage outcomes.
pub fn calibrate_ssvi(
    quotes: Vec<MarketQuote>,
    fixed: FixedParameters,
    config: CalibrationConfig,
) -> Result<SsviCalibration> {
    let mut calibrator = SsviCalibrator::new(fixed, config);
    for quote in quotes {
        calibrator.add_quote(quote);
    }

    let atm = calibrator.calibrate_atm()?;
    let wings = calibrator.calibrate_wings()?;
    let surface = calibrator.calibrated_surface()?;

    Ok(SsviCalibration {
        atm,
        wings,
        surface,
    })
}

/// SSVI Black-Scholes volatility `sqrt(w(T, k) / T)` at a strike.
pub fn ssvi_implied_vol(
    params: SsviParams,
    fixed: FixedParameters,
    strike: f64,
    maturity: f64,
) -> Result<f64> {
    if maturity <= 0.0 || strike <= 0.0 || fixed.spot <= 0.0 {
        return Err(DupireError::invalid_input(format!(
            "implied volatility requires maturity > 0, strike > 0 and spot > 0 \
             (maturity={maturity}, strike={strike}, spot={})",
            fixed.spot
        )));
    }
    let k = log_moneyness(strike, fixed.spot, fixed.r, maturity);
    Ok(SsviSurface::new(params).implied_vol(maturity, k))
}

/// Price European options in closed form with SSVI-implied volatilities.
///
/// Each quote is priced with Black-Scholes at `sqrt(w(T, k) / T)`. Results are sorted
/// by strike.
///
/// # Errors
///
/// The first unrecognised option type or degenerate quote (non-positive maturity or
/// strike).
pub fn price_with_ssvi(
    params: SsviParams,
    quotes: &[MarketQuote],
    fixed: FixedParameters,
) -> Result<Vec<PricingResult>> {
    let surface = SsviSurface::new(params);

    let mut results = quotes
        .iter()
        .map(|quote| {
            let priced = price_option(
                quote.parsed_type()?,
                quote.strike,
                fixed.spot,
                fixed.r,
                quote.maturity,
                &surface,
            )?;
            Ok(PricingResult {
                option_type: quote.option_type.clone(),
                strike: quote.strike,
                maturity: quote.maturity,
                market_price: quote.observed_price,
                model_price: priced.price,
                model_iv: priced.model_iv,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    results.sort_by(|a, b| a.strike.partial_cmp(&b.strike).unwrap_or(Ordering::Equal));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> SsviParams {
        SsviParams::new(0.1_f64.sqrt(), 1.0, 0.7, 0.2, 0.3).unwrap()
    }

    #[test]
    fn ssvi_pricing_reproduces_surface_vol() {
        let fixed = FixedParameters { r: 0.025, spot: 100.0 };
        let quotes = vec![
            MarketQuote::new(1.0, 110.0, "Call", 0.0),
            MarketQuote::new(1.0, 90.0, "put", 0.0),
        ];
        let results = price_with_ssvi(params(), &quotes, fixed).unwrap();

        assert_eq!(results[0].strike, 90.0);
        for result in &results {
            let iv = ssvi_implied_vol(params(), fixed, result.strike, result.maturity).unwrap();
            assert_relative_eq!(result.model_iv, iv, max_relative = 1e-12);
            assert!(result.model_price > 0.0);
        }
    }

    #[test]
    fn ssvi_pricing_propagates_bad_labels() {
        let quotes = vec![MarketQuote::new(1.0, 100.0, "X", 0.0)];
        assert_eq!(
            price_with_ssvi(params(), &quotes, FixedParameters::default()),
            Err(DupireError::UnrecognizedOptionType("X".into()))
        );
    }

    #[test]
    fn calibrate_without_quotes_fails() {
        assert_eq!(
            calibrate_ssvi(Vec::new(), FixedParameters::default(), default_configs::minimal()),
            Err(DupireError::NoCalibrationData)
        );
    }
}
