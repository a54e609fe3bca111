// src/models/ssvi/ssvi_calibrator.rs

//! Two-stage SSVI calibrator
//!
//! Quotes are fitted in two passes over one parameter vector
//! `[alpha, beta, gamma, eta, rho]`:
//!
//! 1. ATM stage: `alpha, beta` move so that `θ(T)` matches the implied total
//!    variance of each quote inverted at `k = 0`.
//! 2. Wings stage: `gamma, eta, rho` move so that `w(T, k)` matches the implied total
//!    variance inverted at `k = ln(K e^{-rT} / S)`; `alpha, beta` stay at their
//!    stage-1 values.
//!
//! Market implied variances are inverted once per stage before the optimiser runs,
//! so quote errors surface before any search starts.

use tracing::{info, warn};

use crate::calibration::config::CalibrationConfig;
use crate::calibration::pipeline::{run_stage, variance_targets, LbfgsbMinimizer, Stage, StageResult};
use crate::calibration::types::{
    CalibrationOutcome, CalibrationReport, FixedParameters, MarketQuote, Minimizer, Termination,
};
use crate::error::{DupireError, Result};
use crate::models::ssvi::ssvi_model::{SsviParams, SsviSurface, NUM_MODEL_PARAMS};

/// Stateful SSVI calibrator holding the quote list and the current parameters.
#[derive(Debug, Clone)]
pub struct SsviCalibrator<M = LbfgsbMinimizer> {
    fixed: FixedParameters,
    config: CalibrationConfig,
    quotes: Vec<MarketQuote>,
    params: [f64; NUM_MODEL_PARAMS],
    atm_outcome: CalibrationOutcome,
    outcome: CalibrationOutcome,
    minimizer: M,
}

impl SsviCalibrator<LbfgsbMinimizer> {
    /// Calibrator using L-BFGS-B, with the CMA-ES pre-search if the config enables one.
    pub fn new(fixed: FixedParameters, config: CalibrationConfig) -> Self {
        let minimizer = LbfgsbMinimizer {
            global_search: config.global_search.clone(),
        };
        Self::with_minimizer(fixed, config, minimizer)
    }
}

impl<M: Minimizer> SsviCalibrator<M> {
    pub fn with_minimizer(fixed: FixedParameters, config: CalibrationConfig, minimizer: M) -> Self {
        Self {
            fixed,
            params: config.guess,
            config,
            quotes: Vec::new(),
            atm_outcome: CalibrationOutcome::NotStarted,
            outcome: CalibrationOutcome::NotStarted,
            minimizer,
        }
    }

    pub fn fixed_parameters(&self) -> &FixedParameters {
        &self.fixed
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Replaces the starting point of the next calibration.
    pub fn set_guess_parameters(&mut self, guess: &SsviParams) {
        self.params = guess.to_array();
    }

    /// Replaces the starting point from `[alpha, beta, gamma, eta, rho]`.
    ///
    /// # Errors
    /// [`DupireError::InvalidParameterRange`] if the values violate the SSVI invariants.
    pub fn set_guess(&mut self, values: &[f64]) -> Result<()> {
        let guess = SsviParams::from_slice(values)?;
        self.set_guess_parameters(&guess);
        Ok(())
    }

    /// Appends one observed option. The type label is checked when the quote is used.
    pub fn add_observed_option(
        &mut self,
        maturity: f64,
        strike: f64,
        observed_price: f64,
        option_type: &str,
    ) {
        self.add_quote(MarketQuote::new(maturity, strike, option_type, observed_price));
    }

    pub fn add_quote(&mut self, quote: MarketQuote) {
        self.quotes.push(quote);
    }

    pub fn quotes(&self) -> &[MarketQuote] {
        &self.quotes
    }

    /// Current `[alpha, beta, gamma, eta, rho]`: the guess before calibration, the
    /// best fit afterwards.
    pub fn current_parameters(&self) -> [f64; NUM_MODEL_PARAMS] {
        self.params
    }

    /// Surface built from the current parameters.
    pub fn calibrated_surface(&self) -> Result<SsviSurface> {
        SsviSurface::from_slice(&self.params)
    }

    /// MSE between `θ(T)` of `surface` and the ATM implied total variance of each quote.
    ///
    /// # Errors
    /// [`DupireError::NoCalibrationData`] without quotes, or the first quote
    /// inversion error.
    pub fn mean_square_error_atm(&self, surface: &SsviSurface) -> Result<f64> {
        self.stage_error(Stage::Atm, surface)
    }

    /// MSE between `w(T, k)` of `surface` and the implied total variance of each quote.
    pub fn mean_square_error_surface(&self, surface: &SsviSurface) -> Result<f64> {
        self.stage_error(Stage::Wings, surface)
    }

    fn stage_error(&self, stage: Stage, surface: &SsviSurface) -> Result<f64> {
        let targets =
            variance_targets(stage, &self.quotes, &self.fixed, &self.config.implied_vol)?;
        stage.mean_square_error(surface, &targets)
    }

    /// Fits `alpha` and `beta` to the ATM term structure.
    ///
    /// Reaching the iteration cap is reported through
    /// [`CalibrationOutcome::FailedMaxIterations`], not as an error.
    ///
    /// # Errors
    /// * [`DupireError::NoCalibrationData`] without quotes
    /// * option-type or implied-volatility errors from inverting the quotes
    /// * [`DupireError::CalibrationFailed`] if the optimiser stopped for any other reason
    pub fn calibrate_atm(&mut self) -> Result<CalibrationReport> {
        self.calibrate_stage(Stage::Atm)
    }

    /// Fits `gamma`, `eta` and `rho` with `alpha` and `beta` held at their current values.
    pub fn calibrate_wings(&mut self) -> Result<CalibrationReport> {
        self.calibrate_stage(Stage::Wings)
    }

    fn calibrate_stage(&mut self, stage: Stage) -> Result<CalibrationReport> {
        *self.outcome_mut(stage) = CalibrationOutcome::NotStarted;
        self.check_fixed_parameters()?;

        let targets =
            variance_targets(stage, &self.quotes, &self.fixed, &self.config.implied_vol)?;
        let StageResult {
            report,
            termination,
            iterations,
        } = run_stage(&self.minimizer, stage, &targets, self.params, &self.config)?;

        *self.outcome_mut(stage) = report.outcome;

        if let Termination::Other(reason) = termination {
            warn!(stage = stage.label(), %reason, iterations, "calibration failed");
            return Err(DupireError::CalibrationFailed {
                stage: stage.label(),
                reason,
            });
        }

        self.params = report.params;
        info!(
            stage = stage.label(),
            outcome = ?report.outcome,
            iterations,
            mse = report.mean_square_error,
            params = ?report.params,
            "calibration stage finished"
        );
        Ok(report)
    }

    fn check_fixed_parameters(&self) -> Result<()> {
        let FixedParameters { r, spot } = self.fixed;
        if !r.is_finite() || !spot.is_finite() || spot <= 0.0 {
            return Err(DupireError::invalid_input(format!(
                "calibration requires a finite rate and a positive spot (r={r}, spot={spot})"
            )));
        }
        Ok(())
    }

    fn outcome_mut(&mut self, stage: Stage) -> &mut CalibrationOutcome {
        match stage {
            Stage::Atm => &mut self.atm_outcome,
            Stage::Wings => &mut self.outcome,
        }
    }

    pub fn atm_outcome(&self) -> CalibrationOutcome {
        self.atm_outcome
    }

    pub fn outcome(&self) -> CalibrationOutcome {
        self.outcome
    }

    /// Outcome of the ATM stage and the ATM error of the current parameters.
    pub fn calibration_status_atm(&self) -> Result<(CalibrationOutcome, f64)> {
        let surface = self.calibrated_surface()?;
        Ok((self.atm_outcome, self.mean_square_error_atm(&surface)?))
    }

    /// Outcome of the wings stage and the surface error of the current parameters.
    pub fn calibration_status(&self) -> Result<(CalibrationOutcome, f64)> {
        let surface = self.calibrated_surface()?;
        Ok((self.outcome, self.mean_square_error_surface(&surface)?))
    }
}
