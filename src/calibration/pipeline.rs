//! Stage objectives and the default CMA-ES / L-BFGS-B minimiser.
//!
//! Both SSVI stages optimise the same 5-vector `[alpha, beta, gamma, eta, rho]`; a
//! stage only exposes its free coordinates to the optimiser and embeds them back into
//! the full vector before every evaluation.

use std::sync::Mutex;

use cmaes_lbfgsb::cmaes::{canonical_cmaes_optimize, CmaesCanonicalConfig};
use cmaes_lbfgsb::lbfgsb_optimize::{lbfgsb_optimize, LbfgsbConfig};
use tracing::{debug, trace};

use crate::calibration::config::{CalibrationConfig, GlobalSearchConfig};
use crate::calibration::types::{
    CalibrationReport, FixedParameters, MarketQuote, Minimizer, MinimizerReport,
    MinimizerSettings, Termination,
};
use crate::error::{DupireError, Result};
use crate::models::bs::{implied_vol, log_moneyness, ImpliedVolSettings};
use crate::models::ssvi::{SsviSurface, NUM_MODEL_PARAMS};

/// Objective value assigned to candidates that violate the SSVI invariants or
/// produce a non-finite error.
pub const INVALID_PARAMS_PENALTY: f64 = 1.0e12;

/// The two calibration stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fit `theta(T)` to ATM implied total variance; `alpha, beta` free.
    Atm,
    /// Fit `omega(T, k)` to implied total variance; `gamma, eta, rho` free.
    Wings,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Atm => "ATM",
            Stage::Wings => "wings",
        }
    }

    /// Which of `[alpha, beta, gamma, eta, rho]` the optimiser may move.
    pub fn free_mask(self) -> [bool; NUM_MODEL_PARAMS] {
        match self {
            Stage::Atm => [true, true, false, false, false],
            Stage::Wings => [false, false, true, true, true],
        }
    }

    fn residual(self, surface: &SsviSurface, target: &VarianceTarget) -> f64 {
        let model = match self {
            Stage::Atm => surface.theta(target.maturity),
            Stage::Wings => surface.omega(target.maturity, target.log_moneyness),
        };
        model - target.total_variance
    }

    /// Mean squared total-variance error of `surface` against `targets`.
    ///
    /// # Errors
    /// [`DupireError::NoCalibrationData`] if `targets` is empty.
    pub fn mean_square_error(self, surface: &SsviSurface, targets: &[VarianceTarget]) -> Result<f64> {
        if targets.is_empty() {
            return Err(DupireError::NoCalibrationData);
        }
        let sum: f64 = targets
            .iter()
            .map(|target| self.residual(surface, target).powi(2))
            .sum();
        Ok(sum / targets.len() as f64)
    }
}

/// Market implied total variance of one quote, in the coordinates a stage fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarianceTarget {
    pub maturity: f64,
    pub log_moneyness: f64,
    /// `IV² · maturity`
    pub total_variance: f64,
}

/// Inverts every quote into the total variance a stage fits against.
///
/// The ATM stage inverts prices at `k = 0`; the wings stage at
/// `k = ln(K e^{-rT} / S)`.
///
/// # Errors
/// [`DupireError::NoCalibrationData`] for an empty list, otherwise the first
/// option-type or implied-volatility error.
pub fn variance_targets(
    stage: Stage,
    quotes: &[MarketQuote],
    fixed: &FixedParameters,
    settings: &ImpliedVolSettings,
) -> Result<Vec<VarianceTarget>> {
    if quotes.is_empty() {
        return Err(DupireError::NoCalibrationData);
    }

    quotes
        .iter()
        .map(|quote| {
            let option_type = quote.parsed_type()?;
            let k = match stage {
                Stage::Atm => 0.0,
                Stage::Wings => log_moneyness(quote.strike, fixed.spot, fixed.r, quote.maturity),
            };
            let iv = implied_vol(
                option_type,
                quote.observed_price,
                fixed.spot,
                k,
                fixed.r,
                quote.maturity,
                settings,
            )?;
            Ok(VarianceTarget {
                maturity: quote.maturity,
                log_moneyness: k,
                total_variance: iv * iv * quote.maturity,
            })
        })
        .collect()
}

/// Free coordinates of `full` under `mask`, in parameter order.
pub fn project(full: &[f64; NUM_MODEL_PARAMS], mask: [bool; NUM_MODEL_PARAMS]) -> Vec<f64> {
    full.iter()
        .zip(mask)
        .filter_map(|(value, free)| free.then_some(*value))
        .collect()
}

/// Writes `free` into the masked coordinates of a copy of `base`.
pub fn embed(
    base: &[f64; NUM_MODEL_PARAMS],
    mask: [bool; NUM_MODEL_PARAMS],
    free: &[f64],
) -> [f64; NUM_MODEL_PARAMS] {
    let mut full = *base;
    let mut values = free.iter();
    for (slot, is_free) in full.iter_mut().zip(mask) {
        if is_free {
            if let Some(value) = values.next() {
                *slot = *value;
            }
        }
    }
    full
}

/// Stage objective over the full parameter vector, penalised where invalid.
fn penalised_error(stage: Stage, full: &[f64], targets: &[VarianceTarget]) -> f64 {
    let surface = match SsviSurface::from_slice(full) {
        Ok(surface) => surface,
        Err(err) => {
            trace!(stage = stage.label(), %err, "penalising invalid candidate");
            return INVALID_PARAMS_PENALTY;
        }
    };
    match stage.mean_square_error(&surface, targets) {
        Ok(mse) if mse.is_finite() => mse,
        _ => {
            trace!(stage = stage.label(), ?full, "penalising non-finite error");
            INVALID_PARAMS_PENALTY
        }
    }
}

/// Outcome of [`run_stage`] before it is turned into calibrator state.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub report: CalibrationReport,
    pub termination: Termination,
    pub iterations: usize,
}

/// Runs one calibration stage from `start`, moving only the stage's free parameters.
pub fn run_stage<M: Minimizer + ?Sized>(
    minimizer: &M,
    stage: Stage,
    targets: &[VarianceTarget],
    start: [f64; NUM_MODEL_PARAMS],
    config: &CalibrationConfig,
) -> Result<StageResult> {
    if targets.is_empty() {
        return Err(DupireError::NoCalibrationData);
    }

    let mask = stage.free_mask();
    let all_bounds = config.bounds.to_vec();
    let bounds: Vec<(f64, f64)> = all_bounds
        .iter()
        .zip(mask)
        .filter_map(|(b, free)| free.then_some(*b))
        .collect();
    let x0 = project(&start, mask);

    let objective = |free: &[f64]| penalised_error(stage, &embed(&start, mask, free), targets);
    let settings = MinimizerSettings {
        gradient_tolerance: config.accuracy,
        function_tolerance: config.accuracy,
        step_tolerance: config.accuracy,
        max_step: config.max_step,
        max_iterations: config.max_iterations,
    };

    debug!(
        stage = stage.label(),
        quotes = targets.len(),
        initial_error = objective(x0.as_slice()),
        "starting calibration stage"
    );

    let MinimizerReport {
        params,
        objective: best,
        iterations,
        termination,
    } = minimizer.minimize(&objective, &x0, &bounds, &settings);

    let full = embed(&start, mask, &params);
    let mean_square_error = if best.is_finite() {
        best
    } else {
        penalised_error(stage, &full, targets)
    };

    Ok(StageResult {
        report: CalibrationReport {
            outcome: termination.outcome(),
            params: full,
            mean_square_error,
        },
        termination,
        iterations,
    })
}

/// L-BFGS-B from `cmaes-lbfgsb`, optionally preceded by a CMA-ES global search.
#[derive(Debug, Clone, Default)]
pub struct LbfgsbMinimizer {
    pub global_search: Option<GlobalSearchConfig>,
}

impl LbfgsbMinimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global_search(global_search: GlobalSearchConfig) -> Self {
        Self {
            global_search: Some(global_search),
        }
    }

    fn global_search(
        config: &GlobalSearchConfig,
        objective: &(dyn Fn(&[f64]) -> f64 + Sync),
        start: Vec<f64>,
        bounds: &[(f64, f64)],
    ) -> Vec<f64> {
        let cmaes_config = CmaesCanonicalConfig {
            population_size: config.population_size,
            max_generations: config.max_generations,
            seed: config.seed,
            c1: None,
            c_mu: None,
            c_sigma: None,
            d_sigma: None,
            parallel_eval: config.parallel_eval,
            verbosity: 0,
            ipop_restarts: 0,
            ipop_increase_factor: 2.0,
            bipop_restarts: config.bipop_restarts,
            total_evals_budget: config.total_evals_budget,
            use_subrun_budgeting: false,
            alpha_mu: None,
            hsig_threshold_factor: None,
            bipop_small_population_factor: None,
            bipop_small_budget_factor: None,
            bipop_large_budget_factor: None,
            bipop_large_pop_increase_factor: None,
            max_bound_iterations: None,
            eig_precision_threshold: None,
            min_eig_value: None,
            matrix_op_threshold: None,
            stagnation_limit: None,
            min_sigma: None,
        };

        let start_obj = objective(start.as_slice());
        let result = canonical_cmaes_optimize(
            |x: &[f64]| objective(x),
            bounds,
            cmaes_config,
            Some(start.clone()),
        );
        let (_, candidate) = result.best_solution;
        let candidate_obj = objective(candidate.as_slice());

        if candidate_obj < start_obj {
            debug!(start_obj, candidate_obj, "CMA-ES improved starting point");
            candidate
        } else {
            debug!(start_obj, "CMA-ES did not improve starting point");
            start
        }
    }
}

/// Replays the stopping tests of `lbfgsb_optimize` on the states it hands to its
/// callback, so a run can be classified once it returns.
#[derive(Debug)]
struct StopTracker {
    x: Vec<f64>,
    f: f64,
    iterations: usize,
    stop: Option<Termination>,
}

impl StopTracker {
    fn new(x0: &[f64], f0: f64) -> Self {
        Self {
            x: x0.to_vec(),
            f: f0,
            iterations: 0,
            stop: None,
        }
    }

    fn record(&mut self, x: &[f64], f: f64, settings: &MinimizerSettings) {
        // the gradient test reports the current state again without stepping
        if x == self.x.as_slice() && f == self.f {
            self.stop = Some(Termination::GradientTolerance);
            return;
        }

        self.iterations += 1;
        let step = x
            .iter()
            .zip(&self.x)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        self.stop = if (self.f - f).abs() < settings.function_tolerance {
            Some(Termination::FunctionTolerance)
        } else if step < settings.step_tolerance {
            Some(Termination::StepTolerance)
        } else {
            None
        };
        self.x.copy_from_slice(x);
        self.f = f;
    }

    fn termination(&self) -> Termination {
        self.stop.clone().unwrap_or(Termination::MaxIterations)
    }
}

impl Minimizer for LbfgsbMinimizer {
    fn minimize(
        &self,
        objective: &(dyn Fn(&[f64]) -> f64 + Sync),
        x0: &[f64],
        bounds: &[(f64, f64)],
        settings: &MinimizerSettings,
    ) -> MinimizerReport {
        let mut x: Vec<f64> = x0
            .iter()
            .zip(bounds)
            .map(|(v, &(lo, hi))| v.clamp(lo, hi))
            .collect();

        if let Some(config) = &self.global_search {
            x = Self::global_search(config, objective, x, bounds);
        }

        let lbfgsb_config = LbfgsbConfig {
            obj_tol: settings.function_tolerance,
            step_size_tol: settings.step_tolerance,
            initial_step: settings.max_step,
            ..LbfgsbConfig::default()
        };
        let start = x.clone();
        let start_obj = objective(start.as_slice());
        let tracker = Mutex::new(StopTracker::new(&start, start_obj));

        let result = lbfgsb_optimize(
            &mut x,
            bounds,
            &|v: &[f64]| objective(v),
            settings.max_iterations,
            settings.gradient_tolerance,
            Some(|current_x: &[f64], current_obj: f64| {
                if let Ok(mut tracker) = tracker.lock() {
                    tracker.record(current_x, current_obj, settings);
                    trace!(
                        iteration = tracker.iterations,
                        objective = current_obj,
                        "L-BFGS-B iteration"
                    );
                }
            }),
            Some(lbfgsb_config),
        );
        let tracker = tracker.into_inner().unwrap_or_else(|e| e.into_inner());
        let iterations = tracker.iterations;

        match result {
            Ok((best, params)) if best.is_finite() => MinimizerReport {
                params,
                objective: best,
                iterations,
                termination: tracker.termination(),
            },
            Ok((best, params)) => MinimizerReport {
                params,
                objective: best,
                iterations,
                termination: Termination::Other(format!("non-finite objective {best}")),
            },
            Err(e) => {
                debug!(error = ?e, "L-BFGS-B failed");
                MinimizerReport {
                    params: start,
                    objective: start_obj,
                    iterations,
                    termination: Termination::Other(format!("{e:?}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::types::CalibrationOutcome;
    use approx::assert_abs_diff_eq;

    const GUESS: [f64; 5] = [0.2, 1.0, 0.1, 0.1, 0.1];

    #[test]
    fn mask_projection_round_trips() {
        let full = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mask = Stage::Wings.free_mask();
        let free = project(&full, mask);
        assert_eq!(free, vec![3.0, 4.0, 5.0]);
        assert_eq!(embed(&full, mask, &[7.0, 8.0, 9.0]), [1.0, 2.0, 7.0, 8.0, 9.0]);
        assert_eq!(project(&full, Stage::Atm.free_mask()), vec![1.0, 2.0]);
    }

    #[test]
    fn empty_targets_have_no_error_metric() {
        let surface = SsviSurface::from_slice(&GUESS).unwrap();
        assert_eq!(
            Stage::Atm.mean_square_error(&surface, &[]),
            Err(DupireError::NoCalibrationData)
        );
        assert_eq!(
            variance_targets(
                Stage::Wings,
                &[],
                &FixedParameters::default(),
                &ImpliedVolSettings::default()
            ),
            Err(DupireError::NoCalibrationData)
        );
    }

    #[test]
    fn invalid_candidates_are_penalised() {
        let target = VarianceTarget {
            maturity: 1.0,
            log_moneyness: 0.0,
            total_variance: 0.04,
        };
        // gamma = 1 is outside (0, 1)
        let err = penalised_error(Stage::Wings, &[0.2, 1.0, 1.0, 0.1, 0.1], &[target]);
        assert_eq!(err, INVALID_PARAMS_PENALTY);
        // eta = 0
        let err = penalised_error(Stage::Wings, &[0.2, 1.0, 0.5, 0.0, 0.1], &[target]);
        assert_eq!(err, INVALID_PARAMS_PENALTY);
    }

    #[test]
    fn atm_stage_ignores_wing_parameters() {
        let target = VarianceTarget {
            maturity: 1.0,
            log_moneyness: 0.3,
            total_variance: 0.05,
        };
        let a = penalised_error(Stage::Atm, &[0.2, 1.0, 0.1, 0.1, 0.1], &[target]);
        let b = penalised_error(Stage::Atm, &[0.2, 1.0, 0.9, 3.0, -0.5], &[target]);
        assert_abs_diff_eq!(a, b, epsilon = 1e-15);
    }

    #[test]
    fn atm_targets_are_inverted_at_the_money() {
        use crate::models::bs::bs_call_price;

        let fixed = FixedParameters { r: 0.02, spot: 100.0 };
        let price = bs_call_price(0.25, 100.0, 0.0, 0.02, 0.5);
        let quotes = [MarketQuote::new(0.5, 120.0, "call", price)];
        let targets =
            variance_targets(Stage::Atm, &quotes, &fixed, &ImpliedVolSettings::default()).unwrap();
        assert_eq!(targets[0].log_moneyness, 0.0);
        assert_abs_diff_eq!(targets[0].total_variance, 0.25 * 0.25 * 0.5, epsilon = 1e-5);
    }

    #[test]
    fn wing_targets_use_discounted_log_moneyness() {
        use crate::models::bs::bs_put_price;

        let fixed = FixedParameters { r: 0.03, spot: 100.0 };
        let k = log_moneyness(90.0, 100.0, 0.03, 2.0);
        let price = bs_put_price(0.3, 100.0, k, 0.03, 2.0);
        let quotes = [MarketQuote::new(2.0, 90.0, "P", price)];
        let targets =
            variance_targets(Stage::Wings, &quotes, &fixed, &ImpliedVolSettings::default())
                .unwrap();
        assert_abs_diff_eq!(targets[0].log_moneyness, k, epsilon = 1e-15);
        assert_abs_diff_eq!(targets[0].total_variance, 0.09 * 2.0, epsilon = 1e-5);
    }

    fn settings(tolerance: f64, max_step: f64, max_iterations: usize) -> MinimizerSettings {
        MinimizerSettings {
            gradient_tolerance: 1e-12,
            function_tolerance: tolerance,
            step_tolerance: tolerance,
            max_step,
            max_iterations,
        }
    }

    fn quartic_bowl(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 0.3).powi(4)).sum()
    }

    fn quadratic_bowl(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 0.3).powi(2)).sum()
    }

    #[test]
    fn looser_function_tolerance_stops_sooner() {
        let bounds = [(-2.0, 2.0); 2];
        let x0 = [1.5, -1.0];
        let minimizer = LbfgsbMinimizer::new();

        let loose = minimizer.minimize(&quartic_bowl, &x0, &bounds, &settings(1e-1, 1.0, 200));
        let tight = minimizer.minimize(&quartic_bowl, &x0, &bounds, &settings(1e-12, 1.0, 200));

        assert_eq!(loose.termination, Termination::FunctionTolerance);
        assert!(loose.iterations >= 1);
        assert!(
            loose.iterations < tight.iterations,
            "loose {} vs tight {}",
            loose.iterations,
            tight.iterations
        );
        assert!(tight.objective <= loose.objective);
    }

    #[test]
    fn max_step_caps_the_first_move() {
        let bounds = [(-2.0, 2.0); 2];
        let x0 = [1.3, 1.3];
        let minimizer = LbfgsbMinimizer::new();

        let capped = minimizer.minimize(&quadratic_bowl, &x0, &bounds, &settings(1e-12, 0.01, 1));
        assert_eq!(capped.iterations, 1);
        assert_eq!(capped.termination, Termination::MaxIterations);
        for (x, start) in capped.params.iter().zip(&x0) {
            assert!((x - start).abs() <= 0.02 + 1e-9, "moved to {x}");
        }

        let free = minimizer.minimize(&quadratic_bowl, &x0, &bounds, &settings(1e-12, 1.0, 1));
        for (x, start) in free.params.iter().zip(&x0) {
            assert!((x - start).abs() > 0.5, "moved to {x}");
        }
    }

    #[test]
    fn converging_on_the_last_iteration_is_not_a_cap() {
        let bounds = [(-2.0, 2.0); 2];
        let mut at_minimum = settings(1e-12, 1.0, 1);
        at_minimum.gradient_tolerance = 1e-4;

        let report =
            LbfgsbMinimizer::new().minimize(&quadratic_bowl, &[0.3, 0.3], &bounds, &at_minimum);

        assert_eq!(report.termination, Termination::GradientTolerance);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.termination.outcome(), CalibrationOutcome::FinishedOK);
    }

    #[test]
    fn stop_tracker_classifies_each_tolerance() {
        let s = settings(1e-6, 1.0, 10);

        let mut tracker = StopTracker::new(&[1.0, 1.0], 2.0);
        tracker.record(&[0.5, 0.5], 1.0, &s);
        assert_eq!(tracker.stop, None);
        assert_eq!(tracker.termination(), Termination::MaxIterations);

        tracker.record(&[0.4, 0.4], 1.0 - 1e-9, &s);
        assert_eq!(tracker.termination(), Termination::FunctionTolerance);

        let mut tracker = StopTracker::new(&[1.0], 5.0);
        tracker.record(&[1.0 + 1e-9], 4.0, &s);
        assert_eq!(tracker.termination(), Termination::StepTolerance);

        tracker.record(&[1.0 + 1e-9], 4.0, &s);
        assert_eq!(tracker.termination(), Termination::GradientTolerance);
        assert_eq!(tracker.iterations, 1);
    }
}
