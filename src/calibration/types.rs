use crate::error::Result;
use crate::models::bs::OptionType;

/// Observed market price of a European option.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketQuote {
    /// Time to expiration in years
    pub maturity: f64,
    /// Strike price
    pub strike: f64,
    /// Option type label as supplied: "Call"/"call"/"C"/"c" or "Put"/"put"/"P"/"p"
    pub option_type: String,
    /// Observed option price
    pub observed_price: f64,
}

impl MarketQuote {
    pub fn new(
        maturity: f64,
        strike: f64,
        option_type: impl Into<String>,
        observed_price: f64,
    ) -> Self {
        Self {
            maturity,
            strike,
            option_type: option_type.into(),
            observed_price,
        }
    }

    /// Parses the option type label.
    ///
    /// # Errors
    /// [`crate::DupireError::UnrecognizedOptionType`] for any label other than the
    /// accepted call/put spellings.
    pub fn parsed_type(&self) -> Result<OptionType> {
        self.option_type.parse()
    }
}

/// Quantities observed in the market and held fixed during calibration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedParameters {
    /// Continuously compounded risk-free rate
    pub r: f64,
    /// Spot price of the underlying
    pub spot: f64,
}

impl Default for FixedParameters {
    fn default() -> Self {
        Self { r: 0.0, spot: 100.0 }
    }
}

/// Status of the most recent calibration stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CalibrationOutcome {
    #[default]
    NotStarted,
    FinishedOK,
    FailedMaxIterations,
    FailedOtherReason,
}

/// Result of one calibration stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub outcome: CalibrationOutcome,
    /// Best-fit `[alpha, beta, gamma, eta, rho]`
    pub params: [f64; 5],
    /// Mean squared total-variance error of `params` for the stage's objective
    pub mean_square_error: f64,
}

/// Why the optimiser stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Relative function improvement fell below tolerance.
    FunctionTolerance,
    /// Relative step fell below tolerance.
    StepTolerance,
    /// Gradient norm fell below tolerance.
    GradientTolerance,
    /// The iteration cap was reached.
    MaxIterations,
    /// Any other stop, with a description.
    Other(String),
}

impl Termination {
    pub fn outcome(&self) -> CalibrationOutcome {
        match self {
            Termination::FunctionTolerance
            | Termination::StepTolerance
            | Termination::GradientTolerance => CalibrationOutcome::FinishedOK,
            Termination::MaxIterations => CalibrationOutcome::FailedMaxIterations,
            Termination::Other(_) => CalibrationOutcome::FailedOtherReason,
        }
    }
}

/// Stopping rules handed to a [`Minimizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerSettings {
    pub gradient_tolerance: f64,
    pub function_tolerance: f64,
    pub step_tolerance: f64,
    /// Cap on the line-search step along each search direction
    pub max_step: f64,
    pub max_iterations: usize,
}

/// Best point found by a [`Minimizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerReport {
    pub params: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// Bound-constrained minimiser of a derivative-free scalar objective.
///
/// Implementations approximate gradients themselves (finite differences) and must
/// keep every evaluated point inside `bounds`.
pub trait Minimizer {
    fn minimize(
        &self,
        objective: &(dyn Fn(&[f64]) -> f64 + Sync),
        x0: &[f64],
        bounds: &[(f64, f64)],
        settings: &MinimizerSettings,
    ) -> MinimizerReport;
}

impl<M: Minimizer + ?Sized> Minimizer for &M {
    fn minimize(
        &self,
        objective: &(dyn Fn(&[f64]) -> f64 + Sync),
        x0: &[f64],
        bounds: &[(f64, f64)],
        settings: &MinimizerSettings,
    ) -> MinimizerReport {
        (**self).minimize(objective, x0, bounds, settings)
    }
}

/// Closed-form price of a quote under a calibrated surface
#[derive(Debug, Clone, PartialEq)]
pub struct PricingResult {
    /// Option type label of the priced quote
    pub option_type: String,
    pub strike: f64,
    pub maturity: f64,
    pub market_price: f64,
    pub model_price: f64,
    /// Model implied volatility (as decimal)
    pub model_iv: f64,
}
