pub mod config;
pub mod pipeline;
pub mod types;

pub use config::{CalibrationConfig, GlobalSearchConfig, ParameterBounds};
pub use pipeline::{run_stage, variance_targets, LbfgsbMinimizer, Stage, VarianceTarget};
pub use types::{CalibrationOutcome, CalibrationReport, FixedParameters, MarketQuote, Minimizer};
