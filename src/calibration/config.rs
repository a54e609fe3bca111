use crate::models::bs::ImpliedVolSettings;

/// Box constraints for `[alpha, beta, gamma, eta, rho]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParameterBounds {
    pub alpha: (f64, f64),
    pub beta: (f64, f64),
    /// Kept strictly inside (0, 1)
    pub gamma: (f64, f64),
    /// Kept strictly positive
    pub eta: (f64, f64),
    pub rho: (f64, f64),
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            alpha: (1e-4, 5.0),
            beta: (1e-4, 5.0),
            gamma: (1e-4, 1.0 - 1e-4),
            eta: (1e-4, 10.0),
            rho: (-0.999, 0.999),
        }
    }
}

impl ParameterBounds {
    /// Bounds in parameter order.
    pub fn to_vec(&self) -> Vec<(f64, f64)> {
        vec![self.alpha, self.beta, self.gamma, self.eta, self.rho]
    }
}

impl From<[(f64, f64); 5]> for ParameterBounds {
    fn from(b: [(f64, f64); 5]) -> Self {
        Self {
            alpha: b[0],
            beta: b[1],
            gamma: b[2],
            eta: b[3],
            rho: b[4],
        }
    }
}

/// CMA-ES global search run before the local L-BFGS-B refinement
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GlobalSearchConfig {
    /// Population size (0 lets CMA-ES choose)
    pub population_size: usize,
    pub max_generations: usize,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Whether to evaluate the population in parallel
    pub parallel_eval: bool,
    /// Number of BIPOP restarts (0 = no BIPOP)
    pub bipop_restarts: usize,
    /// Total function evaluations budget
    pub total_evals_budget: usize,
}

impl Default for GlobalSearchConfig {
    fn default() -> Self {
        Self {
            population_size: 0,
            max_generations: 200,
            seed: 123456,
            parallel_eval: true,
            bipop_restarts: 2,
            total_evals_budget: 50_000,
        }
    }
}

/// Settings for both SSVI calibration stages
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CalibrationConfig {
    /// Gradient, function and step tolerance of the optimiser
    #[cfg_attr(feature = "serde", serde(default = "default_accuracy"))]
    pub accuracy: f64,

    #[cfg_attr(feature = "serde", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,

    /// Initial line-search step; no iteration moves further along its search direction
    #[cfg_attr(feature = "serde", serde(default = "default_max_step"))]
    pub max_step: f64,

    /// Starting point `[alpha, beta, gamma, eta, rho]`
    #[cfg_attr(feature = "serde", serde(default = "default_guess"))]
    pub guess: [f64; 5],

    #[cfg_attr(feature = "serde", serde(default))]
    pub bounds: ParameterBounds,

    /// Newton settings used to invert quote prices
    #[cfg_attr(feature = "serde", serde(default))]
    pub implied_vol: ImpliedVolSettings,

    /// Optional CMA-ES pre-search; `None` runs L-BFGS-B alone
    #[cfg_attr(feature = "serde", serde(default))]
    pub global_search: Option<GlobalSearchConfig>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            accuracy: default_accuracy(),
            max_iterations: default_max_iterations(),
            max_step: default_max_step(),
            guess: default_guess(),
            bounds: ParameterBounds::default(),
            implied_vol: ImpliedVolSettings::default(),
            global_search: None,
        }
    }
}

impl CalibrationConfig {
    /// Default configuration for production calibration with high accuracy
    pub fn production() -> Self {
        Self {
            accuracy: 1e-8,
            max_iterations: 1000,
            global_search: Some(GlobalSearchConfig {
                bipop_restarts: 3,
                total_evals_budget: 100_000,
                ..GlobalSearchConfig::default()
            }),
            ..Self::default()
        }
    }

    /// Fast configuration for development and testing
    pub fn fast() -> Self {
        Self {
            accuracy: 1e-6,
            max_iterations: 300,
            ..Self::default()
        }
    }

    /// High-precision configuration for research and backtesting
    pub fn research() -> Self {
        Self {
            accuracy: 1e-10,
            max_iterations: 10_000,
            implied_vol: ImpliedVolSettings {
                max_error: 1e-9,
                ..ImpliedVolSettings::default()
            },
            global_search: Some(GlobalSearchConfig {
                max_generations: 500,
                bipop_restarts: 5,
                total_evals_budget: 500_000,
                ..GlobalSearchConfig::default()
            }),
            ..Self::default()
        }
    }

    /// Minimal configuration for quick validation and debugging
    pub fn minimal() -> Self {
        Self {
            accuracy: 1e-4,
            max_iterations: 100,
            ..Self::default()
        }
    }
}

#[cfg(feature = "serde")]
impl CalibrationConfig {
    /// Parses a configuration from TOML; missing fields take their defaults.
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        toml::from_str(source).context("invalid calibration configuration")
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("failed to load {}", path.display()))
    }
}

fn default_accuracy() -> f64 {
    1e-4
}

fn default_max_iterations() -> usize {
    500
}

fn default_max_step() -> f64 {
    0.05
}

fn default_guess() -> [f64; 5] {
    [0.2, 1.0, 0.1, 0.1, 0.1]
}
