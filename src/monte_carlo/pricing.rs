//! Monte Carlo pricing of path-dependent payoffs on simulated ensembles.

use std::str::FromStr;

use tracing::debug;

use crate::error::{DupireError, Result};
use crate::models::bs::OptionType;
use crate::models::ssvi::SsviSurface;
use crate::models::traits::LocalVolatility;
use crate::monte_carlo::paths::{generate_paths, ExecutionMode, PathEnsemble, SimulationConfig};

/// Side of the spot the barrier sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierDirection {
    /// Hit when a price is at or below the level.
    Down,
    /// Hit when a price is at or above the level.
    Up,
}

impl FromStr for BarrierDirection {
    type Err = DupireError;

    /// Accepts `D`/`Down` and `U`/`Up`, any letter case.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "d" | "down" => Ok(BarrierDirection::Down),
            "u" | "up" => Ok(BarrierDirection::Up),
            _ => Err(DupireError::InvalidBarrierDirection(s.to_string())),
        }
    }
}

/// Whether hitting the barrier activates or cancels the payoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnockType {
    In,
    Out,
}

impl FromStr for KnockType {
    type Err = DupireError;

    /// Accepts `I`/`In` and `O`/`Out`, any letter case.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "i" | "in" => Ok(KnockType::In),
            "o" | "out" => Ok(KnockType::Out),
            _ => Err(DupireError::InvalidKnockType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Barrier {
    pub level: f64,
    pub direction: BarrierDirection,
    pub knock: KnockType,
}

impl Barrier {
    pub fn new(level: f64, direction: BarrierDirection, knock: KnockType) -> Self {
        Self {
            level,
            direction,
            knock,
        }
    }

    /// Parses direction and knock labels such as `"D"`, `"Up"`, `"I"`, `"out"`.
    pub fn from_labels(level: f64, direction: &str, knock: &str) -> Result<Self> {
        Ok(Self::new(level, direction.parse()?, knock.parse()?))
    }

    /// Whether any point of `path`, step 0 included, touches the barrier.
    pub fn is_hit(&self, path: &[f64]) -> bool {
        match self.direction {
            BarrierDirection::Down => path.iter().any(|&s| s <= self.level),
            BarrierDirection::Up => path.iter().any(|&s| s >= self.level),
        }
    }

    /// Whether a path with the given hit status pays out.
    pub fn is_active(&self, hit: bool) -> bool {
        match self.knock {
            KnockType::In => hit,
            KnockType::Out => !hit,
        }
    }
}

/// Payoff evaluated on one simulated path.
#[derive(Debug, Clone, PartialEq)]
pub enum Payoff {
    /// Vanilla payoff on the terminal price.
    European { option_type: OptionType, strike: f64 },
    /// Vanilla payoff on the arithmetic average over `monitoring_steps`.
    Asian {
        option_type: OptionType,
        strike: f64,
        monitoring_steps: Vec<usize>,
    },
    /// Floating-strike lookback `S_T - min_m S_m`.
    Lookback,
    /// Vanilla payoff on the terminal price, conditional on the barrier.
    Barrier {
        option_type: OptionType,
        strike: f64,
        barrier: Barrier,
    },
}

impl Payoff {
    /// Asian payoff monitored at `times`, mapped to steps `round((t / maturity)(M - 1))`.
    ///
    /// # Errors
    /// [`DupireError::InvalidInput`] for an empty list or a time outside `[0, maturity]`.
    pub fn asian(
        option_type: OptionType,
        strike: f64,
        times: &[f64],
        maturity: f64,
        num_steps: usize,
    ) -> Result<Self> {
        if times.is_empty() {
            return Err(DupireError::invalid_input("Asian option needs at least one monitoring time"));
        }
        let last = num_steps.saturating_sub(1) as f64;
        let monitoring_steps = times
            .iter()
            .map(|&t| {
                if !(0.0..=maturity).contains(&t) {
                    return Err(DupireError::invalid_input(format!(
                        "monitoring time {t} lies outside [0, {maturity}]"
                    )));
                }
                Ok(((t / maturity) * last).round_ties_even() as usize)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Payoff::Asian {
            option_type,
            strike,
            monitoring_steps,
        })
    }

    /// Fails if the payoff reads steps beyond `num_steps`.
    fn check_steps(&self, num_steps: usize) -> Result<()> {
        if let Payoff::Asian {
            monitoring_steps, ..
        } = self
        {
            if let Some(&step) = monitoring_steps.iter().find(|&&m| m >= num_steps) {
                return Err(DupireError::invalid_input(format!(
                    "monitoring step {step} exceeds the {num_steps} simulated steps"
                )));
            }
        }
        Ok(())
    }

    /// Undiscounted payoff of one path.
    pub fn evaluate(&self, path: &[f64]) -> f64 {
        let terminal = path[path.len() - 1];
        match self {
            Payoff::European {
                option_type,
                strike,
            } => option_type.payoff(terminal, *strike),
            Payoff::Asian {
                option_type,
                strike,
                monitoring_steps,
            } => {
                let sum: f64 = monitoring_steps.iter().map(|&m| path[m]).sum();
                option_type.payoff(sum / monitoring_steps.len() as f64, *strike)
            }
            Payoff::Lookback => {
                let min = path.iter().copied().fold(f64::INFINITY, f64::min);
                terminal - min
            }
            Payoff::Barrier {
                option_type,
                strike,
                barrier,
            } => {
                if barrier.is_active(barrier.is_hit(path)) {
                    option_type.payoff(terminal, *strike)
                } else {
                    0.0
                }
            }
        }
    }
}

/// Discounted average of `payoff` over every path of `ensemble`.
pub fn price_ensemble(
    ensemble: &PathEnsemble,
    payoff: &Payoff,
    rate: f64,
    maturity: f64,
) -> Result<f64> {
    payoff.check_steps(ensemble.num_steps())?;
    let total: f64 = ensemble.paths().map(|path| payoff.evaluate(path)).sum();
    Ok((-rate * maturity).exp() * total / ensemble.num_paths() as f64)
}

/// Prices payoffs by simulating a fresh ensemble under a local volatility surface for
/// every call.
#[derive(Debug, Clone)]
pub struct MonteCarloPricer<V = SsviSurface> {
    surface: V,
    rate: f64,
    num_paths: usize,
    num_steps: usize,
    mode: ExecutionMode,
    seed: Option<u64>,
}

impl<V: LocalVolatility + Sync> MonteCarloPricer<V> {
    pub fn new(surface: V, rate: f64, num_paths: usize, num_steps: usize) -> Self {
        Self {
            surface,
            rate,
            num_paths,
            num_steps,
            mode: ExecutionMode::default(),
            seed: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn surface(&self) -> &V {
        &self.surface
    }

    fn simulation(&self, spot: f64, maturity: f64) -> SimulationConfig {
        SimulationConfig {
            num_paths: self.num_paths,
            num_steps: self.num_steps,
            maturity,
            rate: self.rate,
            spot,
        }
    }

    /// Paths the pricer would simulate for `spot` and `maturity`.
    pub fn generate_paths(&self, spot: f64, maturity: f64) -> Result<PathEnsemble> {
        generate_paths(
            &self.surface,
            self.simulation(spot, maturity),
            self.mode,
            self.seed,
        )
    }

    /// Simulates one ensemble and prices `payoff` on it.
    pub fn price(&self, spot: f64, maturity: f64, payoff: &Payoff) -> Result<f64> {
        let ensemble = self.generate_paths(spot, maturity)?;
        let price = price_ensemble(&ensemble, payoff, self.rate, maturity)?;
        debug!(?payoff, spot, maturity, price, "monte carlo price");
        Ok(price)
    }

    pub fn european(
        &self,
        option_type: OptionType,
        spot: f64,
        strike: f64,
        maturity: f64,
    ) -> Result<f64> {
        self.price(
            spot,
            maturity,
            &Payoff::European {
                option_type,
                strike,
            },
        )
    }

    pub fn european_call(&self, spot: f64, strike: f64, maturity: f64) -> Result<f64> {
        self.european(OptionType::Call, spot, strike, maturity)
    }

    pub fn european_put(&self, spot: f64, strike: f64, maturity: f64) -> Result<f64> {
        self.european(OptionType::Put, spot, strike, maturity)
    }

    /// Arithmetic-average option monitored at `times` (years, within `[0, maturity]`).
    pub fn asian(
        &self,
        option_type: OptionType,
        spot: f64,
        strike: f64,
        times: &[f64],
        maturity: f64,
    ) -> Result<f64> {
        let payoff = Payoff::asian(option_type, strike, times, maturity, self.num_steps)?;
        self.price(spot, maturity, &payoff)
    }

    pub fn asian_call(&self, spot: f64, strike: f64, times: &[f64], maturity: f64) -> Result<f64> {
        self.asian(OptionType::Call, spot, strike, times, maturity)
    }

    pub fn asian_put(&self, spot: f64, strike: f64, times: &[f64], maturity: f64) -> Result<f64> {
        self.asian(OptionType::Put, spot, strike, times, maturity)
    }

    pub fn lookback(&self, spot: f64, maturity: f64) -> Result<f64> {
        self.price(spot, maturity, &Payoff::Lookback)
    }

    /// Knock-in or knock-out option; `direction` is `D`/`Down` or `U`/`Up`, `knock` is
    /// `I`/`In` or `O`/`Out`.
    #[allow(clippy::too_many_arguments)]
    pub fn barrier(
        &self,
        option_type: OptionType,
        spot: f64,
        strike: f64,
        maturity: f64,
        direction: &str,
        knock: &str,
        level: f64,
    ) -> Result<f64> {
        let barrier = Barrier::from_labels(level, direction, knock)?;
        self.price(
            spot,
            maturity,
            &Payoff::Barrier {
                option_type,
                strike,
                barrier,
            },
        )
    }

    pub fn barrier_call(
        &self,
        spot: f64,
        strike: f64,
        maturity: f64,
        direction: &str,
        knock: &str,
        level: f64,
    ) -> Result<f64> {
        self.barrier(OptionType::Call, spot, strike, maturity, direction, knock, level)
    }

    pub fn barrier_put(
        &self,
        spot: f64,
        strike: f64,
        maturity: f64,
        direction: &str,
        knock: &str,
        level: f64,
    ) -> Result<f64> {
        self.barrier(OptionType::Put, spot, strike, maturity, direction, knock, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ensemble() -> PathEnsemble {
        PathEnsemble::from_values(
            vec![
                100.0, 90.0, 110.0, 120.0, // dips to 90, ends 120
                100.0, 105.0, 95.0, 80.0, // ends 80
            ],
            2,
            4,
        )
        .unwrap()
    }

    #[test]
    fn barrier_labels() {
        for label in ["D", "d", "Down", "DOWN"] {
            assert_eq!(label.parse::<BarrierDirection>().unwrap(), BarrierDirection::Down);
        }
        for label in ["U", "up"] {
            assert_eq!(label.parse::<BarrierDirection>().unwrap(), BarrierDirection::Up);
        }
        for label in ["I", "in"] {
            assert_eq!(label.parse::<KnockType>().unwrap(), KnockType::In);
        }
        for label in ["O", "Out"] {
            assert_eq!(label.parse::<KnockType>().unwrap(), KnockType::Out);
        }
        assert_eq!(
            Barrier::from_labels(90.0, "X", "I").unwrap_err(),
            DupireError::InvalidBarrierDirection("X".into())
        );
        assert_eq!(
            Barrier::from_labels(90.0, "D", "Y").unwrap_err(),
            DupireError::InvalidKnockType("Y".into())
        );
    }

    #[test]
    fn barrier_touch_counts_as_hit() {
        let down = Barrier::new(90.0, BarrierDirection::Down, KnockType::In);
        let up = Barrier::new(120.0, BarrierDirection::Up, KnockType::In);
        let path = [100.0, 90.0, 110.0, 120.0];
        assert!(down.is_hit(&path));
        assert!(up.is_hit(&path));
        assert!(!down.is_hit(&[100.0, 90.5, 101.0]));
    }

    #[test]
    fn european_and_lookback_payoffs() {
        let e = ensemble();
        let call = Payoff::European {
            option_type: OptionType::Call,
            strike: 100.0,
        };
        // undiscounted: (20 + 0) / 2
        assert_abs_diff_eq!(price_ensemble(&e, &call, 0.0, 1.0).unwrap(), 10.0);
        // (120 - 90 + 80 - 80) / 2, discounted
        assert_abs_diff_eq!(
            price_ensemble(&e, &Payoff::Lookback, 0.05, 2.0).unwrap(),
            15.0 * (-0.1_f64).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn asian_monitoring_maps_times_to_steps() {
        let payoff = Payoff::asian(OptionType::Put, 100.0, &[0.0, 0.5, 1.0], 1.0, 4).unwrap();
        // 0.5 * 3 = 1.5 rounds to even step 2
        assert_eq!(
            payoff,
            Payoff::Asian {
                option_type: OptionType::Put,
                strike: 100.0,
                monitoring_steps: vec![0, 2, 3],
            }
        );
        // path 0 averages (100 + 110 + 120) / 3 = 110, path 1 (100 + 95 + 80) / 3 = 91.67
        let expected = (0.0 + (100.0 - 275.0 / 3.0)) / 2.0;
        assert_abs_diff_eq!(
            price_ensemble(&ensemble(), &payoff, 0.0, 1.0).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn asian_rejects_bad_monitoring_times() {
        assert!(matches!(
            Payoff::asian(OptionType::Call, 100.0, &[], 1.0, 4),
            Err(DupireError::InvalidInput { .. })
        ));
        assert!(matches!(
            Payoff::asian(OptionType::Call, 100.0, &[0.5, 1.5], 1.0, 4),
            Err(DupireError::InvalidInput { .. })
        ));
        assert!(matches!(
            Payoff::asian(OptionType::Call, 100.0, &[-0.1], 1.0, 4),
            Err(DupireError::InvalidInput { .. })
        ));

        let too_long = Payoff::asian(OptionType::Call, 100.0, &[1.0], 1.0, 10).unwrap();
        assert!(price_ensemble(&ensemble(), &too_long, 0.0, 1.0).is_err());
    }

    #[test]
    fn knock_in_plus_knock_out_is_vanilla() {
        let e = ensemble();
        for direction in [BarrierDirection::Down, BarrierDirection::Up] {
            let payoff = |knock| Payoff::Barrier {
                option_type: OptionType::Call,
                strike: 95.0,
                barrier: Barrier::new(92.0, direction, knock),
            };
            let knock_in = price_ensemble(&e, &payoff(KnockType::In), 0.01, 1.0).unwrap();
            let knock_out = price_ensemble(&e, &payoff(KnockType::Out), 0.01, 1.0).unwrap();
            let vanilla = price_ensemble(
                &e,
                &Payoff::European {
                    option_type: OptionType::Call,
                    strike: 95.0,
                },
                0.01,
                1.0,
            )
            .unwrap();
            assert_abs_diff_eq!(knock_in + knock_out, vanilla, epsilon = 1e-12);
        }
    }
}
