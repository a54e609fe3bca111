//! Euler-Maruyama path generation under a local volatility function.
//!
//! Every path starts at the spot and evolves as
//!
//! `S_m = S_{m-1} + r S_{m-1} τ + σ(mτ, k) S_{m-1} √τ Z`
//!
//! with `τ = T / M`, `k = ln(S_{m-1} e^{-rT} / S_0)` and one standard normal draw `Z`
//! per path and step.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{DupireError, Result};
use crate::math::{NormalSampler, StdNormalSampler};
use crate::models::traits::LocalVolatility;

/// Floor applied to a non-positive previous price before the next step.
pub const PRICE_FLOOR: f64 = 1e-10;

/// Size and market inputs of one simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    pub num_paths: usize,
    /// Number of stored time points per path, including the spot at step 0
    pub num_steps: usize,
    pub maturity: f64,
    pub rate: f64,
    pub spot: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_paths: 10_000,
            num_steps: 128,
            maturity: 1.0,
            rate: 0.0,
            spot: 100.0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_paths < 1 {
            return Err(DupireError::invalid_input("num_paths must be at least 1"));
        }
        if self.num_steps < 2 {
            return Err(DupireError::invalid_input(format!(
                "num_steps must be at least 2, got {}",
                self.num_steps
            )));
        }
        if !self.maturity.is_finite() || self.maturity <= 0.0 {
            return Err(DupireError::invalid_input(format!(
                "maturity must be positive and finite, got {}",
                self.maturity
            )));
        }
        if !self.spot.is_finite() || self.spot <= 0.0 {
            return Err(DupireError::invalid_input(format!(
                "spot must be positive and finite, got {}",
                self.spot
            )));
        }
        if !self.rate.is_finite() {
            return Err(DupireError::invalid_input(format!(
                "rate must be finite, got {}",
                self.rate
            )));
        }
        Ok(())
    }

    /// `τ = T / M`
    pub fn time_step(&self) -> f64 {
        self.maturity / self.num_steps as f64
    }
}

/// How paths are distributed over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionMode {
    /// One sampler, draws batched per step across all paths.
    #[default]
    Sequential,
    /// One rayon work item per path, each with its own sampler stream.
    Parallel,
}

/// Simulated prices, one row of `num_steps` values per path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEnsemble {
    values: Vec<f64>,
    num_paths: usize,
    num_steps: usize,
}

impl PathEnsemble {
    /// Wraps row-major `values` of shape `(num_paths, num_steps)`.
    pub fn from_values(values: Vec<f64>, num_paths: usize, num_steps: usize) -> Result<Self> {
        if num_paths == 0 || num_steps == 0 || values.len() != num_paths * num_steps {
            return Err(DupireError::invalid_input(format!(
                "{} values do not form a {num_paths} x {num_steps} ensemble",
                values.len()
            )));
        }
        Ok(Self {
            values,
            num_paths,
            num_steps,
        })
    }

    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Prices of path `n`, step 0 first.
    pub fn path(&self, n: usize) -> &[f64] {
        &self.values[n * self.num_steps..(n + 1) * self.num_steps]
    }

    pub fn paths(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.num_steps)
    }

    pub fn value(&self, n: usize, m: usize) -> f64 {
        self.values[n * self.num_steps + m]
    }

    pub fn terminal(&self, n: usize) -> f64 {
        self.value(n, self.num_steps - 1)
    }

    /// Row-major backing storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Next price from `prev` at step `m`, given the standard normal draw `z`.
#[inline]
fn euler_step<V: LocalVolatility + ?Sized>(
    surface: &V,
    config: &SimulationConfig,
    prev: f64,
    m: usize,
    z: f64,
) -> f64 {
    let tau = config.time_step();
    let s = if prev <= 0.0 { PRICE_FLOOR } else { prev };
    let k = (s * (-config.rate * config.maturity).exp() / config.spot).ln();
    let sigma = surface.local_vol(tau * m as f64, k);
    s + config.rate * s * tau + sigma * s * tau.sqrt() * z
}

/// Local-volatility Euler-Maruyama simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSimulator {
    config: SimulationConfig,
    mode: ExecutionMode,
    seed: Option<u64>,
}

impl PathSimulator {
    /// # Errors
    /// [`DupireError::InvalidInput`] if `config` fails [`SimulationConfig::validate`].
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            mode: ExecutionMode::default(),
            seed: None,
        })
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Makes every run reproducible; without a seed samplers draw from OS entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Simulates a fresh ensemble in the configured mode with the default samplers.
    pub fn generate<V: LocalVolatility + Sync + ?Sized>(&self, surface: &V) -> PathEnsemble {
        match (self.mode, self.seed) {
            (ExecutionMode::Sequential, Some(seed)) => {
                self.generate_sequential(surface, &mut StdNormalSampler::seeded(seed))
            }
            (ExecutionMode::Sequential, None) => {
                self.generate_sequential(surface, &mut StdNormalSampler::from_entropy())
            }
            (ExecutionMode::Parallel, Some(seed)) => {
                self.generate_parallel(surface, |n| StdNormalSampler::stream(seed, n as u64))
            }
            (ExecutionMode::Parallel, None) => {
                self.generate_parallel(surface, |_| StdNormalSampler::from_entropy())
            }
        }
    }

    /// Steps all paths together, drawing one batch of `num_paths` normals per step.
    pub fn generate_sequential<V, S>(&self, surface: &V, sampler: &mut S) -> PathEnsemble
    where
        V: LocalVolatility + ?Sized,
        S: NormalSampler + ?Sized,
    {
        let SimulationConfig {
            num_paths,
            num_steps,
            spot,
            ..
        } = self.config;
        debug!(num_paths, num_steps, "simulating paths sequentially");

        let mut values = vec![0.0; num_paths * num_steps];
        for row in values.chunks_exact_mut(num_steps) {
            row[0] = spot;
        }

        let mut z = vec![0.0; num_paths];
        for m in 1..num_steps {
            sampler.fill_standard_normal(&mut z);
            for (row, &dz) in values.chunks_exact_mut(num_steps).zip(&z) {
                row[m] = euler_step(surface, &self.config, row[m - 1], m, dz);
            }
        }

        PathEnsemble {
            values,
            num_paths,
            num_steps,
        }
    }

    /// Simulates each path as an independent rayon task with the sampler built by
    /// `make_sampler(path_index)`.
    pub fn generate_parallel<V, S, F>(&self, surface: &V, make_sampler: F) -> PathEnsemble
    where
        V: LocalVolatility + Sync + ?Sized,
        S: NormalSampler,
        F: Fn(usize) -> S + Sync,
    {
        let SimulationConfig {
            num_paths,
            num_steps,
            spot,
            ..
        } = self.config;
        debug!(num_paths, num_steps, "simulating paths in parallel");

        let mut values = vec![0.0; num_paths * num_steps];
        values
            .par_chunks_mut(num_steps)
            .enumerate()
            .for_each(|(n, row)| {
                let mut sampler = make_sampler(n);
                let mut z = vec![0.0; num_steps - 1];
                sampler.fill_standard_normal(&mut z);

                row[0] = spot;
                for m in 1..num_steps {
                    row[m] = euler_step(surface, &self.config, row[m - 1], m, z[m - 1]);
                }
            });

        PathEnsemble {
            values,
            num_paths,
            num_steps,
        }
    }
}

/// Simulates `config` once under `surface` in the given mode.
pub fn generate_paths<V: LocalVolatility + Sync + ?Sized>(
    surface: &V,
    config: SimulationConfig,
    mode: ExecutionMode,
    seed: Option<u64>,
) -> Result<PathEnsemble> {
    let mut simulator = PathSimulator::new(config)?.with_mode(mode);
    if let Some(seed) = seed {
        simulator = simulator.with_seed(seed);
    }
    Ok(simulator.generate(surface))
}
