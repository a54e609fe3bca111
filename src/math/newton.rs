// src/math/newton.rs

//! Scalar Newton-Raphson root finder.

use tracing::debug;

use crate::error::{DupireError, Result};
use crate::math::FINITE_DIFFERENCE_STEP;

/// Derivatives with an absolute value below this abort the iteration.
const MIN_DERIVATIVE: f64 = 1e-16;

/// Newton-Raphson solver returning `x` with `|f(x)| < max_error`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSolver {
    max_error: f64,
    max_iterations: usize,
}

impl NewtonSolver {
    pub fn new(max_error: f64, max_iterations: usize) -> Self {
        Self {
            max_error,
            max_iterations,
        }
    }

    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Solves `f(x) = 0` starting from `x0`.
    ///
    /// When `f_prime` is `None` the derivative is the forward difference
    /// `(f(x + h) - f(x)) / h` with `h = 1e-6`.
    ///
    /// # Errors
    /// * [`DupireError::DerivativeTooSmall`] if `|f'(x_n)| < 1e-16`
    /// * [`DupireError::DidNotConverge`] if `max_iterations` steps were taken without
    ///   reaching the tolerance
    pub fn solve<F>(&self, f: F, f_prime: Option<&dyn Fn(f64) -> f64>, x0: f64) -> Result<f64>
    where
        F: Fn(f64) -> f64,
    {
        let mut xn = x0;

        for _ in 0..self.max_iterations {
            let fx = f(xn);
            if fx.abs() < self.max_error {
                return Ok(xn);
            }

            let derivative = match f_prime {
                Some(df) => df(xn),
                None => (f(xn + FINITE_DIFFERENCE_STEP) - fx) / FINITE_DIFFERENCE_STEP,
            };
            if derivative.abs() < MIN_DERIVATIVE {
                debug!(x = xn, derivative, "newton: derivative too small");
                return Err(DupireError::DerivativeTooSmall { x: xn, derivative });
            }

            xn -= fx / derivative;
        }

        debug!(
            iterations = self.max_iterations,
            last_x = xn,
            "newton: iteration budget exhausted"
        );
        Err(DupireError::DidNotConverge {
            iterations: self.max_iterations,
            last_x: xn,
        })
    }
}
