//! Numerical building blocks shared by the surface, the pricers and the calibrator.

pub mod gaussian;
pub mod newton;

pub use gaussian::{normal_cdf, normal_pdf, NormalSampler, StdNormalSampler};
pub use newton::NewtonSolver;

/// Finite-difference step used by the Newton solver (when no derivative is supplied)
/// and by the Dupire local-volatility transform.
pub const FINITE_DIFFERENCE_STEP: f64 = 1e-6;
