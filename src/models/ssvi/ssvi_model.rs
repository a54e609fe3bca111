// src/models/ssvi/ssvi_model.rs

//! Surface SVI (SSVI) total-variance model and its Dupire local volatility
//!
//! The SSVI surface gives the implied total variance at maturity `t` and
//! log-moneyness `k` as
//!
//! w(t, k) = θ/2 · (1 + ρφk + sqrt((φk + ρ)² + (1 - ρ)²))
//!
//! with the ATM term structure and skew function
//!
//! θ(t) = α² (e^{β² t} - 1)
//! φ(θ) = η / (θ^γ (1 + θ)^{1-γ})
//!
//! Parameters:
//! - α, β: level and growth of the ATM total variance
//! - γ: decay of the skew with θ, must lie in (0, 1)
//! - η: skew scale, must be > 0
//! - ρ: skew asymmetry
//!
//! Local volatility is derived from `w` by finite differences (Dupire's formula in
//! total-variance form); see [`SsviSurface::local_vol`].

use crate::error::{DupireError, Result};
use crate::math::FINITE_DIFFERENCE_STEP;
use crate::models::traits::{LocalVolatility, SurfaceModel};

/// Number of SSVI parameters, in the order `alpha, beta, gamma, eta, rho`.
pub const NUM_MODEL_PARAMS: usize = 5;

/// Below this `|dw/dk|` the local volatility falls back to the calendar derivative.
const ATM_SLOPE_THRESHOLD: f64 = 1e-6;

/// Helper function to validate SSVI parameters.
fn validate_ssvi_params(alpha: f64, beta: f64, gamma: f64, eta: f64, rho: f64) -> Result<()> {
    for (name, value) in [
        ("alpha", alpha),
        ("beta", beta),
        ("gamma", gamma),
        ("eta", eta),
        ("rho", rho),
    ] {
        if !value.is_finite() {
            return Err(DupireError::parameter_range(format!(
                "parameter {name} ({name}={value}) must be finite"
            )));
        }
    }
    check_skew_params(eta, gamma)
}

fn check_skew_params(eta: f64, gamma: f64) -> Result<()> {
    if eta <= 0.0 || gamma <= 0.0 || gamma >= 1.0 || eta.is_nan() || gamma.is_nan() {
        return Err(DupireError::parameter_range(format!(
            "must have eta > 0 and 0 < gamma < 1 (eta={eta}, gamma={gamma})"
        )));
    }
    Ok(())
}

/// SSVI skew function `φ(θ) = η / (θ^γ (1 + θ)^{1-γ})`.
///
/// # Errors
/// [`DupireError::InvalidParameterRange`] unless `eta > 0` and `0 < gamma < 1`.
pub fn phi(theta: f64, eta: f64, gamma: f64) -> Result<f64> {
    check_skew_params(eta, gamma)?;
    Ok(phi_unchecked(theta, eta, gamma))
}

#[inline]
fn phi_unchecked(theta: f64, eta: f64, gamma: f64) -> f64 {
    eta / (theta.powf(gamma) * (1.0 + theta).powf(1.0 - gamma))
}

/// Validated SSVI parameter set. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsviParams {
    alpha: f64,
    beta: f64,
    gamma: f64,
    eta: f64,
    rho: f64,
}

impl SsviParams {
    /// Creates new SSVI parameters with validation.
    pub fn new(alpha: f64, beta: f64, gamma: f64, eta: f64, rho: f64) -> Result<Self> {
        validate_ssvi_params(alpha, beta, gamma, eta, rho)?;
        Ok(Self {
            alpha,
            beta,
            gamma,
            eta,
            rho,
        })
    }

    /// Builds parameters from `[alpha, beta, gamma, eta, rho]`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [alpha, beta, gamma, eta, rho] => Self::new(*alpha, *beta, *gamma, *eta, *rho),
            _ => Err(DupireError::parameter_range(format!(
                "expected {NUM_MODEL_PARAMS} SSVI parameters, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_array(&self) -> [f64; NUM_MODEL_PARAMS] {
        [self.alpha, self.beta, self.gamma, self.eta, self.rho]
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }
}

impl TryFrom<&[f64]> for SsviParams {
    type Error = DupireError;

    fn try_from(values: &[f64]) -> Result<Self> {
        Self::from_slice(values)
    }
}

/// The SSVI implied total-variance surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsviSurface {
    params: SsviParams,
}

impl SsviSurface {
    pub fn new(params: SsviParams) -> Self {
        Self { params }
    }

    /// Builds a surface from `[alpha, beta, gamma, eta, rho]`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        SsviParams::from_slice(values).map(Self::new)
    }

    pub fn params(&self) -> &SsviParams {
        &self.params
    }

    /// ATM total variance `θ(t) = α² (e^{β² t} - 1)`.
    pub fn theta(&self, t: f64) -> f64 {
        let p = &self.params;
        p.alpha * p.alpha * ((p.beta * p.beta * t).exp() - 1.0)
    }

    /// Skew function at ATM total variance `theta`.
    pub fn phi(&self, theta: f64) -> f64 {
        phi_unchecked(theta, self.params.eta, self.params.gamma)
    }

    /// Total implied variance `w(t, k)`.
    pub fn omega(&self, t: f64, k: f64) -> f64 {
        let rho = self.params.rho;
        let theta = self.theta(t);
        let phi = self.phi(theta);
        let skew = phi * k + rho;
        theta / 2.0 * (1.0 + rho * phi * k + (skew * skew + (1.0 - rho) * (1.0 - rho)).sqrt())
    }

    /// Black-Scholes implied volatility `sqrt(w(t, k) / t)`.
    pub fn implied_vol(&self, t: f64, k: f64) -> f64 {
        (self.omega(t, k) / t).sqrt()
    }

    /// Dupire local volatility at maturity `t` and log-moneyness `k`.
    ///
    /// All derivatives are one-sided finite differences with step `h = 1e-6`:
    /// - `t <= 0` returns 0 (no volatility at the origin, where `φ` is unbounded).
    /// - If `|∂w/∂k| < 1e-6` only the calendar derivative is used:
    ///   `sqrt(∂w/∂t)`.
    /// - Otherwise `sqrt(∂w/∂t / g)` with
    ///   `g = (1 - k w_k / (2w))² - (w_k² / 4)(1/4 + 1/w) + w_kk / 2`.
    ///
    /// The result is a low-order numerical approximation and may be NaN where `g`
    /// or the calendar slope is negative.
    pub fn local_vol(&self, t: f64, k: f64) -> f64 {
        const H: f64 = FINITE_DIFFERENCE_STEP;

        if t <= 0.0 {
            return 0.0;
        }

        let w = self.omega(t, k);
        let w_kh = self.omega(t, k + H);
        let dw_dt = (self.omega(t + H, k) - w) / H;
        let dw_dk = (w_kh - w) / H;

        if dw_dk.abs() < ATM_SLOPE_THRESHOLD {
            return dw_dt.sqrt();
        }

        let d2w_dk2 = (self.omega(t, k + 2.0 * H) - 2.0 * w_kh + w) / (H * H);
        let slope_term = 1.0 - k * dw_dk / (2.0 * w);
        let g = slope_term * slope_term - (dw_dk * dw_dk / 4.0) * (0.25 + 1.0 / w)
            + d2w_dk2 / 2.0;

        (dw_dt / g).sqrt()
    }

    /// Local volatility at asset price `price` and time `t` for spot `spot0` and rate
    /// `r`, using `k = ln(price e^{-rt} / spot0)`.
    pub fn local_vol_at_price(&self, spot0: f64, r: f64, price: f64, t: f64) -> f64 {
        let k = (price * (-r * t).exp() / spot0).ln();
        self.local_vol(t, k)
    }
}

impl From<SsviParams> for SsviSurface {
    fn from(params: SsviParams) -> Self {
        Self::new(params)
    }
}

impl SurfaceModel for SsviSurface {
    type Parameters = SsviParams;

    fn parameters(&self) -> &Self::Parameters {
        &self.params
    }

    fn total_variance(&self, t: f64, k: f64) -> f64 {
        self.omega(t, k)
    }
}

impl LocalVolatility for SsviSurface {
    fn local_vol(&self, t: f64, k: f64) -> f64 {
        SsviSurface::local_vol(self, t, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    // alpha = sqrt(0.1), beta = 1, gamma = 0.7, eta = 0.2, rho = 0.3
    fn create_test_surface() -> SsviSurface {
        SsviSurface::from_slice(&[0.1_f64.sqrt(), 1.0, 0.7, 0.2, 0.3]).unwrap()
    }

    #[test]
    fn test_ssvi_params_validation() {
        assert!(SsviParams::new(0.3, 1.0, 0.7, 0.2, 0.3).is_ok());

        let invalid = [
            (0.3, 1.0, 0.7, 0.0, 0.3),  // eta = 0
            (0.3, 1.0, 0.7, -0.1, 0.3), // eta < 0
            (0.3, 1.0, 0.0, 0.2, 0.3),  // gamma = 0
            (0.3, 1.0, 1.0, 0.2, 0.3),  // gamma = 1
            (0.3, 1.0, 1.5, 0.2, 0.3),  // gamma > 1
            (f64::NAN, 1.0, 0.7, 0.2, 0.3),
            (0.3, 1.0, 0.7, 0.2, f64::INFINITY),
        ];
        for (alpha, beta, gamma, eta, rho) in invalid {
            assert!(matches!(
                SsviParams::new(alpha, beta, gamma, eta, rho),
                Err(DupireError::InvalidParameterRange { .. })
            ));
        }

        assert!(SsviSurface::from_slice(&[0.3, 1.0, 0.7]).is_err());
    }

    #[test]
    fn test_phi_validation() {
        assert!(phi(0.1, 0.2, 0.7).is_ok());
        assert!(matches!(
            phi(0.1, 0.0, 0.7),
            Err(DupireError::InvalidParameterRange { .. })
        ));
        assert!(matches!(
            phi(0.1, 0.2, 1.0),
            Err(DupireError::InvalidParameterRange { .. })
        ));
    }

    #[test]
    fn test_parameter_order_round_trips() {
        let values = [0.3, 1.1, 0.6, 0.4, -0.2];
        let params = SsviParams::try_from(&values[..]).unwrap();
        assert_eq!(params.to_array(), values);
        assert_eq!(params.gamma(), 0.6);
        assert_eq!(params.eta(), 0.4);
        assert_eq!(params.rho(), -0.2);
    }

    #[test]
    fn test_theta_and_omega() {
        let surface = create_test_surface();
        let t = 1.0;
        let theta = surface.theta(t);
        assert_relative_eq!(theta, 0.1 * (1.0_f64.exp() - 1.0), max_relative = 1e-12);

        let rho: f64 = 0.3;
        let expected_atm = theta / 2.0 * (1.0 + (rho * rho + (1.0 - rho) * (1.0 - rho)).sqrt());
        assert_relative_eq!(surface.omega(t, 0.0), expected_atm, max_relative = 1e-12);

        let k = 0.2;
        let phi = surface.phi(theta);
        let expected = theta / 2.0
            * (1.0 + rho * phi * k + ((phi * k + rho).powi(2) + (1.0 - rho).powi(2)).sqrt());
        assert_relative_eq!(surface.omega(t, k), expected, max_relative = 1e-12);
        assert_relative_eq!(
            surface.implied_vol(t, k),
            (expected / t).sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_local_vol_vanishes_at_time_zero() {
        let surface = create_test_surface();
        for &k in &[-1.0, -0.1, 0.0, 0.05, 2.0] {
            assert_eq!(surface.local_vol(0.0, k), 0.0);
        }
    }

    #[test]
    fn test_local_vol_matches_analytic_dupire() {
        let surface = create_test_surface();
        let (alpha2, beta2, gamma, rho) = (0.1_f64, 1.0_f64, 0.7_f64, 0.3_f64);

        for &(t, k) in &[(1.0_f64, 0.1_f64), (0.5, -0.2), (2.0, 0.3)] {
            let theta = alpha2 * ((beta2 * t).exp() - 1.0);
            let dtheta = alpha2 * beta2 * (beta2 * t).exp();
            let phi = surface.phi(theta);
            let dphi = phi * (-gamma / theta + (gamma - 1.0) / (1.0 + theta));
            let r = ((phi * k + rho).powi(2) + (1.0 - rho).powi(2)).sqrt();

            let w = theta / 2.0 * (1.0 + rho * phi * k + r);
            let w_k = theta / 2.0 * (rho * phi + phi * (phi * k + rho) / r);
            let w_kk = theta / 2.0 * phi * phi * (1.0 - rho).powi(2) / r.powi(3);
            let w_t = dtheta / 2.0 * (1.0 + rho * phi * k + r)
                + theta / 2.0 * (rho * k + k * (phi * k + rho) / r) * dphi * dtheta;
            let g = (1.0 - k * w_k / (2.0 * w)).powi(2) - w_k * w_k / 4.0 * (0.25 + 1.0 / w)
                + w_kk / 2.0;
            let expected = (w_t / g).sqrt();

            assert_relative_eq!(surface.local_vol(t, k), expected, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_local_vol_flat_slope_uses_calendar_derivative() {
        // With rho = 0 the surface is symmetric in k, so dw/dk vanishes at the money
        // and w(t, 0) = theta(t).
        let surface = SsviSurface::from_slice(&[0.2, 0.8, 0.5, 0.5, 0.0]).unwrap();
        let t = 1.5_f64;
        let dtheta = 0.04 * 0.64 * (0.64 * t).exp();
        assert_abs_diff_eq!(surface.local_vol(t, 0.0), dtheta.sqrt(), epsilon = 1e-4);
    }

    #[test]
    fn test_local_vol_at_price_uses_discounted_moneyness() {
        let surface = create_test_surface();
        let (s0, r, t) = (100.0_f64, 0.025_f64, 0.75_f64);
        let price = 110.0;
        let k = (price * (-r * t).exp() / s0).ln();
        assert_eq!(
            surface.local_vol_at_price(s0, r, price, t),
            surface.local_vol(t, k)
        );
    }
}
