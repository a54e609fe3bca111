pub mod bs;
pub mod ssvi;

/// Common traits used by all surface models
pub mod traits {
    /// Implied total-variance surface `w(t, k)` in log-moneyness coordinates.
    pub trait SurfaceModel {
        type Parameters;

        fn parameters(&self) -> &Self::Parameters;

        /// Total implied variance `w(t, k) = sigma_BS(t, k)^2 * t`.
        fn total_variance(&self, t: f64, k: f64) -> f64;

        /// Black-Scholes implied volatility `sqrt(w(t, k) / t)`.
        fn implied_vol(&self, t: f64, k: f64) -> f64 {
            (self.total_variance(t, k) / t).sqrt()
        }
    }

    /// Instantaneous (local) volatility function `sigma(t, k)` driving the path simulator.
    pub trait LocalVolatility {
        fn local_vol(&self, t: f64, k: f64) -> f64;
    }
}

/// Utility functions for option pricing and calculations
pub mod utils {
    use crate::error::{DupireError, Result};
    use crate::models::bs::{bs_price, log_moneyness, OptionType};
    use crate::models::traits::SurfaceModel;

    /// Option pricing result
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct OptionPricingResult {
        pub price: f64,
        pub model_iv: f64,
    }

    /// Closed-form European price using the surface's implied volatility at the
    /// option's log-moneyness.
    pub fn price_option<T: SurfaceModel>(
        option_type: OptionType,
        strike: f64,
        spot: f64,
        r: f64,
        t: f64,
        model: &T,
    ) -> Result<OptionPricingResult> {
        if t <= 0.0 || spot <= 0.0 || strike <= 0.0 {
            return Err(DupireError::invalid_input(format!(
                "pricing requires t > 0, spot > 0 and strike > 0 (t={t}, spot={spot}, strike={strike})"
            )));
        }

        let k = log_moneyness(strike, spot, r, t);
        let total_var = model.total_variance(t, k);

        if !total_var.is_finite() || total_var <= 0.0 {
            return Err(DupireError::invalid_input(format!(
                "non-positive total variance {total_var} at t={t}, k={k}"
            )));
        }

        let model_iv = (total_var / t).sqrt();
        let price = bs_price(option_type, model_iv, spot, k, r, t);

        Ok(OptionPricingResult { price, model_iv })
    }
}
