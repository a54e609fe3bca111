// demos/pricing_demo.rs

//! Demonstration of SSVI calibration and local-volatility Monte Carlo pricing
//!
//! This example shows how to:
//! 1. Build a set of observed option prices
//! 2. Calibrate the SSVI surface in two stages
//! 3. Compare model and market prices
//! 4. Price exotic payoffs under the calibrated Dupire local volatility

use anyhow::{Context, Result};
use dupire_lib::{
    calibrate_ssvi, default_configs,
    models::bs::{bs_price, log_moneyness},
    price_with_ssvi, ExecutionMode, FixedParameters, MarketQuote, MonteCarloPricer, OptionType,
};

fn main() -> Result<()> {
    println!("SSVI Calibration and Local-Vol Pricing Demo");
    println!("===========================================");

    let fixed = FixedParameters {
        r: 0.025,
        spot: 100.0,
    };
    let quotes = create_demo_quotes(&fixed);

    println!("Quotes loaded: {} options", quotes.len());
    println!("Spot: {:.2}, rate: {:.2}%", fixed.spot, fixed.r * 100.0);

    println!("\nStep 1: Calibrating SSVI surface...");
    let calibration = calibrate_ssvi(quotes.clone(), fixed, default_configs::fast())
        .context("SSVI calibration failed")?;

    let params = calibration.surface.params();
    println!(
        "  ATM stage:   {:?}, mse {:.3e}",
        calibration.atm.outcome, calibration.atm.mean_square_error
    );
    println!(
        "  Wings stage: {:?}, mse {:.3e}",
        calibration.wings.outcome, calibration.wings.mean_square_error
    );
    println!("  SSVI parameters:");
    println!("    alpha: {:.6}", params.alpha());
    println!("    beta:  {:.6}", params.beta());
    println!("    gamma: {:.6}", params.gamma());
    println!("    eta:   {:.6}", params.eta());
    println!("    rho:   {:.6}", params.rho());

    println!("\nStep 2: Repricing quotes with the calibrated surface...");
    let pricing_results = price_with_ssvi(*params, &quotes, fixed)?;
    println!(
        "{:<6} {:<8} {:<8} {:<12} {:<12} {:<10}",
        "Type", "T", "Strike", "Market", "Model", "Model IV"
    );
    println!("{}", "-".repeat(60));
    for result in pricing_results.iter().take(12) {
        println!(
            "{:<6} {:<8.2} {:<8.0} {:<12.4} {:<12.4} {:<10.4}",
            result.option_type,
            result.maturity,
            result.strike,
            result.market_price,
            result.model_price,
            result.model_iv
        );
    }
    let rmse = (pricing_results
        .iter()
        .map(|r| (r.model_price - r.market_price).powi(2))
        .sum::<f64>()
        / pricing_results.len() as f64)
        .sqrt();
    println!("  Price RMSE: {rmse:.6}");

    println!("\nStep 3: Monte Carlo pricing under local volatility...");
    let pricer = MonteCarloPricer::new(calibration.surface, fixed.r, 10_000, 128)
        .with_mode(ExecutionMode::Parallel)
        .with_seed(42);
    let (spot, strike, maturity) = (fixed.spot, 102.0, 1.0);

    let european = pricer.european_put(spot, strike, maturity)?;
    let monthly: Vec<f64> = (1..=12).map(|i| i as f64 / 12.0).collect();
    let asian = pricer.asian_put(spot, strike, &monthly, maturity)?;
    let lookback = pricer.lookback(spot, maturity)?;
    let down_in = pricer.barrier_put(spot, strike, maturity, "D", "I", 85.0)?;
    let down_out = pricer.barrier_put(spot, strike, maturity, "D", "O", 85.0)?;

    println!("  European put K={strike}: {european:.4}");
    println!("  Asian put (monthly):     {asian:.4}");
    println!("  Lookback:                {lookback:.4}");
    println!("  Down-and-in put B=85:    {down_in:.4}");
    println!("  Down-and-out put B=85:   {down_out:.4}");
    println!("  In + out - European:     {:.2e}", down_in + down_out - european);

    Ok(())
}

/// Synthetic quotes priced from a skewed volatility smile over four maturities
fn create_demo_quotes(fixed: &FixedParameters) -> Vec<MarketQuote> {
    let mut quotes = Vec::new();
    for &maturity in &[0.25, 0.5, 1.0, 2.0] {
        for &strike in &[80.0, 90.0, 95.0, 100.0, 105.0, 110.0, 120.0] {
            let k = log_moneyness(strike, fixed.spot, fixed.r, maturity);
            let sigma = 0.22 - 0.15 * k + 0.3 * k * k;
            let option_type = if strike < fixed.spot {
                OptionType::Put
            } else {
                OptionType::Call
            };
            let price = bs_price(option_type, sigma, fixed.spot, k, fixed.r, maturity);
            quotes.push(MarketQuote::new(
                maturity,
                strike,
                option_type.to_string(),
                price,
            ));
        }
    }
    quotes
}
