// demos/default_configs.rs

//! Calibration presets and TOML configuration loading

use anyhow::Result;
use dupire_lib::{calibrate_ssvi, default_configs, CalibrationConfig, FixedParameters, MarketQuote};

const CUSTOM_CONFIG: &str = r#"
accuracy = 1e-7
max_iterations = 800
guess = [0.3, 0.8, 0.5, 0.5, 0.0]

[bounds]
rho = [-0.9, 0.9]

[implied_vol]
max_error = 1e-8
"#;

fn describe(name: &str, config: &CalibrationConfig) {
    println!("{name}:");
    println!("   Max iterations: {}", config.max_iterations);
    println!("   Tolerance: {:.1e}", config.accuracy);
    println!("   Max step: {}", config.max_step);
    match &config.global_search {
        Some(search) => println!(
            "   CMA-ES pre-search: {} generations, {} BIPOP restarts, budget {}",
            search.max_generations, search.bipop_restarts, search.total_evals_budget
        ),
        None => println!("   CMA-ES pre-search: off"),
    }
    println!();
}

fn main() -> Result<()> {
    println!("Dupire-lib Default Configuration Examples\n");

    describe("1. Fast Configuration (development)", &default_configs::fast());
    describe("2. Production Configuration", &default_configs::production());
    describe("3. Research Configuration (maximum accuracy)", &default_configs::research());
    describe("4. Minimal Configuration (quick validation)", &default_configs::minimal());

    let custom = CalibrationConfig::from_toml_str(CUSTOM_CONFIG)?;
    describe("5. Custom TOML Configuration", &custom);

    // Example calibration using the minimal config
    println!("Running example calibration with minimal config...");
    let quotes = vec![
        MarketQuote::new(0.25, 100.0, "call", 4.10),
        MarketQuote::new(0.5, 100.0, "call", 5.95),
        MarketQuote::new(1.0, 95.0, "put", 6.20),
        MarketQuote::new(1.0, 105.0, "call", 7.30),
    ];
    let fixed = FixedParameters {
        r: 0.02,
        spot: 100.0,
    };

    match calibrate_ssvi(quotes, fixed, default_configs::minimal()) {
        Ok(calibration) => {
            println!("   ATM stage:   {:?}", calibration.atm.outcome);
            println!("   Wings stage: {:?}", calibration.wings.outcome);
            println!("   Parameters:  {:?}", calibration.surface.params().to_array());
        }
        Err(e) => println!("   Calibration failed: {e}"),
    }

    Ok(())
}
