
use approx::assert_relative_eq;
use dupire_lib::{
    calibrate_ssvi, price_with_ssvi, CalibrationOutcome, DupireError, FixedParameters,
    SsviCalibrator, SsviSurface,
};
use test_utils::{
    create_test_config, fixture_market, fixture_params, load_fixture_quotes, load_quotes,
};

#[test]
fn test_fixture_loading() {
    let data = load_quotes("tests/data/ssvi_quotes.csv").expect("Failed to load test data");
    assert_eq!(data.len(), 36);

    let maturities: Vec<f64> = data.iter().map(|q| q.quote.maturity).collect();
    assert!(maturities.contains(&0.25));
    assert!(maturities.contains(&2.0));
    for q in &data {
        assert!(q.quote.parsed_type().is_ok(), "bad label {}", q.quote.option_type);
        assert!(q.quote.observed_price > 0.0);
    }
}

/// Fixture prices were generated from known parameters, so pricing with those parameters
/// must reproduce them.
#[test]
fn test_generating_parameters_reprice_fixture() {
    let quotes = load_fixture_quotes();
    let results = price_with_ssvi(fixture_params(), &quotes, fixture_market()).unwrap();
    assert_eq!(results.len(), quotes.len());

    for pair in results.windows(2) {
        assert!(pair[0].strike <= pair[1].strike);
    }
    for result in &results {
        assert_relative_eq!(
            result.model_price,
            result.market_price,
            max_relative = 1e-6
        );
    }
}

#[test]
fn test_generating_parameters_have_zero_surface_error() {
    let mut calibrator = SsviCalibrator::new(fixture_market(), create_test_config());
    for quote in load_fixture_quotes() {
        calibrator.add_quote(quote);
    }
    let surface = SsviSurface::new(fixture_params());
    let mse = calibrator.mean_square_error_surface(&surface).unwrap();
    assert!(mse < 1e-10, "surface mse {mse}");
}

#[test]
fn test_atm_stage_improves_term_structure_fit() {
    let mut calibrator = SsviCalibrator::new(fixture_market(), create_test_config());
    for quote in load_fixture_quotes() {
        calibrator.add_quote(quote);
    }

    let initial_surface = calibrator.calibrated_surface().unwrap();
    let initial = calibrator.mean_square_error_atm(&initial_surface).unwrap();

    let report = calibrator.calibrate_atm().expect("ATM stage failed");
    println!(
        "ATM stage: {:?}, mse {:.3e} -> {:.3e}, params {:?}",
        report.outcome, initial, report.mean_square_error, report.params
    );

    assert_ne!(report.outcome, CalibrationOutcome::FailedOtherReason);
    assert!(report.mean_square_error < initial);
    assert_eq!(calibrator.atm_outcome(), report.outcome);

    let (status, mse) = calibrator.calibration_status_atm().unwrap();
    assert_eq!(status, report.outcome);
    assert_relative_eq!(mse, report.mean_square_error, max_relative = 1e-9);
}

#[test]
fn test_two_stage_calibration_fits_surface() {
    let quotes = load_fixture_quotes();
    let fixed = fixture_market();

    let mut before = SsviCalibrator::new(fixed, create_test_config());
    for quote in quotes.iter().cloned() {
        before.add_quote(quote);
    }
    let initial = before
        .mean_square_error_surface(&before.calibrated_surface().unwrap())
        .unwrap();

    let calibration = calibrate_ssvi(quotes, fixed, create_test_config()).expect("calibration");
    println!("ATM report: {:?}", calibration.atm);
    println!("wings report: {:?}", calibration.wings);

    assert_ne!(calibration.wings.outcome, CalibrationOutcome::FailedOtherReason);
    assert!(calibration.wings.mean_square_error < initial);

    // alpha and beta come from the ATM stage and are left alone by the wings stage
    assert_eq!(calibration.atm.params[..2], calibration.wings.params[..2]);
    assert_eq!(calibration.surface.params().to_array(), calibration.wings.params);
}

#[test]
fn test_empty_quotes_report_no_calibration_data() {
    let calibrator = SsviCalibrator::new(FixedParameters::default(), create_test_config());
    let surface = SsviSurface::new(fixture_params());
    assert_eq!(
        calibrator.mean_square_error_atm(&surface),
        Err(DupireError::NoCalibrationData)
    );
    assert_eq!(
        calibrator.calibration_status(),
        Err(DupireError::NoCalibrationData)
    );
}

#[test]
fn test_unrecognized_option_type() {
    let mut calibrator = SsviCalibrator::new(fixture_market(), create_test_config());
    for quote in load_fixture_quotes() {
        calibrator.add_quote(quote);
    }
    calibrator.add_observed_option(1.0, 100.0, 10.0, "X");

    let surface = SsviSurface::new(fixture_params());
    assert_eq!(
        calibrator.mean_square_error_surface(&surface),
        Err(DupireError::UnrecognizedOptionType("X".into()))
    );
    assert_eq!(
        calibrator.calibrate_atm(),
        Err(DupireError::UnrecognizedOptionType("X".into()))
    );
    assert_eq!(calibrator.atm_outcome(), CalibrationOutcome::NotStarted);
}
