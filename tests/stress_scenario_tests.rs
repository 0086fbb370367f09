use chrono::{Days, NaiveDate};
use regime_allocator::model::ReturnSeries;
use regime_allocator::stress::{StressScenario, StressScenarioGenerator, StressWindow};

fn series(rows: Vec<Vec<f64>>) -> ReturnSeries {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let dates = (0..rows.len())
        .map(|i| start + Days::new(i as u64))
        .collect();
    ReturnSeries::new(
        vec!["SPY".to_string(), "TLT".to_string(), "GLD".to_string()],
        dates,
        rows,
    )
    .unwrap()
}

fn sample() -> ReturnSeries {
    series(
        (0..12)
            .map(|i| {
                let x = i as f64 / 1000.0;
                vec![0.01 + x, -0.004 + x, 0.002 - x]
            })
            .collect(),
    )
}

#[test]
/// Verifies a zero-length window leaves the series exactly as it was.
fn zero_days_is_identity() {
    let base = sample();
    for scenario in [
        StressScenario::FlatShock { daily_return: -0.05 },
        StressScenario::VolatilityMultiplier { factor: 3.0 },
        StressScenario::CorrelationCollapse,
    ] {
        let g = StressScenarioGenerator::new(scenario, StressWindow::First(0));
        assert_eq!(g.stress_returns(&base), base);
    }
}

#[test]
/// Verifies a flat shock overwrites the window and leaves the rest alone,
/// without mutating the input.
fn flat_shock_overwrites_window_only() {
    let base = sample();
    let copy = base.clone();
    let g = StressScenarioGenerator::new(
        StressScenario::FlatShock { daily_return: -0.05 },
        StressWindow::First(5),
    );
    let stressed = g.stress_returns(&base);

    assert_eq!(base, copy);
    for step in 0..5 {
        assert!(stressed.row(step).iter().all(|r| *r == -0.05));
    }
    for step in 5..12 {
        assert_eq!(stressed.row(step), base.row(step));
    }
    assert_eq!(stressed.dates(), base.dates());
    assert_eq!(stressed.tickers(), base.tickers());
}

#[test]
/// Verifies the volatility multiplier scales existing returns in the window.
fn volatility_multiplier_scales_returns() {
    let base = sample();
    let g = StressScenarioGenerator::new(
        StressScenario::VolatilityMultiplier { factor: 3.0 },
        StressWindow::First(10),
    );
    let stressed = g.stress_returns(&base);
    for step in 0..10 {
        for (s, b) in stressed.row(step).iter().zip(base.row(step)) {
            assert!((s - 3.0 * b).abs() < 1e-15);
        }
    }
    assert_eq!(stressed.row(10), base.row(10));
}

#[test]
/// Verifies correlation collapse: every asset takes the day's mean return,
/// so the stressed window has perfectly correlated assets.
fn correlation_collapse_uses_cross_sectional_mean() {
    let base = sample();
    let g = StressScenarioGenerator::new(StressScenario::CorrelationCollapse, StressWindow::First(12));
    let stressed = g.stress_returns(&base);
    for step in 0..12 {
        let mean = base.row(step).iter().sum::<f64>() / 3.0;
        assert!(stressed.row(step).iter().all(|r| (r - mean).abs() < 1e-15));
    }
    let corr = stressed.correlation_matrix();
    assert!((corr[0][1] - 1.0).abs() < 1e-9);
}

#[test]
/// Verifies undefined returns are skipped when averaging a collapsed day.
fn correlation_collapse_ignores_undefined_values() {
    let base = series(vec![vec![0.02, f64::NAN, 0.04], vec![0.0, 0.0, 0.0]]);
    let g = StressScenarioGenerator::new(StressScenario::CorrelationCollapse, StressWindow::First(1));
    let stressed = g.stress_returns(&base);
    assert!(stressed.row(0).iter().all(|r| (r - 0.03).abs() < 1e-15));
}

#[test]
/// Verifies a trailing window perturbs only the final days and that a window
/// longer than the series covers all of it.
fn last_window_and_overlong_window() {
    let base = sample();
    let g = StressScenarioGenerator::new(
        StressScenario::FlatShock { daily_return: -0.1 },
        StressWindow::Last(3),
    );
    let stressed = g.stress_returns(&base);
    assert_eq!(stressed.row(8), base.row(8));
    assert!((9..12).all(|s| stressed.row(s).iter().all(|r| *r == -0.1)));

    let all = StressScenarioGenerator::new(
        StressScenario::FlatShock { daily_return: -0.1 },
        StressWindow::First(500),
    )
    .stress_returns(&base);
    assert!(all.rows().iter().flatten().all(|r| *r == -0.1));
}

#[test]
/// Verifies scenario descriptions name the window side and length.
fn descriptions_name_window() {
    let g = StressScenarioGenerator::new(
        StressScenario::FlatShock { daily_return: -0.05 },
        StressWindow::First(5),
    );
    assert_eq!(g.describe(), "-5.0% daily shock on every asset for the first 5 days");
    let g = StressScenarioGenerator::new(StressScenario::CorrelationCollapse, StressWindow::Last(10));
    assert!(g.describe().contains("last 10 days"));
}

#[test]
/// Verifies each scenario yields identical series on repeated runs, from the
/// same generator and from an equal one built separately.
fn stressed_series_are_deterministic() {
    let base = sample();
    for scenario in [
        StressScenario::FlatShock { daily_return: -0.05 },
        StressScenario::VolatilityMultiplier { factor: 3.0 },
        StressScenario::CorrelationCollapse,
    ] {
        for window in [StressWindow::First(5), StressWindow::Last(4)] {
            let g = StressScenarioGenerator::new(scenario, window);
            let first = g.stress_returns(&base);
            assert_eq!(g.stress_returns(&base), first);
            assert_eq!(StressScenarioGenerator::new(scenario, window).stress_returns(&base), first);
            assert_ne!(first, base);
        }
    }
}
