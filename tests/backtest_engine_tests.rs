use std::time::Duration;

use chrono::{Days, NaiveDate};
use regime_allocator::backtest::PortfolioEngine;
use regime_allocator::config::{EngineSettings, RealtimeSettings};
use regime_allocator::data::{JsonFileSource, MarketData};
use regime_allocator::error::AppError;
use regime_allocator::model::{FeatureSet, RegimeLabel, ReturnSeries};
use regime_allocator::regime::RegimeMethod;
use regime_allocator::stress::{ScenarioKind, StressScenario, StressWindow};

fn settings() -> EngineSettings {
    EngineSettings {
        regime_method: RegimeMethod::RuleBased,
        train_window: 40,
        test_window: 20,
        realtime: RealtimeSettings {
            tick_interval: Duration::from_millis(1),
            log_tail: 10,
        },
        ..EngineSettings::default()
    }
}

/// Two assets, calm gains for 60 days, then a 40-day slide on both.
fn crash_data() -> MarketData {
    let n = 100;
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let dates = (0..n).map(|i| start + Days::new(i as u64)).collect();
    let rows = (0..n)
        .map(|i| if i < 60 { vec![0.001, 0.0005] } else { vec![-0.03, -0.03] })
        .collect();
    let returns = ReturnSeries::new(vec!["SPY".to_string(), "TLT".to_string()], dates, rows).unwrap();
    let features = FeatureSet::new(
        vec![vec![0.1, 0.05]; n],
        vec![vec![0.0, 0.0]; n],
        vec![vec![1.0, 1.0]; n],
        vec![Vec::new(); n],
    )
    .unwrap();
    MarketData::new(returns, features).unwrap()
}

fn engine() -> PortfolioEngine {
    PortfolioEngine::from_data(settings(), crash_data()).unwrap()
}

#[test]
/// Verifies empty input is rejected before any run.
fn empty_data_is_unavailable() {
    let returns = ReturnSeries::new(vec!["SPY".to_string()], Vec::new(), Vec::new()).unwrap();
    let features = FeatureSet::new(Vec::new(), Vec::new(), Vec::new(), Vec::new()).unwrap();
    let data = MarketData::new(returns, features).unwrap();
    assert!(matches!(
        PortfolioEngine::from_data(settings(), data),
        Err(AppError::DataUnavailable(_))
    ));
    assert!(matches!(
        PortfolioEngine::prepare(settings(), &JsonFileSource::new("/nonexistent/data.json")),
        Err(AppError::DataUnavailable(_))
    ));
}

#[test]
/// Verifies the comparison: both runs share dates and rebalance steps, and
/// the risk overlay limits the drawdown of the slide.
fn comparison_shows_risk_overlay_benefit() {
    let engine = engine();
    assert!(engine.regimes().iter().all(|r| *r == RegimeLabel::TrendingUp));

    let cmp = engine.run_comparison().unwrap();
    assert_eq!(cmp.with_risk.dates, cmp.without_risk.dates);
    let steps = |r: &regime_allocator::simulation::SimulationResult| {
        r.rebalances.iter().map(|e| e.step).collect::<Vec<_>>()
    };
    assert_eq!(steps(&cmp.with_risk), vec![1, 21, 42, 63, 84]);
    assert_eq!(steps(&cmp.with_risk), steps(&cmp.without_risk));

    let with = cmp.metrics_with_risk.unwrap();
    let without = cmp.metrics_without_risk.unwrap();
    assert!(with.max_drawdown > without.max_drawdown);
    assert!(cmp.with_risk.final_value() > cmp.without_risk.final_value());

    assert_eq!(cmp.decisions.len(), 5);
    assert!(cmp
        .decisions
        .iter()
        .any(|d| d.action == "Cut exposure (drawdown floor)" && d.risk_reduced));
    assert_eq!(cmp.correlation.labels, vec!["SPY", "TLT"]);
}

#[test]
/// Verifies determinism of the full comparison.
fn comparison_is_deterministic() {
    let engine = engine();
    let a = engine.run_comparison().unwrap();
    let b = engine.run_comparison().unwrap();
    assert_eq!(a.with_risk, b.with_risk);
    assert_eq!(a.without_risk, b.without_risk);
    assert_eq!(a.metrics_with_risk, b.metrics_with_risk);
}

#[test]
/// Verifies a stress run hurts performance without touching the loaded data.
fn stress_run_leaves_original_data_untouched() {
    let engine = engine();
    let before = engine.data().returns.clone();
    let baseline = engine.run_backtest(true).unwrap();

    let generator = engine.stress_generator(ScenarioKind::Shock, None, false);
    assert_eq!(generator.scenario, StressScenario::FlatShock { daily_return: -0.05 });
    assert_eq!(generator.window, StressWindow::First(5));

    let stressed = engine.run_stress_test(&generator).unwrap();
    assert!(stressed.scenario.contains("shock"));
    assert!(stressed.equity.values[4] < baseline.result.values[4] * 0.85);
    assert_eq!(stressed.equity.dates, baseline.result.dates);
    assert_eq!(engine.data().returns, before);
}

#[test]
/// Verifies generator defaults come from settings and can be overridden.
fn stress_generator_uses_settings() {
    let engine = engine();
    let vol = engine.stress_generator(ScenarioKind::Volatility, None, true);
    assert_eq!(vol.scenario, StressScenario::VolatilityMultiplier { factor: 3.0 });
    assert_eq!(vol.window, StressWindow::Last(10));

    let corr = engine.stress_generator(ScenarioKind::Correlation, Some(3), false);
    assert_eq!(corr.scenario, StressScenario::CorrelationCollapse);
    assert_eq!(corr.window, StressWindow::First(3));
}

#[test]
/// Verifies walk-forward folds advance by the test window over the series.
fn walk_forward_folds_cover_series() {
    let engine = engine();
    let folds = engine.walk_forward().unwrap();
    assert_eq!(folds.len(), 3);

    let dates = engine.data().returns.dates();
    assert_eq!(folds[0].train_start, dates[0]);
    assert_eq!(folds[0].train_end, dates[39]);
    assert_eq!(folds[0].test_start, dates[40]);
    assert_eq!(folds[0].test_end, dates[59]);
    assert_eq!(folds[2].test_end, dates[99]);
    assert!(folds.iter().all(|f| f.metrics_with_risk.is_some()));
    assert_eq!(folds.iter().map(|f| f.fold).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
/// Verifies walk-forward returns no folds when the series is too short.
fn walk_forward_without_enough_data() {
    let s = EngineSettings {
        train_window: 90,
        test_window: 20,
        ..settings()
    };
    let engine = PortfolioEngine::from_data(s, crash_data()).unwrap();
    assert!(engine.walk_forward().unwrap().is_empty());
}
