use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use regime_allocator::allocation::{AllocationMode, AllocationPolicy};
use regime_allocator::config::{EngineSettings, RealtimeSettings};
use regime_allocator::data::MarketData;
use regime_allocator::error::AppError;
use regime_allocator::model::{FeatureSet, RegimeLabel, ReturnSeries};
use regime_allocator::pipeline::RegimePipeline;
use regime_allocator::risk_overlay::{RiskOverlay, RiskOverlayConfig, RiskTier};
use regime_allocator::runtime::{RealtimeSession, SessionEvent};
use regime_allocator::simulation::SimulationEngine;
use tokio::sync::mpsc;

fn settings(cost: f64) -> EngineSettings {
    let mut s = EngineSettings {
        realtime: RealtimeSettings {
            tick_interval: Duration::from_millis(1),
            log_tail: 3,
        },
        ..EngineSettings::default()
    };
    s.simulation.initial_capital = 10_000.0;
    s.simulation.transaction_cost = cost;
    s
}

fn data(n: usize, same_returns: bool) -> Arc<MarketData> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let dates = (0..n).map(|i| start + Days::new(i as u64)).collect();
    let rows = (0..n)
        .map(|i| {
            let x = ((i * 7) % 5) as f64 / 1000.0 - 0.002;
            if same_returns {
                vec![x, x]
            } else {
                vec![x, 0.0003]
            }
        })
        .collect();
    let returns = ReturnSeries::new(vec!["SPY".to_string(), "TLT".to_string()], dates, rows).unwrap();
    let features = FeatureSet::new(
        vec![vec![0.1, 0.05]; n],
        vec![vec![0.0, 0.0]; n],
        (0..n)
            .map(|i| if i < n / 2 { vec![1.0, 1.0] } else { vec![0.0, 0.0] })
            .collect(),
        vec![Vec::new(); n],
    )
    .unwrap();
    Arc::new(MarketData::new(returns, features).unwrap())
}

fn pipeline(data: Arc<MarketData>, with_risk: bool) -> RegimePipeline {
    let regimes: Arc<[RegimeLabel]> = (0..data.len())
        .map(|i| if i < data.len() / 2 { RegimeLabel::TrendingUp } else { RegimeLabel::TrendingDown })
        .collect::<Vec<_>>()
        .into();
    let policy = AllocationPolicy::new(data.tickers().to_vec(), AllocationMode::RegimeTemplate).unwrap();
    let cfg = RiskOverlayConfig::for_tier(RiskTier::Medium);
    let overlay = if with_risk {
        RiskOverlay::new(cfg)
    } else {
        RiskOverlay::disabled(cfg)
    };
    RegimePipeline::new(data, regimes, policy, overlay).unwrap()
}

fn session(n: usize, cost: f64) -> RealtimeSession {
    RealtimeSession::new("rt-test", pipeline(data(n, false), true), &settings(cost)).unwrap()
}

#[test]
/// Verifies stepping by hand: each advance replays one step and the session
/// reports exhaustion after the last one.
fn advance_replays_every_step_once() {
    let s = session(30, 0.0005);
    let mut ticks = 0;
    while s.advance().unwrap() {
        ticks += 1;
    }
    assert_eq!(ticks, 29);
    let snap = s.snapshot().unwrap();
    assert_eq!(snap.step, 30);
    assert_eq!(snap.total_steps, 30);
    assert_eq!(snap.value_history.len(), 30);
    assert_eq!(snap.date_history.len(), 30);
    assert_eq!(snap.current_regime, Some(RegimeLabel::TrendingDown));
    assert!(!s.advance().unwrap());
}

#[test]
/// Verifies snapshot state: holdings and cash add up to value, and only the
/// configured tail of the decision log is returned.
fn snapshot_is_consistent_between_ticks() {
    let s = session(80, 0.0005);
    for _ in 0..70 {
        s.advance().unwrap();
    }
    let snap = s.snapshot().unwrap();
    let invested: f64 = snap.allocations.values().map(|f| f * snap.value).sum();
    assert!((invested + snap.cash - snap.value).abs() < 1e-6);
    assert_eq!(snap.recent_decisions.len(), 3);
    assert_eq!(snap.recent_decisions.last().map(|d| d.step), Some(63));
    assert_eq!(snap.risk_tier, RiskTier::Medium);
}

#[test]
/// Verifies parity with the batch engine: with no costs, no overlay and
/// identical asset returns, the replayed value path matches exactly.
fn replay_matches_batch_engine_without_drift() {
    let d = data(60, true);
    let cfg = settings(0.0);
    let s = RealtimeSession::new("rt-parity", pipeline(Arc::clone(&d), false), &cfg).unwrap();
    while s.advance().unwrap() {}

    let engine = SimulationEngine::new(cfg.simulation).unwrap();
    let mut batch_pipeline = pipeline(Arc::clone(&d), false);
    let batch = engine.run(&d.returns, &mut batch_pipeline);

    let live = s.snapshot().unwrap().value_history;
    assert_eq!(live.len(), batch.values.len());
    for (a, b) in live.iter().zip(batch.values.iter()) {
        assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
    }
}

#[test]
/// Verifies rebalance-step parity with costs: values agree on the first
/// rebalance, before holdings have drifted.
fn first_rebalance_matches_batch_engine() {
    let d = data(30, false);
    let cfg = settings(0.001);
    let s = RealtimeSession::new("rt-first", pipeline(Arc::clone(&d), true), &cfg).unwrap();
    s.advance().unwrap();

    let engine = SimulationEngine::new(cfg.simulation).unwrap();
    let mut batch_pipeline = pipeline(Arc::clone(&d), true);
    let batch = engine.run(&d.returns, &mut batch_pipeline);
    let live = s.snapshot().unwrap().value_history;
    assert!((live[1] - batch.values[1]).abs() < 1e-6);
}

#[test]
/// Verifies cash handling: operations before the first tick are declined,
/// over-withdrawals are declined without changing state, deposits apply.
fn cash_operations_follow_session_state() {
    let s = session(30, 0.0005);
    let early = s.deposit(100.0).unwrap();
    assert!(!early.approved);
    assert_eq!(early.reason_code.as_deref(), Some("session.not_started"));

    for _ in 0..5 {
        s.advance().unwrap();
    }
    let before = s.snapshot().unwrap();
    let declined = s.withdraw(before.cash + 1_000_000.0).unwrap();
    assert!(!declined.approved);
    assert_eq!(declined.reason_code.as_deref(), Some("cash.insufficient"));
    let after = s.snapshot().unwrap();
    assert_eq!(after.cash, before.cash);
    assert_eq!(after.value, before.value);

    let deposit = s.deposit(500.0).unwrap();
    assert!(deposit.approved);
    assert!((deposit.cash - (before.cash + 500.0)).abs() < 1e-9);
    assert!((s.snapshot().unwrap().value - (before.value + 500.0)).abs() < 1e-9);

    let negative = s.deposit(-5.0).unwrap();
    assert_eq!(negative.reason_code.as_deref(), Some("cash.non_positive_amount"));
}

#[test]
/// Verifies a tier change is reflected in snapshots and events.
fn risk_tier_change_is_recorded() {
    let (tx, mut rx) = mpsc::channel(16);
    let s = session(30, 0.0005).with_events(tx);
    s.set_risk_tier(RiskTier::High).unwrap();
    assert_eq!(s.snapshot().unwrap().risk_tier, RiskTier::High);
    match rx.try_recv().unwrap() {
        SessionEvent::RiskTierChanged { tier, session_id } => {
            assert_eq!(tier, RiskTier::High);
            assert_eq!(session_id, "rt-test");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
/// Verifies the worker replays to completion, emits a completion event and
/// ignores a second start once finished.
async fn worker_runs_to_completion() {
    let (tx, mut rx) = mpsc::channel(256);
    let s = session(25, 0.0005).with_events(tx);
    assert!(s.start().unwrap());
    assert!(!s.start().unwrap());

    let mut ticked = 0;
    let final_value = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SessionEvent::Ticked { .. } => ticked += 1,
            SessionEvent::Completed { final_value, .. } => break final_value,
            _ => {}
        }
    };
    s.join().await.unwrap();

    assert_eq!(ticked, 24);
    assert!(!s.is_running().unwrap());
    let snap = s.snapshot().unwrap();
    assert_eq!(snap.value, final_value);
    assert_eq!(snap.step, 25);
    assert!(!s.start().unwrap());
}

#[tokio::test]
/// Verifies stop halts the worker at a tick boundary and start resumes
/// from the same step.
async fn stop_then_resume() {
    let s = session(200, 0.0005);
    assert!(s.start().unwrap());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(s.stop().unwrap());
    assert!(!s.stop().unwrap());
    s.join().await.unwrap();

    let paused = s.snapshot().unwrap();
    assert!(!paused.running);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(s.snapshot().unwrap().step, paused.step);

    assert!(s.start().unwrap());
    tokio::time::sleep(Duration::from_millis(20)).await;
    s.stop().unwrap();
    s.join().await.unwrap();
    assert!(s.snapshot().unwrap().step >= paused.step);
}

#[test]
/// Verifies a start outside any async runtime is refused and leaves the
/// session startable once a runtime is available.
fn start_without_runtime_is_refused() {
    let s = session(50, 0.0);
    assert!(matches!(s.start(), Err(AppError::RuntimeUnavailable(_))));
    assert!(!s.is_running().unwrap());
    assert_eq!(s.snapshot().unwrap().step, 0);

    tokio_test::block_on(async {
        assert!(s.start().unwrap());
        assert!(s.is_running().unwrap());
        s.stop().unwrap();
        s.join().await.unwrap();
    });
}

#[tokio::test]
/// Verifies manual stepping is ignored while the worker owns the replay and
/// resumes once it stops.
async fn advance_is_ignored_while_running() {
    let s = session(200, 0.0);
    assert!(s.advance().unwrap());
    assert!(s.start().unwrap());
    let before = s.snapshot().unwrap().step;
    assert!(!s.advance().unwrap());
    assert_eq!(s.snapshot().unwrap().step, before);

    s.stop().unwrap();
    s.join().await.unwrap();
    let step = s.snapshot().unwrap().step;
    assert!(s.advance().unwrap());
    assert_eq!(s.snapshot().unwrap().step, step + 1);
}

#[test]
/// Verifies an empty series cannot back a session.
fn empty_series_is_rejected() {
    let returns = ReturnSeries::new(vec!["SPY".to_string(), "TLT".to_string()], Vec::new(), Vec::new()).unwrap();
    let features = FeatureSet::new(Vec::new(), Vec::new(), Vec::new(), Vec::new()).unwrap();
    let d = Arc::new(MarketData::new(returns, features).unwrap());
    assert!(RealtimeSession::new("rt-empty", pipeline(d, true), &settings(0.0)).is_err());
}

#[test]
/// Verifies synchronous use through tokio-test: a started session accepts
/// deposits immediately.
fn deposit_right_after_start_is_applied() {
    tokio_test::block_on(async {
        let s = session(500, 0.0);
        s.start().unwrap();
        let d = s.deposit(250.0).unwrap();
        assert!(d.approved);
        s.stop().unwrap();
        s.join().await.unwrap();
    });
}
