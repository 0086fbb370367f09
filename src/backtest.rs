use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::allocation::AllocationPolicy;
use crate::config::EngineSettings;
use crate::data::{MarketData, MarketDataSource};
use crate::decision_log::DecisionLogEntry;
use crate::error::{AppError, Result};
use crate::metrics::{compute_metrics, CorrelationMatrix, PerformanceMetrics};
use crate::model::RegimeLabel;
use crate::pipeline::RegimePipeline;
use crate::regime::RegimeClassifier;
use crate::risk_overlay::RiskOverlay;
use crate::simulation::{SimulationEngine, SimulationResult};
use crate::stress::{ScenarioKind, StressScenario, StressScenarioGenerator, StressWindow};

#[derive(Debug, Clone, Serialize)]
pub struct BacktestRun {
    pub with_risk: bool,
    pub result: SimulationResult,
    pub metrics: Option<PerformanceMetrics>,
    pub decisions: Vec<DecisionLogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub with_risk: SimulationResult,
    pub without_risk: SimulationResult,
    pub metrics_with_risk: Option<PerformanceMetrics>,
    pub metrics_without_risk: Option<PerformanceMetrics>,
    pub correlation: CorrelationMatrix,
    pub decisions: Vec<DecisionLogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    pub scenario: String,
    pub metrics: Option<PerformanceMetrics>,
    pub equity: SimulationResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkForwardFold {
    pub fold: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub metrics_with_risk: Option<PerformanceMetrics>,
    pub metrics_without_risk: Option<PerformanceMetrics>,
}

/// Loaded market data plus its regime sequence, ready for repeated runs.
#[derive(Debug, Clone)]
pub struct PortfolioEngine {
    settings: EngineSettings,
    data: Arc<MarketData>,
    regimes: Arc<[RegimeLabel]>,
}

impl PortfolioEngine {
    pub fn prepare(settings: EngineSettings, source: &dyn MarketDataSource) -> Result<Self> {
        settings.validate()?;
        let data = source.load()?;
        Self::from_data(settings, data)
    }

    pub fn from_data(settings: EngineSettings, data: MarketData) -> Result<Self> {
        settings.validate()?;
        if data.is_empty() {
            return Err(AppError::data_unavailable("market data has no steps"));
        }
        let classifier = classifier_for(&settings);
        let regimes: Arc<[RegimeLabel]> = classifier.classify(&data.features).into();
        Ok(Self {
            settings,
            data: Arc::new(data),
            regimes,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn data(&self) -> &Arc<MarketData> {
        &self.data
    }

    pub fn regimes(&self) -> &Arc<[RegimeLabel]> {
        &self.regimes
    }

    pub fn build_pipeline(&self, with_risk: bool) -> Result<RegimePipeline> {
        self.pipeline_for(Arc::clone(&self.data), Arc::clone(&self.regimes), with_risk)
    }

    fn pipeline_for(
        &self,
        data: Arc<MarketData>,
        regimes: Arc<[RegimeLabel]>,
        with_risk: bool,
    ) -> Result<RegimePipeline> {
        let policy = AllocationPolicy::new(data.tickers().to_vec(), self.settings.allocation_mode)?;
        let overlay = if with_risk && self.settings.overlay.enabled {
            RiskOverlay::new(self.settings.overlay.clone())
        } else {
            RiskOverlay::disabled(self.settings.overlay.clone())
        };
        RegimePipeline::new(data, regimes, policy, overlay)
    }

    fn simulate(&self, mut pipeline: RegimePipeline, with_risk: bool) -> Result<BacktestRun> {
        let engine = SimulationEngine::new(self.settings.simulation)?;
        let data = Arc::clone(pipeline.data());
        let result = engine.run(&data.returns, &mut pipeline);
        let metrics = compute_metrics(&result.dates, &result.values, self.settings.risk_free_rate);
        Ok(BacktestRun {
            with_risk,
            result,
            metrics,
            decisions: pipeline.into_decisions().get_logs(None),
        })
    }

    pub fn run_backtest(&self, with_risk: bool) -> Result<BacktestRun> {
        let pipeline = self.build_pipeline(with_risk)?;
        self.simulate(pipeline, with_risk)
    }

    /// Two runs over identical inputs, differing only in the risk overlay.
    pub fn run_comparison(&self) -> Result<ComparisonResult> {
        let with = self.run_backtest(true)?;
        let without = self.run_backtest(false)?;
        tracing::info!(
            final_with_risk = with.result.final_value().unwrap_or_default(),
            final_without_risk = without.result.final_value().unwrap_or_default(),
            "Backtest comparison completed"
        );
        Ok(ComparisonResult {
            with_risk: with.result,
            without_risk: without.result,
            metrics_with_risk: with.metrics,
            metrics_without_risk: without.metrics,
            correlation: CorrelationMatrix::from_returns(&self.data.returns),
            decisions: with.decisions,
        })
    }

    /// Scenario from the configured defaults, optionally overriding its length.
    pub fn stress_generator(
        &self,
        kind: ScenarioKind,
        days: Option<usize>,
        at_end: bool,
    ) -> StressScenarioGenerator {
        let cfg = &self.settings.stress;
        let (scenario, default_days) = match kind {
            ScenarioKind::Shock => (
                StressScenario::FlatShock {
                    daily_return: cfg.shock_return,
                },
                cfg.shock_days,
            ),
            ScenarioKind::Volatility => (
                StressScenario::VolatilityMultiplier {
                    factor: cfg.vol_multiplier,
                },
                cfg.vol_days,
            ),
            ScenarioKind::Correlation => (StressScenario::CorrelationCollapse, cfg.correlation_days),
        };
        let n = days.unwrap_or(default_days);
        let window = if at_end {
            StressWindow::Last(n)
        } else {
            StressWindow::First(n)
        };
        StressScenarioGenerator::new(scenario, window)
    }

    /// Backtest with risk controls over a stressed copy of the returns.
    /// Regimes and features stay as classified on the original data.
    pub fn run_stress_test(&self, generator: &StressScenarioGenerator) -> Result<StressTestResult> {
        let stressed = generator.stress_returns(&self.data.returns);
        let data = Arc::new(self.data.with_returns(stressed)?);
        let pipeline = self.pipeline_for(data, Arc::clone(&self.regimes), true)?;
        let run = self.simulate(pipeline, true)?;
        let scenario = generator.describe();
        tracing::info!(
            scenario = %scenario,
            final_value = run.result.final_value().unwrap_or_default(),
            "Stress test completed"
        );
        Ok(StressTestResult {
            scenario,
            metrics: run.metrics,
            equity: run.result,
        })
    }

    /// Rolling train/test splits advancing by the test window. The classifier
    /// is fitted on each train window only and applied to the following test
    /// window, which is then backtested with and without risk controls.
    pub fn walk_forward(&self) -> Result<Vec<WalkForwardFold>> {
        let train = self.settings.train_window;
        let test = self.settings.test_window;
        let n = self.data.len();
        let classifier = classifier_for(&self.settings);
        let mut folds = Vec::new();

        let mut start = 0;
        while start + train + test <= n {
            let test_start = start + train;
            let test_end = test_start + test;

            let fitted = classifier.fit(&self.data.features.slice(start, test_start).aggregates());
            let test_data = Arc::new(self.data.slice(test_start, test_end));
            let regimes: Arc<[RegimeLabel]> =
                fitted.predict(&test_data.features.aggregates()).into();

            let with = self.simulate(
                self.pipeline_for(Arc::clone(&test_data), Arc::clone(&regimes), true)?,
                true,
            )?;
            let without = self.simulate(self.pipeline_for(test_data, regimes, false)?, false)?;

            let dates = self.data.returns.dates();
            folds.push(WalkForwardFold {
                fold: folds.len(),
                train_start: dates[start],
                train_end: dates[test_start - 1],
                test_start: dates[test_start],
                test_end: dates[test_end - 1],
                metrics_with_risk: with.metrics,
                metrics_without_risk: without.metrics,
            });
            start += test;
        }

        if folds.is_empty() {
            tracing::warn!(
                steps = n,
                train_window = train,
                test_window = test,
                "Not enough data for a walk-forward fold"
            );
        } else {
            tracing::info!(folds = folds.len(), "Walk-forward evaluation completed");
        }
        Ok(folds)
    }
}

fn classifier_for(settings: &EngineSettings) -> RegimeClassifier {
    RegimeClassifier::new(settings.thresholds, settings.regime_method, settings.seed)
}
