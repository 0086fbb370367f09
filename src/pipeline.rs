use std::sync::Arc;

use crate::allocation::{AllocationMode, AllocationPolicy, AllocationSignal};
use crate::data::MarketData;
use crate::decision_log::{DecisionInput, DecisionRecorder};
use crate::error::{AppError, Result};
use crate::model::{RegimeLabel, WeightVector};
use crate::risk_overlay::{trailing_covariance, OverlayContext, OverlayOutcome, RiskAction, RiskOverlay};
use crate::simulation::AllocationStrategy;

/// Allocation policy followed by the risk overlay, recording every decision.
///
/// Shared market data and the regime sequence are read-only; the pipeline
/// owns its policy, overlay and decision log.
#[derive(Debug, Clone)]
pub struct RegimePipeline {
    data: Arc<MarketData>,
    regimes: Arc<[RegimeLabel]>,
    policy: AllocationPolicy,
    overlay: RiskOverlay,
    recorder: DecisionRecorder,
}

impl RegimePipeline {
    pub fn new(
        data: Arc<MarketData>,
        regimes: Arc<[RegimeLabel]>,
        policy: AllocationPolicy,
        overlay: RiskOverlay,
    ) -> Result<Self> {
        if regimes.len() != data.len() {
            return Err(AppError::data_unavailable(format!(
                "regime sequence has {} labels, market data has {} steps",
                regimes.len(),
                data.len()
            )));
        }
        if policy.tickers() != data.tickers() {
            return Err(AppError::invalid_config(
                "allocation universe does not match the market data tickers",
            ));
        }
        Ok(Self {
            data,
            regimes,
            policy,
            overlay,
            recorder: DecisionRecorder::new(),
        })
    }

    pub fn regime_at(&self, step: usize) -> RegimeLabel {
        self.regimes[step]
    }

    pub fn regimes(&self) -> &[RegimeLabel] {
        &self.regimes
    }

    pub fn data(&self) -> &Arc<MarketData> {
        &self.data
    }

    pub fn overlay(&self) -> &RiskOverlay {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut RiskOverlay {
        &mut self.overlay
    }

    pub fn decisions(&self) -> &DecisionRecorder {
        &self.recorder
    }

    pub fn decisions_mut(&mut self) -> &mut DecisionRecorder {
        &mut self.recorder
    }

    pub fn into_decisions(self) -> DecisionRecorder {
        self.recorder
    }

    /// Target weights for `step` given the equity curve through `step - 1`.
    pub fn decide(&mut self, step: usize, equity_history: &[f64]) -> WeightVector {
        let regime = self.regime_at(step);
        let returns = &self.data.returns;

        let covariance = match self.policy.mode() {
            AllocationMode::RiskParity => {
                trailing_covariance(returns, step, self.overlay.config().vol_window)
            }
            _ => None,
        };
        let signal = match (self.policy.mode(), covariance.as_deref()) {
            (AllocationMode::RiskParity, Some(cov)) => AllocationSignal::Covariance(cov),
            (AllocationMode::Momentum, _) => self
                .data
                .features
                .momentum(step)
                .map(AllocationSignal::Momentum)
                .unwrap_or(AllocationSignal::None),
            _ => AllocationSignal::None,
        };

        let base = self.policy.target_weights(regime, signal);
        let ctx = OverlayContext {
            step,
            returns,
            equity_curve: equity_history,
        };
        let outcome = self.overlay.apply(&base, &ctx);
        let (action, rationale) = describe(regime, &outcome);

        let entry = self.recorder.record(DecisionInput {
            step,
            date: returns.date(step),
            regime,
            portfolio_volatility: outcome.portfolio_volatility,
            drawdown: outcome.drawdown,
            action,
            rationale,
            base_weights: base,
            adjusted_weights: outcome.weights.clone(),
            risk_reduced: outcome.risk_reduced(),
        });
        tracing::debug!(
            step,
            regime = %regime,
            action = %entry.action,
            exposure = entry.adjusted_weights.sum(),
            "Rebalance decision"
        );

        outcome.weights
    }
}

impl AllocationStrategy for RegimePipeline {
    fn compute(&mut self, step: usize, equity_history: &[f64]) -> WeightVector {
        self.decide(step, equity_history)
    }
}

fn describe(regime: RegimeLabel, outcome: &OverlayOutcome) -> (String, String) {
    let action = if outcome.actions.contains(&RiskAction::DrawdownFloor) {
        "Cut exposure (drawdown floor)"
    } else if outcome.actions.contains(&RiskAction::VolatilityTarget) {
        "Reduced exposure (vol targeting)"
    } else if outcome.actions.contains(&RiskAction::StopLoss) {
        "Exited losing assets (stop-loss)"
    } else {
        "Allocation updated"
    };

    let mut rationale = format!("Regime: {}", regime);
    for a in &outcome.actions {
        rationale.push_str("; ");
        rationale.push_str(a.as_str());
    }
    (action.to_string(), rationale)
}
