use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineSettings;
use crate::data::MarketData;
use crate::decision_log::DecisionLogEntry;
use crate::error::{AppError, Result};
use crate::model::{CashDecision, DeclineReasonCode, PortfolioState, RegimeLabel};
use crate::pipeline::RegimePipeline;
use crate::risk_overlay::RiskTier;
use crate::runtime::event::SessionEvent;
use crate::simulation::RebalanceSchedule;

/// Read-only view of a session, taken between ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub session_id: String,
    pub value: f64,
    pub cash: f64,
    pub current_regime: Option<RegimeLabel>,
    pub risk_tier: RiskTier,
    pub allocations: BTreeMap<String, f64>,
    pub value_history: Vec<f64>,
    pub date_history: Vec<NaiveDate>,
    pub recent_decisions: Vec<DecisionLogEntry>,
    pub running: bool,
    pub step: usize,
    pub total_steps: usize,
}

struct SessionState {
    portfolio: PortfolioState,
    pipeline: RegimePipeline,
    /// Next step to replay.
    step: usize,
    running: bool,
    started: bool,
    /// Bumped on every start so a worker from an earlier run exits.
    generation: u64,
}

struct SessionCore {
    id: String,
    data: Arc<MarketData>,
    schedule: RebalanceSchedule,
    cost_rate: f64,
    tick_interval: Duration,
    log_tail: usize,
    events: Option<mpsc::Sender<SessionEvent>>,
    state: Mutex<SessionState>,
}

impl SessionCore {
    fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|_| AppError::StateUnavailable("session state"))
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    fn total_steps(&self) -> usize {
        self.data.len()
    }

    /// Replay one step. Returns `false` once the series is exhausted.
    fn tick(&self, state: &mut SessionState) -> bool {
        state.started = true;
        if state.step == 0 {
            state.portfolio.record(self.data.returns.date(0));
            state.step = 1;
        }
        let step = state.step;
        if step >= self.total_steps() {
            return false;
        }

        let regime = state.pipeline.regime_at(step);
        if self
            .schedule
            .is_due(step, state.portfolio.held_weights().is_some())
        {
            let weights = state.pipeline.decide(step, &state.portfolio.value_history);
            let fill = state.portfolio.rebalance(&weights, self.cost_rate);
            self.emit(SessionEvent::Rebalanced {
                session_id: self.id.clone(),
                step,
                regime,
                turnover: fill.turnover,
                cost: fill.cost,
            });
        }

        let date = self.data.returns.date(step);
        state.portfolio.current_regime = Some(regime);
        state
            .portfolio
            .mark_to_market(self.data.returns.tickers(), self.data.returns.row(step));
        state.portfolio.record(date);
        state.step += 1;

        self.emit(SessionEvent::Ticked {
            session_id: self.id.clone(),
            step,
            date,
            value: state.portfolio.value,
            regime,
        });
        true
    }

    fn complete(&self, state: &mut SessionState) {
        state.running = false;
        tracing::info!(
            session_id = %self.id,
            final_value = state.portfolio.value,
            "Real-time session completed"
        );
        self.emit(SessionEvent::Completed {
            session_id: self.id.clone(),
            final_value: state.portfolio.value,
        });
    }
}

/// Accelerated replay of the allocation pipeline against one live portfolio.
///
/// All reads and writes go through a single lock; a tick runs entirely under
/// it, so cash operations and snapshots always land between ticks.
pub struct RealtimeSession {
    core: Arc<SessionCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeSession {
    pub fn new(id: impl Into<String>, pipeline: RegimePipeline, settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        let data = Arc::clone(pipeline.data());
        if data.is_empty() {
            return Err(AppError::data_unavailable("session has no steps to replay"));
        }
        let mut pipeline = pipeline;
        pipeline
            .overlay_mut()
            .set_params(settings.risk_tier.params());
        Ok(Self {
            core: Arc::new(SessionCore {
                id: id.into(),
                data,
                schedule: RebalanceSchedule::new(settings.simulation.rebalance_frequency),
                cost_rate: settings.simulation.transaction_cost,
                tick_interval: settings.realtime.tick_interval,
                log_tail: settings.realtime.log_tail,
                events: None,
                state: Mutex::new(SessionState {
                    portfolio: PortfolioState::new(settings.simulation.initial_capital, settings.risk_tier),
                    pipeline,
                    step: 0,
                    running: false,
                    started: false,
                    generation: 0,
                }),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Route progress events to `tx`. Must be set before the first start.
    pub fn with_events(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        if let Some(core) = Arc::get_mut(&mut self.core) {
            core.events = Some(tx);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.core.lock()?.running)
    }

    /// Spawn the tick worker. Returns `false` without side effects when the
    /// session is already running or has replayed every step. Fails, also
    /// without side effects, when called outside a Tokio runtime.
    pub fn start(&self) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let generation = {
            let mut state = self.core.lock()?;
            if state.running {
                return Ok(false);
            }
            if state.step >= self.core.total_steps() {
                tracing::warn!(session_id = %self.core.id, "Session already finished; start ignored");
                return Ok(false);
            }
            state.running = true;
            state.started = true;
            state.generation += 1;
            self.core.emit(SessionEvent::Started {
                session_id: self.core.id.clone(),
                step: state.step,
            });
            state.generation
        };

        let core = Arc::clone(&self.core);
        let handle = runtime.spawn(run_worker(core, generation));
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| AppError::StateUnavailable("session worker"))?;
        *worker = Some(handle);
        tracing::info!(
            session_id = %self.core.id,
            tick_ms = self.core.tick_interval.as_millis() as u64,
            "Real-time session started"
        );
        Ok(true)
    }

    /// Request termination at the next tick boundary. Returns `false` when
    /// the session was not running.
    pub fn stop(&self) -> Result<bool> {
        let mut state = self.core.lock()?;
        if !state.running {
            return Ok(false);
        }
        state.running = false;
        tracing::info!(session_id = %self.core.id, step = state.step, "Real-time session stopped");
        self.core.emit(SessionEvent::Stopped {
            session_id: self.core.id.clone(),
            step: state.step,
        });
        Ok(true)
    }

    /// Replay a single step on the caller's thread. Returns `false` once
    /// every step has been replayed, or while the worker owns the replay.
    pub fn advance(&self) -> Result<bool> {
        let mut state = self.core.lock()?;
        if state.running {
            tracing::warn!(session_id = %self.core.id, step = state.step, "Session running; advance ignored");
            return Ok(false);
        }
        Ok(self.core.tick(&mut state))
    }

    pub fn snapshot(&self) -> Result<PortfolioSnapshot> {
        let state = self.core.lock()?;
        Ok(PortfolioSnapshot {
            session_id: self.core.id.clone(),
            value: state.portfolio.value,
            cash: state.portfolio.cash,
            current_regime: state.portfolio.current_regime,
            risk_tier: state.portfolio.risk_tier,
            allocations: state.portfolio.allocation_fractions(),
            value_history: state.portfolio.value_history.clone(),
            date_history: state.portfolio.date_history.clone(),
            recent_decisions: state.pipeline.decisions().get_logs(Some(self.core.log_tail)),
            running: state.running,
            step: state.step,
            total_steps: self.core.total_steps(),
        })
    }

    pub fn deposit(&self, amount: f64) -> Result<CashDecision> {
        self.cash_operation(amount, |p| p.deposit(amount))
    }

    /// Declined, not applied, when `amount` exceeds available cash.
    pub fn withdraw(&self, amount: f64) -> Result<CashDecision> {
        self.cash_operation(-amount, |p| p.withdraw(amount))
    }

    /// `signed_amount` is negative for withdrawals and only used for reporting.
    fn cash_operation(
        &self,
        signed_amount: f64,
        op: impl FnOnce(&mut PortfolioState) -> CashDecision,
    ) -> Result<CashDecision> {
        let mut state = self.core.lock()?;
        let decision = if !state.started {
            CashDecision::declined(
                DeclineReasonCode::SessionNotStarted,
                "Session has not started".to_string(),
                state.portfolio.cash,
                state.portfolio.value,
            )
        } else {
            op(&mut state.portfolio)
        };

        if decision.approved {
            self.core.emit(SessionEvent::CashApplied {
                session_id: self.core.id.clone(),
                amount: signed_amount,
                cash: decision.cash,
            });
        } else {
            let code = decision.reason_code.clone().unwrap_or_default();
            tracing::warn!(
                session_id = %self.core.id,
                amount = signed_amount,
                reason_code = %code,
                "Cash operation declined"
            );
            self.core.emit(SessionEvent::CashDeclined {
                session_id: self.core.id.clone(),
                amount: signed_amount,
                reason_code: code,
            });
        }
        Ok(decision)
    }

    /// Swap overlay parameters; the next rebalance uses the new tier.
    pub fn set_risk_tier(&self, tier: RiskTier) -> Result<()> {
        let mut state = self.core.lock()?;
        state.pipeline.overlay_mut().set_params(tier.params());
        state.portfolio.risk_tier = tier;
        tracing::info!(session_id = %self.core.id, tier = %tier, "Risk tier changed");
        self.core.emit(SessionEvent::RiskTierChanged {
            session_id: self.core.id.clone(),
            tier,
        });
        Ok(())
    }

    /// Wait for the current worker, if any, to exit.
    pub async fn join(&self) -> Result<()> {
        let handle = self
            .worker
            .lock()
            .map_err(|_| AppError::StateUnavailable("session worker"))?
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(session_id = %self.core.id, error = %e, "Session worker failed");
            }
        }
        Ok(())
    }
}

async fn run_worker(core: Arc<SessionCore>, generation: u64) {
    loop {
        {
            let mut state = match core.lock() {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!(session_id = %core.id, error = %e, "Session worker exiting");
                    return;
                }
            };
            if !state.running || state.generation != generation {
                return;
            }
            if !core.tick(&mut state) {
                core.complete(&mut state);
                return;
            }
        }
        tokio::time::sleep(core.tick_interval).await;
    }
}
