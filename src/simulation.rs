use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::model::{ReturnSeries, WeightVector};

/// Produces fresh target weights at a rebalance step.
///
/// `equity_history` holds the portfolio values for steps `0..step`, so an
/// implementation can never observe the outcome of the step it allocates for.
pub trait AllocationStrategy {
    fn compute(&mut self, step: usize, equity_history: &[f64]) -> WeightVector;
}

impl<F> AllocationStrategy for F
where
    F: FnMut(usize, &[f64]) -> WeightVector,
{
    fn compute(&mut self, step: usize, equity_history: &[f64]) -> WeightVector {
        self(step, equity_history)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub initial_capital: f64,
    pub rebalance_frequency: usize,
    /// Cost rate per unit of turnover.
    pub transaction_cost: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            rebalance_frequency: 21,
            transaction_cost: 0.0005,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(AppError::invalid_config(format!(
                "initial_capital must be positive (got {})",
                self.initial_capital
            )));
        }
        if self.rebalance_frequency == 0 {
            return Err(AppError::invalid_config("rebalance_frequency must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.transaction_cost) {
            return Err(AppError::invalid_config(format!(
                "transaction_cost must be in [0, 1) (got {})",
                self.transaction_cost
            )));
        }
        Ok(())
    }
}

/// Rebalance cadence shared by the batch engine and the real-time session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceSchedule {
    frequency: usize,
}

impl RebalanceSchedule {
    pub fn new(frequency: usize) -> Self {
        Self {
            frequency: frequency.max(1),
        }
    }

    pub fn frequency(&self) -> usize {
        self.frequency
    }

    /// Step 0 never rebalances; afterwards a step is due on the cadence or
    /// whenever nothing is held yet.
    pub fn is_due(&self, step: usize, has_weights: bool) -> bool {
        step >= 1 && (step % self.frequency == 0 || !has_weights)
    }
}

/// Weighted sum of one step's asset returns. Undefined returns contribute 0.
pub fn daily_return(weights: &WeightVector, tickers: &[String], row: &[f64]) -> f64 {
    weights
        .aligned_to(tickers)
        .iter()
        .zip(row.iter())
        .map(|(w, r)| if r.is_finite() { w * r } else { 0.0 })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceEvent {
    pub step: usize,
    pub date: NaiveDate,
    pub weights: WeightVector,
    pub turnover: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub rebalances: Vec<RebalanceEvent>,
}

impl SimulationResult {
    pub fn final_value(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

/// Step-by-step backtest loop over a return series.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    params: SimulationParams,
    schedule: RebalanceSchedule,
}

impl SimulationEngine {
    pub fn new(params: SimulationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            schedule: RebalanceSchedule::new(params.rebalance_frequency),
            params,
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn schedule(&self) -> RebalanceSchedule {
        self.schedule
    }

    pub fn run<S>(&self, returns: &ReturnSeries, strategy: &mut S) -> SimulationResult
    where
        S: AllocationStrategy + ?Sized,
    {
        let n = returns.len();
        if n == 0 {
            return SimulationResult {
                dates: Vec::new(),
                values: Vec::new(),
                rebalances: Vec::new(),
            };
        }

        let tickers = returns.tickers();
        let mut values = Vec::with_capacity(n);
        values.push(self.params.initial_capital);
        let mut held: Option<WeightVector> = None;
        let mut rebalances = Vec::new();

        for step in 1..n {
            let mut cost = 0.0;
            if self.schedule.is_due(step, held.is_some()) {
                let weights = strategy.compute(step, &values[..step]);
                let turnover = weights.turnover(held.as_ref());
                cost = self.params.transaction_cost * turnover;
                rebalances.push(RebalanceEvent {
                    step,
                    date: returns.date(step),
                    weights: weights.clone(),
                    turnover,
                    cost,
                });
                held = Some(weights);
            }

            let r = held
                .as_ref()
                .map(|w| daily_return(w, tickers, returns.row(step)))
                .unwrap_or(0.0);
            let prev = values[step - 1];
            values.push(prev * (1.0 + r - cost));
        }

        tracing::info!(
            steps = n,
            rebalances = rebalances.len(),
            final_value = values.last().copied().unwrap_or_default(),
            "Simulation completed"
        );

        SimulationResult {
            dates: returns.dates().to_vec(),
            values,
            rebalances,
        }
    }
}
