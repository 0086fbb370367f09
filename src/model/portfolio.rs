use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::regime::RegimeLabel;
use crate::model::weights::WeightVector;
use crate::risk_overlay::RiskTier;

/// Stable taxonomy for declined cash operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReasonCode {
    CashNonPositiveAmount,
    CashInsufficient,
    SessionNotStarted,
}

impl DeclineReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CashNonPositiveAmount => "cash.non_positive_amount",
            Self::CashInsufficient => "cash.insufficient",
            Self::SessionNotStarted => "session.not_started",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashDecision {
    /// `true` if the operation was applied to the portfolio.
    pub approved: bool,
    /// Cash balance after the operation (unchanged when declined).
    pub cash: f64,
    /// Portfolio value after the operation (unchanged when declined).
    pub value: f64,
    /// Machine-readable reason code when declined.
    pub reason_code: Option<String>,
    /// Human-readable reason when declined.
    pub reason: Option<String>,
}

impl CashDecision {
    fn applied(cash: f64, value: f64) -> Self {
        Self {
            approved: true,
            cash,
            value,
            reason_code: None,
            reason: None,
        }
    }

    pub(crate) fn declined(code: DeclineReasonCode, reason: String, cash: f64, value: f64) -> Self {
        Self {
            approved: false,
            cash,
            value,
            reason_code: Some(code.as_str().to_string()),
            reason: Some(reason),
        }
    }
}

/// Result of applying target weights to the live portfolio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceFill {
    pub turnover: f64,
    pub cost: f64,
}

/// Live portfolio owned by a real-time session.
///
/// Positions are notional holdings per ticker; `value` is always
/// `cash + sum(positions)`.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    pub initial_capital: f64,
    pub value: f64,
    pub cash: f64,
    pub positions: BTreeMap<String, f64>,
    pub current_regime: Option<RegimeLabel>,
    pub risk_tier: RiskTier,
    pub value_history: Vec<f64>,
    pub date_history: Vec<NaiveDate>,
    held_weights: Option<WeightVector>,
}

impl PortfolioState {
    pub fn new(initial_capital: f64, risk_tier: RiskTier) -> Self {
        Self {
            initial_capital,
            value: initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            current_regime: None,
            risk_tier,
            value_history: Vec::new(),
            date_history: Vec::new(),
            held_weights: None,
        }
    }

    pub fn held_weights(&self) -> Option<&WeightVector> {
        self.held_weights.as_ref()
    }

    /// Reallocate the whole portfolio value onto `target`, charging
    /// `cost_rate * turnover` of value against cash.
    pub fn rebalance(&mut self, target: &WeightVector, cost_rate: f64) -> RebalanceFill {
        let turnover = target.turnover(self.held_weights.as_ref());
        let total = self.value;
        let cost = total * cost_rate * turnover;

        self.positions = target
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(t, w)| (t.to_string(), total * w))
            .collect();
        let invested: f64 = self.positions.values().sum();
        self.cash = total - invested - cost;
        self.value = total - cost;
        self.held_weights = Some(target.clone());

        RebalanceFill { turnover, cost }
    }

    /// Grow each holding by its realized return; non-finite returns count as 0.
    pub fn mark_to_market(&mut self, tickers: &[String], returns: &[f64]) {
        for (ticker, r) in tickers.iter().zip(returns.iter()) {
            if let Some(holding) = self.positions.get_mut(ticker) {
                let r = if r.is_finite() { *r } else { 0.0 };
                *holding *= 1.0 + r;
            }
        }
        self.value = self.cash + self.positions.values().sum::<f64>();
    }

    pub fn record(&mut self, date: NaiveDate) {
        self.value_history.push(self.value);
        self.date_history.push(date);
    }

    pub fn deposit(&mut self, amount: f64) -> CashDecision {
        if !amount.is_finite() || amount <= 0.0 {
            return CashDecision::declined(
                DeclineReasonCode::CashNonPositiveAmount,
                format!("Deposit amount must be positive (got {})", amount),
                self.cash,
                self.value,
            );
        }
        self.cash += amount;
        self.value += amount;
        CashDecision::applied(self.cash, self.value)
    }

    pub fn withdraw(&mut self, amount: f64) -> CashDecision {
        if !amount.is_finite() || amount <= 0.0 {
            return CashDecision::declined(
                DeclineReasonCode::CashNonPositiveAmount,
                format!("Withdrawal amount must be positive (got {})", amount),
                self.cash,
                self.value,
            );
        }
        if amount > self.cash {
            return CashDecision::declined(
                DeclineReasonCode::CashInsufficient,
                format!(
                    "Insufficient cash: need {:.2}, have {:.2}",
                    amount, self.cash
                ),
                self.cash,
                self.value,
            );
        }
        self.cash -= amount;
        self.value -= amount;
        CashDecision::applied(self.cash, self.value)
    }

    /// Fraction of value held in each ticker. Before the first allocation the
    /// portfolio is all cash and the map is empty.
    pub fn allocation_fractions(&self) -> BTreeMap<String, f64> {
        if self.value <= 0.0 {
            return BTreeMap::new();
        }
        self.positions
            .iter()
            .map(|(t, v)| (t.clone(), v / self.value))
            .collect()
    }
}
