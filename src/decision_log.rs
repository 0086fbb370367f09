//! Append-only audit trail of rebalance decisions with plain-language explanations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{RegimeLabel, WeightVector};

/// Rendered in place of any value that was not available for a decision.
pub const MISSING_PLACEHOLDER: &str = "n/a";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub summary: String,
    pub what_we_did: String,
    pub why_it_matters: String,
    pub regime_in_plain_english: String,
}

/// Raw fields of one decision, supplied by the allocation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionInput {
    pub step: usize,
    pub date: NaiveDate,
    pub regime: RegimeLabel,
    pub portfolio_volatility: Option<f64>,
    pub drawdown: Option<f64>,
    pub action: String,
    pub rationale: String,
    pub base_weights: WeightVector,
    pub adjusted_weights: WeightVector,
    pub risk_reduced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub step: usize,
    pub date: NaiveDate,
    pub regime: RegimeLabel,
    pub portfolio_volatility: Option<f64>,
    pub drawdown: Option<f64>,
    pub action: String,
    pub rationale: String,
    pub base_weights: WeightVector,
    pub adjusted_weights: WeightVector,
    pub risk_reduced: bool,
    pub explanation: Explanation,
}

impl DecisionLogEntry {
    /// One-line form used by session snapshots.
    pub fn headline(&self) -> String {
        format!("{} {} | {}", self.date, self.regime, self.action)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionRecorder {
    entries: Vec<DecisionLogEntry>,
}

impl DecisionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, input: DecisionInput) -> &DecisionLogEntry {
        let explanation = explain(&input);
        self.entries.push(DecisionLogEntry {
            timestamp: Utc::now(),
            step: input.step,
            date: input.date,
            regime: input.regime,
            portfolio_volatility: input.portfolio_volatility,
            drawdown: input.drawdown,
            action: input.action,
            rationale: input.rationale,
            base_weights: input.base_weights,
            adjusted_weights: input.adjusted_weights,
            risk_reduced: input.risk_reduced,
            explanation,
        });
        let idx = self.entries.len() - 1;
        &self.entries[idx]
    }

    /// Most recent `limit` entries in chronological order, or all of them.
    pub fn get_logs(&self, limit: Option<usize>) -> Vec<DecisionLogEntry> {
        let start = match limit {
            Some(n) => self.entries.len().saturating_sub(n),
            None => 0,
        };
        self.entries[start..].to_vec()
    }

    pub fn latest(&self) -> Option<&DecisionLogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn regime_in_plain_english(regime: RegimeLabel) -> &'static str {
    match regime {
        RegimeLabel::TrendingUp => "the market is in an upward trend, with prices generally rising",
        RegimeLabel::TrendingDown => "the market is in a downward trend, with prices generally falling",
        RegimeLabel::HighVol => "the market is swinging sharply in both directions",
        RegimeLabel::Crash => "the market is falling hard from its recent highs",
    }
}

fn regime_rationale(regime: RegimeLabel) -> &'static str {
    match regime {
        RegimeLabel::TrendingUp => {
            "In a rising market the portfolio leans toward the growth asset while keeping a share in safer holdings."
        }
        RegimeLabel::TrendingDown => {
            "In a falling market the portfolio shifts toward the defensive asset to soften losses."
        }
        RegimeLabel::HighVol => {
            "In a choppy market the portfolio spreads money evenly so no single swing dominates."
        }
        RegimeLabel::Crash => {
            "In a sharp sell-off the portfolio moves most of its money into the defensive asset to protect capital."
        }
    }
}

const RISK_REDUCED_NOTE: &str =
    "Exposure was also cut to keep the portfolio inside its risk limits.";

fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.1}%", v * 100.0),
        _ => MISSING_PLACEHOLDER.to_string(),
    }
}

fn explain(input: &DecisionInput) -> Explanation {
    let regime_text = regime_in_plain_english(input.regime).to_string();

    let parts: Vec<String> = input
        .adjusted_weights
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(t, w)| format!("{}: {:.0}%", t, w * 100.0))
        .collect();
    let what_we_did = if parts.is_empty() {
        "The portfolio was moved entirely to cash.".to_string()
    } else {
        let cash = 1.0 - input.adjusted_weights.sum();
        if cash > 1e-6 {
            format!(
                "The portfolio was set to {}, with {:.0}% left in cash.",
                parts.join(", "),
                cash * 100.0
            )
        } else {
            format!("The portfolio was set to {}.", parts.join(", "))
        }
    };

    let mut why = regime_rationale(input.regime).to_string();
    if input.risk_reduced {
        why.push(' ');
        why.push_str(RISK_REDUCED_NOTE);
    }
    why.push_str(&format!(
        " Estimated annual volatility: {}. Drawdown from peak: {}.",
        format_pct(input.portfolio_volatility),
        format_pct(input.drawdown)
    ));

    Explanation {
        summary: format!("On {} {}. {} {}", input.date, regime_text, what_we_did, why),
        what_we_did,
        why_it_matters: why,
        regime_in_plain_english: regime_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(risk_reduced: bool, vol: Option<f64>) -> DecisionInput {
        let tickers = vec!["SPY".to_string(), "TLT".to_string()];
        DecisionInput {
            step: 21,
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            regime: RegimeLabel::Crash,
            portfolio_volatility: vol,
            drawdown: None,
            action: "Allocation updated".to_string(),
            rationale: "Regime: CRASH".to_string(),
            base_weights: WeightVector::from_parts(tickers.clone(), vec![0.2, 0.8]),
            adjusted_weights: WeightVector::from_parts(tickers, vec![0.04, 0.16]),
            risk_reduced,
        }
    }

    #[test]
    fn missing_values_render_placeholder() {
        let e = explain(&input(false, None));
        assert!(e.why_it_matters.contains("volatility: n/a"));
        assert!(e.why_it_matters.contains("peak: n/a"));
        assert!(!e.why_it_matters.contains(RISK_REDUCED_NOTE));
    }

    #[test]
    fn risk_reduced_adds_modifier_and_cash_share() {
        let e = explain(&input(true, Some(0.123)));
        assert!(e.why_it_matters.contains(RISK_REDUCED_NOTE));
        assert!(e.why_it_matters.contains("12.3%"));
        assert!(e.what_we_did.contains("80% left in cash"));
    }
}
