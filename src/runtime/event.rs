use chrono::NaiveDate;
use serde::Serialize;

use crate::model::RegimeLabel;
use crate::risk_overlay::RiskTier;

/// Progress notifications from a real-time session. Delivery is best effort:
/// events are dropped when the receiver falls behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: String,
        step: usize,
    },
    Ticked {
        session_id: String,
        step: usize,
        date: NaiveDate,
        value: f64,
        regime: RegimeLabel,
    },
    Rebalanced {
        session_id: String,
        step: usize,
        regime: RegimeLabel,
        turnover: f64,
        cost: f64,
    },
    CashApplied {
        session_id: String,
        amount: f64,
        cash: f64,
    },
    CashDeclined {
        session_id: String,
        amount: f64,
        reason_code: String,
    },
    RiskTierChanged {
        session_id: String,
        tier: RiskTier,
    },
    Stopped {
        session_id: String,
        step: usize,
    },
    Completed {
        session_id: String,
        final_value: f64,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Started { session_id, .. }
            | Self::Ticked { session_id, .. }
            | Self::Rebalanced { session_id, .. }
            | Self::CashApplied { session_id, .. }
            | Self::CashDeclined { session_id, .. }
            | Self::RiskTierChanged { session_id, .. }
            | Self::Stopped { session_id, .. }
            | Self::Completed { session_id, .. } => session_id,
        }
    }
}
