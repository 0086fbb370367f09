//! Regime-adaptive target weights over a fixed ticker universe.

use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::model::{RegimeLabel, WeightVector};

/// Floor applied to per-asset volatility before inversion.
pub const VOL_FLOOR: f64 = 1e-8;

const GROWTH_TILT: f64 = 0.7;
const DEFENSIVE_TILT_DOWN: f64 = 0.6;
const DEFENSIVE_TILT_CRASH: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// Fixed split per regime; first ticker is growth, second is defensive.
    RegimeTemplate,
    /// Inverse-volatility weights from a covariance diagonal.
    RiskParity,
    /// Weights proportional to positive momentum.
    Momentum,
    EqualWeight,
}

impl FromStr for AllocationMode {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regime" | "regime_template" => Ok(Self::RegimeTemplate),
            "risk_parity" | "inverse_vol" => Ok(Self::RiskParity),
            "momentum" => Ok(Self::Momentum),
            "equal" | "equal_weight" => Ok(Self::EqualWeight),
            other => Err(AppError::invalid_config(format!(
                "unknown allocation mode '{}', expected one of regime/risk_parity/momentum/equal",
                other
            ))),
        }
    }
}

/// Optional quantitative input for the non-template modes.
#[derive(Debug, Clone, Copy)]
pub enum AllocationSignal<'a> {
    None,
    Covariance(&'a [Vec<f64>]),
    Momentum(&'a [f64]),
}

#[derive(Debug, Clone)]
pub struct AllocationPolicy {
    tickers: Vec<String>,
    mode: AllocationMode,
}

impl AllocationPolicy {
    pub fn new(tickers: Vec<String>, mode: AllocationMode) -> Result<Self> {
        if tickers.is_empty() {
            return Err(AppError::invalid_config(
                "allocation universe must contain at least one ticker",
            ));
        }
        Ok(Self { tickers, mode })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    /// Target weights for `regime`. Quantitative modes use `signal` when it
    /// matches the mode and fall back to the regime template otherwise.
    pub fn target_weights(&self, regime: RegimeLabel, signal: AllocationSignal<'_>) -> WeightVector {
        if self.tickers.len() == 1 {
            return WeightVector::from_parts(self.tickers.clone(), vec![1.0]);
        }
        let raw = match (self.mode, signal) {
            (AllocationMode::RiskParity, AllocationSignal::Covariance(cov)) => {
                self.inverse_volatility(cov)
            }
            (AllocationMode::Momentum, AllocationSignal::Momentum(scores)) => {
                self.momentum_proportional(scores)
            }
            (AllocationMode::EqualWeight, _) => WeightVector::equal(&self.tickers),
            _ => self.regime_template(regime),
        };
        raw.normalized()
    }

    fn regime_template(&self, regime: RegimeLabel) -> WeightVector {
        let n = self.tickers.len();
        let rest = (n - 1) as f64;
        let weights = match regime {
            RegimeLabel::TrendingUp => (0..n)
                .map(|i| if i == 0 { GROWTH_TILT } else { (1.0 - GROWTH_TILT) / rest })
                .collect(),
            RegimeLabel::TrendingDown => defensive_split(n, DEFENSIVE_TILT_DOWN),
            RegimeLabel::Crash => defensive_split(n, DEFENSIVE_TILT_CRASH),
            RegimeLabel::HighVol => vec![1.0 / n as f64; n],
        };
        WeightVector::from_parts(self.tickers.clone(), weights)
    }

    fn inverse_volatility(&self, cov: &[Vec<f64>]) -> WeightVector {
        let inv: Vec<f64> = (0..self.tickers.len())
            .map(|i| {
                let var = cov.get(i).and_then(|row| row.get(i)).copied().unwrap_or(f64::NAN);
                let vol = var.sqrt();
                let vol = if vol.is_finite() && vol > 0.0 { vol } else { VOL_FLOOR };
                1.0 / vol
            })
            .collect();
        WeightVector::from_parts(self.tickers.clone(), inv)
    }

    fn momentum_proportional(&self, scores: &[f64]) -> WeightVector {
        let positive: Vec<f64> = (0..self.tickers.len())
            .map(|i| {
                let s = scores.get(i).copied().unwrap_or(0.0);
                if s.is_finite() {
                    s.max(0.0)
                } else {
                    0.0
                }
            })
            .collect();
        if positive.iter().sum::<f64>() <= 0.0 {
            tracing::debug!("No positive momentum; falling back to equal weight");
            return WeightVector::equal(&self.tickers);
        }
        WeightVector::from_parts(self.tickers.clone(), positive)
    }
}

fn defensive_split(n: usize, defensive: f64) -> Vec<f64> {
    let other = (1.0 - defensive) / (n - 1) as f64;
    (0..n)
        .map(|i| if i == 1 { defensive } else { other })
        .collect()
}
