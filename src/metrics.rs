//! Performance statistics over an equity curve.

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{ReturnSeries, TRADING_DAYS_PER_YEAR};

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
pub const SHARPE_SUSPICIOUS: f64 = 3.0;
pub const CALMAR_SUSPICIOUS: f64 = 5.0;

const DAYS_PER_YEAR: f64 = 365.25;
const DOWNSIDE_VOL_FLOOR: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub cagr: f64,
    pub annual_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Most negative decline from a running peak; 0 or below.
    pub max_drawdown: f64,
    pub calmar: f64,
    pub total_return: f64,
    pub suspicious_flags: Vec<String>,
    pub suspicious: bool,
}

/// Metrics for an equity curve on `dates`. `None` with fewer than two points.
pub fn compute_metrics(dates: &[NaiveDate], values: &[f64], risk_free_rate: f64) -> Option<PerformanceMetrics> {
    if values.len() < 2 || dates.len() != values.len() {
        return None;
    }
    let rets = simple_returns(values);
    if rets.is_empty() {
        return None;
    }

    let span_days = (dates[dates.len() - 1] - dates[0]).num_days() as f64;
    let years = if span_days > 0.0 { span_days / DAYS_PER_YEAR } else { 1.0 };
    let first = values[0];
    let last = values[values.len() - 1];
    let growth = if first > 0.0 { last / first } else { 1.0 };
    let cagr = if growth > 0.0 { growth.powf(1.0 / years) - 1.0 } else { -1.0 };

    let sd = sample_std(&rets).unwrap_or(0.0);
    let annual_volatility = if sd > 0.0 { sd * TRADING_DAYS_PER_YEAR.sqrt() } else { 0.0 };
    let excess = mean(&rets) * TRADING_DAYS_PER_YEAR - risk_free_rate;
    let sharpe = if annual_volatility > 0.0 { excess / annual_volatility } else { 0.0 };

    let downside: Vec<f64> = rets.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_vol = match sample_std(&downside) {
        Some(s) if s > 0.0 => s * TRADING_DAYS_PER_YEAR.sqrt(),
        _ => DOWNSIDE_VOL_FLOOR,
    };
    let sortino = excess / downside_vol;

    let max_dd = max_drawdown(values);
    let calmar = if max_dd != 0.0 { cagr / max_dd.abs() } else { 0.0 };

    let mut suspicious_flags = Vec::new();
    if sharpe > SHARPE_SUSPICIOUS {
        suspicious_flags.push(format!("Sharpe ratio > {}", SHARPE_SUSPICIOUS));
    }
    if calmar > CALMAR_SUSPICIOUS {
        suspicious_flags.push(format!("Calmar ratio > {}", CALMAR_SUSPICIOUS));
    }

    Some(PerformanceMetrics {
        cagr,
        annual_volatility,
        sharpe,
        sortino,
        max_drawdown: max_dd,
        calmar,
        total_return: growth - 1.0,
        suspicious: !suspicious_flags.is_empty(),
        suspicious_flags,
    })
}

/// Drawdown from the running peak at every point of `values`.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|v| {
            peak = peak.max(*v);
            if peak > 0.0 {
                (v - peak) / peak
            } else {
                0.0
            }
        })
        .collect()
}

pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown_series(values).into_iter().fold(0.0, f64::min)
}

fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

/// Pairwise Pearson correlation of asset returns, labelled by ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn from_returns(returns: &ReturnSeries) -> Self {
        Self {
            labels: returns.tickers().to_vec(),
            values: returns.correlation_matrix(),
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[i][j])
    }
}
