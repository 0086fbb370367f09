use serde::Serialize;

use crate::error::{AppError, Result};

/// Cross-sectional mean features for one step, the input of regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RegimeFeatures {
    pub volatility: f64,
    pub drawdown: f64,
    pub trend: f64,
}

impl RegimeFeatures {
    pub fn new(volatility: f64, drawdown: f64, trend: f64) -> Self {
        Self {
            volatility,
            drawdown,
            trend,
        }
    }

    /// Undefined values are treated as 0.
    pub fn sanitized(self) -> Self {
        Self {
            volatility: finite_or_zero(self.volatility),
            drawdown: finite_or_zero(self.drawdown),
            trend: finite_or_zero(self.trend),
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.volatility, self.drawdown, self.trend]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

/// Per-asset derived feature tables aligned 1:1 with a `ReturnSeries`.
///
/// Values are produced upstream from data at or before each step; missing
/// entries are stored as NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSet {
    volatility: Vec<Vec<f64>>,
    drawdown: Vec<Vec<f64>>,
    trend: Vec<Vec<f64>>,
    momentum: Vec<Vec<f64>>,
}

impl FeatureSet {
    pub fn new(
        volatility: Vec<Vec<f64>>,
        drawdown: Vec<Vec<f64>>,
        trend: Vec<Vec<f64>>,
        momentum: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let n = volatility.len();
        for (name, table) in [
            ("drawdown", &drawdown),
            ("trend", &trend),
            ("momentum", &momentum),
        ] {
            if table.len() != n {
                return Err(AppError::data_unavailable(format!(
                    "{} table has {} rows, volatility has {}",
                    name,
                    table.len(),
                    n
                )));
            }
        }
        Ok(Self {
            volatility,
            drawdown,
            trend,
            momentum,
        })
    }

    /// Build a feature set directly from per-step aggregates, one column each.
    pub fn from_aggregates(rows: &[RegimeFeatures]) -> Self {
        Self {
            volatility: rows.iter().map(|r| vec![r.volatility]).collect(),
            drawdown: rows.iter().map(|r| vec![r.drawdown]).collect(),
            trend: rows.iter().map(|r| vec![r.trend]).collect(),
            momentum: rows.iter().map(|_| Vec::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.volatility.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volatility.is_empty()
    }

    /// Mean across assets of each feature at `step`, ignoring undefined values.
    pub fn aggregate(&self, step: usize) -> RegimeFeatures {
        RegimeFeatures {
            volatility: finite_mean(&self.volatility[step]),
            drawdown: finite_mean(&self.drawdown[step]),
            trend: finite_mean(&self.trend[step]),
        }
    }

    pub fn aggregates(&self) -> Vec<RegimeFeatures> {
        (0..self.len()).map(|step| self.aggregate(step)).collect()
    }

    /// Momentum scores at `step`, or `None` when the table carries no values.
    pub fn momentum(&self, step: usize) -> Option<&[f64]> {
        self.momentum
            .get(step)
            .map(Vec::as_slice)
            .filter(|row| !row.is_empty())
    }

    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        Self {
            volatility: self.volatility[start..end].to_vec(),
            drawdown: self.drawdown[start..end].to_vec(),
            trend: self.trend[start..end].to_vec(),
            momentum: self.momentum[start..end].to_vec(),
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn finite_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
