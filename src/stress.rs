use std::ops::Range;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AppError;
use crate::model::ReturnSeries;

/// Sub-window of a series affected by a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StressWindow {
    First(usize),
    Last(usize),
}

impl StressWindow {
    pub fn range(&self, len: usize) -> Range<usize> {
        match *self {
            Self::First(n) => 0..n.min(len),
            Self::Last(n) => len.saturating_sub(n)..len,
        }
    }

    pub fn days(&self) -> usize {
        match *self {
            Self::First(n) | Self::Last(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum StressScenario {
    /// Every asset returns `daily_return` on each affected day.
    FlatShock { daily_return: f64 },
    /// Existing returns multiplied by `factor`.
    VolatilityMultiplier { factor: f64 },
    /// Each asset takes the cross-sectional mean return of the day.
    CorrelationCollapse,
}

/// Scenario kind as named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Shock,
    Volatility,
    Correlation,
}

impl FromStr for ScenarioKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shock" => Ok(Self::Shock),
            "vol" | "volatility" => Ok(Self::Volatility),
            "corr" | "correlation" => Ok(Self::Correlation),
            other => Err(AppError::invalid_config(format!(
                "unknown stress scenario '{}', expected one of shock/vol/corr",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StressScenarioGenerator {
    pub scenario: StressScenario,
    pub window: StressWindow,
}

impl StressScenarioGenerator {
    pub fn new(scenario: StressScenario, window: StressWindow) -> Self {
        Self { scenario, window }
    }

    pub fn describe(&self) -> String {
        let (side, n) = match self.window {
            StressWindow::First(n) => ("first", n),
            StressWindow::Last(n) => ("last", n),
        };
        match self.scenario {
            StressScenario::FlatShock { daily_return } => format!(
                "{:+.1}% daily shock on every asset for the {} {} days",
                daily_return * 100.0,
                side,
                n
            ),
            StressScenario::VolatilityMultiplier { factor } => format!(
                "Returns scaled {}x for the {} {} days",
                factor, side, n
            ),
            StressScenario::CorrelationCollapse => format!(
                "All assets move with the cross-sectional mean for the {} {} days",
                side, n
            ),
        }
    }

    /// Perturbed copy of `returns`; the input is left untouched.
    pub fn stress_returns(&self, returns: &ReturnSeries) -> ReturnSeries {
        let range = self.window.range(returns.len());
        let mut rows = returns.rows().to_vec();
        for row in &mut rows[range] {
            match self.scenario {
                StressScenario::FlatShock { daily_return } => {
                    row.iter_mut().for_each(|r| *r = daily_return);
                }
                StressScenario::VolatilityMultiplier { factor } => {
                    row.iter_mut().for_each(|r| *r *= factor);
                }
                StressScenario::CorrelationCollapse => {
                    let (sum, count) = row
                        .iter()
                        .filter(|r| r.is_finite())
                        .fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
                    if count > 0 {
                        let common = sum / count as f64;
                        row.iter_mut().for_each(|r| *r = common);
                    }
                }
            }
        }
        returns.with_rows(rows)
    }
}
