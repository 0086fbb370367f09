use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{ReturnSeries, WeightVector, TRADING_DAYS_PER_YEAR};

/// Estimated volatility at or below this is treated as "no estimate".
const MIN_VOL_ESTIMATE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub vol_target: f64,
    pub max_drawdown_limit: f64,
    pub exposure_floor: f64,
}

/// Named bundle of risk parameters selectable by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn params(self) -> RiskParams {
        match self {
            Self::Low => RiskParams {
                vol_target: 0.10,
                max_drawdown_limit: -0.12,
                exposure_floor: 0.15,
            },
            Self::Medium => RiskParams {
                vol_target: 0.15,
                max_drawdown_limit: -0.20,
                exposure_floor: 0.20,
            },
            Self::High => RiskParams {
                vol_target: 0.22,
                max_drawdown_limit: -0.28,
                exposure_floor: 0.25,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            other => Err(AppError::invalid_config(format!(
                "unknown risk tier '{}', expected one of LOW/MEDIUM/HIGH",
                other
            ))),
        }
    }
}

/// Stable taxonomy for adjustments made by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskAction {
    StopLoss,
    VolatilityTarget,
    DrawdownFloor,
}

impl RiskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopLoss => "risk.stop_loss",
            Self::VolatilityTarget => "risk.vol_target",
            Self::DrawdownFloor => "risk.drawdown_floor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskOverlayConfig {
    pub params: RiskParams,
    /// Daily return below which an asset is dropped at the next rebalance.
    pub stop_loss_threshold: Option<f64>,
    /// Trailing window (steps) for the covariance estimate.
    pub vol_window: usize,
    pub enabled: bool,
}

impl RiskOverlayConfig {
    pub fn for_tier(tier: RiskTier) -> Self {
        Self {
            params: tier.params(),
            stop_loss_threshold: None,
            vol_window: 21,
            enabled: true,
        }
    }
}

/// Causal inputs available to the overlay at a rebalance step.
#[derive(Debug, Clone, Copy)]
pub struct OverlayContext<'a> {
    pub step: usize,
    pub returns: &'a ReturnSeries,
    /// Portfolio values up to, not including, `step`.
    pub equity_curve: &'a [f64],
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayOutcome {
    pub weights: WeightVector,
    /// Annualized volatility estimate of the adjusted weights; `None` when disabled.
    pub portfolio_volatility: Option<f64>,
    pub drawdown: Option<f64>,
    pub actions: Vec<RiskAction>,
}

impl OverlayOutcome {
    pub fn risk_reduced(&self) -> bool {
        !self.actions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RiskOverlay {
    cfg: RiskOverlayConfig,
}

impl RiskOverlay {
    pub fn new(cfg: RiskOverlayConfig) -> Self {
        Self { cfg }
    }

    /// Pass-through overlay used for "without risk" runs.
    pub fn disabled(cfg: RiskOverlayConfig) -> Self {
        Self {
            cfg: RiskOverlayConfig {
                enabled: false,
                ..cfg
            },
        }
    }

    pub fn config(&self) -> &RiskOverlayConfig {
        &self.cfg
    }

    pub fn is_enabled(&self) -> bool {
        self.cfg.enabled
    }

    pub fn set_params(&mut self, params: RiskParams) {
        self.cfg.params = params;
    }

    /// Stop-loss, renormalize, volatility targeting, then drawdown floor.
    pub fn apply(&self, weights: &WeightVector, ctx: &OverlayContext<'_>) -> OverlayOutcome {
        let drawdown = current_drawdown(ctx.equity_curve);
        if !self.cfg.enabled {
            return OverlayOutcome {
                weights: weights.clone(),
                portfolio_volatility: None,
                drawdown,
                actions: Vec::new(),
            };
        }

        let mut actions = Vec::new();
        let mut w = weights.clone();

        if let (Some(threshold), true) = (self.cfg.stop_loss_threshold, ctx.step > 0) {
            let previous = ctx.returns.row(ctx.step - 1);
            let (stopped, hit) = apply_stop_loss(&w, ctx.returns.tickers(), previous, threshold);
            if hit {
                tracing::debug!(step = ctx.step, threshold, "Stop-loss zeroed assets");
                actions.push(RiskAction::StopLoss);
            }
            w = stopped;
        }
        w = w.normalized();

        let estimated = self.estimate_volatility(&w, ctx.returns, ctx.step);
        let (targeted, scaled) = scale_to_vol_target(&w, estimated, self.cfg.params.vol_target);
        if scaled {
            tracing::debug!(
                step = ctx.step,
                estimated,
                target = self.cfg.params.vol_target,
                "Scaled exposure to volatility target"
            );
            actions.push(RiskAction::VolatilityTarget);
        }
        w = targeted;

        if let Some(dd) = drawdown {
            let (floored, cut) = apply_drawdown_floor(
                &w,
                dd,
                self.cfg.params.max_drawdown_limit,
                self.cfg.params.exposure_floor,
            );
            if cut {
                tracing::debug!(step = ctx.step, drawdown = dd, "Drawdown floor applied");
                actions.push(RiskAction::DrawdownFloor);
            }
            w = floored;
        }

        let portfolio_volatility = Some(self.estimate_volatility(&w, ctx.returns, ctx.step));
        OverlayOutcome {
            weights: w,
            portfolio_volatility,
            drawdown,
            actions,
        }
    }

    /// Annualized `sqrt(w' Σ w)` over the `vol_window` returns strictly before
    /// `step`; 0 while the window is incomplete or the covariance is undefined.
    pub fn estimate_volatility(&self, weights: &WeightVector, returns: &ReturnSeries, step: usize) -> f64 {
        let window = self.cfg.vol_window;
        if step < window {
            return 0.0;
        }
        match trailing_covariance(returns, step, window) {
            Some(cov) => portfolio_volatility(&weights.aligned_to(returns.tickers()), &cov),
            None => 0.0,
        }
    }
}

/// Sample covariance of the `window` rows strictly before `step`, or `None`
/// while that window is not fully available.
pub fn trailing_covariance(returns: &ReturnSeries, step: usize, window: usize) -> Option<Vec<Vec<f64>>> {
    if window == 0 || step < window || step > returns.len() {
        return None;
    }
    returns.window_covariance(step - window, step)
}

/// Annualized volatility of a weight vector under a daily covariance matrix.
pub fn portfolio_volatility(weights: &[f64], daily_cov: &[Vec<f64>]) -> f64 {
    let mut variance = 0.0;
    for (i, wi) in weights.iter().enumerate() {
        for (j, wj) in weights.iter().enumerate() {
            variance += wi * wj * daily_cov[i][j];
        }
    }
    let annual = variance * TRADING_DAYS_PER_YEAR;
    if annual.is_finite() && annual > 0.0 {
        annual.sqrt()
    } else {
        0.0
    }
}

/// Zero assets whose previous-step return fell below `threshold`.
/// Returns the adjusted vector and whether any held asset was zeroed.
pub fn apply_stop_loss(
    weights: &WeightVector,
    tickers: &[String],
    previous_returns: &[f64],
    threshold: f64,
) -> (WeightVector, bool) {
    let mut out = weights.clone();
    let mut hit = false;
    for (ticker, r) in tickers.iter().zip(previous_returns.iter()) {
        if *r < threshold && out.get(ticker).map(|w| w > 0.0).unwrap_or(false) {
            out = out.with_weight(ticker, 0.0);
            hit = true;
        }
    }
    (out, hit)
}

/// Scale every weight by `target / estimated` when the estimate exceeds the target.
pub fn scale_to_vol_target(weights: &WeightVector, estimated: f64, target: f64) -> (WeightVector, bool) {
    if estimated > MIN_VOL_ESTIMATE && estimated > target {
        (weights.scaled(target / estimated), true)
    } else {
        (weights.clone(), false)
    }
}

/// Scale every weight by `floor` when `drawdown` is below `limit`; the
/// remainder stays in cash.
pub fn apply_drawdown_floor(
    weights: &WeightVector,
    drawdown: f64,
    limit: f64,
    floor: f64,
) -> (WeightVector, bool) {
    if drawdown < limit {
        (weights.scaled(floor), true)
    } else {
        (weights.clone(), false)
    }
}

/// Decline of the last value from the running peak of `equity`.
pub fn current_drawdown(equity: &[f64]) -> Option<f64> {
    let last = *equity.last()?;
    let peak = equity
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !peak.is_finite() || peak <= 0.0 || !last.is_finite() {
        return None;
    }
    Some((last - peak) / peak)
}
