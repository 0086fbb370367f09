use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::allocation::AllocationMode;
use crate::error::AppError;
use crate::regime::{RegimeMethod, RegimeThresholds};
use crate::risk_overlay::{RiskOverlayConfig, RiskTier};
use crate::simulation::SimulationParams;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub stress: StressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub rebalance_frequency: usize,
    pub transaction_cost: f64,
    pub risk_free_rate: f64,
    pub train_window: usize,
    pub test_window: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            rebalance_frequency: 21,
            transaction_cost: 0.0005,
            risk_free_rate: 0.02,
            train_window: 756,
            test_window: 126,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub method: String,
    pub vol_threshold: f64,
    pub drawdown_threshold: f64,
    pub seed: u64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            method: "clustering".to_string(),
            vol_threshold: 0.25,
            drawdown_threshold: -0.15,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub tier: String,
    pub stop_loss_threshold: Option<f64>,
    pub vol_window: usize,
    pub enabled: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            tier: "MEDIUM".to_string(),
            stop_loss_threshold: None,
            vol_window: 21,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub mode: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            mode: "regime".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub tick_interval_ms: u64,
    /// Decision-log entries included in a session snapshot.
    pub log_tail: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            log_tail: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub shock_return: f64,
    pub shock_days: usize,
    pub vol_multiplier: f64,
    pub vol_days: usize,
    pub correlation_days: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            shock_return: -0.05,
            shock_days: 5,
            vol_multiplier: 3.0,
            vol_days: 10,
            correlation_days: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Validated, strongly typed settings consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub simulation: SimulationParams,
    pub risk_free_rate: f64,
    pub train_window: usize,
    pub test_window: usize,
    pub regime_method: RegimeMethod,
    pub thresholds: RegimeThresholds,
    pub seed: u64,
    pub risk_tier: RiskTier,
    pub overlay: RiskOverlayConfig,
    pub allocation_mode: AllocationMode,
    pub stress: StressConfig,
    pub realtime: RealtimeSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeSettings {
    pub tick_interval: Duration,
    pub log_tail: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let risk_tier = RiskTier::Medium;
        Self {
            simulation: SimulationParams::default(),
            risk_free_rate: 0.02,
            train_window: 756,
            test_window: 126,
            regime_method: RegimeMethod::Clustering,
            thresholds: RegimeThresholds::default(),
            seed: 42,
            risk_tier,
            overlay: RiskOverlayConfig::for_tier(risk_tier),
            allocation_mode: AllocationMode::RegimeTemplate,
            stress: StressConfig::default(),
            realtime: RealtimeSettings {
                tick_interval: Duration::from_millis(1_000),
                log_tail: 50,
            },
        }
    }
}

fn is_negative_fraction(v: f64) -> bool {
    v > -1.0 && v < 0.0
}

impl EngineSettings {
    /// Reject out-of-range values before any run starts.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.simulation.validate()?;
        if !self.thresholds.vol_threshold.is_finite() || self.thresholds.vol_threshold <= 0.0 {
            return Err(AppError::invalid_config(format!(
                "regime.vol_threshold must be positive (got {})",
                self.thresholds.vol_threshold
            )));
        }
        let dd = self.thresholds.drawdown_threshold;
        if !is_negative_fraction(dd) {
            return Err(AppError::invalid_config(format!(
                "regime.drawdown_threshold must be in (-1, 0) (got {})",
                dd
            )));
        }
        if let Some(sl) = self.overlay.stop_loss_threshold {
            if !is_negative_fraction(sl) {
                return Err(AppError::invalid_config(format!(
                    "risk.stop_loss_threshold must be in (-1, 0) (got {})",
                    sl
                )));
            }
        }
        if self.overlay.vol_window < 2 {
            return Err(AppError::invalid_config("risk.vol_window must be >= 2"));
        }
        if self.train_window == 0 || self.test_window == 0 {
            return Err(AppError::invalid_config(
                "backtest.train_window and backtest.test_window must be >= 1",
            ));
        }
        if self.realtime.tick_interval.is_zero() {
            return Err(AppError::invalid_config("realtime.tick_interval_ms must be >= 1"));
        }
        if !self.stress.vol_multiplier.is_finite() || !self.stress.shock_return.is_finite() {
            return Err(AppError::invalid_config("stress parameters must be finite"));
        }
        Ok(())
    }
}

impl Config {
    /// Resolve the config path: `RA_CONFIG_PATH` if set, else `config/default.toml`.
    pub fn path() -> PathBuf {
        std::env::var("RA_CONFIG_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = Self::path();
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        config
            .engine_settings()
            .with_context(|| format!("invalid settings in {}", config_path.display()))?;

        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("invalid TOML")
    }

    pub fn engine_settings(&self) -> crate::error::Result<EngineSettings> {
        let risk_tier: RiskTier = self.risk.tier.parse()?;
        let settings = EngineSettings {
            simulation: SimulationParams {
                initial_capital: self.backtest.initial_capital,
                rebalance_frequency: self.backtest.rebalance_frequency,
                transaction_cost: self.backtest.transaction_cost,
            },
            risk_free_rate: self.backtest.risk_free_rate,
            train_window: self.backtest.train_window,
            test_window: self.backtest.test_window,
            regime_method: self.regime.method.parse()?,
            thresholds: RegimeThresholds {
                vol_threshold: self.regime.vol_threshold,
                drawdown_threshold: self.regime.drawdown_threshold,
            },
            seed: self.regime.seed,
            risk_tier,
            overlay: RiskOverlayConfig {
                params: risk_tier.params(),
                stop_loss_threshold: self.risk.stop_loss_threshold,
                vol_window: self.risk.vol_window,
                enabled: self.risk.enabled,
            },
            allocation_mode: self.allocation.mode.parse()?,
            stress: self.stress.clone(),
            realtime: RealtimeSettings {
                tick_interval: Duration::from_millis(self.realtime.tick_interval_ms),
                log_tail: self.realtime.log_tail,
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_toml() {
        let toml_str = r#"
[backtest]
initial_capital = 500000.0
rebalance_frequency = 10
transaction_cost = 0.001

[regime]
method = "rule"
vol_threshold = 0.3

[risk]
tier = "high"
stop_loss_threshold = -0.08

[realtime]
tick_interval_ms = 250

[logging]
level = "debug"
json = true
"#;
        let config = Config::from_toml_str(toml_str).unwrap();
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.simulation.rebalance_frequency, 10);
        assert_eq!(settings.regime_method, RegimeMethod::RuleBased);
        assert_eq!(settings.risk_tier, RiskTier::High);
        assert_eq!(settings.overlay.params.vol_target, 0.22);
        assert_eq!(settings.overlay.stop_loss_threshold, Some(-0.08));
        assert_eq!(settings.thresholds.drawdown_threshold, -0.15);
        assert_eq!(settings.realtime.tick_interval, Duration::from_millis(250));
        assert_eq!(settings.allocation_mode, AllocationMode::RegimeTemplate);
        assert!(config.logging.json);
    }

    #[test]
    fn empty_toml_matches_engine_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.engine_settings().unwrap(), EngineSettings::default());
    }
}
