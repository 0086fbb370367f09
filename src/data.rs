use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::model::{FeatureSet, ReturnSeries};

/// Aligned return series and feature tables for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub returns: ReturnSeries,
    pub features: FeatureSet,
}

impl MarketData {
    pub fn new(returns: ReturnSeries, features: FeatureSet) -> Result<Self> {
        if features.len() != returns.len() {
            return Err(AppError::data_unavailable(format!(
                "feature set has {} steps, return series has {}",
                features.len(),
                returns.len()
            )));
        }
        for step in 0..features.len() {
            if let Some(row) = features.momentum(step) {
                if row.len() != returns.n_assets() {
                    return Err(AppError::data_unavailable(format!(
                        "momentum row {} has {} values, expected {}",
                        step,
                        row.len(),
                        returns.n_assets()
                    )));
                }
            }
        }
        Ok(Self { returns, features })
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn tickers(&self) -> &[String] {
        self.returns.tickers()
    }

    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            returns: self.returns.slice(start, end),
            features: self.features.slice(start, end),
        }
    }

    /// Same features over a derived return series with the same index.
    pub fn with_returns(&self, returns: ReturnSeries) -> Result<Self> {
        Self::new(returns, self.features.clone())
    }
}

/// Upstream provider of cleaned, look-ahead-free market data.
pub trait MarketDataSource {
    fn load(&self) -> Result<MarketData>;
}

impl MarketDataSource for MarketData {
    fn load(&self) -> Result<MarketData> {
        Ok(self.clone())
    }
}

type Table = Vec<Vec<Option<f64>>>;

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    returns: Table,
    features: SnapshotFeatures,
}

#[derive(Debug, Deserialize)]
struct SnapshotFeatures {
    volatility: Table,
    drawdown: Table,
    trend: Table,
    #[serde(default)]
    momentum: Option<Table>,
}

fn to_nan(table: Table) -> Vec<Vec<f64>> {
    table
        .into_iter()
        .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        .collect()
}

/// JSON snapshot of returns and features. `null` entries are read as missing.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(contents: &str) -> Result<MarketData> {
        let file: SnapshotFile = serde_json::from_str(contents)?;
        let n = file.dates.len();
        let returns = ReturnSeries::new(file.tickers, file.dates, to_nan(file.returns))?;
        let momentum = match file.features.momentum {
            Some(table) => to_nan(table),
            None => vec![Vec::new(); n],
        };
        let features = FeatureSet::new(
            to_nan(file.features.volatility),
            to_nan(file.features.drawdown),
            to_nan(file.features.trend),
            momentum,
        )?;
        MarketData::new(returns, features)
    }
}

impl MarketDataSource for JsonFileSource {
    fn load(&self) -> Result<MarketData> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::data_unavailable(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let data = Self::parse(&contents)?;
        tracing::info!(
            path = %self.path.display(),
            steps = data.len(),
            assets = data.tickers().len(),
            "Market data loaded"
        );
        Ok(data)
    }
}
