pub mod clustering;

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::AppError;
use crate::model::{FeatureSet, RegimeFeatures, RegimeLabel};

pub use clustering::ClusterModel;

/// Aggregate trend indicator above this value reads as an up-trend.
pub const TREND_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeThresholds {
    pub vol_threshold: f64,
    pub drawdown_threshold: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            vol_threshold: 0.25,
            drawdown_threshold: -0.15,
        }
    }
}

impl RegimeThresholds {
    /// Fixed priority: CRASH, then HIGH_VOL, then trend direction.
    pub fn classify(&self, features: &RegimeFeatures) -> RegimeLabel {
        let f = features.sanitized();
        if f.drawdown < self.drawdown_threshold {
            return RegimeLabel::Crash;
        }
        if f.volatility > self.vol_threshold {
            return RegimeLabel::HighVol;
        }
        if f.trend > TREND_THRESHOLD {
            RegimeLabel::TrendingUp
        } else {
            RegimeLabel::TrendingDown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeMethod {
    RuleBased,
    Clustering,
}

impl FromStr for RegimeMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rule" | "rules" | "rule_based" => Ok(Self::RuleBased),
            "clustering" | "kmeans" => Ok(Self::Clustering),
            other => Err(AppError::invalid_config(format!(
                "unknown regime method '{}', expected one of rule/clustering",
                other
            ))),
        }
    }
}

/// Labels each step of a feature set with a market regime.
///
/// The clustering path fits over every row it is given, so labels for early
/// steps depend on later data. Use [`RegimeClassifier::fit`] on a training
/// window and predict forward when causality matters.
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    thresholds: RegimeThresholds,
    method: RegimeMethod,
    seed: u64,
}

impl RegimeClassifier {
    pub fn new(thresholds: RegimeThresholds, method: RegimeMethod, seed: u64) -> Self {
        Self {
            thresholds,
            method,
            seed,
        }
    }

    pub fn rule_based(thresholds: RegimeThresholds) -> Self {
        Self::new(thresholds, RegimeMethod::RuleBased, 0)
    }

    pub fn clustering(thresholds: RegimeThresholds, seed: u64) -> Self {
        Self::new(thresholds, RegimeMethod::Clustering, seed)
    }

    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    pub fn method(&self) -> RegimeMethod {
        self.method
    }

    pub fn classify(&self, features: &FeatureSet) -> Vec<RegimeLabel> {
        let labels = self.classify_rows(&features.aggregates());
        let mut counts: BTreeMap<RegimeLabel, usize> = BTreeMap::new();
        for label in &labels {
            *counts.entry(*label).or_default() += 1;
        }
        tracing::info!(
            method = ?self.method,
            steps = labels.len(),
            counts = ?counts,
            "Regime sequence classified"
        );
        labels
    }

    pub fn classify_rows(&self, rows: &[RegimeFeatures]) -> Vec<RegimeLabel> {
        self.fit(rows).predict(rows)
    }

    pub fn fit(&self, rows: &[RegimeFeatures]) -> FittedClassifier {
        match self.method {
            RegimeMethod::RuleBased => FittedClassifier::Rules(self.thresholds),
            RegimeMethod::Clustering => match ClusterModel::fit(rows, &self.thresholds, self.seed) {
                Some(model) => FittedClassifier::Clusters(model),
                None => FittedClassifier::Rules(self.thresholds),
            },
        }
    }
}

/// A classifier ready to label rows, possibly outside its fitting window.
#[derive(Debug, Clone)]
pub enum FittedClassifier {
    Rules(RegimeThresholds),
    Clusters(ClusterModel),
}

impl FittedClassifier {
    pub fn predict(&self, rows: &[RegimeFeatures]) -> Vec<RegimeLabel> {
        match self {
            Self::Rules(thresholds) => rows.iter().map(|r| thresholds.classify(r)).collect(),
            Self::Clusters(model) => model.predict(rows),
        }
    }
}
