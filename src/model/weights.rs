use serde::Serialize;

/// Default tolerance used when checking that a weight vector is fully invested.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Target allocation over a fixed, ordered ticker universe.
///
/// Weights are plain fractions of portfolio value. A fresh vector is produced
/// at every rebalance; the type is a value and never shared mutably across
/// components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightVector {
    tickers: Vec<String>,
    weights: Vec<f64>,
}

impl WeightVector {
    /// Build a vector from parallel ticker/weight lists. Negative or
    /// non-finite entries are clamped to zero.
    pub fn from_parts(tickers: Vec<String>, weights: Vec<f64>) -> Self {
        debug_assert_eq!(tickers.len(), weights.len());
        let weights = weights
            .into_iter()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
            .collect();
        Self { tickers, weights }
    }

    pub fn equal(tickers: &[String]) -> Self {
        let n = tickers.len();
        let w = if n == 0 { 0.0 } else { 1.0 / n as f64 };
        Self {
            tickers: tickers.to_vec(),
            weights: vec![w; n],
        }
    }

    pub fn zeros(tickers: &[String]) -> Self {
        Self {
            tickers: tickers.to_vec(),
            weights: vec![0.0; tickers.len()],
        }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|idx| self.weights[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.tickers
            .iter()
            .map(String::as_str)
            .zip(self.weights.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Rescale so the weights sum to 1. A non-positive total yields equal weight.
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if !total.is_finite() || total <= 0.0 {
            return Self::equal(&self.tickers);
        }
        Self {
            tickers: self.tickers.clone(),
            weights: self.weights.iter().map(|w| w / total).collect(),
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_parts(
            self.tickers.clone(),
            self.weights.iter().map(|w| w * factor).collect(),
        )
    }

    pub fn with_weight(mut self, ticker: &str, weight: f64) -> Self {
        if let Some(idx) = self.tickers.iter().position(|t| t == ticker) {
            self.weights[idx] = if weight.is_finite() && weight > 0.0 {
                weight
            } else {
                0.0
            };
        }
        self
    }

    /// Reorder onto `universe`; tickers missing from this vector get zero.
    pub fn aligned_to(&self, universe: &[String]) -> Vec<f64> {
        universe
            .iter()
            .map(|t| self.get(t).unwrap_or(0.0))
            .collect()
    }

    /// Sum of absolute weight changes against `previous` (zero vector if none).
    pub fn turnover(&self, previous: Option<&WeightVector>) -> f64 {
        match previous {
            Some(prev) => {
                let prev_aligned = prev.aligned_to(&self.tickers);
                let mut total: f64 = self
                    .weights
                    .iter()
                    .zip(prev_aligned.iter())
                    .map(|(a, b)| (a - b).abs())
                    .sum();
                // Weight held previously on tickers this vector no longer carries.
                total += prev
                    .iter()
                    .filter(|(t, _)| !self.tickers.iter().any(|own| own == t))
                    .map(|(_, w)| w.abs())
                    .sum::<f64>();
                total
            }
            None => self.weights.iter().map(|w| w.abs()).sum(),
        }
    }

    pub fn is_fully_invested(&self, tolerance: f64) -> bool {
        self.weights.iter().all(|w| *w >= 0.0) && (self.sum() - 1.0).abs() <= tolerance
    }

    pub fn approx_eq(&self, other: &WeightVector, tolerance: f64) -> bool {
        self.tickers == other.tickers
            && self
                .weights
                .iter()
                .zip(other.weights.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}
