use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AppError, Result};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Per-asset daily returns on a fixed date index and ticker universe.
///
/// `rows[t][a]` is the return of asset `a` on `dates[t]`. The series is
/// immutable once built; stress scenarios derive new series instead of
/// editing one in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSeries {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
}

impl ReturnSeries {
    pub fn new(tickers: Vec<String>, dates: Vec<NaiveDate>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if tickers.is_empty() {
            return Err(AppError::data_unavailable("return series has no tickers"));
        }
        for (i, t) in tickers.iter().enumerate() {
            if t.trim().is_empty() {
                return Err(AppError::data_unavailable("return series has a blank ticker"));
            }
            if tickers[..i].contains(t) {
                return Err(AppError::data_unavailable(format!(
                    "duplicate ticker '{}' in return series",
                    t
                )));
            }
        }
        if dates.len() != rows.len() {
            return Err(AppError::data_unavailable(format!(
                "return series has {} dates but {} rows",
                dates.len(),
                rows.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::data_unavailable(
                "return series dates must be strictly increasing",
            ));
        }
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != tickers.len())
        {
            return Err(AppError::data_unavailable(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                tickers.len()
            )));
        }
        Ok(Self {
            tickers,
            dates,
            rows,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn row(&self, step: usize) -> &[f64] {
        &self.rows[step]
    }

    pub fn date(&self, step: usize) -> NaiveDate {
        self.dates[step]
    }

    pub fn column(&self, asset: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[asset]).collect()
    }

    /// Same index and universe, different values. Used by derived series.
    pub(crate) fn with_rows(&self, rows: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(rows.len(), self.rows.len());
        Self {
            tickers: self.tickers.clone(),
            dates: self.dates.clone(),
            rows,
        }
    }

    /// Contiguous sub-range `[start, end)` of the series.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.rows.len());
        let start = start.min(end);
        Self {
            tickers: self.tickers.clone(),
            dates: self.dates[start..end].to_vec(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Sample covariance (n - 1 denominator) of the rows in `[start, end)`.
    ///
    /// Each entry uses only the rows where both assets have a finite return,
    /// so one missing value does not discard the window. Returns `None` when
    /// some pair has fewer than two such rows.
    pub fn window_covariance(&self, start: usize, end: usize) -> Option<Vec<Vec<f64>>> {
        if end > self.rows.len() || start >= end {
            return None;
        }
        let window = &self.rows[start..end];
        let k = self.tickers.len();
        let mut cov = vec![vec![0.0; k]; k];
        for i in 0..k {
            for j in i..k {
                let c = pairwise_moments(window, i, j)?.cov;
                cov[i][j] = c;
                cov[j][i] = c;
            }
        }
        Some(cov)
    }

    /// Pearson correlation across the whole series over pairwise-complete
    /// rows. Pairs with zero variance or too few rows correlate 0.0; the
    /// diagonal is always 1.0.
    pub fn correlation_matrix(&self) -> Vec<Vec<f64>> {
        let k = self.tickers.len();
        (0..k)
            .map(|i| {
                (0..k)
                    .map(|j| {
                        if i == j {
                            return 1.0;
                        }
                        match pairwise_moments(&self.rows, i, j) {
                            Some(m) if m.var_a > 0.0 && m.var_b > 0.0 => {
                                (m.cov / (m.var_a * m.var_b).sqrt()).clamp(-1.0, 1.0)
                            }
                            _ => 0.0,
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

struct PairMoments {
    cov: f64,
    var_a: f64,
    var_b: f64,
}

/// Sample moments of columns `a` and `b` over the rows where both are finite.
fn pairwise_moments(rows: &[Vec<f64>], a: usize, b: usize) -> Option<PairMoments> {
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .map(|row| (row[a], row[b]))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let moments = PairMoments {
        cov: cov / (n - 1.0),
        var_a: var_a / (n - 1.0),
        var_b: var_b / (n - 1.0),
    };
    moments.cov.is_finite().then_some(moments)
}
