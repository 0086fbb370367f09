//! Seeded k-means over z-scored (volatility, drawdown, trend) rows.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{RegimeFeatures, RegimeLabel};
use crate::regime::RegimeThresholds;

pub const N_CLUSTERS: usize = 4;
const N_INIT: usize = 10;
const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-4;

type Point = [f64; 3];

/// Per-column standardization fitted on the training rows.
#[derive(Debug, Clone, Copy)]
struct Scaler {
    mean: Point,
    scale: Point,
}

impl Scaler {
    fn fit(points: &[Point]) -> Self {
        let n = points.len().max(1) as f64;
        let mut mean = [0.0; 3];
        for p in points {
            for d in 0..3 {
                mean[d] += p[d];
            }
        }
        for m in &mut mean {
            *m /= n;
        }
        let mut scale = [0.0; 3];
        for p in points {
            for d in 0..3 {
                scale[d] += (p[d] - mean[d]).powi(2);
            }
        }
        for s in &mut scale {
            *s = (*s / n).sqrt();
            // Constant columns are left unscaled.
            if s.is_nan() || *s <= 0.0 {
                *s = 1.0;
            }
        }
        Self { mean, scale }
    }

    fn transform(&self, p: &Point) -> Point {
        [
            (p[0] - self.mean[0]) / self.scale[0],
            (p[1] - self.mean[1]) / self.scale[1],
            (p[2] - self.mean[2]) / self.scale[2],
        ]
    }
}

/// Fitted partition plus the regime assigned to each cluster.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    scaler: Scaler,
    centroids: Vec<Point>,
    cluster_regimes: Vec<RegimeLabel>,
}

impl ClusterModel {
    /// Fit on `rows` and label each cluster by thresholding the mean raw
    /// features of its members. Returns `None` for empty input.
    pub fn fit(rows: &[RegimeFeatures], thresholds: &RegimeThresholds, seed: u64) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let raw: Vec<Point> = rows.iter().map(|r| r.sanitized().as_array()).collect();
        let scaler = Scaler::fit(&raw);
        let scaled: Vec<Point> = raw.iter().map(|p| scaler.transform(p)).collect();

        let k = N_CLUSTERS.min(scaled.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let (centroids, labels) = kmeans(&scaled, k, &mut rng);

        let cluster_regimes = (0..centroids.len())
            .map(|c| {
                let members: Vec<&Point> = raw
                    .iter()
                    .zip(labels.iter())
                    .filter(|(_, label)| **label == c)
                    .map(|(p, _)| p)
                    .collect();
                let representative = if members.is_empty() {
                    unscale(&scaler, &centroids[c])
                } else {
                    mean_point(&members)
                };
                thresholds.classify(&RegimeFeatures::from_array(representative))
            })
            .collect();

        Some(Self {
            scaler,
            centroids,
            cluster_regimes,
        })
    }

    /// Assign every row to its nearest centroid in the training scale.
    pub fn predict(&self, rows: &[RegimeFeatures]) -> Vec<RegimeLabel> {
        rows.iter()
            .map(|r| {
                let p = self.scaler.transform(&r.sanitized().as_array());
                let (idx, _) = nearest(&self.centroids, &p);
                self.cluster_regimes[idx]
            })
            .collect()
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn cluster_regimes(&self) -> &[RegimeLabel] {
        &self.cluster_regimes
    }
}

/// Best of `N_INIT` k-means++ restarts by inertia.
fn kmeans(points: &[Point], k: usize, rng: &mut StdRng) -> (Vec<Point>, Vec<usize>) {
    let mut best: Option<(Vec<Point>, Vec<usize>, f64)> = None;
    for _ in 0..N_INIT {
        let (centroids, labels, inertia) = kmeans_once(points, k, rng);
        let better = best
            .as_ref()
            .map(|(_, _, best_inertia)| inertia < *best_inertia)
            .unwrap_or(true);
        if better {
            best = Some((centroids, labels, inertia));
        }
    }
    match best {
        Some((centroids, labels, _)) => (centroids, labels),
        None => (Vec::new(), Vec::new()),
    }
}

fn kmeans_once(points: &[Point], k: usize, rng: &mut StdRng) -> (Vec<Point>, Vec<usize>, f64) {
    let mut centroids = init_plus_plus(points, k, rng);
    let mut labels = vec![0usize; points.len()];

    for _ in 0..MAX_ITER {
        for (i, p) in points.iter().enumerate() {
            labels[i] = nearest(&centroids, p).0;
        }

        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(labels.iter()) {
            for d in 0..3 {
                sums[label][d] += p[d];
            }
            counts[label] += 1;
        }

        let mut shift = 0.0;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let updated = [
                sums[c][0] / counts[c] as f64,
                sums[c][1] / counts[c] as f64,
                sums[c][2] / counts[c] as f64,
            ];
            shift += dist2(&centroids[c], &updated);
            centroids[c] = updated;
        }
        if shift <= TOLERANCE * TOLERANCE {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, p) in points.iter().enumerate() {
        let (idx, d) = nearest(&centroids, p);
        labels[i] = idx;
        inertia += d;
    }
    (centroids, labels, inertia)
}

fn init_plus_plus(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(&centroids, p).1).collect();
        let total: f64 = weights.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[next]);
    }
    centroids
}

fn nearest(centroids: &[Point], p: &Point) -> (usize, f64) {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, c) in centroids.iter().enumerate() {
        let d = dist2(c, p);
        if d < best_dist {
            best_dist = d;
            best_idx = idx;
        }
    }
    (best_idx, best_dist)
}

fn dist2(a: &Point, b: &Point) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn mean_point(points: &[&Point]) -> Point {
    let n = points.len() as f64;
    let mut out = [0.0; 3];
    for p in points {
        for d in 0..3 {
            out[d] += p[d];
        }
    }
    [out[0] / n, out[1] / n, out[2] / n]
}

fn unscale(scaler: &Scaler, p: &Point) -> Point {
    [
        p[0] * scaler.scale[0] + scaler.mean[0],
        p[1] * scaler.scale[1] + scaler.mean[1],
        p[2] * scaler.scale[2] + scaler.mean[2],
    ]
}
