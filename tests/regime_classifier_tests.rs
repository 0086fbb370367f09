use regime_allocator::model::{FeatureSet, RegimeFeatures, RegimeLabel};
use regime_allocator::regime::{RegimeClassifier, RegimeMethod, RegimeThresholds};

fn rule_classifier() -> RegimeClassifier {
    RegimeClassifier::rule_based(RegimeThresholds::default())
}

fn row(vol: f64, dd: f64, trend: f64) -> RegimeFeatures {
    RegimeFeatures::new(vol, dd, trend)
}

#[test]
/// Verifies crash priority: a drawdown below threshold yields CRASH no matter
/// how calm or trending the other features are.
fn drawdown_below_threshold_is_always_crash() {
    let c = rule_classifier();
    let rows = vec![
        row(0.05, -0.20, 1.0),
        row(0.90, -0.16, 0.0),
        row(0.00, -0.50, 0.9),
    ];
    assert!(c
        .classify_rows(&rows)
        .iter()
        .all(|r| *r == RegimeLabel::Crash));
}

#[test]
/// Verifies the remaining priority order: high volatility, then trend.
fn volatility_then_trend_priority() {
    let c = rule_classifier();
    let rows = vec![
        row(0.30, -0.05, 1.0),
        row(0.10, -0.05, 0.8),
        row(0.10, -0.05, 0.5),
        row(0.10, -0.05, 0.0),
    ];
    assert_eq!(
        c.classify_rows(&rows),
        vec![
            RegimeLabel::HighVol,
            RegimeLabel::TrendingUp,
            RegimeLabel::TrendingDown,
            RegimeLabel::TrendingDown
        ]
    );
}

#[test]
/// Verifies missing-value handling: undefined features are read as zero.
fn undefined_features_are_treated_as_zero() {
    let c = rule_classifier();
    let labels = c.classify_rows(&[row(f64::NAN, f64::NAN, f64::NAN), row(f64::NAN, -0.3, 1.0)]);
    assert_eq!(labels, vec![RegimeLabel::TrendingDown, RegimeLabel::Crash]);
}

#[test]
/// Verifies empty input produces an empty label sequence for both methods.
fn empty_input_gives_empty_output() {
    let empty = FeatureSet::from_aggregates(&[]);
    assert!(rule_classifier().classify(&empty).is_empty());
    assert!(RegimeClassifier::clustering(RegimeThresholds::default(), 42)
        .classify(&empty)
        .is_empty());
}

#[test]
/// Verifies aggregation: per-asset tables are averaged across assets,
/// ignoring undefined entries, before thresholds are applied.
fn classify_uses_cross_sectional_means() {
    let features = FeatureSet::new(
        vec![vec![0.1, 0.5], vec![0.1, f64::NAN]],
        vec![vec![0.0, 0.0], vec![-0.1, -0.3]],
        vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        vec![Vec::new(), Vec::new()],
    )
    .unwrap();
    assert_eq!(
        rule_classifier().classify(&features),
        vec![RegimeLabel::HighVol, RegimeLabel::Crash]
    );
}

fn clustered_rows() -> Vec<RegimeFeatures> {
    let mut rows = Vec::new();
    for i in 0..30 {
        let j = (i % 5) as f64 * 1e-3;
        rows.push(row(0.10 + j, -0.02, 1.0));
        rows.push(row(0.12 + j, -0.03, 0.0));
        rows.push(row(0.45 + j, -0.08, 0.5));
        rows.push(row(0.35 + j, -0.35, 0.0));
    }
    rows
}

#[test]
/// Verifies seeded clustering is reproducible: identical inputs and seed
/// produce identical label sequences.
fn clustering_is_deterministic_for_fixed_seed() {
    let c = RegimeClassifier::clustering(RegimeThresholds::default(), 42);
    let rows = clustered_rows();
    assert_eq!(c.classify_rows(&rows), c.classify_rows(&rows));
}

#[test]
/// Verifies cluster-to-regime mapping: well-separated groups are labelled
/// by the threshold rules applied to their representative features.
fn clustering_labels_groups_by_threshold_convention() {
    let c = RegimeClassifier::new(RegimeThresholds::default(), RegimeMethod::Clustering, 42);
    let labels = c.classify_rows(&clustered_rows());
    assert_eq!(labels[0], RegimeLabel::TrendingUp);
    assert_eq!(labels[1], RegimeLabel::TrendingDown);
    assert_eq!(labels[2], RegimeLabel::HighVol);
    assert_eq!(labels[3], RegimeLabel::Crash);
}

#[test]
/// Verifies out-of-sample prediction: a classifier fitted on one window can
/// label rows it never saw.
fn fitted_clusters_predict_unseen_rows() {
    let c = RegimeClassifier::clustering(RegimeThresholds::default(), 7);
    let fitted = c.fit(&clustered_rows());
    let labels = fitted.predict(&[row(0.11, -0.02, 1.0), row(0.36, -0.33, 0.0)]);
    assert_eq!(labels, vec![RegimeLabel::TrendingUp, RegimeLabel::Crash]);
}

#[test]
/// Verifies method parsing accepts aliases and rejects unknown names.
fn regime_method_parsing() {
    assert_eq!("rule".parse::<RegimeMethod>().unwrap(), RegimeMethod::RuleBased);
    assert_eq!("KMeans".parse::<RegimeMethod>().unwrap(), RegimeMethod::Clustering);
    assert!("hmm".parse::<RegimeMethod>().is_err());
}
