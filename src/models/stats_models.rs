// src/models/stats_models.rs
use serde::{Deserialize, Serialize};

/// Confusion counts for one evaluation fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl ConfusionCounts {
    pub fn from_predictions(predicted: &[bool], actual: &[bool]) -> Self {
        let mut counts = ConfusionCounts::default();
        for (&p, &a) in predicted.iter().zip(actual) {
            match (p, a) {
                (true, true) => counts.true_positives += 1,
                (true, false) => counts.false_positives += 1,
                (false, true) => counts.false_negatives += 1,
                (false, false) => counts.true_negatives += 1,
            }
        }
        counts
    }

    pub fn precision(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
        )
    }

    pub fn recall(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
        )
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Mean and standard deviation of a metric over folds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: var.sqrt(),
        }
    }
}

/// Per-fold metrics plus their summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub classifier: String,
    pub catalog: String,
    pub entity: String,
    pub folds: Vec<ConfusionCounts>,
    pub precision: MetricSummary,
    pub recall: MetricSummary,
    pub f1: MetricSummary,
    pub best_params: Option<serde_json::Value>,
}

impl PerformanceReport {
    pub fn from_folds(
        classifier: &str,
        catalog: &str,
        entity: &str,
        folds: Vec<ConfusionCounts>,
    ) -> Self {
        let collect = |f: fn(&ConfusionCounts) -> f64| folds.iter().map(f).collect::<Vec<_>>();
        let precision = MetricSummary::from_values(&collect(ConfusionCounts::precision));
        let recall = MetricSummary::from_values(&collect(ConfusionCounts::recall));
        let f1 = MetricSummary::from_values(&collect(ConfusionCounts::f1));
        Self {
            classifier: classifier.to_string(),
            catalog: catalog.to_string(),
            entity: entity.to_string(),
            folds,
            precision,
            recall,
            f1,
            best_params: None,
        }
    }

    pub fn get_stats_display(&self) -> String {
        format!(
            "{} on {} {}: precision {:.4} (+/- {:.4}), recall {:.4} (+/- {:.4}), F1 {:.4} (+/- {:.4}) over {} folds",
            self.classifier,
            self.catalog,
            self.entity,
            self.precision.mean,
            self.precision.std,
            self.recall.mean,
            self.recall.std,
            self.f1.mean,
            self.f1.std,
            self.folds.len()
        )
    }
}
