// src/classifiers/logistic_regression.rs
use log::debug;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{
    LogisticRegression, LogisticRegressionParameters, LogisticRegressionSolverName,
};

use super::params::ParamSet;
use super::{
    ensure_width, sigmoid, to_class_labels, to_dense, validate_training_input, Classifier,
    ClassifierKind,
};
use crate::error::{LinkerError, LinkerResult};
use crate::models::FeatureTable;

/// L2-regularized logistic regression fitted with smartcore's L-BFGS solver.
/// Only the fitted coefficients are kept, so match probabilities are
/// `sigmoid(w . x + b)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegressionClassifier {
    c: f64,
    weights: Vec<f64>,
    intercept: f64,
    fitted: bool,
}

impl LogisticRegressionClassifier {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            weights: Vec::new(),
            intercept: 0.0,
            fitted: false,
        }
    }

    pub fn from_params(params: &ParamSet) -> LinkerResult<Self> {
        let c = params.f64("c")?.unwrap_or(1.0);
        if c <= 0.0 {
            return Err(LinkerError::InvalidParameter {
                parameter: "c".to_string(),
                reason: format!("must be positive, got {}", c),
            });
        }
        Ok(Self::new(c))
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn summary(&self) -> String {
        let weights: Vec<String> = self.weights.iter().map(|w| format!("{:.4}", w)).collect();
        format!(
            "Logistic regression (C={}): weights=[{}], intercept={:.4}",
            self.c,
            weights.join(", "),
            self.intercept
        )
    }

    fn decision(&self, row: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept
    }
}

/// Flattens a coefficient matrix that may be laid out as (1, n) or (n, 1).
fn flatten(matrix: &DenseMatrix<f64>) -> Vec<f64> {
    let (rows, cols) = matrix.shape();
    let mut values = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            values.push(*matrix.get((r, c)));
        }
    }
    values
}

impl Classifier for LogisticRegressionClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::LogisticRegression.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let parameters = LogisticRegressionParameters::<f64>::default()
            .with_solver(LogisticRegressionSolverName::LBFGS)
            .with_alpha(1.0 / self.c);
        let y = to_class_labels(labels);
        let model = LogisticRegression::fit(&to_dense(features), &y, parameters)
            .map_err(|e| LinkerError::training(e.to_string()))?;

        let weights = flatten(model.coefficients());
        if weights.len() != features.n_features() {
            return Err(LinkerError::training(format!(
                "expected {} coefficients, solver returned {}",
                features.n_features(),
                weights.len()
            )));
        }
        self.intercept = flatten(model.intercept()).first().copied().unwrap_or(0.0);
        self.weights = weights;
        self.fitted = true;
        debug!("{}", self.summary());
        Ok(())
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        if !self.fitted {
            return Err(LinkerError::NotFitted(self.name().to_string()));
        }
        if features.is_empty() {
            return Ok(Vec::new());
        }
        ensure_width(features, self.weights.len())?;
        Ok(features
            .rows()
            .iter()
            .map(|row| sigmoid(self.decision(row)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::{accuracy, separable};

    #[test]
    fn test_separable_data() {
        let (features, labels) = separable(10);
        let mut lr = LogisticRegressionClassifier::new(1.0);
        lr.fit(&features, &labels).unwrap();
        let predicted = lr.predict(&features).unwrap();
        assert_eq!(accuracy(&predicted, &labels), 1.0);

        let probabilities = lr.predict_proba(&features).unwrap();
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(probabilities[0] > probabilities[1]);
    }

    #[test]
    fn test_rejects_non_positive_c() {
        let params = ParamSet::new().with("c", 0.0);
        assert!(LogisticRegressionClassifier::from_params(&params).is_err());
    }
}
