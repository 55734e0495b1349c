// src/classifiers/naive_bayes.rs
use log::debug;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::naive_bayes::bernoulli::{BernoulliNB, BernoulliNBParameters};

use super::params::ParamSet;
use super::{
    ensure_width, to_class_labels, to_dense, validate_training_input, Classifier, ClassifierKind,
};
use crate::error::{LinkerError, LinkerResult};
use crate::models::FeatureTable;

type BernoulliModel = BernoulliNB<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Bernoulli naive Bayes over binarized features.
///
/// The model only yields class labels, so probabilities are 0 or 1.
#[derive(Serialize, Deserialize)]
pub struct NaiveBayesClassifier {
    alpha: f64,
    binarize: f64,
    n_features: usize,
    model: Option<BernoulliModel>,
}

impl NaiveBayesClassifier {
    pub fn new(alpha: f64, binarize: f64) -> Self {
        Self {
            alpha,
            binarize,
            n_features: 0,
            model: None,
        }
    }

    pub fn from_params(params: &ParamSet) -> LinkerResult<Self> {
        let binarize = params.require_f64("binarize", ClassifierKind::NaiveBayes)?;
        let alpha = params.f64("alpha")?.unwrap_or(0.0001);
        Ok(Self::new(alpha, binarize))
    }

    pub fn summary(&self) -> String {
        format!(
            "Bernoulli naive Bayes (alpha={}, binarize={}, fitted={})",
            self.alpha,
            self.binarize,
            self.model.is_some()
        )
    }
}

impl Classifier for NaiveBayesClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::NaiveBayes.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let parameters = BernoulliNBParameters::<f64>::default()
            .with_alpha(self.alpha)
            .with_binarize(self.binarize);
        let model = BernoulliNB::fit(&to_dense(features), &to_class_labels(labels), parameters)
            .map_err(|e| LinkerError::training(e.to_string()))?;
        debug!(
            "Fitted naive Bayes on {} rows x {} features",
            features.len(),
            features.n_features()
        );
        self.n_features = features.n_features();
        self.model = Some(model);
        Ok(())
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| LinkerError::NotFitted(self.name().to_string()))?;
        if features.is_empty() {
            return Ok(Vec::new());
        }
        ensure_width(features, self.n_features)?;
        let predicted = model
            .predict(&to_dense(features))
            .map_err(|e| LinkerError::training(e.to_string()))?;
        Ok(predicted.into_iter().map(|c| c as f64).collect())
    }
}
