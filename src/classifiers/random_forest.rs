// src/classifiers/random_forest.rs
use log::debug;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier as ForestModel, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::SplitCriterion;

use super::params::ParamSet;
use super::{
    ensure_width, to_class_labels, to_dense, validate_training_input, Classifier, ClassifierKind,
};
use crate::error::{LinkerError, LinkerResult};
use crate::models::FeatureTable;

type Forest = ForestModel<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// How many features each split considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    fn from_params(params: &ParamSet) -> LinkerResult<Self> {
        match params.text("max_features")? {
            None => Ok(MaxFeatures::All),
            Some("sqrt") => Ok(MaxFeatures::Sqrt),
            Some("log2") => Ok(MaxFeatures::Log2),
            Some(other) => Err(LinkerError::InvalidParameter {
                parameter: "max_features".to_string(),
                reason: format!("'{}' is not one of sqrt, log2 or none", other),
            }),
        }
    }

    fn resolve(&self, n_features: usize) -> usize {
        let n = n_features.max(1) as f64;
        let m = match self {
            MaxFeatures::Sqrt => n.sqrt().ceil(),
            MaxFeatures::Log2 => n.log2().floor(),
            MaxFeatures::All => n,
        };
        (m as usize).clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    Entropy,
}

/// Bagged decision trees from smartcore. Like naive Bayes, the forest
/// reports hard votes, so probabilities are 0 or 1.
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_estimators: u16,
    criterion: Criterion,
    max_features: MaxFeatures,
    max_depth: Option<u16>,
    n_features: usize,
    model: Option<Forest>,
}

impl RandomForestClassifier {
    pub fn new(
        n_estimators: u16,
        criterion: Criterion,
        max_features: MaxFeatures,
        max_depth: Option<u16>,
    ) -> Self {
        Self {
            n_estimators,
            criterion,
            max_features,
            max_depth,
            n_features: 0,
            model: None,
        }
    }

    pub fn from_params(params: &ParamSet) -> LinkerResult<Self> {
        let n_estimators = params.usize("n_estimators")?.unwrap_or(500);
        let n_estimators = u16::try_from(n_estimators.max(1)).map_err(|_| {
            LinkerError::InvalidParameter {
                parameter: "n_estimators".to_string(),
                reason: format!("{} trees is more than {}", n_estimators, u16::MAX),
            }
        })?;
        let criterion = match params.text("criterion")?.unwrap_or("entropy") {
            "gini" => Criterion::Gini,
            "entropy" => Criterion::Entropy,
            other => {
                return Err(LinkerError::InvalidParameter {
                    parameter: "criterion".to_string(),
                    reason: format!("'{}' is not one of gini, entropy", other),
                })
            }
        };
        let max_depth = params
            .usize("max_depth")?
            .map(|d| d.min(u16::MAX as usize) as u16);
        Ok(Self::new(
            n_estimators,
            criterion,
            MaxFeatures::from_params(params)?,
            max_depth,
        ))
    }

    pub fn summary(&self) -> String {
        format!(
            "Random forest: {} trees, criterion={:?}, max_features={:?}, max_depth={:?}, fitted={}",
            self.n_estimators,
            self.criterion,
            self.max_features,
            self.max_depth,
            self.model.is_some()
        )
    }
}

impl Classifier for RandomForestClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::RandomForest.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let criterion = match self.criterion {
            Criterion::Gini => SplitCriterion::Gini,
            Criterion::Entropy => SplitCriterion::Entropy,
        };
        let mut parameters = RandomForestClassifierParameters::default()
            .with_n_trees(self.n_estimators)
            .with_criterion(criterion)
            .with_m(self.max_features.resolve(features.n_features()));
        if let Some(depth) = self.max_depth {
            parameters = parameters.with_max_depth(depth);
        }
        let model = Forest::fit(&to_dense(features), &to_class_labels(labels), parameters)
            .map_err(|e| LinkerError::training(e.to_string()))?;
        debug!(
            "Fitted random forest with {} trees on {} rows",
            self.n_estimators,
            features.len()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::{accuracy, separable};

    #[test]
    fn test_separable_data() {
        let (features, labels) = separable(10);
        let mut forest =
            RandomForestClassifier::new(25, Criterion::Gini, MaxFeatures::Sqrt, Some(4));
        forest.fit(&features, &labels).unwrap();
        assert_eq!(accuracy(&forest.predict(&features).unwrap(), &labels), 1.0);
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(5), 3);
        assert_eq!(MaxFeatures::Log2.resolve(5), 2);
        assert_eq!(MaxFeatures::All.resolve(5), 5);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
    }

    #[test]
    fn test_params() {
        let params = ParamSet::new()
            .with("n_estimators", 100i64)
            .with("criterion", "gini")
            .with("max_features", "log2");
        let forest = RandomForestClassifier::from_params(&params).unwrap();
        assert_eq!(forest.n_estimators, 100);
        assert_eq!(forest.criterion, Criterion::Gini);
        assert_eq!(forest.max_features, MaxFeatures::Log2);

        let bad = ParamSet::new().with("criterion", "mse");
        assert!(RandomForestClassifier::from_params(&bad).is_err());
    }
}
