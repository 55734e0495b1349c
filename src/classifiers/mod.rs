// src/classifiers/mod.rs
pub mod ensemble;
pub mod logistic_regression;
pub mod monitor;
pub mod naive_bayes;
pub mod neural_network;
pub mod params;
pub mod random_forest;
pub mod svm;
pub mod trained;
pub mod validation;

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;
use std::str::FromStr;

use crate::error::{LinkerError, LinkerResult};
use crate::models::FeatureTable;
use crate::utils::constants::{CONFIDENCE_THRESHOLD, DEFAULT_SEED};

pub use ensemble::{GatedClassifier, StackedClassifier, VotingClassifier};
pub use logistic_regression::LogisticRegressionClassifier;
pub use naive_bayes::NaiveBayesClassifier;
pub use neural_network::{NetworkSettings, PerceptronClassifier};
pub use params::{default_params, expand_grid, parameter_grid, ParamGrid, ParamSet, ParamValue};
pub use random_forest::RandomForestClassifier;
pub use svm::{KernelSvmClassifier, LinearSvmClassifier};
pub use trained::TrainedModel;

/// A binary match/non-match classifier over a feature table.
pub trait Classifier {
    fn name(&self) -> &'static str;

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()>;

    /// Probability of a match for each row, in row order.
    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>>;

    fn predict(&self, features: &FeatureTable) -> LinkerResult<Vec<bool>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| p >= CONFIDENCE_THRESHOLD)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    NaiveBayes,
    LogisticRegression,
    LinearSupportVectorMachine,
    SupportVectorMachine,
    RandomForest,
    SingleLayerPerceptron,
    MultiLayerPerceptron,
    VotingClassifier,
    GatedClassifier,
    StackedClassifier,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 10] = [
        ClassifierKind::NaiveBayes,
        ClassifierKind::LogisticRegression,
        ClassifierKind::LinearSupportVectorMachine,
        ClassifierKind::SupportVectorMachine,
        ClassifierKind::RandomForest,
        ClassifierKind::SingleLayerPerceptron,
        ClassifierKind::MultiLayerPerceptron,
        ClassifierKind::VotingClassifier,
        ClassifierKind::GatedClassifier,
        ClassifierKind::StackedClassifier,
    ];

    /// Base models combined by every ensemble.
    pub const ENSEMBLE_BASES: [ClassifierKind; 5] = [
        ClassifierKind::NaiveBayes,
        ClassifierKind::LogisticRegression,
        ClassifierKind::RandomForest,
        ClassifierKind::SingleLayerPerceptron,
        ClassifierKind::MultiLayerPerceptron,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::NaiveBayes => "naive_bayes",
            ClassifierKind::LogisticRegression => "logistic_regression",
            ClassifierKind::LinearSupportVectorMachine => "linear_support_vector_machines",
            ClassifierKind::SupportVectorMachine => "support_vector_machines",
            ClassifierKind::RandomForest => "random_forest",
            ClassifierKind::SingleLayerPerceptron => "single_layer_perceptron",
            ClassifierKind::MultiLayerPerceptron => "multi_layer_perceptron",
            ClassifierKind::VotingClassifier => "voting_classifier",
            ClassifierKind::GatedClassifier => "gated_classifier",
            ClassifierKind::StackedClassifier => "stacked_classifier",
        }
    }

    pub fn shorthand(&self) -> &'static str {
        match self {
            ClassifierKind::NaiveBayes => "nb",
            ClassifierKind::LogisticRegression => "lr",
            ClassifierKind::LinearSupportVectorMachine => "lsvm",
            ClassifierKind::SupportVectorMachine => "svm",
            ClassifierKind::RandomForest => "rf",
            ClassifierKind::SingleLayerPerceptron => "slp",
            ClassifierKind::MultiLayerPerceptron => "mlp",
            ClassifierKind::VotingClassifier => "vc",
            ClassifierKind::GatedClassifier => "gc",
            ClassifierKind::StackedClassifier => "sc",
        }
    }

    pub fn is_ensemble(&self) -> bool {
        matches!(
            self,
            ClassifierKind::VotingClassifier
                | ClassifierKind::GatedClassifier
                | ClassifierKind::StackedClassifier
        )
    }

    pub fn is_neural(&self) -> bool {
        matches!(
            self,
            ClassifierKind::SingleLayerPerceptron | ClassifierKind::MultiLayerPerceptron
        )
    }

    fn allowed() -> String {
        Self::ALL
            .iter()
            .map(|k| format!("{} ({})", k.name(), k.shorthand()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for ClassifierKind {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == wanted || k.shorthand() == wanted)
            .ok_or_else(|| LinkerError::UnknownClassifier {
                value: s.to_string(),
                allowed: Self::allowed(),
            })
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to build a fresh, unfitted classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierOptions {
    /// Naive Bayes binarization threshold; also read from `params`.
    pub binarize: Option<f64>,
    /// Overrides applied on top of the kind's defaults.
    pub params: ParamSet,
    pub seed: u64,
    pub network: NetworkSettings,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            binarize: None,
            params: ParamSet::new(),
            seed: DEFAULT_SEED,
            network: NetworkSettings::default(),
        }
    }
}

impl ClassifierOptions {
    /// Defaults for `kind` merged with the caller's overrides.
    pub fn effective_params(&self, kind: ClassifierKind) -> ParamSet {
        let mut params = default_params(kind).merged(&self.params);
        if let Some(binarize) = self.binarize {
            if kind == ClassifierKind::NaiveBayes && params.get("binarize").is_none() {
                params.insert("binarize", binarize);
            }
        }
        params
    }

    /// Options for an ensemble's base models: same seed and network settings,
    /// kind-specific defaults, binarization carried over.
    pub fn for_base(&self) -> ClassifierOptions {
        let binarize = match self.binarize {
            Some(b) => Some(b),
            None => self.params.f64("binarize").ok().flatten(),
        };
        ClassifierOptions {
            binarize,
            params: ParamSet::new(),
            seed: self.seed,
            network: self.network.clone(),
        }
    }
}

/// Rejects inputs no classifier can be fitted on.
pub fn validate_training_input(
    classifier: &str,
    features: &FeatureTable,
    labels: &[bool],
) -> LinkerResult<()> {
    if features.is_empty() {
        return Err(LinkerError::training(format!(
            "{}: cannot fit on zero rows",
            classifier
        )));
    }
    if features.len() != labels.len() {
        return Err(LinkerError::LengthMismatch {
            left: features.len(),
            right: labels.len(),
        });
    }
    let positives = labels.iter().filter(|&&l| l).count();
    if positives == 0 || positives == labels.len() {
        return Err(LinkerError::training(format!(
            "{}: training labels contain a single class ({} positives out of {})",
            classifier,
            positives,
            labels.len()
        )));
    }
    Ok(())
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn to_dense(features: &FeatureTable) -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&features.rows().to_vec())
}

pub(crate) fn to_class_labels(labels: &[bool]) -> Vec<u32> {
    labels.iter().map(|&l| u32::from(l)).collect()
}

/// Errors unless the table has the number of features the model was fitted on.
pub(crate) fn ensure_width(features: &FeatureTable, expected: usize) -> LinkerResult<()> {
    if features.n_features() != expected {
        return Err(LinkerError::LengthMismatch {
            left: expected,
            right: features.n_features(),
        });
    }
    Ok(())
}

/// Any fitted or unfitted classifier, serializable as one tagged value.
#[derive(Serialize, Deserialize)]
#[serde(tag = "classifier", rename_all = "snake_case")]
pub enum ClassifierModel {
    NaiveBayes(NaiveBayesClassifier),
    LogisticRegression(LogisticRegressionClassifier),
    LinearSvm(LinearSvmClassifier),
    KernelSvm(KernelSvmClassifier),
    RandomForest(RandomForestClassifier),
    Perceptron(PerceptronClassifier),
    Voting(VotingClassifier),
    Gated(GatedClassifier),
    Stacked(StackedClassifier),
}

impl ClassifierModel {
    fn inner(&self) -> &dyn Classifier {
        match self {
            ClassifierModel::NaiveBayes(c) => c,
            ClassifierModel::LogisticRegression(c) => c,
            ClassifierModel::LinearSvm(c) => c,
            ClassifierModel::KernelSvm(c) => c,
            ClassifierModel::RandomForest(c) => c,
            ClassifierModel::Perceptron(c) => c,
            ClassifierModel::Voting(c) => c,
            ClassifierModel::Gated(c) => c,
            ClassifierModel::Stacked(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            ClassifierModel::NaiveBayes(c) => c,
            ClassifierModel::LogisticRegression(c) => c,
            ClassifierModel::LinearSvm(c) => c,
            ClassifierModel::KernelSvm(c) => c,
            ClassifierModel::RandomForest(c) => c,
            ClassifierModel::Perceptron(c) => c,
            ClassifierModel::Voting(c) => c,
            ClassifierModel::Gated(c) => c,
            ClassifierModel::Stacked(c) => c,
        }
    }

    /// Short human-readable description of the fitted state.
    pub fn summary(&self) -> String {
        match self {
            ClassifierModel::NaiveBayes(c) => c.summary(),
            ClassifierModel::LogisticRegression(c) => c.summary(),
            ClassifierModel::LinearSvm(c) => c.summary(),
            ClassifierModel::KernelSvm(c) => c.summary(),
            ClassifierModel::RandomForest(c) => c.summary(),
            ClassifierModel::Perceptron(c) => c.summary(),
            ClassifierModel::Voting(c) => c.summary(),
            ClassifierModel::Gated(c) => c.summary(),
            ClassifierModel::Stacked(c) => c.summary(),
        }
    }
}

impl Classifier for ClassifierModel {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        self.inner_mut().fit(features, labels)
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        self.inner().predict_proba(features)
    }
}

/// Builds an unfitted classifier of the given kind.
pub fn build_classifier(
    kind: ClassifierKind,
    options: &ClassifierOptions,
) -> LinkerResult<ClassifierModel> {
    let params = options.effective_params(kind);
    let model = match kind {
        ClassifierKind::NaiveBayes => {
            ClassifierModel::NaiveBayes(NaiveBayesClassifier::from_params(&params)?)
        }
        ClassifierKind::LogisticRegression => ClassifierModel::LogisticRegression(
            LogisticRegressionClassifier::from_params(&params)?,
        ),
        ClassifierKind::LinearSupportVectorMachine => ClassifierModel::LinearSvm(
            LinearSvmClassifier::from_params(&params, options.seed)?,
        ),
        ClassifierKind::SupportVectorMachine => ClassifierModel::KernelSvm(
            KernelSvmClassifier::from_params(&params, options.seed)?,
        ),
        ClassifierKind::RandomForest => {
            ClassifierModel::RandomForest(RandomForestClassifier::from_params(&params)?)
        }
        ClassifierKind::SingleLayerPerceptron | ClassifierKind::MultiLayerPerceptron => {
            ClassifierModel::Perceptron(PerceptronClassifier::from_params(
                kind,
                &params,
                options.network.clone(),
                options.seed,
            )?)
        }
        ClassifierKind::VotingClassifier => ClassifierModel::Voting(VotingClassifier::from_params(
            &params,
            &ClassifierKind::ENSEMBLE_BASES,
            options,
        )?),
        ClassifierKind::GatedClassifier => ClassifierModel::Gated(GatedClassifier::from_params(
            &params,
            &ClassifierKind::ENSEMBLE_BASES,
            options,
        )?),
        ClassifierKind::StackedClassifier => ClassifierModel::Stacked(
            StackedClassifier::from_params(&params, &ClassifierKind::ENSEMBLE_BASES, options)?,
        ),
    };
    Ok(model)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{CandidatePair, FeatureSchema, FeatureTable};

    /// Linearly separable two-feature data: matches sit near (0.9, 0.8),
    /// non-matches near (0.1, 0.2).
    pub fn separable(n_per_class: usize) -> (FeatureTable, Vec<bool>) {
        let schema = FeatureSchema::new(vec!["a".to_string(), "b".to_string()]);
        let mut index = Vec::new();
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            let jitter = (i % 5) as f64 * 0.02;
            index.push(CandidatePair::new(format!("Q{}", i), format!("p{}", i)));
            rows.push(vec![0.9 - jitter, 0.8 + jitter]);
            labels.push(true);
            index.push(CandidatePair::new(format!("Q{}", i), format!("n{}", i)));
            rows.push(vec![0.1 + jitter, 0.2 - jitter]);
            labels.push(false);
        }
        let table = FeatureTable::from_rows(schema, index, rows).expect("consistent rows");
        (table, labels)
    }

    pub fn accuracy(predicted: &[bool], labels: &[bool]) -> f64 {
        let correct = predicted
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
        correct as f64 / labels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureSchema;

    #[test]
    fn test_kind_parses_names_and_shorthands() {
        for kind in ClassifierKind::ALL {
            assert_eq!(kind.name().parse::<ClassifierKind>().unwrap(), kind);
            assert_eq!(kind.shorthand().parse::<ClassifierKind>().unwrap(), kind);
        }
        assert_eq!(
            "RF".parse::<ClassifierKind>().unwrap(),
            ClassifierKind::RandomForest
        );
    }

    #[test]
    fn test_unknown_kind_lists_allowed() {
        match "perceptron".parse::<ClassifierKind>() {
            Err(LinkerError::UnknownClassifier { value, allowed }) => {
                assert_eq!(value, "perceptron");
                assert!(allowed.contains("naive_bayes (nb)"));
                assert!(allowed.contains("stacked_classifier (sc)"));
            }
            other => panic!("unexpected {:?}", other.map(|k| k.name())),
        }
    }

    #[test]
    fn test_validate_training_input() {
        let (features, labels) = test_support::separable(3);
        assert!(validate_training_input("x", &features, &labels).is_ok());

        let one_class = vec![true; labels.len()];
        assert!(matches!(
            validate_training_input("x", &features, &one_class),
            Err(LinkerError::Training(_))
        ));

        let empty = FeatureTable::new(FeatureSchema::new(vec!["a".into()]));
        assert!(matches!(
            validate_training_input("x", &empty, &[]),
            Err(LinkerError::Training(_))
        ));

        assert!(matches!(
            validate_training_input("x", &features, &labels[1..]),
            Err(LinkerError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_naive_bayes_without_binarize_is_missing_parameter() {
        let err = build_classifier(ClassifierKind::NaiveBayes, &ClassifierOptions::default())
            .err()
            .expect("binarize is required");
        assert!(matches!(err, LinkerError::MissingParameter { .. }));

        let options = ClassifierOptions {
            binarize: Some(0.5),
            ..ClassifierOptions::default()
        };
        assert!(build_classifier(ClassifierKind::NaiveBayes, &options).is_ok());
    }

    #[test]
    fn test_effective_params_merge_overrides() {
        let options = ClassifierOptions {
            params: ParamSet::new().with("c", 10.0),
            ..ClassifierOptions::default()
        };
        let params = options.effective_params(ClassifierKind::LinearSupportVectorMachine);
        assert_eq!(params.f64("c").unwrap(), Some(10.0));
        assert_eq!(params.usize("max_iter").unwrap(), Some(1000));
    }
}
