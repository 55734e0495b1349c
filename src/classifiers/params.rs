// src/classifiers/params.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::classifiers::ClassifierKind;
use crate::error::{LinkerError, LinkerResult};

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Dims(Vec<usize>),
    Null,
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Dims(d) => write!(f, "{:?}", d),
            ParamValue::Null => f.write_str("none"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<Vec<usize>> for ParamValue {
    fn from(v: Vec<usize>) -> Self {
        ParamValue::Dims(v)
    }
}

/// Named hyperparameters for one classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// This set with every key of `overrides` replaced.
    pub fn merged(&self, overrides: &ParamSet) -> ParamSet {
        let mut merged = self.clone();
        for (key, value) in overrides.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    fn invalid(key: &str, value: &ParamValue, expected: &str) -> LinkerError {
        LinkerError::InvalidParameter {
            parameter: key.to_string(),
            reason: format!("expected {}, found {}", expected, value),
        }
    }

    pub fn f64(&self, key: &str) -> LinkerResult<Option<f64>> {
        match self.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::Float(v)) => Ok(Some(*v)),
            Some(ParamValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(Self::invalid(key, other, "a number")),
        }
    }

    pub fn usize(&self, key: &str) -> LinkerResult<Option<usize>> {
        match self.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(Some(*v as usize)),
            Some(other) => Err(Self::invalid(key, other, "a non-negative integer")),
        }
    }

    pub fn text(&self, key: &str) -> LinkerResult<Option<&str>> {
        match self.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::Text(v)) => Ok(Some(v.as_str())),
            Some(other) => Err(Self::invalid(key, other, "a name")),
        }
    }

    pub fn dims(&self, key: &str) -> LinkerResult<Option<Vec<usize>>> {
        match self.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::Dims(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::invalid(key, other, "a list of layer sizes")),
        }
    }

    /// A required number, missing keys name the classifier that needs it.
    pub fn require_f64(&self, key: &str, classifier: ClassifierKind) -> LinkerResult<f64> {
        self.f64(key)?.ok_or_else(|| LinkerError::MissingParameter {
            classifier: classifier.name().to_string(),
            parameter: key.to_string(),
        })
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Candidate values per hyperparameter.
pub type ParamGrid = BTreeMap<&'static str, Vec<ParamValue>>;

fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Float(*v)).collect()
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Int(*v)).collect()
}

fn names(values: &[&str]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Text(v.to_string())).collect()
}

/// Default hyperparameters. Naive Bayes deliberately has no binarization
/// threshold: callers must supply one.
pub fn default_params(kind: ClassifierKind) -> ParamSet {
    match kind {
        ClassifierKind::NaiveBayes => ParamSet::new().with("alpha", 0.0001),
        ClassifierKind::LogisticRegression => ParamSet::new().with("c", 1.0),
        ClassifierKind::LinearSupportVectorMachine => ParamSet::new()
            .with("c", 1.0)
            .with("tol", 0.001)
            .with("max_iter", 1000i64),
        ClassifierKind::SupportVectorMachine => ParamSet::new()
            .with("c", 1.0)
            .with("kernel", "rbf")
            .with("gamma", "scale")
            .with("max_iter", 5i64),
        ClassifierKind::RandomForest => ParamSet::new()
            .with("n_estimators", 500i64)
            .with("criterion", "entropy")
            .with("max_features", ParamValue::Null)
            .with("max_depth", ParamValue::Null),
        ClassifierKind::SingleLayerPerceptron => ParamSet::new()
            .with("epochs", 1000i64)
            .with("batch_size", 256i64)
            .with("learning_rate", 0.001)
            .with("optimizer", "adam"),
        ClassifierKind::MultiLayerPerceptron => ParamSet::new()
            .with("epochs", 1000i64)
            .with("batch_size", 512i64)
            .with("learning_rate", 0.001)
            .with("hidden_activation", "selu")
            .with("optimizer", "adam")
            .with("hidden_layer_dims", vec![128usize, 32]),
        ClassifierKind::VotingClassifier => ParamSet::new().with("voting", "soft"),
        ClassifierKind::GatedClassifier | ClassifierKind::StackedClassifier => ParamSet::new()
            .with("folds", 2i64)
            .with("meta_layer", ClassifierKind::SingleLayerPerceptron.name()),
    }
}

/// The search grid explored by hyperparameter tuning.
pub fn parameter_grid(kind: ClassifierKind) -> ParamGrid {
    let mut grid = ParamGrid::new();
    match kind {
        ClassifierKind::NaiveBayes => {
            grid.insert("alpha", floats(&[0.0001, 0.001, 0.01, 0.1, 1.0]));
            grid.insert(
                "binarize",
                floats(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]),
            );
        }
        ClassifierKind::LogisticRegression => {
            grid.insert("c", floats(&[0.01, 0.1, 1.0, 10.0, 100.0]));
        }
        ClassifierKind::LinearSupportVectorMachine => {
            grid.insert("tol", floats(&[1e-3, 1e-4, 1e-5]));
            grid.insert("max_iter", ints(&[1000, 2000]));
            grid.insert("c", floats(&[0.01, 0.1, 1.0, 10.0, 100.0]));
        }
        ClassifierKind::SupportVectorMachine => {
            grid.insert("c", floats(&[0.01, 0.1, 1.0, 10.0]));
            grid.insert("kernel", names(&["linear", "poly", "rbf", "sigmoid"]));
            grid.insert("gamma", names(&["auto", "scale"]));
        }
        ClassifierKind::RandomForest => {
            grid.insert("n_estimators", ints(&[100, 200, 350, 500]));
            grid.insert("criterion", names(&["gini", "entropy"]));
            grid.insert(
                "max_features",
                vec![
                    ParamValue::from("sqrt"),
                    ParamValue::from("log2"),
                    ParamValue::Null,
                ],
            );
        }
        ClassifierKind::SingleLayerPerceptron => {
            grid.insert("epochs", ints(&[100, 1000, 2000, 3000]));
            grid.insert("batch_size", ints(&[256, 512, 1024, 2048]));
            grid.insert("optimizer", names(&["adam", "adamw", "sgd"]));
        }
        ClassifierKind::MultiLayerPerceptron => {
            grid.insert("epochs", ints(&[1000, 2000]));
            grid.insert("batch_size", ints(&[512]));
            grid.insert("hidden_activation", names(&["relu", "tanh", "selu"]));
            grid.insert("optimizer", names(&["adam", "adamw", "sgd"]));
            grid.insert(
                "hidden_layer_dims",
                vec![
                    ParamValue::Dims(vec![128, 32]),
                    ParamValue::Dims(vec![256, 128, 32]),
                    ParamValue::Dims(vec![128, 32, 32]),
                ],
            );
        }
        ClassifierKind::VotingClassifier => {
            grid.insert("voting", names(&["soft"]));
        }
        ClassifierKind::GatedClassifier => {
            grid.insert("folds", ints(&[2, 3, 5]));
        }
        ClassifierKind::StackedClassifier => {
            grid.insert("folds", ints(&[2, 3, 5]));
            grid.insert(
                "meta_layer",
                names(&[
                    ClassifierKind::SingleLayerPerceptron.name(),
                    ClassifierKind::MultiLayerPerceptron.name(),
                    ClassifierKind::LogisticRegression.name(),
                ]),
            );
        }
    }
    grid
}

/// Every combination of the grid, in a stable order.
pub fn expand_grid(grid: &ParamGrid) -> Vec<ParamSet> {
    let mut points = vec![ParamSet::new()];
    for (key, values) in grid {
        let mut next = Vec::with_capacity(points.len() * values.len());
        for point in &points {
            for value in values {
                next.push(point.clone().with(key, value.clone()));
            }
        }
        points = next;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_grid_counts() {
        assert_eq!(
            expand_grid(&parameter_grid(ClassifierKind::NaiveBayes)).len(),
            45
        );
        assert_eq!(
            expand_grid(&parameter_grid(ClassifierKind::RandomForest)).len(),
            24
        );
        assert_eq!(expand_grid(&ParamGrid::new()), vec![ParamSet::new()]);
    }

    #[test]
    fn test_every_kind_has_defaults_and_grid() {
        for kind in ClassifierKind::ALL {
            assert!(!default_params(kind).is_empty(), "{:?}", kind);
            assert!(!parameter_grid(kind).is_empty(), "{:?}", kind);
        }
    }

    #[test]
    fn test_naive_bayes_binarize_is_required() {
        let params = default_params(ClassifierKind::NaiveBayes);
        let err = params
            .require_f64("binarize", ClassifierKind::NaiveBayes)
            .unwrap_err();
        assert!(matches!(err, LinkerError::MissingParameter { .. }));
    }

    #[test]
    fn test_typed_accessors() {
        let params = ParamSet::new()
            .with("c", 1i64)
            .with("kernel", "rbf")
            .with("dims", vec![4usize, 2]);
        assert_eq!(params.f64("c").unwrap(), Some(1.0));
        assert_eq!(params.text("kernel").unwrap(), Some("rbf"));
        assert_eq!(params.dims("dims").unwrap(), Some(vec![4, 2]));
        assert!(params.usize("kernel").is_err());
        assert_eq!(params.usize("absent").unwrap(), None);
    }

    #[test]
    fn test_param_set_json_round_trip() {
        let params = default_params(ClassifierKind::MultiLayerPerceptron);
        let json = serde_json::to_string(&params).unwrap();
        let back: ParamSet = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
