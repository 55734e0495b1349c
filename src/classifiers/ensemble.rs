// src/classifiers/ensemble.rs
use candle_nn::{ops::softmax, Module, VarMap};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::neural_network::{
    bce_with_probabilities, labels_to_tensor, rows_to_tensor, Activation, DenseLayer, Network,
    NetworkParams, NetworkSettings, TrainingRun,
};
use super::params::{default_params, ParamSet};
use super::validation::{complement, stratified_k_fold};
use super::{
    build_classifier, validate_training_input, Classifier, ClassifierKind, ClassifierModel,
    ClassifierOptions,
};
use crate::error::{LinkerError, LinkerResult};
use crate::models::{FeatureSchema, FeatureTable};
use crate::utils::candle::device;
use crate::utils::constants::DEFAULT_ENSEMBLE_FOLDS;

// Keeps gate probabilities away from 0 and 1 so the log loss stays finite.
const PROBABILITY_EPSILON: f64 = 1e-6;

fn check_bases(kinds: &[ClassifierKind]) -> LinkerResult<()> {
    if kinds.is_empty() {
        return Err(LinkerError::InvalidParameter {
            parameter: "bases".to_string(),
            reason: "an ensemble needs at least one base classifier".to_string(),
        });
    }
    if let Some(nested) = kinds.iter().find(|k| k.is_ensemble()) {
        return Err(LinkerError::NotImplemented(format!(
            "{} cannot be used as an ensemble base",
            nested
        )));
    }
    Ok(())
}

fn build_bases(
    kinds: &[ClassifierKind],
    options: &ClassifierOptions,
) -> LinkerResult<Vec<ClassifierModel>> {
    kinds
        .iter()
        .map(|kind| build_classifier(*kind, options))
        .collect()
}

fn folds_param(params: &ParamSet) -> LinkerResult<usize> {
    let folds = params.usize("folds")?.unwrap_or(DEFAULT_ENSEMBLE_FOLDS);
    if folds < 2 {
        return Err(LinkerError::InvalidParameter {
            parameter: "folds".to_string(),
            reason: format!("need at least 2 folds, got {}", folds),
        });
    }
    Ok(folds)
}

fn meta_kind_param(params: &ParamSet) -> LinkerResult<ClassifierKind> {
    params
        .text("meta_layer")?
        .unwrap_or(ClassifierKind::SingleLayerPerceptron.name())
        .parse()
}

fn fit_all(
    bases: &mut [ClassifierModel],
    features: &FeatureTable,
    labels: &[bool],
) -> LinkerResult<()> {
    for base in bases.iter_mut() {
        info!("Fitting ensemble base {}", base.name());
        base.fit(features, labels)?;
    }
    Ok(())
}

/// Row-major matrix of base-model probabilities, one column per base.
fn base_probabilities(
    bases: &[ClassifierModel],
    features: &FeatureTable,
) -> LinkerResult<Vec<Vec<f64>>> {
    let mut rows = vec![Vec::with_capacity(bases.len()); features.len()];
    for base in bases {
        for (row, p) in rows.iter_mut().zip(base.predict_proba(features)?) {
            row.push(p);
        }
    }
    Ok(rows)
}

/// Probabilities each base assigns to rows it was not trained on, gathered
/// over stratified folds.
fn out_of_fold_probabilities(
    kinds: &[ClassifierKind],
    options: &ClassifierOptions,
    features: &FeatureTable,
    labels: &[bool],
    folds: usize,
) -> LinkerResult<Vec<Vec<f64>>> {
    let mut probabilities = vec![vec![0.0; kinds.len()]; features.len()];
    for (fold, test_rows) in stratified_k_fold(labels, folds, options.seed)?
        .into_iter()
        .enumerate()
    {
        let train_rows = complement(features.len(), &test_rows);
        let train = features.select(&train_rows);
        let train_labels: Vec<bool> = train_rows.iter().map(|&i| labels[i]).collect();
        let test = features.select(&test_rows);
        debug!(
            "Out-of-fold round {}/{}: {} train rows, {} held-out rows",
            fold + 1,
            folds,
            train_rows.len(),
            test_rows.len()
        );
        for (column, kind) in kinds.iter().enumerate() {
            let mut model = build_classifier(*kind, options)?;
            model.fit(&train, &train_labels)?;
            for (&row, p) in test_rows.iter().zip(model.predict_proba(&test)?) {
                probabilities[row][column] = p;
            }
        }
    }
    Ok(probabilities)
}

fn names(kinds: &[ClassifierKind]) -> String {
    kinds
        .iter()
        .map(|k| k.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voting {
    Soft,
    Hard,
}

/// Averages base probabilities (soft) or base votes (hard).
#[derive(Serialize, Deserialize)]
pub struct VotingClassifier {
    voting: Voting,
    base_kinds: Vec<ClassifierKind>,
    bases: Vec<ClassifierModel>,
}

impl VotingClassifier {
    pub fn new(
        voting: Voting,
        kinds: &[ClassifierKind],
        options: &ClassifierOptions,
    ) -> LinkerResult<Self> {
        check_bases(kinds)?;
        Ok(Self {
            voting,
            base_kinds: kinds.to_vec(),
            bases: build_bases(kinds, &options.for_base())?,
        })
    }

    pub fn from_params(
        params: &ParamSet,
        kinds: &[ClassifierKind],
        options: &ClassifierOptions,
    ) -> LinkerResult<Self> {
        let voting = match params.text("voting")?.unwrap_or("soft") {
            "soft" => Voting::Soft,
            "hard" => Voting::Hard,
            other => {
                return Err(LinkerError::InvalidParameter {
                    parameter: "voting".to_string(),
                    reason: format!("'{}' is not one of soft, hard", other),
                })
            }
        };
        Self::new(voting, kinds, options)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Voting classifier ({:?}) over [{}]",
            self.voting,
            names(&self.base_kinds)
        )];
        lines.extend(self.bases.iter().map(|b| format!("  - {}", b.summary())));
        lines.join("\n")
    }
}

impl Classifier for VotingClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::VotingClassifier.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        fit_all(&mut self.bases, features, labels)
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        let count = self.bases.len() as f64;
        Ok(base_probabilities(&self.bases, features)?
            .into_iter()
            .map(|row| combine_votes(self.voting, &row, count))
            .collect())
    }
}

/// Score of one row. Hard voting returns the share of bases voting for a
/// match; a split vote (exactly half) falls back to the soft average so an
/// even number of bases cannot turn a tie into a link.
fn combine_votes(voting: Voting, row: &[f64], count: f64) -> f64 {
    let soft = row.iter().sum::<f64>() / count;
    match voting {
        Voting::Soft => soft,
        Voting::Hard => {
            let share = row.iter().filter(|&&p| p >= 0.5).count() as f64 / count;
            if share == 0.5 {
                soft
            } else {
                share
            }
        }
    }
}

/// A meta classifier trained on out-of-fold base probabilities.
#[derive(Serialize, Deserialize)]
pub struct StackedClassifier {
    folds: usize,
    base_kinds: Vec<ClassifierKind>,
    base_options: ClassifierOptions,
    bases: Vec<ClassifierModel>,
    meta_kind: ClassifierKind,
    meta: Box<ClassifierModel>,
}

impl StackedClassifier {
    pub fn new(
        folds: usize,
        kinds: &[ClassifierKind],
        meta_kind: ClassifierKind,
        options: &ClassifierOptions,
    ) -> LinkerResult<Self> {
        check_bases(kinds)?;
        match meta_kind {
            ClassifierKind::SingleLayerPerceptron
            | ClassifierKind::MultiLayerPerceptron
            | ClassifierKind::LogisticRegression => {}
            other => {
                return Err(LinkerError::NotImplemented(format!(
                    "{} is not available as a stacking meta layer",
                    other
                )))
            }
        }
        let base_options = options.for_base();
        Ok(Self {
            folds,
            base_kinds: kinds.to_vec(),
            bases: build_bases(kinds, &base_options)?,
            meta_kind,
            meta: Box::new(build_classifier(meta_kind, &base_options)?),
            base_options,
        })
    }

    pub fn from_params(
        params: &ParamSet,
        kinds: &[ClassifierKind],
        options: &ClassifierOptions,
    ) -> LinkerResult<Self> {
        Self::new(folds_param(params)?, kinds, meta_kind_param(params)?, options)
    }

    fn meta_schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.base_kinds.iter().map(|k| k.name().to_string()).collect())
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Stacked classifier ({} folds) over [{}], meta layer {}",
            self.folds,
            names(&self.base_kinds),
            self.meta.summary()
        )];
        lines.extend(self.bases.iter().map(|b| format!("  - {}", b.summary())));
        lines.join("\n")
    }
}

impl Classifier for StackedClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::StackedClassifier.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let out_of_fold = out_of_fold_probabilities(
            &self.base_kinds,
            &self.base_options,
            features,
            labels,
            self.folds,
        )?;
        let meta_features =
            FeatureTable::from_rows(self.meta_schema(), features.index().to_vec(), out_of_fold)?;
        info!("Fitting stacking meta layer {}", self.meta_kind);
        self.meta.fit(&meta_features, labels)?;
        fit_all(&mut self.bases, features, labels)
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let meta_features = FeatureTable::from_rows(
            self.meta_schema(),
            features.index().to_vec(),
            base_probabilities(&self.bases, features)?,
        )?;
        self.meta.predict_proba(&meta_features)
    }
}

/// A softmax gate over the input features that weighs base probabilities
/// per row. The gate is fitted on out-of-fold base probabilities.
#[derive(Serialize, Deserialize)]
pub struct GatedClassifier {
    folds: usize,
    base_kinds: Vec<ClassifierKind>,
    base_options: ClassifierOptions,
    bases: Vec<ClassifierModel>,
    gate_params: NetworkParams,
    gate: Vec<DenseLayer>,
}

impl GatedClassifier {
    pub fn new(
        folds: usize,
        kinds: &[ClassifierKind],
        gate_params: NetworkParams,
        options: &ClassifierOptions,
    ) -> LinkerResult<Self> {
        check_bases(kinds)?;
        let base_options = options.for_base();
        Ok(Self {
            folds,
            base_kinds: kinds.to_vec(),
            bases: build_bases(kinds, &base_options)?,
            gate_params,
            gate: Vec::new(),
            base_options,
        })
    }

    pub fn from_params(
        params: &ParamSet,
        kinds: &[ClassifierKind],
        options: &ClassifierOptions,
    ) -> LinkerResult<Self> {
        let meta_kind = meta_kind_param(params)?;
        if meta_kind != ClassifierKind::SingleLayerPerceptron {
            return Err(LinkerError::NotImplemented(format!(
                "the gate is a single layer perceptron, {} is not supported",
                meta_kind
            )));
        }
        let gate_params = NetworkParams::from_params(
            meta_kind,
            &default_params(ClassifierKind::SingleLayerPerceptron),
        )?;
        Self::new(folds_param(params)?, kinds, gate_params, options)
    }

    fn settings(&self) -> &NetworkSettings {
        &self.base_options.network
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Gated classifier ({} folds) over [{}], gate {}",
            self.folds,
            names(&self.base_kinds),
            self.gate
                .first()
                .map(|g| format!("{}x{}", g.input_dim(), g.output_dim()))
                .unwrap_or_else(|| "unfitted".to_string())
        )];
        lines.extend(self.bases.iter().map(|b| format!("  - {}", b.summary())));
        lines.join("\n")
    }
}

impl Classifier for GatedClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::GatedClassifier.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let out_of_fold = out_of_fold_probabilities(
            &self.base_kinds,
            &self.base_options,
            features,
            labels,
            self.folds,
        )?;
        let device = device();
        let width = features.n_features();
        let n_bases = self.base_kinds.len();
        let x = rows_to_tensor(features.rows(), width, device)?;
        let p = rows_to_tensor(&out_of_fold, n_bases, device)?;
        let y = labels_to_tensor(labels, device)?;

        let mut varmap = VarMap::new();
        let gate = Network::initialize(
            &varmap,
            &[width, n_bases],
            Activation::Sigmoid,
            self.base_options.seed,
            device,
        )?;
        let run = TrainingRun {
            label: self.name(),
            params: &self.gate_params,
            settings: self.settings(),
            seed: self.base_options.seed,
        };
        run.run(&mut varmap, labels, |ids| {
            let weights = softmax(&gate.forward(&x.index_select(ids, 0)?)?, 1)?;
            let mixed = weights
                .mul(&p.index_select(ids, 0)?)?
                .sum_keepdim(1)?
                .affine(1.0 - 2.0 * PROBABILITY_EPSILON, PROBABILITY_EPSILON)?;
            let loss = bce_with_probabilities(&mixed, &y.index_select(ids, 0)?)?;
            Ok((loss, mixed))
        })?;
        self.gate = gate.export()?;
        fit_all(&mut self.bases, features, labels)
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        if self.gate.is_empty() {
            return Err(LinkerError::NotFitted(self.name().to_string()));
        }
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let device = device();
        let probabilities = rows_to_tensor(
            &base_probabilities(&self.bases, features)?,
            self.bases.len(),
            device,
        )?;
        let gate = Network::from_layers(&self.gate, Activation::Sigmoid, device)?;
        let x = rows_to_tensor(features.rows(), features.n_features(), device)?;
        let weights = softmax(&gate.forward(&x)?, 1)?;
        let mixed = weights
            .mul(&probabilities)?
            .sum_keepdim(1)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Ok(mixed.into_iter().map(f64::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::{accuracy, separable};
    use std::path::Path;

    const FAST_BASES: [ClassifierKind; 3] = [
        ClassifierKind::NaiveBayes,
        ClassifierKind::LogisticRegression,
        ClassifierKind::LinearSupportVectorMachine,
    ];

    fn options(dir: &Path) -> ClassifierOptions {
        ClassifierOptions {
            binarize: Some(0.5),
            network: NetworkSettings {
                checkpoint_dir: dir.to_path_buf(),
                patience: 20,
                ..NetworkSettings::default()
            },
            ..ClassifierOptions::default()
        }
    }

    #[test]
    fn test_soft_voting_separable_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut voting = VotingClassifier::new(Voting::Soft, &FAST_BASES, &options(dir.path()))
            .unwrap();
        let (features, labels) = separable(10);
        voting.fit(&features, &labels).unwrap();
        assert_eq!(accuracy(&voting.predict(&features).unwrap(), &labels), 1.0);
        assert!(voting.summary().contains("naive_bayes"));
    }

    #[test]
    fn test_hard_voting_counts_votes() {
        let dir = tempfile::tempdir().unwrap();
        let params = ParamSet::new().with("voting", "hard");
        let mut voting =
            VotingClassifier::from_params(&params, &FAST_BASES, &options(dir.path())).unwrap();
        let (features, labels) = separable(10);
        voting.fit(&features, &labels).unwrap();
        let probabilities = voting.predict_proba(&features).unwrap();
        assert_eq!(probabilities[0], 1.0);
        assert_eq!(probabilities[1], 0.0);
    }

    #[test]
    fn test_hard_voting_breaks_ties_with_average() {
        let split_low = [0.9, 0.55, 0.1, 0.2];
        assert!((combine_votes(Voting::Hard, &split_low, 4.0) - 0.4375).abs() < 1e-12);
        let split_high = [0.95, 0.9, 0.45, 0.4];
        assert!((combine_votes(Voting::Hard, &split_high, 4.0) - 0.675).abs() < 1e-12);
        let majority = [0.9, 0.6, 0.7, 0.1];
        assert_eq!(combine_votes(Voting::Hard, &majority, 4.0), 0.75);
        assert!((combine_votes(Voting::Soft, &majority, 4.0) - 0.575).abs() < 1e-12);
    }

    #[test]
    fn test_stacked_separable_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut stacked = StackedClassifier::new(
            2,
            &FAST_BASES,
            ClassifierKind::LogisticRegression,
            &options(dir.path()),
        )
        .unwrap();
        let (features, labels) = separable(10);
        stacked.fit(&features, &labels).unwrap();
        assert_eq!(accuracy(&stacked.predict(&features).unwrap(), &labels), 1.0);
    }

    #[test]
    fn test_gated_separable_data() {
        let dir = tempfile::tempdir().unwrap();
        let gate_params = NetworkParams::from_params(
            ClassifierKind::SingleLayerPerceptron,
            &ParamSet::new()
                .with("epochs", 50i64)
                .with("batch_size", 8i64)
                .with("learning_rate", 0.05),
        )
        .unwrap();
        let mut gated = GatedClassifier::new(
            2,
            &[
                ClassifierKind::LogisticRegression,
                ClassifierKind::LinearSupportVectorMachine,
            ],
            gate_params,
            &options(dir.path()),
        )
        .unwrap();
        let (features, labels) = separable(10);
        gated.fit(&features, &labels).unwrap();
        assert_eq!(accuracy(&gated.predict(&features).unwrap(), &labels), 1.0);
        assert!(dir
            .path()
            .join("gated_classifier_best_checkpoint_model.safetensors")
            .exists());
    }

    #[test]
    fn test_unwired_combinations_are_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path());
        assert!(matches!(
            VotingClassifier::new(
                Voting::Soft,
                &[ClassifierKind::StackedClassifier],
                &options
            ),
            Err(LinkerError::NotImplemented(_))
        ));
        assert!(matches!(
            StackedClassifier::new(
                2,
                &FAST_BASES,
                ClassifierKind::SupportVectorMachine,
                &options
            ),
            Err(LinkerError::NotImplemented(_))
        ));
        let params = ParamSet::new().with("meta_layer", "mlp");
        assert!(matches!(
            GatedClassifier::from_params(&params, &FAST_BASES, &options),
            Err(LinkerError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_ensemble_propagates_missing_binarize() {
        let options = ClassifierOptions::default();
        assert!(matches!(
            VotingClassifier::new(Voting::Soft, &FAST_BASES, &options),
            Err(LinkerError::MissingParameter { .. })
        ));
    }
}
