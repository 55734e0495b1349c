// src/classifiers/neural_network.rs
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarMap, SGD};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::monitor::{EpochMetrics, MetricsSink};
use super::params::ParamSet;
use super::validation::train_validation_split;
use super::{ensure_width, validate_training_input, Classifier, ClassifierKind};
use crate::error::{LinkerError, LinkerResult};
use crate::models::FeatureTable;
use crate::utils::candle::device;
use crate::utils::config::LinkerConfig;
use crate::utils::constants::{
    DEFAULT_SHARED_DIR, NN_CHECKPOINT_FOLDER, NN_EARLY_STOPPING_PATIENCE, NN_VALIDATION_SPLIT,
};
use crate::utils::progress_bars::progress_config::ProgressConfig;

const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Sigmoid,
    Relu,
    Tanh,
    Selu,
    Elu,
    Gelu,
}

impl Activation {
    pub(crate) fn apply(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Sigmoid => candle_nn::ops::sigmoid(x),
            Activation::Relu => x.relu(),
            Activation::Tanh => x.tanh(),
            Activation::Selu => x.elu(SELU_ALPHA)?.affine(SELU_SCALE, 0.0),
            Activation::Elu => x.elu(1.0),
            Activation::Gelu => x.gelu(),
        }
    }
}

impl FromStr for Activation {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sigmoid" => Ok(Activation::Sigmoid),
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "selu" => Ok(Activation::Selu),
            "elu" => Ok(Activation::Elu),
            "gelu" => Ok(Activation::Gelu),
            _ => Err(LinkerError::InvalidParameter {
                parameter: "hidden_activation".to_string(),
                reason: format!(
                    "'{}' is not one of sigmoid, relu, tanh, selu, elu, gelu",
                    s
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
    AdamW,
}

impl FromStr for OptimizerKind {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            _ => Err(LinkerError::InvalidParameter {
                parameter: "optimizer".to_string(),
                reason: format!("'{}' is not one of adam, adamw, sgd", s),
            }),
        }
    }
}

pub(crate) enum TrainOptimizer {
    Sgd(SGD),
    AdamW(AdamW),
}

impl TrainOptimizer {
    pub(crate) fn new(
        kind: OptimizerKind,
        vars: Vec<Var>,
        learning_rate: f64,
    ) -> candle_core::Result<Self> {
        match kind {
            OptimizerKind::Sgd => SGD::new(vars, learning_rate).map(TrainOptimizer::Sgd),
            OptimizerKind::Adam => AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: 0.0,
                    ..ParamsAdamW::default()
                },
            )
            .map(TrainOptimizer::AdamW),
            OptimizerKind::AdamW => AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    ..ParamsAdamW::default()
                },
            )
            .map(TrainOptimizer::AdamW),
        }
    }

    pub(crate) fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            TrainOptimizer::Sgd(opt) => opt.backward_step(loss),
            TrainOptimizer::AdamW(opt) => opt.backward_step(loss),
        }
    }
}

/// Training hyperparameters shared by both perceptrons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub hidden_layer_dims: Vec<usize>,
    pub hidden_activation: Activation,
}

impl NetworkParams {
    pub fn from_params(kind: ClassifierKind, params: &ParamSet) -> LinkerResult<Self> {
        let hidden_layer_dims = match kind {
            ClassifierKind::MultiLayerPerceptron => {
                let dims = params.dims("hidden_layer_dims")?.unwrap_or_else(|| vec![128, 32]);
                if dims.is_empty() || dims.contains(&0) {
                    return Err(LinkerError::InvalidParameter {
                        parameter: "hidden_layer_dims".to_string(),
                        reason: format!("need one or more non-empty layers, got {:?}", dims),
                    });
                }
                dims
            }
            _ => Vec::new(),
        };
        let learning_rate = params.f64("learning_rate")?.unwrap_or(0.001);
        if learning_rate <= 0.0 {
            return Err(LinkerError::InvalidParameter {
                parameter: "learning_rate".to_string(),
                reason: format!("must be positive, got {}", learning_rate),
            });
        }
        Ok(Self {
            epochs: params.usize("epochs")?.unwrap_or(1000).max(1),
            batch_size: params.usize("batch_size")?.unwrap_or(256).max(1),
            learning_rate,
            optimizer: params.text("optimizer")?.unwrap_or("adam").parse()?,
            hidden_layer_dims,
            hidden_activation: params
                .text("hidden_activation")?
                .unwrap_or("selu")
                .parse()?,
        })
    }
}

/// Where and how network training reports and checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub checkpoint_dir: PathBuf,
    pub metrics_path: Option<PathBuf>,
    pub patience: usize,
    pub validation_split: f64,
    pub min_delta: f64,
    pub show_progress: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            checkpoint_dir: Path::new(DEFAULT_SHARED_DIR).join(NN_CHECKPOINT_FOLDER),
            metrics_path: None,
            patience: NN_EARLY_STOPPING_PATIENCE,
            validation_split: NN_VALIDATION_SPLIT,
            min_delta: 0.0,
            show_progress: false,
        }
    }
}

impl NetworkSettings {
    pub fn from_config(config: &LinkerConfig, progress: &ProgressConfig) -> Self {
        Self {
            checkpoint_dir: config.shared_dir.join(NN_CHECKPOINT_FOLDER),
            metrics_path: Some(config.shared_dir.join("logs").join("training_metrics.jsonl")),
            patience: config.nn_patience,
            validation_split: config.nn_validation_split,
            min_delta: 0.0,
            show_progress: progress.should_show_detailed(),
        }
    }

    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.checkpoint_dir
            .join(format!("{}_best_checkpoint_model.safetensors", name))
    }
}

/// A fitted dense layer, `weight` laid out as (out, in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    pub fn input_dim(&self) -> usize {
        self.weight.first().map(Vec::len).unwrap_or(0)
    }

    pub fn output_dim(&self) -> usize {
        self.weight.len()
    }

    fn to_linear(&self, device: &Device) -> candle_core::Result<Linear> {
        let flat: Vec<f32> = self.weight.iter().flatten().copied().collect();
        let weight = Tensor::from_vec(flat, (self.output_dim(), self.input_dim()), device)?;
        let bias = Tensor::from_vec(self.bias.clone(), self.output_dim(), device)?;
        Ok(Linear::new(weight, Some(bias)))
    }

    fn from_linear(linear: &Linear) -> candle_core::Result<Self> {
        let weight = linear.weight().to_vec2::<f32>()?;
        let bias = match linear.bias() {
            Some(bias) => bias.to_vec1::<f32>()?,
            None => vec![0.0; weight.len()],
        };
        Ok(Self { weight, bias })
    }
}

/// Stack of dense layers; the activation applies between layers only, so the
/// network outputs raw logits.
pub(crate) struct Network {
    layers: Vec<Linear>,
    activation: Activation,
}

impl Network {
    /// Glorot-uniform weights and zero biases, registered in `varmap`.
    pub(crate) fn initialize(
        varmap: &VarMap,
        dims: &[usize],
        activation: Activation,
        seed: u64,
        device: &Device,
    ) -> LinkerResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut vars = varmap
            .data()
            .lock()
            .map_err(|_| LinkerError::training("variable map lock poisoned"))?;
        let mut layers = Vec::with_capacity(dims.len().saturating_sub(1));
        for (i, pair) in dims.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
            let values: Vec<f32> = (0..fan_in * fan_out)
                .map(|_| rng.gen_range(-limit..limit) as f32)
                .collect();
            let weight = Var::from_tensor(&Tensor::from_vec(values, (fan_out, fan_in), device)?)?;
            let bias = Var::zeros(fan_out, DType::F32, device)?;
            layers.push(Linear::new(
                weight.as_tensor().clone(),
                Some(bias.as_tensor().clone()),
            ));
            vars.insert(format!("layer{}.weight", i), weight);
            vars.insert(format!("layer{}.bias", i), bias);
        }
        Ok(Self { layers, activation })
    }

    pub(crate) fn from_layers(
        layers: &[DenseLayer],
        activation: Activation,
        device: &Device,
    ) -> LinkerResult<Self> {
        let layers = layers
            .iter()
            .map(|layer| layer.to_linear(device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { layers, activation })
    }

    pub(crate) fn export(&self) -> LinkerResult<Vec<DenseLayer>> {
        Ok(self
            .layers
            .iter()
            .map(DenseLayer::from_linear)
            .collect::<candle_core::Result<Vec<_>>>()?)
    }
}

impl Module for Network {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len().saturating_sub(1);
        let mut hidden = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            hidden = layer.forward(&hidden)?;
            if i < last {
                hidden = self.activation.apply(&hidden)?;
            }
        }
        Ok(hidden)
    }
}

pub(crate) fn rows_to_tensor(rows: &[Vec<f64>], width: usize, device: &Device) -> LinkerResult<Tensor> {
    let flat: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
    Ok(Tensor::from_vec(flat, (rows.len(), width), device)?)
}

pub(crate) fn labels_to_tensor(labels: &[bool], device: &Device) -> LinkerResult<Tensor> {
    let values: Vec<f32> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
    Ok(Tensor::from_vec(values, (labels.len(), 1), device)?)
}

fn index_tensor(indices: &[usize], device: &Device) -> candle_core::Result<Tensor> {
    let ids: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
    Tensor::from_vec(ids, indices.len(), device)
}

/// Mean binary cross-entropy on logits: max(z, 0) - z * y + ln(1 + e^-|z|).
pub(crate) fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    logits
        .relu()?
        .sub(&logits.mul(targets)?)?
        .add(&softplus)?
        .mean_all()
}

/// Mean binary cross-entropy on probabilities in (0, 1).
pub(crate) fn bce_with_probabilities(
    probabilities: &Tensor,
    targets: &Tensor,
) -> candle_core::Result<Tensor> {
    let log_p = probabilities.log()?;
    let log_q = probabilities.affine(-1.0, 1.0)?.log()?;
    let not_targets = targets.affine(-1.0, 1.0)?;
    targets
        .mul(&log_p)?
        .add(&not_targets.mul(&log_q)?)?
        .mean_all()?
        .neg()
}

/// Mini-batch training with a stratified validation hold-out, validation-loss
/// early stopping, best-epoch checkpointing and per-epoch metrics.
pub(crate) struct TrainingRun<'a> {
    pub label: &'a str,
    pub params: &'a NetworkParams,
    pub settings: &'a NetworkSettings,
    pub seed: u64,
}

impl TrainingRun<'_> {
    /// `step` maps a tensor of row indices to `(mean loss, probabilities)`.
    /// On return `varmap` holds the best checkpointed weights.
    pub(crate) fn run<F>(&self, varmap: &mut VarMap, labels: &[bool], step: F) -> LinkerResult<()>
    where
        F: Fn(&Tensor) -> candle_core::Result<(Tensor, Tensor)>,
    {
        let device = device();
        let (train_rows, validation_rows) =
            train_validation_split(labels, self.settings.validation_split, self.seed);
        let validation_rows = if validation_rows.is_empty() {
            warn!(
                "[{}] no rows to spare for validation, monitoring the training set",
                self.label
            );
            train_rows.clone()
        } else {
            validation_rows
        };
        info!(
            "[{}] training on {} rows, validating on {}, up to {} epochs (batch {}, lr {}, {:?})",
            self.label,
            train_rows.len(),
            validation_rows.len(),
            self.params.epochs,
            self.params.batch_size,
            self.params.learning_rate,
            self.params.optimizer
        );

        fs::create_dir_all(&self.settings.checkpoint_dir)?;
        let checkpoint = self.settings.checkpoint_path(self.label);
        let mut sink = MetricsSink::open(self.settings.metrics_path.as_deref())?;
        let mut optimizer = TrainOptimizer::new(
            self.params.optimizer,
            varmap.all_vars(),
            self.params.learning_rate,
        )?;
        let progress = ProgressConfig {
            enabled: self.settings.show_progress,
            detailed: true,
            show_memory: false,
        }
        .detailed_bar(self.params.epochs as u64, &format!("Training {}", self.label));

        let train_ids = index_tensor(&train_rows, device)?;
        let validation_ids = index_tensor(&validation_rows, device)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order = train_rows.clone();
        let mut best_loss = f64::INFINITY;
        let mut best_epoch: Option<usize> = None;
        let mut waited = 0usize;

        for epoch in 0..self.params.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(self.params.batch_size) {
                let (loss, _) = step(&index_tensor(batch, device)?)?;
                optimizer.backward_step(&loss)?;
            }

            let (train_loss, _) = step(&train_ids)?;
            let (validation_loss, probabilities) = step(&validation_ids)?;
            let train_loss = f64::from(train_loss.to_scalar::<f32>()?);
            let validation_loss = f64::from(validation_loss.to_scalar::<f32>()?);
            let probabilities = probabilities.flatten_all()?.to_vec1::<f32>()?;
            let correct = validation_rows
                .iter()
                .zip(&probabilities)
                .filter(|(row, p)| (**p >= 0.5) == labels[**row])
                .count();
            sink.record(&EpochMetrics {
                classifier: self.label.to_string(),
                epoch,
                train_loss,
                validation_loss,
                validation_accuracy: correct as f64 / validation_rows.len() as f64,
            })?;
            progress.inc(1);

            if validation_loss < best_loss - self.settings.min_delta {
                best_loss = validation_loss;
                best_epoch = Some(epoch);
                waited = 0;
                varmap.save(&checkpoint)?;
            } else {
                waited += 1;
                if waited > self.settings.patience {
                    info!(
                        "[{}] early stopping at epoch {}: no validation improvement for {} epochs",
                        self.label, epoch, waited
                    );
                    break;
                }
            }
        }
        progress.finish_and_clear();
        sink.flush()?;

        match best_epoch {
            Some(epoch) => {
                varmap.load(&checkpoint)?;
                info!(
                    "[{}] restored best weights from epoch {} (val_loss={:.5}) at {}",
                    self.label,
                    epoch,
                    best_loss,
                    checkpoint.display()
                );
            }
            None => warn!(
                "[{}] validation loss never improved, keeping the last weights",
                self.label
            ),
        }
        Ok(())
    }
}

/// Single-layer (no hidden layers) or multi-layer perceptron with a sigmoid
/// output unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptronClassifier {
    kind: ClassifierKind,
    params: NetworkParams,
    settings: NetworkSettings,
    seed: u64,
    layers: Vec<DenseLayer>,
}

impl PerceptronClassifier {
    pub fn new(
        kind: ClassifierKind,
        params: NetworkParams,
        settings: NetworkSettings,
        seed: u64,
    ) -> Self {
        Self {
            kind,
            params,
            settings,
            seed,
            layers: Vec::new(),
        }
    }

    pub fn from_params(
        kind: ClassifierKind,
        params: &ParamSet,
        settings: NetworkSettings,
        seed: u64,
    ) -> LinkerResult<Self> {
        if !kind.is_neural() {
            return Err(LinkerError::NotImplemented(format!(
                "{} is not a perceptron",
                kind
            )));
        }
        Ok(Self::new(
            kind,
            NetworkParams::from_params(kind, params)?,
            settings,
            seed,
        ))
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn summary(&self) -> String {
        let shape: Vec<String> = self
            .layers
            .iter()
            .map(|l| format!("{}x{}", l.input_dim(), l.output_dim()))
            .collect();
        format!(
            "{} [{}] activation={:?}, optimizer={:?}",
            self.kind,
            shape.join(" -> "),
            self.params.hidden_activation,
            self.params.optimizer
        )
    }
}

impl Classifier for PerceptronClassifier {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let device = device();
        let width = features.n_features();
        let x = rows_to_tensor(features.rows(), width, device)?;
        let y = labels_to_tensor(labels, device)?;

        let mut dims = vec![width];
        dims.extend_from_slice(&self.params.hidden_layer_dims);
        dims.push(1);
        let mut varmap = VarMap::new();
        let network = Network::initialize(
            &varmap,
            &dims,
            self.params.hidden_activation,
            self.seed,
            device,
        )?;

        let run = TrainingRun {
            label: self.kind.name(),
            params: &self.params,
            settings: &self.settings,
            seed: self.seed,
        };
        run.run(&mut varmap, labels, |ids| {
            let logits = network.forward(&x.index_select(ids, 0)?)?;
            let loss = bce_with_logits(&logits, &y.index_select(ids, 0)?)?;
            Ok((loss, candle_nn::ops::sigmoid(&logits)?))
        })?;

        self.layers = network.export()?;
        debug!("{}", self.summary());
        Ok(())
    }

    fn predict_proba(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        let first = self
            .layers
            .first()
            .ok_or_else(|| LinkerError::NotFitted(self.name().to_string()))?;
        if features.is_empty() {
            return Ok(Vec::new());
        }
        ensure_width(features, first.input_dim())?;
        let device = device();
        let network = Network::from_layers(&self.layers, self.params.hidden_activation, device)?;
        let x = rows_to_tensor(features.rows(), features.n_features(), device)?;
        let probabilities = candle_nn::ops::sigmoid(&network.forward(&x)?)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Ok(probabilities.into_iter().map(f64::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::{accuracy, separable};

    fn settings(dir: &Path) -> NetworkSettings {
        NetworkSettings {
            checkpoint_dir: dir.join("checkpoints"),
            metrics_path: Some(dir.join("metrics.jsonl")),
            patience: 50,
            ..NetworkSettings::default()
        }
    }

    fn quick() -> ParamSet {
        ParamSet::new()
            .with("epochs", 200i64)
            .with("batch_size", 8i64)
            .with("learning_rate", 0.05)
            .with("hidden_layer_dims", vec![8usize])
            .with("hidden_activation", "relu")
            .with("optimizer", "adam")
    }

    #[test]
    fn test_single_layer_perceptron_separable_data() {
        let dir = tempfile::tempdir().unwrap();
        let kind = ClassifierKind::SingleLayerPerceptron;
        let mut slp = PerceptronClassifier::from_params(kind, &quick(), settings(dir.path()), 7)
            .unwrap();
        let (features, labels) = separable(15);
        slp.fit(&features, &labels).unwrap();

        assert_eq!(slp.layers().len(), 1);
        assert_eq!(accuracy(&slp.predict(&features).unwrap(), &labels), 1.0);
        assert!(settings(dir.path())
            .checkpoint_path(kind.name())
            .exists());
        assert!(dir.path().join("metrics.jsonl").exists());
    }

    #[test]
    fn test_multi_layer_perceptron_separable_data() {
        let dir = tempfile::tempdir().unwrap();
        let kind = ClassifierKind::MultiLayerPerceptron;
        let mut mlp = PerceptronClassifier::from_params(kind, &quick(), settings(dir.path()), 7)
            .unwrap();
        let (features, labels) = separable(15);
        mlp.fit(&features, &labels).unwrap();

        assert_eq!(mlp.layers().len(), 2);
        assert_eq!(mlp.layers()[0].output_dim(), 8);
        assert_eq!(accuracy(&mlp.predict(&features).unwrap(), &labels), 1.0);
    }

    #[test]
    fn test_stable_loss_for_large_logits() {
        let logits = Tensor::new(&[[80f32], [-80f32]], &Device::Cpu).unwrap();
        let targets = Tensor::new(&[[1f32], [0f32]], &Device::Cpu).unwrap();
        let loss = bce_with_logits(&logits, &targets)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss.is_finite());
        assert!(loss < 1e-6);
    }

    #[test]
    fn test_invalid_network_params() {
        let kind = ClassifierKind::MultiLayerPerceptron;
        let empty_dims = ParamSet::new().with("hidden_layer_dims", Vec::<usize>::new());
        assert!(NetworkParams::from_params(kind, &empty_dims).is_err());
        let bad_optimizer = ParamSet::new().with("optimizer", "adagrad");
        assert!(NetworkParams::from_params(kind, &bad_optimizer).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let kind = ClassifierKind::SingleLayerPerceptron;
        let slp =
            PerceptronClassifier::from_params(kind, &ParamSet::new(), NetworkSettings::default(), 0)
                .unwrap();
        let (features, _) = separable(2);
        assert!(matches!(
            slp.predict_proba(&features),
            Err(LinkerError::NotFitted(_))
        ));
    }
}
