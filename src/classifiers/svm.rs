// src/classifiers/svm.rs
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::params::ParamSet;
use super::{ensure_width, sigmoid, validate_training_input, Classifier, ClassifierKind};
use crate::error::{LinkerError, LinkerResult};
use crate::models::FeatureTable;

fn sign(label: bool) -> f64 {
    if label {
        1.0
    } else {
        -1.0
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn positive(params: &ParamSet, key: &str, default: f64) -> LinkerResult<f64> {
    let value = params.f64(key)?.unwrap_or(default);
    if value <= 0.0 {
        return Err(LinkerError::InvalidParameter {
            parameter: key.to_string(),
            reason: format!("must be positive, got {}", value),
        });
    }
    Ok(value)
}

/// Linear SVM trained with Pegasos sub-gradient steps on the hinge loss.
/// A constant feature carries the bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvmClassifier {
    c: f64,
    tol: f64,
    max_iter: usize,
    seed: u64,
    weights: Vec<f64>,
    fitted: bool,
}

impl LinearSvmClassifier {
    pub fn new(c: f64, tol: f64, max_iter: usize, seed: u64) -> Self {
        Self {
            c,
            tol,
            max_iter,
            seed,
            weights: Vec::new(),
            fitted: false,
        }
    }

    pub fn from_params(params: &ParamSet, seed: u64) -> LinkerResult<Self> {
        Ok(Self::new(
            positive(params, "c", 1.0)?,
            params.f64("tol")?.unwrap_or(0.001),
            params.usize("max_iter")?.unwrap_or(1000).max(1),
            seed,
        ))
    }

    pub fn summary(&self) -> String {
        let weights: Vec<String> = self.weights.iter().map(|w| format!("{:.4}", w)).collect();
        format!(
            "Linear SVM (C={}): weights+bias=[{}]",
            self.c,
            weights.join(", ")
        )
    }

    /// Signed distance-like score; positive means match.
    pub fn decision(&self, row: &[f64]) -> f64 {
        let n = self.weights.len() - 1;
        dot(&self.weights[..n], row) + self.weights[n]
    }
}

impl Classifier for LinearSvmClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::LinearSupportVectorMachine.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let n = features.len();
        let d = features.n_features();
        let lambda = 1.0 / (self.c * n as f64);
        let radius = 1.0 / lambda.sqrt();
        let rows: Vec<Vec<f64>> = features
            .rows()
            .iter()
            .map(|row| row.iter().copied().chain(std::iter::once(1.0)).collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n).collect();
        let mut w = vec![0.0; d + 1];
        let mut step = 0usize;
        for epoch in 0..self.max_iter {
            let before = w.clone();
            order.shuffle(&mut rng);
            for &i in &order {
                step += 1;
                let eta = 1.0 / (lambda * step as f64);
                let y = sign(labels[i]);
                let margin = y * dot(&w, &rows[i]);
                let shrink = 1.0 - eta * lambda;
                w.iter_mut().for_each(|wj| *wj *= shrink);
                if margin < 1.0 {
                    for (wj, xj) in w.iter_mut().zip(&rows[i]) {
                        *wj += eta * y * xj;
                    }
                }
                let norm = dot(&w, &w).sqrt();
                if norm > radius {
                    let scale = radius / norm;
                    w.iter_mut().for_each(|wj| *wj *= scale);
                }
            }
            let change = w
                .iter()
                .zip(&before)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            if change < self.tol {
                debug!("Linear SVM converged after {} epochs", epoch + 1);
                break;
            }
        }
        self.weights = w;
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
        ensure_width(features, self.weights.len() - 1)?;
        Ok(features
            .rows()
            .iter()
            .map(|row| sigmoid(self.decision(row)))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Poly,
    Rbf,
    Sigmoid,
}

impl Kernel {
    const NAMES: &'static str = "linear, poly, rbf, sigmoid";
    const POLY_DEGREE: i32 = 3;

    fn apply(&self, a: &[f64], b: &[f64], gamma: f64) -> f64 {
        match self {
            Kernel::Linear => dot(a, b),
            Kernel::Poly => (gamma * dot(a, b)).powi(Self::POLY_DEGREE),
            Kernel::Rbf => {
                let distance: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * distance).exp()
            }
            Kernel::Sigmoid => (gamma * dot(a, b)).tanh(),
        }
    }
}

impl FromStr for Kernel {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(Kernel::Linear),
            "poly" => Ok(Kernel::Poly),
            "rbf" => Ok(Kernel::Rbf),
            "sigmoid" => Ok(Kernel::Sigmoid),
            _ => Err(LinkerError::InvalidParameter {
                parameter: "kernel".to_string(),
                reason: format!("'{}' is not one of {}", s, Self::NAMES),
            }),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kernel::Linear => "linear",
            Kernel::Poly => "poly",
            Kernel::Rbf => "rbf",
            Kernel::Sigmoid => "sigmoid",
        };
        f.write_str(name)
    }
}

/// Kernel coefficient: `auto` is 1 / n_features, `scale` also divides by the
/// feature variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    Auto,
    Scale,
    Value(f64),
}

impl Gamma {
    fn from_params(params: &ParamSet) -> LinkerResult<Self> {
        if let Ok(Some(value)) = params.f64("gamma") {
            return Ok(Gamma::Value(value));
        }
        match params.text("gamma")? {
            None | Some("scale") => Ok(Gamma::Scale),
            Some("auto") => Ok(Gamma::Auto),
            Some(other) => Err(LinkerError::InvalidParameter {
                parameter: "gamma".to_string(),
                reason: format!("'{}' is not one of auto, scale or a number", other),
            }),
        }
    }

    fn resolve(&self, rows: &[Vec<f64>], n_features: usize) -> f64 {
        let d = n_features.max(1) as f64;
        match self {
            Gamma::Value(v) => *v,
            Gamma::Auto => 1.0 / d,
            Gamma::Scale => {
                let count = (rows.len() * n_features) as f64;
                let mean = rows.iter().flatten().sum::<f64>() / count;
                let variance = rows.iter().flatten().map(|x| (x - mean).powi(2)).sum::<f64>() / count;
                if variance > 0.0 {
                    1.0 / (d * variance)
                } else {
                    1.0 / d
                }
            }
        }
    }
}

/// Kernel SVM trained with kernelized Pegasos. `max_iter` counts passes over
/// the data; every pass costs one kernel row per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSvmClassifier {
    c: f64,
    kernel: Kernel,
    gamma: Gamma,
    max_iter: usize,
    seed: u64,
    gamma_value: f64,
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    fitted: bool,
}

impl KernelSvmClassifier {
    pub fn new(c: f64, kernel: Kernel, gamma: Gamma, max_iter: usize, seed: u64) -> Self {
        Self {
            c,
            kernel,
            gamma,
            max_iter,
            seed,
            gamma_value: 0.0,
            support_vectors: Vec::new(),
            coefficients: Vec::new(),
            fitted: false,
        }
    }

    pub fn from_params(params: &ParamSet, seed: u64) -> LinkerResult<Self> {
        let kernel = params.text("kernel")?.unwrap_or("rbf").parse::<Kernel>()?;
        Ok(Self::new(
            positive(params, "c", 1.0)?,
            kernel,
            Gamma::from_params(params)?,
            params.usize("max_iter")?.unwrap_or(5).max(1),
            seed,
        ))
    }

    pub fn summary(&self) -> String {
        format!(
            "Kernel SVM (C={}, kernel={}, gamma={:.4}): {} support vectors",
            self.c,
            self.kernel,
            self.gamma_value,
            self.support_vectors.len()
        )
    }

    // The +1 acts as an implicit bias term.
    fn k(&self, a: &[f64], b: &[f64]) -> f64 {
        self.kernel.apply(a, b, self.gamma_value) + 1.0
    }

    pub fn decision(&self, row: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, coef)| coef * self.k(sv, row))
            .sum()
    }
}

impl Classifier for KernelSvmClassifier {
    fn name(&self) -> &'static str {
        ClassifierKind::SupportVectorMachine.name()
    }

    fn fit(&mut self, features: &FeatureTable, labels: &[bool]) -> LinkerResult<()> {
        validate_training_input(self.name(), features, labels)?;
        let rows = features.rows();
        let n = rows.len();
        self.gamma_value = self.gamma.resolve(rows, features.n_features());
        let lambda = 1.0 / (self.c * n as f64);
        let total_steps = self.max_iter * n;
        info!(
            "Training kernel SVM ({}) on {} rows for {} steps",
            self.kernel, n, total_steps
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut alpha = vec![0u32; n];
        let mut active: Vec<usize> = Vec::new();
        for step in 1..=total_steps {
            let i = rng.gen_range(0..n);
            let y = sign(labels[i]);
            let sum: f64 = active
                .iter()
                .map(|&j| alpha[j] as f64 * sign(labels[j]) * self.k(&rows[j], &rows[i]))
                .sum();
            let decision = sum / (lambda * step as f64);
            if y * decision < 1.0 {
                if alpha[i] == 0 {
                    active.push(i);
                }
                alpha[i] += 1;
            }
        }

        let scale = lambda * total_steps as f64;
        self.support_vectors = active.iter().map(|&j| rows[j].clone()).collect();
        self.coefficients = active
            .iter()
            .map(|&j| alpha[j] as f64 * sign(labels[j]) / scale)
            .collect();
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
        if let Some(first) = self.support_vectors.first() {
            ensure_width(features, first.len())?;
        }
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
    fn test_linear_svm_separable_data() {
        let (features, labels) = separable(10);
        let mut svm = LinearSvmClassifier::new(1.0, 0.001, 200, 1984);
        svm.fit(&features, &labels).unwrap();
        assert_eq!(accuracy(&svm.predict(&features).unwrap(), &labels), 1.0);
    }

    #[test]
    fn test_kernel_svm_separable_data() {
        let (features, labels) = separable(10);
        for kernel in [Kernel::Linear, Kernel::Rbf] {
            let mut svm = KernelSvmClassifier::new(10.0, kernel, Gamma::Scale, 20, 1984);
            svm.fit(&features, &labels).unwrap();
            assert_eq!(
                accuracy(&svm.predict(&features).unwrap(), &labels),
                1.0,
                "{}",
                kernel
            );
        }
    }

    #[test]
    fn test_unknown_kernel() {
        let params = ParamSet::new().with("kernel", "cubic");
        assert!(matches!(
            KernelSvmClassifier::from_params(&params, 0),
            Err(LinkerError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_gamma_resolution() {
        let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        assert_eq!(Gamma::Auto.resolve(&rows, 2), 0.5);
        // mean 0.5, variance 0.25
        assert!((Gamma::Scale.resolve(&rows, 2) - 2.0).abs() < 1e-12);
        assert_eq!(Gamma::Value(0.3).resolve(&rows, 2), 0.3);
    }
}
