// src/pipeline/mod.rs
//! Train, classify and evaluate workflows.
//!
//! Each workflow has an async entry point that builds the dataset from the
//! sources, and a synchronous core working on an already built `Dataset`.
pub mod classify;
pub mod evaluate;
pub mod train;

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::classifiers::{ClassifierKind, ClassifierOptions, NetworkSettings, TrainedModel};
use crate::dataset::{ArtifactCache, ArtifactKey, ArtifactKind};
use crate::features::FeatureExtractor;
use crate::sources::CatalogTarget;
use crate::utils::config::LinkerConfig;
use crate::utils::progress_bars::progress_config::ProgressConfig;

pub use classify::{classify, classify_dataset};
pub use evaluate::{evaluate, evaluate_dataset, EvaluationOptions};
pub use train::{train, train_on_dataset};

/// Settings and shared handles every workflow runs with.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: LinkerConfig,
    pub progress: ProgressConfig,
    pub cache: ArtifactCache,
}

impl PipelineContext {
    pub fn new(config: LinkerConfig, progress: ProgressConfig) -> Self {
        let cache = ArtifactCache::new(config.shared_dir.clone());
        Self {
            config,
            progress,
            cache,
        }
    }

    pub fn extractor(&self) -> FeatureExtractor {
        FeatureExtractor::standard(self.config.missing_value)
    }

    /// Classifier options seeded and checkpointed according to the config.
    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            seed: self.config.seed,
            network: NetworkSettings::from_config(&self.config, &self.progress),
            ..ClassifierOptions::default()
        }
    }

    pub fn model_key(&self, target: &CatalogTarget, kind: ClassifierKind) -> ArtifactKey {
        ArtifactKey::classifier(ArtifactKind::Model, target.catalog, target.entity, kind)
    }

    /// Loads the persisted model of `kind` for the target.
    pub fn load_model(&self, target: &CatalogTarget, kind: ClassifierKind) -> Result<TrainedModel> {
        let key = self.model_key(target, kind);
        let path = self.cache.path(&key);
        let model = self
            .cache
            .load_json::<TrainedModel>(&key)
            .with_context(|| format!("Failed to read model {}", path.display()))?
            .ok_or_else(|| {
                anyhow!(
                    "No {} model for {} at {}; train it first",
                    kind,
                    target,
                    path.display()
                )
            })?;
        info!("Loaded {} model trained at {}", kind, model.trained_at);
        Ok(model)
    }
}

pub(crate) fn run_label(kind: ClassifierKind, target: &CatalogTarget) -> String {
    format!("{} on {}", kind, target)
}
