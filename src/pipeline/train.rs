// src/pipeline/train.rs
use anyhow::{Context, Result};
use log::info;

use super::{run_label, PipelineContext};
use crate::candidate_generation::{label_pairs, training_candidates};
use crate::classifiers::{ClassifierKind, ClassifierOptions, TrainedModel};
use crate::dataset::{BuildOutcome, Dataset, DatasetBuilder};
use crate::error::LinkerResult;
use crate::features::FeatureExtractor;
use crate::models::{FeatureTable, Goal};
use crate::sources::{CatalogSource, CatalogTarget, KnowledgeBaseSource};
use crate::utils::progress_bars::logging::StageLogger;
use crate::utils::progress_bars::progress_config::ProgressConfig;

/// Labelled feature table of a training dataset: known links are the
/// positives, name-token neighbours the negatives.
pub fn training_features(
    dataset: &Dataset,
    extractor: &FeatureExtractor,
    progress: &ProgressConfig,
) -> LinkerResult<(FeatureTable, Vec<bool>)> {
    let pairs = training_candidates(&dataset.knowledge_base, &dataset.catalog);
    let labels = label_pairs(&pairs, &dataset.knowledge_base);
    let positives = labels.iter().filter(|&&l| l).count();
    info!(
        "{} training pairs: {} positive, {} negative",
        pairs.len(),
        positives,
        pairs.len() - positives
    );
    let bar = progress.bar(0, "extracting features");
    let features = extractor.extract(
        &pairs,
        &dataset.knowledge_base,
        &dataset.catalog,
        &bar,
    )?;
    Ok((features, labels))
}

/// Fits a classifier on an already built training dataset.
pub fn train_on_dataset(
    kind: ClassifierKind,
    dataset: &Dataset,
    options: &ClassifierOptions,
    extractor: &FeatureExtractor,
    progress: &ProgressConfig,
) -> LinkerResult<TrainedModel> {
    let (features, labels) = training_features(dataset, extractor, progress)?;
    TrainedModel::fit(
        kind,
        dataset.target.catalog,
        dataset.target.entity,
        options,
        &features,
        &labels,
    )
}

/// Builds the training set, fits `kind` and persists the model.
///
/// `None` when the catalog has no rows for the target's known links.
pub async fn train<K: KnowledgeBaseSource, C: CatalogSource>(
    ctx: &PipelineContext,
    kb: &K,
    catalog: &C,
    target: &'static CatalogTarget,
    kind: ClassifierKind,
    options: &ClassifierOptions,
) -> Result<Option<TrainedModel>> {
    let logger = StageLogger::training(&run_label(kind, target));
    logger.log_start(&uuid::Uuid::new_v4().to_string(), options.params.to_string().as_str());

    let dataset = match DatasetBuilder::new(kb, catalog, &ctx.cache)
        .with_page_size(ctx.config.page_size)
        .build(Goal::Training, target)
        .await
        .with_context(|| format!("Failed to build the training set of {}", target))?
    {
        BuildOutcome::Built(dataset) => dataset,
        BuildOutcome::NoData => {
            logger.log_no_data("empty training set");
            return Ok(None);
        }
    };

    logger.log_phase("Fitting", Some(kind.name()));
    let model = train_on_dataset(kind, &dataset, options, &ctx.extractor(), &ctx.progress)
        .with_context(|| format!("Failed to train {} on {}", kind, target))?;

    let path = ctx.cache.store_json(&ctx.model_key(target, kind), &model)?;
    logger.log_completion(
        &format!("model saved to {}", path.display()),
        ctx.progress.should_show_memory(),
    );
    Ok(Some(model))
}
