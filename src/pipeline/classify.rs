// src/pipeline/classify.rs
use anyhow::{Context, Result};
use log::info;

use super::{run_label, PipelineContext};
use crate::candidate_generation::{block, BlockingStrategy};
use crate::classifiers::{ClassifierKind, TrainedModel};
use crate::dataset::{ArtifactKey, ArtifactKind, BuildOutcome, Dataset, DatasetBuilder};
use crate::error::LinkerResult;
use crate::features::FeatureExtractor;
use crate::models::{Goal, LinkPrediction};
use crate::sources::{CatalogSource, CatalogTarget, KnowledgeBaseSource};
use crate::utils::constants::NAME_TOKENS;
use crate::utils::progress_bars::logging::StageLogger;
use crate::utils::progress_bars::progress_config::ProgressConfig;

/// Scores name-token candidates of a classification dataset and keeps
/// those at or above `threshold`, highest score first.
pub fn classify_dataset(
    model: &TrainedModel,
    dataset: &Dataset,
    extractor: &FeatureExtractor,
    threshold: f64,
    progress: &ProgressConfig,
) -> LinkerResult<Vec<LinkPrediction>> {
    let pairs = block(
        &BlockingStrategy::shared_tokens(NAME_TOKENS),
        &dataset.knowledge_base,
        &dataset.catalog,
    );
    let bar = progress.bar(0, "extracting features");
    let features = extractor.extract(&pairs, &dataset.knowledge_base, &dataset.catalog, &bar)?;
    if features.is_empty() {
        info!("No candidate pairs to classify");
        return Ok(Vec::new());
    }

    let scores = model.score(&features)?;
    let mut links: Vec<LinkPrediction> = features
        .index()
        .iter()
        .zip(scores)
        .filter(|(_, score)| *score >= threshold)
        .map(|(pair, score)| LinkPrediction {
            qid: pair.kb_id.clone(),
            tid: pair.catalog_id.clone(),
            score,
        })
        .collect();
    links.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.qid.cmp(&b.qid))
            .then_with(|| a.tid.cmp(&b.tid))
    });
    info!(
        "{} of {} candidate pairs scored at or above {}",
        links.len(),
        features.len(),
        threshold
    );
    Ok(links)
}

/// Classifies the unlinked items of the target with a persisted model and
/// writes the links to `results/`.
pub async fn classify<K: KnowledgeBaseSource, C: CatalogSource>(
    ctx: &PipelineContext,
    kb: &K,
    catalog: &C,
    target: &'static CatalogTarget,
    kind: ClassifierKind,
    threshold: f64,
) -> Result<Vec<LinkPrediction>> {
    let logger = StageLogger::classification(&run_label(kind, target));
    let model = ctx.load_model(target, kind)?;
    logger.log_start(&model.run_id.to_string(), &format!("threshold {}", threshold));

    let dataset = match DatasetBuilder::new(kb, catalog, &ctx.cache)
        .with_page_size(ctx.config.page_size)
        .build(Goal::Classification, target)
        .await
        .with_context(|| format!("Failed to build the classification set of {}", target))?
    {
        BuildOutcome::Built(dataset) => dataset,
        BuildOutcome::NoData => {
            logger.log_no_data("empty classification set");
            return Ok(Vec::new());
        }
    };

    logger.log_phase("Scoring", None);
    let links = classify_dataset(&model, &dataset, &ctx.extractor(), threshold, &ctx.progress)
        .with_context(|| format!("Failed to classify {}", target))?;

    let key = ArtifactKey::classifier(ArtifactKind::Predictions, target.catalog, target.entity, kind);
    ctx.cache.write_jsonl(&key, &links)?;
    logger.log_completion(
        &format!("{} links written to {}", links.len(), ctx.cache.path(&key).display()),
        ctx.progress.should_show_memory(),
    );
    Ok(links)
}
