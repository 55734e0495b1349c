// src/pipeline/evaluate.rs
use anyhow::{Context, Result};
use log::{debug, info};

use super::train::training_features;
use super::{run_label, PipelineContext};
use crate::classifiers::validation::{complement, stratified_k_fold};
use crate::classifiers::{
    build_classifier, expand_grid, parameter_grid, Classifier, ClassifierKind, ClassifierOptions,
    ParamSet,
};
use crate::dataset::{ArtifactKey, ArtifactKind, BuildOutcome, Dataset, DatasetBuilder};
use crate::error::LinkerResult;
use crate::features::FeatureExtractor;
use crate::models::{ConfusionCounts, FeatureTable, Goal, PerformanceReport};
use crate::sources::{CatalogSource, CatalogTarget, KnowledgeBaseSource};
use crate::utils::constants::{CONFIDENCE_THRESHOLD, DEFAULT_EVALUATION_FOLDS};
use crate::utils::progress_bars::logging::StageLogger;
use crate::utils::progress_bars::progress_config::ProgressConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationOptions {
    pub folds: usize,
    /// Search the classifier's parameter grid and report the best point
    pub grid_search: bool,
    pub threshold: f64,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            folds: DEFAULT_EVALUATION_FOLDS,
            grid_search: false,
            threshold: CONFIDENCE_THRESHOLD,
        }
    }
}

fn pick(labels: &[bool], rows: &[usize]) -> Vec<bool> {
    rows.iter().map(|&i| labels[i]).collect()
}

/// Stratified k-fold cross validation: one confusion count per fold.
pub fn cross_validate(
    kind: ClassifierKind,
    options: &ClassifierOptions,
    features: &FeatureTable,
    labels: &[bool],
    folds: usize,
    threshold: f64,
) -> LinkerResult<Vec<ConfusionCounts>> {
    let test_folds = stratified_k_fold(labels, folds, options.seed)?;
    let mut counts = Vec::with_capacity(test_folds.len());
    for (i, test_rows) in test_folds.iter().enumerate() {
        let train_rows = complement(features.len(), test_rows);
        let mut model = build_classifier(kind, options)?;
        model.fit(&features.select(&train_rows), &pick(labels, &train_rows))?;

        let predicted: Vec<bool> = model
            .predict_proba(&features.select(test_rows))?
            .into_iter()
            .map(|p| p >= threshold)
            .collect();
        let fold = ConfusionCounts::from_predictions(&predicted, &pick(labels, test_rows));
        debug!(
            "Fold {}/{}: precision {:.4}, recall {:.4}, F1 {:.4}",
            i + 1,
            test_folds.len(),
            fold.precision(),
            fold.recall(),
            fold.f1()
        );
        counts.push(fold);
    }
    Ok(counts)
}

fn mean_f1(folds: &[ConfusionCounts]) -> f64 {
    if folds.is_empty() {
        return 0.0;
    }
    folds.iter().map(ConfusionCounts::f1).sum::<f64>() / folds.len() as f64
}

/// Grid point with the best mean F1; ties keep the earliest point.
fn grid_search(
    kind: ClassifierKind,
    options: &ClassifierOptions,
    features: &FeatureTable,
    labels: &[bool],
    evaluation: &EvaluationOptions,
    progress: &ProgressConfig,
) -> LinkerResult<Option<(ParamSet, Vec<ConfusionCounts>)>> {
    let points = expand_grid(&parameter_grid(kind));
    info!("Grid search over {} parameter sets for {}", points.len(), kind);
    let bar = progress.bar(points.len() as u64, "grid search");

    let mut best: Option<(f64, ParamSet, Vec<ConfusionCounts>)> = None;
    for point in points {
        let candidate = ClassifierOptions {
            params: options.params.merged(&point),
            ..options.clone()
        };
        let folds = cross_validate(
            kind,
            &candidate,
            features,
            labels,
            evaluation.folds,
            evaluation.threshold,
        )?;
        let score = mean_f1(&folds);
        debug!("{} -> mean F1 {:.4}", candidate.params, score);
        if best.as_ref().map_or(true, |(top, _, _)| score > *top) {
            best = Some((score, candidate.params, folds));
        }
        bar.inc(1);
    }
    bar.finish_with_message("grid search done");
    Ok(best.map(|(_, params, folds)| (params, folds)))
}

/// Cross validates `kind` on an already built training dataset.
pub fn evaluate_dataset(
    kind: ClassifierKind,
    dataset: &Dataset,
    options: &ClassifierOptions,
    evaluation: &EvaluationOptions,
    extractor: &FeatureExtractor,
    progress: &ProgressConfig,
) -> LinkerResult<PerformanceReport> {
    let (features, labels) = training_features(dataset, extractor, progress)?;
    let target = dataset.target;

    let searched = if evaluation.grid_search {
        grid_search(kind, options, &features, &labels, evaluation, progress)?
    } else {
        None
    };
    let (best_params, folds) = match searched {
        Some((params, folds)) => (Some(serde_json::to_value(&params)?), folds),
        None => (
            None,
            cross_validate(
                kind,
                options,
                &features,
                &labels,
                evaluation.folds,
                evaluation.threshold,
            )?,
        ),
    };

    let mut report = PerformanceReport::from_folds(kind.name(), target.catalog, target.entity, folds);
    report.best_params = best_params;
    Ok(report)
}

/// Builds the training set, cross validates `kind` and writes the report
/// to `results/`. `None` when there is no training data.
pub async fn evaluate<K: KnowledgeBaseSource, C: CatalogSource>(
    ctx: &PipelineContext,
    kb: &K,
    catalog: &C,
    target: &'static CatalogTarget,
    kind: ClassifierKind,
    options: &ClassifierOptions,
    evaluation: &EvaluationOptions,
) -> Result<Option<PerformanceReport>> {
    let logger = StageLogger::evaluation(&run_label(kind, target));
    logger.log_start(
        &uuid::Uuid::new_v4().to_string(),
        &format!("{} folds, grid search: {}", evaluation.folds, evaluation.grid_search),
    );

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

    logger.log_phase("Cross validation", Some(kind.name()));
    let report = evaluate_dataset(
        kind,
        &dataset,
        options,
        evaluation,
        &ctx.extractor(),
        &ctx.progress,
    )
    .with_context(|| format!("Failed to evaluate {} on {}", kind, target))?;

    let key = ArtifactKey::classifier(ArtifactKind::Performance, target.catalog, target.entity, kind);
    ctx.cache.store_json(&key, &report)?;
    info!("{}", report.get_stats_display());
    logger.log_completion(
        &format!("report saved to {}", ctx.cache.path(&key).display()),
        ctx.progress.should_show_memory(),
    );
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::separable;

    #[test]
    fn test_cross_validation_on_separable_data() {
        let (features, labels) = separable(20);
        let options = ClassifierOptions::default();
        let folds = cross_validate(
            ClassifierKind::LogisticRegression,
            &options,
            &features,
            &labels,
            4,
            0.5,
        )
        .unwrap();
        assert_eq!(folds.len(), 4);
        let total: usize = folds
            .iter()
            .map(|c| c.true_positives + c.false_positives + c.false_negatives + c.true_negatives)
            .sum();
        assert_eq!(total, 40);
        assert!(mean_f1(&folds) > 0.9);
    }

    #[test]
    fn test_grid_search_reports_a_grid_point() {
        let (features, labels) = separable(10);
        let evaluation = EvaluationOptions {
            folds: 2,
            grid_search: true,
            threshold: 0.5,
        };
        let (params, folds) = grid_search(
            ClassifierKind::LogisticRegression,
            &ClassifierOptions::default(),
            &features,
            &labels,
            &evaluation,
            &ProgressConfig::disabled(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(folds.len(), 2);
        assert!(params.get("c").is_some());
    }

    #[test]
    fn test_too_many_folds_is_an_error() {
        let (features, labels) = separable(2);
        let result = cross_validate(
            ClassifierKind::NaiveBayes,
            &ClassifierOptions::default(),
            &features,
            &labels,
            5,
            0.5,
        );
        assert!(result.is_err());
    }
}
