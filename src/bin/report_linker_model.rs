// src/bin/report_linker_model.rs
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use linker_lib::classifiers::{ClassifierKind, TrainedModel};
use linker_lib::dataset::{ArtifactCache, ArtifactKey, ArtifactKind};
use linker_lib::models::PerformanceReport;
use linker_lib::sources::catalogs;
use linker_lib::utils::config::LinkerConfig;
use linker_lib::utils::env::load_env;

/// Prints what a persisted model was trained on, plus its evaluation
/// report when one exists.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct ReportArgs {
    catalog: String,
    entity: String,
    /// Classifier name or shorthand
    classifier: String,

    /// Overrides LINKER_SHARED_DIR
    #[arg(long)]
    shared_dir: Option<PathBuf>,

    /// Print the model as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    load_env();
    let args = ReportArgs::parse();

    let kind: ClassifierKind = args.classifier.parse()?;
    let target = catalogs::lookup(&args.catalog, &args.entity)?;
    let shared_dir = args
        .shared_dir
        .unwrap_or_else(|| LinkerConfig::from_env().shared_dir);
    let cache = ArtifactCache::new(shared_dir);

    let key = ArtifactKey::classifier(ArtifactKind::Model, target.catalog, target.entity, kind);
    let model = cache
        .load_json::<TrainedModel>(&key)
        .context("Failed to read the model artifact")?
        .ok_or_else(|| anyhow!("No model at {}", cache.path(&key).display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&model)?);
    } else {
        println!("{}", model.describe());
    }

    let key = ArtifactKey::classifier(ArtifactKind::Performance, target.catalog, target.entity, kind);
    match cache.load_json::<PerformanceReport>(&key)? {
        Some(report) => {
            println!("\n{}", report.get_stats_display());
            if let Some(params) = report.best_params {
                println!("  best parameters: {}", params);
            }
        }
        None => info!("No evaluation report for {} {}", target, kind),
    }
    Ok(())
}
