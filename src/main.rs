// src/main.rs
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

use linker_lib::classifiers::{ClassifierKind, ClassifierOptions, ParamValue};
use linker_lib::pipeline::{self, EvaluationOptions, PipelineContext};
use linker_lib::sources::{catalogs, PgCatalogSource, RecordKnowledgeBase};
use linker_lib::utils::config::LinkerConfig;
use linker_lib::utils::db_connect::connect;
use linker_lib::utils::env::load_env;
use linker_lib::utils::progress_bars::progress_config::ProgressConfig;

#[derive(Parser)]
#[command(author, version, about = "Links Wikidata items to external catalog entities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Overrides LINKER_SHARED_DIR
    #[arg(long, global = true)]
    shared_dir: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier on the known links of a target
    Train(ModelArgs),
    /// Link unlinked Wikidata items with a trained classifier
    Classify {
        #[command(flatten)]
        model: ModelArgs,
        /// Minimum score of an emitted link, defaults to LINKER_CONFIDENCE_THRESHOLD
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Cross validate a classifier on the known links of a target
    Evaluate {
        #[command(flatten)]
        model: ModelArgs,
        /// Number of folds, defaults to LINKER_EVALUATION_FOLDS
        #[arg(long)]
        folds: Option<usize>,
        /// Search the classifier's parameter grid
        #[arg(long)]
        grid_search: bool,
    },
    /// Remove every cached artifact of a target
    Invalidate { catalog: String, entity: String },
}

#[derive(Args)]
struct ModelArgs {
    /// Catalog name, e.g. imdb
    catalog: String,
    /// Entity type, e.g. actor
    entity: String,
    /// Classifier name or shorthand, e.g. random_forest or rf
    #[arg(short, long, default_value = "naive_bayes")]
    classifier: String,
    /// Wikidata items as JSON lines (optionally gzipped)
    #[arg(long, env = "LINKER_WIKIDATA_DUMP")]
    wikidata: PathBuf,
    /// Naive Bayes binarization threshold
    #[arg(long, default_value_t = 0.1)]
    binarize: f64,
    /// Classifier parameter override as key=value, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

impl ModelArgs {
    fn kind(&self) -> Result<ClassifierKind> {
        Ok(self.classifier.parse()?)
    }

    fn options(&self, ctx: &PipelineContext) -> Result<ClassifierOptions> {
        let mut options = ctx.classifier_options();
        options.binarize = Some(self.binarize);
        for raw in &self.params {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| anyhow!("Parameter '{}' is not in KEY=VALUE form", raw))?;
            // Values that are not JSON are taken as plain text
            let value = serde_json::from_str::<ParamValue>(value)
                .unwrap_or_else(|_| ParamValue::Text(value.to_string()));
            options.params.insert(key.trim(), value);
        }
        Ok(options)
    }

    fn knowledge_base(&self) -> Result<RecordKnowledgeBase> {
        let kb = RecordKnowledgeBase::from_jsonl(&self.wikidata)
            .with_context(|| format!("Failed to load Wikidata items from {}", self.wikidata.display()))?;
        info!("Loaded {} Wikidata items", kb.len());
        Ok(kb)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    load_env();
    let cli = Cli::parse();
    let start_time = Instant::now();

    let mut config = LinkerConfig::from_env();
    if let Some(dir) = cli.shared_dir {
        config.shared_dir = dir;
    }
    let progress = if cli.quiet {
        ProgressConfig::disabled()
    } else {
        ProgressConfig::from_env()
    };
    config.log_config();
    let ctx = PipelineContext::new(config, progress);

    match cli.command {
        Command::Invalidate { catalog, entity } => {
            let target = catalogs::lookup(&catalog, &entity)?;
            let removed = ctx
                .cache
                .invalidate_all(target.catalog, target.entity)
                .context("Failed to invalidate cached artifacts")?;
            info!("Removed {} artifacts of {}", removed, target);
        }
        Command::Train(args) => {
            let (kind, target) = (args.kind()?, catalogs::lookup(&args.catalog, &args.entity)?);
            let options = args.options(&ctx)?;
            let kb = args.knowledge_base()?;
            let pool = connect().await.context("Failed to connect to database")?;
            let catalog = PgCatalogSource::new(pool);
            match pipeline::train(&ctx, &kb, &catalog, target, kind, &options).await? {
                Some(model) => info!("{}", model.describe()),
                None => warn!("Nothing to train on for {}", target),
            }
        }
        Command::Classify { model, threshold } => {
            let (kind, target) = (model.kind()?, catalogs::lookup(&model.catalog, &model.entity)?);
            let threshold = threshold.unwrap_or(ctx.config.confidence_threshold);
            let kb = model.knowledge_base()?;
            let pool = connect().await.context("Failed to connect to database")?;
            let catalog = PgCatalogSource::new(pool);
            let links = pipeline::classify(&ctx, &kb, &catalog, target, kind, threshold).await?;
            info!("{} links for {}", links.len(), target);
        }
        Command::Evaluate {
            model,
            folds,
            grid_search,
        } => {
            let (kind, target) = (model.kind()?, catalogs::lookup(&model.catalog, &model.entity)?);
            let options = model.options(&ctx)?;
            let evaluation = EvaluationOptions {
                folds: folds.unwrap_or(ctx.config.evaluation_folds),
                grid_search,
                threshold: ctx.config.confidence_threshold,
            };
            let kb = model.knowledge_base()?;
            let pool = connect().await.context("Failed to connect to database")?;
            let catalog = PgCatalogSource::new(pool);
            match pipeline::evaluate(&ctx, &kb, &catalog, target, kind, &options, &evaluation)
                .await?
            {
                Some(report) => info!("{}", report.get_stats_display()),
                None => warn!("Nothing to evaluate on for {}", target),
            }
        }
    }

    info!("Done in {:.2?}", start_time.elapsed());
    Ok(())
}
