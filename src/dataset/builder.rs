// src/dataset/builder.rs
use anyhow::{Context, Result};
use futures::TryStreamExt;
use log::{debug, info};
use serde_json::Value as Json;
use std::collections::BTreeSet;

use super::cache::{ArtifactCache, ArtifactKey, ArtifactKind};
use crate::models::{Goal, RawRecord, Side, Table};
use crate::preprocessing::preprocess;
use crate::sources::{
    catalog_pages, entity_pages, CatalogSource, CatalogTarget, KnowledgeBaseSource, LinkMap,
    Selection,
};
use crate::utils::constants::{DEFAULT_PAGE_SIZE, TID};
use crate::utils::progress_bars::logging::StageLogger;

/// Result of a build step. An empty source is not an error; callers skip
/// the target.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome<T> {
    Built(T),
    NoData,
}

impl<T> BuildOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            BuildOutcome::Built(value) => Some(value),
            BuildOutcome::NoData => None,
        }
    }
}

/// Both preprocessed sides of one target for one goal.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub goal: Goal,
    pub target: &'static CatalogTarget,
    pub knowledge_base: Table,
    pub catalog: Table,
}

/// Known links of the target, cached as `raw/wikidata_<c>_<e>_links.json.gz`.
pub async fn gather_links<K: KnowledgeBaseSource>(
    kb: &K,
    target: &CatalogTarget,
    cache: &ArtifactCache,
) -> Result<LinkMap> {
    let key = ArtifactKey::links(target.catalog, target.entity);
    let links = cache
        .get_or_compute(&key, || async move {
            let links = kb
                .linked_ids(target)
                .await
                .with_context(|| format!("Failed to gather links for {}", target))?;
            info!("Gathered {} linked items for {}", links.len(), target);
            Ok::<_, anyhow::Error>(Some(links))
        })
        .await?;
    Ok(links.unwrap_or_default())
}

/// Knowledge base side of a dataset.
///
/// Training gathers the linked items and attaches their known catalog ids
/// under `tid`; classification gathers the items without a link.
pub async fn build_knowledge_base<K: KnowledgeBaseSource>(
    goal: Goal,
    kb: &K,
    target: &CatalogTarget,
    links: &LinkMap,
    cache: &ArtifactCache,
    page_size: usize,
) -> Result<Vec<RawRecord>> {
    let key = ArtifactKey::dataset(
        ArtifactKind::KnowledgeBaseExtract,
        target.catalog,
        target.entity,
        goal,
    );
    let records = cache
        .get_or_compute(&key, || async move {
            let ids: Vec<String> = match goal {
                Goal::Training => links.keys().cloned().collect(),
                Goal::Classification => kb
                    .unlinked_ids(target)
                    .await
                    .with_context(|| format!("Failed to gather unlinked items for {}", target))?,
            };
            info!("Fetching {} Wikidata items for the {} set ...", ids.len(), goal);

            let mut records = Vec::with_capacity(ids.len());
            let mut pages = std::pin::pin!(entity_pages(kb, &ids, page_size));
            while let Some(page) = pages.try_next().await? {
                debug!("Wikidata page with {} records", page.len());
                for mut record in page {
                    if goal == Goal::Training {
                        attach_links(&mut record, links);
                    }
                    records.push(record);
                }
            }
            info!("Wikidata {} set built: {} records", goal, records.len());
            Ok::<_, anyhow::Error>(Some(records))
        })
        .await?;
    Ok(records.unwrap_or_default())
}

fn attach_links(record: &mut RawRecord, links: &LinkMap) {
    let Some(qid) = record.get(Side::KnowledgeBase.id_column()).and_then(Json::as_str) else {
        return;
    };
    if let Some(tids) = links.get(qid) {
        let tids = tids.iter().cloned().map(Json::String).collect();
        record.insert(TID.to_string(), Json::Array(tids));
    }
}

/// Catalog side of a dataset: rows of the linked ids for training, every
/// other row for classification. An empty selection is not cached.
pub async fn build_catalog<C: CatalogSource>(
    goal: Goal,
    catalog: &C,
    target: &CatalogTarget,
    links: &LinkMap,
    cache: &ArtifactCache,
    page_size: usize,
) -> Result<BuildOutcome<Vec<RawRecord>>> {
    let key = ArtifactKey::dataset(ArtifactKind::CatalogExtract, target.catalog, target.entity, goal);
    let rows = cache
        .get_or_compute(&key, || async move {
            let linked: BTreeSet<String> = links.values().flatten().cloned().collect();
            let selection = match goal {
                Goal::Training => Selection::Only(linked),
                Goal::Classification => Selection::Excluding(linked),
            };

            let mut rows: Vec<RawRecord> = Vec::new();
            let mut pages = std::pin::pin!(catalog_pages(catalog, target, &selection, page_size));
            while let Some(page) = pages.try_next().await? {
                debug!("{} page with {} rows", target.catalog, page.len());
                rows.extend(page);
            }

            if rows.is_empty() {
                info!("No {} rows for the {} set, nothing to build", target, goal);
                return Ok::<_, anyhow::Error>(None);
            }
            info!("{} {} set built: {} rows", target, goal, rows.len());
            Ok::<_, anyhow::Error>(Some(rows))
        })
        .await?;
    Ok(match rows {
        Some(rows) => BuildOutcome::Built(rows),
        None => BuildOutcome::NoData,
    })
}

/// Builds and preprocesses both sides of a target, reusing cached tables.
pub struct DatasetBuilder<'a, K, C> {
    kb: &'a K,
    catalog: &'a C,
    cache: &'a ArtifactCache,
    page_size: usize,
}

impl<'a, K: KnowledgeBaseSource, C: CatalogSource> DatasetBuilder<'a, K, C> {
    pub fn new(kb: &'a K, catalog: &'a C, cache: &'a ArtifactCache) -> Self {
        Self {
            kb,
            catalog,
            cache,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    // An empty catalog ends the build before any Wikidata item is fetched.
    pub async fn build(
        &self,
        goal: Goal,
        target: &'static CatalogTarget,
    ) -> Result<BuildOutcome<Dataset>> {
        let logger = StageLogger::dataset(&target.to_string());
        let catalog_key =
            ArtifactKey::dataset(ArtifactKind::CatalogTable, target.catalog, target.entity, goal);
        let kb_key = ArtifactKey::dataset(
            ArtifactKind::KnowledgeBaseTable,
            target.catalog,
            target.entity,
            goal,
        );
        if self.cache.exists(&catalog_key) && self.cache.exists(&kb_key) {
            logger.log_cache_hit(&format!("{} tables", goal));
        }

        let catalog = self
            .cache
            .get_or_compute(&catalog_key, || self.catalog_table(goal, target, &logger))
            .await?;
        let Some(catalog) = catalog else {
            logger.log_no_data(&format!("no catalog rows for the {} set", goal));
            return Ok(BuildOutcome::NoData);
        };

        let knowledge_base = self
            .cache
            .get_or_compute(&kb_key, || self.knowledge_base_table(goal, target, &logger))
            .await?
            .unwrap_or_default();

        logger.log_completion(
            &format!(
                "{} Wikidata entities, {} catalog entities",
                knowledge_base.len(),
                catalog.len()
            ),
            false,
        );
        Ok(BuildOutcome::Built(Dataset {
            goal,
            target,
            knowledge_base,
            catalog,
        }))
    }

    async fn catalog_table(
        &self,
        goal: Goal,
        target: &'static CatalogTarget,
        logger: &StageLogger,
    ) -> Result<Option<Table>> {
        logger.log_phase("Gathering links", None);
        let links = gather_links(self.kb, target, self.cache).await?;

        logger.log_phase("Building catalog set", Some(goal.as_str()));
        let outcome =
            build_catalog(goal, self.catalog, target, &links, self.cache, self.page_size).await?;
        let Some(rows) = outcome.into_option() else {
            return Ok(None);
        };
        logger.log_data_loaded(rows.len(), target.catalog);

        logger.log_phase("Preprocessing", Some(target.catalog));
        let table = preprocess(Side::Catalog, goal, rows)
            .with_context(|| format!("Failed to preprocess the catalog side of {}", target))?;
        Ok(Some(table))
    }

    async fn knowledge_base_table(
        &self,
        goal: Goal,
        target: &'static CatalogTarget,
        logger: &StageLogger,
    ) -> Result<Option<Table>> {
        let links = gather_links(self.kb, target, self.cache).await?;

        logger.log_phase("Building Wikidata set", Some(goal.as_str()));
        let records =
            build_knowledge_base(goal, self.kb, target, &links, self.cache, self.page_size).await?;
        logger.log_data_loaded(records.len(), "Wikidata");

        logger.log_phase("Preprocessing", Some("Wikidata"));
        let table = preprocess(Side::KnowledgeBase, goal, records)
            .with_context(|| format!("Failed to preprocess the Wikidata side of {}", target))?;
        Ok(Some(table))
    }
}
