// src/sources/mod.rs
//! Data sources feeding the dataset builders.
//!
//! Both sides are read page by page; a page is fully consumed before the
//! next one is requested.
pub mod catalogs;
pub mod knowledge_base;
pub mod memory;
pub mod postgres;

use anyhow::Result;
use futures::stream::{self, Stream};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::RawRecord;

pub use catalogs::{lookup, CatalogTarget};
pub use knowledge_base::RecordKnowledgeBase;
pub use memory::MemoryCatalog;
pub use postgres::PgCatalogSource;

/// Knowledge-base id -> catalog ids it is already linked to.
pub type LinkMap = BTreeMap<String, BTreeSet<String>>;

/// Which catalog identifiers a query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Only(BTreeSet<String>),
    Excluding(BTreeSet<String>),
}

impl Selection {
    pub fn accepts(&self, id: &str) -> bool {
        match self {
            Selection::Only(ids) => ids.contains(id),
            Selection::Excluding(ids) => !ids.contains(id),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait KnowledgeBaseSource {
    /// Items carrying at least one identifier of the target catalog.
    async fn linked_ids(&self, target: &CatalogTarget) -> Result<LinkMap>;

    /// Items of the target's entity type without such an identifier.
    async fn unlinked_ids(&self, target: &CatalogTarget) -> Result<Vec<String>>;

    /// Attribute records for the `page_index`-th slice of `ids`.
    async fn entity_page(
        &self,
        ids: &[String],
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<RawRecord>>;
}

#[allow(async_fn_in_trait)]
pub trait CatalogSource {
    /// Denormalized rows (base joined with link and NLP attributes) for the
    /// `page_index`-th page of distinct catalog ids matching `selection`.
    async fn page(
        &self,
        target: &CatalogTarget,
        selection: &Selection,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<RawRecord>>;
}

/// Lazily pages through knowledge-base records; ends after the first empty
/// or short page.
pub fn entity_pages<'a, S: KnowledgeBaseSource>(
    source: &'a S,
    ids: &'a [String],
    page_size: usize,
) -> impl Stream<Item = Result<Vec<RawRecord>>> + 'a {
    let total_pages = ids.len().div_ceil(page_size.max(1));
    stream::try_unfold(0usize, move |page_index| async move {
        if page_index >= total_pages {
            return Ok::<_, anyhow::Error>(None);
        }
        let records = source.entity_page(ids, page_index, page_size).await?;
        Ok(Some((records, page_index + 1)))
    })
}

/// Lazily pages through catalog rows until a page comes back empty.
pub fn catalog_pages<'a, S: CatalogSource>(
    source: &'a S,
    target: &'a CatalogTarget,
    selection: &'a Selection,
    page_size: usize,
) -> impl Stream<Item = Result<Vec<RawRecord>>> + 'a {
    stream::try_unfold(0usize, move |page_index| async move {
        let rows = source.page(target, selection, page_index, page_size).await?;
        if rows.is_empty() {
            return Ok::<_, anyhow::Error>(None);
        }
        Ok(Some((rows, page_index + 1)))
    })
}
