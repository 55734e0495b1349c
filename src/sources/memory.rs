// src/sources/memory.rs
use anyhow::Result;
use serde_json::Value as Json;
use std::collections::BTreeSet;

use super::{CatalogSource, CatalogTarget, Selection};
use crate::models::RawRecord;
use crate::utils::constants::TID;

/// Catalog rows held in memory, already denormalized. Several rows may share
/// one catalog id.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    rows: Vec<RawRecord>,
}

fn row_id(row: &RawRecord) -> Option<String> {
    match row.get(TID)? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl MemoryCatalog {
    pub fn new(rows: Vec<RawRecord>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl CatalogSource for MemoryCatalog {
    async fn page(
        &self,
        _target: &CatalogTarget,
        selection: &Selection,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<RawRecord>> {
        let ids: BTreeSet<String> = self
            .rows
            .iter()
            .filter_map(row_id)
            .filter(|id| selection.accepts(id))
            .collect();
        let page: BTreeSet<&String> = ids
            .iter()
            .skip(page_index.saturating_mul(page_size))
            .take(page_size)
            .collect();
        Ok(self
            .rows
            .iter()
            .filter(|row| row_id(row).is_some_and(|id| page.contains(&id)))
            .cloned()
            .collect())
    }
}
