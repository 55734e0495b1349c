// src/sources/postgres.rs
use anyhow::{Context, Result};
use log::{debug, warn};
use serde_json::Value as Json;

use super::{CatalogSource, CatalogTarget, Selection};
use crate::models::RawRecord;
use crate::utils::db_connect::PgPool;

/// Catalog rows read from the imported catalog dumps.
///
/// Every base table has `catalog_id`, `name`, `name_tokens`, `born`,
/// `born_precision`, `died` and `died_precision`; link tables add `url` and
/// `url_tokens`, NLP tables add `description`.
pub struct PgCatalogSource {
    pool: PgPool,
}

impl PgCatalogSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Builds the paged query for a target. `$1` is the id array, `$2` the page
/// size and `$3` the offset, both counted in distinct catalog ids.
pub(crate) fn page_query(target: &CatalogTarget, selection: &Selection) -> String {
    let condition = match selection {
        Selection::Only(_) => "catalog_id = ANY($1)",
        Selection::Excluding(_) => "NOT (catalog_id = ANY($1))",
    };
    let mut columns = vec![
        "b.catalog_id AS tid".to_string(),
        "b.name".to_string(),
        "b.name_tokens".to_string(),
        "b.born AS date_of_birth".to_string(),
        "b.born_precision AS birth_precision".to_string(),
        "b.died AS date_of_death".to_string(),
        "b.died_precision AS death_precision".to_string(),
    ];
    let mut joins = String::new();
    if let Some(link) = target.link_table {
        columns.push("l.url".to_string());
        columns.push("l.url_tokens".to_string());
        joins.push_str(&format!(
            " LEFT JOIN {} l ON l.catalog_id = b.catalog_id",
            link
        ));
    }
    if let Some(nlp) = target.nlp_table {
        columns.push("n.description".to_string());
        joins.push_str(&format!(
            " LEFT JOIN {} n ON n.catalog_id = b.catalog_id",
            nlp
        ));
    }
    format!(
        "WITH page AS (\
            SELECT DISTINCT catalog_id FROM {base} WHERE {condition} \
            ORDER BY catalog_id LIMIT $2 OFFSET $3\
         ) \
         SELECT row_to_json(t) FROM (\
            SELECT {columns} FROM page p \
            JOIN {base} b ON b.catalog_id = p.catalog_id{joins}\
         ) t",
        base = target.base_table,
        condition = condition,
        columns = columns.join(", "),
        joins = joins,
    )
}

impl CatalogSource for PgCatalogSource {
    async fn page(
        &self,
        target: &CatalogTarget,
        selection: &Selection,
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<RawRecord>> {
        let ids: Vec<String> = match selection {
            Selection::Only(ids) if ids.is_empty() => return Ok(Vec::new()),
            Selection::Only(ids) | Selection::Excluding(ids) => ids.iter().cloned().collect(),
        };
        let query = page_query(target, selection);
        let limit = page_size as i64;
        let offset = (page_index * page_size) as i64;

        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for catalog page")?;
        let rows = conn
            .query(query.as_str(), &[&ids, &limit, &offset])
            .await
            .with_context(|| format!("Failed to read page {} of {}", page_index, target))?;
        debug!(
            "Fetched {} rows for page {} of {}",
            rows.len(),
            page_index,
            target
        );

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Json = row
                .try_get(0)
                .context("Failed to decode catalog row as JSON")?;
            match value {
                Json::Object(record) => records.push(record),
                other => warn!("Skipping non-object catalog row: {}", other),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::lookup;
    use std::collections::BTreeSet;

    #[test]
    fn test_query_joins_available_tables() {
        let discogs = lookup("discogs", "musician").unwrap();
        let query = page_query(discogs, &Selection::Only(BTreeSet::new()));
        assert!(query.contains("FROM discogs_musician WHERE catalog_id = ANY($1)"));
        assert!(query.contains("LEFT JOIN discogs_musician_link l"));
        assert!(query.contains("LEFT JOIN discogs_musician_nlp n"));
        assert!(query.contains("b.born AS date_of_birth"));

        let imdb = lookup("imdb", "actor").unwrap();
        let query = page_query(imdb, &Selection::Excluding(BTreeSet::new()));
        assert!(query.contains("NOT (catalog_id = ANY($1))"));
        assert!(!query.contains("LEFT JOIN"));
        assert!(!query.contains("l.url"));
    }
}
