// src/sources/knowledge_base.rs
use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::{CatalogTarget, KnowledgeBaseSource, LinkMap};
use crate::models::RawRecord;
use crate::utils::constants::QID;

/// Wikidata items held in memory, one JSON object per item.
///
/// Items carry their attributes plus catalog identifiers under the property
/// ids (e.g. `"P1953": ["12345"]`). Property keys are stripped from the
/// records handed to the builders.
#[derive(Debug, Clone, Default)]
pub struct RecordKnowledgeBase {
    records: BTreeMap<String, RawRecord>,
}

fn is_property(key: &str) -> bool {
    key.len() > 1 && key.starts_with('P') && key[1..].chars().all(|c| c.is_ascii_digit())
}

fn identifiers(record: &RawRecord, pid: &str) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let mut push = |value: &Json| match value {
        Json::String(s) if !s.trim().is_empty() => {
            ids.insert(s.trim().to_string());
        }
        Json::Number(n) => {
            ids.insert(n.to_string());
        }
        _ => {}
    };
    match record.get(pid) {
        Some(Json::Array(values)) => values.iter().for_each(&mut push),
        Some(value) => push(value),
        None => {}
    }
    ids
}

impl RecordKnowledgeBase {
    pub fn from_records<I: IntoIterator<Item = RawRecord>>(records: I) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for (line, record) in records.into_iter().enumerate() {
            let qid = record
                .get(QID)
                .and_then(Json::as_str)
                .ok_or_else(|| anyhow!("record {} has no '{}' string", line + 1, QID))?
                .to_string();
            by_id.insert(qid, record);
        }
        Ok(Self { records: by_id })
    }

    /// Loads a JSON-lines file, gzip-compressed when it ends in `.gz`.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open knowledge base extract {}", path.display()))?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut records = Vec::new();
        for (number, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RawRecord = serde_json::from_str(&line)
                .with_context(|| format!("Invalid JSON on line {} of {}", number + 1, path.display()))?;
            records.push(record);
        }
        let kb = Self::from_records(records)?;
        info!(
            "Loaded {} knowledge base items from {}",
            kb.len(),
            path.display()
        );
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KnowledgeBaseSource for RecordKnowledgeBase {
    async fn linked_ids(&self, target: &CatalogTarget) -> Result<LinkMap> {
        let links: LinkMap = self
            .records
            .iter()
            .map(|(qid, record)| (qid.clone(), identifiers(record, target.pid)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
        debug!("{} items linked to {} via {}", links.len(), target, target.pid);
        Ok(links)
    }

    async fn unlinked_ids(&self, target: &CatalogTarget) -> Result<Vec<String>> {
        Ok(self
            .records
            .iter()
            .filter(|(_, record)| identifiers(record, target.pid).is_empty())
            .map(|(qid, _)| qid.clone())
            .collect())
    }

    async fn entity_page(
        &self,
        ids: &[String],
        page_index: usize,
        page_size: usize,
    ) -> Result<Vec<RawRecord>> {
        let start = page_index.saturating_mul(page_size).min(ids.len());
        let end = start.saturating_add(page_size).min(ids.len());
        let mut page = Vec::with_capacity(end - start);
        for qid in &ids[start..end] {
            match self.records.get(qid) {
                Some(record) => page.push(
                    record
                        .iter()
                        .filter(|(key, _)| !is_property(key))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                None => debug!("No knowledge base record for {}", qid),
            }
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::lookup;
    use serde_json::json;
    use std::io::Write;

    fn kb() -> RecordKnowledgeBase {
        let records = vec![
            json!({"qid": "Q1", "name": ["Alan Turing"], "P345": ["tt001"]}),
            json!({"qid": "Q2", "name": "Ada Lovelace", "P345": "tt002", "P1953": 77}),
            json!({"qid": "Q3", "name": "Grace Hopper"}),
        ];
        RecordKnowledgeBase::from_records(
            records
                .into_iter()
                .map(|r| r.as_object().cloned().unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_links_and_unlinked() {
        let kb = kb();
        let imdb = lookup("imdb", "actor").unwrap();
        let links = kb.linked_ids(imdb).await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links["Q1"].contains("tt001"));
        assert_eq!(kb.unlinked_ids(imdb).await.unwrap(), vec!["Q3".to_string()]);

        let discogs = lookup("discogs", "musician").unwrap();
        let links = kb.linked_ids(discogs).await.unwrap();
        assert!(links["Q2"].contains("77"));
    }

    #[tokio::test]
    async fn test_entity_page_strips_properties() {
        let kb = kb();
        let ids = vec!["Q2".to_string(), "Q9".to_string()];
        let page = kb.entity_page(&ids, 0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].contains_key("name"));
        assert!(!page[0].contains_key("P345"));
        assert!(kb.entity_page(&ids, 5, 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_from_jsonl_gz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.jsonl.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        writeln!(encoder, "{}", json!({"qid": "Q1", "name": "x"})).unwrap();
        writeln!(encoder).unwrap();
        writeln!(encoder, "{}", json!({"qid": "Q2", "name": "y"})).unwrap();
        encoder.finish().unwrap();

        let kb = RecordKnowledgeBase::from_jsonl(&path).unwrap();
        assert_eq!(kb.len(), 2);
    }

    #[test]
    fn test_record_without_qid_is_rejected() {
        let record = json!({"name": "x"}).as_object().cloned().unwrap();
        assert!(RecordKnowledgeBase::from_records(vec![record]).is_err());
    }

    #[test]
    fn test_is_property() {
        assert!(is_property("P345"));
        assert!(!is_property("P"));
        assert!(!is_property("Pname"));
        assert!(!is_property("name"));
    }
}
