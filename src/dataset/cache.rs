// src/dataset/cache.rs
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::classifiers::ClassifierKind;
use crate::error::{LinkerError, LinkerResult};
use crate::models::Goal;

/// Everything the pipeline persists under the shared directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Known knowledge base -> catalog links.
    Links,
    KnowledgeBaseExtract,
    CatalogExtract,
    KnowledgeBaseTable,
    CatalogTable,
    Model,
    Predictions,
    Performance,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 8] = [
        ArtifactKind::Links,
        ArtifactKind::KnowledgeBaseExtract,
        ArtifactKind::CatalogExtract,
        ArtifactKind::KnowledgeBaseTable,
        ArtifactKind::CatalogTable,
        ArtifactKind::Model,
        ArtifactKind::Predictions,
        ArtifactKind::Performance,
    ];

    fn folder(&self) -> &'static str {
        match self {
            ArtifactKind::Links
            | ArtifactKind::KnowledgeBaseExtract
            | ArtifactKind::CatalogExtract => "raw",
            ArtifactKind::KnowledgeBaseTable | ArtifactKind::CatalogTable => "preprocessed",
            ArtifactKind::Model => "models",
            ArtifactKind::Predictions | ArtifactKind::Performance => "results",
        }
    }

    fn is_per_classifier(&self) -> bool {
        matches!(
            self,
            ArtifactKind::Model | ArtifactKind::Predictions | ArtifactKind::Performance
        )
    }

    fn is_lines(&self) -> bool {
        matches!(
            self,
            ArtifactKind::KnowledgeBaseExtract
                | ArtifactKind::CatalogExtract
                | ArtifactKind::Predictions
        )
    }

    fn is_per_goal(&self) -> bool {
        matches!(
            self,
            ArtifactKind::KnowledgeBaseExtract
                | ArtifactKind::CatalogExtract
                | ArtifactKind::KnowledgeBaseTable
                | ArtifactKind::CatalogTable
        )
    }
}

/// Identifies one artifact: what it is, for which catalog and entity type,
/// and for which goal or classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub catalog: String,
    pub entity: String,
    pub goal: Option<Goal>,
    pub classifier: Option<ClassifierKind>,
}

impl ArtifactKey {
    pub fn links(catalog: &str, entity: &str) -> Self {
        Self {
            kind: ArtifactKind::Links,
            catalog: catalog.to_string(),
            entity: entity.to_string(),
            goal: None,
            classifier: None,
        }
    }

    pub fn dataset(kind: ArtifactKind, catalog: &str, entity: &str, goal: Goal) -> Self {
        Self {
            kind,
            catalog: catalog.to_string(),
            entity: entity.to_string(),
            goal: Some(goal),
            classifier: None,
        }
    }

    pub fn classifier(
        kind: ArtifactKind,
        catalog: &str,
        entity: &str,
        classifier: ClassifierKind,
    ) -> Self {
        Self {
            kind,
            catalog: catalog.to_string(),
            entity: entity.to_string(),
            goal: None,
            classifier: Some(classifier),
        }
    }

    pub fn file_name(&self) -> String {
        let goal = self.goal.map(|g| g.as_str()).unwrap_or("any");
        let classifier = self.classifier.map(|c| c.name()).unwrap_or("any");
        let (c, e) = (&self.catalog, &self.entity);
        match self.kind {
            ArtifactKind::Links => format!("wikidata_{}_{}_links.json.gz", c, e),
            ArtifactKind::KnowledgeBaseExtract => {
                format!("wikidata_{}_{}_{}_set.jsonl.gz", c, e, goal)
            }
            ArtifactKind::CatalogExtract => format!("{}_{}_{}_set.jsonl.gz", c, e, goal),
            ArtifactKind::KnowledgeBaseTable => {
                format!("wikidata_{}_{}_{}_table.json.gz", c, e, goal)
            }
            ArtifactKind::CatalogTable => format!("{}_{}_{}_table.json.gz", c, e, goal),
            ArtifactKind::Model => format!("{}_{}_{}_model.json.gz", c, e, classifier),
            ArtifactKind::Predictions => format!("{}_{}_{}_links.jsonl.gz", c, e, classifier),
            ArtifactKind::Performance => {
                format!("{}_{}_{}_performance.json.gz", c, e, classifier)
            }
        }
    }
}

/// Gzip JSON artifacts under one root directory. Existing files are reused
/// as they are; callers invalidate when inputs change.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.kind.folder()).join(key.file_name())
    }

    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.path(key).is_file()
    }

    // Writes go to a sibling temp file first so a crash never leaves a
    // truncated artifact behind.
    fn write_atomically<F>(&self, key: &ArtifactKey, write: F) -> LinkerResult<PathBuf>
    where
        F: FnOnce(&mut GzEncoder<BufWriter<File>>) -> LinkerResult<()>,
    {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&tmp)?), Compression::default());
        write(&mut encoder)?;
        encoder.finish()?.flush()?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn store_json<T: Serialize>(&self, key: &ArtifactKey, value: &T) -> LinkerResult<PathBuf> {
        let path = self.write_atomically(key, |out| {
            serde_json::to_writer(out, value)?;
            Ok(())
        })?;
        debug!("Stored {}", path.display());
        Ok(path)
    }

    /// `None` when the artifact does not exist.
    pub fn load_json<T: DeserializeOwned>(&self, key: &ArtifactKey) -> LinkerResult<Option<T>> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let reader = BufReader::new(GzDecoder::new(File::open(&path)?));
        Ok(Some(serde_json::from_reader(reader)?))
    }

    pub fn write_jsonl<'a, T, I>(&self, key: &ArtifactKey, items: I) -> LinkerResult<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut count = 0;
        let path = self.write_atomically(key, |out| {
            for item in items {
                serde_json::to_writer(&mut *out, item)?;
                out.write_all(b"\n")?;
                count += 1;
            }
            Ok(())
        })?;
        debug!("Wrote {} lines to {}", count, path.display());
        Ok(count)
    }

    pub fn read_jsonl<T: DeserializeOwned>(&self, key: &ArtifactKey) -> LinkerResult<Option<Vec<T>>> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let reader = BufReader::new(GzDecoder::new(File::open(&path)?));
        let mut items = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(&line)?);
        }
        Ok(Some(items))
    }

    /// Reads any artifact; line-oriented kinds come back as one JSON array.
    pub fn load<T: DeserializeOwned>(&self, key: &ArtifactKey) -> LinkerResult<Option<T>> {
        if !key.kind.is_lines() {
            return self.load_json(key);
        }
        match self.read_jsonl::<Json>(key)? {
            Some(lines) => Ok(Some(serde_json::from_value(Json::Array(lines))?)),
            None => Ok(None),
        }
    }

    /// Writes any artifact; line-oriented kinds take a sequence, one item per line.
    pub fn store<T: Serialize>(&self, key: &ArtifactKey, value: &T) -> LinkerResult<()> {
        if !key.kind.is_lines() {
            self.store_json(key, value)?;
            return Ok(());
        }
        match serde_json::to_value(value)? {
            Json::Array(items) => {
                self.write_jsonl(key, &items)?;
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} holds one item per line, got a single value", key.file_name()),
            )
            .into()),
        }
    }

    /// Loads the artifact when present, otherwise awaits `compute` and stores
    /// its result. `Ok(None)` from `compute` means there is nothing to cache
    /// and is passed through without writing a file.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &ArtifactKey,
        compute: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<LinkerError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(value) = self.load(key)? {
            info!("Will reuse existing artifact '{}'", self.path(key).display());
            return Ok(Some(value));
        }
        let Some(value) = compute().await? else {
            return Ok(None);
        };
        self.store(key, &value)?;
        Ok(Some(value))
    }

    /// Removes one artifact; `false` when there was nothing to remove.
    pub fn invalidate(&self, key: &ArtifactKey) -> LinkerResult<bool> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!("Invalidated {}", path.display());
        Ok(true)
    }

    /// Removes every artifact of a catalog and entity type.
    pub fn invalidate_all(&self, catalog: &str, entity: &str) -> LinkerResult<usize> {
        let mut removed = 0;
        for kind in ArtifactKind::ALL {
            let keys: Vec<ArtifactKey> = if kind.is_per_classifier() {
                ClassifierKind::ALL
                    .iter()
                    .map(|c| ArtifactKey::classifier(kind, catalog, entity, *c))
                    .collect()
            } else if kind.is_per_goal() {
                [Goal::Training, Goal::Classification]
                    .iter()
                    .map(|g| ArtifactKey::dataset(kind, catalog, entity, *g))
                    .collect()
            } else {
                vec![ArtifactKey::links(catalog, entity)]
            };
            for key in keys {
                if self.invalidate(&key)? {
                    removed += 1;
                }
            }
        }
        info!("Removed {} artifacts for {} {}", removed, catalog, entity);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn cache() -> (tempfile::TempDir, ArtifactCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        (dir, cache)
    }

    #[test]
    fn test_file_names() {
        let key = ArtifactKey::dataset(
            ArtifactKind::CatalogExtract,
            "imdb",
            "actor",
            Goal::Training,
        );
        assert_eq!(key.file_name(), "imdb_actor_training_set.jsonl.gz");
        let key = ArtifactKey::classifier(
            ArtifactKind::Model,
            "discogs",
            "band",
            ClassifierKind::RandomForest,
        );
        assert_eq!(key.file_name(), "discogs_band_random_forest_model.json.gz");
        let (_dir, cache) = cache();
        assert!(cache.path(&key).ends_with("models/discogs_band_random_forest_model.json.gz"));
    }

    #[tokio::test]
    async fn test_get_or_compute_reuses_existing_artifact() {
        let (_dir, cache) = cache();
        let key = ArtifactKey::links("imdb", "actor");
        let calls = Cell::new(0);
        let first = cache
            .get_or_compute(&key, || async {
                calls.set(calls.get() + 1);
                Ok::<_, LinkerError>(Some(vec![1, 2, 3]))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_compute(&key, || async {
                calls.set(calls.get() + 1);
                Ok::<_, LinkerError>(Some(vec![9]))
            })
            .await
            .unwrap();
        assert_eq!(first, Some(vec![1, 2, 3]));
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_writes_extracts_as_lines() {
        let (_dir, cache) = cache();
        let key = ArtifactKey::dataset(
            ArtifactKind::CatalogExtract,
            "imdb",
            "actor",
            Goal::Training,
        );
        let rows = vec!["tt001".to_string(), "tt002".to_string()];
        let stored = cache
            .get_or_compute(&key, || async { Ok::<_, LinkerError>(Some(rows.clone())) })
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), Some(&rows));
        assert_eq!(cache.read_jsonl::<String>(&key).unwrap(), Some(rows.clone()));
        assert_eq!(cache.load::<Vec<String>>(&key).unwrap(), Some(rows));
    }

    #[tokio::test]
    async fn test_get_or_compute_skips_empty_results() {
        let (_dir, cache) = cache();
        let key = ArtifactKey::links("imdb", "actor");
        let nothing: Option<Vec<i32>> = cache
            .get_or_compute(&key, || async { Ok::<_, LinkerError>(None) })
            .await
            .unwrap();
        assert!(nothing.is_none());
        assert!(!cache.exists(&key));
    }

    #[test]
    fn test_store_rejects_single_value_for_lines() {
        let (_dir, cache) = cache();
        let key = ArtifactKey::classifier(
            ArtifactKind::Predictions,
            "imdb",
            "actor",
            ClassifierKind::NaiveBayes,
        );
        assert!(cache.store(&key, &7).is_err());
        assert!(!cache.exists(&key));
    }

    #[test]
    fn test_jsonl_round_trip_and_missing() {
        let (_dir, cache) = cache();
        let key = ArtifactKey::dataset(
            ArtifactKind::KnowledgeBaseExtract,
            "imdb",
            "actor",
            Goal::Classification,
        );
        assert!(cache.read_jsonl::<String>(&key).unwrap().is_none());
        let lines = vec!["a".to_string(), "b".to_string()];
        assert_eq!(cache.write_jsonl(&key, &lines).unwrap(), 2);
        assert_eq!(cache.read_jsonl::<String>(&key).unwrap(), Some(lines));
    }

    #[test]
    fn test_invalidate_all_only_touches_one_target() {
        let (_dir, cache) = cache();
        let mine = [
            ArtifactKey::links("imdb", "actor"),
            ArtifactKey::dataset(ArtifactKind::CatalogTable, "imdb", "actor", Goal::Training),
            ArtifactKey::classifier(
                ArtifactKind::Performance,
                "imdb",
                "actor",
                ClassifierKind::NaiveBayes,
            ),
        ];
        let other = ArtifactKey::links("imdb", "director");
        for key in mine.iter().chain(std::iter::once(&other)) {
            cache.store_json(key, &0).unwrap();
        }
        assert_eq!(cache.invalidate_all("imdb", "actor").unwrap(), 3);
        assert!(mine.iter().all(|k| !cache.exists(k)));
        assert!(cache.exists(&other));
        assert!(!cache.invalidate(&mine[0]).unwrap());
    }
}
