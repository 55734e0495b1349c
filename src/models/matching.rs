// src/models/matching.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LinkerError, LinkerResult};

/// A (knowledge base item, catalog entity) pair proposed by blocking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    pub kb_id: String,
    pub catalog_id: String,
}

impl CandidatePair {
    pub fn new(kb_id: impl Into<String>, catalog_id: impl Into<String>) -> Self {
        Self {
            kb_id: kb_id.into(),
            catalog_id: catalog_id.into(),
        }
    }
}

/// Ordered feature names plus a fingerprint, stored alongside every model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub names: Vec<String>,
    pub fingerprint: String,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        let mut hasher = Sha256::new();
        for name in &names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        let fingerprint = hex::encode(hasher.finalize());
        Self { names, fingerprint }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Errors unless `other` has exactly the same features in the same order.
    pub fn ensure_matches(&self, other: &FeatureSchema) -> LinkerResult<()> {
        if self.fingerprint != other.fingerprint {
            return Err(LinkerError::SchemaMismatch {
                expected: self.names.clone(),
                found: other.names.clone(),
            });
        }
        Ok(())
    }
}

/// Numeric features, one row per candidate pair, columns in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    schema: FeatureSchema,
    index: Vec<CandidatePair>,
    values: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            index: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a table from raw rows; every row must have one value per feature.
    pub fn from_rows(
        schema: FeatureSchema,
        index: Vec<CandidatePair>,
        values: Vec<Vec<f64>>,
    ) -> LinkerResult<Self> {
        if index.len() != values.len() {
            return Err(LinkerError::LengthMismatch {
                left: index.len(),
                right: values.len(),
            });
        }
        if let Some(bad) = values.iter().find(|row| row.len() != schema.len()) {
            return Err(LinkerError::LengthMismatch {
                left: schema.len(),
                right: bad.len(),
            });
        }
        Ok(Self {
            schema,
            index,
            values,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn index(&self) -> &[CandidatePair] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.schema.len()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let position = self.schema.names.iter().position(|n| n == name)?;
        Some(self.values.iter().map(|row| row[position]).collect())
    }

    /// A new table holding the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> FeatureTable {
        FeatureTable {
            schema: self.schema.clone(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// A scored link emitted by classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPrediction {
    pub qid: String,
    pub tid: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_schema_fingerprint_depends_on_order() {
        let a = schema(&["url", "name"]);
        let b = schema(&["name", "url"]);
        assert_ne!(a.fingerprint, b.fingerprint);
        assert!(a.ensure_matches(&schema(&["url", "name"])).is_ok());
        assert!(matches!(
            a.ensure_matches(&b),
            Err(LinkerError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_from_rows_checks_widths() {
        let s = schema(&["a", "b"]);
        let pairs = vec![CandidatePair::new("Q1", "t1")];
        assert!(FeatureTable::from_rows(s.clone(), pairs.clone(), vec![vec![1.0]]).is_err());
        let table = FeatureTable::from_rows(s, pairs, vec![vec![1.0, 0.5]]).unwrap();
        assert_eq!(table.column("b"), Some(vec![0.5]));
    }

    #[test]
    fn test_select_rows() {
        let s = schema(&["a"]);
        let pairs = vec![
            CandidatePair::new("Q1", "t1"),
            CandidatePair::new("Q2", "t2"),
            CandidatePair::new("Q3", "t3"),
        ];
        let table =
            FeatureTable::from_rows(s, pairs, vec![vec![0.1], vec![0.2], vec![0.3]]).unwrap();
        let picked = table.select(&[2, 0]);
        assert_eq!(picked.rows(), &[vec![0.3], vec![0.1]]);
        assert_eq!(picked.index()[0].kb_id, "Q3");
    }
}
