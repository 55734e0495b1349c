// src/features/extraction.rs
use indicatif::ProgressBar;
use log::{debug, info};

use crate::error::{LinkerError, LinkerResult};
use crate::matching::{Analyzer, CompareFeature, DateComparator, StringAlgorithm, StringList, UrlList};
use crate::models::{CandidatePair, Cell, FeatureSchema, FeatureTable, Table};
use crate::utils::constants::{
    DATE_OF_BIRTH, DATE_OF_DEATH, DESCRIPTION, FEATURE_MISSING_VALUE, NAME_TOKENS, URL,
};

/// Applies an ordered set of comparators to candidate pairs.
pub struct FeatureExtractor {
    features: Vec<Box<dyn CompareFeature>>,
}

impl FeatureExtractor {
    pub fn new(features: Vec<Box<dyn CompareFeature>>) -> Self {
        Self { features }
    }

    /// The fixed feature set every model is trained and scored on:
    /// `url_exact`, `birth_date`, `death_date`, `name_levenshtein`,
    /// `description_cosine`.
    pub fn standard(missing_value: f64) -> Self {
        Self::new(vec![
            Box::new(UrlList::new(URL, URL, "url_exact").with_missing_value(missing_value)),
            Box::new(
                DateComparator::new(DATE_OF_BIRTH, DATE_OF_BIRTH, "birth_date")
                    .with_missing_value(missing_value),
            ),
            Box::new(
                DateComparator::new(DATE_OF_DEATH, DATE_OF_DEATH, "death_date")
                    .with_missing_value(missing_value),
            ),
            Box::new(
                StringList::new(NAME_TOKENS, NAME_TOKENS, "name_levenshtein")
                    .with_missing_value(missing_value),
            ),
            Box::new(
                StringList::new(DESCRIPTION, DESCRIPTION, "description_cosine")
                    .with_algorithm(StringAlgorithm::Cosine)
                    .with_analyzer(Analyzer::Tokenizer)
                    .with_missing_value(missing_value),
            ),
        ])
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.features.iter().map(|f| f.label().to_string()).collect())
    }

    /// Computes one row per pair, in pair order. Both identifiers of every
    /// pair must exist in their table.
    pub fn extract(
        &self,
        pairs: &[CandidatePair],
        kb: &Table,
        catalog: &Table,
        progress: &ProgressBar,
    ) -> LinkerResult<FeatureTable> {
        let schema = self.schema();
        if pairs.is_empty() {
            debug!("No candidate pairs, empty feature table");
            return Ok(FeatureTable::new(schema));
        }
        for pair in pairs {
            if !kb.contains(&pair.kb_id) {
                return Err(LinkerError::UnknownIdentifier {
                    side: "knowledge base".to_string(),
                    id: pair.kb_id.clone(),
                });
            }
            if !catalog.contains(&pair.catalog_id) {
                return Err(LinkerError::UnknownIdentifier {
                    side: "catalog".to_string(),
                    id: pair.catalog_id.clone(),
                });
            }
        }

        info!(
            "Extracting {} features for {} candidate pairs ...",
            self.features.len(),
            pairs.len()
        );
        progress.set_length(self.features.len() as u64);

        let mut values = vec![Vec::with_capacity(self.features.len()); pairs.len()];
        for feature in &self.features {
            progress.set_message(feature.label().to_string());
            let left: Vec<&Cell> = pairs
                .iter()
                .map(|p| kb.cell(&p.kb_id, feature.left_on()))
                .collect();
            let right: Vec<&Cell> = pairs
                .iter()
                .map(|p| catalog.cell(&p.catalog_id, feature.right_on()))
                .collect();
            let scores = feature.compute(&left, &right)?;
            if scores.len() != pairs.len() {
                return Err(LinkerError::LengthMismatch {
                    left: pairs.len(),
                    right: scores.len(),
                });
            }
            for (row, score) in values.iter_mut().zip(scores) {
                row.push(score);
            }
            progress.inc(1);
        }
        progress.finish_with_message("features extracted");

        info!("Feature extraction done");
        FeatureTable::from_rows(schema, pairs.to_vec(), values)
    }
}

/// Extracts the standard feature set with the default missing value.
pub fn extract_features(
    pairs: &[CandidatePair],
    kb: &Table,
    catalog: &Table,
) -> LinkerResult<FeatureTable> {
    FeatureExtractor::standard(FEATURE_MISSING_VALUE).extract(
        pairs,
        kb,
        catalog,
        &ProgressBar::hidden(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Row, Value};

    #[test]
    fn test_standard_schema_order() {
        let schema = FeatureExtractor::standard(0.0).schema();
        assert_eq!(
            schema.names,
            vec![
                "url_exact",
                "birth_date",
                "death_date",
                "name_levenshtein",
                "description_cosine"
            ]
        );
    }

    #[test]
    fn test_empty_pairs_keep_columns() {
        let features = extract_features(&[], &Table::new(), &Table::new()).unwrap();
        assert!(features.is_empty());
        assert_eq!(features.n_features(), 5);
    }

    #[test]
    fn test_unknown_identifier_is_rejected() {
        let mut kb = Table::new();
        kb.insert("Q1", Row::new());
        let pairs = vec![CandidatePair::new("Q1", "t404")];
        let err = extract_features(&pairs, &kb, &Table::new()).unwrap_err();
        assert!(matches!(err, LinkerError::UnknownIdentifier { .. }));
    }

    #[test]
    fn test_all_missing_rows_get_missing_value() {
        let mut kb = Table::new();
        kb.insert("Q1", Row::new());
        let mut catalog = Table::new();
        let mut row = Row::new();
        row.insert(
            NAME_TOKENS.to_string(),
            Cell::Scalar(Value::Text("someone".to_string())),
        );
        catalog.insert("t1", row);

        let extractor = FeatureExtractor::standard(-1.0);
        let features = extractor
            .extract(
                &[CandidatePair::new("Q1", "t1")],
                &kb,
                &catalog,
                &ProgressBar::hidden(),
            )
            .unwrap();
        assert_eq!(features.rows(), &[vec![-1.0; 5]]);
    }
}
