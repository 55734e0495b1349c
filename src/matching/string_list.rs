// src/matching/string_list.rs
use log::debug;
use std::fmt;
use std::str::FromStr;

use crate::error::{LinkerError, LinkerResult};
use crate::matching::vectorizer::{cosine, Analyzer, CountVectorizer};
use crate::matching::{bounded, ensure_aligned, texts, CompareFeature};
use crate::models::Cell;
use crate::utils::constants::FEATURE_MISSING_VALUE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringAlgorithm {
    Levenshtein,
    Cosine,
}

impl StringAlgorithm {
    pub const NAMES: &'static str = "levenshtein, cosine";
}

impl FromStr for StringAlgorithm {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "levenshtein" => Ok(StringAlgorithm::Levenshtein),
            "cosine" => Ok(StringAlgorithm::Cosine),
            other => Err(LinkerError::UnknownAlgorithm {
                value: other.to_string(),
                allowed: Self::NAMES.to_string(),
            }),
        }
    }
}

impl fmt::Display for StringAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringAlgorithm::Levenshtein => f.write_str("levenshtein"),
            StringAlgorithm::Cosine => f.write_str("cosine"),
        }
    }
}

/// Similarity between two columns of string lists.
///
/// Levenshtein averages `1 - distance / max(len)` over the cross product
/// of both lists. Cosine joins each list into one document and compares
/// term-count vectors over a vocabulary fitted on the whole batch, so its
/// scores depend on the other rows passed in the same call.
#[derive(Debug, Clone)]
pub struct StringList {
    left_on: String,
    right_on: String,
    label: String,
    algorithm: StringAlgorithm,
    threshold: Option<f64>,
    missing_value: f64,
    analyzer: Analyzer,
    ngram_range: (usize, usize),
}

impl StringList {
    pub fn new(left_on: &str, right_on: &str, label: &str) -> Self {
        Self {
            left_on: left_on.to_string(),
            right_on: right_on.to_string(),
            label: label.to_string(),
            algorithm: StringAlgorithm::Levenshtein,
            threshold: None,
            missing_value: FEATURE_MISSING_VALUE,
            analyzer: Analyzer::Whitespace,
            ngram_range: (2, 2),
        }
    }

    /// Builds a comparator from configuration names, failing on unknown
    /// algorithm or analyzer names.
    pub fn from_names(
        left_on: &str,
        right_on: &str,
        label: &str,
        algorithm: &str,
        analyzer: &str,
    ) -> LinkerResult<Self> {
        Ok(Self::new(left_on, right_on, label)
            .with_algorithm(algorithm.parse()?)
            .with_analyzer(analyzer.parse()?))
    }

    pub fn with_algorithm(mut self, algorithm: StringAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_ngram_range(mut self, ngram_range: (usize, usize)) -> Self {
        self.ngram_range = ngram_range;
        self
    }

    /// Scores at or above the threshold become 1.0, the rest 0.0.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_missing_value(mut self, missing_value: f64) -> Self {
        self.missing_value = missing_value;
        self
    }

    fn finish(&self, score: Option<f64>) -> f64 {
        match (score, self.threshold) {
            (None, _) => self.missing_value,
            (Some(s), _) if s.is_nan() => self.missing_value,
            (Some(s), Some(t)) => {
                if s >= t {
                    1.0
                } else {
                    0.0
                }
            }
            (Some(s), None) => s,
        }
    }

    fn levenshtein(&self, left: &Cell, right: &Cell) -> LinkerResult<Option<f64>> {
        let a: Vec<&str> = texts(bounded(left, &self.left_on), &self.left_on)?
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        let b: Vec<&str> = texts(bounded(right, &self.right_on), &self.right_on)?
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if a.is_empty() || b.is_empty() {
            return Ok(None);
        }
        let total: f64 = a
            .iter()
            .flat_map(|x| b.iter().map(move |y| strsim::normalized_levenshtein(x, y)))
            .sum();
        Ok(Some(total / (a.len() * b.len()) as f64))
    }

    fn document(cell: &Cell, column: &str) -> LinkerResult<Option<String>> {
        let joined = texts(bounded(cell, column), column)?.join(" ");
        Ok((!joined.trim().is_empty()).then_some(joined))
    }

    fn cosine(&self, left: &[&Cell], right: &[&Cell]) -> LinkerResult<Vec<f64>> {
        let left_docs = left
            .iter()
            .map(|c| Self::document(c, &self.left_on))
            .collect::<LinkerResult<Vec<_>>>()?;
        let right_docs = right
            .iter()
            .map(|c| Self::document(c, &self.right_on))
            .collect::<LinkerResult<Vec<_>>>()?;

        let mut vectorizer = CountVectorizer::new(self.analyzer, self.ngram_range);
        vectorizer.fit(
            left_docs
                .iter()
                .chain(&right_docs)
                .flatten()
                .map(String::as_str),
        );
        if vectorizer.vocabulary_len() == 0 {
            debug!(
                "Empty vocabulary for '{}', every {} score is missing",
                self.label, self.algorithm
            );
            return Ok(vec![self.missing_value; left.len()]);
        }

        Ok(left_docs
            .iter()
            .zip(&right_docs)
            .map(|(l, r)| {
                let score = match (l, r) {
                    (Some(l), Some(r)) => {
                        cosine(&vectorizer.transform(l), &vectorizer.transform(r))
                    }
                    _ => None,
                };
                self.finish(score)
            })
            .collect())
    }
}

impl CompareFeature for StringList {
    fn label(&self) -> &str {
        &self.label
    }

    fn left_on(&self) -> &str {
        &self.left_on
    }

    fn right_on(&self) -> &str {
        &self.right_on
    }

    fn compute(&self, left: &[&Cell], right: &[&Cell]) -> LinkerResult<Vec<f64>> {
        ensure_aligned(left, right)?;
        match self.algorithm {
            StringAlgorithm::Levenshtein => left
                .iter()
                .zip(right)
                .map(|(l, r)| Ok(self.finish(self.levenshtein(l, r)?)))
                .collect(),
            StringAlgorithm::Cosine => self.cosine(left, right),
        }
    }
}
