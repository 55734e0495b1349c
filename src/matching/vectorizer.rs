// src/matching/vectorizer.rs
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::LinkerError;
use crate::preprocessing::tokenize::{normalize, tokenize};

static WORD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("word pattern compiles"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\s+").expect("whitespace pattern compiles"));

/// How a document is split into countable terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    /// Plain whitespace split, no normalization
    Whitespace,
    /// The preprocessing tokenizer
    Tokenizer,
    /// Normalized word n-grams
    Word,
    /// Character n-grams over the whole normalized document
    Char,
    /// Character n-grams inside space-padded words
    CharWb,
}

impl Analyzer {
    pub const NAMES: &'static str = "whitespace, tokenizer, word, char, char_wb";
}

impl FromStr for Analyzer {
    type Err = LinkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whitespace" => Ok(Analyzer::Whitespace),
            "tokenizer" => Ok(Analyzer::Tokenizer),
            "word" => Ok(Analyzer::Word),
            "char" => Ok(Analyzer::Char),
            "char_wb" => Ok(Analyzer::CharWb),
            other => Err(LinkerError::UnknownAnalyzer {
                value: other.to_string(),
                allowed: Self::NAMES.to_string(),
            }),
        }
    }
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Analyzer::Whitespace => "whitespace",
            Analyzer::Tokenizer => "tokenizer",
            Analyzer::Word => "word",
            Analyzer::Char => "char",
            Analyzer::CharWb => "char_wb",
        };
        f.write_str(name)
    }
}

/// Sparse term counts: vocabulary index to count.
pub type SparseVector = BTreeMap<usize, f64>;

/// Term-count vectorizer whose vocabulary is fitted on a batch of documents.
#[derive(Debug, Clone)]
pub struct CountVectorizer {
    analyzer: Analyzer,
    ngram_range: (usize, usize),
    vocabulary: HashMap<String, usize>,
}

impl CountVectorizer {
    pub fn new(analyzer: Analyzer, ngram_range: (usize, usize)) -> Self {
        let (low, high) = ngram_range;
        let low = low.max(1);
        Self {
            analyzer,
            ngram_range: (low, high.max(low)),
            vocabulary: HashMap::new(),
        }
    }

    pub fn analyze(&self, doc: &str) -> Vec<String> {
        match self.analyzer {
            Analyzer::Whitespace => doc.split_whitespace().map(str::to_string).collect(),
            Analyzer::Tokenizer => tokenize(doc),
            Analyzer::Word => {
                let normalized = normalize(doc);
                let words: Vec<&str> = WORD_TOKEN
                    .find_iter(&normalized)
                    .map(|m| m.as_str())
                    .collect();
                let mut terms = Vec::new();
                for n in self.ngram_range.0..=self.ngram_range.1 {
                    terms.extend(words.windows(n).map(|w| w.join(" ")));
                }
                terms
            }
            Analyzer::Char => {
                let normalized = normalize(doc);
                let collapsed = WHITESPACE.replace_all(&normalized, " ");
                let chars: Vec<char> = collapsed.chars().collect();
                let mut terms = Vec::new();
                for n in self.ngram_range.0..=self.ngram_range.1 {
                    terms.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
                }
                terms
            }
            Analyzer::CharWb => {
                let normalized = normalize(doc);
                let mut terms = Vec::new();
                for word in normalized.split_whitespace() {
                    let padded: Vec<char> = format!(" {} ", word).chars().collect();
                    for n in self.ngram_range.0..=self.ngram_range.1 {
                        if padded.len() <= n {
                            terms.push(padded.iter().collect());
                            break;
                        }
                        terms.extend(padded.windows(n).map(|w| w.iter().collect::<String>()));
                    }
                }
                terms
            }
        }
    }

    /// Learns the vocabulary of a batch. Terms get indices in sorted order.
    pub fn fit<'a, I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut terms: Vec<String> = docs.into_iter().flat_map(|d| self.analyze(d)).collect();
        terms.sort();
        terms.dedup();
        self.vocabulary = terms.into_iter().enumerate().map(|(i, t)| (t, i)).collect();
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn transform(&self, doc: &str) -> SparseVector {
        let mut counts = SparseVector::new();
        for term in self.analyze(doc) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }
        counts
    }
}

/// Cosine similarity of two sparse vectors; `None` when either is all zeros.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> Option<f64> {
    let norm = |v: &SparseVector| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(i, x)| b.get(i).map(|y| x * y))
        .sum();
    Some((dot / (na * nb)).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_analyzer_lists_allowed() {
        let err = "bpe".parse::<Analyzer>().unwrap_err();
        match err {
            LinkerError::UnknownAnalyzer { value, allowed } => {
                assert_eq!(value, "bpe");
                assert!(allowed.contains("char_wb"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_char_wb_ngrams() {
        let v = CountVectorizer::new(Analyzer::CharWb, (2, 2));
        assert_eq!(v.analyze("Ab"), vec![" a", "ab", "b "]);
    }

    #[test]
    fn test_word_bigrams() {
        let v = CountVectorizer::new(Analyzer::Word, (1, 2));
        assert_eq!(
            v.analyze("Alan Mathison Turing"),
            vec!["alan", "mathison", "turing", "alan mathison", "mathison turing"]
        );
    }

    #[test]
    fn test_cosine_of_identical_and_disjoint_docs() {
        let mut v = CountVectorizer::new(Analyzer::Whitespace, (1, 1));
        v.fit(["british mathematician", "american actor"]);
        let a = v.transform("british mathematician");
        let b = v.transform("american actor");
        assert!((cosine(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(cosine(&a, &b), Some(0.0));
        assert_eq!(cosine(&a, &v.transform("unseen words")), None);
    }
}
