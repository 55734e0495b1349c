// src/candidate_generation/blocking.rs

use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::models::{CandidatePair, Cell, Table};
use crate::utils::constants::{NAME_TOKENS, TID};

/// How candidate pairs are proposed from two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockingStrategy {
    /// Pairs whose values in this column share at least one element
    Column(String),
    /// Pairs sharing at least one whitespace token in this column
    SharedTokens(String),
    /// Every knowledge base row against every catalog row
    Full,
}

impl BlockingStrategy {
    pub fn column(column: &str) -> Self {
        BlockingStrategy::Column(column.to_string())
    }

    pub fn shared_tokens(column: &str) -> Self {
        BlockingStrategy::SharedTokens(column.to_string())
    }

    /// Keys a cell contributes under this strategy.
    fn keys(&self, cell: &Cell) -> BTreeSet<String> {
        match self {
            BlockingStrategy::Column(_) => cell
                .values()
                .iter()
                .map(|v| v.to_text())
                .filter(|k| !k.is_empty())
                .collect(),
            BlockingStrategy::SharedTokens(_) => cell
                .values()
                .iter()
                .filter_map(|v| v.as_text())
                .flat_map(|text| text.split_whitespace().map(str::to_string))
                .collect(),
            BlockingStrategy::Full => BTreeSet::new(),
        }
    }
}

impl fmt::Display for BlockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingStrategy::Column(c) => write!(f, "column '{}'", c),
            BlockingStrategy::SharedTokens(c) => write!(f, "shared tokens of '{}'", c),
            BlockingStrategy::Full => f.write_str("full index"),
        }
    }
}

/// Proposes candidate pairs between the knowledge base and the catalog.
///
/// The result is sorted and free of duplicates, so it does not depend on
/// row order and blocking twice yields the same pairs.
pub fn block(strategy: &BlockingStrategy, kb: &Table, catalog: &Table) -> Vec<CandidatePair> {
    if kb.is_empty() || catalog.is_empty() {
        debug!("Blocking on {}: one side is empty, no pairs", strategy);
        return Vec::new();
    }

    let column = match strategy {
        BlockingStrategy::Column(c) | BlockingStrategy::SharedTokens(c) => c.as_str(),
        BlockingStrategy::Full => {
            let pairs: Vec<CandidatePair> = kb
                .ids()
                .flat_map(|q| catalog.ids().map(move |t| CandidatePair::new(q, t)))
                .collect();
            info!("Full index built: {} candidate pairs", pairs.len());
            return pairs;
        }
    };

    // Inverted index over the catalog side
    let mut index: HashMap<String, Vec<&str>> = HashMap::new();
    for (tid, row) in catalog.iter() {
        if let Some(cell) = row.get(column) {
            for key in strategy.keys(cell) {
                index.entry(key).or_default().push(tid);
            }
        }
    }
    debug!(
        "Blocking on {}: {} distinct catalog keys",
        strategy,
        index.len()
    );

    let mut pairs: BTreeSet<CandidatePair> = BTreeSet::new();
    for (qid, row) in kb.iter() {
        let Some(cell) = row.get(column) else { continue };
        for key in strategy.keys(cell) {
            if let Some(tids) = index.get(&key) {
                pairs.extend(tids.iter().map(|tid| CandidatePair::new(qid, *tid)));
            }
        }
    }

    info!(
        "Blocking index built on {}: {} candidate pairs",
        strategy,
        pairs.len()
    );
    pairs.into_iter().collect()
}

/// Training candidates: every known link plus name-token neighbours,
/// which supply the negative examples.
pub fn training_candidates(kb: &Table, catalog: &Table) -> Vec<CandidatePair> {
    let mut pairs: BTreeSet<CandidatePair> = block(&BlockingStrategy::column(TID), kb, catalog)
        .into_iter()
        .collect();
    pairs.extend(block(
        &BlockingStrategy::shared_tokens(NAME_TOKENS),
        kb,
        catalog,
    ));
    pairs.into_iter().collect()
}

/// `true` for pairs whose catalog id is among the knowledge base row's
/// known links.
pub fn label_pairs(pairs: &[CandidatePair], kb: &Table) -> Vec<bool> {
    pairs
        .iter()
        .map(|pair| {
            kb.cell(&pair.kb_id, TID)
                .values()
                .iter()
                .any(|v| v.to_text() == pair.catalog_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Row, Value};

    fn table(column: &str, rows: &[(&str, Vec<&str>)]) -> Table {
        let mut table = Table::new();
        for (id, values) in rows {
            let mut row = Row::new();
            row.insert(
                column.to_string(),
                Cell::from_values(values.iter().map(|v| Value::Text(v.to_string())).collect()),
            );
            table.insert(*id, row);
        }
        table
    }

    #[test]
    fn test_column_blocking_with_list_keys() {
        let kb = table(TID, &[("Q1", vec!["t1", "t2"]), ("Q2", vec!["t9"])]);
        let catalog = table(TID, &[("t1", vec!["t1"]), ("t2", vec!["t2"]), ("t3", vec!["t3"])]);
        let pairs = block(&BlockingStrategy::column(TID), &kb, &catalog);
        assert_eq!(
            pairs,
            vec![CandidatePair::new("Q1", "t1"), CandidatePair::new("Q1", "t2")]
        );
    }

    #[test]
    fn test_shared_token_blocking() {
        let kb = table(NAME_TOKENS, &[("Q1", vec!["alan turing"])]);
        let catalog = table(
            NAME_TOKENS,
            &[("t1", vec!["turing"]), ("t2", vec!["charles babbage"])],
        );
        let pairs = block(&BlockingStrategy::shared_tokens(NAME_TOKENS), &kb, &catalog);
        assert_eq!(pairs, vec![CandidatePair::new("Q1", "t1")]);
    }

    #[test]
    fn test_blocking_is_idempotent() {
        let kb = table(NAME_TOKENS, &[("Q2", vec!["ada lovelace"]), ("Q1", vec!["ada byron"])]);
        let catalog = table(NAME_TOKENS, &[("t2", vec!["ada"]), ("t1", vec!["byron"])]);
        let strategy = BlockingStrategy::shared_tokens(NAME_TOKENS);
        let first = block(&strategy, &kb, &catalog);
        let second = block(&strategy, &kb, &catalog);
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(first, sorted);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_empty_side_yields_no_pairs() {
        let kb = table(TID, &[("Q1", vec!["t1"])]);
        assert!(block(&BlockingStrategy::Full, &kb, &Table::new()).is_empty());
        assert!(block(&BlockingStrategy::column(TID), &Table::new(), &kb).is_empty());
    }

    #[test]
    fn test_full_index() {
        let kb = table(TID, &[("Q1", vec!["x"]), ("Q2", vec!["y"])]);
        let catalog = table(TID, &[("t1", vec!["z"])]);
        assert_eq!(block(&BlockingStrategy::Full, &kb, &catalog).len(), 2);
    }

    #[test]
    fn test_training_candidates_and_labels() {
        let mut kb = Table::new();
        let mut row = Row::new();
        row.insert(TID.to_string(), Cell::Scalar(Value::Text("t1".to_string())));
        row.insert(
            NAME_TOKENS.to_string(),
            Cell::Scalar(Value::Text("alan turing".to_string())),
        );
        kb.insert("Q1", row);

        let mut catalog = Table::new();
        for (tid, tokens) in [("t1", "alan turing"), ("t2", "alan smith"), ("t3", "grace hopper")] {
            let mut row = Row::new();
            row.insert(TID.to_string(), Cell::Scalar(Value::Text(tid.to_string())));
            row.insert(
                NAME_TOKENS.to_string(),
                Cell::Scalar(Value::Text(tokens.to_string())),
            );
            catalog.insert(tid, row);
        }

        let pairs = training_candidates(&kb, &catalog);
        assert_eq!(
            pairs,
            vec![CandidatePair::new("Q1", "t1"), CandidatePair::new("Q1", "t2")]
        );
        assert_eq!(label_pairs(&pairs, &kb), vec![true, false]);
    }
}
