// tests/linkage.rs
use serde_json::json;

use linker_lib::candidate_generation::{block, label_pairs, training_candidates, BlockingStrategy};
use linker_lib::features::{extract_features, FeatureExtractor};
use linker_lib::models::{Goal, RawRecord, Side};
use linker_lib::preprocessing::preprocess;
use linker_lib::utils::constants::{NAME_TOKENS, TID};

fn record(value: serde_json::Value) -> RawRecord {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_alan_turing_end_to_end() {
    let kb = preprocess(
        Side::KnowledgeBase,
        Goal::Training,
        vec![record(json!({
            "qid": "Q1",
            "name": "Alan Turing",
            "tid": ["tt001"],
            "date_of_birth": "1912-06-23",
            "birth_precision": 11
        }))],
    )
    .unwrap();
    let catalog = preprocess(
        Side::Catalog,
        Goal::Training,
        vec![record(json!({
            "tid": "tt001",
            "name": "Alan Turing",
            "date_of_birth": "1912-06-23",
            "birth_precision": 11
        }))],
    )
    .unwrap();

    let pairs = block(&BlockingStrategy::column(TID), &kb, &catalog);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].kb_id, "Q1");
    assert_eq!(pairs[0].catalog_id, "tt001");
    assert_eq!(label_pairs(&pairs, &kb), vec![true]);

    let features = extract_features(&pairs, &kb, &catalog).unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features.column("name_levenshtein").unwrap(), vec![1.0]);
    assert_eq!(features.column("birth_date").unwrap(), vec![1.0]);
    // Neither side has URLs or a death date
    assert_eq!(features.column("url_exact").unwrap(), vec![0.0]);
    assert_eq!(features.column("death_date").unwrap(), vec![0.0]);
}

#[test]
fn test_empty_catalog_gives_empty_feature_table() {
    let kb = preprocess(
        Side::KnowledgeBase,
        Goal::Classification,
        vec![record(json!({"qid": "Q1", "name": "Alan Turing"}))],
    )
    .unwrap();
    let catalog = preprocess(Side::Catalog, Goal::Classification, Vec::new()).unwrap();

    let pairs = block(&BlockingStrategy::shared_tokens(NAME_TOKENS), &kb, &catalog);
    assert!(pairs.is_empty());
    let features = extract_features(&pairs, &kb, &catalog).unwrap();
    assert!(features.is_empty());
    assert_eq!(
        features.schema(),
        &FeatureExtractor::standard(0.0).schema()
    );
    assert_eq!(features.n_features(), 5);
}

#[test]
fn test_blocking_is_idempotent() {
    let kb = preprocess(
        Side::KnowledgeBase,
        Goal::Training,
        vec![
            record(json!({"qid": "Q1", "name": "John Smith", "tid": "t1"})),
            record(json!({"qid": "Q2", "name": "Jane Smith", "tid": "t2"})),
        ],
    )
    .unwrap();
    let catalog = preprocess(
        Side::Catalog,
        Goal::Training,
        vec![
            record(json!({"tid": "t1", "name": "John Smith"})),
            record(json!({"tid": "t2", "name": ["Jane Smith", "J. Smith"]})),
            record(json!({"tid": "t3", "name": "Someone Else"})),
        ],
    )
    .unwrap();

    let first = training_candidates(&kb, &catalog);
    let second = training_candidates(&kb, &catalog);
    assert_eq!(first, second);
    // Known links plus the two cross pairs sharing "smith"
    assert_eq!(first.len(), 4);
    assert_eq!(
        label_pairs(&first, &kb).iter().filter(|&&l| l).count(),
        2
    );
}
