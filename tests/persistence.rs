// tests/persistence.rs
use linker_lib::classifiers::{ClassifierKind, ClassifierOptions, TrainedModel};
use linker_lib::dataset::{ArtifactCache, ArtifactKey, ArtifactKind};
use linker_lib::models::{CandidatePair, FeatureSchema, FeatureTable};

fn separable() -> (FeatureTable, Vec<bool>) {
    let schema = FeatureSchema::new(vec!["name_levenshtein".into(), "birth_date".into()]);
    let mut pairs = Vec::new();
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for i in 0..30 {
        let jitter = (i % 5) as f64 * 0.02;
        let positive = i % 2 == 0;
        pairs.push(CandidatePair::new(format!("Q{}", i), format!("t{}", i)));
        rows.push(if positive {
            vec![0.9 - jitter, 0.8 + jitter]
        } else {
            vec![0.1 + jitter, 0.2 - jitter]
        });
        labels.push(positive);
    }
    (FeatureTable::from_rows(schema, pairs, rows).unwrap(), labels)
}

#[test]
fn test_model_survives_the_artifact_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path());
    let (features, labels) = separable();

    for kind in [
        ClassifierKind::LogisticRegression,
        ClassifierKind::LinearSupportVectorMachine,
        ClassifierKind::RandomForest,
    ] {
        let mut options = ClassifierOptions::default();
        if kind == ClassifierKind::RandomForest {
            options.params.insert("n_estimators", 20i64);
        }
        let model = TrainedModel::fit(kind, "imdb", "actor", &options, &features, &labels).unwrap();
        let key = ArtifactKey::classifier(ArtifactKind::Model, "imdb", "actor", kind);
        cache.store_json(&key, &model).unwrap();

        let loaded: TrainedModel = cache.load_json(&key).unwrap().unwrap();
        assert_eq!(loaded.kind, kind);
        assert_eq!(loaded.schema, model.schema);
        assert_eq!(loaded.training_rows, 30);

        let before = model.score(&features).unwrap();
        let after = loaded.score(&features).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-9, "{} scores drifted: {} vs {}", kind, a, b);
        }
        let predicted = loaded.predict(&features, 0.5).unwrap();
        assert_eq!(predicted, labels, "{} misclassified separable data", kind);
    }
}
