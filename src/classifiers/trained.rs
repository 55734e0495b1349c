// src/classifiers/trained.rs
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::params::ParamSet;
use super::{build_classifier, Classifier, ClassifierKind, ClassifierModel, ClassifierOptions};
use crate::error::LinkerResult;
use crate::models::{FeatureSchema, FeatureTable};

/// A fitted classifier bound to the feature schema it was trained on.
#[derive(Serialize, Deserialize)]
pub struct TrainedModel {
    pub kind: ClassifierKind,
    pub catalog: String,
    pub entity: String,
    pub schema: FeatureSchema,
    pub params: ParamSet,
    pub training_rows: usize,
    pub trained_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub model: ClassifierModel,
}

impl TrainedModel {
    pub fn fit(
        kind: ClassifierKind,
        catalog: &str,
        entity: &str,
        options: &ClassifierOptions,
        features: &FeatureTable,
        labels: &[bool],
    ) -> LinkerResult<Self> {
        let mut model = build_classifier(kind, options)?;
        model.fit(features, labels)?;
        let trained = Self {
            kind,
            catalog: catalog.to_string(),
            entity: entity.to_string(),
            schema: features.schema().clone(),
            params: options.effective_params(kind),
            training_rows: features.len(),
            trained_at: Utc::now(),
            run_id: Uuid::new_v4(),
            model,
        };
        info!(
            "Trained {} for {} {} on {} rows (run {})",
            kind, catalog, entity, trained.training_rows, trained.run_id
        );
        Ok(trained)
    }

    /// Match probabilities; the table must carry the training schema.
    pub fn score(&self, features: &FeatureTable) -> LinkerResult<Vec<f64>> {
        self.schema.ensure_matches(features.schema())?;
        self.model.predict_proba(features)
    }

    pub fn predict(&self, features: &FeatureTable, threshold: f64) -> LinkerResult<Vec<bool>> {
        Ok(self
            .score(features)?
            .into_iter()
            .map(|p| p >= threshold)
            .collect())
    }

    pub fn describe(&self) -> String {
        format!(
            "{} model for {} {}\n  run: {}\n  trained at: {}\n  rows: {}\n  features: [{}]\n  params: {}\n  {}",
            self.kind,
            self.catalog,
            self.entity,
            self.run_id,
            self.trained_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.training_rows,
            self.schema.names.join(", "),
            self.params,
            self.model.summary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::{accuracy, separable};
    use crate::classifiers::NetworkSettings;
    use crate::error::LinkerError;
    use crate::models::CandidatePair;

    #[test]
    fn test_fit_score_and_json_round_trip() {
        let (features, labels) = separable(10);
        let trained = TrainedModel::fit(
            ClassifierKind::LogisticRegression,
            "discogs",
            "musician",
            &ClassifierOptions::default(),
            &features,
            &labels,
        )
        .unwrap();
        assert_eq!(
            accuracy(&trained.predict(&features, 0.5).unwrap(), &labels),
            1.0
        );

        let json = serde_json::to_string(&trained).unwrap();
        let restored: TrainedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.kind, ClassifierKind::LogisticRegression);
        let before = trained.score(&features).unwrap();
        let after = restored.score(&features).unwrap();
        assert!(before.iter().zip(&after).all(|(a, b)| (a - b).abs() < 1e-9));
        assert!(restored.describe().contains("discogs musician"));
    }

    #[test]
    fn test_every_kind_survives_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let options = ClassifierOptions {
            binarize: Some(0.5),
            params: ParamSet::new()
                .with("n_estimators", 10i64)
                .with("epochs", 50i64),
            network: NetworkSettings {
                checkpoint_dir: dir.path().to_path_buf(),
                ..NetworkSettings::default()
            },
            ..ClassifierOptions::default()
        };
        let (features, labels) = separable(10);
        for kind in ClassifierKind::ALL {
            let trained =
                TrainedModel::fit(kind, "imdb", "actor", &options, &features, &labels).unwrap();
            let json = serde_json::to_string(&trained).unwrap();
            let restored: TrainedModel = serde_json::from_str(&json)
                .unwrap_or_else(|e| panic!("{} did not reload: {}", kind.name(), e));
            assert_eq!(restored.kind, kind);
            let before = trained.score(&features).unwrap();
            let after = restored.score(&features).unwrap();
            assert_eq!(before.len(), after.len());
            assert!(
                before.iter().zip(&after).all(|(a, b)| (a - b).abs() < 1e-6),
                "{} scores changed after reload",
                kind.name()
            );
        }
    }

    #[test]
    fn test_score_rejects_other_schema() {
        let (features, labels) = separable(5);
        let trained = TrainedModel::fit(
            ClassifierKind::LinearSupportVectorMachine,
            "imdb",
            "actor",
            &ClassifierOptions::default(),
            &features,
            &labels,
        )
        .unwrap();
        let other = FeatureTable::from_rows(
            FeatureSchema::new(vec!["b".to_string(), "a".to_string()]),
            vec![CandidatePair::new("Q1", "t1")],
            vec![vec![0.5, 0.5]],
        )
        .unwrap();
        assert!(matches!(
            trained.score(&other),
            Err(LinkerError::SchemaMismatch { .. })
        ));
    }
}
