// src/utils/config.rs
use log::info;
use std::env;
use std::path::PathBuf;

use crate::utils::constants::{
    CONFIDENCE_THRESHOLD, DEFAULT_EVALUATION_FOLDS, DEFAULT_PAGE_SIZE, DEFAULT_SEED,
    DEFAULT_SHARED_DIR, FEATURE_MISSING_VALUE, NN_EARLY_STOPPING_PATIENCE, NN_VALIDATION_SPLIT,
};

/// Pipeline-wide settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkerConfig {
    /// Root of every cached artifact: extracts, tables, models, results
    pub shared_dir: PathBuf,
    pub missing_value: f64,
    pub confidence_threshold: f64,
    pub page_size: usize,
    pub nn_patience: usize,
    pub nn_validation_split: f64,
    pub evaluation_folds: usize,
    pub seed: u64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            shared_dir: PathBuf::from(DEFAULT_SHARED_DIR),
            missing_value: FEATURE_MISSING_VALUE,
            confidence_threshold: CONFIDENCE_THRESHOLD,
            page_size: DEFAULT_PAGE_SIZE,
            nn_patience: NN_EARLY_STOPPING_PATIENCE,
            nn_validation_split: NN_VALIDATION_SPLIT,
            evaluation_folds: DEFAULT_EVALUATION_FOLDS,
            seed: DEFAULT_SEED,
        }
    }
}

impl LinkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let validation_split: f64 = env::var("LINKER_NN_VALIDATION_SPLIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.nn_validation_split);

        Self {
            shared_dir: env::var("LINKER_SHARED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.shared_dir),
            missing_value: env::var("LINKER_MISSING_VALUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.missing_value),
            confidence_threshold: env::var("LINKER_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            page_size: env::var("LINKER_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&size: &usize| size > 0)
                .unwrap_or(defaults.page_size),
            nn_patience: env::var("LINKER_NN_PATIENCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.nn_patience),
            nn_validation_split: if (0.0..1.0).contains(&validation_split) {
                validation_split
            } else {
                defaults.nn_validation_split
            },
            evaluation_folds: env::var("LINKER_EVALUATION_FOLDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&folds: &usize| folds >= 2)
                .unwrap_or(defaults.evaluation_folds),
            seed: env::var("LINKER_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.seed),
        }
    }

    pub fn log_config(&self) {
        info!("Linker configuration:");
        info!("  Shared directory: {}", self.shared_dir.display());
        info!("  Feature missing value: {}", self.missing_value);
        info!("  Confidence threshold: {}", self.confidence_threshold);
        info!("  Page size: {}", self.page_size);
        info!(
            "  Neural network early stopping: patience {}, validation split {}",
            self.nn_patience, self.nn_validation_split
        );
        info!("  Evaluation folds: {}", self.evaluation_folds);
        info!("  Seed: {}", self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkerConfig::default();
        assert_eq!(config.missing_value, 0.0);
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.evaluation_folds, 5);
    }

    #[test]
    fn test_env_config() {
        env::set_var("LINKER_SHARED_DIR", "/tmp/linker-test");
        env::set_var("LINKER_PAGE_SIZE", "250");
        env::set_var("LINKER_NN_VALIDATION_SPLIT", "1.5");
        env::set_var("LINKER_EVALUATION_FOLDS", "1");

        let config = LinkerConfig::from_env();
        assert_eq!(config.shared_dir, PathBuf::from("/tmp/linker-test"));
        assert_eq!(config.page_size, 250);
        // Out of range values fall back to defaults
        assert_eq!(config.nn_validation_split, NN_VALIDATION_SPLIT);
        assert_eq!(config.evaluation_folds, DEFAULT_EVALUATION_FOLDS);

        env::remove_var("LINKER_SHARED_DIR");
        env::remove_var("LINKER_PAGE_SIZE");
        env::remove_var("LINKER_NN_VALIDATION_SPLIT");
        env::remove_var("LINKER_EVALUATION_FOLDS");
    }
}
