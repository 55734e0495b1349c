// src/features/mod.rs
pub mod extraction;

pub use extraction::{extract_features, FeatureExtractor};
