// src/dataset/mod.rs
//! Dataset assembly: source extraction, preprocessing and the on-disk
//! artifact cache shared by every workflow.
pub mod builder;
pub mod cache;

pub use builder::{build_catalog, build_knowledge_base, BuildOutcome, Dataset, DatasetBuilder};
pub use cache::{ArtifactCache, ArtifactKey, ArtifactKind};
