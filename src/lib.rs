// src/lib.rs
pub mod candidate_generation;
pub mod classifiers;
pub mod dataset;
pub mod error;
pub mod features;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod sources;
pub mod utils;

pub use error::{LinkerError, LinkerResult};
