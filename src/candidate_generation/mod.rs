// src/candidate_generation/mod.rs
pub mod blocking;

pub use blocking::{block, label_pairs, training_candidates, BlockingStrategy};
