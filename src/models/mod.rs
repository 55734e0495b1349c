// src/models/mod.rs
pub mod core;
pub mod date;
pub mod matching;
pub mod stats_models;

pub use self::core::{Cell, Goal, RawRecord, Row, Side, Table, Value};
pub use date::{DatePrecision, DateValue};
pub use matching::{CandidatePair, FeatureSchema, FeatureTable, LinkPrediction};
pub use stats_models::{ConfusionCounts, MetricSummary, PerformanceReport};
