// src/utils/progress_bars/logging.rs - Stage logging helpers for the linkage pipeline
use log::{info, warn};
use std::time::Instant;

use crate::utils::get_memory_usage;

/// Prefixes every line with the pipeline stage and tracks elapsed time.
#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    target: String,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage_name: &'static str, stage_emoji: &'static str, target: &str) -> Self {
        Self {
            stage_name,
            stage_emoji,
            target: target.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn training(target: &str) -> Self {
        Self::new("TRAIN", "🏋️", target)
    }

    pub fn classification(target: &str) -> Self {
        Self::new("CLASSIFY", "🔗", target)
    }

    pub fn evaluation(target: &str) -> Self {
        Self::new("EVALUATE", "📏", target)
    }

    pub fn dataset(target: &str) -> Self {
        Self::new("DATASET", "📦", target)
    }

    pub fn log_start(&self, run_id: &str, details: &str) {
        info!(
            "[{}] {} 🚀 Starting {} for {} (run ID: {}) {}",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            self.target,
            run_id,
            details
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name,
                self.stage_emoji,
                phase,
                details,
                elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name,
                self.stage_emoji,
                phase,
                elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_data_loaded(&self, count: usize, data_type: &str) {
        info!(
            "[{}] {} 📊 Loaded {} {} records",
            self.stage_name, self.stage_emoji, count, data_type
        );
    }

    pub fn log_no_data(&self, reason: &str) {
        warn!(
            "[{}] {} ⏭️  Nothing to do for {}: {}",
            self.stage_name, self.stage_emoji, self.target, reason
        );
    }

    pub fn log_cache_hit(&self, artifact: &str) {
        info!(
            "[{}] {} ♻️  Reusing cached {}",
            self.stage_name, self.stage_emoji, artifact
        );
    }

    pub fn log_completion(&self, summary: &str, show_memory: bool) {
        let elapsed = self.start_time.elapsed();
        if show_memory {
            info!(
                "[{}] {} ✅ Completed in {:.2?}: {} (memory: {} MB)",
                self.stage_name,
                self.stage_emoji,
                elapsed,
                summary,
                get_memory_usage()
            );
        } else {
            info!(
                "[{}] {} ✅ Completed in {:.2?}: {}",
                self.stage_name, self.stage_emoji, elapsed, summary
            );
        }
    }
}
