// src/utils/progress_bars/progress_config.rs

use indicatif::{ProgressBar, ProgressStyle};
use std::env;

pub const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Configuration for progress tracking throughout the pipeline
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-epoch bars while training networks
    pub detailed: bool,
    /// Whether to show memory usage in stage summaries
    pub show_memory: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            show_memory: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            detailed: env::var("PROGRESS_DETAILED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            show_memory: env::var("PROGRESS_SHOW_MEMORY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// Quiet configuration for tests and library callers.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            detailed: false,
            show_memory: false,
        }
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }

    /// A styled bar of `len` steps, or a hidden one when progress is off.
    pub fn bar(&self, len: u64, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(message.to_string());
        pb
    }

    /// Same as `bar` but only when detailed progress is requested.
    pub fn detailed_bar(&self, len: u64, message: &str) -> ProgressBar {
        if self.should_show_detailed() {
            self.bar(len, message)
        } else {
            ProgressBar::hidden()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
        assert!(config.show_memory);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_DETAILED", "false");
        env::set_var("PROGRESS_SHOW_MEMORY", "not-a-bool");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(!config.detailed);
        assert!(config.show_memory);

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_DETAILED");
        env::remove_var("PROGRESS_SHOW_MEMORY");
    }

    #[test]
    fn test_disabled_bars_are_hidden() {
        let config = ProgressConfig::disabled();
        assert!(config.bar(10, "features").is_hidden());
        assert!(!config.should_show_detailed());
    }
}
