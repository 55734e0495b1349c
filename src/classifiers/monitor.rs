// src/classifiers/monitor.rs
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::LinkerResult;

/// Metrics recorded after every training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub classifier: String,
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: f64,
    pub validation_accuracy: f64,
}

/// Appends epoch metrics as JSON lines and mirrors them to the debug log.
pub struct MetricsSink {
    writer: Option<BufWriter<File>>,
}

impl MetricsSink {
    /// A sink writing to `path`, or logging only when `path` is `None`.
    pub fn open(path: Option<&Path>) -> LinkerResult<Self> {
        let writer = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(BufWriter::new(file))
            }
            None => None,
        };
        Ok(Self { writer })
    }

    pub fn record(&mut self, metrics: &EpochMetrics) -> LinkerResult<()> {
        debug!(
            "[{}] epoch {}: loss={:.5} val_loss={:.5} val_accuracy={:.4}",
            metrics.classifier,
            metrics.epoch,
            metrics.train_loss,
            metrics.validation_loss,
            metrics.validation_accuracy
        );
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, metrics)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> LinkerResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
