//! Logging
//!
//! Installs the global `tracing` subscriber and provides two progress
//! reporters: one for image decoding and one for the epoch loop.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::utils::error::{LesionError, Result};

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Print the module path of each event
    pub show_target: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_target: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Debug level with module paths
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            show_target: true,
            ..Self::default()
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Build from a level name such as `"warn"`
    pub fn with_level_name(name: &str) -> Result<Self> {
        let level = name
            .parse::<Level>()
            .map_err(|_| LesionError::Config(format!("Unknown log level '{}'", name)))?;
        Ok(Self {
            level,
            ..Self::default()
        })
    }
}

/// Install the global subscriber; fails if one is already set
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_ansi(config.ansi)
        .with_target(config.show_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LesionError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Logs every tenth of a known amount of work
pub struct ProgressLogger {
    label: String,
    total: usize,
    done: usize,
    step: usize,
    started: Instant,
}

impl ProgressLogger {
    pub fn new(label: &str, total: usize) -> Self {
        Self {
            label: label.to_string(),
            total,
            done: 0,
            step: (total / 10).max(1),
            started: Instant::now(),
        }
    }

    pub fn increment(&mut self) {
        self.done += 1;
        if self.done % self.step == 0 || self.done == self.total {
            tracing::info!(
                "{}: {}/{} ({:.0}%)",
                self.label,
                self.done,
                self.total,
                100.0 * self.done as f64 / self.total.max(1) as f64
            );
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn finish(&self) {
        tracing::info!(
            "{}: {} items in {}",
            self.label,
            self.done,
            super::format_duration(self.started.elapsed().as_secs_f64())
        );
    }
}

/// Per-epoch log lines with an ETA
pub struct TrainingLogger {
    total_epochs: usize,
    epoch: usize,
    epoch_started: Instant,
    run_started: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            total_epochs,
            epoch: 0,
            epoch_started: now,
            run_started: now,
        }
    }

    /// `epoch` is zero-based
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_started = Instant::now();
        tracing::debug!("Epoch {}/{}", epoch + 1, self.total_epochs);
    }

    pub fn end_epoch(&self, train_loss: f64, train_accuracy: f64, test_loss: f64, test_accuracy: f64) {
        let finished = self.epoch + 1;
        let per_epoch = self.run_started.elapsed().as_secs_f64() / finished as f64;
        let eta = per_epoch * self.total_epochs.saturating_sub(finished) as f64;

        tracing::info!(
            "Epoch {}/{} ({:.1}s) loss {:.4} acc {:.2}% | test loss {:.4} acc {:.2}% | eta {}",
            finished,
            self.total_epochs,
            self.epoch_started.elapsed().as_secs_f64(),
            train_loss,
            train_accuracy * 100.0,
            test_loss,
            test_accuracy * 100.0,
            super::format_duration(eta)
        );
    }

    pub fn log_complete(&self, test_accuracy: f64) {
        tracing::info!(
            "Trained {} epochs in {}, test accuracy {:.2}%",
            self.total_epochs,
            super::format_duration(self.run_started.elapsed().as_secs_f64()),
            test_accuracy * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert_eq!(LogConfig::verbose().level, Level::DEBUG);
        assert!(LogConfig::verbose().show_target);
        assert_eq!(LogConfig::quiet().level, Level::ERROR);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(LogConfig::with_level_name("warn").unwrap().level, Level::WARN);
        assert_eq!(LogConfig::with_level_name("TRACE").unwrap().level, Level::TRACE);
        assert!(LogConfig::with_level_name("loud").is_err());
    }

    #[test]
    fn test_progress_counts() {
        let mut progress = ProgressLogger::new("Loading images", 3);
        progress.increment();
        progress.increment();
        assert_eq!(progress.done(), 2);
        progress.finish();
    }
}
