//! Training module for the lesion classifier
//!
//! This module provides:
//! - The epoch loop with Adam and one-hot cross-entropy
//! - Batched evaluation with confusion matrix and per-class metrics
//! - Per-epoch loss/accuracy history and its SVG charts

pub mod trainer;

// Re-export main types for convenience
pub use trainer::{evaluate, one_hot_cross_entropy, Evaluation, Trainer, TrainingHistory, TrainingOutcome};

pub use crate::model::config::TrainingConfig;

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 50;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 16;
