//! Model module for the lesion CNN using the Burn framework
//!
//! This module provides:
//! - The two-block CNN classifier
//! - Pipeline and training configuration
//! - The manifest saved alongside model weights

pub mod cnn;
pub mod config;

// Re-export main types for convenience
pub use cnn::{LesionClassifier, LesionClassifierConfig};
pub use config::{ModelManifest, PipelineConfig, TrainingConfig};

/// Default dropout rate for regularization
pub const DEFAULT_DROPOUT: f64 = 0.5;
