//! # HAM10000 Skin Lesion Classifier
//!
//! A Rust library that trains a small convolutional network on the HAM10000
//! dermatoscopic image collection using the Burn framework.
//!
//! ## Features
//!
//! - **Metadata loading** from the HAM10000 CSV with per-column statistics
//! - **Class balancing** by seeded resampling with replacement
//! - **Burn CNN** with two convolutional blocks and a dense head
//! - **Evaluation** with confusion matrix, per-class error and SVG curves
//! - **Single-image prediction** from a saved model
//!
//! ## Modules
//!
//! - `dataset`: Metadata, label encoding, balancing, image loading, splitting
//! - `model`: CNN architecture and run configuration
//! - `training`: Epoch loop and evaluation
//! - `inference`: Preprocessing, prediction and model persistence
//! - `pipeline`: The end-to-end run
//! - `utils`: Logging, metrics, charts and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ham10000_cnn::backend::TrainingBackend;
//! use ham10000_cnn::model::config::PipelineConfig;
//! use ham10000_cnn::pipeline::run_pipeline;
//!
//! let config = PipelineConfig::default();
//! let report = run_pipeline::<TrainingBackend>(&config)?;
//! println!("Test accuracy: {:.2}%", report.test_accuracy() * 100.0);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::split::{DatasetSplits, SplitConfig};
pub use dataset::{
    ClassBalancer, ImageIndex, ImageLoader, LabelEncoder, LesionBatch, LesionBatcher,
    LesionBurnDataset, LesionItem, MetadataTable,
};
pub use inference::predictor::{predict_image, PredictionResult};
pub use model::cnn::{LesionClassifier, LesionClassifierConfig};
pub use model::config::{ModelManifest, PipelineConfig};
pub use pipeline::{run_pipeline, PipelineReport};
pub use training::trainer::{Evaluation, Trainer, TrainingHistory};
pub use training::TrainingConfig;
pub use utils::error::{LesionError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

pub use dataset::{NUM_CLASSES, DEFAULT_IMAGE_SIZE as IMAGE_SIZE};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
