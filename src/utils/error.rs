//! Error type shared by every pipeline stage

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LesionError {
    /// The file exists but could not be decoded as an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// No file under the image root has this stem
    #[error("No image file found for image id '{0}'")]
    ImageNotFound(String),

    #[error("Metadata error: {0}")]
    Csv(#[from] csv::Error),

    /// Diagnosis string the encoder was not fit on
    #[error("Unknown diagnosis label '{0}'")]
    UnknownLabel(String),

    #[error("Label id {id} is out of range for {num_classes} classes")]
    UnknownLabelId { id: usize, num_classes: usize },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, LesionError>;
