//! Inference module for single-image prediction
//!
//! This module provides:
//! - The same preprocessing the trainer applies
//! - Softmax prediction mapped back to a diagnosis code and lesion type
//! - Saving and loading a trained model with its manifest

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{load_model, predict_image, preprocess_image, save_model, PredictionResult, RankedClass};
