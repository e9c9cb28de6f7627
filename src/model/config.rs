//! Pipeline Configuration Module
//!
//! Run parameters for the whole pipeline, the training hyperparameters and
//! the manifest stored next to a saved model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::split::SplitConfig;
use crate::dataset::{DEFAULT_IMAGE_SIZE, DEFAULT_SAMPLES_PER_CLASS};
use crate::training::{DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS};
use crate::utils::error::{LesionError, Result};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Seed for the per-epoch shuffle of the training set; weights are initialized unseeded
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Create a fast training config for debugging
    pub fn debug() -> Self {
        Self {
            epochs: 2,
            batch_size: 8,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(LesionError::Config("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(LesionError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(LesionError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything one pipeline run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// HAM10000 metadata CSV
    pub metadata_path: PathBuf,

    /// Root of the image tree (searched recursively)
    pub image_dir: PathBuf,

    /// Rows drawn per class when balancing
    pub samples_per_class: usize,

    /// Side length images are resized to
    pub image_size: usize,

    /// Dropout rate of the classifier head
    pub dropout: f64,

    /// Seed for class balancing
    pub balance_seed: u64,

    pub split: SplitConfig,

    pub training: TrainingConfig,

    /// Where charts, the confusion matrix and the model are written
    pub output_dir: Option<PathBuf>,

    /// Save the trained model and its manifest under `output_dir`
    pub save_model: bool,

    /// Image to classify after training
    pub predict_image: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metadata_path: PathBuf::from("data/HAM10000_metadata.csv"),
            image_dir: PathBuf::from("data"),
            samples_per_class: DEFAULT_SAMPLES_PER_CLASS,
            image_size: DEFAULT_IMAGE_SIZE,
            dropout: super::DEFAULT_DROPOUT,
            balance_seed: 42,
            split: SplitConfig::default(),
            training: TrainingConfig::default(),
            output_dir: None,
            save_model: false,
            predict_image: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_class == 0 {
            return Err(LesionError::Config(
                "samples_per_class must be greater than 0".to_string(),
            ));
        }
        if self.save_model && self.output_dir.is_none() {
            return Err(LesionError::Config(
                "save_model requires an output directory".to_string(),
            ));
        }
        self.split.validate()?;
        self.training.validate()
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LesionError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Metadata saved next to the model weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Class names in label-id order
    pub class_names: Vec<String>,
    pub image_size: usize,
    pub dropout: f64,
    pub test_accuracy: f64,
    pub epochs: usize,
    /// RFC 3339 timestamp
    pub created_at: String,
}

impl ModelManifest {
    pub const FILE_NAME: &'static str = "manifest.json";

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(Self::FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            return Err(LesionError::PathNotFound(path));
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.samples_per_class, 400);
        assert_eq!(config.image_size, 32);
        assert_eq!(config.split.test_fraction, 0.25);
        assert_eq!(config.training.epochs, DEFAULT_EPOCHS);
        assert_eq!(config.training.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!((DEFAULT_EPOCHS, DEFAULT_BATCH_SIZE), (50, 16));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut config = PipelineConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.save_model = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "samples_per_class": 10, "training": { "epochs": 3 } }"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.samples_per_class, 10);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 16);
        assert_eq!(config.image_size, 32);

        let saved = dir.path().join("saved.json");
        config.save(&saved).unwrap();
        assert_eq!(PipelineConfig::load(&saved).unwrap(), config);
    }

    #[test]
    fn test_manifest_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ModelManifest {
            class_names: vec!["mel".to_string(), "nv".to_string()],
            image_size: 32,
            dropout: 0.5,
            test_accuracy: 0.71,
            epochs: 50,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        };

        manifest.save(dir.path()).unwrap();
        assert_eq!(ModelManifest::load(dir.path()).unwrap(), manifest);
    }
}
