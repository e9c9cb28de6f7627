//! Single-image prediction
//!
//! Classifies a single lesion image with a trained model and handles
//! saving and loading the model together with its manifest.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor, TensorData},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::images::{decode_resized, hwc_to_chw_normalized};
use crate::dataset::{lesion_type_name, CHANNELS};
use crate::model::cnn::{LesionClassifier, LesionClassifierConfig};
use crate::model::config::ModelManifest;
use crate::utils::error::{LesionError, Result};

/// File stem of the saved weights; the recorder appends `.mpk`
pub const MODEL_FILE_STEM: &str = "model";

/// Number of entries kept in `PredictionResult::ranked`
pub const TOP_K: usize = 3;

/// Load an image and apply the training preprocessing
///
/// Exact resize to `image_size`, RGB, scaled to `[0, 1]`, CHW layout.
pub fn preprocess_image(path: &Path, image_size: usize) -> Result<Vec<f32>> {
    if !path.exists() {
        return Err(LesionError::PathNotFound(path.to_path_buf()));
    }
    let rgb = decode_resized(path, image_size)?;
    Ok(hwc_to_chw_normalized(rgb.as_raw(), image_size))
}

/// One entry of the ranked class list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub label_id: usize,
    pub diagnosis: String,
    pub probability: f32,
}

/// Outcome of classifying one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub image_path: Option<PathBuf>,
    /// Argmax of `probabilities`
    pub label_id: usize,
    /// Diagnosis code of `label_id`, e.g. `mel`
    pub diagnosis: String,
    /// Long name of the diagnosis when it is a HAM10000 code
    pub lesion_type: Option<String>,
    pub confidence: f32,
    /// Softmax output in label-id order
    pub probabilities: Vec<f32>,
    /// The `TOP_K` most probable classes, best first
    pub ranked: Vec<RankedClass>,
    pub elapsed_ms: f64,
}

impl PredictionResult {
    /// Rank `probabilities`; ties go to the lower label id
    pub fn from_probabilities(
        probabilities: Vec<f32>,
        class_names: &[String],
        elapsed: Duration,
        image_path: Option<PathBuf>,
    ) -> Result<Self> {
        let mut order: Vec<usize> = (0..probabilities.len()).collect();
        order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]).then(a.cmp(&b)));

        let ranked = order
            .iter()
            .take(TOP_K)
            .map(|&label_id| -> Result<RankedClass> {
                let diagnosis = class_names.get(label_id).cloned().ok_or(LesionError::UnknownLabelId {
                    id: label_id,
                    num_classes: class_names.len(),
                })?;
                Ok(RankedClass {
                    label_id,
                    diagnosis,
                    probability: probabilities[label_id],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let best = ranked
            .first()
            .cloned()
            .ok_or_else(|| LesionError::Inference("Model returned no probabilities".to_string()))?;

        Ok(Self {
            image_path,
            label_id: best.label_id,
            lesion_type: lesion_type_name(&best.diagnosis).map(str::to_string),
            diagnosis: best.diagnosis,
            confidence: best.probability,
            probabilities,
            ranked,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }

    /// Shannon entropy of the distribution in nats
    pub fn entropy(&self) -> f32 {
        self.probabilities
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }
}

impl std::fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.image_path {
            writeln!(f, "Image:      {}", path.display())?;
        }
        match &self.lesion_type {
            Some(name) => writeln!(f, "Diagnosis:  {} ({})", self.diagnosis, name)?,
            None => writeln!(f, "Diagnosis:  {}", self.diagnosis)?,
        }
        writeln!(f, "Confidence: {:.2}%", self.confidence * 100.0)?;
        writeln!(f, "Entropy:    {:.3}", self.entropy())?;
        writeln!(f, "Took:       {:.2} ms", self.elapsed_ms)?;
        for (rank, entry) in self.ranked.iter().enumerate() {
            writeln!(
                f,
                "  #{} {:6} {:6.2}%",
                rank + 1,
                entry.diagnosis,
                entry.probability * 100.0
            )?;
        }
        Ok(())
    }
}

/// Classify one image file
///
/// Adds a batch dimension, runs the softmax forward pass and maps the argmax
/// to its class name. Keeps no state between calls.
pub fn predict_image<B: Backend>(
    model: &LesionClassifier<B>,
    path: &Path,
    class_names: &[String],
    image_size: usize,
    device: &B::Device,
) -> Result<PredictionResult> {
    if class_names.len() != model.num_classes() {
        return Err(LesionError::Inference(format!(
            "Model has {} outputs but {} class names were given",
            model.num_classes(),
            class_names.len()
        )));
    }

    let pixels = preprocess_image(path, image_size)?;

    let start = Instant::now();
    let input = Tensor::<B, 4>::from_floats(
        TensorData::new(pixels, [1, CHANNELS, image_size, image_size]),
        device,
    );
    let probabilities = model
        .forward_softmax(input)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| LesionError::Inference(format!("Failed to read probabilities: {:?}", e)))?;
    let elapsed = start.elapsed();

    let result = PredictionResult::from_probabilities(
        probabilities,
        class_names,
        elapsed,
        Some(path.to_path_buf()),
    )?;

    debug!(
        "Predicted {} ({:.2}%) for {:?}",
        result.diagnosis,
        result.confidence * 100.0,
        path
    );

    Ok(result)
}

/// Save model weights and manifest into `dir`
pub fn save_model<B: Backend>(
    model: &LesionClassifier<B>,
    manifest: &ModelManifest,
    dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(dir.join(MODEL_FILE_STEM), &recorder)
        .map_err(|e| LesionError::Model(format!("Failed to save model: {:?}", e)))?;
    manifest.save(dir)?;

    info!("Model saved to {:?}", dir);
    Ok(dir.to_path_buf())
}

/// Load a model saved by [`save_model`]
pub fn load_model<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> Result<(LesionClassifier<B>, ModelManifest)> {
    let manifest = ModelManifest::load(dir)?;

    let config = LesionClassifierConfig::new()
        .with_num_classes(manifest.class_names.len())
        .with_image_size(manifest.image_size)
        .with_dropout(manifest.dropout);

    let recorder = CompactRecorder::new();
    let model = LesionClassifier::<B>::new(&config, device)?
        .load_file(dir.join(MODEL_FILE_STEM), &recorder, device)
        .map_err(|e| LesionError::Model(format!("Failed to load model: {:?}", e)))?;

    info!(
        "Loaded model from {:?} ({} classes, {}x{} input)",
        dir,
        manifest.class_names.len(),
        manifest.image_size,
        manifest.image_size
    );

    Ok((model, manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DIAGNOSIS_CODES;
    use burn_ndarray::NdArray;
    use image::RgbImage;

    type TestBackend = NdArray;

    fn class_names() -> Vec<String> {
        DIAGNOSIS_CODES.iter().map(|s| s.to_string()).collect()
    }

    fn write_image(dir: &Path) -> PathBuf {
        let path = dir.join("ISIC_0024306.png");
        RgbImage::from_pixel(40, 40, image::Rgb([180, 120, 90]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_prediction_result_ranking() {
        let probs = vec![0.05, 0.1, 0.05, 0.05, 0.15, 0.55, 0.05];
        let result =
            PredictionResult::from_probabilities(probs, &class_names(), Duration::from_millis(5), None)
                .unwrap();

        assert_eq!(result.label_id, 5);
        assert_eq!(result.diagnosis, "nv");
        assert_eq!(result.lesion_type.as_deref(), Some("Melanocytic nevi"));
        assert_eq!(result.confidence, 0.55);
        assert_eq!(result.ranked.len(), TOP_K);
        assert_eq!(result.ranked[1].diagnosis, "mel");
        assert_eq!(result.ranked[2].label_id, 1);
        assert!(result.to_string().contains("Melanocytic nevi"));
    }

    #[test]
    fn test_prediction_entropy() {
        let uniform = PredictionResult::from_probabilities(
            vec![1.0 / 7.0; 7],
            &class_names(),
            Duration::ZERO,
            None,
        )
        .unwrap();
        let mut peaked = vec![0.001; 7];
        peaked[0] = 0.994;
        let confident =
            PredictionResult::from_probabilities(peaked, &class_names(), Duration::ZERO, None).unwrap();

        assert!(uniform.entropy() > confident.entropy());
    }

    #[test]
    fn test_preprocess_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path());

        let pixels = preprocess_image(&path, 16).unwrap();
        assert_eq!(pixels.len(), 3 * 16 * 16);
        assert!((pixels[0] - 180.0 / 255.0).abs() < 1e-6);
        assert!((pixels[16 * 16] - 120.0 / 255.0).abs() < 1e-6);
        assert!(pixels.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_predict_image_returns_known_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path());
        let device = Default::default();
        let model = LesionClassifierConfig::new()
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .unwrap();

        let result = predict_image(&model, &path, &class_names(), 16, &device).unwrap();

        assert!(result.label_id < 7);
        assert!(DIAGNOSIS_CODES.contains(&result.diagnosis.as_str()));
        let total: f32 = result.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_predict_missing_file() {
        let device = Default::default();
        let model = LesionClassifierConfig::new()
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .unwrap();

        let result = predict_image(&model, Path::new("/nope/ISIC_0.jpg"), &class_names(), 16, &device);
        assert!(matches!(result, Err(LesionError::PathNotFound(_))));
    }

    #[test]
    fn test_save_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = LesionClassifierConfig::new()
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .unwrap();
        let manifest = ModelManifest {
            class_names: class_names(),
            image_size: 16,
            dropout: 0.5,
            test_accuracy: 0.0,
            epochs: 1,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        };

        save_model(&model, &manifest, dir.path()).unwrap();
        let (loaded, loaded_manifest) = load_model::<TestBackend>(dir.path(), &device).unwrap();

        assert_eq!(loaded_manifest, manifest);
        assert_eq!(loaded.num_classes(), 7);

        let image = write_image(dir.path());
        let a = predict_image(&model, &image, &class_names(), 16, &device).unwrap();
        let b = predict_image(&loaded, &image, &class_names(), 16, &device).unwrap();
        // weights are stored at half precision
        for (pa, pb) in a.probabilities.iter().zip(&b.probabilities) {
            assert!((pa - pb).abs() < 0.05);
        }
    }
}
