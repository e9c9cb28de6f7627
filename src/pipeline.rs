//! End-to-end HAM10000 pipeline
//!
//! metadata -> label encoding -> class balancing -> image loading ->
//! one-hot + split -> CNN -> training/evaluation -> (optional) artifacts and
//! a single-image prediction.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::dataset::{
    ClassBalancer, DatasetSplits, ImageIndex, ImageLoader, LabelEncoder, MetadataTable,
};
use crate::inference::predictor::{predict_image, save_model, PredictionResult};
use crate::model::cnn::LesionClassifierConfig;
use crate::model::config::{ModelManifest, PipelineConfig};
use crate::training::trainer::{Evaluation, Trainer, TrainingHistory};
use crate::utils::charts::{self, BarData};
use crate::utils::error::Result;
use crate::utils::metrics::ConfusionMatrix;

/// Sub-directory of the output directory holding the saved model
pub const MODEL_DIR_NAME: &str = "model";

/// Everything a pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Class names in label-id order
    pub class_names: Vec<String>,
    pub metadata_records: usize,
    pub balanced_samples: usize,
    pub distinct_images: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub history: TrainingHistory,
    /// Final evaluation on the test partition
    pub evaluation: Evaluation,
    pub prediction: Option<PredictionResult>,
    /// Charts and CSV files written to the output directory
    pub artifacts: Vec<PathBuf>,
    pub model_dir: Option<PathBuf>,
}

impl PipelineReport {
    pub fn test_accuracy(&self) -> f64 {
        self.evaluation.accuracy()
    }

    pub fn confusion_matrix(&self) -> &ConfusionMatrix {
        &self.evaluation.metrics.confusion_matrix
    }

    pub fn per_class_error(&self) -> Vec<f64> {
        self.confusion_matrix().per_class_error()
    }
}

/// Serializable summary written next to the charts
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    class_names: &'a [String],
    train_size: usize,
    test_size: usize,
    test_accuracy: f64,
    test_loss: f64,
    per_class_error: Vec<f64>,
    history: &'a TrainingHistory,
    finished_at: String,
}

/// Run the pipeline on the backend's default device
pub fn run_pipeline<B: AutodiffBackend>(config: &PipelineConfig) -> Result<PipelineReport> {
    let device = B::Device::default();
    run_pipeline_on::<B>(config, &device)
}

/// Run the pipeline on a specific device
pub fn run_pipeline_on<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: &B::Device,
) -> Result<PipelineReport> {
    config.validate()?;

    // 1. Metadata
    let table = MetadataTable::from_csv(&config.metadata_path)?;
    let diagnoses = table.diagnoses();

    // 2. Label encoding
    let encoder = LabelEncoder::fit(&diagnoses);
    let labels = encoder.encode_all(&diagnoses)?;
    let num_classes = encoder.num_classes();
    let class_names = encoder.classes().to_vec();
    info!("{} records, {} classes: {:?}", table.len(), num_classes, class_names);

    // 3. Balancing
    let balanced =
        ClassBalancer::new(config.samples_per_class, config.balance_seed).balance(&labels, num_classes)?;
    info!(
        "Balanced to {} samples ({} per class)",
        balanced.len(),
        config.samples_per_class
    );

    // 4. Images
    let index = ImageIndex::scan(&config.image_dir)?;
    let mut loader = ImageLoader::new(index, config.image_size);
    let images = loader.load_balanced(table.records(), &balanced)?;
    let distinct_images = loader.cached();

    // 5. One-hot + split
    let splits = DatasetSplits::from_examples(images, num_classes, &config.split)?;

    // 6. Model
    let model = LesionClassifierConfig::new()
        .with_num_classes(num_classes)
        .with_image_size(config.image_size)
        .with_dropout(config.dropout)
        .init::<B>(device)?;

    // 7. Training and evaluation
    let trainer = Trainer::<B>::new(config.training.clone(), device.clone());
    let outcome = trainer.fit(model, &splits.train, &splits.test)?;

    let mut evaluation = outcome.evaluation;
    evaluation.metrics = evaluation.metrics.with_class_names(&class_names);

    info!("Test accuracy: {:.2}%", evaluation.accuracy() * 100.0);
    info!(
        "{}",
        evaluation.metrics.confusion_matrix.display(Some(&class_names))
    );

    let inner_model = outcome.model.valid();

    let mut artifacts = Vec::new();
    let mut model_dir = None;

    if let Some(output_dir) = &config.output_dir {
        std::fs::create_dir_all(output_dir)?;

        artifacts.extend(outcome.history.save_charts(output_dir)?);
        artifacts.push(write_error_chart(
            &evaluation.metrics.confusion_matrix,
            &class_names,
            output_dir,
        )?);

        let cm_path = output_dir.join("confusion_matrix.csv");
        evaluation
            .metrics
            .confusion_matrix
            .save_csv(&cm_path, Some(&class_names))?;
        artifacts.push(cm_path);

        let summary_path = output_dir.join("summary.json");
        let summary = RunSummary {
            class_names: &class_names,
            train_size: splits.train.len(),
            test_size: splits.test.len(),
            test_accuracy: evaluation.accuracy(),
            test_loss: evaluation.loss,
            per_class_error: evaluation.metrics.confusion_matrix.per_class_error(),
            history: &outcome.history,
            finished_at: Local::now().to_rfc3339(),
        };
        std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
        artifacts.push(summary_path);

        if config.save_model {
            let manifest = ModelManifest {
                class_names: class_names.clone(),
                image_size: config.image_size,
                dropout: config.dropout,
                test_accuracy: evaluation.accuracy(),
                epochs: config.training.epochs,
                created_at: Local::now().to_rfc3339(),
            };
            model_dir = Some(save_model(
                &inner_model,
                &manifest,
                &output_dir.join(MODEL_DIR_NAME),
            )?);
        }

        info!("Wrote {} artifacts to {:?}", artifacts.len(), output_dir);
    }

    // 8. Single-image prediction
    let prediction = match &config.predict_image {
        Some(path) => Some(predict_image(
            &inner_model,
            path,
            &class_names,
            config.image_size,
            device,
        )?),
        None => None,
    };

    Ok(PipelineReport {
        class_names,
        metadata_records: table.len(),
        balanced_samples: balanced.len(),
        distinct_images,
        train_size: splits.train.len(),
        test_size: splits.test.len(),
        history: outcome.history,
        evaluation,
        prediction,
        artifacts,
        model_dir,
    })
}

/// Bar chart of the misclassified fraction of each true class
fn write_error_chart(cm: &ConfusionMatrix, class_names: &[String], dir: &Path) -> Result<PathBuf> {
    let bars: Vec<BarData> = cm
        .per_class_error()
        .iter()
        .enumerate()
        .map(|(idx, &error)| BarData {
            label: class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string()),
            value: error * 100.0,
            color: charts::COLOR_TERTIARY.to_string(),
        })
        .collect();

    let path = dir.join("per_class_error.svg");
    charts::generate_bar_chart(
        "Fraction Classified Incorrectly",
        "Misclassified (%)",
        &bars,
        &path,
    )?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DIAGNOSIS_CODES;
    use crate::model::config::TrainingConfig;
    use crate::utils::error::LesionError;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::RgbImage;

    type TestBackend = Autodiff<NdArray>;

    /// Two images per diagnosis spread over the two HAM10000 part folders
    fn synthetic_ham10000(root: &Path) -> PathBuf {
        let part1 = root.join("HAM10000_images_part_1");
        let part2 = root.join("HAM10000_images_part_2");
        std::fs::create_dir_all(&part1).unwrap();
        std::fs::create_dir_all(&part2).unwrap();

        let mut csv = String::from("lesion_id,image_id,dx,dx_type,age,sex,localization\n");
        for (class, dx) in DIAGNOSIS_CODES.iter().enumerate() {
            for i in 0..2 {
                let image_id = format!("ISIC_{:05}{}", class, i);
                let dir = if i == 0 { &part1 } else { &part2 };
                let shade = (class * 35) as u8;
                RgbImage::from_pixel(24, 20, image::Rgb([shade, 255 - shade, 60 + i as u8 * 40]))
                    .save(dir.join(format!("{}.png", image_id)))
                    .unwrap();
                csv.push_str(&format!(
                    "HAM_{:05}{},{},{},histo,{}.0,female,back\n",
                    class,
                    i,
                    image_id,
                    dx,
                    30 + class * 5
                ));
            }
        }

        let metadata = root.join("HAM10000_metadata.csv");
        std::fs::write(&metadata, csv).unwrap();
        metadata
    }

    fn small_config(root: &Path, metadata: PathBuf) -> PipelineConfig {
        PipelineConfig {
            metadata_path: metadata,
            image_dir: root.to_path_buf(),
            samples_per_class: 4,
            image_size: 16,
            training: TrainingConfig {
                epochs: 1,
                batch_size: 8,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = synthetic_ham10000(dir.path());
        let output = dir.path().join("output");

        let mut config = small_config(dir.path(), metadata);
        config.output_dir = Some(output.clone());
        config.save_model = true;
        config.predict_image = Some(dir.path().join("HAM10000_images_part_1/ISIC_000050.png"));

        let report = run_pipeline::<TestBackend>(&config).unwrap();

        assert_eq!(report.class_names, DIAGNOSIS_CODES.to_vec());
        assert_eq!(report.metadata_records, 14);
        assert_eq!(report.balanced_samples, 28);
        // whole source images are held out until the test side reaches ceil(28 * 0.25) = 7
        assert!(report.test_size >= 7);
        assert!(report.train_size > 0);
        assert_eq!(report.train_size + report.test_size, 28);

        let cm = report.confusion_matrix();
        assert_eq!(cm.num_classes, 7);
        assert_eq!(cm.total(), report.test_size);
        assert_eq!(report.per_class_error().len(), 7);
        assert!(report.per_class_error().iter().all(|e| (0.0..=1.0).contains(e)));
        assert_eq!(report.history.epochs(), 1);

        let prediction = report.prediction.as_ref().unwrap();
        assert!(DIAGNOSIS_CODES.contains(&prediction.diagnosis.as_str()));

        assert!(output.join("loss_curve.svg").exists());
        assert!(output.join("accuracy_curve.svg").exists());
        assert!(output.join("per_class_error.svg").exists());
        assert!(output.join("confusion_matrix.csv").exists());
        assert!(output.join("summary.json").exists());

        let model_dir = report.model_dir.as_ref().unwrap();
        let manifest = ModelManifest::load(model_dir).unwrap();
        assert_eq!(manifest.class_names, report.class_names);
        assert_eq!(manifest.image_size, 16);
    }

    #[test]
    fn test_pipeline_predicts_on_given_device() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = synthetic_ham10000(dir.path());

        let mut config = small_config(dir.path(), metadata);
        config.predict_image = Some(dir.path().join("HAM10000_images_part_2/ISIC_000061.png"));

        let device = burn_ndarray::NdArrayDevice::Cpu;
        let report = run_pipeline_on::<TestBackend>(&config, &device).unwrap();

        let prediction = report.prediction.as_ref().unwrap();
        assert_eq!(prediction.probabilities.len(), 7);
        assert!(report.model_dir.is_none());
        assert!(report.artifacts.is_empty());
    }

    #[test]
    fn test_pipeline_save_model_needs_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = synthetic_ham10000(dir.path());

        let mut config = small_config(dir.path(), metadata);
        config.save_model = true;

        assert!(matches!(
            run_pipeline::<TestBackend>(&config),
            Err(LesionError::Config(_))
        ));
    }

    #[test]
    fn test_pipeline_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = synthetic_ham10000(dir.path());
        std::fs::remove_file(dir.path().join("HAM10000_images_part_1/ISIC_000030.png")).unwrap();
        std::fs::remove_file(dir.path().join("HAM10000_images_part_2/ISIC_000031.png")).unwrap();

        let config = small_config(dir.path(), metadata);
        let result = run_pipeline::<TestBackend>(&config);

        assert!(matches!(result, Err(LesionError::ImageNotFound(_))));
    }

    #[test]
    fn test_pipeline_unknown_metadata_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path(), dir.path().join("missing.csv"));

        assert!(matches!(
            run_pipeline::<TestBackend>(&config),
            Err(LesionError::PathNotFound(_))
        ));
    }
}
