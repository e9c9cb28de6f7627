//! Training and Evaluation for the Lesion Classifier
//!
//! A custom epoch loop on top of Burn's autodiff backend:
//! - Seeded reshuffle of the training partition every epoch
//! - Categorical cross-entropy against one-hot targets
//! - Adam with default settings
//! - Validation on the test partition with the inner (non-autodiff) model

use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::burn_dataset::{LesionBatch, LesionBatcher, LesionBurnDataset};
use crate::dataset::split::LabeledExample;
use crate::model::cnn::LesionClassifier;
use crate::model::config::TrainingConfig;
use crate::utils::charts::{self, DataSeries, YAxis};
use crate::utils::error::{LesionError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, Metrics, RunningAverage};

/// Per-epoch loss and accuracy curves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn record_epoch(&mut self, train_loss: f64, train_accuracy: f64, val_loss: f64, val_accuracy: f64) {
        self.train_loss.push(train_loss);
        self.train_accuracy.push(train_accuracy);
        self.val_loss.push(val_loss);
        self.val_accuracy.push(val_accuracy);
    }

    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn best_val_accuracy(&self) -> f64 {
        self.val_accuracy.iter().copied().fold(0.0, f64::max)
    }

    /// Write `loss_curve.svg` and `accuracy_curve.svg` into `dir`
    pub fn save_charts(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let loss_path = dir.join("loss_curve.svg");
        charts::generate_line_chart(
            "Model Loss",
            "Epoch",
            "Categorical cross-entropy",
            &[
                DataSeries::from_epochs("Train", &self.train_loss, charts::COLOR_PRIMARY),
                DataSeries::from_epochs("Test", &self.val_loss, charts::COLOR_TERTIARY),
            ],
            YAxis::Linear,
            &loss_path,
        )?;

        let to_percent = |v: &[f64]| v.iter().map(|a| a * 100.0).collect::<Vec<_>>();
        let accuracy_path = dir.join("accuracy_curve.svg");
        charts::generate_line_chart(
            "Model Accuracy",
            "Epoch",
            "Accuracy (%)",
            &[
                DataSeries::from_epochs("Train", &to_percent(&self.train_accuracy), charts::COLOR_PRIMARY),
                DataSeries::from_epochs("Test", &to_percent(&self.val_accuracy), charts::COLOR_SECONDARY),
            ],
            YAxis::Percent,
            &accuracy_path,
        )?;

        Ok(vec![loss_path, accuracy_path])
    }
}

/// Predictions of a model over a set of examples
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub predictions: Vec<usize>,
    pub ground_truth: Vec<usize>,
    /// Mean cross-entropy per sample
    pub loss: f64,
    pub metrics: Metrics,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }
}

/// Result of a full training run
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: LesionClassifier<B>,
    pub history: TrainingHistory,
    /// Evaluation of the final model on the test partition
    pub evaluation: Evaluation,
}

/// Categorical cross-entropy between logits and one-hot targets
///
/// Returns the batch mean as a single-element tensor.
pub fn one_hot_cross_entropy<B: Backend>(logits: Tensor<B, 2>, one_hot: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (log_probs * one_hot).sum_dim(1).mean().neg()
}

/// Argmax over the class dimension as plain ids
fn predicted_classes<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<usize>> {
    let [batch_size, _] = logits.dims();
    let ids = logits
        .argmax(1)
        .reshape([batch_size])
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| LesionError::Training(format!("Failed to read predictions: {:?}", e)))?;

    Ok(ids.into_iter().map(|id| id as usize).collect())
}

/// Run a model over `examples` in batches and collect metrics
pub fn evaluate<B: Backend>(
    model: &LesionClassifier<B>,
    examples: &[LabeledExample],
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation> {
    let first = examples
        .first()
        .ok_or_else(|| LesionError::Dataset("Cannot evaluate on an empty set".to_string()))?;

    let num_classes = model.num_classes();
    let dataset = LesionBurnDataset::from_examples(examples);
    let batcher = LesionBatcher::<B>::new(device.clone(), first.image.size, num_classes);

    let mut loss = RunningAverage::new();
    let mut predictions = Vec::with_capacity(examples.len());
    let mut ground_truth = Vec::with_capacity(examples.len());

    for start in (0..dataset.len()).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(dataset.len());
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        ground_truth.extend(items.iter().map(|item| item.label));
        let batch: LesionBatch<B> = batcher.batch(items, device);
        let n = batch.targets.dims()[0];

        let logits = model.forward(batch.images);
        let batch_loss: f64 = one_hot_cross_entropy(logits.clone(), batch.one_hot)
            .into_scalar()
            .elem();
        loss.add_weighted(batch_loss, n);

        predictions.extend(predicted_classes(logits)?);
    }

    let metrics = Metrics::from_predictions(&predictions, &ground_truth, num_classes);

    debug!(
        "Evaluated {} samples: loss = {:.4}, accuracy = {:.2}%",
        ground_truth.len(),
        loss.average(),
        metrics.accuracy * 100.0
    );

    Ok(Evaluation {
        predictions,
        ground_truth,
        loss: loss.average(),
        metrics,
    })
}

/// Trainer for the LesionClassifier model
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Train for `config.epochs` epochs, validating on `test` after each one
    pub fn fit(
        &self,
        mut model: LesionClassifier<B>,
        train: &[LabeledExample],
        test: &[LabeledExample],
    ) -> Result<TrainingOutcome<B>> {
        self.config.validate()?;

        let first = train
            .first()
            .ok_or_else(|| LesionError::Training("Training partition is empty".to_string()))?;
        if test.is_empty() {
            return Err(LesionError::Training("Test partition is empty".to_string()));
        }

        let image_size = first.image.size;
        let num_classes = model.num_classes();
        let batch_size = self.config.batch_size;

        let train_dataset = LesionBurnDataset::from_examples(train);
        let batcher = LesionBatcher::<B>::new(self.device.clone(), image_size, num_classes);

        let mut optimizer = AdamConfig::new().init::<B, LesionClassifier<B>>();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();

        let mut history = TrainingHistory::default();
        let mut logger = TrainingLogger::new(self.config.epochs);
        let mut last_evaluation = None;

        info!(
            "Training on {} samples, validating on {} ({} epochs, batch size {})",
            train.len(),
            test.len(),
            self.config.epochs,
            batch_size
        );

        for epoch in 0..self.config.epochs {
            logger.start_epoch(epoch);
            indices.shuffle(&mut rng);

            let mut epoch_loss = RunningAverage::new();
            let mut epoch_accuracy = AccuracyTracker::new();

            for chunk in indices.chunks(batch_size) {
                let items: Vec<_> = chunk.iter().filter_map(|&i| train_dataset.get(i)).collect();
                if items.is_empty() {
                    continue;
                }
                let labels: Vec<usize> = items.iter().map(|item| item.label).collect();

                let batch = batcher.batch(items, &self.device);
                let logits = model.forward(batch.images);
                let loss = one_hot_cross_entropy(logits.clone(), batch.one_hot);

                let loss_value: f64 = loss.clone().into_scalar().elem();
                epoch_loss.add_weighted(loss_value, labels.len());
                epoch_accuracy.add_batch(&predicted_classes(logits)?, &labels);

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.config.learning_rate, model, grads);
            }

            let evaluation = evaluate(&model.valid(), test, batch_size, &self.device)?;

            logger.end_epoch(
                epoch_loss.average(),
                epoch_accuracy.accuracy(),
                evaluation.loss,
                evaluation.accuracy(),
            );
            history.record_epoch(
                epoch_loss.average(),
                epoch_accuracy.accuracy(),
                evaluation.loss,
                evaluation.accuracy(),
            );
            last_evaluation = Some(evaluation);
        }

        let evaluation = last_evaluation
            .ok_or_else(|| LesionError::Training("No epochs were run".to_string()))?;
        logger.log_complete(evaluation.accuracy());

        Ok(TrainingOutcome {
            model,
            history,
            evaluation,
        })
    }
}
