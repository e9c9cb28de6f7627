//! One-hot targets and the train/test split
//!
//! The split is grouped by metadata row: the distinct source rows of the
//! balanced set are shuffled with a fixed seed, and whole rows (with all of
//! their oversampled copies) go to the test partition until it holds at least
//! `ceil(len * test_fraction)` samples. Everything else is training data.
//! It is not stratified.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::images::{LabeledImage, LesionImage};
use crate::utils::error::{LesionError, Result};

/// One-hot vector of length `num_classes` with a 1.0 at `label`
pub fn one_hot(label: usize, num_classes: usize) -> Result<Vec<f32>> {
    if label >= num_classes {
        return Err(LesionError::UnknownLabelId {
            id: label,
            num_classes,
        });
    }

    let mut v = vec![0.0f32; num_classes];
    v[label] = 1.0;
    Ok(v)
}

/// Configuration for dataset splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of samples held out for evaluation
    pub test_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.25,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(test_fraction: f64, seed: u64) -> Result<Self> {
        let config = Self {
            test_fraction,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(LesionError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

/// A training example: image, class id and its one-hot target
#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub image: LesionImage,
    pub label: usize,
    pub one_hot: Vec<f32>,
}

impl LabeledExample {
    pub fn new(image: LesionImage, label: usize, num_classes: usize) -> Result<Self> {
        Ok(Self {
            one_hot: one_hot(label, num_classes)?,
            image,
            label,
        })
    }
}

/// Disjoint train/test partitions of the balanced set
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: Vec<LabeledExample>,
    pub test: Vec<LabeledExample>,
    /// Positions in the input that went to `train`
    pub train_indices: Vec<usize>,
    /// Positions in the input that went to `test`
    pub test_indices: Vec<usize>,
    pub num_classes: usize,
}

impl DatasetSplits {
    /// One-hot encode and split the loaded images
    pub fn from_examples(
        examples: Vec<LabeledImage>,
        num_classes: usize,
        config: &SplitConfig,
    ) -> Result<Self> {
        config.validate()?;

        let total = examples.len();
        let target = (total as f64 * config.test_fraction).ceil() as usize;

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (position, example) in examples.iter().enumerate() {
            groups.entry(example.source_index).or_default().push(position);
        }

        if target == 0 || groups.len() < 2 {
            return Err(LesionError::Dataset(format!(
                "Cannot split {} samples from {} distinct images with test fraction {}: one partition would be empty",
                total,
                groups.len(),
                config.test_fraction
            )));
        }

        let mut sources: Vec<usize> = groups.keys().copied().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        sources.shuffle(&mut rng);

        let mut test_indices = Vec::with_capacity(target);
        let mut train_indices = Vec::with_capacity(total.saturating_sub(target));
        let mut test_sources = 0;
        for source in &sources {
            let positions = &groups[source];
            if test_indices.len() < target {
                test_indices.extend_from_slice(positions);
                test_sources += 1;
            } else {
                train_indices.extend_from_slice(positions);
            }
        }

        if train_indices.is_empty() {
            return Err(LesionError::Dataset(format!(
                "Test fraction {} leaves no images for training",
                config.test_fraction
            )));
        }

        let mut slots: Vec<Option<LabeledExample>> = examples
            .into_iter()
            .map(|e| LabeledExample::new(e.image, e.label, num_classes).map(Some))
            .collect::<Result<_>>()?;

        let mut take = |indices: &[usize]| -> Vec<LabeledExample> {
            indices
                .iter()
                .filter_map(|&i| slots[i].take())
                .collect()
        };
        let test = take(&test_indices);
        let train = take(&train_indices);

        info!(
            "Split {} samples into {} train / {} test ({} of {} distinct images held out)",
            total,
            train.len(),
            test.len(),
            test_sources,
            sources.len()
        );

        Ok(Self {
            train,
            test,
            train_indices,
            test_indices,
            num_classes,
        })
    }
}
