//! Class balancing by oversampling
//!
//! Every class is resampled with replacement to the same number of rows.
//! Classes are visited in label-id order and share one seeded RNG, so the
//! result depends only on the seed and the input order.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{LesionError, Result};

/// One row of the balanced set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancedSample {
    /// Row in the metadata table
    pub source_index: usize,
    pub label: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancedSet {
    pub samples: Vec<BalancedSample>,
    pub samples_per_class: usize,
    pub num_classes: usize,
}

impl BalancedSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn source_indices(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.source_index).collect()
    }

    /// Number of rows per class id
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

#[derive(Debug, Clone)]
pub struct ClassBalancer {
    samples_per_class: usize,
    seed: u64,
}

impl ClassBalancer {
    pub fn new(samples_per_class: usize, seed: u64) -> Self {
        Self {
            samples_per_class,
            seed,
        }
    }

    /// Draw `samples_per_class` rows with replacement for each class
    ///
    /// `labels[i]` is the class id of metadata row `i`.
    pub fn balance(&self, labels: &[usize], num_classes: usize) -> Result<BalancedSet> {
        if self.samples_per_class == 0 {
            return Err(LesionError::Config(
                "samples_per_class must be greater than 0".to_string(),
            ));
        }

        let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); num_classes];
        for (index, &label) in labels.iter().enumerate() {
            let bucket = by_class.get_mut(label).ok_or(LesionError::UnknownLabelId {
                id: label,
                num_classes,
            })?;
            bucket.push(index);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut samples = Vec::with_capacity(self.samples_per_class * num_classes);

        for (label, members) in by_class.iter().enumerate() {
            if members.is_empty() {
                return Err(LesionError::Dataset(format!(
                    "Class {} has no records to resample from",
                    label
                )));
            }

            debug!(
                "Class {}: {} records -> {} samples",
                label,
                members.len(),
                self.samples_per_class
            );

            for _ in 0..self.samples_per_class {
                let pick = members[rng.gen_range(0..members.len())];
                samples.push(BalancedSample {
                    source_index: pick,
                    label,
                });
            }
        }

        Ok(BalancedSet {
            samples,
            samples_per_class: self.samples_per_class,
            num_classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed_labels() -> Vec<usize> {
        // class 0 dominates, class 2 has a single record
        vec![0, 0, 0, 0, 0, 0, 1, 1, 2, 0, 1]
    }

    #[test]
    fn test_every_class_gets_n_samples() {
        let set = ClassBalancer::new(10, 42).balance(&skewed_labels(), 3).unwrap();

        assert_eq!(set.len(), 30);
        assert_eq!(set.class_counts(), vec![10, 10, 10]);
    }

    #[test]
    fn test_samples_stay_within_their_class() {
        let labels = skewed_labels();
        let set = ClassBalancer::new(25, 7).balance(&labels, 3).unwrap();

        for sample in &set.samples {
            assert_eq!(labels[sample.source_index], sample.label);
        }
        // the singleton class can only ever draw row 8
        assert!(set
            .samples
            .iter()
            .filter(|s| s.label == 2)
            .all(|s| s.source_index == 8));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let labels = skewed_labels();
        let a = ClassBalancer::new(20, 42).balance(&labels, 3).unwrap();
        let b = ClassBalancer::new(20, 42).balance(&labels, 3).unwrap();
        let c = ClassBalancer::new(20, 43).balance(&labels, 3).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.source_indices(), c.source_indices());
    }

    #[test]
    fn test_empty_class_rejected() {
        let result = ClassBalancer::new(5, 42).balance(&[0, 0, 2], 3);
        assert!(matches!(result, Err(LesionError::Dataset(_))));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let result = ClassBalancer::new(0, 42).balance(&[0, 1], 2);
        assert!(matches!(result, Err(LesionError::Config(_))));
    }

    #[test]
    fn test_label_out_of_range() {
        let result = ClassBalancer::new(5, 42).balance(&[0, 3], 2);
        assert!(matches!(result, Err(LesionError::UnknownLabelId { id: 3, .. })));
    }
}
