//! Evaluation metrics
//!
//! Confusion matrix over the test partition plus the per-class numbers
//! derived from it, and two small accumulators used inside the epoch loop.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Square count matrix, rows are true classes and columns predicted classes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    rows: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            rows: vec![vec![0; num_classes]; num_classes],
        }
    }

    /// Pairs are taken positionally; ids outside `0..num_classes` are dropped
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&predicted, &actual) in predictions.iter().zip(ground_truth) {
            cm.record(actual, predicted);
        }
        cm
    }

    pub fn record(&mut self, actual: usize, predicted: usize) {
        if let Some(cell) = self.rows.get_mut(actual).and_then(|row| row.get_mut(predicted)) {
            *cell += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.rows
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn total(&self) -> usize {
        self.rows.iter().flatten().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        self.rows.iter().enumerate().map(|(i, row)| row[i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Occurrences of each true class
    pub fn row_sums(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.iter().sum()).collect()
    }

    /// Times each class was predicted
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| self.rows.iter().map(|row| row[col]).sum())
            .collect()
    }

    /// `1 - diagonal / row_sum` per true class; 0 for a class with no rows
    pub fn per_class_error(&self) -> Vec<f64> {
        self.rows
            .iter()
            .enumerate()
            .map(|(class, row)| {
                let support: usize = row.iter().sum();
                if support == 0 {
                    0.0
                } else {
                    1.0 - ratio(row[class], support)
                }
            })
            .collect()
    }

    /// Text table, diagonal cells in brackets
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let name = |idx: usize| -> String {
            class_names
                .and_then(|names| names.get(idx))
                .map(|n| n.chars().take(6).collect())
                .unwrap_or_else(|| idx.to_string())
        };

        let mut out = String::from("\nConfusion matrix (rows = true, cols = predicted)\n\n");
        out.push_str(&format!("{:>8}", ""));
        for col in 0..self.num_classes {
            out.push_str(&format!("{:>8}", name(col)));
        }
        out.push('\n');

        for (row_idx, row) in self.rows.iter().enumerate() {
            out.push_str(&format!("{:>8}", name(row_idx)));
            for (col_idx, &count) in row.iter().enumerate() {
                let cell = if row_idx == col_idx {
                    format!("[{}]", count)
                } else {
                    count.to_string()
                };
                out.push_str(&format!("{:>8}", cell));
            }
            out.push('\n');
        }
        out
    }

    /// Write the matrix as CSV with a header row and a label column
    pub fn save_csv(&self, path: &Path, class_names: Option<&[String]>) -> Result<()> {
        let label = |idx: usize| -> String {
            class_names
                .and_then(|names| names.get(idx).cloned())
                .unwrap_or_else(|| idx.to_string())
        };

        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec!["true\\predicted".to_string()];
        header.extend((0..self.num_classes).map(label));
        writer.write_record(&header)?;

        for (idx, row) in self.rows.iter().enumerate() {
            let mut record = vec![label(idx)];
            record.extend(row.iter().map(|c| c.to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Precision, recall and error for one true class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub class_id: usize,
    pub name: Option<String>,
    /// Test rows whose true class is this one
    pub support: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Fraction classified incorrectly, `1 - recall` when support > 0
    pub error: f64,
}

impl ClassReport {
    fn from_matrix(cm: &ConfusionMatrix, class_id: usize, support: usize, predicted: usize) -> Self {
        let hits = cm.get(class_id, class_id);
        let precision = ratio(hits, predicted);
        let recall = ratio(hits, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_id,
            name: None,
            support,
            precision,
            recall,
            f1,
            error: if support == 0 { 0.0 } else { 1.0 - recall },
        }
    }
}

/// Everything computed from one set of predictions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_samples: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    /// Mean F1 over classes that occur in the ground truth
    pub macro_f1: f64,
    pub per_class: Vec<ClassReport>,
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let supports = confusion_matrix.row_sums();
        let predicted = confusion_matrix.col_sums();

        let per_class: Vec<ClassReport> = (0..num_classes)
            .map(|c| ClassReport::from_matrix(&confusion_matrix, c, supports[c], predicted[c]))
            .collect();

        let present: Vec<f64> = per_class
            .iter()
            .filter(|r| r.support > 0)
            .map(|r| r.f1)
            .collect();
        let macro_f1 = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        };

        Self {
            total_samples: confusion_matrix.total(),
            correct_predictions: confusion_matrix.correct(),
            accuracy: confusion_matrix.accuracy(),
            macro_f1,
            per_class,
            confusion_matrix,
        }
    }

    pub fn with_class_names(mut self, class_names: &[String]) -> Self {
        for report in &mut self.per_class {
            report.name = class_names.get(report.class_id).cloned();
        }
        self
    }

    /// Per-class table followed by the overall numbers
    pub fn display(&self) -> String {
        let mut out = format!(
            "{:>8} {:>8} {:>10} {:>8} {:>8} {:>8}\n",
            "class", "support", "precision", "recall", "f1", "error"
        );
        for r in &self.per_class {
            let name = r.name.clone().unwrap_or_else(|| r.class_id.to_string());
            out.push_str(&format!(
                "{:>8} {:>8} {:>10.3} {:>8.3} {:>8.3} {:>8.3}\n",
                name, r.support, r.precision, r.recall, r.f1, r.error
            ));
        }
        out.push_str(&format!(
            "\naccuracy {:.2}% ({}/{}), macro F1 {:.3}\n",
            self.accuracy * 100.0,
            self.correct_predictions,
            self.total_samples,
            self.macro_f1
        ));
        out
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Sample-weighted mean of batch losses
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// `value` is a batch mean over `weight` samples
    pub fn add_weighted(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Correct / seen over the batches of an epoch
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    seen: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch(&mut self, predictions: &[usize], ground_truth: &[usize]) {
        for (p, t) in predictions.iter().zip(ground_truth) {
            self.seen += 1;
            self.correct += usize::from(p == t);
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.seen)
    }
}
