//! Diagnosis label encoder
//!
//! Maps diagnosis strings to dense class ids. Classes are kept in sorted
//! order so the same label set always produces the same code space.

use serde::{Deserialize, Serialize};

use crate::utils::error::{LesionError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on every label seen in the data
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        classes.sort();
        classes.dedup();

        Self { classes }
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| LesionError::UnknownLabel(label.to_string()))
    }

    pub fn decode(&self, id: usize) -> Result<&str> {
        self.classes
            .get(id)
            .map(String::as_str)
            .ok_or(LesionError::UnknownLabelId {
                id,
                num_classes: self.classes.len(),
            })
    }

    /// Encode a whole column, failing on the first unknown label
    pub fn encode_all<I, S>(&self, labels: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels
            .into_iter()
            .map(|s| self.encode(s.as_ref()))
            .collect()
    }

    /// Class names indexed by label id
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}
