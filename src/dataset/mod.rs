//! Dataset module for HAM10000 data handling
//!
//! This module provides functionality for:
//! - Reading the HAM10000 metadata table
//! - Encoding diagnosis strings as class ids
//! - Oversampling every class to the same size
//! - Decoding and resizing the lesion images
//! - One-hot targets and the train/test split
//!
//! ## Class Balancing
//!
//! HAM10000 is dominated by melanocytic nevi (about two thirds of all
//! images). Each class is resampled with replacement to a fixed count before
//! splitting. The split then keeps every copy of a metadata row on one side,
//! so no lesion image is both trained on and tested against.

pub mod balance;
pub mod burn_dataset;
pub mod encoder;
pub mod images;
pub mod metadata;
pub mod split;

// Re-export main types for convenience
pub use balance::{BalancedSample, BalancedSet, ClassBalancer};
pub use burn_dataset::{LesionBatch, LesionBatcher, LesionBurnDataset, LesionItem};
pub use encoder::LabelEncoder;
pub use images::{ImageIndex, ImageLoader, LabeledImage, LesionImage};
pub use metadata::{LesionRecord, MetadataSummary, MetadataTable};
pub use split::{one_hot, DatasetSplits, LabeledExample, SplitConfig};

/// Number of diagnostic categories in HAM10000
pub const NUM_CLASSES: usize = 7;

/// Default side length images are resized to
pub const DEFAULT_IMAGE_SIZE: usize = 32;

/// Default number of samples drawn per class when balancing
pub const DEFAULT_SAMPLES_PER_CLASS: usize = 400;

/// Number of color channels (RGB)
pub const CHANNELS: usize = 3;

/// Diagnosis codes in label-id order
pub const DIAGNOSIS_CODES: [&str; NUM_CLASSES] = ["akiec", "bcc", "bkl", "df", "mel", "nv", "vasc"];

/// Human-readable name for a HAM10000 diagnosis code
pub fn lesion_type_name(code: &str) -> Option<&'static str> {
    match code {
        "akiec" => Some("Actinic keratoses"),
        "bcc" => Some("Basal cell carcinoma"),
        "bkl" => Some("Benign keratosis-like lesions"),
        "df" => Some("Dermatofibroma"),
        "mel" => Some("Melanoma"),
        "nv" => Some("Melanocytic nevi"),
        "vasc" => Some("Vascular lesions"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_a_name() {
        for code in DIAGNOSIS_CODES {
            assert!(lesion_type_name(code).is_some(), "missing name for {}", code);
        }
        assert_eq!(lesion_type_name("nv"), Some("Melanocytic nevi"));
        assert_eq!(lesion_type_name("xyz"), None);
    }

    #[test]
    fn test_codes_are_sorted() {
        let mut sorted = DIAGNOSIS_CODES;
        sorted.sort_unstable();
        assert_eq!(sorted, DIAGNOSIS_CODES);
    }
}
