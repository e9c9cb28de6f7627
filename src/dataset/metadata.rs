//! HAM10000 metadata table
//!
//! One row per dermatoscopic image:
//! `lesion_id,image_id,dx,dx_type,age,sex,localization`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::error::{LesionError, Result};

/// A single metadata row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionRecord {
    pub lesion_id: String,
    pub image_id: String,
    /// Diagnosis code (akiec, bcc, bkl, df, mel, nv, vasc)
    #[serde(rename = "dx")]
    pub diagnosis: String,
    /// How the diagnosis was confirmed (histo, follow_up, consensus, confocal)
    pub dx_type: String,
    /// Patient age; empty in a few dozen rows
    #[serde(default)]
    pub age: Option<f32>,
    pub sex: String,
    pub localization: String,
}

/// The full metadata table, rows kept in file order
#[derive(Debug, Clone)]
pub struct MetadataTable {
    records: Vec<LesionRecord>,
}

/// Descriptive statistics over the metadata table
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataSummary {
    pub total_records: usize,
    pub by_diagnosis: BTreeMap<String, usize>,
    pub by_sex: BTreeMap<String, usize>,
    pub by_localization: BTreeMap<String, usize>,
    /// Key is the lower bound of a 10-year bucket
    pub age_histogram: BTreeMap<u32, usize>,
    pub missing_age: usize,
}

impl MetadataTable {
    /// Read and parse the metadata CSV
    pub fn from_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LesionError::PathNotFound(path.to_path_buf()));
        }

        info!("Reading metadata from {:?}", path);

        let mut reader = csv::Reader::from_path(path)?;
        let records = reader
            .deserialize::<LesionRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Self::from_records(records)
    }

    /// Build a table from already parsed rows
    pub fn from_records(records: Vec<LesionRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(LesionError::Dataset(
                "Metadata table contains no records".to_string(),
            ));
        }

        debug!("Loaded {} metadata records", records.len());
        Ok(Self { records })
    }

    pub fn records(&self) -> &[LesionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Diagnosis code of every row, in table order
    pub fn diagnoses(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.diagnosis.as_str()).collect()
    }

    /// Count rows by diagnosis, sex, localization and age bucket
    pub fn summary(&self) -> MetadataSummary {
        let mut summary = MetadataSummary {
            total_records: self.records.len(),
            ..Default::default()
        };

        for record in &self.records {
            *summary
                .by_diagnosis
                .entry(record.diagnosis.clone())
                .or_insert(0) += 1;
            *summary.by_sex.entry(record.sex.clone()).or_insert(0) += 1;
            *summary
                .by_localization
                .entry(record.localization.clone())
                .or_insert(0) += 1;

            match record.age {
                Some(age) if age >= 0.0 => {
                    let bucket = (age as u32 / 10) * 10;
                    *summary.age_histogram.entry(bucket).or_insert(0) += 1;
                }
                _ => summary.missing_age += 1,
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CSV: &str = "\
lesion_id,image_id,dx,dx_type,age,sex,localization
HAM_0000118,ISIC_0027419,bkl,histo,80.0,male,scalp
HAM_0000118,ISIC_0025030,bkl,histo,80.0,male,scalp
HAM_0002730,ISIC_0026769,nv,follow_up,,female,back
HAM_0001466,ISIC_0031633,mel,histo,75.0,male,ear
";

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_csv_parses_rows() {
        let file = write_csv(SAMPLE_CSV);
        let table = MetadataTable::from_csv(file.path()).unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table.diagnoses(), vec!["bkl", "bkl", "nv", "mel"]);
        assert_eq!(table.records()[0].image_id, "ISIC_0027419");
        assert_eq!(table.records()[2].age, None);
        assert_eq!(table.records()[3].age, Some(75.0));
    }

    #[test]
    fn test_missing_file() {
        let result = MetadataTable::from_csv(Path::new("/nonexistent/HAM10000_metadata.csv"));
        assert!(matches!(result, Err(LesionError::PathNotFound(_))));
    }

    #[test]
    fn test_malformed_row_is_csv_error() {
        let file = write_csv(
            "lesion_id,image_id,dx,dx_type,age,sex,localization\nHAM_1,ISIC_1,nv,histo,not-a-number,male,back\n",
        );
        let result = MetadataTable::from_csv(file.path());
        assert!(matches!(result, Err(LesionError::Csv(_))));
    }

    #[test]
    fn test_empty_table_rejected() {
        let file = write_csv("lesion_id,image_id,dx,dx_type,age,sex,localization\n");
        let result = MetadataTable::from_csv(file.path());
        assert!(matches!(result, Err(LesionError::Dataset(_))));
    }

    #[test]
    fn test_summary_counts() {
        let file = write_csv(SAMPLE_CSV);
        let summary = MetadataTable::from_csv(file.path()).unwrap().summary();

        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.by_diagnosis["bkl"], 2);
        assert_eq!(summary.by_sex["male"], 3);
        assert_eq!(summary.by_localization["scalp"], 2);
        assert_eq!(summary.age_histogram[&80], 2);
        assert_eq!(summary.age_histogram[&70], 1);
        assert_eq!(summary.missing_age, 1);
    }
}
