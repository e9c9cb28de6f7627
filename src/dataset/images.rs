//! Lesion image discovery and decoding
//!
//! HAM10000 ships its images split over two part directories
//! (`HAM10000_images_part_1/`, `HAM10000_images_part_2/`). The index walks
//! the whole tree once and resolves an `image_id` to its file by stem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::balance::BalancedSet;
use super::metadata::LesionRecord;
use super::CHANNELS;
use crate::utils::error::{LesionError, Result};
use crate::utils::logging::ProgressLogger;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Decode an image file and resize it to exactly `size`×`size` RGB
///
/// Aspect ratio is not preserved.
pub fn decode_resized(path: &Path, size: usize) -> Result<RgbImage> {
    let img = ImageReader::open(path)
        .map_err(|e| LesionError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| LesionError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| LesionError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8())
}

/// A decoded, resized image with `u8` pixels in HWC order
#[derive(Debug, Clone, PartialEq)]
pub struct LesionImage {
    pub image_id: String,
    pub size: usize,
    pub pixels: Vec<u8>,
}

impl LesionImage {
    pub fn from_rgb(image_id: &str, img: &RgbImage) -> Self {
        Self {
            image_id: image_id.to_string(),
            size: img.width() as usize,
            pixels: img.as_raw().clone(),
        }
    }

    /// `[height, width, channels]`
    pub fn shape(&self) -> [usize; 3] {
        [self.size, self.size, CHANNELS]
    }

    /// Planar CHW floats scaled to `[0, 1]`
    pub fn to_chw_normalized(&self) -> Vec<f32> {
        hwc_to_chw_normalized(&self.pixels, self.size)
    }
}

/// Convert interleaved RGB bytes to planar floats in `[0, 1]`
pub fn hwc_to_chw_normalized(pixels: &[u8], size: usize) -> Vec<f32> {
    let plane = size * size;
    let mut out = vec![0.0f32; CHANNELS * plane];

    for (i, rgb) in pixels.chunks_exact(CHANNELS).enumerate() {
        for c in 0..CHANNELS {
            out[c * plane + i] = rgb[c] as f32 / 255.0;
        }
    }

    out
}

/// An image paired with its class id
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub image: LesionImage,
    pub label: usize,
    /// Metadata row the image came from; oversampled copies share it
    pub source_index: usize,
}

/// Map from image id (file stem) to file path
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    paths: HashMap<String, PathBuf>,
}

impl ImageIndex {
    /// Walk `base_dir` recursively and index every image file by stem
    pub fn scan(base_dir: &Path) -> Result<Self> {
        if !base_dir.exists() {
            return Err(LesionError::PathNotFound(base_dir.to_path_buf()));
        }

        info!("Indexing images under {:?}", base_dir);

        let mut paths = HashMap::new();
        for entry in WalkDir::new(base_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let is_image = path
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    IMAGE_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false);

            if !is_image {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some(previous) = paths.insert(stem.to_string(), path.to_path_buf()) {
                    warn!("Duplicate image id '{}', ignoring {:?}", stem, previous);
                }
            }
        }

        info!("Indexed {} images", paths.len());
        Ok(Self { paths })
    }

    pub fn get(&self, image_id: &str) -> Option<&Path> {
        self.paths.get(image_id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Loads images by id at a fixed size, caching each decoded image
pub struct ImageLoader {
    index: ImageIndex,
    image_size: usize,
    cache: HashMap<String, LesionImage>,
}

impl ImageLoader {
    pub fn new(index: ImageIndex, image_size: usize) -> Self {
        Self {
            index,
            image_size,
            cache: HashMap::new(),
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Number of distinct images decoded so far
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Load one image, decoding it on first use
    pub fn load(&mut self, image_id: &str) -> Result<LesionImage> {
        if let Some(image) = self.cache.get(image_id) {
            return Ok(image.clone());
        }

        let path = self
            .index
            .get(image_id)
            .ok_or_else(|| LesionError::ImageNotFound(image_id.to_string()))?;

        let rgb = decode_resized(path, self.image_size)?;
        let image = LesionImage::from_rgb(image_id, &rgb);
        self.cache.insert(image_id.to_string(), image.clone());

        Ok(image)
    }

    /// Load one image per balanced sample, in balanced-set order
    pub fn load_balanced(
        &mut self,
        records: &[LesionRecord],
        balanced: &BalancedSet,
    ) -> Result<Vec<LabeledImage>> {
        let mut progress = ProgressLogger::new("Loading images", balanced.len());
        let mut images = Vec::with_capacity(balanced.len());

        for sample in &balanced.samples {
            let record = records.get(sample.source_index).ok_or_else(|| {
                LesionError::Dataset(format!(
                    "Balanced sample points at row {} but the table has {} rows",
                    sample.source_index,
                    records.len()
                ))
            })?;

            images.push(LabeledImage {
                image: self.load(&record.image_id)?,
                label: sample.label,
                source_index: sample.source_index,
            });
            progress.increment();
        }

        progress.finish();
        debug!(
            "Decoded {} distinct images for {} samples",
            self.cache.len(),
            images.len()
        );

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::balance::BalancedSample;

    fn write_image(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        let img = RgbImage::from_pixel(width, height, image::Rgb(color));
        img.save(path).unwrap();
    }

    fn record(image_id: &str, dx: &str) -> LesionRecord {
        LesionRecord {
            lesion_id: format!("HAM_{}", image_id),
            image_id: image_id.to_string(),
            diagnosis: dx.to_string(),
            dx_type: "histo".to_string(),
            age: Some(50.0),
            sex: "male".to_string(),
            localization: "back".to_string(),
        }
    }

    #[test]
    fn test_scan_finds_images_in_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let part1 = dir.path().join("HAM10000_images_part_1");
        let part2 = dir.path().join("HAM10000_images_part_2");
        std::fs::create_dir_all(&part1).unwrap();
        std::fs::create_dir_all(&part2).unwrap();

        write_image(&part1.join("ISIC_0000001.png"), 8, 8, [255, 0, 0]);
        write_image(&part2.join("ISIC_0000002.png"), 8, 8, [0, 255, 0]);
        std::fs::write(part2.join("notes.txt"), "not an image").unwrap();

        let index = ImageIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.get("ISIC_0000001").is_some());
        assert!(index.get("ISIC_0000002").is_some());
        assert!(index.get("notes").is_none());
    }

    #[test]
    fn test_load_resizes_to_square() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("ISIC_0000001.png"), 40, 30, [200, 100, 50]);

        let mut loader = ImageLoader::new(ImageIndex::scan(dir.path()).unwrap(), 16);
        let image = loader.load("ISIC_0000001").unwrap();

        assert_eq!(image.shape(), [16, 16, 3]);
        assert_eq!(image.pixels.len(), 16 * 16 * 3);
        assert_eq!(&image.pixels[..3], &[200, 100, 50]);
    }

    #[test]
    fn test_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = ImageLoader::new(ImageIndex::scan(dir.path()).unwrap(), 16);

        assert!(matches!(
            loader.load("ISIC_9999999"),
            Err(LesionError::ImageNotFound(id)) if id == "ISIC_9999999"
        ));
    }

    #[test]
    fn test_corrupt_image_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ISIC_0000001.jpg"), b"definitely not a jpeg").unwrap();

        let mut loader = ImageLoader::new(ImageIndex::scan(dir.path()).unwrap(), 16);
        assert!(matches!(
            loader.load("ISIC_0000001"),
            Err(LesionError::ImageLoad(_, _))
        ));
    }

    #[test]
    fn test_chw_normalization() {
        let image = LesionImage {
            image_id: "x".to_string(),
            size: 1,
            pixels: vec![255, 0, 51],
        };
        assert_eq!(image.to_chw_normalized(), vec![1.0, 0.0, 0.2]);

        let pixels = vec![10u8, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
        let chw = hwc_to_chw_normalized(&pixels, 2);
        assert_eq!(chw[0], 10.0 / 255.0);
        assert_eq!(chw[4], 20.0 / 255.0);
        assert_eq!(chw[8], 30.0 / 255.0);
        assert_eq!(chw[3], 100.0 / 255.0);
        assert!(chw.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_load_balanced_caches_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("ISIC_A.png"), 8, 8, [10, 10, 10]);
        write_image(&dir.path().join("ISIC_B.png"), 8, 8, [20, 20, 20]);

        let records = vec![record("ISIC_A", "mel"), record("ISIC_B", "nv")];
        let balanced = BalancedSet {
            samples: vec![
                BalancedSample { source_index: 0, label: 0 },
                BalancedSample { source_index: 0, label: 0 },
                BalancedSample { source_index: 1, label: 1 },
                BalancedSample { source_index: 1, label: 1 },
            ],
            samples_per_class: 2,
            num_classes: 2,
        };

        let mut loader = ImageLoader::new(ImageIndex::scan(dir.path()).unwrap(), 4);
        let images = loader.load_balanced(&records, &balanced).unwrap();

        assert_eq!(images.len(), 4);
        assert_eq!(loader.cached(), 2);
        assert_eq!(images[0].image, images[1].image);
        assert_eq!(images[2].label, 1);
        assert_eq!(images[1].source_index, 0);
        assert_eq!(images[3].source_index, 1);
        assert!(images.iter().all(|i| i.image.shape() == [4, 4, 3]));
    }
}
