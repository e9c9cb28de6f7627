//! Burn Dataset Integration for HAM10000
//!
//! Wraps the split examples in Burn's `Dataset` trait and turns lists of
//! items into image, target and one-hot tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;

use super::split::LabeledExample;
use super::CHANNELS;

/// A single lesion sample ready for Burn
#[derive(Clone, Debug)]
pub struct LesionItem {
    /// Image data as flattened CHW float array [3 * S * S] in [0, 1]
    pub image: Vec<f32>,
    /// Class id
    pub label: usize,
    /// One-hot target of length `num_classes`
    pub one_hot: Vec<f32>,
}

impl From<&LabeledExample> for LesionItem {
    fn from(example: &LabeledExample) -> Self {
        Self {
            image: example.image.to_chw_normalized(),
            label: example.label,
            one_hot: example.one_hot.clone(),
        }
    }
}

/// In-memory dataset over one split partition
#[derive(Debug, Clone)]
pub struct LesionBurnDataset {
    items: Vec<LesionItem>,
}

impl LesionBurnDataset {
    pub fn new(items: Vec<LesionItem>) -> Self {
        Self { items }
    }

    /// Convert every example to normalized CHW floats up front
    pub fn from_examples(examples: &[LabeledExample]) -> Self {
        Self::new(examples.iter().map(LesionItem::from).collect())
    }

    /// Get samples per class count
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.label < num_classes {
                counts[item.label] += 1;
            }
        }
        counts
    }
}

impl Dataset<LesionItem> for LesionBurnDataset {
    fn get(&self, index: usize) -> Option<LesionItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of lesion images
#[derive(Clone, Debug)]
pub struct LesionBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Class ids with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
    /// One-hot targets with shape [batch_size, num_classes]
    pub one_hot: Tensor<B, 2>,
}

/// Batcher for lesion items of a fixed image size
#[derive(Clone, Debug)]
pub struct LesionBatcher<B: Backend> {
    #[allow(dead_code)]
    device: B::Device,
    image_size: usize,
    num_classes: usize,
}

impl<B: Backend> LesionBatcher<B> {
    pub fn new(device: B::Device, image_size: usize, num_classes: usize) -> Self {
        Self {
            device,
            image_size,
            num_classes,
        }
    }
}

impl<B: Backend> Batcher<B, LesionItem, LesionBatch<B>> for LesionBatcher<B> {
    fn batch(&self, items: Vec<LesionItem>, device: &B::Device) -> LesionBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, CHANNELS, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        let one_hot_data: Vec<f32> = items.iter().flat_map(|item| item.one_hot.iter().copied()).collect();
        let one_hot = Tensor::<B, 2>::from_floats(
            TensorData::new(one_hot_data, [batch_size, self.num_classes]),
            device,
        );

        LesionBatch {
            images,
            targets,
            one_hot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::images::LesionImage;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn example(label: usize) -> LabeledExample {
        LabeledExample::new(
            LesionImage {
                image_id: format!("ISIC_{}", label),
                size: 4,
                pixels: vec![(label * 30) as u8; 4 * 4 * 3],
            },
            label,
            7,
        )
        .unwrap()
    }

    #[test]
    fn test_dataset_len_and_get() {
        let examples: Vec<_> = (0..7).map(example).collect();
        let dataset = LesionBurnDataset::from_examples(&examples);

        assert_eq!(dataset.len(), 7);
        let item = dataset.get(3).unwrap();
        assert_eq!(item.label, 3);
        assert_eq!(item.image.len(), 3 * 4 * 4);
        assert!(dataset.get(7).is_none());
        assert_eq!(dataset.class_distribution(7), vec![1; 7]);
    }

    #[test]
    fn test_batch_shapes() {
        let device = <TestBackend as Backend>::Device::default();
        let examples: Vec<_> = (0..5).map(example).collect();
        let items: Vec<_> = examples.iter().map(LesionItem::from).collect();

        let batcher = LesionBatcher::<TestBackend>::new(device.clone(), 4, 7);
        let batch = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [5, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [5]);
        assert_eq!(batch.one_hot.dims(), [5, 7]);

        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 1, 2, 3, 4]);

        let row_sums = batch.one_hot.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        assert!(row_sums.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }
}
