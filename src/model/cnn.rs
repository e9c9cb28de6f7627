//! CNN Model Architecture for Skin Lesion Classification
//!
//! Two convolutional blocks followed by a three-layer classifier head.
//! All convolutions use valid padding, so each 3x3 kernel trims two pixels
//! from the feature map.
//!
//! For the default 32x32 input:
//!
//! ```text
//! 32 -> conv 30 -> conv 28 -> pool 14   (64 filters)
//! 14 -> conv 12 -> conv 10 -> pool 5    (128 filters)
//! flatten 128 * 5 * 5 = 3200 -> 256 -> 128 -> 7
//! ```

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::utils::error::LesionError;

/// Filters in the first and second convolutional block
pub const BLOCK_FILTERS: [usize; 2] = [64, 128];

/// Hidden units of the two dense layers
pub const HIDDEN_UNITS: [usize; 2] = [256, 128];

/// Smallest input side that still leaves a 1x1 map after both blocks
pub const MIN_IMAGE_SIZE: usize = 16;

/// Configuration for the LesionClassifier CNN model
#[derive(Config, Debug)]
pub struct LesionClassifierConfig {
    /// Number of output classes
    #[config(default = 7)]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = 32)]
    pub image_size: usize,

    /// Dropout rate after each hidden dense layer
    #[config(default = 0.5)]
    pub dropout: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = 3)]
    pub in_channels: usize,
}

impl LesionClassifierConfig {
    /// Side length of the feature map after both blocks
    pub fn feature_map_size(&self) -> usize {
        BLOCK_FILTERS
            .iter()
            .fold(self.image_size, |size, _| size.saturating_sub(4) / 2)
    }

    /// Length of the flattened feature vector fed to the head
    pub fn feature_dim(&self) -> usize {
        let side = self.feature_map_size();
        BLOCK_FILTERS[BLOCK_FILTERS.len() - 1] * side * side
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(LesionError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        if self.image_size < MIN_IMAGE_SIZE {
            return Err(LesionError::Config(format!(
                "image_size must be at least {} for two conv blocks, got {}",
                MIN_IMAGE_SIZE, self.image_size
            )));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(LesionError::Config(
                "dropout must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if self.in_channels == 0 {
            return Err(LesionError::Config(
                "in_channels must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and build the model
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> crate::utils::error::Result<LesionClassifier<B>> {
        LesionClassifier::new(self, device)
    }
}

/// conv3x3 -> ReLU -> conv3x3 -> ReLU -> maxpool 2x2 -> batchnorm
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv1: Conv2dConfig::new([in_channels, out_channels], [3, 3]).init(device),
            conv2: Conv2dConfig::new([out_channels, out_channels], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);
        self.bn.forward(x)
    }
}

/// Skin Lesion Classifier CNN
#[derive(Module, Debug)]
pub struct LesionClassifier<B: Backend> {
    pub block1: ConvBlock<B>,
    pub block2: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub fc3: Linear<B>,
    pub dropout: Dropout,
    pub relu: Relu,

    num_classes: usize,
}

impl<B: Backend> LesionClassifier<B> {
    /// Create a new LesionClassifier from configuration
    pub fn new(
        config: &LesionClassifierConfig,
        device: &B::Device,
    ) -> crate::utils::error::Result<Self> {
        config.validate()?;

        let [filters1, filters2] = BLOCK_FILTERS;
        let [hidden1, hidden2] = HIDDEN_UNITS;

        Ok(Self {
            block1: ConvBlock::new(config.in_channels, filters1, device),
            block2: ConvBlock::new(filters1, filters2, device),
            fc1: LinearConfig::new(config.feature_dim(), hidden1).init(device),
            fc2: LinearConfig::new(hidden1, hidden2).init(device),
            fc3: LinearConfig::new(hidden2, config.num_classes).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            relu: Relu::new(),
            num_classes: config.num_classes,
        })
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.dropout.forward(self.relu.forward(self.fc1.forward(x)));
        let x = self.dropout.forward(self.relu.forward(self.fc2.forward(x)));
        self.fc3.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_feature_dim_for_default_size() {
        let config = LesionClassifierConfig::new();
        assert_eq!(config.feature_map_size(), 5);
        assert_eq!(config.feature_dim(), 3200);
    }

    #[test]
    fn test_feature_dim_for_small_size() {
        let config = LesionClassifierConfig::new().with_image_size(16);
        assert_eq!(config.feature_map_size(), 1);
        assert_eq!(config.feature_dim(), 128);
    }

    #[test]
    fn test_validate_rejects_tiny_images() {
        assert!(LesionClassifierConfig::new().with_image_size(12).validate().is_err());
        assert!(LesionClassifierConfig::new().with_dropout(1.0).validate().is_err());
        assert!(LesionClassifierConfig::new().with_num_classes(0).validate().is_err());
        assert!(LesionClassifierConfig::new().validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");

        let config = LesionClassifierConfig::new()
            .with_num_classes(5)
            .with_image_size(24)
            .with_dropout(0.25);
        config.save(&path).unwrap();

        let loaded = LesionClassifierConfig::load(&path).unwrap();
        assert_eq!(loaded.num_classes, 5);
        assert_eq!(loaded.image_size, 24);
        assert_eq!(loaded.dropout, 0.25);
        assert_eq!(loaded.in_channels, 3);
        assert_eq!(loaded.feature_dim(), config.feature_dim());
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = LesionClassifierConfig::new()
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 7]);
        assert_eq!(model.num_classes(), 7);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = LesionClassifierConfig::new()
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [3, 3, 16, 16],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let probs = model.forward_softmax(input);
        let sums = probs.sum_dim(1).into_data().to_vec::<f32>().unwrap();

        assert_eq!(sums.len(), 3);
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_model_builds_on_autodiff_backend() {
        let device = Default::default();
        let model = LesionClassifierConfig::new()
            .with_image_size(16)
            .init::<Autodiff<TestBackend>>(&device)
            .unwrap();

        let input = Tensor::<Autodiff<TestBackend>, 4>::ones([2, 3, 16, 16], &device);
        assert_eq!(model.forward(input).dims(), [2, 7]);
    }
}
