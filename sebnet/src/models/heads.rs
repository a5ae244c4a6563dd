//! Prediction heads.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Configuration for [`SegHead`].
#[derive(Config, Debug)]
pub struct SegHeadConfig {
    /// Width of the incoming feature map.
    in_channels: usize,
    /// Intermediate width.
    head_channels: usize,
    /// Number of output maps.
    out_channels: usize,
}

impl SegHeadConfig {
    /// Initialize a new [`SegHead`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegHead<B> {
        SegHead {
            bn1: BatchNormConfig::new(self.in_channels).init(device),
            conv1: Conv2dConfig::new([self.in_channels, self.head_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn2: BatchNormConfig::new(self.head_channels).init(device),
            conv2: Conv2dConfig::new([self.head_channels, self.out_channels], [1, 1]).init(device),
            relu: Relu::new(),
        }
    }
}

/// Dense prediction head producing logit maps.
///
/// Pre-activation layout so it can consume the raw residual features
/// of the branches: norm and activation precede each convolution.
#[derive(Module, Debug)]
pub struct SegHead<B: Backend> {
    bn1: BatchNorm<B, 2>,
    conv1: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> SegHead<B> {
    /// Forward pass. The output keeps the input resolution.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(self.relu.forward(self.bn1.forward(x)));
        self.conv2.forward(self.relu.forward(self.bn2.forward(x)))
    }
}

/// Configuration for [`LinearClsHead`].
#[derive(Config, Debug)]
pub struct LinearClsHeadConfig {
    /// Width of the incoming feature map.
    in_channels: usize,
    /// Number of classes.
    num_classes: usize,
}

impl LinearClsHeadConfig {
    /// Initialize a new [`LinearClsHead`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LinearClsHead<B> {
        LinearClsHead {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(self.in_channels, self.num_classes).init(device),
        }
    }
}

/// Classification head: global average pooling followed by a single
/// fully connected layer.
#[derive(Module, Debug)]
pub struct LinearClsHead<B: Backend> {
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> LinearClsHead<B> {
    /// Produces class logits of shape `[batch, num_classes]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        self.fc.forward(x.reshape([batch, channels]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn random_input(channels: usize, size: usize) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [2, channels, size, size],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn seg_head_maps_channels_and_keeps_resolution() {
        let device = Default::default();
        let head = SegHeadConfig::new(64, 32, 19).init::<TestBackend>(&device);

        let output = head.forward(random_input(64, 8));
        assert_eq!(output.dims(), [2, 19, 8, 8]);
    }

    #[test]
    fn cls_head_pools_to_class_logits() {
        let device = Default::default();
        let head = LinearClsHeadConfig::new(64, 10).init::<TestBackend>(&device);

        let output = head.forward(random_input(64, 7));
        assert_eq!(output.dims(), [2, 10]);
    }
}
