//! Residual block implementations.
//!
//! This module contains the building blocks for the SEBNet trunk and branches:
//! ConvBlock, BasicBlock, Bottleneck, and LayerBlock.
//!
//! Unlike the torchvision blocks these follow the pre-activation handoff
//! convention: a block created with `out_relu = false` returns the raw
//! residual sum and the caller applies the ReLU where the next stage needs it.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Kaiming-normal fan-out initializer shared by every convolution in the trunk.
pub(crate) fn conv_initializer() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// Convolution + BatchNorm unit with an optional trailing ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Option<Relu>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        let out = self.bn.forward(out);
        match &self.relu {
            Some(relu) => relu.forward(out),
            None => out,
        }
    }

    /// Create a new ConvBlock with a square kernel and explicit padding.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        relu: bool,
        device: &Device<B>,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: relu.then(Relu::new),
        }
    }
}

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    /// A bottleneck residual block.
    Bottleneck(Bottleneck<B>),
    /// A basic residual block.
    Basic(BasicBlock<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

/// Basic residual block (expansion 1): two 3x3 convolutions plus a skip
/// connection, with a 1x1 projection when the shape changes.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    out_relu: bool,
}

impl<B: Backend> BasicBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        // Conv block
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        if self.out_relu {
            self.relu.forward(out)
        } else {
            out
        }
    }

    /// Create a new BasicBlock.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        out_relu: bool,
        device: &Device<B>,
    ) -> Self {
        let initializer = conv_initializer();

        // conv3x3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let bn1 = BatchNormConfig::new(out_channels).init(device);

        // conv3x3
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);
        let bn2 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            downsample,
            out_relu,
        }
    }
}

/// Bottleneck residual block (expansion 2): the 1x1 convolutions narrow the
/// feature map to `out_channels / 2` around the strided 3x3 convolution.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    out_relu: bool,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        // Conv block
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        if self.out_relu {
            self.relu.forward(out)
        } else {
            out
        }
    }

    /// Create a new Bottleneck.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        out_relu: bool,
        device: &Device<B>,
    ) -> Self {
        // Intermediate output channels w/ expansion = 2
        let int_out_channels = out_channels / 2;

        let initializer = conv_initializer();

        // conv1x1
        let conv1 = Conv2dConfig::new([in_channels, int_out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let bn1 = BatchNormConfig::new(int_out_channels).init(device);

        // conv3x3
        let conv2 = Conv2dConfig::new([int_out_channels, int_out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let bn2 = BatchNormConfig::new(int_out_channels).init(device);

        // conv1x1
        let conv3 = Conv2dConfig::new([int_out_channels, out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);
        let bn3 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
            out_relu,
        }
    }
}

/// Downsample layer applies a 1x1 conv to reduce the resolution (H, W) and adjust the number of channels.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Downsample.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        // conv1x1
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }
}

/// Collection of sequential residual blocks forming one trunk stage.
///
/// The last block skips its output activation so the stage hands a
/// pre-activation feature map to its consumers.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for block in &self.blocks {
            out = block.forward(out);
        }
        out
    }

    /// Create a new LayerBlock.
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        bottleneck: bool,
        device: &Device<B>,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| {
                // First block uses the specified stride, the rest stride 1.
                let (in_ch, stride) = if b == 0 {
                    (in_channels, stride)
                } else {
                    (out_channels, 1)
                };
                let out_relu = b + 1 < num_blocks;

                if bottleneck {
                    ResidualBlock::Bottleneck(Bottleneck::new(
                        in_ch,
                        out_channels,
                        stride,
                        out_relu,
                        device,
                    ))
                } else {
                    ResidualBlock::Basic(BasicBlock::new(
                        in_ch,
                        out_channels,
                        stride,
                        out_relu,
                        device,
                    ))
                }
            })
            .collect();

        Self { blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn random_input(channels: usize, size: usize) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [1, channels, size, size],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn test_conv_block_downsamples() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(3, 32, 3, 2, 1, true, &device);

        let output = block.forward(random_input(3, 64));
        assert_eq!(output.dims(), [1, 32, 32, 32]);
    }

    #[test]
    fn test_basic_block_identity_shape() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(32, 32, 1, true, &device);

        let output = block.forward(random_input(32, 16));
        assert_eq!(output.dims(), [1, 32, 16, 16]);
    }

    #[test]
    fn test_basic_block_projection() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(32, 64, 2, false, &device);

        let output = block.forward(random_input(32, 16));
        assert_eq!(output.dims(), [1, 64, 8, 8]);
    }

    #[test]
    fn test_bottleneck_doubles_channels() {
        let device = Default::default();
        let block = Bottleneck::<TestBackend>::new(64, 128, 2, false, &device);

        let output = block.forward(random_input(64, 16));
        assert_eq!(output.dims(), [1, 128, 8, 8]);
    }

    #[test]
    fn test_layer_block_stride_on_first() {
        let device = Default::default();
        let layer = LayerBlock::<TestBackend>::new(3, 32, 64, 2, false, &device);

        let output = layer.forward(random_input(32, 32));
        assert_eq!(output.dims(), [1, 64, 16, 16]);
    }
}
