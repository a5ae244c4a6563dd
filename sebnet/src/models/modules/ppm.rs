//! Pyramid pooling modules placed on the deepest trunk stage.
//!
//! Two variants are provided. [`Dappm`] fuses the pooled scales in a
//! cascade, each scale refining the previous one. [`Pappm`] fuses all
//! scales in parallel through a single grouped convolution, trading a
//! little accuracy for speed.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Pooling windows of the intermediate scales.
const SCALE_KERNELS: [usize; 3] = [5, 9, 17];
const SCALE_STRIDES: [usize; 3] = [2, 4, 8];

/// Pre-activation convolution unit (norm, act, conv) without bias.
#[derive(Module, Debug)]
struct NormActConv<B: Backend> {
    bn: BatchNorm<B, 2>,
    relu: Relu,
    conv: Conv2d<B>,
}

impl<B: Backend> NormActConv<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            bn: BatchNormConfig::new(in_channels).init(device),
            relu: Relu::new(),
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Explicit(
                    kernel_size / 2,
                    kernel_size / 2,
                ))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(self.relu.forward(self.bn.forward(x)))
    }
}

/// Average-pooled scale branch.
#[derive(Module, Debug)]
struct PooledScale<B: Backend> {
    pool: AvgPool2d,
    conv: NormActConv<B>,
}

impl<B: Backend> PooledScale<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            pool: AvgPool2dConfig::new([kernel_size, kernel_size])
                .with_strides([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(
                    kernel_size / 2,
                    kernel_size / 2,
                ))
                .init(),
            conv: NormActConv::new(in_channels, out_channels, 1, 1, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(self.pool.forward(x))
    }
}

/// Globally pooled scale branch.
#[derive(Module, Debug)]
struct GlobalScale<B: Backend> {
    pool: AdaptiveAvgPool2d,
    conv: NormActConv<B>,
}

impl<B: Backend> GlobalScale<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            conv: NormActConv::new(in_channels, out_channels, 1, 1, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(self.pool.forward(x))
    }
}

/// Configuration for [`Dappm`].
#[derive(Config, Debug)]
pub struct DappmConfig {
    in_channels: usize,
    branch_channels: usize,
    out_channels: usize,
}

impl DappmConfig {
    /// Initialize a new [`Dappm`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Dappm<B> {
        let pooled_scales = SCALE_KERNELS
            .iter()
            .zip(SCALE_STRIDES.iter())
            .map(|(&kernel_size, &stride)| {
                PooledScale::new(
                    self.in_channels,
                    self.branch_channels,
                    kernel_size,
                    stride,
                    device,
                )
            })
            .collect();

        let processes = (0..SCALE_KERNELS.len() + 1)
            .map(|_| NormActConv::new(self.branch_channels, self.branch_channels, 3, 1, device))
            .collect();

        Dappm {
            input_scale: NormActConv::new(self.in_channels, self.branch_channels, 1, 1, device),
            pooled_scales,
            global_scale: GlobalScale::new(self.in_channels, self.branch_channels, device),
            processes,
            compression: NormActConv::new(
                self.branch_channels * (SCALE_KERNELS.len() + 2),
                self.out_channels,
                1,
                1,
                device,
            ),
            shortcut: NormActConv::new(self.in_channels, self.out_channels, 1, 1, device),
        }
    }
}

/// Deep aggregation pyramid pooling module.
///
/// Five scale branches (identity, three average pools, one global
/// pool) are fused in a cascade: each upsampled scale is added to the
/// previous fused feature and refined with a 3x3 convolution before
/// the concatenated result is compressed. A shortcut path preserves
/// the input.
#[derive(Module, Debug)]
pub struct Dappm<B: Backend> {
    input_scale: NormActConv<B>,
    pooled_scales: Vec<PooledScale<B>>,
    global_scale: GlobalScale<B>,
    processes: Vec<NormActConv<B>>,
    compression: NormActConv<B>,
    shortcut: NormActConv<B>,
}

impl<B: Backend> Dappm<B> {
    /// Forward pass. The output keeps the input resolution.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let up = |t: Tensor<B, 4>| {
            interpolate(
                t,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        let mut feats = Vec::with_capacity(self.pooled_scales.len() + 2);
        feats.push(self.input_scale.forward(x.clone()));

        for (i, scale) in self.pooled_scales.iter().enumerate() {
            let fused = up(scale.forward(x.clone())) + feats[i].clone();
            feats.push(self.processes[i].forward(fused));
        }

        let fused = up(self.global_scale.forward(x.clone())) + feats[feats.len() - 1].clone();
        feats.push(self.processes[self.processes.len() - 1].forward(fused));

        self.compression.forward(Tensor::cat(feats, 1)) + self.shortcut.forward(x)
    }
}

/// Configuration for [`Pappm`].
#[derive(Config, Debug)]
pub struct PappmConfig {
    in_channels: usize,
    branch_channels: usize,
    out_channels: usize,
}

impl PappmConfig {
    /// Initialize a new [`Pappm`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Pappm<B> {
        let num_pooled = SCALE_KERNELS.len() + 1;
        let pooled_scales = SCALE_KERNELS
            .iter()
            .zip(SCALE_STRIDES.iter())
            .map(|(&kernel_size, &stride)| {
                PooledScale::new(
                    self.in_channels,
                    self.branch_channels,
                    kernel_size,
                    stride,
                    device,
                )
            })
            .collect();

        Pappm {
            input_scale: NormActConv::new(self.in_channels, self.branch_channels, 1, 1, device),
            pooled_scales,
            global_scale: GlobalScale::new(self.in_channels, self.branch_channels, device),
            scale_process: NormActConv::new(
                self.branch_channels * num_pooled,
                self.branch_channels * num_pooled,
                3,
                num_pooled,
                device,
            ),
            compression: NormActConv::new(
                self.branch_channels * (num_pooled + 1),
                self.out_channels,
                1,
                1,
                device,
            ),
            shortcut: NormActConv::new(self.in_channels, self.out_channels, 1, 1, device),
        }
    }
}

/// Parallel aggregation pyramid pooling module.
///
/// The pooled scales are each added to the identity scale, processed
/// together by one grouped 3x3 convolution (one group per scale), and
/// compressed alongside the identity scale.
#[derive(Module, Debug)]
pub struct Pappm<B: Backend> {
    input_scale: NormActConv<B>,
    pooled_scales: Vec<PooledScale<B>>,
    global_scale: GlobalScale<B>,
    scale_process: NormActConv<B>,
    compression: NormActConv<B>,
    shortcut: NormActConv<B>,
}

impl<B: Backend> Pappm<B> {
    /// Forward pass. The output keeps the input resolution.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let up = |t: Tensor<B, 4>| {
            interpolate(
                t,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };

        let identity = self.input_scale.forward(x.clone());

        let mut feats = Vec::with_capacity(self.pooled_scales.len() + 1);
        for scale in &self.pooled_scales {
            feats.push(up(scale.forward(x.clone())) + identity.clone());
        }
        feats.push(up(self.global_scale.forward(x.clone())) + identity.clone());

        let scale_out = self.scale_process.forward(Tensor::cat(feats, 1));

        self.compression
            .forward(Tensor::cat(vec![identity, scale_out], 1))
            + self.shortcut.forward(x)
    }
}

/// Pyramid pooling module selected by the model configuration.
#[derive(Module, Debug)]
pub enum PyramidPooling<B: Backend> {
    /// Cascaded scale fusion.
    Dappm(Dappm<B>),
    /// Parallel scale fusion.
    Pappm(Pappm<B>),
}

impl<B: Backend> PyramidPooling<B> {
    /// Forward pass through the selected module.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Dappm(module) => module.forward(x),
            Self::Pappm(module) => module.forward(x),
        }
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
    fn dappm_keeps_resolution_and_maps_width() {
        let device = Default::default();
        let module = DappmConfig::new(64, 16, 32).init::<TestBackend>(&device);

        let output = module.forward(random_input(64, 8));
        assert_eq!(output.dims(), [1, 32, 8, 8]);
    }

    #[test]
    fn pappm_keeps_resolution_and_maps_width() {
        let device = Default::default();
        let module = PappmConfig::new(64, 16, 32).init::<TestBackend>(&device);

        let output = module.forward(random_input(64, 8));
        assert_eq!(output.dims(), [1, 32, 8, 8]);
    }
}
