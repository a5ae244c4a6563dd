//! Pixel-attention-guided fusion module.

use backbones::ConvBlock;
use burn::{
    prelude::*,
    tensor::{
        activation::sigmoid,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Configuration for [`PagFM`].
#[derive(Config, Debug)]
pub struct PagFMConfig {
    /// Width of the two feature maps being fused.
    in_channels: usize,
    /// Width of the embedding space used to compute the attention map.
    channels: usize,
    /// Compute a per-channel attention map instead of a single-channel one.
    #[config(default = false)]
    with_channel: bool,
}

impl PagFMConfig {
    /// Initialize a new [`PagFM`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PagFM<B> {
        PagFM {
            f_p: ConvBlock::new(self.in_channels, self.channels, 1, 1, 0, false, device),
            f_i: ConvBlock::new(self.in_channels, self.channels, 1, 1, 0, false, device),
            up_proj: self
                .with_channel
                .then(|| ConvBlock::new(self.channels, self.in_channels, 1, 1, 0, false, device)),
        }
    }
}

/// Pixel-attention-guided fusion of a high-resolution feature map with
/// a semantically richer low-resolution one.
///
/// Both inputs are embedded with 1x1 convolutions and their pointwise
/// product, summed over channels, gives a sigmoid gate `sigma`. The
/// output blends the upsampled low-resolution map (weight `sigma`)
/// with the high-resolution map (weight `1 - sigma`).
#[derive(Module, Debug)]
pub struct PagFM<B: Backend> {
    f_p: ConvBlock<B>,
    f_i: ConvBlock<B>,
    up_proj: Option<ConvBlock<B>>,
}

impl<B: Backend> PagFM<B> {
    /// Fuses the high-resolution map `x_p` with the low-resolution map `x_i`.
    ///
    /// The output has the shape of `x_p`.
    pub fn forward(&self, x_p: Tensor<B, 4>, x_i: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x_p.dims();

        let f_i = interpolate(
            self.f_i.forward(x_i.clone()),
            [height, width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        );
        let f_p = self.f_p.forward(x_p.clone());

        let sigma = match &self.up_proj {
            Some(up_proj) => sigmoid(up_proj.forward(f_p * f_i)),
            None => sigmoid((f_p * f_i).sum_dim(1)),
        };

        let x_i = interpolate(
            x_i,
            [height, width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        );

        sigma.clone() * x_i + (Tensor::ones_like(&sigma) - sigma) * x_p
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
    fn fusion_keeps_the_high_resolution_shape() {
        let device = Default::default();
        let pag = PagFMConfig::new(32, 16).init::<TestBackend>(&device);

        let output = pag.forward(random_input(32, 8), random_input(32, 4));
        assert_eq!(output.dims(), [1, 32, 8, 8]);
    }

    #[test]
    fn per_channel_gate_keeps_the_shape() {
        let device = Default::default();
        let pag = PagFMConfig::new(32, 16)
            .with_with_channel(true)
            .init::<TestBackend>(&device);

        let output = pag.forward(random_input(32, 8), random_input(32, 4));
        assert_eq!(output.dims(), [1, 32, 8, 8]);
    }
}
