//! Crate-level tests: configuration validation and whole-model shape
//! checks.

use burn::prelude::*;

use crate::config::{BackboneConfig, HeadConfig, ModelConfig, SebNetVariant};
use crate::error::{SebNetError, SebNetResult};
use crate::models::{SebNet, SebNetConfig};

type TestBackend = burn::backend::NdArray<f32>;

fn init_segmentation(
    config: ModelConfig,
    device: &<TestBackend as Backend>::Device,
) -> SebNetResult<SebNet<TestBackend>> {
    #[cfg(feature = "train")]
    let config = SebNetConfig::new(config, crate::losses::SebNetLossConfig::new());
    #[cfg(not(feature = "train"))]
    let config = SebNetConfig::new(config);

    config.init(device)
}

#[test]
fn zero_channels_are_rejected() {
    let config = ModelConfig::new().with_backbone(BackboneConfig::new().with_channels(0));

    match config.validate() {
        Err(SebNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("channels must be positive"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn unsupported_stem_depth_is_rejected() {
    let config = ModelConfig::new().with_backbone(BackboneConfig::new().with_num_stem_blocks(4));

    match config.validate() {
        Err(SebNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("num_stem_blocks must be 2 or 3"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn single_class_is_rejected() {
    let config = ModelConfig::new().with_head(HeadConfig::new().with_num_classes(1));

    match config.validate() {
        Err(SebNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("num_classes must be at least 2"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn zero_head_channels_are_rejected() {
    let config = ModelConfig::new().with_head(HeadConfig::new().with_head_channels(0));

    match config.validate() {
        Err(SebNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("head_channels must be positive"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn model_init_propagates_validation_errors() {
    let device = Default::default();
    let config = ModelConfig::new().with_backbone(BackboneConfig::new().with_ppm_channels(0));

    assert!(matches!(
        init_segmentation(config, &device),
        Err(SebNetError::InvalidConfiguration { .. })
    ));
}

#[test]
fn all_variants_validate() {
    for variant in [SebNetVariant::S, SebNetVariant::M, SebNetVariant::L] {
        assert!(ModelConfig::from_variant(&variant).validate().is_ok());
    }
}

#[test]
fn channel_arithmetic_follows_the_base_width() {
    let backbone = BackboneConfig::new().with_channels(32);

    assert_eq!(backbone.branch_channels(), 128);
    assert_eq!(backbone.trunk_channels(), 512);
    assert_eq!(backbone.expanded_channels(), 1024);
}

#[test]
fn misaligned_inputs_are_rejected() {
    let device = Default::default();
    let model = init_segmentation(ModelConfig::sebnet_s(), &device).unwrap();

    let input = Tensor::random(
        [1, 3, 96, 96],
        burn::tensor::Distribution::Normal(0.0, 1.0),
        &device,
    );

    match model.forward(input) {
        Err(SebNetError::InvalidTensorShape { expected, actual }) => {
            assert!(expected.contains("divisible by 64"));
            assert_eq!(actual, "96x96");
        }
        _ => panic!("Expected InvalidTensorShape error"),
    }
}

#[test]
fn segmentation_outputs_match_the_input_resolution() {
    let device = Default::default();
    let model = init_segmentation(ModelConfig::sebnet_s(), &device).unwrap();

    let input = Tensor::random(
        [1, 3, 64, 64],
        burn::tensor::Distribution::Normal(0.0, 1.0),
        &device,
    );

    let logits = model.forward(input.clone()).unwrap();
    assert_eq!(logits.dims(), [1, 19, 64, 64]);

    let output = model.forward_train(input).unwrap();
    assert_eq!(output.logits.dims(), [1, 19, 64, 64]);
    assert_eq!(output.aux_logits.dims(), [1, 19, 64, 64]);
    assert_eq!(output.boundary_logits.dims(), [1, 1, 64, 64]);
    assert_eq!(output.sbd_side.dims(), [1, 19, 64, 64]);
    assert_eq!(output.sbd_fuse.dims(), [1, 19, 64, 64]);
}
