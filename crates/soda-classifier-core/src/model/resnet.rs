//! ResNet-18 with a two-way classification head.
//!
//! Parameter names follow the torchvision state dict (`conv1.weight`,
//! `layer2.0.downsample.1.running_mean`, `fc.bias`, ...), so a checkpoint
//! saved from `torchvision.models.resnet18` with a replaced `fc` binds
//! without renaming.

use candle_core::{Module, Tensor, D};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear};

use super::params::ParamSource;
use crate::error::{ClassifierError, ClassifierResult};

/// Width of the pooled feature vector feeding `fc`.
pub const FEATURE_DIM: usize = 512;

const STEM_CHANNELS: usize = 64;
const BN_EPS: f64 = 1e-5;

/// (output channels, stride of the first block) per stage.
const STAGES: [(usize, usize); 4] = [(64, 1), (128, 2), (256, 2), (512, 2)];
const BLOCKS_PER_STAGE: usize = 2;

fn conv(
    src: &mut ParamSource,
    name: &str,
    in_c: usize,
    out_c: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> ClassifierResult<Conv2d> {
    let weight = src.required(&format!("{name}.weight"), &[out_c, in_c, kernel, kernel])?;
    let config = Conv2dConfig {
        padding,
        stride,
        ..Default::default()
    };
    Ok(Conv2d::new(weight, None, config))
}

fn batch_norm(src: &mut ParamSource, name: &str, channels: usize) -> ClassifierResult<BatchNorm> {
    let weight = src.required(&format!("{name}.weight"), &[channels])?;
    let bias = src.required(&format!("{name}.bias"), &[channels])?;
    let running_mean = src.buffer_or(&format!("{name}.running_mean"), &[channels], 0.0)?;
    let running_var = src.buffer_or(&format!("{name}.running_var"), &[channels], 1.0)?;

    BatchNorm::new(channels, running_mean, running_var, weight, bias, BN_EPS)
        .map_err(|e| ClassifierError::internal(format!("batch norm '{name}': {e}")))
}

struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    downsample: Option<(Conv2d, BatchNorm)>,
}

impl BasicBlock {
    fn load(
        src: &mut ParamSource,
        prefix: &str,
        in_c: usize,
        out_c: usize,
        stride: usize,
    ) -> ClassifierResult<Self> {
        let conv1 = conv(src, &format!("{prefix}.conv1"), in_c, out_c, 3, stride, 1)?;
        let bn1 = batch_norm(src, &format!("{prefix}.bn1"), out_c)?;
        let conv2 = conv(src, &format!("{prefix}.conv2"), out_c, out_c, 3, 1, 1)?;
        let bn2 = batch_norm(src, &format!("{prefix}.bn2"), out_c)?;

        let downsample = if stride != 1 || in_c != out_c {
            let ds_conv = conv(src, &format!("{prefix}.downsample.0"), in_c, out_c, 1, stride, 0)?;
            let ds_bn = batch_norm(src, &format!("{prefix}.downsample.1"), out_c)?;
            Some((ds_conv, ds_bn))
        } else {
            None
        };

        Ok(Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let ys = xs
            .apply(&self.conv1)?
            .apply_t(&self.bn1, false)?
            .relu()?
            .apply(&self.conv2)?
            .apply_t(&self.bn2, false)?;

        let shortcut = match &self.downsample {
            Some((conv, bn)) => xs.apply(conv)?.apply_t(bn, false)?,
            None => xs.clone(),
        };

        (ys + shortcut)?.relu()
    }
}

/// ResNet-18 in inference mode.
pub struct ResNet18 {
    conv1: Conv2d,
    bn1: BatchNorm,
    blocks: Vec<BasicBlock>,
    fc: Linear,
    num_classes: usize,
}

impl ResNet18 {
    /// Bind every parameter of the network from `src`.
    ///
    /// The classification head must be exactly `[num_classes, 512]` plus a
    /// `[num_classes]` bias; any other shape is a hard failure.
    pub fn load(src: &mut ParamSource, num_classes: usize) -> ClassifierResult<Self> {
        let conv1 = conv(src, "conv1", 3, STEM_CHANNELS, 7, 2, 3)?;
        let bn1 = batch_norm(src, "bn1", STEM_CHANNELS)?;

        let mut blocks = Vec::with_capacity(STAGES.len() * BLOCKS_PER_STAGE);
        let mut in_c = STEM_CHANNELS;
        for (stage, &(out_c, stride)) in STAGES.iter().enumerate() {
            for block in 0..BLOCKS_PER_STAGE {
                let prefix = format!("layer{}.{}", stage + 1, block);
                let block_stride = if block == 0 { stride } else { 1 };
                blocks.push(BasicBlock::load(src, &prefix, in_c, out_c, block_stride)?);
                in_c = out_c;
            }
        }

        let fc = load_head(src, num_classes)?;

        Ok(Self {
            conv1,
            bn1,
            blocks,
            fc,
            num_classes,
        })
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `(N, 3, H, W)` to `(N, num_classes)` logits.
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs
            .apply(&self.conv1)?
            .apply_t(&self.bn1, false)?
            .relu()?
            // Max pooling ignores replicated edges, same as -inf padding.
            .pad_with_same(D::Minus1, 1, 1)?
            .pad_with_same(D::Minus2, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;

        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }

        let pooled = xs.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?.flatten_from(1)?;
        self.fc.forward(&pooled)
    }
}

fn load_head(src: &mut ParamSource, num_classes: usize) -> ClassifierResult<Linear> {
    let weight = src
        .required("fc.weight", &[num_classes, FEATURE_DIM])
        .map_err(head_error)?;
    let bias = src.required("fc.bias", &[num_classes]).map_err(head_error)?;
    Ok(Linear::new(weight, Some(bias)))
}

fn head_error(err: ClassifierError) -> ClassifierError {
    match err {
        ClassifierError::WeightsLoad { path, reason } => ClassifierError::WeightsLoad {
            path,
            reason: format!("incompatible final classification layer: {reason}"),
        },
        other => other,
    }
}

/// Every state-dict entry the network binds, in load order.
///
/// `num_batches_tracked` buffers are not listed; they are ignored on load.
#[must_use]
pub fn parameter_shapes(num_classes: usize) -> Vec<(String, Vec<usize>)> {
    fn push_conv(out: &mut Vec<(String, Vec<usize>)>, name: &str, shape: [usize; 4]) {
        out.push((format!("{name}.weight"), shape.to_vec()));
    }
    fn push_bn(out: &mut Vec<(String, Vec<usize>)>, name: &str, c: usize) {
        for suffix in ["weight", "bias", "running_mean", "running_var"] {
            out.push((format!("{name}.{suffix}"), vec![c]));
        }
    }

    let mut out = Vec::new();
    push_conv(&mut out, "conv1", [STEM_CHANNELS, 3, 7, 7]);
    push_bn(&mut out, "bn1", STEM_CHANNELS);

    let mut in_c = STEM_CHANNELS;
    for (stage, &(out_c, stride)) in STAGES.iter().enumerate() {
        for block in 0..BLOCKS_PER_STAGE {
            let prefix = format!("layer{}.{}", stage + 1, block);
            push_conv(&mut out, &format!("{prefix}.conv1"), [out_c, in_c, 3, 3]);
            push_bn(&mut out, &format!("{prefix}.bn1"), out_c);
            push_conv(&mut out, &format!("{prefix}.conv2"), [out_c, out_c, 3, 3]);
            push_bn(&mut out, &format!("{prefix}.bn2"), out_c);
            let block_stride = if block == 0 { stride } else { 1 };
            if block_stride != 1 || in_c != out_c {
                push_conv(&mut out, &format!("{prefix}.downsample.0"), [out_c, in_c, 1, 1]);
                push_bn(&mut out, &format!("{prefix}.downsample.1"), out_c);
            }
            in_c = out_c;
        }
    }

    out.push(("fc.weight".to_string(), vec![num_classes, FEATURE_DIM]));
    out.push(("fc.bias".to_string(), vec![num_classes]));
    out
}
