//! Convolutional Q-network over stacked 84x84 frames.
use crate::{model::QModel, obs::FRAME_SIZE};
use anyhow::Result;
use candle_core::{DType::F32, Tensor};
use candle_nn::{
    conv::Conv2dConfig,
    conv2d, linear,
    sequential::{seq, Sequential},
    Module, VarBuilder,
};
use serde::{Deserialize, Serialize};

/// Configuration of [`Cnn`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CnnConfig {
    /// Number of stacked frames, the input channel count.
    pub n_stack: usize,

    /// Number of actions, the output width.
    pub out_dim: usize,
}

impl CnnConfig {
    /// Constructs the configuration.
    pub fn new(n_stack: usize, out_dim: usize) -> Self {
        Self { n_stack, out_dim }
    }
}

/// Convolutional value network.
///
/// Three strided convolutions halve the 84x84 input down to 11x11 feature
/// maps, followed by two linear layers:
/// conv(n_stack, 32, k7 s2 p3) -> conv(32, 64, k3 s2 p1) ->
/// conv(64, 128, k3 s2 p1) -> linear(128*11*11, 1000) -> linear(1000,
/// out_dim), ReLU throughout.
pub struct Cnn {
    n_stack: usize,
    out_dim: usize,
    seq: Sequential,
}

impl Cnn {
    fn conv_cfg(stride: usize, padding: usize) -> Conv2dConfig {
        Conv2dConfig {
            stride,
            padding,
            ..Default::default()
        }
    }

    fn create_net(vb: &VarBuilder, n_stack: usize, out_dim: usize) -> Result<Sequential> {
        let seq = seq()
            .add_fn(|xs| xs.to_dtype(F32)? / 255.0)
            .add(conv2d(n_stack, 32, 7, Self::conv_cfg(2, 3), vb.pp("c1"))?)
            .add_fn(|xs| xs.relu())
            .add(conv2d(32, 64, 3, Self::conv_cfg(2, 1), vb.pp("c2"))?)
            .add_fn(|xs| xs.relu())
            .add(conv2d(64, 128, 3, Self::conv_cfg(2, 1), vb.pp("c3"))?)
            .add_fn(|xs| xs.relu()?.flatten_from(1))
            .add(linear(128 * 11 * 11, 1000, vb.pp("l1"))?)
            .add_fn(|xs| xs.relu())
            .add(linear(1000, out_dim, vb.pp("l2"))?);

        Ok(seq)
    }
}

impl QModel for Cnn {
    type Config = CnnConfig;

    fn build(vb: VarBuilder, config: &Self::Config) -> Result<Self> {
        let seq = Self::create_net(&vb, config.n_stack, config.out_dim)?;
        Ok(Self {
            n_stack: config.n_stack,
            out_dim: config.out_dim,
            seq,
        })
    }

    fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        let batch_size = obs.dims()[0];
        let x = obs.reshape((batch_size, self.n_stack, FRAME_SIZE, FRAME_SIZE))?;
        Ok(self.seq.forward(&x)?)
    }

    fn out_dim(&self) -> usize {
        self.out_dim
    }
}
