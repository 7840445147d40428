//! Fully-connected Q-network for small or flat observations.
use crate::model::QModel;
use anyhow::Result;
use candle_core::{DType::F32, Tensor};
use candle_nn::{
    linear,
    sequential::{seq, Sequential},
    Module, VarBuilder,
};
use serde::{Deserialize, Serialize};

/// Configuration of [`Mlp`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MlpConfig {
    /// Flat input width.
    pub in_dim: usize,

    /// Hidden layer widths.
    pub units: Vec<usize>,

    /// Number of actions, the output width.
    pub out_dim: usize,
}

impl MlpConfig {
    /// Constructs the configuration.
    pub fn new(in_dim: usize, units: Vec<usize>, out_dim: usize) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
        }
    }
}

/// Multilayer perceptron value network with ReLU activations.
pub struct Mlp {
    out_dim: usize,
    seq: Sequential,
}

impl QModel for Mlp {
    type Config = MlpConfig;

    fn build(vb: VarBuilder, config: &Self::Config) -> Result<Self> {
        let mut seq = seq().add_fn(|xs| xs.to_dtype(F32)? / 255.0);
        let mut in_dim = config.in_dim;
        for (i, &units) in config.units.iter().enumerate() {
            seq = seq
                .add(linear(in_dim, units, vb.pp(format!("l{}", i)))?)
                .add_fn(|xs| xs.relu());
            in_dim = units;
        }
        let seq = seq.add(linear(
            in_dim,
            config.out_dim,
            vb.pp(format!("l{}", config.units.len())),
        )?);

        Ok(Self {
            out_dim: config.out_dim,
            seq,
        })
    }

    fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        Ok(self.seq.forward(obs)?)
    }

    fn out_dim(&self) -> usize {
        self.out_dim
    }
}
