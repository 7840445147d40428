//! Q-network wrapper owning parameters and the optimizer.
use crate::{error::DqnError, opt::{Optimizer, OptimizerConfig}};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// A value network mapping a stacked observation batch to per-action
/// values.
///
/// Implementations do not own their variables; they are built over a
/// [`VarBuilder`] so that [`QNet`] can own the [`VarMap`] and hand the same
/// variables to the optimizer.
pub trait QModel {
    /// Configuration from which the network is constructed.
    type Config;

    /// Builds the network over the given variable builder.
    fn build(vb: VarBuilder, config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Computes per-action values for a batch of flat `u8` observations of
    /// shape `[batch, obs_len]`.
    fn forward(&self, obs: &Tensor) -> Result<Tensor>;

    /// Width of the output vector, equal to the number of actions.
    fn out_dim(&self) -> usize;
}

/// Configuration of [`QNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct QNetConfig<C> {
    pub(crate) q_config: Option<C>,
    pub(crate) opt_config: OptimizerConfig,
}

impl<C> Default for QNetConfig<C> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl<C> QNetConfig<C>
where
    C: DeserializeOwned + Serialize,
{
    /// Sets the network configuration.
    pub fn q_config(mut self, v: C) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`QNetConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`QNetConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A value network together with its variables and optimizer.
///
/// The online and target networks of the agent are two independent
/// [`QNet`] instances; their parameters never alias.
pub struct QNet<Q: QModel> {
    device: Device,
    varmap: VarMap,
    q: Q,
    opt: Optimizer,
}

impl<Q: QModel> QNet<Q>
where
    Q::Config: Clone,
{
    /// Builds the network and its optimizer on the given device.
    pub fn build(config: &QNetConfig<Q::Config>, device: Device) -> Result<Self> {
        let q_config = config
            .q_config
            .as_ref()
            .ok_or_else(|| DqnError::Config("q_config is not set".into()))?;
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, q_config)?
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            q,
            opt,
        })
    }

    /// Computes per-action values.
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        self.q.forward(&obs.to_device(&self.device)?)
    }

    /// Computes gradients of the loss and applies one optimization step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Width of the output vector.
    pub fn out_dim(&self) -> usize {
        self.q.out_dim()
    }

    /// Device the network lives on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Replaces this network's parameters wholesale with a copy of `src`'s.
    ///
    /// This is the hard-sync primitive: an explicit value copy, never an
    /// incremental blend and never an aliased handle.
    pub fn copy_from(&self, src: &QNet<Q>) -> Result<()> {
        let dest = self.varmap.data().lock().unwrap();
        let src = src.varmap.data().lock().unwrap();
        for (k, v) in dest.iter() {
            let s = src
                .get(k)
                .with_context(|| format!("variable {} missing in source network", k))?;
            v.set(&s.as_tensor().to_device(v.as_tensor().device())?)?;
        }
        Ok(())
    }

    /// Persists the parameters as a safetensors file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Saved Q-network parameters to {:?}", path.as_ref());
        Ok(())
    }

    /// Restores the parameters from a safetensors file.
    ///
    /// A stored shape that disagrees with the current architecture is
    /// surfaced as [`DqnError::CheckpointMismatch`], never coerced.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap
            .load(&path)
            .map_err(|e| DqnError::CheckpointMismatch(e.to_string()))?;
        info!("Loaded Q-network parameters from {:?}", path.as_ref());
        Ok(())
    }
}
