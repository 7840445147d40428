//! Checkpointing of Q-network parameters by run id.
use crate::{dqn::Dqn, model::QModel};
use anyhow::Result;
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Saves and restores agent parameters under a model directory.
///
/// One run id maps to one safetensors file; starting a run with an id that
/// has a checkpoint resumes from it, otherwise training starts fresh.
pub struct CheckpointManager {
    dir: PathBuf,
    run_id: String,
}

impl CheckpointManager {
    /// Creates a manager for the given directory and run id.
    pub fn new(dir: impl AsRef<Path>, run_id: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            run_id: run_id.into(),
        }
    }

    /// Path of the checkpoint file for this run.
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("qnet_{}.safetensors", self.run_id))
    }

    /// Persists the agent's online-network parameters, creating the model
    /// directory if needed.
    pub fn save<Q: QModel>(&self, agent: &Dqn<Q>) -> Result<()>
    where
        Q::Config: Clone,
    {
        fs::create_dir_all(&self.dir)?;
        agent.save_params(self.path())
    }

    /// Restores the agent from this run's checkpoint if one exists.
    ///
    /// Returns whether a checkpoint was found. When none exists the agent's
    /// freshly initialized parameters are left untouched; this is the normal
    /// first-run path, not an error. Restoring re-syncs the target network.
    pub fn restore<Q: QModel>(&self, agent: &mut Dqn<Q>) -> Result<bool>
    where
        Q::Config: Clone,
    {
        let path = self.path();
        if !path.exists() {
            info!("No checkpoint at {:?}, starting fresh", path);
            return Ok(false);
        }
        agent.load_params(path)?;
        Ok(true)
    }
}
