//! Deep Q-learning training engine for an emulator-hosted fighting game.
//!
//! The crate wires a native game environment into a DQN agent: raw RGB
//! frames are resized to 84x84 grayscale and stacked into a temporal window
//! ([`obs`]), discrete actions are translated to controller vectors
//! ([`env`]), transitions feed a ring replay buffer ([`replay`]) and an
//! online/target network pair is optimized over sampled batches ([`dqn`]),
//! driven by an episode loop with periodic checkpointing ([`trainer`],
//! [`checkpoint`]).
pub mod checkpoint;
pub mod cnn;
pub mod dqn;
pub mod env;
pub mod error;
pub mod explorer;
pub mod mlp;
pub mod mock;
pub mod model;
pub mod obs;
pub mod opt;
pub mod record;
pub mod replay;
pub mod trainer;

pub use checkpoint::CheckpointManager;
pub use cnn::{Cnn, CnnConfig};
pub use dqn::{CriticLoss, Dqn, DqnConfig};
pub use env::{ActionMode, Emulator, GameEnv, GameEnvConfig};
pub use error::DqnError;
pub use explorer::EpsilonGreedy;
pub use mlp::{Mlp, MlpConfig};
pub use model::{QModel, QNet, QNetConfig};
pub use obs::{FrameStack, StackedObs, FRAME_LEN, FRAME_SIZE};
pub use record::{Record, RecordValue};
pub use replay::{ReplayBuffer, ReplayBufferConfig, Transition};
pub use trainer::{Trainer, TrainerConfig};

use serde::{Deserialize, Serialize};

/// Compute device on which the Q-networks run.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub enum Device {
    /// The CPU.
    Cpu,

    /// The n-th CUDA device.
    Cuda(usize),
}

impl From<Device> for candle_core::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => candle_core::Device::Cpu,
            Device::Cuda(n) => {
                candle_core::Device::new_cuda(n).expect("No CUDA device available")
            }
        }
    }
}
