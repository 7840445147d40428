//! Environment adapter around the native emulator.
use crate::{
    error::DqnError,
    obs::{preprocess, FrameStack, StackedObs},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Positive extreme of an analog axis.
///
/// The native controller accepts an asymmetric range; these values must not
/// be rounded to a symmetric one.
pub const AXIS_POS: i32 = 127;

/// Negative extreme of an analog axis.
pub const AXIS_NEG: i32 = -128;

/// Number of slots in the native controller vector: two axes plus six
/// buttons.
pub const PAD_SLOTS: usize = 8;

/// Largest discrete action space the pad mapping table can express.
pub const MAX_PAD_ACTIONS: usize = 15;

/// A raw RGB24 frame rendered by the emulator.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

/// Action representation accepted by the native environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeAct {
    /// Controller vector: `[axis_x, axis_y, b0, .., b5]`.
    Pad([i32; PAD_SLOTS]),

    /// Discrete action index, forwarded unchanged.
    Index(i64),
}

/// Maps a discrete action index to a controller vector.
///
/// This is a pure function of the index; the table is fixed:
/// 0 is a no-op, 1..=8 are the axis extremes and their four diagonal
/// combinations, and every index from 9 on presses exactly one button.
pub fn map_pad(index: usize) -> [i32; PAD_SLOTS] {
    let mut pad = [0i32; PAD_SLOTS];
    match index {
        0 => {}
        1 => pad[0] = AXIS_POS,
        2 => pad[0] = AXIS_NEG,
        3 => pad[1] = AXIS_POS,
        4 => pad[1] = AXIS_NEG,
        5 => {
            pad[0] = AXIS_POS;
            pad[1] = AXIS_POS;
        }
        6 => {
            pad[0] = AXIS_POS;
            pad[1] = AXIS_NEG;
        }
        7 => {
            pad[0] = AXIS_NEG;
            pad[1] = AXIS_POS;
        }
        8 => {
            pad[0] = AXIS_NEG;
            pad[1] = AXIS_NEG;
        }
        i => pad[i - 7] = 1,
    }
    pad
}

/// How discrete action indices are converted for the native environment.
///
/// The variant is chosen once at construction and never re-evaluated per
/// step.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum ActionMode {
    /// Translate indices through the fixed controller table.
    Pad,

    /// Forward indices unchanged.
    PassThrough,
}

/// Interface to the native game environment.
///
/// Implementations wrap an emulator process or library; the training engine
/// treats them as a black box. Failures are fatal: a corrupted game state is
/// not resumed.
pub trait Emulator {
    /// Additional step information defined by the implementation.
    type Info;

    /// Restarts the game and renders the initial frame.
    fn reset(&mut self) -> Result<RawFrame>;

    /// Applies an action for one frame.
    fn step(&mut self, act: &NativeAct) -> Result<(RawFrame, f32, bool, Self::Info)>;

    /// Releases the native environment.
    fn close(&mut self);
}

/// Configuration of [`GameEnv`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct GameEnvConfig {
    /// Identifier of the native environment, recorded for checkpoints and
    /// logs.
    pub env_id: String,

    /// Action translation variant.
    pub action_mode: ActionMode,

    /// Size of the discrete action space.
    pub n_actions: usize,

    /// Depth of the frame stack.
    pub n_stack: usize,
}

impl Default for GameEnvConfig {
    fn default() -> Self {
        Self {
            env_id: "Smash-dk-v0".to_string(),
            action_mode: ActionMode::Pad,
            n_actions: MAX_PAD_ACTIONS,
            n_stack: 4,
        }
    }
}

impl GameEnvConfig {
    /// Sets the environment identifier.
    pub fn env_id(mut self, v: impl Into<String>) -> Self {
        self.env_id = v.into();
        self
    }

    /// Sets the action translation variant.
    pub fn action_mode(mut self, v: ActionMode) -> Self {
        self.action_mode = v;
        self
    }

    /// Sets the size of the action space.
    pub fn n_actions(mut self, v: usize) -> Self {
        self.n_actions = v;
        self
    }

    /// Sets the depth of the frame stack.
    pub fn n_stack(mut self, v: usize) -> Self {
        self.n_stack = v;
        self
    }

    /// Constructs [`GameEnvConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GameEnvConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.env_id.is_empty() {
            return Err(DqnError::Config("environment id is empty".into()).into());
        }
        if self.n_actions == 0 {
            return Err(DqnError::Config("action space is empty".into()).into());
        }
        if self.n_stack == 0 {
            return Err(DqnError::Config("frame stack depth must be positive".into()).into());
        }
        if self.action_mode == ActionMode::Pad && self.n_actions > MAX_PAD_ACTIONS {
            return Err(DqnError::Config(format!(
                "action space of size {} exceeds the {} entries of the pad mapping table",
                self.n_actions, MAX_PAD_ACTIONS
            ))
            .into());
        }
        Ok(())
    }
}

/// Result of one adapter step.
#[derive(Debug)]
pub struct EnvStep<I> {
    /// Stacked observation after the step.
    pub obs: StackedObs,

    /// Immediate reward.
    pub reward: f32,

    /// True if the episode terminated on this step.
    pub is_done: bool,

    /// Information forwarded from the native environment.
    pub info: I,
}

/// Wraps the native emulator with preprocessing and frame stacking.
pub struct GameEnv<E: Emulator> {
    emu: E,
    env_id: String,
    frames: FrameStack,
    action_mode: ActionMode,
    n_actions: usize,
}

impl<E: Emulator> GameEnv<E> {
    /// Builds the adapter, validating the configuration.
    pub fn build(emu: E, config: &GameEnvConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            emu,
            env_id: config.env_id.clone(),
            frames: FrameStack::new(config.n_stack),
            action_mode: config.action_mode,
            n_actions: config.n_actions,
        })
    }

    /// Identifier of the wrapped environment.
    pub fn env_id(&self) -> &str {
        &self.env_id
    }

    /// Size of the discrete action space.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Restarts the episode and returns the initial stacked observation.
    pub fn reset(&mut self) -> Result<StackedObs> {
        let raw = self.emu.reset()?;
        let frame = preprocess(raw.width, raw.height, raw.data)?;
        Ok(self.frames.reset(frame))
    }

    /// Executes a discrete action and returns the resulting step.
    ///
    /// An index outside the configured action space is a configuration
    /// error, not a panic.
    pub fn step(&mut self, action: usize) -> Result<EnvStep<E::Info>> {
        if action >= self.n_actions {
            return Err(DqnError::Config(format!(
                "action index {} out of range for {} actions",
                action, self.n_actions
            ))
            .into());
        }
        let act = match self.action_mode {
            ActionMode::Pad => NativeAct::Pad(map_pad(action)),
            ActionMode::PassThrough => NativeAct::Index(action as i64),
        };
        let (raw, reward, is_done, info) = self.emu.step(&act)?;
        let frame = preprocess(raw.width, raw.height, raw.data)?;
        let obs = self.frames.push(frame);
        Ok(EnvStep {
            obs,
            reward,
            is_done,
            info,
        })
    }

    /// Releases the native environment.
    pub fn close(&mut self) {
        self.emu.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_mapping_is_pure() {
        for i in 0..MAX_PAD_ACTIONS {
            let a = map_pad(i);
            let b = map_pad(i);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn no_op_is_all_neutral() {
        assert_eq!(map_pad(0), [0; PAD_SLOTS]);
    }

    #[test]
    fn axis_extremes_are_asymmetric() {
        assert_eq!(map_pad(1), [127, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(map_pad(2), [-128, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(map_pad(3), [0, 127, 0, 0, 0, 0, 0, 0]);
        assert_eq!(map_pad(4), [0, -128, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn diagonal_five_is_both_axes_positive() {
        let pad = map_pad(5);
        assert_eq!(pad[0], AXIS_POS);
        assert_eq!(pad[1], AXIS_POS);
        assert!(pad[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn high_indices_press_one_button() {
        for i in 9..MAX_PAD_ACTIONS {
            let pad = map_pad(i);
            assert_eq!(pad[i - 7], 1);
            assert_eq!(pad.iter().filter(|&&v| v != 0).count(), 1);
        }
    }

    #[test]
    fn step_rejects_out_of_range_action_index() {
        let mut env = GameEnv::build(
            crate::mock::MockEmulator::new(16, 16, 8),
            &GameEnvConfig::default(),
        )
        .unwrap();
        env.reset().unwrap();
        assert!(env.step(MAX_PAD_ACTIONS - 1).is_ok());
        assert!(env.step(MAX_PAD_ACTIONS).is_err());
    }

    #[test]
    fn pad_mode_rejects_oversized_action_space() {
        let config = GameEnvConfig::default().n_actions(16);
        assert!(config.validate().is_err());
        let config = GameEnvConfig::default()
            .action_mode(ActionMode::PassThrough)
            .n_actions(16);
        assert!(config.validate().is_ok());
    }
}
