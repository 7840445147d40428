//! Deterministic stand-in emulator for tests and examples.
use crate::env::{Emulator, NativeAct, RawFrame};
use anyhow::Result;

/// A scripted emulator producing synthetic frames.
///
/// Frames are a pure function of the step counter, episodes end after a
/// fixed number of steps and rewards follow a short repeating script, so
/// every run over it is reproducible.
pub struct MockEmulator {
    width: u32,
    height: u32,
    episode_len: usize,
    t: usize,
}

impl MockEmulator {
    /// Creates an emulator rendering `width` x `height` frames whose
    /// episodes end after `episode_len` steps.
    pub fn new(width: u32, height: u32, episode_len: usize) -> Self {
        Self {
            width,
            height,
            episode_len,
            t: 0,
        }
    }

    fn frame(&self) -> RawFrame {
        let len = (self.width * self.height * 3) as usize;
        let data = (0..len)
            .map(|i| ((self.t * 31 + i * 7) % 256) as u8)
            .collect();
        RawFrame {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl Emulator for MockEmulator {
    type Info = ();

    fn reset(&mut self) -> Result<RawFrame> {
        self.t = 0;
        Ok(self.frame())
    }

    fn step(&mut self, _act: &NativeAct) -> Result<(RawFrame, f32, bool, Self::Info)> {
        self.t += 1;
        let reward = match self.t % 3 {
            0 => 1.0,
            1 => 0.0,
            _ => -0.5,
        };
        let is_done = self.t >= self.episode_len;
        Ok((self.frame(), reward, is_done, ()))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ActionMode, GameEnv, GameEnvConfig};

    #[test]
    fn episodes_terminate_at_fixed_length() {
        let emu = MockEmulator::new(32, 24, 5);
        let config = GameEnvConfig::default()
            .action_mode(ActionMode::PassThrough)
            .n_actions(3);
        let mut env = GameEnv::build(emu, &config).unwrap();

        env.reset().unwrap();
        for k in 1..=5 {
            let step = env.step(0).unwrap();
            assert_eq!(step.is_done, k == 5);
        }
    }

    #[test]
    fn frames_are_reproducible() {
        let mut a = MockEmulator::new(16, 16, 10);
        let mut b = MockEmulator::new(16, 16, 10);
        assert_eq!(a.reset().unwrap().data, b.reset().unwrap().data);
        let (fa, ra, _, _) = a.step(&NativeAct::Index(1)).unwrap();
        let (fb, rb, _, _) = b.step(&NativeAct::Index(2)).unwrap();
        assert_eq!(fa.data, fb.data);
        assert_eq!(ra, rb);
    }
}
