//! Observation preprocessing and temporal frame stacking.
use crate::error::DqnError;
use anyhow::Result;
use image::{
    imageops::{grayscale, resize, FilterType::Triangle},
    ImageBuffer, Luma, Rgb,
};
use std::collections::VecDeque;

/// Width and height of a preprocessed frame.
pub const FRAME_SIZE: usize = 84;

/// Number of intensity values in a preprocessed frame.
pub const FRAME_LEN: usize = FRAME_SIZE * FRAME_SIZE;

/// Converts a raw RGB frame into an 84x84 single-channel intensity frame.
///
/// The frame is resized first, then converted to luma, matching the
/// preprocessing of the DQN Atari pipeline. Intensities are kept as `u8`;
/// scaling to `[0, 1]` happens inside the Q-networks.
pub fn preprocess(width: u32, height: u32, rgb: Vec<u8>) -> Result<Vec<u8>> {
    if rgb.len() != (width * height * 3) as usize {
        return Err(DqnError::Environment(format!(
            "malformed frame: expected {} bytes for {}x{} RGB, got {}",
            width * height * 3,
            width,
            height,
            rgb.len()
        ))
        .into());
    }

    let img = ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, rgb)
        .ok_or_else(|| DqnError::Environment("frame buffer rejected by decoder".into()))?;
    let img = resize(&img, FRAME_SIZE as u32, FRAME_SIZE as u32, Triangle);
    let img: ImageBuffer<Luma<u8>, _> = grayscale(&img);
    Ok(img.to_vec())
}

/// A fixed-depth stack of the most recent preprocessed frames.
///
/// The stack is the unit of observation fed to the Q-networks: depth
/// `n_stack`, oldest frame first. Content is reset at every episode start
/// while the object itself lives for the whole run.
#[derive(Debug, Clone)]
pub struct StackedObs {
    frames: Vec<u8>,
    n_stack: usize,
}

impl StackedObs {
    /// Flat intensity data, `n_stack * frame_len` bytes, oldest frame first.
    pub fn as_slice(&self) -> &[u8] {
        &self.frames
    }

    /// Consumes the observation, returning the flat intensity data.
    pub fn into_vec(self) -> Vec<u8> {
        self.frames
    }

    /// Number of frames in the stack.
    pub fn n_stack(&self) -> usize {
        self.n_stack
    }

    /// Length of a single frame.
    pub fn frame_len(&self) -> usize {
        self.frames.len() / self.n_stack
    }
}

/// Maintains the temporal window of preprocessed frames.
#[derive(Debug)]
pub struct FrameStack {
    frames: VecDeque<Vec<u8>>,
    n_stack: usize,
}

impl FrameStack {
    /// Constructs an empty stack of the given depth.
    pub fn new(n_stack: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(n_stack),
            n_stack,
        }
    }

    /// Clears the window and fills every slot with `frame`.
    pub fn reset(&mut self, frame: Vec<u8>) -> StackedObs {
        self.frames.clear();
        for _ in 0..self.n_stack {
            self.frames.push_back(frame.clone());
        }
        self.stacked()
    }

    /// Evicts the oldest slot and appends `frame`.
    ///
    /// On an empty window this behaves as [`FrameStack::reset`]. The
    /// returned depth is always exactly `n_stack`.
    pub fn push(&mut self, frame: Vec<u8>) -> StackedObs {
        if self.frames.is_empty() {
            return self.reset(frame);
        }
        self.frames.pop_front();
        self.frames.push_back(frame);
        self.stacked()
    }

    fn stacked(&self) -> StackedObs {
        let mut frames = Vec::with_capacity(self.n_stack * self.frames[0].len());
        for f in self.frames.iter() {
            frames.extend_from_slice(f);
        }
        StackedObs {
            frames,
            n_stack: self.n_stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_replicates_frame() {
        let mut stack = FrameStack::new(4);
        let obs = stack.reset(vec![7, 7]);
        assert_eq!(obs.n_stack(), 4);
        assert_eq!(obs.as_slice(), &[7, 7, 7, 7, 7, 7, 7, 7]);
    }

    #[test]
    fn push_evicts_oldest_only() {
        let mut stack = FrameStack::new(3);
        stack.reset(vec![1]);
        let obs = stack.push(vec![2]);
        assert_eq!(obs.as_slice(), &[1, 1, 2]);
        let obs = stack.push(vec![3]);
        assert_eq!(obs.as_slice(), &[1, 2, 3]);
        assert_eq!(obs.n_stack(), 3);
    }

    #[test]
    fn push_on_empty_behaves_as_reset() {
        let mut stack = FrameStack::new(4);
        let obs = stack.push(vec![9]);
        assert_eq!(obs.as_slice(), &[9, 9, 9, 9]);
    }

    #[test]
    fn preprocess_rejects_malformed_frame() {
        assert!(preprocess(10, 10, vec![0u8; 42]).is_err());
    }

    #[test]
    fn preprocess_outputs_84x84_luma() {
        let (w, h) = (160, 120);
        let rgb = vec![128u8; (w * h * 3) as usize];
        let frame = preprocess(w, h, rgb).unwrap();
        assert_eq!(frame.len(), FRAME_LEN);
    }
}
