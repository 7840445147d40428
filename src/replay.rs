//! Experience replay buffer.
//!
//! The buffer is an explicit fixed-capacity ring: a preallocated store, a
//! write cursor advancing modulo capacity and a length counter capped at
//! capacity. Sampling is uniform with replacement over the current contents.
use crate::error::DqnError;
use anyhow::Result;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// One `(state, action, reward, next_state, done)` record of a single
/// environment interaction. Immutable once created.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Stacked observation before the action, flat intensity bytes.
    pub obs: Vec<u8>,

    /// Discrete action index.
    pub act: i64,

    /// Immediate reward.
    pub reward: f32,

    /// Stacked observation after the action.
    pub next_obs: Vec<u8>,

    /// 1 if the episode ended on this transition.
    pub is_done: i8,
}

/// Preallocated flat storage for fixed-length observations.
///
/// The store is allocated lazily on the first push, when the observation
/// length becomes known.
#[derive(Debug)]
struct FrameStore {
    buf: Vec<u8>,
    item_len: usize,
    capacity: usize,
}

impl FrameStore {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            item_len: 0,
            capacity,
        }
    }

    fn push(&mut self, ix: usize, item: &[u8]) {
        if self.buf.is_empty() {
            self.item_len = item.len();
            self.buf = vec![0; self.capacity * self.item_len];
        }
        debug_assert_eq!(item.len(), self.item_len);
        let at = ix * self.item_len;
        self.buf[at..at + self.item_len].copy_from_slice(item);
    }

    fn sample(&self, ixs: &[usize]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ixs.len() * self.item_len);
        for &ix in ixs {
            let at = ix * self.item_len;
            out.extend_from_slice(&self.buf[at..at + self.item_len]);
        }
        out
    }
}

/// A batch of transitions sampled for one optimization step.
#[derive(Debug)]
pub struct TransitionBatch {
    /// Observations, `len * obs_len` bytes.
    pub obs: Vec<u8>,

    /// Action indices.
    pub act: Vec<i64>,

    /// Next observations, `len * obs_len` bytes.
    pub next_obs: Vec<u8>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags.
    pub is_done: Vec<i8>,

    /// Length of a single flat observation.
    pub obs_len: usize,
}

impl TransitionBatch {
    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }
}

/// Configuration of [`ReplayBuffer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Maximum number of stored transitions; the oldest is evicted when
    /// full.
    pub capacity: usize,

    /// Seed of the sampling RNG.
    pub seed: u64,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            seed: 42,
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, v: usize) -> Self {
        self.capacity = v;
        self
    }

    /// Sets the sampling seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`ReplayBufferConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ReplayBufferConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Bounded FIFO collection of transitions with uniform random sampling.
pub struct ReplayBuffer {
    capacity: usize,

    /// Write cursor, advances modulo capacity.
    i: usize,

    /// Number of stored transitions, capped at capacity.
    size: usize,

    obs: FrameStore,
    act: Vec<i64>,
    next_obs: FrameStore,
    reward: Vec<f32>,
    is_done: Vec<i8>,
    rng: StdRng,
}

impl ReplayBuffer {
    /// Builds an empty buffer from the configuration.
    pub fn build(config: &ReplayBufferConfig) -> Self {
        let capacity = config.capacity;
        Self {
            capacity,
            i: 0,
            size: 0,
            obs: FrameStore::new(capacity),
            act: vec![0; capacity],
            next_obs: FrameStore::new(capacity),
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Appends a transition, evicting the oldest when at capacity.
    pub fn push(&mut self, tr: Transition) {
        self.obs.push(self.i, &tr.obs);
        self.act[self.i] = tr.act;
        self.next_obs.push(self.i, &tr.next_obs);
        self.reward[self.i] = tr.reward;
        self.is_done[self.i] = tr.is_done;

        self.i = (self.i + 1) % self.capacity;
        self.size += 1;
        if self.size >= self.capacity {
            self.size = self.capacity;
        }
    }

    /// Samples `size` transitions uniformly at random, with replacement.
    ///
    /// Fails fast on an empty buffer rather than returning degenerate data.
    pub fn batch(&mut self, size: usize) -> Result<TransitionBatch> {
        if self.size == 0 {
            return Err(DqnError::EmptyBuffer.into());
        }

        let ixs = (0..size)
            .map(|_| (self.rng.next_u32() as usize) % self.size)
            .collect::<Vec<_>>();

        Ok(TransitionBatch {
            obs: self.obs.sample(&ixs),
            act: ixs.iter().map(|&ix| self.act[ix]).collect(),
            next_obs: self.next_obs.sample(&ixs),
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            is_done: ixs.iter().map(|&ix| self.is_done[ix]).collect(),
            obs_len: self.obs.item_len,
        })
    }

    /// Current number of stored transitions.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Maximum number of stored transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if no transition has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(marker: f32) -> Transition {
        Transition {
            obs: vec![marker as u8; 4],
            act: marker as i64,
            reward: marker,
            next_obs: vec![marker as u8; 4],
            is_done: 0,
        }
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let config = ReplayBufferConfig::default().capacity(5);
        let mut buffer = ReplayBuffer::build(&config);
        for k in 0..23 {
            buffer.push(tr(k as f32));
            assert!(buffer.len() <= 5);
        }
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn holds_exactly_the_most_recent_transitions() {
        // T1..T7 into capacity 5: only T3..T7 may ever be sampled.
        let config = ReplayBufferConfig::default().capacity(5);
        let mut buffer = ReplayBuffer::build(&config);
        for k in 1..=7 {
            buffer.push(tr(k as f32));
        }
        let batch = buffer.batch(200).unwrap();
        assert_eq!(batch.len(), 200);
        for r in batch.reward {
            assert!(r >= 3.0 && r <= 7.0);
        }
    }

    #[test]
    fn batch_on_empty_buffer_fails() {
        let config = ReplayBufferConfig::default().capacity(5);
        let mut buffer = ReplayBuffer::build(&config);
        assert!(buffer.batch(1).is_err());
    }

    #[test]
    fn batch_fields_stay_aligned() {
        let config = ReplayBufferConfig::default().capacity(8);
        let mut buffer = ReplayBuffer::build(&config);
        for k in 0..8 {
            buffer.push(tr(k as f32));
        }
        let batch = buffer.batch(32).unwrap();
        assert_eq!(batch.obs_len, 4);
        for (j, &r) in batch.reward.iter().enumerate() {
            assert_eq!(batch.act[j], r as i64);
            assert_eq!(batch.obs[j * 4], r as u8);
        }
    }
}
