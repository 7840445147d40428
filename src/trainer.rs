//! Episode-driven training loop.
use crate::{
    checkpoint::CheckpointManager,
    dqn::Dqn,
    env::{Emulator, GameEnv},
    error::DqnError,
    model::QModel,
    record::{Record, RecordValue},
    replay::{ReplayBuffer, Transition},
};
use anyhow::Result;
use log::info;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Number of training episodes.
    pub n_episodes: usize,

    /// Step bound of a single episode.
    pub max_steps: usize,

    /// Number of random-policy transitions collected before training.
    pub warmup_steps: usize,

    /// Environment steps between optimization steps.
    pub opt_interval: usize,

    /// Episodes between checkpoints.
    pub save_period: usize,

    /// Episodes between progress reports.
    pub print_period: usize,

    /// Seed of the warm-up RNG.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            n_episodes: 100,
            max_steps: 2000,
            warmup_steps: 128,
            opt_interval: 1,
            save_period: 10,
            print_period: 10,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of episodes.
    pub fn n_episodes(mut self, v: usize) -> Self {
        self.n_episodes = v;
        self
    }

    /// Sets the per-episode step bound.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the warm-up length.
    pub fn warmup_steps(mut self, v: usize) -> Self {
        self.warmup_steps = v;
        self
    }

    /// Sets the optimization interval.
    pub fn opt_interval(mut self, v: usize) -> Self {
        self.opt_interval = v;
        self
    }

    /// Sets the checkpoint period.
    pub fn save_period(mut self, v: usize) -> Self {
        self.save_period = v;
        self
    }

    /// Sets the progress-report period.
    pub fn print_period(mut self, v: usize) -> Self {
        self.print_period = v;
        self
    }

    /// Sets the warm-up RNG seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`TrainerConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(DqnError::Config("max_steps must be positive".into()).into());
        }
        if self.opt_interval == 0 || self.save_period == 0 || self.print_period == 0 {
            return Err(DqnError::Config("intervals must be positive".into()).into());
        }
        Ok(())
    }
}

/// Logs the entries of a progress record in a stable order.
fn report(episode: usize, record: &Record) {
    let mut parts = record
        .iter()
        .map(|(k, v)| match v {
            RecordValue::Scalar(x) => format!("{} = {:.6}", k, x),
            RecordValue::String(s) => format!("{} = {}", k, s),
        })
        .collect::<Vec<_>>();
    parts.sort();
    info!("episode {}: {}", episode, parts.join(", "));
}

/// Runs the episode state machine over an environment, an agent and a
/// replay buffer.
///
/// An episode ends when the environment reports termination or the step
/// bound is hit; the bound is a training guard, it does not mark the final
/// transition as terminal. Failures of the environment or the agent abort
/// the run.
pub struct Trainer {
    config: TrainerConfig,
    rng: SmallRng,
}

impl Trainer {
    /// Builds the trainer, validating the configuration.
    pub fn build(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let rng = SmallRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    /// Collects transitions under a uniformly random policy until the
    /// buffer holds `warmup_steps` of them.
    fn warmup<E: Emulator>(
        &mut self,
        env: &mut GameEnv<E>,
        buffer: &mut ReplayBuffer,
    ) -> Result<()> {
        let target = self.config.warmup_steps.min(buffer.capacity());
        if buffer.len() >= target {
            return Ok(());
        }
        info!("Warming up the replay buffer to {} transitions", target);

        let mut obs = env.reset()?;
        while buffer.len() < target {
            let act = self.rng.gen_range(0..env.n_actions());
            let step = env.step(act)?;
            buffer.push(Transition {
                obs: obs.as_slice().to_vec(),
                act: act as i64,
                reward: step.reward,
                next_obs: step.obs.as_slice().to_vec(),
                is_done: step.is_done as i8,
            });
            obs = if step.is_done { env.reset()? } else { step.obs };
        }
        Ok(())
    }

    /// Runs the full training loop.
    ///
    /// Restores this run's checkpoint when one exists, warms up the buffer,
    /// then interleaves environment steps with optimization steps every
    /// `opt_interval` steps, checkpointing every `save_period` episodes and
    /// once more at the end.
    pub fn train<E, Q>(
        &mut self,
        env: &mut GameEnv<E>,
        agent: &mut Dqn<Q>,
        buffer: &mut ReplayBuffer,
        checkpoint: &CheckpointManager,
    ) -> Result<()>
    where
        E: Emulator,
        Q: QModel,
        Q::Config: Clone,
    {
        if agent.out_dim() != env.n_actions() {
            return Err(DqnError::Config(format!(
                "network outputs {} action values but the environment has {} actions",
                agent.out_dim(),
                env.n_actions()
            ))
            .into());
        }
        if checkpoint.restore(agent)? {
            info!("Resuming from {:?}", checkpoint.path());
        }
        self.warmup(env, buffer)?;
        agent.train();

        for episode in 1..=self.config.n_episodes {
            let mut obs = env.reset()?;
            let mut episode_return = 0f32;
            let mut loss_sum = 0f32;
            let mut n_losses = 0usize;

            for step in 1..=self.config.max_steps {
                let act = agent.sample(&obs)?;
                let s = env.step(act)?;
                buffer.push(Transition {
                    obs: obs.as_slice().to_vec(),
                    act: act as i64,
                    reward: s.reward,
                    next_obs: s.obs.as_slice().to_vec(),
                    is_done: s.is_done as i8,
                });
                episode_return += s.reward;
                obs = s.obs;

                if step % self.config.opt_interval == 0 {
                    let record = agent.opt(buffer)?;
                    if let Some(loss) = record.get_scalar("loss") {
                        loss_sum += loss;
                        n_losses += 1;
                    }
                }
                if s.is_done {
                    break;
                }
            }

            if episode % self.config.print_period == 0 {
                let mean_loss = loss_sum / n_losses.max(1) as f32;
                let mut record = Record::from_slice(&[
                    ("return", RecordValue::Scalar(episode_return)),
                    ("epsilon", RecordValue::Scalar(agent.epsilon() as f32)),
                    ("opt steps", RecordValue::Scalar(agent.n_opts() as f32)),
                ])
                .merge(Record::from_scalar("mean loss", mean_loss));
                record.insert("env", RecordValue::String(env.env_id().to_string()));
                report(episode, &record);
            }
            if episode % self.config.save_period == 0 {
                checkpoint.save(agent)?;
            }
        }

        checkpoint.save(agent)?;
        env.close();
        Ok(())
    }
}
