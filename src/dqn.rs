//! DQN agent: epsilon-greedy policy plus the TD update engine.
use crate::{
    explorer::{stable_argmax, EpsilonGreedy},
    model::{QModel, QNet, QNetConfig},
    obs::StackedObs,
    record::{Record, RecordValue::Scalar},
    replay::ReplayBuffer,
    Device,
};
use anyhow::Result;
use candle_core::{shape::D, DType, Tensor};
use candle_nn::loss::mse;
use rand::{rngs::SmallRng, SeedableRng};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Loss applied between predicted and target action values.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let device = x.device();
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?.to_device(device)?;
    let m2 = Tensor::try_from(1f32)?.to_device(device)?.broadcast_sub(&m1)?;
    (((0.5 * m1)? * d.powf(2.0))? + m2 * (d - 0.5))?.mean_all()
}

/// Bootstrapped TD targets for one batch.
///
/// `reward + gamma * max_a' Q_tgt(s', a')`, with the continuation term
/// masked to zero on terminal transitions: a terminal transition contributes
/// exactly its immediate reward. The target-network values arrive here as
/// plain floats, so no gradient ever flows back through them.
pub fn td_targets(gamma: f32, reward: &[f32], next_q_max: &[f32], is_done: &[i8]) -> Vec<f32> {
    reward
        .iter()
        .zip(next_q_max.iter())
        .zip(is_done.iter())
        .map(|((&r, &q), &d)| if d != 0 { r } else { r + gamma * q })
        .collect()
}

/// Configuration of [`Dqn`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnConfig<C> {
    /// Configuration of the two Q-networks.
    pub model_config: QNetConfig<C>,

    /// Number of transitions per optimization step.
    pub batch_size: usize,

    /// Discount factor gamma.
    pub discount_factor: f32,

    /// Hard-sync interval of the target network, in optimization steps.
    pub sync_interval: usize,

    /// Exploration schedule.
    pub explorer: EpsilonGreedy,

    /// Loss between predictions and targets.
    pub critic_loss: CriticLoss,

    /// Compute device; CPU when not set.
    pub device: Option<Device>,

    /// Seed of the exploration RNG.
    pub seed: u64,
}

impl<C> Default for DqnConfig<C> {
    fn default() -> Self {
        Self {
            model_config: QNetConfig::default(),
            batch_size: 128,
            discount_factor: 0.99,
            sync_interval: 50,
            explorer: EpsilonGreedy::default(),
            critic_loss: CriticLoss::Mse,
            device: None,
            seed: 42,
        }
    }
}

impl<C> DqnConfig<C>
where
    C: DeserializeOwned + Serialize,
{
    /// Sets the Q-network configuration.
    pub fn model_config(mut self, v: QNetConfig<C>) -> Self {
        self.model_config = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f32) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the target-network sync interval.
    pub fn sync_interval(mut self, v: usize) -> Self {
        self.sync_interval = v;
        self
    }

    /// Sets the exploration schedule.
    pub fn explorer(mut self, v: EpsilonGreedy) -> Self {
        self.explorer = v;
        self
    }

    /// Sets the critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the compute device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Sets the exploration RNG seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`DqnConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// DQN agent over an online/target network pair.
///
/// The online network is the only one touched by gradient descent; the
/// target network is an independent copy replaced wholesale every
/// `sync_interval` optimization steps and immutable in between. The agent
/// owns the global optimization-step counter that drives both the sync
/// cadence and the epsilon schedule.
pub struct Dqn<Q: QModel> {
    qnet: QNet<Q>,
    qnet_tgt: QNet<Q>,
    batch_size: usize,
    discount_factor: f32,
    sync_interval: usize,
    explorer: EpsilonGreedy,
    critic_loss: CriticLoss,
    n_opts: usize,
    train: bool,
    rng: SmallRng,
}

impl<Q: QModel> Dqn<Q>
where
    Q::Config: Clone,
{
    /// Builds the agent; the target network starts as a copy of the online
    /// network.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        let device: candle_core::Device = config.device.unwrap_or(Device::Cpu).into();
        let qnet = QNet::build(&config.model_config, device.clone())?;
        let qnet_tgt = QNet::build(&config.model_config, device)?;
        qnet_tgt.copy_from(&qnet)?;

        Ok(Self {
            qnet,
            qnet_tgt,
            batch_size: config.batch_size,
            discount_factor: config.discount_factor,
            sync_interval: config.sync_interval,
            explorer: config.explorer,
            critic_loss: config.critic_loss,
            n_opts: 0,
            train: true,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// Sets the agent to training mode.
    pub fn train(&mut self) {
        self.train = true;
    }

    /// Sets the agent to evaluation mode: pure greedy action selection.
    pub fn eval(&mut self) {
        self.train = false;
    }

    /// Number of optimization steps taken so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Width of the networks' output, the size of the action space the
    /// agent was built for.
    pub fn out_dim(&self) -> usize {
        self.qnet.out_dim()
    }

    /// Current exploration probability.
    pub fn epsilon(&self) -> f64 {
        self.explorer.epsilon(self.n_opts)
    }

    fn obs_tensor(&self, obs: &StackedObs) -> Result<Tensor> {
        let data = obs.as_slice();
        Ok(Tensor::from_slice(
            data,
            (1, data.len()),
            self.qnet.device(),
        )?)
    }

    /// Online-network action values for a single observation.
    pub fn q_values(&self, obs: &StackedObs) -> Result<Vec<f32>> {
        let q = self.qnet.forward(&self.obs_tensor(obs)?)?;
        Ok(q.squeeze(0)?.to_vec1()?)
    }

    /// Target-network action values for a single observation.
    pub fn target_q_values(&self, obs: &StackedObs) -> Result<Vec<f32>> {
        let q = self.qnet_tgt.forward(&self.obs_tensor(obs)?)?;
        Ok(q.squeeze(0)?.to_vec1()?)
    }

    /// Chooses an action for the observation.
    ///
    /// In training mode this is epsilon-greedy under the decaying schedule;
    /// in evaluation mode it is the greedy action. The network is only
    /// evaluated for inference here, no gradients are recorded.
    pub fn sample(&mut self, obs: &StackedObs) -> Result<usize> {
        let q = self.q_values(obs)?;
        if self.train {
            Ok(self.explorer.action(&q, self.n_opts, &mut self.rng))
        } else {
            Ok(stable_argmax(&q))
        }
    }

    /// Performs exactly one optimization step on the online network.
    ///
    /// Samples a batch, computes the TD loss, applies one gradient step,
    /// hard-syncs the target network every `sync_interval` steps and
    /// advances the step counter.
    pub fn opt(&mut self, buffer: &mut ReplayBuffer) -> Result<Record> {
        let batch = buffer.batch(self.batch_size)?;
        let n = batch.len();
        let device = self.qnet.device().clone();

        let obs = Tensor::from_vec(batch.obs, (n, batch.obs_len), &device)?;
        let next_obs = Tensor::from_vec(batch.next_obs, (n, batch.obs_len), &device)?;
        let act = Tensor::from_vec(batch.act, (n, 1), &device)?;

        let pred = self
            .qnet
            .forward(&obs)?
            .gather(&act, D::Minus1)?
            .squeeze(D::Minus1)?;

        let next_q_max = self
            .qnet_tgt
            .forward(&next_obs)?
            .max(D::Minus1)?
            .to_vec1::<f32>()?;
        let targets = td_targets(
            self.discount_factor,
            &batch.reward,
            &next_q_max,
            &batch.is_done,
        );
        let tgt = Tensor::from_slice(&targets[..], (n,), &device)?;

        let loss = match self.critic_loss {
            CriticLoss::Mse => mse(&pred, &tgt)?,
            CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt)?,
        };
        self.qnet.backward_step(&loss)?;

        self.n_opts += 1;
        if self.n_opts % self.sync_interval == 0 {
            self.sync_target()?;
        }

        Ok(Record::from_slice(&[(
            "loss",
            Scalar(loss.to_scalar::<f32>()?),
        )]))
    }

    /// Replaces the target network's parameters with a fresh copy of the
    /// online network's.
    pub fn sync_target(&self) -> Result<()> {
        self.qnet_tgt.copy_from(&self.qnet)
    }

    /// Persists the online network's parameters.
    pub fn save_params(&self, path: impl AsRef<Path>) -> Result<()> {
        self.qnet.save(path)
    }

    /// Restores the online network's parameters and re-syncs the target
    /// network.
    pub fn load_params(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.qnet.load(path)?;
        self.sync_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        obs::FrameStack,
        replay::{ReplayBufferConfig, Transition},
    };
    use rand::Rng;

    fn test_agent(sync_interval: usize) -> Dqn<Mlp> {
        let model_config = QNetConfig::default().q_config(MlpConfig::new(8, vec![16], 3));
        let config = DqnConfig::default()
            .model_config(model_config)
            .batch_size(4)
            .sync_interval(sync_interval)
            .seed(7);
        Dqn::build(config).unwrap()
    }

    fn filled_buffer() -> ReplayBuffer {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut buffer = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(64));
        for _ in 0..32 {
            buffer.push(Transition {
                obs: (0..8).map(|_| rng.gen()).collect(),
                act: rng.gen_range(0..3),
                reward: rng.gen::<f32>(),
                next_obs: (0..8).map(|_| rng.gen()).collect(),
                is_done: if rng.gen::<f32>() < 0.1 { 1 } else { 0 },
            });
        }
        buffer
    }

    fn probe() -> StackedObs {
        FrameStack::new(4).reset(vec![50, 100])
    }

    #[test]
    fn terminal_targets_equal_reward_exactly() {
        let targets = td_targets(
            0.99,
            &[1.5, -2.0, 0.25],
            &[100.0, -100.0, 42.0],
            &[1, 1, 1],
        );
        assert_eq!(targets, vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn non_terminal_targets_bootstrap() {
        let targets = td_targets(0.5, &[1.0, 1.0], &[4.0, 4.0], &[0, 1]);
        assert_eq!(targets, vec![3.0, 1.0]);
    }

    #[test]
    fn target_network_starts_synced() {
        let agent = test_agent(5);
        let obs = probe();
        assert_eq!(
            agent.q_values(&obs).unwrap(),
            agent.target_q_values(&obs).unwrap()
        );
    }

    #[test]
    fn target_changes_only_at_sync_multiples() {
        let mut agent = test_agent(5);
        let mut buffer = filled_buffer();
        let obs = probe();
        let initial_tgt = agent.target_q_values(&obs).unwrap();

        for _ in 0..4 {
            agent.opt(&mut buffer).unwrap();
            // Online network moves, target stays frozen between syncs.
            assert_eq!(agent.target_q_values(&obs).unwrap(), initial_tgt);
        }
        assert_ne!(agent.q_values(&obs).unwrap(), initial_tgt);

        agent.opt(&mut buffer).unwrap();
        assert_eq!(agent.n_opts(), 5);
        assert_eq!(
            agent.target_q_values(&obs).unwrap(),
            agent.q_values(&obs).unwrap()
        );
    }

    #[test]
    fn repeated_target_evaluations_are_identical() {
        let agent = test_agent(50);
        let obs = probe();
        let a = agent.target_q_values(&obs).unwrap();
        let b = agent.target_q_values(&obs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn smooth_l1_optimizes_too() {
        let model_config = QNetConfig::default().q_config(MlpConfig::new(8, vec![16], 3));
        let config = DqnConfig::default()
            .model_config(model_config)
            .batch_size(4)
            .critic_loss(CriticLoss::SmoothL1)
            .seed(7);
        let mut agent = Dqn::<Mlp>::build(config).unwrap();
        let mut buffer = filled_buffer();
        let obs = probe();
        let before = agent.q_values(&obs).unwrap();

        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss").unwrap().is_finite());
        assert_ne!(agent.q_values(&obs).unwrap(), before);
    }

    #[test]
    fn opt_reports_scalar_loss() {
        let mut agent = test_agent(50);
        let mut buffer = filled_buffer();
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss").is_some());
    }

    #[test]
    fn opt_on_empty_buffer_fails_fast() {
        let mut agent = test_agent(50);
        let mut buffer = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(8));
        assert!(agent.opt(&mut buffer).is_err());
    }
}
