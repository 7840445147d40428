use anyhow::Result;
use clap::Parser;
use smash_dqn::{
    checkpoint::CheckpointManager,
    cnn::CnnConfig,
    dqn::{CriticLoss, Dqn, DqnConfig},
    env::{ActionMode, GameEnv, GameEnvConfig},
    explorer::EpsilonGreedy,
    mock::MockEmulator,
    model::QNetConfig,
    opt::OptimizerConfig,
    replay::{ReplayBuffer, ReplayBufferConfig},
    trainer::{Trainer, TrainerConfig},
    Cnn, Device,
};

const N_STACK: usize = 4;
const N_ACTIONS: usize = 15;
const LR: f64 = 0.003;
const DISCOUNT_FACTOR: f32 = 0.99;
const BATCH_SIZE: usize = 128;
const SYNC_INTERVAL: usize = 50;
const EPS_INIT: f64 = 0.2;
const EPS_DECAY: f64 = 0.000002;
const REPLAY_BUFFER_CAPACITY: usize = 100_000;
const MAX_STEPS: usize = 2000;
const WARMUP_STEPS: usize = 256;
const SAVE_PERIOD: usize = 10;
const PRINT_PERIOD: usize = 10;

/// Train a DQN agent on the scripted emulator
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Identifier of the training run; reusing an id resumes its checkpoint
    #[arg(long, default_value = "smash-dk")]
    run_id: String,

    /// Number of training episodes
    #[arg(long, default_value_t = 100)]
    episodes: usize,

    /// Directory holding checkpoints
    #[arg(long, default_value = "./model")]
    model_dir: String,

    /// Run on the first CUDA device instead of the CPU
    #[arg(long, default_value_t = false)]
    cuda: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let env_config = GameEnvConfig::default()
        .env_id(args.run_id.clone())
        .action_mode(ActionMode::Pad)
        .n_actions(N_ACTIONS)
        .n_stack(N_STACK);
    let mut env = GameEnv::build(MockEmulator::new(320, 240, MAX_STEPS), &env_config)?;

    let model_config = QNetConfig::default()
        .q_config(CnnConfig::new(N_STACK, N_ACTIONS))
        .opt_config(OptimizerConfig::Adam { lr: LR });
    let agent_config = DqnConfig::default()
        .model_config(model_config)
        .batch_size(BATCH_SIZE)
        .discount_factor(DISCOUNT_FACTOR)
        .sync_interval(SYNC_INTERVAL)
        .explorer(EpsilonGreedy::default().eps_init(EPS_INIT).decay(EPS_DECAY))
        .critic_loss(CriticLoss::Mse)
        .device(if args.cuda { Device::Cuda(0) } else { Device::Cpu });
    let mut agent: Dqn<Cnn> = Dqn::build(agent_config)?;

    let mut buffer =
        ReplayBuffer::build(&ReplayBufferConfig::default().capacity(REPLAY_BUFFER_CAPACITY));
    let checkpoint = CheckpointManager::new(&args.model_dir, &args.run_id);

    let trainer_config = TrainerConfig::default()
        .n_episodes(args.episodes)
        .max_steps(MAX_STEPS)
        .warmup_steps(WARMUP_STEPS)
        .save_period(SAVE_PERIOD)
        .print_period(PRINT_PERIOD);
    let mut trainer = Trainer::build(trainer_config)?;

    trainer.train(&mut env, &mut agent, &mut buffer, &checkpoint)
}
