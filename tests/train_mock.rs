use anyhow::Result;
use smash_dqn::{
    checkpoint::CheckpointManager,
    dqn::{Dqn, DqnConfig},
    env::{ActionMode, GameEnv, GameEnvConfig},
    mlp::{Mlp, MlpConfig},
    mock::MockEmulator,
    model::QNetConfig,
    obs::FRAME_LEN,
    replay::{ReplayBuffer, ReplayBufferConfig},
    trainer::{Trainer, TrainerConfig},
};
use tempdir::TempDir;

const N_STACK: usize = 2;
const N_ACTIONS: usize = 3;

fn build_agent(seed: u64) -> Result<Dqn<Mlp>> {
    let model_config =
        QNetConfig::default().q_config(MlpConfig::new(N_STACK * FRAME_LEN, vec![8], N_ACTIONS));
    Dqn::build(
        DqnConfig::default()
            .model_config(model_config)
            .batch_size(2)
            .sync_interval(4)
            .seed(seed),
    )
}

fn build_env() -> Result<GameEnv<MockEmulator>> {
    let config = GameEnvConfig::default()
        .env_id("mock-v0")
        .action_mode(ActionMode::PassThrough)
        .n_actions(N_ACTIONS)
        .n_stack(N_STACK);
    GameEnv::build(MockEmulator::new(32, 24, 5), &config)
}

#[test]
fn trains_checkpoints_and_resumes() -> Result<()> {
    let dir = TempDir::new("train_mock")?;
    let checkpoint = CheckpointManager::new(dir.path(), "smoke");
    let trainer_config = TrainerConfig::default()
        .n_episodes(3)
        .max_steps(8)
        .warmup_steps(4)
        .opt_interval(2)
        .save_period(2)
        .print_period(1);

    let mut env = build_env()?;
    let mut agent = build_agent(1)?;
    let mut buffer = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(64));
    Trainer::build(trainer_config.clone())?.train(&mut env, &mut agent, &mut buffer, &checkpoint)?;

    assert!(checkpoint.path().exists());
    assert!(agent.n_opts() > 0);
    let first_run_opts = agent.n_opts();

    // Same run id: the second run picks up the saved parameters.
    let mut env = build_env()?;
    let mut resumed = build_agent(2)?;
    let mut buffer = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(64));
    Trainer::build(trainer_config)?.train(&mut env, &mut resumed, &mut buffer, &checkpoint)?;
    assert!(resumed.n_opts() >= first_run_opts.min(1));

    Ok(())
}

#[test]
fn greedy_evaluation_is_deterministic() -> Result<()> {
    let mut env = build_env()?;
    let mut agent = build_agent(3)?;
    agent.eval();

    let obs = env.reset()?;
    let first = agent.sample(&obs)?;
    for _ in 0..10 {
        assert_eq!(agent.sample(&obs)?, first);
    }
    assert!(first < N_ACTIONS);
    Ok(())
}
