//! Train PPO on the contextual bandit through the full pipeline
//!
//! Writes the reward history, a model snapshot and a frame sequence under
//! the output directory.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example train_bandit --release
//! cargo run --example train_bandit --release -- config.json out/
//! ```

use std::path::PathBuf;

use anyhow::Result;
use rollout_rl::{
    pipeline::{BanditFactory, PipelineConfig, training_pipeline},
    train::ppo::TrainConfig,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig {
            num_envs: 8,
            num_levels: 50,
            video_steps: 64,
            train: TrainConfig::new().num_steps(64).batch_size(128).total_steps(50_000).eval(true),
            ..Default::default()
        },
    };
    let base_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    tracing::info!("Environment: {} ({} envs, {} levels)", config.env_name, config.num_envs, config.num_levels);
    tracing::info!("  Steps per rollout: {}", config.train.num_steps);
    tracing::info!("  Total timesteps: {}", config.train.total_steps);

    let factory = BanditFactory { seed: config.train.seed, max_steps: None };
    let output = training_pipeline(&config, &factory, &base_dir)?;

    if let Some(last) = output.history.train_rewards.last() {
        tracing::info!("Final train reward: {:.2}", last);
    }
    if let Some(last) = output.history.test_rewards.as_ref().and_then(|r| r.last()) {
        tracing::info!("Final test reward: {:.2}", last);
    }
    tracing::info!("Rewards: {}", output.rewards_path.display());
    tracing::info!("Model: {}", output.model_path.display());
    tracing::info!("Frames: {}", output.video_dir.display());
    Ok(())
}
