//! Persistence of training artifacts
//!
//! Reward history as CSV, model snapshots via the variable store, and
//! evaluation frames as a numbered PNG sequence. Parent directories are
//! created as needed.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::env::Frame;
use crate::policy::ActorCritic;
use crate::train::TrainingHistory;

#[derive(Debug, Serialize)]
struct TrainRecord {
    step: usize,
    train_reward: f32,
}

#[derive(Debug, Serialize)]
struct TrainTestRecord {
    step: usize,
    train_reward: f32,
    test_reward: f32,
}

#[derive(Debug, Deserialize)]
struct RewardRow {
    step: usize,
    train_reward: f32,
    test_reward: Option<f32>,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Write the reward history to `path`
///
/// Columns are `step,train_reward`, plus `test_reward` when the history
/// carries evaluation results.
pub fn save_rewards(history: &TrainingHistory, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut wtr = csv::Writer::from_writer(file);

    match &history.test_rewards {
        Some(test_rewards) => {
            for ((&step, &train_reward), &test_reward) in
                history.steps.iter().zip(&history.train_rewards).zip(test_rewards)
            {
                wtr.serialize(TrainTestRecord { step, train_reward, test_reward })?;
            }
        }
        None => {
            for (&step, &train_reward) in history.steps.iter().zip(&history.train_rewards) {
                wtr.serialize(TrainRecord { step, train_reward })?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Read a reward history written by [`save_rewards`]
pub fn load_rewards(path: &Path) -> Result<TrainingHistory> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let has_test = rdr.headers()?.iter().any(|h| h == "test_reward");

    let mut history = TrainingHistory { test_rewards: has_test.then(Vec::new), ..Default::default() };
    for row in rdr.deserialize() {
        let row: RewardRow = row?;
        history.steps.push(row.step);
        history.train_rewards.push(row.train_reward);
        if let Some(tests) = history.test_rewards.as_mut() {
            tests.push(row.test_reward.ok_or_else(|| anyhow!("missing test_reward at step {}", row.step))?);
        }
    }
    Ok(history)
}

/// Save the model's parameters to `path`
pub fn save_model<P: ActorCritic + ?Sized>(policy: &P, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    policy.var_store().save(path).with_context(|| format!("saving model to {}", path.display()))?;
    Ok(())
}

/// Write `frames` into `dir` as `frame_00000.png`, `frame_00001.png`, ...
///
/// Returns the number of frames written.
pub fn save_frames(frames: &[Frame], dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    for (i, frame) in frames.iter().enumerate() {
        let img = image::RgbImage::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
            .ok_or_else(|| anyhow!("frame {} has {} bytes for {}x{}", i, frame.data.len(), frame.width, frame.height))?;
        let path = dir.join(format!("frame_{i:05}.png"));
        img.save(&path).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(frames.len())
}
