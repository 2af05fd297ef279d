//! Training algorithms

pub mod ppo;

pub use ppo::{
    Evaluation, PpoLossConfig, PpoTrainer, ReportSchedule, TrainConfig, TrainingHistory,
    TrainingStats, UpdateEngine, collect_rollout, evaluate_policy,
};
