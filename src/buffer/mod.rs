//! Experience storage

pub mod rollout;
