//! Utility functions and helpers

pub mod grad;
pub mod normalize;
