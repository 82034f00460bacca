//! Type definitions shared across the workspace

pub mod counters;
pub mod handles;
pub mod sampling;
