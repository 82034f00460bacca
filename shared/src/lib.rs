//! Shared types and utilities for mdlens
//!
//! This crate contains the counter data model (metric descriptors, typed
//! values, decoded reports), the opaque compute-API handles passed through
//! the interception layer, and small parsing helpers used by the engine and
//! the command-line tool.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{counters::*, handles::*, sampling::*};
