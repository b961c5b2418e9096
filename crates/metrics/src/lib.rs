//! Metric names for the herald command engine.
//!
//! Engine crates record through the `metrics` facade behind their optional
//! `metrics` feature. Nothing is exported until the host process installs a
//! recorder.
//!
//! ```rust,ignore
//! use herald_metrics::{commands, counter, labels};
//!
//! counter!(commands::INVOKED_TOTAL, labels::COMMAND => "ping").increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
