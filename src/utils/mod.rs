//! Process bootstrap and runtime statistics.

pub mod bootstrap;
pub mod metrics;
