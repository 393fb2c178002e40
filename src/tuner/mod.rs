//! Problem sizing and algorithm-knob search

pub mod autotune;
pub mod sweep;

pub use autotune::{AutoTuner, MemoryBudget, TuningOutcome};
pub use sweep::SweepSpace;
