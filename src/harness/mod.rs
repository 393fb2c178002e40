//! Benchmark harness
//!
//! A single state machine ([`Harness`]) composed with four capabilities:
//! [`Builder`], [`Executor`], [`Parser`] and [`Configurator`].

pub mod engine;
pub mod prerequisite;
pub mod process;
pub mod state;
pub mod strategy;

pub use engine::{Harness, RunReport};
pub use prerequisite::{DottedVersion, Requirement};
pub use process::{CommandBuilder, Prebuilt, ProcessExecutor};
pub use state::HarnessState;
pub use strategy::{
    Builder, CommandOutput, CommandSpec, Configurator, ExecutionEnvironment, Executor, Parser,
};
