//! Configuration module for hpcbench
//!
//! Provides the command line, harness settings, session layout, and the
//! immutable run configuration handed to every benchmark.

mod run;
mod settings;

pub use run::*;
pub use settings::*;
