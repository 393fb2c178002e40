//! High-Performance Linpack
//!
//! Input deck generation, launch assembly and result parsing for HPL and
//! the containerised HPL-AI variant.

pub mod deck;
pub mod launcher;
pub mod parser;
pub mod summary;

pub use deck::{HplDeck, DEFAULT_KNOBS};
pub use launcher::{HplWorkload, LaunchMode};
pub use parser::HplParser;
pub use summary::{parse_summaries, rank, SummaryRecord, Variant};
