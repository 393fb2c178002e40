//! Result store and reporting
//!
//! The store accumulates one sample per repeat for every key/metric pair;
//! the reporter turns it into tables.

pub mod report;
pub mod store;

pub use report::{default_header, render, render_as, render_csv, render_json};
pub use store::{ResultKey, ResultRecord, ResultStore, Sample, MISSING};
