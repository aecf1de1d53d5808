//! Local activity tracker that ingests editor and browser pulses and tells you where the time
//! went. Pulses are deduplicated by content hash and stored in plain files, analytics are
//! computed on demand.
//!

pub mod analytics;
pub mod cli;
pub mod error;
pub mod pulse;
pub mod storage;
pub mod utils;
