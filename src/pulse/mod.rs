//! Everything between a client submitting a heartbeat and the heartbeat being stored:
//!  - [normalizer] turns submissions into canonical [entities::Pulse] values and fingerprints them.
//!  - [dedup] drops repeated fingerprints inside a batch.
//!  - [ingestion] ties both to a [crate::storage::PulseRepository].
//!  - [csv] renders stored pulses for export.

pub mod csv;
pub mod dedup;
pub mod entities;
pub mod ingestion;
pub mod normalizer;
