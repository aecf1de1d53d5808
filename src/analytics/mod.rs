//! Time analytics computed on demand from a [crate::storage::PulseRepository]:
//!  - [time] category overviews, per-project rankings, sources and sites.
//!  - [deep_work] merges flow segments of one day into deep work periods.
//!  - [week] compares today, yesterday and the previous week.
//!  - [sources] resolves user agents into known clients.

pub mod classification;
pub mod deep_work;
pub mod sources;
pub mod time;
pub mod week;
