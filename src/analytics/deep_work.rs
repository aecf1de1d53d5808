use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::{storage::entities::FlowSegment, utils::time::same_local_day};

/// One or more flow segments of a single calendar day merged together. `time` is in minutes.
///
/// `end_date` is the start of the last merged segment, not the moment it ended. Existing
/// dashboards draw periods that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeepWorkPeriod {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub time: i64,
}

impl From<&FlowSegment> for DeepWorkPeriod {
    fn from(segment: &FlowSegment) -> Self {
        Self {
            start_date: segment.flow_start,
            end_date: segment.flow_start,
            time: segment.flow_time,
        }
    }
}

/// Merges segments ordered by start into periods that never cross a calendar day in `tz`.
pub fn merge_deep_work<'a, Tz: TimeZone>(
    segments: impl IntoIterator<Item = &'a FlowSegment>,
    tz: &Tz,
) -> Vec<DeepWorkPeriod> {
    let mut periods = Vec::new();
    let mut current: Option<DeepWorkPeriod> = None;

    for segment in segments {
        if let Some(period) = current.as_mut() {
            if same_local_day(&period.start_date, &segment.flow_start, tz) {
                period.end_date = segment.flow_start;
                period.time += segment.flow_time;
                continue;
            }
        }
        if let Some(finished) = current.replace(segment.into()) {
            periods.push(finished);
        }
    }

    periods.extend(current);
    periods
}
