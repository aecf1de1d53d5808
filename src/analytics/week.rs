use chrono::{Days, NaiveDate, TimeZone};
use serde::Serialize;
use tracing::instrument;

use crate::{
    error::{ActivityError, ActivityResult},
    storage::PulseRepository,
    utils::time::day_start,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekOverview {
    pub longest_day_minutes: i64,
    pub yesterday_minutes: i64,
    pub today_minutes: i64,
    pub week_minutes: i64,
}

/// Calendar days the week overview is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindows {
    pub week_start: NaiveDate,
    pub yesterday: NaiveDate,
    pub today: NaiveDate,
    pub tomorrow: NaiveDate,
}

impl WeekWindows {
    /// Uses calendar arithmetic, so month and year ends don't shift the windows.
    pub fn anchored_at(today: NaiveDate) -> Option<Self> {
        Some(Self {
            week_start: today.checked_sub_days(Days::new(7))?,
            yesterday: today.checked_sub_days(Days::new(1))?,
            today,
            tomorrow: today.checked_add_days(Days::new(1))?,
        })
    }
}

/// Computes today, yesterday, the previous seven days and the longest of those days, relative
/// to `date`. Day boundaries are taken in `tz`.
#[instrument(skip(repository, tz))]
pub async fn week_overview<Tz: TimeZone>(
    repository: &impl PulseRepository,
    date: NaiveDate,
    tz: &Tz,
) -> ActivityResult<WeekOverview> {
    let windows = WeekWindows::anchored_at(date)
        .ok_or_else(|| ActivityError::invalid(format!("{date} is out of range")))?;

    let week_start = day_start(windows.week_start, tz);
    let yesterday = day_start(windows.yesterday, tz);
    let today = day_start(windows.today, tz);
    let tomorrow = day_start(windows.tomorrow, tz);

    let longest_day_minutes = repository
        .longest_day_in_range_minutes(week_start, today)
        .await?;
    let yesterday_minutes = repository.range_minutes(yesterday, today).await?;
    let today_minutes = repository.range_minutes(today, tomorrow).await?;
    let week_minutes = repository.range_minutes(week_start, today).await?;

    Ok(WeekOverview {
        longest_day_minutes,
        yesterday_minutes,
        today_minutes,
        week_minutes,
    })
}
