use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};

/// This is the standard way of converting a date to a string in pulsemeter.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns the instant a calendar day starts at in `tz`. If midnight doesn't exist in the zone
/// (a DST gap), midnight UTC is used instead.
pub fn day_start<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|v| v.to_utc())
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Half-open range covering whole days from `first` through `last`.
pub fn days_range<Tz: TimeZone>(
    first: NaiveDate,
    last: NaiveDate,
    tz: &Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let after_last = last.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    (day_start(first, tz), day_start(after_last, tz))
}

pub fn same_local_day<Tz: TimeZone>(a: &DateTime<Utc>, b: &DateTime<Utc>, tz: &Tz) -> bool {
    a.with_timezone(tz).date_naive() == b.with_timezone(tz).date_naive()
}

/// Renders minutes the way dashboards show them, e.g. `2h 5m` or `45m`.
pub fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}
