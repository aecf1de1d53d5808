use std::{fmt::Display, ops::Deref};

use serde::Serialize;

/// Dashboard progress bars are scaled against three hours of activity. Values above it are
/// allowed, it's not a cap.
pub const PROGRESS_BASELINE_MINUTES: i64 = 3 * 60;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn minutes_percentage(minutes: i64, whole: i64) -> Percentage {
    if whole <= 0 {
        return Percentage::default();
    }
    Percentage::new_opt(minutes as f64 / whole as f64 * 100.).unwrap_or_default()
}

/// Progress of `minutes` against [PROGRESS_BASELINE_MINUTES].
pub fn baseline_progress(minutes: i64) -> Percentage {
    minutes_percentage(minutes, PROGRESS_BASELINE_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::{baseline_progress, minutes_percentage};

    #[test]
    fn test_baseline_progress() {
        assert_eq!(*baseline_progress(90), 50.);
        assert_eq!(*baseline_progress(360), 200.);
        assert_eq!(*baseline_progress(-5), 0.);
    }

    #[test]
    fn test_zero_whole() {
        assert_eq!(*minutes_percentage(10, 0), 0.);
    }
}
