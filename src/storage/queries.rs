//! In-memory evaluation of repository queries over pulses already loaded for a range.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::{
    analytics::{classification::TRACKED_SITES, sources::resolve_source},
    pulse::entities::{Pulse, PulseType},
};

use super::entities::{
    EntityMinutes, FlowSegment, NamedMinutes, PageOptions, ProjectCategoryMinutes, ProjectPage,
    TimeOverview, UserAgentActivity,
};

/// Gaps up to this long keep a flow going.
pub const FLOW_MAX_GAP: Duration = Duration::minutes(5);
/// Flows with fewer active minutes are not deep work.
pub const FLOW_MIN_MINUTES: i64 = 15;
/// Size of the activity window sites are counted in.
pub const SITE_WINDOW: Duration = Duration::minutes(2);

const FOCUSED_CATEGORIES: &[&str] = &["coding", "debugging"];

fn bucket(time: &DateTime<Utc>, size: Duration) -> i64 {
    time.timestamp().div_euclid(size.num_seconds())
}

fn minute(time: &DateTime<Utc>) -> i64 {
    bucket(time, Duration::minutes(1))
}

/// Number of distinct minutes holding at least one pulse.
pub fn distinct_minutes<'a>(pulses: impl IntoIterator<Item = &'a Pulse>) -> i64 {
    pulses
        .into_iter()
        .map(|v| minute(&v.time))
        .collect::<HashSet<_>>()
        .len() as i64
}

/// Distinct minutes per key, largest first. Ties are ordered by key. Pulses without a key are
/// ignored.
fn minutes_by<'a, K: Ord>(
    pulses: impl IntoIterator<Item = &'a Pulse>,
    key: impl Fn(&'a Pulse) -> Option<K>,
) -> Vec<(K, i64)> {
    let mut buckets = BTreeMap::<K, HashSet<i64>>::new();
    for pulse in pulses {
        if let Some(k) = key(pulse) {
            buckets.entry(k).or_default().insert(minute(&pulse.time));
        }
    }
    let mut minutes = buckets
        .into_iter()
        .map(|(k, v)| (k, v.len() as i64))
        .collect::<Vec<_>>();
    minutes.sort_by(|a, b| b.1.cmp(&a.1));
    minutes
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

pub fn category_overview(pulses: &[Pulse]) -> Vec<TimeOverview> {
    minutes_by(pulses, |v| non_empty(&v.category))
        .into_iter()
        .map(|(category, minutes)| TimeOverview::new(category, minutes))
        .collect()
}

/// Largest distinct-minute count of a single calendar day in `tz`.
pub fn longest_day_minutes<Tz: TimeZone>(pulses: &[Pulse], tz: &Tz) -> i64 {
    let mut days = BTreeMap::<NaiveDate, HashSet<i64>>::new();
    for pulse in pulses {
        days.entry(pulse.time.with_timezone(tz).date_naive())
            .or_default()
            .insert(minute(&pulse.time));
    }
    days.values().map(|v| v.len() as i64).max().unwrap_or(0)
}

fn is_focused(pulse: &Pulse) -> bool {
    FOCUSED_CATEGORIES.contains(&pulse.category.as_str())
        || (pulse.category.is_empty() && pulse.pulse_type == PulseType::Code)
}

/// Splits focused activity into flows. A flow is a run of active minutes where consecutive
/// minutes are at most [FLOW_MAX_GAP] apart and that spans at least [FLOW_MIN_MINUTES] active
/// minutes. Segments start at the beginning of their first active minute.
pub fn flow_segments(pulses: &[Pulse]) -> Vec<FlowSegment> {
    let mut minutes = pulses
        .iter()
        .filter(|v| is_focused(v))
        .map(|v| minute(&v.time))
        .collect::<Vec<_>>();
    minutes.sort_unstable();
    minutes.dedup();

    let max_gap = FLOW_MAX_GAP.num_minutes();
    let mut runs: Vec<(i64, i64)> = Vec::new();
    let mut previous: Option<i64> = None;
    for minute in minutes {
        match (runs.last_mut(), previous) {
            (Some(run), Some(previous)) if minute - previous <= max_gap => run.1 += 1,
            _ => runs.push((minute, 1)),
        }
        previous = Some(minute);
    }

    runs.into_iter()
        .filter(|(_, active)| *active >= FLOW_MIN_MINUTES)
        .filter_map(|(first, active)| {
            Some(FlowSegment {
                flow_start: DateTime::from_timestamp(first * 60, 0)?,
                flow_time: active,
            })
        })
        .collect()
}

/// Every non-empty user agent with its latest pulse, most recently active first.
pub fn user_agents_last_active(pulses: &[Pulse]) -> Vec<UserAgentActivity> {
    let mut agents = BTreeMap::<&str, DateTime<Utc>>::new();
    for pulse in pulses.iter().filter(|v| !v.user_agent.is_empty()) {
        agents
            .entry(pulse.user_agent.as_str())
            .and_modify(|v| *v = (*v).max(pulse.time))
            .or_insert(pulse.time);
    }
    let mut agents = agents
        .into_iter()
        .map(|(user_agent, last_active)| UserAgentActivity {
            user_agent: user_agent.to_string(),
            last_active,
        })
        .collect::<Vec<_>>();
    agents.sort_by(|a, b| b.last_active.cmp(&a.last_active));
    agents
}

pub fn sources_minutes(pulses: &[Pulse]) -> Vec<NamedMinutes> {
    minutes_by(pulses, |v| resolve_source(&v.user_agent))
        .into_iter()
        .map(|(name, minutes)| NamedMinutes::new(name, minutes))
        .collect()
}

/// Two-minute windows with activity on each tracked site, in tracking order. Sites without
/// activity are reported with zero windows.
pub fn sites_windows(pulses: &[Pulse]) -> Vec<NamedMinutes> {
    let web = pulses
        .iter()
        .filter(|v| v.pulse_type == PulseType::Web)
        .map(|v| (v.entity.to_lowercase(), bucket(&v.time, SITE_WINDOW)))
        .collect::<Vec<_>>();

    TRACKED_SITES
        .iter()
        .map(|site| {
            let windows = web
                .iter()
                .filter(|(entity, _)| entity.contains(site))
                .map(|(_, window)| *window)
                .collect::<HashSet<_>>();
            NamedMinutes::new(*site, windows.len() as i64)
        })
        .collect()
}

pub fn project_category_minutes(pulses: &[Pulse]) -> Vec<ProjectCategoryMinutes> {
    minutes_by(pulses, |v| {
        Some((non_empty(&v.category)?, non_empty(v.project.as_deref()?)?))
    })
    .into_iter()
    .map(|((category, name), minutes)| ProjectCategoryMinutes {
        category: category.to_string(),
        name: name.to_string(),
        minutes,
    })
    .collect()
}

pub fn project_minutes<'a>(pulses: impl IntoIterator<Item = &'a Pulse>) -> Vec<NamedMinutes> {
    minutes_by(pulses, |v| non_empty(v.project.as_deref()?))
        .into_iter()
        .map(|(name, minutes)| NamedMinutes::new(name, minutes))
        .collect()
}

pub fn entity_minutes(pulses: &[Pulse]) -> Vec<EntityMinutes> {
    minutes_by(pulses, |v| non_empty(&v.entity))
        .into_iter()
        .map(|(entity, minutes)| EntityMinutes {
            entity: entity.to_string(),
            minutes,
        })
        .collect()
}

/// Projects of one category, largest first, cut to the requested page.
pub fn project_page(pulses: &[Pulse], category: &str, options: PageOptions) -> ProjectPage {
    let projects = project_minutes(pulses.iter().filter(|v| v.category == category));
    let total = projects.len();
    ProjectPage {
        projects: projects
            .into_iter()
            .skip(options.skip())
            .take(options.take as usize)
            .collect(),
        total,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

    use crate::{
        pulse::{
            entities::{Pulse, PulseType},
            test_data::sample_pulse,
        },
        storage::entities::{NamedMinutes, PageOptions, TimeOverview},
    };

    use super::{
        category_overview, distinct_minutes, flow_segments, longest_day_minutes, project_page,
        sites_windows, sources_minutes, user_agents_last_active,
    };

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, hour, minute, second)
            .unwrap()
    }

    fn categorized(category: &str, time: DateTime<Utc>) -> Pulse {
        Pulse {
            category: category.into(),
            ..sample_pulse("src/lib.rs", time)
        }
    }

    fn project(name: &str, category: &str, time: DateTime<Utc>) -> Pulse {
        Pulse {
            project: Some(name.into()),
            ..categorized(category, time)
        }
    }

    fn web(entity: &str, time: DateTime<Utc>) -> Pulse {
        Pulse {
            pulse_type: PulseType::Web,
            ..sample_pulse(entity, time)
        }
    }

    /// One pulse per minute for `count` minutes starting at `start`.
    fn every_minute(category: &str, start: DateTime<Utc>, count: i64) -> Vec<Pulse> {
        (0..count)
            .map(|i| categorized(category, start + Duration::minutes(i)))
            .collect()
    }

    #[test]
    fn test_minutes_are_distinct() {
        let pulses = [
            categorized("coding", at(1, 9, 0, 5)),
            categorized("coding", at(1, 9, 0, 55)),
            categorized("coding", at(1, 9, 1, 0)),
        ];
        assert_eq!(distinct_minutes(&pulses), 2);
    }

    #[test]
    fn test_category_overview_sorted() {
        let mut pulses = every_minute("coding", at(1, 9, 0, 0), 5);
        pulses.extend(every_minute("browsing", at(1, 10, 0, 0), 8));
        pulses.push(categorized("", at(1, 11, 0, 0)));
        assert_eq!(
            category_overview(&pulses),
            vec![
                TimeOverview::new("browsing", 8),
                TimeOverview::new("coding", 5),
            ]
        );
    }

    #[test]
    fn test_longest_day_uses_offset() {
        let mut pulses = every_minute("coding", at(1, 22, 0, 0), 30);
        pulses.extend(every_minute("coding", at(2, 1, 0, 0), 20));
        assert_eq!(longest_day_minutes(&pulses, &Utc), 30);
        // Five hours west both runs fall on July 1st.
        let west = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(longest_day_minutes(&pulses, &west), 50);
        assert_eq!(longest_day_minutes(&[], &west), 0);
    }

    #[test]
    fn test_flow_segments() {
        // 20 minutes, four idle minutes, 5 more minutes: one flow of 25.
        let mut pulses = every_minute("coding", at(1, 9, 0, 30), 20);
        pulses.extend(every_minute("debugging", at(1, 9, 24, 0), 5));
        // Too short to count.
        pulses.extend(every_minute("coding", at(1, 11, 0, 0), 10));
        // Not focused.
        pulses.extend(every_minute("browsing", at(1, 13, 0, 0), 30));

        let segments = flow_segments(&pulses);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].flow_start, at(1, 9, 0, 0));
        assert_eq!(segments[0].flow_time, 25);
    }

    #[test]
    fn test_flow_segments_split_on_long_gap() {
        let mut pulses = every_minute("coding", at(1, 9, 0, 0), 15);
        pulses.extend(every_minute("", at(1, 9, 21, 0), 15));
        let segments = flow_segments(&pulses);
        assert_eq!(
            segments.iter().map(|v| v.flow_time).collect::<Vec<_>>(),
            vec![15, 15]
        );
        assert_eq!(segments[1].flow_start, at(1, 9, 21, 0));
    }

    #[test]
    fn test_user_agents_latest_first() {
        let agent = |user_agent: &str, time| Pulse {
            user_agent: user_agent.into(),
            ..sample_pulse("a", time)
        };
        let agents = user_agents_last_active(&[
            agent("vscode/1.0", at(1, 9, 0, 0)),
            agent("firefox/1.0", at(2, 9, 0, 0)),
            agent("vscode/1.0", at(3, 9, 0, 0)),
            agent("", at(4, 9, 0, 0)),
        ]);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].user_agent, "vscode/1.0");
        assert_eq!(agents[0].last_active, at(3, 9, 0, 0));
    }

    #[test]
    fn test_sources_minutes_by_resolved_name() {
        let agent = |user_agent: &str, time| Pulse {
            user_agent: user_agent.into(),
            ..sample_pulse("a", time)
        };
        let minutes = sources_minutes(&[
            agent("vscode/1.79 vscode-wakatime/24.0", at(1, 9, 0, 0)),
            agent("vscode/1.80 vscode-wakatime/24.1", at(1, 9, 1, 0)),
            agent("curl/8.4.0", at(1, 9, 2, 0)),
        ]);
        assert_eq!(minutes, vec![NamedMinutes::new("vscode", 2)]);
    }

    #[test]
    fn test_sites_windows_include_zeros() {
        let pulses = [
            web("https://github.com/rust-lang", at(1, 9, 0, 0)),
            web("https://GitHub.com/tokio-rs", at(1, 9, 1, 59)),
            web("https://github.com/serde-rs", at(1, 9, 2, 0)),
            // Code pulses never count as site visits.
            sample_pulse("github/src/main.rs", at(1, 10, 0, 0)),
        ];
        let sites = sites_windows(&pulses);
        assert_eq!(sites[0], NamedMinutes::new("github", 2));
        assert!(sites.iter().any(|v| v.name == "reddit" && v.minutes == 0));
    }

    #[test]
    fn test_project_page() {
        let mut pulses = vec![];
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            for m in 0..=i as u32 {
                pulses.push(project(name, "coding", at(1, 9, m, 0)));
            }
        }
        pulses.push(project("d", "browsing", at(1, 9, 0, 0)));

        let first = project_page(&pulses, "coding", PageOptions { page: 1, take: 2 });
        assert_eq!(first.total, 3);
        assert_eq!(
            first.projects,
            vec![NamedMinutes::new("c", 3), NamedMinutes::new("b", 2)]
        );
        let second = project_page(&pulses, "coding", PageOptions { page: 2, take: 2 });
        assert_eq!(second.projects, vec![NamedMinutes::new("a", 1)]);
    }
}
