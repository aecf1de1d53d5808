use std::{collections::BTreeMap, fmt::Write};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;

use crate::{
    analytics::{
        classification::DISPLAY_CATEGORIES,
        deep_work::DeepWorkPeriod,
        sources::Source,
        time::{
            category_minutes, category_percentage, Page, ProjectTimeEntry, SiteMinutes,
            SourceMinutes,
        },
        week::WeekOverview,
    },
    storage::entities::{EntityMinutes, NamedMinutes, TimeOverview},
    utils::time::format_minutes,
};

/// Everything `overview` shows for a range of days.
#[derive(Debug, Serialize)]
pub struct OverviewReport {
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub total_minutes: i64,
    pub current: Vec<TimeOverview>,
    /// Same amount of days right before `first`.
    pub previous: Vec<TimeOverview>,
    pub projects: BTreeMap<String, Vec<ProjectTimeEntry>>,
    pub sites: Vec<SiteMinutes>,
    pub social_media: Vec<EntityMinutes>,
    pub growth: Vec<EntityMinutes>,
}

const LISTED_ENTITIES: usize = 5;

/// Prints command results either as text or as JSON.
pub struct Report {
    json: bool,
}

impl Report {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn print(&self, value: &impl Serialize, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", text());
        }
        Ok(())
    }

    pub fn accepted(&self, accepted: usize) -> Result<()> {
        self.print(&json!({ "accepted": accepted }), || {
            format!("Accepted {accepted} pulses\n")
        })
    }

    pub fn day_total(&self, date: NaiveDate, minutes: i64) -> Result<()> {
        self.print(&json!({ "date": date, "minutes": minutes }), || {
            format!("{}\n", format_minutes(minutes))
        })
    }

    pub fn overview(&self, overview: &OverviewReport) -> Result<()> {
        self.print(overview, || overview_text(overview))
    }

    pub fn week(&self, date: NaiveDate, week: &WeekOverview) -> Result<()> {
        self.print(week, || {
            format!(
                "Week up to {date}\n  Today:       {}\n  Yesterday:   {}\n  Last 7 days: {}\n  Longest day: {}\n",
                format_minutes(week.today_minutes),
                format_minutes(week.yesterday_minutes),
                format_minutes(week.week_minutes),
                format_minutes(week.longest_day_minutes),
            )
        })
    }

    pub fn deep_work(&self, periods: &[DeepWorkPeriod]) -> Result<()> {
        self.print(&periods, || {
            let mut text = String::new();
            for period in periods {
                let start = period.start_date.with_timezone(&Local);
                let end = period.end_date.with_timezone(&Local);
                let _ = writeln!(
                    text,
                    "{} {} - {}  {}",
                    start.format("%Y-%m-%d"),
                    start.format("%H:%M"),
                    end.format("%H:%M"),
                    format_minutes(period.time)
                );
            }
            if periods.is_empty() {
                text.push_str("No deep work in range\n");
            }
            text
        })
    }

    pub fn sources(&self, sources: &[Source]) -> Result<()> {
        self.print(&sources, || {
            let mut text = String::new();
            for source in sources {
                let _ = writeln!(
                    text,
                    "{:<12} last active {}",
                    source.name,
                    source.last_active.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                );
            }
            text
        })
    }

    pub fn sources_minutes(&self, sources: &[SourceMinutes]) -> Result<()> {
        self.print(&sources, || {
            let mut text = String::new();
            for source in sources {
                let _ = writeln!(text, "{:<12} {}", source.name, format_minutes(source.minutes));
            }
            text
        })
    }

    pub fn project_page(&self, category: &str, page: &Page<NamedMinutes>) -> Result<()> {
        self.print(page, || {
            let mut text = format!(
                "{category}, page {} of {}\n",
                page.meta.page,
                page.meta.page_count.max(1)
            );
            for project in &page.data {
                let _ = writeln!(text, "  {:<24} {}", project.name, format_minutes(project.minutes));
            }
            text
        })
    }

    pub fn projects_by_category(
        &self,
        by_category: &BTreeMap<String, Vec<NamedMinutes>>,
        totals: &[NamedMinutes],
    ) -> Result<()> {
        self.print(
            &json!({ "by_category": by_category, "total": totals }),
            || {
                let mut text = String::new();
                for project in totals {
                    let _ = writeln!(text, "{:<24} {}", project.name, format_minutes(project.minutes));
                }
                for (category, projects) in by_category {
                    let _ = writeln!(text, "{category}");
                    for project in projects {
                        let _ = writeln!(
                            text,
                            "  {:<22} {}",
                            project.name,
                            format_minutes(project.minutes)
                        );
                    }
                }
                text
            },
        )
    }
}

fn overview_text(overview: &OverviewReport) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "{} - {}: {}",
        overview.first,
        overview.last,
        format_minutes(overview.total_minutes)
    );

    for (category, title) in DISPLAY_CATEGORIES {
        let minutes = category_minutes(&overview.current, category);
        let previous = category_minutes(&overview.previous, category);
        let _ = writeln!(
            text,
            "  {:<14} {:>8} {:>5}  (before {})",
            title,
            format_minutes(minutes),
            category_percentage(&overview.current, category).to_string(),
            format_minutes(previous)
        );
    }

    if !overview.projects.is_empty() {
        text.push_str("Top projects\n");
        for (category, projects) in &overview.projects {
            let names = projects
                .iter()
                .map(|v| format!("{} {}", v.name, v.time))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(text, "  {category}: {names}");
        }
    }

    if !overview.sites.is_empty() {
        text.push_str("Sites\n");
        for site in &overview.sites {
            let _ = writeln!(text, "  {:<14} {}", site.name, format_minutes(site.minutes));
        }
    }

    for (title, entities) in [
        ("Social media", &overview.social_media),
        ("Learning", &overview.growth),
    ] {
        if entities.is_empty() {
            continue;
        }
        let _ = writeln!(text, "{title}");
        for entity in entities.iter().take(LISTED_ENTITIES) {
            let _ = writeln!(text, "  {:<40} {}", entity.entity, format_minutes(entity.minutes));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use crate::{
        analytics::time::SiteMinutes,
        storage::entities::TimeOverview,
    };

    use super::{overview_text, OverviewReport};

    #[test]
    fn test_overview_text_folds_debugging() {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let text = overview_text(&OverviewReport {
            first: day,
            last: day,
            total_minutes: 150,
            current: vec![
                TimeOverview::new("coding", 60),
                TimeOverview::new("debugging", 30),
                TimeOverview::new("communicating", 60),
            ],
            previous: vec![TimeOverview::new("coding", 45)],
            projects: BTreeMap::new(),
            sites: vec![SiteMinutes {
                name: "github".into(),
                minutes: 12,
            }],
            social_media: vec![],
            growth: vec![],
        });

        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "2024-07-01 - 2024-07-01: 2h 30m");
        assert!(lines[1].contains("Coding"));
        assert!(lines[1].contains("1h 30m"));
        assert!(lines[1].contains("50%"));
        assert!(lines[1].contains("(before 45m)"));
        assert!(text.contains("Sites\n  github"));
        assert!(!text.contains("Social media"));
    }
}
