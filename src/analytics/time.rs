use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{ActivityError, ActivityResult},
    storage::{
        entities::{
            EntityMinutes, FlowSegment, NamedMinutes, PageOptions, ProjectCategoryMinutes,
            TimeOverview,
        },
        PulseRepository,
    },
    utils::{
        percentage::{baseline_progress, Percentage},
        time::{days_range, format_minutes},
    },
};

use super::{
    classification::{
        canonical_category, folded_categories, matches_any, GROWTH_SITES, SOCIAL_MEDIA_SITES,
    },
    deep_work::{merge_deep_work, DeepWorkPeriod},
    sources::{list_sources, Source},
    week::{week_overview, WeekOverview},
};

/// Sites are reported in two-minute activity windows.
const SITE_WINDOW_MINUTES: i64 = 2;

pub const DEFAULT_TOP_PROJECTS: usize = 3;

/// A window to compute an overview for. Both bounds must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TimePeriod {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl TimePeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
        }
    }

    fn bounds(&self) -> ActivityResult<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(ActivityError::invalid("time period needs a start and an end")),
        }
    }
}

/// Project minutes prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectTimeEntry {
    pub name: String,
    pub minutes: i64,
    pub time: String,
    pub progress: Percentage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMinutes {
    pub name: String,
    pub minutes: i64,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMinutes {
    pub name: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub take: u32,
    pub item_count: usize,
    pub page_count: usize,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl PageMeta {
    pub fn new(options: PageOptions, item_count: usize) -> Self {
        let take = options.take.max(1) as usize;
        let page_count = item_count.div_ceil(take);
        Self {
            page: options.page,
            take: options.take,
            item_count,
            page_count,
            has_previous_page: options.page > 1,
            has_next_page: (options.page as usize) < page_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Collapses synonym categories into one entry, summing their minutes. Keeps the order in which
/// categories first appear.
pub fn merge_category_synonyms(overview: Vec<TimeOverview>) -> Vec<TimeOverview> {
    let mut merged: Vec<TimeOverview> = Vec::with_capacity(overview.len());
    for entry in overview {
        let category = canonical_category(&entry.category);
        match merged.iter_mut().find(|v| v.category == category) {
            Some(existing) => existing.minutes += entry.minutes,
            None => merged.push(TimeOverview::new(category, entry.minutes)),
        }
    }
    merged
}

/// Minutes of `category`, including categories folded into it (debugging counts as coding).
pub fn category_minutes(overview: &[TimeOverview], category: &str) -> i64 {
    let minutes_of = |name: &str| {
        overview
            .iter()
            .filter(|v| v.category == name)
            .map(|v| v.minutes)
            .sum::<i64>()
    };
    minutes_of(category)
        + folded_categories(category)
            .iter()
            .copied()
            .map(minutes_of)
            .sum::<i64>()
}

/// Progress of a category against the display baseline. Empty overviews show no progress.
pub fn category_percentage(overview: &[TimeOverview], category: &str) -> Percentage {
    let total = overview.iter().map(|v| v.minutes).sum::<i64>();
    if total > 0 {
        baseline_progress(category_minutes(overview, category))
    } else {
        Percentage::default()
    }
}

/// Groups project minutes by category and keeps the `n` largest projects of each.
pub fn top_projects_by_category(
    rows: Vec<ProjectCategoryMinutes>,
    n: usize,
) -> BTreeMap<String, Vec<ProjectTimeEntry>> {
    let mut grouped = BTreeMap::<String, Vec<NamedMinutes>>::new();
    for row in rows {
        let projects = grouped
            .entry(canonical_category(&row.category).to_string())
            .or_default();
        match projects.iter_mut().find(|v| v.name == row.name) {
            Some(project) => project.minutes += row.minutes,
            None => projects.push(NamedMinutes::new(row.name, row.minutes)),
        }
    }

    grouped
        .into_iter()
        .map(|(category, mut projects)| {
            projects.sort_by(|a, b| b.minutes.cmp(&a.minutes));
            let entries = projects
                .into_iter()
                .take(n)
                .map(|project| ProjectTimeEntry {
                    time: format_minutes(project.minutes),
                    progress: baseline_progress(project.minutes),
                    name: project.name,
                    minutes: project.minutes,
                })
                .collect();
            (category, entries)
        })
        .collect()
}

/// Attaches `last_active` of the matching known source to raw minutes. A key matches a source
/// whose name contains it. Keys without minutes or without a source are dropped.
pub fn join_sources_minutes(raw: Vec<NamedMinutes>, sources: &[Source]) -> Vec<SourceMinutes> {
    raw.into_iter()
        .filter(|v| v.minutes != 0)
        .filter_map(|v| {
            let key = v.name.to_lowercase();
            let source = sources
                .iter()
                .find(|source| source.name.to_lowercase().contains(&key))?;
            Some(SourceMinutes {
                last_active: source.last_active,
                name: v.name,
                minutes: v.minutes,
            })
        })
        .collect()
}

/// Converts site activity windows to minutes, dropping sites without activity.
pub fn sites_to_minutes(raw: Vec<NamedMinutes>) -> Vec<SiteMinutes> {
    raw.into_iter()
        .filter(|v| v.minutes != 0)
        .map(|v| SiteMinutes {
            name: v.name,
            minutes: v.minutes * SITE_WINDOW_MINUTES,
        })
        .collect()
}

/// Computes time analytics on demand from a [PulseRepository]. Every call takes its window
/// explicitly. Calendar days are evaluated in the aggregator's time zone.
pub struct TimeAggregator<R, Tz: TimeZone = Local> {
    repository: R,
    timezone: Tz,
}

impl<R: PulseRepository, Tz: TimeZone> TimeAggregator<R, Tz> {
    pub fn new(repository: R, timezone: Tz) -> Self {
        Self {
            repository,
            timezone,
        }
    }

    fn whole_days(&self, first: NaiveDate, last: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        days_range(first, last, &self.timezone)
    }

    #[instrument(skip(self))]
    pub async fn category_overview(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ActivityResult<Vec<TimeOverview>> {
        let overview = self.repository.category_time_overview(start, end).await?;
        Ok(merge_category_synonyms(overview))
    }

    /// Overviews of independent periods, queried concurrently and returned in input order. One
    /// invalid period fails the whole call before anything is queried.
    #[instrument(skip(self))]
    pub async fn category_overview_for_periods(
        &self,
        periods: &[TimePeriod],
    ) -> ActivityResult<Vec<Vec<TimeOverview>>> {
        let bounds = periods
            .iter()
            .map(TimePeriod::bounds)
            .collect::<ActivityResult<Vec<_>>>()?;
        try_join_all(
            bounds
                .into_iter()
                .map(|(start, end)| self.category_overview(start, end)),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn per_project_top_n(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        n: usize,
    ) -> ActivityResult<BTreeMap<String, Vec<ProjectTimeEntry>>> {
        let rows = self
            .repository
            .time_by_project_category_and_range(start, end)
            .await?;
        Ok(top_projects_by_category(rows, n))
    }

    pub async fn list_sources(&self) -> ActivityResult<Vec<Source>> {
        list_sources(&self.repository).await
    }

    #[instrument(skip(self))]
    pub async fn sources_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ActivityResult<Vec<SourceMinutes>> {
        let sources = list_sources(&self.repository).await?;
        let raw = self.repository.sources_minutes(start, end).await?;
        debug!("Joining {} source keys with {} sources", raw.len(), sources.len());
        Ok(join_sources_minutes(raw, &sources))
    }

    #[instrument(skip(self))]
    pub async fn sites_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ActivityResult<Vec<SiteMinutes>> {
        let raw = self.repository.sites_minutes(start, end).await?;
        Ok(sites_to_minutes(raw))
    }

    pub async fn deep_work(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ActivityResult<Vec<FlowSegment>> {
        Ok(self.repository.deep_work(start, end).await?)
    }

    #[instrument(skip(self))]
    pub async fn deep_work_between_dates(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<Vec<DeepWorkPeriod>> {
        let (start, end) = self.whole_days(first, last);
        let segments = self.repository.deep_work(start, end).await?;
        Ok(merge_deep_work(&segments, &self.timezone))
    }

    pub async fn week_overview(&self, date: NaiveDate) -> ActivityResult<WeekOverview> {
        week_overview(&self.repository, date, &self.timezone).await
    }

    pub async fn projects_time_by_range_and_category(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<BTreeMap<String, Vec<NamedMinutes>>> {
        let (start, end) = self.whole_days(first, last);
        let rows = self
            .repository
            .time_by_project_category_and_range(start, end)
            .await?;
        let mut grouped = BTreeMap::<String, Vec<NamedMinutes>>::new();
        for row in rows {
            grouped
                .entry(row.category)
                .or_default()
                .push(NamedMinutes::new(row.name, row.minutes));
        }
        Ok(grouped)
    }

    pub async fn projects_time_by_range(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<Vec<NamedMinutes>> {
        let (start, end) = self.whole_days(first, last);
        Ok(self.repository.time_by_project_and_range(start, end).await?)
    }

    async fn entities_matching(
        &self,
        first: NaiveDate,
        last: NaiveDate,
        sites: &[&str],
    ) -> ActivityResult<Vec<EntityMinutes>> {
        let (start, end) = self.whole_days(first, last);
        let rows = self.repository.time_by_entity_and_range(start, end).await?;
        Ok(rows
            .into_iter()
            .filter(|row| matches_any(&row.entity, sites))
            .collect())
    }

    pub async fn social_media_time_by_range(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<Vec<EntityMinutes>> {
        self.entities_matching(first, last, SOCIAL_MEDIA_SITES).await
    }

    pub async fn growth_and_mastery_time_by_range(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<Vec<EntityMinutes>> {
        self.entities_matching(first, last, GROWTH_SITES).await
    }

    pub async fn category_time_by_range(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<Vec<TimeOverview>> {
        let (start, end) = self.whole_days(first, last);
        let rows = self.repository.time_by_category_and_range(start, end).await?;
        Ok(merge_category_synonyms(rows))
    }

    pub async fn total_time_by_range(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> ActivityResult<i64> {
        let rows = self.category_time_by_range(first, last).await?;
        Ok(rows.iter().map(|v| v.minutes).sum())
    }

    /// Minutes of a single local day, the figure editor status bars show.
    pub async fn day_total_minutes(&self, date: NaiveDate) -> ActivityResult<i64> {
        let (start, end) = self.whole_days(date, date);
        let overview = self.category_overview(start, end).await?;
        Ok(overview.iter().map(|v| v.minutes).sum())
    }

    pub async fn per_project_overview_by_category(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: &str,
        options: PageOptions,
    ) -> ActivityResult<Page<NamedMinutes>> {
        let page = self
            .repository
            .per_project_overview_by_category(start, end, category.to_string(), options)
            .await?;
        Ok(Page {
            data: page.projects,
            meta: PageMeta::new(options, page.total),
        })
    }
}
