//! Storage is abstracted through [PulseRepository]. The analytics engine only ever talks to the
//! trait, the local realization lives in [pulse_store::PulseStoreImpl]:
//!   - There is a directory with all the records.
//!   - Records are stored in files holding the pulses of one UTC day, one JSON object per line.
//!   - Time is counted in distinct minutes that contain at least one pulse.

pub mod entities;
pub mod pulse_store;
pub mod queries;

use std::ops::Deref;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::pulse::entities::Pulse;

use entities::{
    EntityMinutes, FlowSegment, NamedMinutes, PageOptions, ProjectCategoryMinutes, ProjectPage,
    TimeOverview, UserAgentActivity,
};

/// Interface for abstracting storage of pulses. Ranges are half-open, `start <= time < end`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PulseRepository: Send + Sync {
    /// Project of the most recent pulse that had one.
    async fn latest_project(&self) -> Result<Option<String>>;

    /// Stores a pulse unless one with the same hash is already stored.
    async fn create_pulse(&self, pulse: Pulse) -> Result<()>;

    /// Stores pulses in a single operation, skipping hashes that are already stored.
    async fn create_pulses(&self, pulses: Vec<Pulse>) -> Result<()>;

    async fn category_time_overview(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeOverview>>;

    async fn range_minutes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64>;

    /// Largest amount of minutes spent during one calendar day of the range.
    async fn longest_day_in_range_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    /// Flow segments ordered by their start.
    async fn deep_work(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<FlowSegment>>;

    async fn unique_user_agents_and_last_active(&self) -> Result<Vec<UserAgentActivity>>;

    async fn sources_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>>;

    /// Counts of two-minute activity windows per tracked site, zero counts included.
    async fn sites_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>>;

    async fn time_by_project_category_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ProjectCategoryMinutes>>;

    async fn time_by_project_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>>;

    async fn time_by_entity_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EntityMinutes>>;

    async fn time_by_category_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeOverview>>;

    async fn per_project_overview_by_category(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: String,
        options: PageOptions,
    ) -> Result<ProjectPage>;

    async fn all_pulses(&self) -> Result<Vec<Pulse>>;
}

#[async_trait]
impl<T> PulseRepository for T
where
    T: Deref + Send + Sync,
    T::Target: PulseRepository,
{
    async fn latest_project(&self) -> Result<Option<String>> {
        self.deref().latest_project().await
    }

    async fn create_pulse(&self, pulse: Pulse) -> Result<()> {
        self.deref().create_pulse(pulse).await
    }

    async fn create_pulses(&self, pulses: Vec<Pulse>) -> Result<()> {
        self.deref().create_pulses(pulses).await
    }

    async fn category_time_overview(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeOverview>> {
        self.deref().category_time_overview(start, end).await
    }

    async fn range_minutes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        self.deref().range_minutes(start, end).await
    }

    async fn longest_day_in_range_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        self.deref().longest_day_in_range_minutes(start, end).await
    }

    async fn deep_work(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlowSegment>> {
        self.deref().deep_work(start, end).await
    }

    async fn unique_user_agents_and_last_active(&self) -> Result<Vec<UserAgentActivity>> {
        self.deref().unique_user_agents_and_last_active().await
    }

    async fn sources_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>> {
        self.deref().sources_minutes(start, end).await
    }

    async fn sites_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>> {
        self.deref().sites_minutes(start, end).await
    }

    async fn time_by_project_category_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ProjectCategoryMinutes>> {
        self.deref()
            .time_by_project_category_and_range(start, end)
            .await
    }

    async fn time_by_project_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>> {
        self.deref().time_by_project_and_range(start, end).await
    }

    async fn time_by_entity_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EntityMinutes>> {
        self.deref().time_by_entity_and_range(start, end).await
    }

    async fn time_by_category_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeOverview>> {
        self.deref().time_by_category_and_range(start, end).await
    }

    async fn per_project_overview_by_category(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: String,
        options: PageOptions,
    ) -> Result<ProjectPage> {
        self.deref()
            .per_project_overview_by_category(start, end, category, options)
            .await
    }

    async fn all_pulses(&self) -> Result<Vec<Pulse>> {
        self.deref().all_pulses().await
    }
}
