use std::{
    collections::{BTreeMap, HashSet},
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone, Utc};
use fs4::tokio::AsyncFileExt;
use futures::{stream, Stream, StreamExt, TryStreamExt};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};
use tracing::{debug, error, info, warn};

use crate::{pulse::entities::Pulse, utils::time::date_to_record_name};

use super::{
    entities::{
        EntityMinutes, FlowSegment, NamedMinutes, PageOptions, ProjectCategoryMinutes,
        ProjectPage, TimeOverview, UserAgentActivity,
    },
    queries, PulseRepository,
};

/// Amount of most recent record files searched for the latest project.
const LATEST_PROJECT_DAYS: usize = 7;

/// Holds the next id to hand out. Its exclusive lock is what serializes writers, so ids stay
/// unique across processes sharing the record directory.
const ID_COUNTER_FILE: &str = "next_id";

/// The local realization of [PulseRepository]. Pulses live in one file per UTC day.
pub struct PulseStoreImpl<Tz: TimeZone = Local> {
    record_dir: PathBuf,
    /// Zone calendar days are counted in, for the longest day.
    timezone: Tz,
    /// File locks don't exclude handles of the same process from each other.
    write_lock: Mutex<()>,
}

/// Parses JSON lines, skipping anything a write cut short by a crash left behind.
fn parse_lines(bytes: &[u8], path: &Path) -> Vec<Pulse> {
    bytes
        .split(|v| *v == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_slice::<Pulse>(line) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Skipping illegal record line in {:?}: {e}", path);
                None
            }
        })
        .collect()
}

impl<Tz: TimeZone> PulseStoreImpl<Tz> {
    pub fn new(record_dir: PathBuf, timezone: Tz) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self {
            record_dir,
            timezone,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    async fn read_day(&self, date: NaiveDate) -> Result<Vec<Pulse>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<Pulse>, std::io::Error> {
            debug!("Extracting {path:?}");
            let mut file = File::open(path).await?;
            file.lock_shared()?;
            let mut bytes = vec![];
            let read = file.read_to_end(&mut bytes).await;
            file.unlock_async().await?;
            read?;

            Ok(parse_lines(&bytes, path))
        }

        match extract(&self.record_path(date)).await {
            Ok(v) => Ok(v),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e)?,
        }
    }

    /// Days that have a record file, oldest first.
    async fn record_days(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = tokio::fs::read_dir(&self.record_dir).await?;
        let mut days = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            match name
                .to_str()
                .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
            {
                Some(day) => days.push(day),
                None => debug!("Ignoring non-record file {name:?}"),
            }
        }
        days.sort();
        Ok(days)
    }

    fn read_days(&self, days: Vec<NaiveDate>) -> impl Stream<Item = Result<Vec<Pulse>>> + '_ {
        stream::iter(days)
            .map(move |day| async move { (day, self.read_day(day).await) })
            .buffered(4)
            .map(|(day, data)| {
                data.inspect_err(|e| error!("Failed to process file {day} {e}"))
            })
    }

    /// Pulses with `start <= time < end`, ordered by time.
    async fn pulses_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Pulse>> {
        if start >= end {
            return Ok(vec![]);
        }
        let last = (end - TimeDelta::nanoseconds(1)).date_naive();
        let days = start
            .date_naive()
            .iter_days()
            .take_while(|day| *day <= last)
            .collect();

        let mut pulses = self.read_days(days).try_concat().await?;
        pulses.retain(|v| start <= v.time && v.time < end);
        pulses.sort_by_key(|v| v.time);
        Ok(pulses)
    }

    /// Next free id according to the records themselves. Used when the counter is missing.
    async fn scan_next_id(&self) -> Result<u64> {
        let days = self.record_days().await?;
        let max = self
            .read_days(days)
            .try_concat()
            .await?
            .iter()
            .filter_map(|v| v.id)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Reads the counter and moves it past `reserved` ids before anything is appended. A crash
    /// mid-write leaves a gap in the ids but never a repeated one.
    async fn reserve_ids(&self, counter: &mut File, reserved: u64) -> Result<u64> {
        let mut raw = String::new();
        counter.read_to_string(&mut raw).await?;
        let first = match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                debug!("Id counter is empty, scanning records");
                self.scan_next_id().await?
            }
        };

        counter.seek(SeekFrom::Start(0)).await?;
        counter.set_len(0).await?;
        counter.write_all((first + reserved).to_string().as_bytes()).await?;
        counter.flush().await?;
        Ok(first)
    }

    async fn write_locked(&self, counter: &mut File, pulses: Vec<Pulse>) -> Result<usize> {
        let mut id = self.reserve_ids(counter, pulses.len() as u64).await?;

        let mut by_day = BTreeMap::<NaiveDate, Vec<Pulse>>::new();
        for pulse in pulses {
            by_day.entry(pulse.time.date_naive()).or_default().push(pulse);
        }

        let mut written = 0;
        for (day, pulses) in by_day {
            written += self.append_day(day, pulses, &mut id).await?;
        }
        Ok(written)
    }

    /// Appends pulses of one day, skipping hashes already in the file. Returns the amount
    /// written.
    async fn append_day(
        &self,
        date: NaiveDate,
        pulses: Vec<Pulse>,
        next_id: &mut u64,
    ) -> Result<usize> {
        let path = self.record_path(date);
        let mut file = File::options()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = Self::append_with_file(&mut file, &path, pulses, next_id).await;
        file.unlock_async().await?;
        result
    }

    async fn append_with_file(
        file: &mut File,
        path: &Path,
        pulses: Vec<Pulse>,
        next_id: &mut u64,
    ) -> Result<usize> {
        let mut existing = vec![];
        file.read_to_end(&mut existing).await?;

        let mut hashes = parse_lines(&existing, path)
            .into_iter()
            .map(|v| v.hash)
            .collect::<HashSet<_>>();

        let mut buffer = Vec::<u8>::new();
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            // Terminate a partial line so the next record starts clean.
            buffer.push(b'\n');
        }

        let mut written = 0;
        for mut pulse in pulses {
            if !hashes.insert(pulse.hash.clone()) {
                debug!("Pulse {} is already stored", pulse.hash);
                continue;
            }
            pulse.id = Some(*next_id);
            *next_id += 1;
            serde_json::to_writer(&mut buffer, &pulse)?;
            buffer.push(b'\n');
            written += 1;
        }

        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl<Tz> PulseRepository for PulseStoreImpl<Tz>
where
    Tz: TimeZone + Send + Sync,
{
    async fn latest_project(&self) -> Result<Option<String>> {
        let days = self.record_days().await?;
        for day in days.into_iter().rev().take(LATEST_PROJECT_DAYS) {
            let latest = self
                .read_day(day)
                .await?
                .into_iter()
                .filter(|v| v.project.is_some())
                .max_by_key(|v| v.time);
            if let Some(pulse) = latest {
                return Ok(pulse.project);
            }
        }
        Ok(None)
    }

    async fn create_pulse(&self, pulse: Pulse) -> Result<()> {
        self.create_pulses(vec![pulse]).await
    }

    async fn create_pulses(&self, pulses: Vec<Pulse>) -> Result<()> {
        if pulses.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut counter = File::options()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.record_dir.join(ID_COUNTER_FILE))
            .await?;

        counter.lock_exclusive()?;
        let result = self.write_locked(&mut counter, pulses).await;
        counter.unlock_async().await?;
        let written = result?;

        info!("Stored {written} new pulses");
        Ok(())
    }

    async fn category_time_overview(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeOverview>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::category_overview(&pulses))
    }

    async fn range_minutes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::distinct_minutes(&pulses))
    }

    async fn longest_day_in_range_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::longest_day_minutes(&pulses, &self.timezone))
    }

    async fn deep_work(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlowSegment>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::flow_segments(&pulses))
    }

    async fn unique_user_agents_and_last_active(&self) -> Result<Vec<UserAgentActivity>> {
        let pulses = self.all_pulses().await?;
        Ok(queries::user_agents_last_active(&pulses))
    }

    async fn sources_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::sources_minutes(&pulses))
    }

    async fn sites_minutes(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::sites_windows(&pulses))
    }

    async fn time_by_project_category_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ProjectCategoryMinutes>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::project_category_minutes(&pulses))
    }

    async fn time_by_project_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NamedMinutes>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::project_minutes(&pulses))
    }

    async fn time_by_entity_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EntityMinutes>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::entity_minutes(&pulses))
    }

    async fn time_by_category_and_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeOverview>> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::category_overview(&pulses))
    }

    async fn per_project_overview_by_category(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category: String,
        options: PageOptions,
    ) -> Result<ProjectPage> {
        let pulses = self.pulses_between(start, end).await?;
        Ok(queries::project_page(&pulses, &category, options))
    }

    async fn all_pulses(&self) -> Result<Vec<Pulse>> {
        let days = self.record_days().await?;
        let pulses = self.read_days(days).try_concat().await?;
        Ok(pulses)
    }
}
