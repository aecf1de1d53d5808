use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{
    error::{ActivityError, ActivityResult},
    storage::PulseRepository,
};

use super::{
    dedup::filter_unique_by_hash, entities::PulseSubmission, normalizer::PulseNormalizer,
};

/// Bridges client submissions and the [PulseRepository].
///
/// Reading the latest project and writing the pulses are two separate repository calls, so two
/// concurrent ingestions can backfill from a project that is already stale. For a single local
/// user that's accepted. If it ever matters, both calls belong in one storage transaction.
pub struct IngestionPipeline<R> {
    repository: R,
    normalizer: PulseNormalizer,
}

impl<R: PulseRepository> IngestionPipeline<R> {
    pub fn new(repository: R, normalizer: PulseNormalizer) -> Self {
        Self {
            repository,
            normalizer,
        }
    }

    /// Stores a single pulse. Returns the number of acknowledged pulses, always 1.
    #[instrument(skip_all, fields(entity = %submission.entity))]
    pub async fn ingest_one(&self, submission: PulseSubmission) -> ActivityResult<usize> {
        let latest_project = self.repository.latest_project().await?;
        let pulse = self
            .normalizer
            .normalize(submission, latest_project.as_deref())?;
        debug!("Normalized pulse {}", pulse.hash);
        self.repository.create_pulse(pulse).await?;
        Ok(1)
    }

    /// Stores a batch with a single repository write.
    ///
    /// Returns the amount of submitted pulses, not the amount left after dedup. Clients expect
    /// their batch size echoed back.
    #[instrument(skip_all, fields(submitted = submissions.len()))]
    pub async fn ingest_batch(&self, submissions: Vec<PulseSubmission>) -> ActivityResult<usize> {
        if submissions.is_empty() {
            return Err(ActivityError::invalid("pulse batch is empty"));
        }
        let submitted = submissions.len();

        let latest_project = self.repository.latest_project().await?;
        let pulses = submissions
            .into_iter()
            .map(|submission| {
                self.normalizer
                    .normalize(submission, latest_project.as_deref())
            })
            .collect::<ActivityResult<Vec<_>>>()?;

        let unique = filter_unique_by_hash(pulses);
        debug!(
            "Dropped {} duplicates inside the batch",
            submitted - unique.len()
        );
        let stored = unique.len();
        self.repository.create_pulses(unique).await?;
        info!("Persisted batch of {stored} pulses");

        Ok(submitted)
    }

    /// Accepts a raw JSON payload. Anything but a non-empty array of submissions is rejected.
    pub async fn ingest_batch_json(&self, payload: Value) -> ActivityResult<usize> {
        let Value::Array(items) = payload else {
            return Err(ActivityError::invalid("pulses must be an array"));
        };
        let submissions = items
            .into_iter()
            .map(serde_json::from_value::<PulseSubmission>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ActivityError::invalid(format!("malformed pulse: {e}")))?;
        self.ingest_batch(submissions).await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::{
        error::ActivityError,
        pulse::{
            entities::{PulseSubmission, PulseType},
            normalizer::{HostEnvironment, PulseNormalizer, PROJECT_PLACEHOLDER},
        },
        storage::MockPulseRepository,
        utils::{clock::FixedClock, logging::TEST_LOGGING},
    };

    use super::IngestionPipeline;

    fn pipeline(repository: MockPulseRepository) -> IngestionPipeline<MockPulseRepository> {
        let normalizer = PulseNormalizer::new(
            HostEnvironment {
                language: "en-US".into(),
                operating_system: "linux".into(),
                machine: "test".into(),
                user_agent: "test".into(),
            },
            Box::new(FixedClock(Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap())),
        );
        IngestionPipeline::new(repository, normalizer)
    }

    fn submission(entity: &str, time: f64) -> PulseSubmission {
        PulseSubmission {
            entity: entity.into(),
            pulse_type: PulseType::Code,
            project: Some(PROJECT_PLACEHOLDER.into()),
            time,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() -> Result<()> {
        *TEST_LOGGING;
        // No expectations, any repository call fails the test.
        let pipeline = pipeline(MockPulseRepository::new());
        let result = pipeline.ingest_batch(vec![]).await;
        assert!(matches!(result, Err(ActivityError::InvalidInput(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_array_payload_is_rejected() -> Result<()> {
        let pipeline = pipeline(MockPulseRepository::new());
        let result = pipeline
            .ingest_batch_json(json!({"entity": "a.rs", "time": 1.0}))
            .await;
        assert!(matches!(result, Err(ActivityError::InvalidInput(_))));

        let result = pipeline.ingest_batch_json(json!([{"time": 1.0}])).await;
        assert!(matches!(result, Err(ActivityError::InvalidInput(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_distinct_batch_is_persisted_in_one_write() -> Result<()> {
        let mut repository = MockPulseRepository::new();
        repository
            .expect_latest_project()
            .times(1)
            .returning(|| Ok(Some("pulsemeter".into())));
        repository
            .expect_create_pulses()
            .times(1)
            .withf(|pulses| {
                pulses.len() == 3
                    && pulses
                        .iter()
                        .all(|v| v.project.as_deref() == Some("pulsemeter"))
            })
            .returning(|_| Ok(()));

        let count = pipeline(repository)
            .ingest_batch(vec![
                submission("a.rs", 1_720_000_000.),
                submission("b.rs", 1_720_000_000.),
                submission("a.rs", 1_720_000_060.),
            ])
            .await?;
        assert_eq!(count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped_but_echoed() -> Result<()> {
        let mut repository = MockPulseRepository::new();
        repository.expect_latest_project().returning(|| Ok(None));
        repository
            .expect_create_pulses()
            .times(1)
            .withf(|pulses| {
                pulses.iter().map(|v| v.entity.as_str()).collect::<Vec<_>>() == ["a.rs", "b.rs"]
            })
            .returning(|_| Ok(()));

        let count = pipeline(repository)
            .ingest_batch_json(json!([
                {"entity": "a.rs", "type": "code", "time": 1_720_000_000.0},
                {"entity": "b.rs", "type": "code", "time": 1_720_000_000.0},
                {"entity": "a.rs", "type": "code", "time": 1_720_000_000.0, "is_write": true},
            ]))
            .await?;
        assert_eq!(count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_one() -> Result<()> {
        let mut repository = MockPulseRepository::new();
        repository
            .expect_latest_project()
            .times(1)
            .returning(|| Ok(Some("previous".into())));
        repository
            .expect_create_pulse()
            .times(1)
            .withf(|pulse| pulse.project.as_deref() == Some("previous") && pulse.id.is_none())
            .returning(|_| Ok(()));

        let count = pipeline(repository)
            .ingest_one(submission("a.rs", 1_720_000_000.))
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() -> Result<()> {
        let mut repository = MockPulseRepository::new();
        repository.expect_latest_project().returning(|| Ok(None));
        repository
            .expect_create_pulses()
            .returning(|_| Err(anyhow!("disk full")));

        let result = pipeline(repository)
            .ingest_batch(vec![submission("a.rs", 1_720_000_000.)])
            .await;
        assert!(matches!(result, Err(ActivityError::Storage(_))));
        Ok(())
    }
}
