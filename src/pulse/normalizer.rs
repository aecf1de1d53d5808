use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use sysinfo::System;

use crate::{
    error::{ActivityError, ActivityResult},
    utils::clock::Clock,
};

use super::entities::{Pulse, PulseSubmission};

/// Project name editor plugins send when they couldn't detect one.
pub const PROJECT_PLACEHOLDER: &str = "<<PROJECT>>";

/// Single-user deployments attribute every pulse to this user.
pub const LOCAL_USER_ID: &str = "local";

const HASH_FIELD_SEPARATOR: char = '\u{1f}';

/// Values used for fields the client left out. They describe the machine the pulses are
/// ingested on, so an embedding application may supply its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    pub language: String,
    pub operating_system: String,
    pub machine: String,
    pub user_agent: String,
}

impl HostEnvironment {
    pub fn detect() -> Self {
        let operating_system = std::env::consts::OS.to_string();
        let release = System::kernel_version().unwrap_or_else(|| "unknown".into());
        Self {
            language: locale_from_env(),
            machine: System::host_name().unwrap_or_else(|| "localhost".into()),
            user_agent: format!(
                "{}/{} ({}; {}) OS/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                operating_system,
                std::env::consts::ARCH,
                release
            ),
            operating_system,
        }
    }
}

/// Turns `en_US.UTF-8` style values of the usual locale variables into `en-US`.
fn locale_from_env() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|v| !v.is_empty() && v != "C" && v != "POSIX")
        .and_then(|v| v.split('.').next().map(|v| v.replace('_', "-")))
        .unwrap_or_else(|| "en-US".into())
}

/// Converts client submissions into canonical [Pulse] values. Doesn't perform any I/O.
pub struct PulseNormalizer {
    environment: HostEnvironment,
    clock: Box<dyn Clock>,
}

impl PulseNormalizer {
    pub fn new(environment: HostEnvironment, clock: Box<dyn Clock>) -> Self {
        Self { environment, clock }
    }

    pub fn normalize(
        &self,
        submission: PulseSubmission,
        latest_project: Option<&str>,
    ) -> ActivityResult<Pulse> {
        let time = submission_time(submission.time)?;
        let hash = pulse_hash(
            &submission.entity,
            time,
            submission.project.as_deref(),
            submission.branch.as_deref(),
            submission.origin.as_deref(),
            submission.origin_id.as_deref(),
        );

        let project = match (submission.project, latest_project) {
            (None, Some(latest)) => Some(latest.to_string()),
            (Some(project), Some(latest))
                if project.is_empty() || project == PROJECT_PLACEHOLDER =>
            {
                Some(latest.to_string())
            }
            (project, _) => project,
        };

        let environment = &self.environment;
        Ok(Pulse {
            id: None,
            user_id: LOCAL_USER_ID.into(),
            project,
            branch: submission.branch,
            entity: submission.entity,
            pulse_type: submission.pulse_type,
            is_write: submission.is_write.unwrap_or(false),
            editor: submission.editor.unwrap_or_default(),
            language: non_empty_or(submission.language, &environment.language),
            operating_system: non_empty_or(
                submission.operating_system,
                &environment.operating_system,
            ),
            machine: non_empty_or(submission.machine, &environment.machine),
            user_agent: non_empty_or(submission.user_agent, &environment.user_agent),
            time,
            hash,
            origin: submission.origin.unwrap_or_default(),
            origin_id: submission.origin_id.unwrap_or_default(),
            category: submission.category.unwrap_or_default(),
            created_at: self.clock.time(),
            description: None,
        })
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Converts epoch seconds into an instant. The fraction is kept with microsecond precision,
/// which is all an f64 can carry for current timestamps.
pub fn submission_time(seconds: f64) -> ActivityResult<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(ActivityError::invalid(format!("pulse time {seconds} is not a number")));
    }
    let micros = (seconds * 1_000_000.).round() as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| ActivityError::invalid(format!("pulse time {seconds} is out of range")))
}

/// Content fingerprint of a pulse. Two submissions describing the same moment of the same
/// entity collide, which is what storage relies on for idempotent ingestion.
pub fn pulse_hash(
    entity: &str,
    time: DateTime<Utc>,
    project: Option<&str>,
    branch: Option<&str>,
    origin: Option<&str>,
    origin_id: Option<&str>,
) -> String {
    let time = time.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let fields = [
        entity,
        time.as_str(),
        project.unwrap_or_default(),
        branch.unwrap_or_default(),
        origin.unwrap_or_default(),
        origin_id.unwrap_or_default(),
    ];

    let mut hasher = Sha256::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            hasher.update(HASH_FIELD_SEPARATOR.to_string().as_bytes());
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Timelike, Utc};

    use crate::{
        error::ActivityError,
        pulse::entities::{PulseSubmission, PulseType},
        utils::clock::FixedClock,
    };

    use super::{pulse_hash, HostEnvironment, PulseNormalizer, PROJECT_PLACEHOLDER};

    const TEST_TIME: f64 = 1_720_000_000.;

    fn test_environment() -> HostEnvironment {
        HostEnvironment {
            language: "en-GB".into(),
            operating_system: "linux".into(),
            machine: "workstation".into(),
            user_agent: "pulsemeter/test".into(),
        }
    }

    fn test_normalizer() -> PulseNormalizer {
        PulseNormalizer::new(
            test_environment(),
            Box::new(FixedClock(Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap())),
        )
    }

    fn submission(entity: &str) -> PulseSubmission {
        PulseSubmission {
            project: Some("pulsemeter".into()),
            branch: Some("main".into()),
            entity: entity.into(),
            pulse_type: PulseType::Code,
            time: TEST_TIME,
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_deterministic() -> Result<()> {
        let normalizer = test_normalizer();
        let a = normalizer.normalize(submission("src/lib.rs"), None)?;
        let mut other = submission("src/lib.rs");
        other.editor = Some("vim".into());
        other.is_write = Some(true);
        let b = normalizer.normalize(other, Some("elsewhere"))?;
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        Ok(())
    }

    #[test]
    fn test_hash_differs_per_identity_field() {
        let time = Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap();
        let base = pulse_hash("a.rs", time, Some("p"), Some("b"), Some("o"), Some("1"));
        let variants = [
            pulse_hash("b.rs", time, Some("p"), Some("b"), Some("o"), Some("1")),
            pulse_hash(
                "a.rs",
                time + chrono::Duration::milliseconds(1),
                Some("p"),
                Some("b"),
                Some("o"),
                Some("1"),
            ),
            pulse_hash("a.rs", time, Some("q"), Some("b"), Some("o"), Some("1")),
            pulse_hash("a.rs", time, Some("p"), Some("c"), Some("o"), Some("1")),
            pulse_hash("a.rs", time, Some("p"), Some("b"), Some("x"), Some("1")),
            pulse_hash("a.rs", time, Some("p"), Some("b"), Some("o"), Some("2")),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
        // Field boundaries matter, not just the concatenated text.
        assert_ne!(
            pulse_hash("ab", time, Some("c"), None, None, None),
            pulse_hash("a", time, Some("bc"), None, None, None)
        );
    }

    #[test]
    fn test_placeholder_project_is_backfilled() -> Result<()> {
        let normalizer = test_normalizer();

        let mut placeholder = submission("a.rs");
        placeholder.project = Some(PROJECT_PLACEHOLDER.into());
        let pulse = normalizer.normalize(placeholder, Some("latest"))?;
        assert_eq!(pulse.project.as_deref(), Some("latest"));

        let mut missing = submission("a.rs");
        missing.project = None;
        let pulse = normalizer.normalize(missing.clone(), Some("latest"))?;
        assert_eq!(pulse.project.as_deref(), Some("latest"));

        let pulse = normalizer.normalize(missing, None)?;
        assert_eq!(pulse.project, None);

        let pulse = normalizer.normalize(submission("a.rs"), Some("latest"))?;
        assert_eq!(pulse.project.as_deref(), Some("pulsemeter"));
        Ok(())
    }

    #[test]
    fn test_empty_project_is_backfilled() -> Result<()> {
        let normalizer = test_normalizer();

        let mut empty = submission("a.rs");
        empty.project = Some(String::new());
        let pulse = normalizer.normalize(empty.clone(), Some("latest"))?;
        assert_eq!(pulse.project.as_deref(), Some("latest"));

        let mut missing = submission("a.rs");
        missing.project = None;
        assert_eq!(
            pulse.hash,
            normalizer.normalize(missing, Some("latest"))?.hash
        );

        let pulse = normalizer.normalize(empty, None)?;
        assert_eq!(pulse.project.as_deref(), Some(""));
        Ok(())
    }

    #[test]
    fn test_defaults_are_filled() -> Result<()> {
        let pulse = test_normalizer().normalize(submission("a.rs"), None)?;
        assert_eq!(pulse.user_id, "local");
        assert_eq!(pulse.language, "en-GB");
        assert_eq!(pulse.operating_system, "linux");
        assert_eq!(pulse.machine, "workstation");
        assert_eq!(pulse.user_agent, "pulsemeter/test");
        assert_eq!(pulse.editor, "");
        assert_eq!(pulse.category, "");
        assert!(!pulse.is_write);
        assert_eq!(pulse.created_at, Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap());
        Ok(())
    }

    #[test]
    fn test_submitted_values_win() -> Result<()> {
        let mut value = submission("a.rs");
        value.language = Some("Rust".into());
        value.user_agent = Some("wakatime/v1 vscode/1.90".into());
        value.category = Some("debugging".into());
        let pulse = test_normalizer().normalize(value, None)?;
        assert_eq!(pulse.language, "Rust");
        assert_eq!(pulse.user_agent, "wakatime/v1 vscode/1.90");
        assert_eq!(pulse.category, "debugging");
        Ok(())
    }

    #[test]
    fn test_fractional_seconds_are_kept() -> Result<()> {
        let mut value = submission("a.rs");
        value.time = 1_720_000_000.25;
        let pulse = test_normalizer().normalize(value, None)?;
        assert_eq!(pulse.time.timestamp(), 1_720_000_000);
        assert_eq!(pulse.time.nanosecond(), 250_000_000);
        Ok(())
    }

    #[test]
    fn test_fraction_is_rounded_to_microseconds() -> Result<()> {
        let mut value = submission("a.rs");
        value.time = 1_720_000_000.1234567;
        let pulse = test_normalizer().normalize(value, None)?;
        assert_eq!(pulse.time.timestamp(), 1_720_000_000);
        assert_eq!(pulse.time.nanosecond(), 123_457_000);
        Ok(())
    }

    #[test]
    fn test_invalid_time() {
        let mut value = submission("a.rs");
        value.time = f64::NAN;
        assert!(matches!(
            test_normalizer().normalize(value, None),
            Err(ActivityError::InvalidInput(_))
        ));
    }
}
