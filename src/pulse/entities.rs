use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of resource a pulse was observed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PulseType {
    #[default]
    Code,
    Web,
    Other(String),
}

impl From<String> for PulseType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "code" => PulseType::Code,
            "web" => PulseType::Web,
            _ => PulseType::Other(value),
        }
    }
}

impl From<PulseType> for String {
    fn from(value: PulseType) -> Self {
        value.to_string()
    }
}

impl Display for PulseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PulseType::Code => write!(f, "code"),
            PulseType::Web => write!(f, "web"),
            PulseType::Other(v) => write!(f, "{v}"),
        }
    }
}

/// A heartbeat as clients submit it. Field names follow the wire format editor plugins already
/// speak, `time` is seconds since the epoch and may carry a fraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseSubmission {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    pub entity: String,
    #[serde(rename = "type", default)]
    pub pulse_type: PulseType,
    #[serde(default)]
    pub is_write: Option<bool>,
    #[serde(default)]
    pub editor: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub time: f64,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// One observed moment of activity. Pulses are never changed after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    /// Assigned by storage.
    #[serde(default)]
    pub id: Option<u64>,
    pub user_id: String,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub entity: String,
    #[serde(rename = "type")]
    pub pulse_type: PulseType,
    pub is_write: bool,
    pub editor: String,
    pub language: String,
    pub operating_system: String,
    pub machine: String,
    pub user_agent: String,
    pub time: DateTime<Utc>,
    pub hash: String,
    pub origin: String,
    pub origin_id: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{PulseSubmission, PulseType};

    #[test]
    fn test_submission_from_wire() -> Result<()> {
        let submission: PulseSubmission = serde_json::from_str(
            r#"{"entity": "src/main.rs", "type": "file", "time": 1720000000.25, "is_write": true}"#,
        )?;
        assert_eq!(submission.pulse_type, PulseType::Other("file".into()));
        assert_eq!(submission.is_write, Some(true));
        assert_eq!(submission.project, None);
        assert_eq!(submission.time, 1720000000.25);
        Ok(())
    }

    #[test]
    fn test_pulse_type_names() -> Result<()> {
        assert_eq!(serde_json::to_string(&PulseType::Web)?, "\"web\"");
        assert_eq!(serde_json::from_str::<PulseType>("\"code\"")?, PulseType::Code);
        Ok(())
    }
}
