use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minutes spent on one category in a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOverview {
    pub category: String,
    pub minutes: i64,
}

impl TimeOverview {
    pub fn new(category: impl Into<String>, minutes: i64) -> Self {
        Self {
            category: category.into(),
            minutes,
        }
    }
}

/// A run of focused activity. `flow_time` is in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSegment {
    pub flow_start: DateTime<Utc>,
    pub flow_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentActivity {
    pub user_agent: String,
    pub last_active: DateTime<Utc>,
}

/// Minutes keyed by a name: a project, a source or a site depending on the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedMinutes {
    pub name: String,
    pub minutes: i64,
}

impl NamedMinutes {
    pub fn new(name: impl Into<String>, minutes: i64) -> Self {
        Self {
            name: name.into(),
            minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCategoryMinutes {
    pub category: String,
    pub name: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMinutes {
    pub entity: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOptions {
    /// Starts at 1.
    pub page: u32,
    pub take: u32,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self { page: 1, take: 10 }
    }
}

impl PageOptions {
    pub fn skip(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.take as usize
    }
}

/// One page of projects together with the number of projects across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectPage {
    pub projects: Vec<NamedMinutes>,
    pub total: usize,
}
