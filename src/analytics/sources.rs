use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::ActivityResult, storage::PulseRepository};

/// Patterns are matched against the lowercased user agent in order, first match wins, so more
/// specific patterns go first.
const SOURCE_PATTERNS: &[(&str, &str)] = &[
    ("neovim", "neovim"),
    ("nvim", "neovim"),
    ("vim", "vim"),
    ("cursor", "cursor"),
    ("vscode", "vscode"),
    ("visual studio code", "vscode"),
    ("jetbrains", "jetbrains"),
    ("intellij", "jetbrains"),
    ("pycharm", "jetbrains"),
    ("webstorm", "jetbrains"),
    ("sublime", "sublime"),
    ("emacs", "emacs"),
    ("xcode", "xcode"),
    ("zed/", "zed"),
    ("zed-wakatime", "zed"),
    ("edge-wakatime", "edge"),
    ("edg/", "edge"),
    ("brave", "brave"),
    ("chrome", "chrome"),
    ("firefox", "firefox"),
    ("safari", "safari"),
];

/// A classified client a user has been sending pulses from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub last_active: DateTime<Utc>,
}

/// Classifies a user agent into a known source. Unknown clients yield [None].
pub fn resolve_source(user_agent: &str) -> Option<&'static str> {
    let user_agent = user_agent.to_lowercase();
    SOURCE_PATTERNS
        .iter()
        .find(|(pattern, _)| user_agent.contains(pattern))
        .map(|(_, name)| *name)
}

/// Lists every source seen so far with the last time it sent a pulse. Sources are ordered by
/// the first of their user agents in the repository listing.
pub async fn list_sources(repository: &impl PulseRepository) -> ActivityResult<Vec<Source>> {
    let agents = repository.unique_user_agents_and_last_active().await?;

    let mut sources: Vec<Source> = Vec::new();
    for agent in agents {
        let Some(name) = resolve_source(&agent.user_agent) else {
            continue;
        };
        match sources.iter_mut().find(|v| v.name == name) {
            Some(source) if agent.last_active > source.last_active => {
                source.last_active = agent.last_active
            }
            Some(_) => {}
            None => sources.push(Source {
                name: name.to_string(),
                last_active: agent.last_active,
            }),
        }
    }
    Ok(sources)
}
