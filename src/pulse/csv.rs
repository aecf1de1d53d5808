use chrono::SecondsFormat;

use super::entities::Pulse;

pub const CSV_HEADER: [&str; 19] = [
    "ID",
    "User ID",
    "Entity",
    "Type",
    "Category",
    "Project",
    "Branch",
    "Language",
    "Is Write",
    "Editor",
    "Operating System",
    "Machine",
    "User Agent",
    "Time",
    "Hash",
    "Origin",
    "Origin ID",
    "Created At",
    "Description",
];

/// Renders pulses as CSV with a fixed column order. Missing values become empty cells.
pub fn pulses_to_csv(pulses: &[Pulse]) -> String {
    let mut lines = Vec::with_capacity(pulses.len() + 1);
    lines.push(CSV_HEADER.join(","));
    lines.extend(pulses.iter().map(pulse_row));
    lines.join("\n")
}

fn pulse_row(pulse: &Pulse) -> String {
    let values: [Option<String>; 19] = [
        pulse.id.map(|v| v.to_string()),
        Some(pulse.user_id.clone()),
        Some(pulse.entity.clone()),
        Some(pulse.pulse_type.to_string()),
        Some(pulse.category.clone()),
        pulse.project.clone(),
        pulse.branch.clone(),
        Some(pulse.language.clone()),
        Some(pulse.is_write.to_string()),
        Some(pulse.editor.clone()),
        Some(pulse.operating_system.clone()),
        Some(pulse.machine.clone()),
        Some(pulse.user_agent.clone()),
        Some(pulse.time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Some(pulse.hash.clone()),
        Some(pulse.origin.clone()),
        Some(pulse.origin_id.clone()),
        Some(pulse.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        pulse.description.clone(),
    ];
    values
        .iter()
        .map(|v| escape(v.as_deref().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
