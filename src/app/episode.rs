use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local};

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_clock(offset: Duration) -> String {
    let total = offset.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub(crate) fn format_resume_column(offset: Duration) -> String {
    if offset.is_zero() {
        "-".to_string()
    } else {
        format_clock(offset)
    }
}

pub(crate) fn format_published(published: Option<&DateTime<FixedOffset>>) -> String {
    published
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub(crate) fn format_last_seen_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}

/// Episode titles for a spoken list, newest first.
pub(crate) fn latest_titles(titles: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    titles.take(limit).collect()
}
