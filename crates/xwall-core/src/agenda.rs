//! Static agenda rows and their status relative to the venue clock.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Minutes the final session is assumed to last.
const LAST_SESSION_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaRow {
    /// Start time, `HH:MM` on the venue clock.
    pub time: String,
    pub title: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgendaStatus {
    Past,
    Active,
    Upcoming,
}

/// Minutes since midnight for an `HH:MM` string.
#[must_use]
pub fn start_minutes(time: &str) -> Option<u32> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .ok()
        .map(|t| t.hour() * 60 + t.minute())
}

/// Minutes since midnight on the venue clock.
#[must_use]
pub fn venue_minutes(now: DateTime<Utc>, utc_offset_minutes: i32) -> u32 {
    let offset =
        FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
    let local = now.with_timezone(&offset);
    local.hour() * 60 + local.minute()
}

/// Classify every row: a row is active from its start until the next row
/// starts (the last row runs for an hour), past afterwards.
///
/// Rows with an unparseable time are reported as upcoming.
#[must_use]
pub fn classify(rows: &[AgendaRow], now_minutes: u32) -> Vec<AgendaStatus> {
    let starts: Vec<Option<u32>> = rows.iter().map(|row| start_minutes(&row.time)).collect();

    starts
        .iter()
        .enumerate()
        .map(|(index, start)| {
            let Some(start) = *start else {
                return AgendaStatus::Upcoming;
            };
            let end = starts
                .get(index + 1)
                .copied()
                .flatten()
                .unwrap_or(start + LAST_SESSION_MINUTES);

            if now_minutes >= end {
                AgendaStatus::Past
            } else if now_minutes >= start {
                AgendaStatus::Active
            } else {
                AgendaStatus::Upcoming
            }
        })
        .collect()
}
