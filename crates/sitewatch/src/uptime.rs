//! Fixed-length daily uptime timeline.

use crate::types::{Audit, is_healthy_status};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Number of days in a timeline, today included
pub const HISTORY_DAYS: usize = 60;

/// Classification of one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayState {
    Up,
    Down,
    /// No audit that day; not a failure
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UptimeDay {
    pub date: NaiveDate,
    pub state: DayState,
    pub status_code: Option<u16>,
}

/// Build the 60-day timeline, oldest first, ending on `now`'s UTC date.
///
/// Each day is represented by its most recent audit. Input order does not
/// matter.
pub fn build_history(audits: &[Audit], now: DateTime<Utc>) -> Vec<UptimeDay> {
    let mut latest_per_day: HashMap<NaiveDate, &Audit> = HashMap::new();
    for audit in audits {
        latest_per_day
            .entry(audit.created_at.date_naive())
            .and_modify(|current| {
                if audit.recency_key() > current.recency_key() {
                    *current = audit;
                }
            })
            .or_insert(audit);
    }

    let today = now.date_naive();
    (0..HISTORY_DAYS as u64)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .map(|date| match latest_per_day.get(&date) {
            Some(audit) => UptimeDay {
                date,
                state: if is_healthy_status(audit.status_code) {
                    DayState::Up
                } else {
                    DayState::Down
                },
                status_code: Some(audit.status_code),
            },
            None => UptimeDay {
                date,
                state: DayState::Empty,
                status_code: None,
            },
        })
        .collect()
}

/// Share of non-empty days that were up, `None` without data
pub fn uptime_ratio(history: &[UptimeDay]) -> Option<f64> {
    let observed = history.iter().filter(|d| d.state != DayState::Empty).count();
    let up = history.iter().filter(|d| d.state == DayState::Up).count();
    (observed > 0).then(|| up as f64 / observed as f64)
}
