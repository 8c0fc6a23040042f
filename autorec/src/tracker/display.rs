//! Read-only projection of tracking state for display.
//!
//! Buckets every tracked target into Live / Upcoming / Offline and sorts
//! each bucket by urgency. The projector derives times from the task
//! stores and copies everything it needs under the registry read lock, so
//! observers never hold up the engine.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::tracker::registry::Registry;
use crate::tracker::tasks::{SaveTasks, SnipeTasks};

/// One formatted line of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub status: String,
    pub name: String,
    pub link: String,
}

/// Tracking state bucketed by urgency.
#[derive(Debug, Default, Clone)]
pub struct DisplayTable {
    pub live: Vec<DisplayRow>,
    pub upcoming: Vec<DisplayRow>,
    pub offline: Vec<DisplayRow>,
}

impl DisplayTable {
    /// Render the table as aligned text, one bucket per block.
    pub fn render(&self) -> String {
        let width = self
            .live
            .iter()
            .chain(&self.upcoming)
            .chain(&self.offline)
            .map(|row| row.status.len())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for (i, bucket) in [&self.live, &self.upcoming, &self.offline]
            .into_iter()
            .filter(|b| !b.is_empty())
            .enumerate()
        {
            if i > 0 {
                out.push('\n');
            }
            for row in bucket {
                let _ = writeln!(out, "{:width$}    {}", row.status, row.name);
            }
        }
        out
    }
}

struct Entry {
    name: String,
    link: String,
    started_at: Option<DateTime<Utc>>,
    upcoming_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Build the display table. `grace` extends the Upcoming window past the
/// scheduled time while a snipe is still probing.
pub(crate) fn project(
    registry: &Registry,
    snipes: &SnipeTasks,
    saves: &SaveTasks,
    grace: Duration,
    now: DateTime<Utc>,
) -> DisplayTable {
    let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());

    let mut live = Vec::new();
    let mut upcoming = Vec::new();
    let mut offline = Vec::new();

    for tracked in registry.snapshot() {
        let link = tracked.link().to_string();
        let entry = Entry {
            name: tracked.display().to_string(),
            started_at: saves.started_at(&link),
            upcoming_at: snipes.soonest_for(&link),
            finished_at: tracked.finished_at(),
            link,
        };
        if entry.name.is_empty() || entry.link.is_empty() {
            continue;
        }

        let is_live = match (entry.started_at, entry.finished_at) {
            (Some(started), Some(finished)) => finished < started,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if is_live {
            live.push(entry);
        } else if entry.upcoming_at.is_some_and(|at| now < at + grace) {
            upcoming.push(entry);
        } else {
            offline.push(entry);
        }
    }

    // Urgency: most recently started first, ties by link.
    live.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.link.cmp(&b.link)));
    // Soonest scheduled first.
    upcoming.sort_by(|a, b| a.upcoming_at.cmp(&b.upcoming_at).then_with(|| a.link.cmp(&b.link)));
    // Most recently finished first; never-finished targets sink.
    offline.sort_by(|a, b| b.finished_at.cmp(&a.finished_at).then_with(|| a.link.cmp(&b.link)));

    DisplayTable {
        live: live.iter().map(|e| e.row(live_status(e, now))).collect(),
        upcoming: upcoming
            .iter()
            .map(|e| e.row(upcoming_status(e, now)))
            .collect(),
        offline: offline.iter().map(|e| e.row("Offline".to_string())).collect(),
    }
}

impl Entry {
    fn row(&self, status: String) -> DisplayRow {
        DisplayRow {
            status,
            name: self.name.clone(),
            link: self.link.clone(),
        }
    }
}

fn live_status(entry: &Entry, now: DateTime<Utc>) -> String {
    let Some(started) = entry.started_at else {
        return "Now".to_string();
    };
    // Round the elapsed time into 5-minute buckets; fresher precision is
    // noise on a dashboard.
    let secs = (now - started).num_seconds().max(0);
    let bucket = secs - secs % 300;
    if bucket > 1 {
        format!("Now ({})", trim_zero_seconds(&format_duration(bucket)))
    } else {
        "Now".to_string()
    }
}

fn upcoming_status(entry: &Entry, now: DateTime<Utc>) -> String {
    let Some(at) = entry.upcoming_at else {
        return "Soon".to_string();
    };
    let secs = (at - now).num_seconds();
    if secs > 1 {
        format!("Soon ({})", format_duration(secs))
    } else {
        "Soon".to_string()
    }
}

/// Format whole seconds as `2h45m10s`, omitting leading zero units.
fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// Drop a trailing `0s` from a multi-unit duration: `15m0s` → `15m`.
fn trim_zero_seconds(s: &str) -> String {
    match s.strip_suffix("0s") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => s.to_string(),
    }
}
