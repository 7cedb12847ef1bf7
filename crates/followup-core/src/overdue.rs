use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::event::{FollowUpEvent, FollowUpStatus};
use crate::timestamp::ScheduledEvent;

pub fn needs_overdue_transition(entry: &ScheduledEvent<'_>, now: DateTime<Utc>) -> bool {
    entry.at < now
        && !matches!(
            entry.event.follow_up_status,
            FollowUpStatus::Overdue | FollowUpStatus::Completed
        )
}

/// Returns the events a sweep at `now` has to flip to `overdue`, each id at most once.
///
/// Already-overdue and completed events never come back, so running the sweep
/// again over its own output is a no-op.
#[instrument(skip(entries), fields(total = entries.len()))]
pub fn detect_overdue<'a>(entries: &[ScheduledEvent<'a>], now: DateTime<Utc>) -> Vec<&'a FollowUpEvent> {
    let mut seen = HashSet::new();
    let flagged: Vec<&'a FollowUpEvent> = entries
        .iter()
        .filter(|entry| needs_overdue_transition(entry, now))
        .filter(|entry| seen.insert(entry.event.id.clone()))
        .map(|entry| entry.event)
        .collect();

    debug!(flagged = flagged.len(), %now, "overdue sweep evaluated");
    flagged
}
