use chrono::{DateTime, Utc};

use crate::event::FollowUpStatus;
use crate::timestamp::ScheduledEvent;

/// Follow-ups at or after `now`, soonest first. Completed entries are kept on purpose.
#[tracing::instrument(skip(entries), fields(total = entries.len()))]
pub fn upcoming<'a>(entries: &[ScheduledEvent<'a>], now: DateTime<Utc>) -> Vec<ScheduledEvent<'a>> {
    let mut out: Vec<ScheduledEvent<'a>> = entries.iter().filter(|entry| entry.at >= now).cloned().collect();
    out.sort_by_key(|entry| entry.at);
    tracing::debug!(count = out.len(), "ordered upcoming follow-ups");
    out
}

/// Follow-ups before `now` that are still open, oldest first.
#[tracing::instrument(skip(entries), fields(total = entries.len()))]
pub fn overdue<'a>(entries: &[ScheduledEvent<'a>], now: DateTime<Utc>) -> Vec<ScheduledEvent<'a>> {
    let mut out: Vec<ScheduledEvent<'a>> = entries
        .iter()
        .filter(|entry| entry.at < now && entry.event.follow_up_status != FollowUpStatus::Completed)
        .cloned()
        .collect();
    out.sort_by_key(|entry| entry.at);
    tracing::debug!(count = out.len(), "ordered overdue follow-ups");
    out
}
