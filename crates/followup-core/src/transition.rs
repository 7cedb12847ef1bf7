use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use crate::error::{StoreError, StoreResult};
use crate::event::{EventId, FollowUpEvent, FollowUpStatus, StatusUpdate};
use crate::overdue::detect_overdue;
use crate::store::FollowUpStore;
use crate::timestamp::TimestampNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Applied,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub id: EventId,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub transitioned: Vec<EventId>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies status changes to an in-memory snapshot, writing through the store
/// first. An event is only mutated after the store acknowledged its write.
pub struct StatusTransitioner<'s, S: FollowUpStore + ?Sized> {
    store: &'s S,
    normalizer: TimestampNormalizer,
}

impl<'s, S: FollowUpStore + ?Sized> StatusTransitioner<'s, S> {
    pub fn new(store: &'s S, normalizer: TimestampNormalizer) -> Self {
        Self { store, normalizer }
    }

    /// Every in-memory copy carrying `id` that is still open is updated once
    /// the store acknowledged the write.
    #[instrument(skip(self, events, id, now), fields(id = %id))]
    pub fn mark_completed(
        &self,
        events: &mut [FollowUpEvent],
        id: &EventId,
        now: DateTime<Utc>,
    ) -> StoreResult<Ack> {
        let mut copies = events.iter().filter(|event| &event.id == id).peekable();
        if copies.peek().is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        if !copies.any(|event| event.follow_up_status.can_transition_to(FollowUpStatus::Completed)) {
            debug!("follow-up already completed");
            return Ok(Ack::Unchanged);
        }

        let update = StatusUpdate::completed(now);
        if let Err(err) = self.store.update_status(id, &update) {
            error!(error = %err, "failed to persist completion");
            return Err(err);
        }

        for event in events.iter_mut().filter(|event| {
            &event.id == id && event.follow_up_status.can_transition_to(FollowUpStatus::Completed)
        }) {
            event.apply_update(&update);
        }
        info!("follow-up marked completed");
        Ok(Ack::Applied)
    }

    /// Runs the overdue sweep and persists each flagged event on its own;
    /// one failed write never blocks or rolls back the others.
    #[instrument(skip(self, events, now), fields(total = events.len(), now = %now))]
    pub fn apply_overdue(&self, events: &mut [FollowUpEvent], now: DateTime<Utc>) -> SweepReport {
        let flagged: Vec<EventId> = {
            let entries = self.normalizer.collect_scheduled(events);
            detect_overdue(&entries, now)
                .into_iter()
                .map(|event| event.id.clone())
                .collect()
        };

        let mut report = SweepReport::default();
        for id in flagged {
            let update = StatusUpdate::overdue(now);
            match self.store.update_status(&id, &update) {
                Ok(()) => {
                    for event in events.iter_mut().filter(|event| {
                        event.id == id && event.follow_up_status.can_transition_to(FollowUpStatus::Overdue)
                    }) {
                        event.apply_update(&update);
                    }
                    report.transitioned.push(id);
                }
                Err(err) => {
                    error!(id = %id, error = %err, "failed to persist overdue transition");
                    report.failed.push(SweepFailure {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            transitioned = report.transitioned.len(),
            failed = report.failed.len(),
            "overdue sweep applied"
        );
        report
    }
}
