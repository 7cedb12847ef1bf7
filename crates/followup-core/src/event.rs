use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::timestamp::RawTimestamp;

/// Identifier minted by the record store. The engine compares it and
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim()))
    }
}

impl From<&str> for EventId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for EventId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Free-form engagement tag. Tags outside the known set are kept verbatim
/// so a rewrite of the record never loses them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum FollowUpType {
    Call,
    Email,
    Meeting,
    Proposal,
    #[default]
    FollowUp,
    Other(String),
}

impl FollowUpType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::Proposal => "proposal",
            Self::FollowUp => "follow-up",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for FollowUpType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "call" => Self::Call,
            "email" => Self::Email,
            "meeting" => Self::Meeting,
            "proposal" => Self::Proposal,
            "follow-up" => Self::FollowUp,
            _ => Self::Other(raw),
        }
    }
}

impl From<FollowUpType> for String {
    fn from(tag: FollowUpType) -> Self {
        match tag {
            FollowUpType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    #[default]
    Scheduled,
    Overdue,
    Completed,
}

impl FollowUpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Overdue => "overdue",
            Self::Completed => "completed",
        }
    }

    /// `completed` is terminal and `overdue` can only be completed.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Completed, _) => false,
            (Self::Overdue, Self::Completed) => true,
            (Self::Overdue, _) => false,
            (Self::Scheduled, Self::Overdue | Self::Completed) => true,
            (Self::Scheduled, Self::Scheduled) => false,
        }
    }
}

impl fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary tag recorded next to the status when a follow-up slips.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpEvent {
    pub id: EventId,

    #[serde(default)]
    pub contact_name: String,

    #[serde(default)]
    pub contact_email: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub scheduled_at: Option<RawTimestamp>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub follow_up_type: FollowUpType,

    #[serde(default, deserialize_with = "null_as_default")]
    pub follow_up_status: FollowUpStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FollowUpEvent {
    pub fn new_scheduled(
        contact_name: impl Into<String>,
        contact_email: impl Into<String>,
        scheduled_at: Option<RawTimestamp>,
        follow_up_type: FollowUpType,
    ) -> Self {
        Self {
            id: EventId::generate(),
            contact_name: contact_name.into(),
            contact_email: contact_email.into(),
            message: String::new(),
            scheduled_at,
            follow_up_type,
            follow_up_status: FollowUpStatus::Scheduled,
            outcome: None,
            last_updated: None,
            extra: BTreeMap::new(),
        }
    }

    /// Partial update: an absent outcome leaves the stored one untouched.
    pub fn apply_update(&mut self, update: &StatusUpdate) {
        self.follow_up_status = update.follow_up_status;
        if let Some(outcome) = update.outcome {
            self.outcome = Some(outcome);
        }
        self.last_updated = Some(update.last_updated);
    }
}

/// The fields a status change touches, serialized with their wire names so a
/// store can merge them into a stored record.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub follow_up_status: FollowUpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub last_updated: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn overdue(now: DateTime<Utc>) -> Self {
        Self {
            follow_up_status: FollowUpStatus::Overdue,
            outcome: Some(Outcome::Lost),
            last_updated: now,
        }
    }

    pub fn completed(now: DateTime<Utc>) -> Self {
        Self {
            follow_up_status: FollowUpStatus::Completed,
            outcome: None,
            last_updated: now,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_is_terminal() {
        for next in [
            FollowUpStatus::Scheduled,
            FollowUpStatus::Overdue,
            FollowUpStatus::Completed,
        ] {
            assert!(!FollowUpStatus::Completed.can_transition_to(next));
        }
        assert!(FollowUpStatus::Overdue.can_transition_to(FollowUpStatus::Completed));
        assert!(!FollowUpStatus::Overdue.can_transition_to(FollowUpStatus::Scheduled));
        assert!(FollowUpStatus::Scheduled.can_transition_to(FollowUpStatus::Overdue));
    }

    #[test]
    fn absent_and_null_status_read_as_scheduled() {
        let raw = r#"{"id":"6f1c1f3e-52a4-4d59-9a4c-3f0f8f3e7a11","contactName":"Ana","followUpStatus":null}"#;
        let event: FollowUpEvent = serde_json::from_str(raw).expect("parse event");
        assert_eq!(event.follow_up_status, FollowUpStatus::Scheduled);
        assert_eq!(event.follow_up_type, FollowUpType::FollowUp);
        assert!(event.scheduled_at.is_none());
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let raw = r#"{"id":"6f1c1f3e-52a4-4d59-9a4c-3f0f8f3e7a11","followUpType":"proposal","phone":"+52 55 1234 5678"}"#;
        let event: FollowUpEvent = serde_json::from_str(raw).expect("parse event");
        assert_eq!(event.follow_up_type, FollowUpType::Proposal);

        let written = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(written["phone"], "+52 55 1234 5678");
        assert_eq!(written["followUpStatus"], "scheduled");
    }

    #[test]
    fn store_ids_and_unknown_tags_are_opaque() {
        let raw = r#"{"id":"Xk3pQ9sLmN2vB7rT1aZc","followUpType":"visit"}"#;
        let event: FollowUpEvent = serde_json::from_str(raw).expect("parse event");
        assert_eq!(event.id, EventId::from("Xk3pQ9sLmN2vB7rT1aZc"));
        assert_eq!(event.follow_up_type, FollowUpType::Other("visit".to_string()));
        assert_eq!(event.follow_up_type.as_str(), "visit");

        let written = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(written["id"], "Xk3pQ9sLmN2vB7rT1aZc");
        assert_eq!(written["followUpType"], "visit");
    }

    #[test]
    fn status_update_serializes_wire_fields() {
        let now = Utc::now();
        let completed = serde_json::to_value(StatusUpdate::completed(now)).expect("serialize update");
        assert_eq!(completed["followUpStatus"], "completed");
        assert!(completed.get("outcome").is_none());

        let overdue = serde_json::to_value(StatusUpdate::overdue(now)).expect("serialize update");
        assert_eq!(overdue["outcome"], "lost");
        assert_eq!(overdue["lastUpdated"], serde_json::to_value(now).expect("serialize instant"));
    }

    #[test]
    fn overdue_update_tags_lost_outcome() {
        let now = Utc::now();
        let mut event = FollowUpEvent::new_scheduled("Ana", "ana@example.com", None, FollowUpType::Call);
        event.apply_update(&StatusUpdate::overdue(now));
        assert_eq!(event.follow_up_status, FollowUpStatus::Overdue);
        assert_eq!(event.outcome, Some(Outcome::Lost));

        event.apply_update(&StatusUpdate::completed(now));
        assert_eq!(event.follow_up_status, FollowUpStatus::Completed);
        assert_eq!(event.outcome, Some(Outcome::Lost));
        assert_eq!(event.last_updated, Some(now));
    }
}
