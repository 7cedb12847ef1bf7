use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::event::{EventId, FollowUpEvent, StatusUpdate};
use crate::timestamp::TimestampNormalizer;

const MESSAGES_FILE: &str = "messages.data";

/// The record store that owns follow-up events. The engine only reads events
/// and writes status changes back through this seam.
pub trait FollowUpStore {
    /// Records whose schedule field is present, ascending by that field.
    fn fetch_events(&self) -> StoreResult<Vec<FollowUpEvent>>;

    /// Partial, last-write-wins update of status, outcome and `lastUpdated`.
    fn update_status(&self, id: &EventId, update: &StatusUpdate) -> StoreResult<()>;
}

#[derive(Debug)]
pub struct JsonlStore {
    pub data_dir: PathBuf,
    pub messages_path: PathBuf,
    normalizer: TimestampNormalizer,
}

impl JsonlStore {
    #[tracing::instrument(skip(data_dir, normalizer))]
    pub fn open(data_dir: &Path, normalizer: TimestampNormalizer) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let messages_path = data_dir.join(MESSAGES_FILE);
        if !messages_path.exists() {
            fs::write(&messages_path, "")
                .with_context(|| format!("failed to create {}", messages_path.display()))?;
        }

        info!(
            data_dir = %data_dir.display(),
            messages = %messages_path.display(),
            "opened follow-up store"
        );

        Ok(Self {
            data_dir,
            messages_path,
            normalizer,
        })
    }

    /// Every decodable record, scheduled or not, in file order.
    #[tracing::instrument(skip(self))]
    pub fn load_messages(&self) -> StoreResult<Vec<FollowUpEvent>> {
        load_jsonl(&self.messages_path)
    }

    #[tracing::instrument(skip(self, events))]
    pub fn save_messages(&self, events: &[FollowUpEvent]) -> StoreResult<()> {
        let lines = events
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        save_lines_atomic(&self.messages_path, &lines)
    }
}

impl FollowUpStore for JsonlStore {
    #[tracing::instrument(skip(self))]
    fn fetch_events(&self) -> StoreResult<Vec<FollowUpEvent>> {
        let messages = self.load_messages().map_err(|err| {
            StoreError::Fetch(format!("{}: {err}", self.messages_path.display()))
        })?;

        let mut keyed: Vec<_> = messages
            .into_iter()
            .filter(|event| event.scheduled_at.is_some())
            .map(|event| {
                let key = event
                    .scheduled_at
                    .as_ref()
                    .and_then(|raw| self.normalizer.normalize(raw));
                (key, event)
            })
            .collect();
        // Present but unparsable schedules sort after every real instant.
        keyed.sort_by_key(|(key, _)| (key.is_none(), *key));

        let events: Vec<FollowUpEvent> = keyed.into_iter().map(|(_, event)| event).collect();
        debug!(count = events.len(), "fetched scheduled follow-ups");
        Ok(events)
    }

    /// Merges the update into every record carrying `id`. Other lines,
    /// including ones this crate cannot decode, are written back verbatim.
    #[tracing::instrument(skip(self, id, update), fields(id = %id, status = %update.follow_up_status))]
    fn update_status(&self, id: &EventId, update: &StatusUpdate) -> StoreResult<()> {
        let persist_err = |reason: String| StoreError::Persist {
            id: id.clone(),
            reason,
        };

        let patch = match serde_json::to_value(update).map_err(|err| persist_err(err.to_string()))? {
            Value::Object(fields) => fields,
            other => return Err(persist_err(format!("status update is not an object: {other}"))),
        };
        let lines = read_lines(&self.messages_path).map_err(|err| persist_err(err.to_string()))?;

        let mut matched = 0_usize;
        let mut rewritten = Vec::with_capacity(lines.len());
        for line in lines {
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(mut record))
                    if record.get("id").and_then(Value::as_str) == Some(id.as_str()) =>
                {
                    record.extend(patch.clone());
                    rewritten.push(Value::Object(record).to_string());
                    matched += 1;
                }
                _ => rewritten.push(line),
            }
        }

        if matched == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        save_lines_atomic(&self.messages_path, &rewritten).map_err(|err| persist_err(err.to_string()))?;
        debug!(matched, "persisted follow-up status");
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn read_lines(path: &Path) -> StoreResult<Vec<String>> {
    let file = fs::File::open(path)?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

/// A line that does not decode as a follow-up is skipped with a warning; only
/// I/O failures fail the whole load.
#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> StoreResult<Vec<FollowUpEvent>> {
    debug!(file = %path.display(), "loading jsonl");

    let mut out = Vec::new();
    let mut skipped = 0_usize;
    for (idx, line) in read_lines(path)?.into_iter().enumerate() {
        match serde_json::from_str::<FollowUpEvent>(line.trim()) {
            Ok(event) => out.push(event),
            Err(err) => {
                skipped += 1;
                warn!(
                    file = %path.display(),
                    record = idx + 1,
                    error = %err,
                    "skipping undecodable follow-up record"
                );
            }
        }
    }

    debug!(count = out.len(), skipped, "loaded follow-ups from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, lines))]
fn save_lines_atomic(path: &Path, lines: &[String]) -> StoreResult<()> {
    debug!(file = %path.display(), count = lines.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for line in lines {
        writeln!(temp, "{line}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::event::{FollowUpStatus, FollowUpType, Outcome};
    use crate::timestamp::RawTimestamp;

    #[test]
    fn fetch_keeps_scheduled_records_in_schedule_order() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStore::open(temp.path(), TimestampNormalizer::default()).expect("open store");
        let now = Utc::now();

        let later = FollowUpEvent::new_scheduled(
            "Later",
            "later@example.com",
            Some(RawTimestamp::from(now + Duration::days(2))),
            FollowUpType::Call,
        );
        let broken = FollowUpEvent::new_scheduled(
            "Broken",
            "broken@example.com",
            Some(RawTimestamp::Unknown(json!(true))),
            FollowUpType::Email,
        );
        let unscheduled = FollowUpEvent::new_scheduled("Inbox only", "inbox@example.com", None, FollowUpType::Email);
        let sooner = FollowUpEvent::new_scheduled(
            "Sooner",
            "sooner@example.com",
            Some(RawTimestamp::EpochSeconds {
                seconds: (now + Duration::hours(1)).timestamp(),
                nanoseconds: 0,
            }),
            FollowUpType::Meeting,
        );

        store
            .save_messages(&[later, broken, unscheduled, sooner])
            .expect("save messages");

        let fetched = store.fetch_events().expect("fetch events");
        let names: Vec<_> = fetched.iter().map(|event| event.contact_name.as_str()).collect();
        assert_eq!(names, vec!["Sooner", "Later", "Broken"]);
        assert_eq!(store.load_messages().expect("load messages").len(), 4);
    }

    #[test]
    fn update_status_is_partial() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStore::open(temp.path(), TimestampNormalizer::default()).expect("open store");
        let now = Utc::now();

        let mut event = FollowUpEvent::new_scheduled(
            "Ana",
            "ana@example.com",
            Some(RawTimestamp::from("2026-03-01T09:00:00Z")),
            FollowUpType::Proposal,
        );
        event.message = "Wants a quote for May".to_string();
        event.extra.insert("phone".to_string(), json!("+52 55 0000 0000"));
        let id = event.id.clone();
        store.save_messages(&[event]).expect("save messages");

        store
            .update_status(&id, &StatusUpdate::overdue(now))
            .expect("update status");

        let stored = store.load_messages().expect("load messages");
        assert_eq!(stored[0].follow_up_status, FollowUpStatus::Overdue);
        assert_eq!(stored[0].outcome, Some(Outcome::Lost));
        assert_eq!(stored[0].message, "Wants a quote for May");
        assert_eq!(stored[0].extra["phone"], "+52 55 0000 0000");
        assert!(matches!(stored[0].scheduled_at, Some(RawTimestamp::Text(_))));
    }

    #[test]
    fn update_status_for_unknown_id_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStore::open(temp.path(), TimestampNormalizer::default()).expect("open store");

        let err = store
            .update_status(&EventId::generate(), &StatusUpdate::completed(Utc::now()))
            .expect_err("missing id should fail");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn undecodable_lines_are_skipped_and_kept_on_rewrite() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStore::open(temp.path(), TimestampNormalizer::default()).expect("open store");
        fs::write(
            &store.messages_path,
            concat!(
                "{not json}\n",
                r#"{"id":42,"contactName":"Numeric id","scheduledAt":"2026-03-02T10:00:00Z"}"#,
                "\n",
                r#"{"id":"Xk3pQ9sLmN2vB7rT1aZc","contactName":"Ana","followUpType":"visit","scheduledAt":"2026-03-01T09:00:00Z"}"#,
                "\n",
            ),
        )
        .expect("write messages");

        let fetched = store.fetch_events().expect("fetch events");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id.as_str(), "Xk3pQ9sLmN2vB7rT1aZc");

        store
            .update_status(&fetched[0].id, &StatusUpdate::overdue(Utc::now()))
            .expect("update status");

        let raw = fs::read_to_string(&store.messages_path).expect("read messages");
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "{not json}");
        assert!(lines[1].contains(r#""id":42"#));

        let patched: Value = serde_json::from_str(lines[2]).expect("patched record");
        assert_eq!(patched["followUpStatus"], "overdue");
        assert_eq!(patched["outcome"], "lost");
        assert_eq!(patched["followUpType"], "visit");
    }

    #[test]
    fn missing_file_surfaces_fetch_failure() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStore::open(temp.path(), TimestampNormalizer::default()).expect("open store");
        fs::remove_file(&store.messages_path).expect("remove messages");

        let err = store.fetch_events().expect_err("missing file should fail");
        assert!(matches!(err, StoreError::Fetch(_)));
    }
}
