use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{
  DateTime,
  FixedOffset,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::ser::SerializeMap;
use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  Serializer
};
use serde_json::Value;

use crate::event::FollowUpEvent;

const NAIVE_DATETIME_FORMATS: [&str; 5] = [
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

const MAX_NANOSECONDS: u32 =
  999_999_999;

/// A source value that knows how to
/// turn itself into an instant.
pub trait ToInstant:
  fmt::Debug + Send + Sync
{
  fn to_instant(
    &self
  ) -> Option<DateTime<Utc>>;
}

impl ToInstant for SystemTime {
  fn to_instant(
    &self
  ) -> Option<DateTime<Utc>> {
    Some(DateTime::<Utc>::from(*self))
  }
}

impl ToInstant for DateTime<FixedOffset> {
  fn to_instant(
    &self
  ) -> Option<DateTime<Utc>> {
    Some(self.with_timezone(&Utc))
  }
}

/// Every shape a stored schedule value
/// has been seen in.
#[derive(Debug, Clone)]
pub enum RawTimestamp {
  Instant(DateTime<Utc>),
  Convertible(Arc<dyn ToInstant>),
  EpochSeconds {
    seconds:     i64,
    nanoseconds: u32
  },
  Text(String),
  Unknown(Value)
}

impl RawTimestamp {
  pub fn from_value(
    value: Value
  ) -> Self {
    match value {
      | Value::String(text) => {
        Self::Text(text)
      }
      | Value::Object(map) => {
        let seconds = map
          .get("seconds")
          .or_else(|| {
            map.get("_seconds")
          })
          .and_then(Value::as_i64);
        let nanoseconds = map
          .get("nanoseconds")
          .or_else(|| {
            map.get("_nanoseconds")
          })
          .map(|raw| {
            raw
              .as_u64()
              .and_then(|n| {
                u32::try_from(n).ok()
              })
          });

        match (seconds, nanoseconds) {
          | (Some(seconds), None) => {
            Self::EpochSeconds {
              seconds,
              nanoseconds: 0
            }
          }
          | (
            Some(seconds),
            Some(Some(nanoseconds))
          ) => Self::EpochSeconds {
            seconds,
            nanoseconds
          },
          | _ => {
            Self::Unknown(Value::Object(map))
          }
        }
      }
      | other => Self::Unknown(other)
    }
  }
}

impl From<DateTime<Utc>>
  for RawTimestamp
{
  fn from(
    value: DateTime<Utc>
  ) -> Self {
    Self::Instant(value)
  }
}

impl From<SystemTime> for RawTimestamp {
  fn from(value: SystemTime) -> Self {
    Self::Convertible(Arc::new(value))
  }
}

impl From<&str> for RawTimestamp {
  fn from(value: &str) -> Self {
    Self::Text(value.to_string())
  }
}

impl From<String> for RawTimestamp {
  fn from(value: String) -> Self {
    Self::Text(value)
  }
}

impl<'de> Deserialize<'de>
  for RawTimestamp
{
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    Value::deserialize(deserializer)
      .map(Self::from_value)
  }
}

impl Serialize for RawTimestamp {
  fn serialize<S>(
    &self,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match self {
      | Self::Instant(instant) => {
        serializer.serialize_str(
          &format_instant(*instant)
        )
      }
      | Self::Convertible(source) => {
        match source.to_instant() {
          | Some(instant) => {
            serializer.serialize_str(
              &format_instant(instant)
            )
          }
          | None => {
            serializer.serialize_none()
          }
        }
      }
      | Self::EpochSeconds {
        seconds,
        nanoseconds
      } => {
        let mut map = serializer
          .serialize_map(Some(2))?;
        map.serialize_entry(
          "seconds", seconds
        )?;
        map.serialize_entry(
          "nanoseconds",
          nanoseconds
        )?;
        map.end()
      }
      | Self::Text(text) => {
        serializer.serialize_str(text)
      }
      | Self::Unknown(value) => {
        value.serialize(serializer)
      }
    }
  }
}

fn format_instant(
  instant: DateTime<Utc>
) -> String {
  instant.to_rfc3339_opts(
    SecondsFormat::AutoSi,
    true
  )
}

/// An event paired with its resolved
/// schedule, in UTC and in the viewer's
/// zone.
#[derive(Debug, Clone)]
pub struct ScheduledEvent<'a> {
  pub event: &'a FollowUpEvent,
  pub at:    DateTime<Utc>,
  pub local: DateTime<Tz>
}

#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
  timezone: Tz
}

impl Default for TimestampNormalizer {
  fn default() -> Self {
    Self::new(chrono_tz::UTC)
  }
}

impl TimestampNormalizer {
  pub fn new(timezone: Tz) -> Self {
    Self { timezone }
  }

  pub fn timezone(&self) -> Tz {
    self.timezone
  }

  pub fn to_local(
    &self,
    instant: DateTime<Utc>
  ) -> DateTime<Tz> {
    instant
      .with_timezone(&self.timezone)
  }

  /// Never fails loudly: anything not
  /// recognised comes back as `None`.
  #[tracing::instrument(
    level = "trace",
    skip(self)
  )]
  pub fn normalize(
    &self,
    raw: &RawTimestamp
  ) -> Option<DateTime<Utc>> {
    let normalized = match raw {
      | RawTimestamp::Instant(
        instant
      ) => Some(*instant),
      | RawTimestamp::Convertible(
        source
      ) => source.to_instant(),
      | RawTimestamp::EpochSeconds {
        seconds,
        nanoseconds
      } => {
        if *nanoseconds
          > MAX_NANOSECONDS
        {
          None
        } else {
          DateTime::from_timestamp(
            *seconds,
            *nanoseconds
          )
        }
      }
      | RawTimestamp::Text(text) => {
        self.parse_text(text)
      }
      | RawTimestamp::Unknown(_) => {
        None
      }
    };

    if normalized.is_none() {
      tracing::warn!(
        raw = ?raw,
        "unrecognized timestamp format"
      );
    }
    normalized
  }

  fn parse_text(
    &self,
    raw: &str
  ) -> Option<DateTime<Utc>> {
    let token = raw.trim();
    if token.is_empty() {
      return None;
    }

    if let Ok(dt) =
      DateTime::parse_from_rfc3339(token)
    {
      return Some(
        dt.with_timezone(&Utc)
      );
    }

    if let Ok(dt) =
      DateTime::parse_from_rfc2822(token)
    {
      return Some(
        dt.with_timezone(&Utc)
      );
    }

    for fmt in NAIVE_DATETIME_FORMATS {
      if let Ok(ndt) =
        NaiveDateTime::parse_from_str(
          token, fmt
        )
      {
        return self
          .resolve_local(ndt, fmt);
      }
    }

    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
    .ok()
    .and_then(|date| {
      date.and_hms_opt(0, 0, 0)
    })
    .and_then(|midnight| {
      self
        .resolve_local(midnight, "date")
    })
  }

  fn resolve_local(
    &self,
    local_naive: NaiveDateTime,
    context: &str
  ) -> Option<DateTime<Utc>> {
    match self
      .timezone
      .from_local_datetime(&local_naive)
    {
      | LocalResult::Single(local) => {
        Some(local.with_timezone(&Utc))
      }
      | LocalResult::Ambiguous(
        first,
        second
      ) => {
        tracing::warn!(
          context,
          first = %first,
          second = %second,
          "ambiguous local datetime; using earliest"
        );
        Some(
          first
            .min(second)
            .with_timezone(&Utc)
        )
      }
      | LocalResult::None => {
        tracing::warn!(
          context,
          local = %local_naive,
          timezone = %self.timezone,
          "local datetime does not exist in viewer timezone"
        );
        None
      }
    }
  }

  /// Keeps input order; events without a
  /// usable schedule are left out.
  #[tracing::instrument(
    skip(self, events),
    fields(total = events.len())
  )]
  pub fn collect_scheduled<'a>(
    &self,
    events: &'a [FollowUpEvent]
  ) -> Vec<ScheduledEvent<'a>> {
    let mut skipped = 0_usize;
    let entries = events
      .iter()
      .filter_map(|event| {
        let raw =
          event.scheduled_at.as_ref()?;
        let Some(at) =
          self.normalize(raw)
        else {
          tracing::debug!(
            id = %event.id,
            "excluding follow-up with unparsable schedule"
          );
          skipped += 1;
          return None;
        };
        Some(ScheduledEvent {
          event,
          at,
          local: self.to_local(at)
        })
      })
      .collect::<Vec<_>>();

    tracing::debug!(
      scheduled = entries.len(),
      skipped,
      timezone = %self.timezone,
      "collected scheduled follow-ups"
    );
    entries
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    Timelike
  };
  use serde_json::json;

  use super::*;
  use crate::event::FollowUpType;

  fn utc(
    y: i32,
    m: u32,
    d: u32,
    h: u32,
    min: u32
  ) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(y, m, d, h, min, 0)
      .single()
      .expect("valid instant")
  }

  #[test]
  fn epoch_seconds_and_text_agree() {
    let normalizer =
      TimestampNormalizer::default();
    let from_epoch = normalizer
      .normalize(
        &RawTimestamp::EpochSeconds {
          seconds:     1_772_366_400,
          nanoseconds: 0
        }
      )
      .expect("epoch normalizes");
    let from_text = normalizer
      .normalize(&RawTimestamp::from(
        "2026-03-01T12:00:00Z"
      ))
      .expect("text normalizes");

    assert_eq!(from_epoch, from_text);
    assert_eq!(
      from_epoch,
      utc(2026, 3, 1, 12, 0)
    );
  }

  #[test]
  fn convertible_sources_use_their_own_conversion(
  ) {
    let normalizer =
      TimestampNormalizer::default();
    let offset = DateTime::parse_from_rfc3339(
      "2026-03-01T06:00:00-06:00"
    )
    .expect("valid offset datetime");
    let raw = RawTimestamp::Convertible(
      Arc::new(offset)
    );

    assert_eq!(
      normalizer.normalize(&raw),
      Some(utc(2026, 3, 1, 12, 0))
    );
  }

  #[test]
  fn unrecognized_shapes_yield_none() {
    let normalizer =
      TimestampNormalizer::default();

    for raw in [
      RawTimestamp::from("not-a-date"),
      RawTimestamp::from("   "),
      RawTimestamp::Unknown(json!(42)),
      RawTimestamp::Unknown(json!([1, 2])),
      RawTimestamp::EpochSeconds {
        seconds:     0,
        nanoseconds: 2_000_000_000
      }
    ] {
      assert!(
        normalizer
          .normalize(&raw)
          .is_none()
      );
    }
  }

  #[test]
  fn naive_text_is_read_in_viewer_timezone(
  ) {
    let normalizer =
      TimestampNormalizer::new(
        chrono_tz::America::Mexico_City
      );
    let parsed = normalizer
      .normalize(&RawTimestamp::from(
        "2026-03-01 09:30"
      ))
      .expect("naive datetime parses");

    assert_eq!(
      parsed,
      utc(2026, 3, 1, 15, 30)
    );
    let local = normalizer.to_local(parsed);
    assert_eq!(local.hour(), 9);
    assert_eq!(local.day(), 1);

    let midnight = normalizer
      .normalize(&RawTimestamp::from(
        "2026-03-01"
      ))
      .expect("date parses");
    assert_eq!(
      midnight,
      utc(2026, 3, 1, 6, 0)
    );
  }

  #[test]
  fn skipped_local_time_is_unparsable() {
    let normalizer =
      TimestampNormalizer::new(
        chrono_tz::America::New_York
      );

    assert!(
      normalizer
        .normalize(&RawTimestamp::from(
          "2026-03-08 02:30"
        ))
        .is_none()
    );
  }

  #[test]
  fn deserializes_stored_shapes() {
    let epoch: RawTimestamp =
      serde_json::from_value(json!({
        "_seconds": 1_772_366_400,
        "_nanoseconds": 500
      }))
      .expect("epoch object");
    assert!(matches!(
      epoch,
      RawTimestamp::EpochSeconds {
        seconds: 1_772_366_400,
        nanoseconds: 500
      }
    ));

    let text: RawTimestamp =
      serde_json::from_value(json!(
        "2026-03-01T12:00:00Z"
      ))
      .expect("text");
    assert!(matches!(
      text,
      RawTimestamp::Text(_)
    ));

    let odd: RawTimestamp =
      serde_json::from_value(json!({
        "seconds": "soon"
      }))
      .expect("unknown object");
    assert!(matches!(
      odd,
      RawTimestamp::Unknown(_)
    ));
  }

  #[test]
  fn collect_drops_missing_and_unparsable_schedules(
  ) {
    let normalizer =
      TimestampNormalizer::default();
    let events = vec![
      FollowUpEvent::new_scheduled(
        "A",
        "a@example.com",
        Some(RawTimestamp::from(
          utc(2026, 3, 2, 10, 0)
        )),
        FollowUpType::Call
      ),
      FollowUpEvent::new_scheduled(
        "B",
        "b@example.com",
        None,
        FollowUpType::Email
      ),
      FollowUpEvent::new_scheduled(
        "C",
        "c@example.com",
        Some(RawTimestamp::from(
          "not-a-date"
        )),
        FollowUpType::Meeting
      ),
      FollowUpEvent::new_scheduled(
        "D",
        "d@example.com",
        Some(RawTimestamp::from(
          "2026-03-01T08:00:00Z"
        )),
        FollowUpType::Proposal
      ),
    ];

    let entries = normalizer
      .collect_scheduled(&events);
    let names = entries
      .iter()
      .map(|entry| {
        entry
          .event
          .contact_name
          .as_str()
      })
      .collect::<Vec<_>>();

    assert_eq!(names, vec!["A", "D"]);
    assert_eq!(
      entries[1].local.month(),
      3
    );
  }
}
