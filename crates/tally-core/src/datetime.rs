use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use tracing::trace;

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M"
];

/// Parses a due value the way the data
/// service stores it. Date-only values
/// are midnight UTC, date-times without
/// an offset are local time.
pub fn parse_due(
  raw: &str
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in NAIVE_DATETIME_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return local_to_utc(ndt);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return date
      .and_hms_opt(0, 0, 0)
      .map(|ndt| ndt.and_utc());
  }

  trace!(raw = %token, "unparseable due value");
  None
}

/// Parses a due date typed by the user:
/// everything [`parse_due`] accepts plus
/// `now`, `today`, `tomorrow` and
/// `yesterday`.
#[tracing::instrument(skip(now))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      let midnight = now
        .with_timezone(&Local)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| {
          anyhow!(
            "failed to construct \
             midnight for today"
          )
        })?;
      return local_to_utc(midnight)
        .context(
          "local midnight does not \
           exist today"
        );
    }
    | "tomorrow" => {
      let today =
        parse_date_expr("today", now)?;
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      let today =
        parse_date_expr("today", now)?;
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  parse_due(token).ok_or_else(|| {
    anyhow!(
      "unrecognized date: {token}"
    )
  })
}

fn local_to_utc(
  ndt: NaiveDateTime
) -> Option<DateTime<Utc>> {
  Local
    .from_local_datetime(&ndt)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Lenient serde adapter for the
/// optional `dateOverdue` field. Values
/// that do not parse become `None`.
pub mod due_date_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use serde_json::Value;

  pub fn serialize<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match dt {
      | Some(value) => serializer
        .serialize_str(
          &value.to_rfc3339()
        ),
      | None => serializer.serialize_none()
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<DateTime<Utc>>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = Option::<Value>::deserialize(
      deserializer
    )?;
    Ok(match raw {
      | Some(Value::String(text)) => {
        super::parse_due(&text)
      }
      | Some(Value::Number(millis)) => {
        millis
          .as_i64()
          .and_then(
            DateTime::from_timestamp_millis
          )
      }
      | _ => None
    })
  }
}
