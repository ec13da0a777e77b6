//! Serde helpers for document timestamps.
//!
//! Timestamps are always written as UTC with millisecond precision and a `Z`
//! suffix (`2024-05-01T08:30:00.000Z`). Any RFC 3339 offset is accepted on
//! input and normalised to UTC. Because the text form is fixed-width, stored
//! timestamps sort lexicographically in chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn format(at: &DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
  DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
}

pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(&format(at))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
  let raw = String::deserialize(d)?;
  parse(&raw).map_err(serde::de::Error::custom)
}

/// The same encoding for optional timestamps. Pair with
/// `#[serde(default, skip_serializing_if = "Option::is_none")]`.
pub mod option {
  use chrono::{DateTime, Utc};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(
    at: &Option<DateTime<Utc>>,
    s: S,
  ) -> Result<S::Ok, S::Error> {
    match at {
      Some(at) => s.serialize_some(&super::format(at)),
      None => s.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    d: D,
  ) -> Result<Option<DateTime<Utc>>, D::Error> {
    Option::<String>::deserialize(d)?
      .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
      .transpose()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn formats_with_millis_and_z() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
    assert_eq!(format(&at), "2024-05-01T08:30:00.000Z");
  }

  #[test]
  fn parses_offsets_into_utc() {
    let at = parse("2024-05-01T10:30:00+02:00").unwrap();
    assert_eq!(format(&at), "2024-05-01T08:30:00.000Z");
  }
}
