// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Lenient readers for classification records. Older progress files store the time spent
//! as clock text (`0:00:12.345678`) and timestamps without a UTC offset.
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{de, Deserialize, Deserializer};

const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeSpent {
    Seconds(f64),
    Clock(String),
}

/// Reads the time spent as seconds or as clock text.
pub(super) fn time_spent<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match TimeSpent::deserialize(deserializer)? {
        TimeSpent::Seconds(seconds) => Ok(seconds),
        TimeSpent::Clock(text) => parse_clock(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid time spent: {}", text))),
    }
}

/// Reads an RFC 3339 timestamp, or a timestamp without an offset taken as local time.
pub(super) fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", text)))
}

/// Parses `[D day[s], ]H:MM:SS[.ffffff]` into seconds.
fn parse_clock(text: &str) -> Option<f64> {
    let (days, clock) = match text.trim().split_once(", ") {
        Some((days, clock)) => (days.split_whitespace().next()?.parse::<f64>().ok()?, clock),
        None => (0.0, text.trim()),
    };

    let mut parts = clock.splitn(3, ':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    Some(((days * 24.0 + hours) * 60.0 + minutes) * 60.0 + seconds)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Local>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(text, NAIVE_TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod test {
    use chrono::{Local, TimeZone, Timelike};

    use super::{parse_clock, parse_timestamp};

    #[test]
    fn test_parse_clock() {
        assert_eq!(Some(12.5), parse_clock("0:00:12.5"));
        assert_eq!(Some(3723.0), parse_clock("1:02:03"));
        assert_eq!(Some(86_401.0), parse_clock("1 day, 0:00:01"));
        assert_eq!(Some(2.0 * 86_400.0 + 60.0), parse_clock("2 days, 0:01:00"));
        assert!(parse_clock("12.5").is_none());
        assert!(parse_clock("a:b:c").is_none());
    }

    #[test]
    fn test_parse_timestamp() {
        let expected = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("ambiguous time");

        assert_eq!(Some(expected), parse_timestamp("2024-03-09T14:05:07"));
        assert_eq!(
            Some(123_456_000),
            parse_timestamp("2024-03-09T14:05:07.123456").map(|t| t.nanosecond())
        );
        assert_eq!(Some(expected), parse_timestamp(&expected.to_rfc3339()));
        assert!(parse_timestamp("yesterday").is_none());
    }
}
