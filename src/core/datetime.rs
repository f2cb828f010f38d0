// Copyright 2025 Treeq Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Packed calendar date-time
//!
//! A compact record with an `error` flag rather than a fallible parse: the
//! parser validates structure (field counts, gross ranges) and otherwise
//! takes the input in good faith. Sub-second precision is carried as units
//! of 1/10000 seconds.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, TimeZone, Timelike, Utc};

use super::value::parse_integer_prefix;

/// Packed date-time record
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedDateTime {
    /// Set when the source text did not have the general form of a date-time
    pub error: bool,
    /// Set when no time-of-day component was present
    pub date_only: bool,
    pub year: u16,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0-9999, units of 1/10000 s
    pub ms: u16,
}

impl PackedDateTime {
    fn error_value() -> Self {
        PackedDateTime {
            error: true,
            ..Default::default()
        }
    }

    /// Lenient parse of `YYYY[-MM-DD][ HH:MM:SS[.fff[fff]][am|pm]]`.
    ///
    /// Date and time may arrive in one string separated by a space, or split
    /// across the two arguments. Only an incorrect number of fields sets the
    /// `error` flag; field values are taken in good faith.
    pub fn parse(date_or_both: &str, time: &str) -> Self {
        let mut parts: Vec<&str> = date_or_both.split_whitespace().collect();
        if parts.len() == 1 && !time.is_empty() {
            parts.push(time);
        }
        if parts.is_empty() || parts.len() > 2 {
            return Self::error_value();
        }

        let (date_part, time_part) = if parts.len() == 1 {
            if parts[0].contains('-') {
                (parts[0], "")
            } else {
                ("", parts[0])
            }
        } else {
            (parts[0], parts[1])
        };

        let date_fields: Vec<&str> = date_part.split('-').collect();
        if date_fields.len() < 3 {
            return Self::error_value();
        }
        let mut year = parse_integer_prefix(date_fields[0]).0.unsigned_abs();
        let month = parse_integer_prefix(date_fields[1]).0.unsigned_abs();
        let day = parse_integer_prefix(date_fields[2]).0.unsigned_abs();
        if year <= 49 {
            year += 2000;
        } else if year <= 99 {
            year += 1900;
        } else if year > 2049 {
            return Self::error_value();
        }
        if month == 0 || month > 12 {
            return Self::error_value();
        }
        if day == 0 || day > 31 {
            return Self::error_value();
        }

        let mut dt = PackedDateTime {
            error: false,
            date_only: time_part.is_empty(),
            year: year as u16,
            month: month as u8,
            day: day as u8,
            ..Default::default()
        };
        if dt.date_only {
            return dt;
        }

        let time_fields: Vec<&str> = time_part.split(':').collect();
        if time_fields.len() < 3 {
            return Self::error_value();
        }
        let mut hr = parse_integer_prefix(time_fields[0]).0.unsigned_abs();
        let mut min = parse_integer_prefix(time_fields[1]).0.unsigned_abs();
        let mut sec;
        let ms_part;
        if time_fields.len() >= 4 {
            // seconds and sub-seconds separated by ':'
            sec = parse_integer_prefix(time_fields[2]).0.unsigned_abs();
            ms_part = time_fields[3].to_string();
        } else {
            let mut sec_ms = time_fields[2].splitn(2, '.');
            sec = parse_integer_prefix(sec_ms.next().unwrap_or("")).0.unsigned_abs();
            ms_part = sec_ms.next().unwrap_or("").to_string();
        }

        let mut ms: u64 = 0;
        if !ms_part.is_empty() {
            // Grab four digits with rounding: .1 => .1000, .12345678 => .1235
            let padded: Vec<char> = ms_part.chars().chain("0000".chars()).take(5).collect();
            if padded[4] >= '5' {
                ms += 1;
            }
            let head: String = padded[..4].iter().collect();
            ms += parse_integer_prefix(&head).0.unsigned_abs();
        }

        // carry over time units
        while ms >= 10000 {
            ms -= 10000;
            sec += 1;
        }
        while sec >= 60 {
            sec -= 60;
            min += 1;
        }
        while min >= 60 {
            min -= 60;
            hr += 1;
        }
        let mut day = day;
        while hr >= 24 {
            hr -= 24;
            if day > 31 {
                return Self::error_value();
            }
            day += 1;
        }
        let sec_token = time_fields[2];
        if (sec_token.contains("pm") || sec_token.contains("PM")) && hr < 12 {
            hr += 12;
        }

        dt.day = day as u8;
        dt.hour = hr as u8;
        dt.minute = min as u8;
        dt.second = sec as u8;
        dt.ms = ms as u16;
        dt
    }

    /// Seconds since the epoch, UTC. Lossy: sub-second units are dropped.
    pub fn to_epoch_seconds(&self) -> i64 {
        Utc.with_ymd_and_hms(
            self.year as i32,
            self.month as u32,
            self.day as u32,
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
        .single()
        .map(|t| t.timestamp())
        .unwrap_or(0)
    }

    /// Seconds since the epoch plus the 10^4-unit fraction
    pub fn to_real(&self) -> f64 {
        self.to_epoch_seconds() as f64 + (self.ms as f64 / 10000.0)
    }

    /// Build from epoch seconds, UTC
    pub fn from_epoch_seconds(secs: i64) -> Self {
        match Utc.timestamp_opt(secs, 0).single() {
            Some(t) => PackedDateTime {
                error: false,
                date_only: false,
                year: t.year().clamp(0, u16::MAX as i32) as u16,
                month: t.month() as u8,
                day: t.day() as u8,
                hour: t.hour() as u8,
                minute: t.minute() as u8,
                second: t.second() as u8,
                ms: 0,
            },
            None => Self::error_value(),
        }
    }

    /// Lossy build from fractional epoch seconds
    pub fn from_real(secs: f64) -> Self {
        let whole = secs as i64;
        let mut dt = Self::from_epoch_seconds(whole);
        dt.ms = ((secs - whole as f64) * 10000.0) as u16;
        dt
    }

    /// Natural field-order comparison
    pub fn compare(&self, other: &PackedDateTime) -> Ordering {
        let lhs = (self.year, self.month, self.day);
        let rhs = (other.year, other.month, other.day);
        match lhs.cmp(&rhs) {
            Ordering::Equal => {}
            ord => return ord,
        }
        // a date-only value sorts before any timed value on the same date
        match (self.date_only, other.date_only) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        (self.hour, self.minute, self.second, self.ms).cmp(&(
            other.hour,
            other.minute,
            other.second,
            other.ms,
        ))
    }

    /// Render as `YYYY-MM-DD[ HH:MM:SS[.ffff]]`, trimming trailing zeros in
    /// the fractional component
    pub fn render(&self, subsecond: bool) -> String {
        if self.error {
            return String::new();
        }
        let mut out = format!("{:04}-{:02}-{:02}", self.year, self.month, self.day);
        if !self.date_only {
            out.push_str(&format!(
                " {:02}:{:02}:{:02}",
                self.hour, self.minute, self.second
            ));
            if self.ms > 0 && subsecond {
                let mut p = self.ms;
                while p > 0 && p % 10 == 0 {
                    p /= 10;
                }
                if self.ms < 10 {
                    out.push_str(&format!(".000{}", p));
                } else if self.ms < 100 {
                    out.push_str(&format!(".00{}", p));
                } else if self.ms < 1000 {
                    out.push_str(&format!(".0{}", p));
                } else {
                    out.push_str(&format!(".{}", p));
                }
            }
        }
        out
    }
}

impl PartialEq for PackedDateTime {
    fn eq(&self, other: &Self) -> bool {
        if self.error || other.error {
            return self.error == other.error;
        }
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for PackedDateTime {}

impl Hash for PackedDateTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (
            self.error,
            self.year,
            self.month,
            self.day,
            self.date_only,
            self.hour,
            self.minute,
            self.second,
            self.ms,
        )
            .hash(state);
    }
}

impl fmt::Display for PackedDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(true))
    }
}

/// Format an epoch timestamp as `YYYY-MM-DD HH:MM:SS.fff`.
///
/// `in_milliseconds` selects whether the numeric input counts milliseconds
/// or (fractional) seconds since the epoch.
pub fn format_timestamp(value: f64, in_milliseconds: bool) -> String {
    let (secs, ms) = if in_milliseconds {
        let total = value as i64;
        (total.div_euclid(1000), total.rem_euclid(1000))
    } else {
        let secs = value.floor() as i64;
        (secs, ((value - secs as f64) * 1000.0).round() as i64)
    };
    match Utc.timestamp_opt(secs, 0).single() {
        Some(t) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            t.year(),
            t.month(),
            t.day(),
            t.hour(),
            t.minute(),
            t.second(),
            ms
        ),
        None => "invalid".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_only() {
        let dt = PackedDateTime::parse("2024-01-02", "");
        assert!(!dt.error);
        assert!(dt.date_only);
        assert_eq!((dt.year, dt.month, dt.day), (2024, 1, 2));
        assert_eq!(dt.render(true), "2024-01-02");
    }

    #[test]
    fn test_parse_date_and_time() {
        let dt = PackedDateTime::parse("2024-01-02 03:04:05", "");
        assert!(!dt.error);
        assert!(!dt.date_only);
        assert_eq!((dt.hour, dt.minute, dt.second), (3, 4, 5));
        assert_eq!(dt.render(true), "2024-01-02 03:04:05");
    }

    #[test]
    fn test_parse_split_arguments() {
        let dt = PackedDateTime::parse("2024-01-02", "03:04:05.5");
        assert!(!dt.error);
        assert_eq!(dt.ms, 5000);
        assert_eq!(dt.render(true), "2024-01-02 03:04:05.5");
    }

    #[test]
    fn test_parse_subsecond_rounding() {
        // .12345678 rounds at the fifth digit
        let dt = PackedDateTime::parse("2024-01-02 03:04:08.12345678", "");
        assert_eq!(dt.ms, 1235);
    }

    #[test]
    fn test_parse_pm_suffix() {
        let dt = PackedDateTime::parse("2024-01-02 03:04:05pm", "");
        assert_eq!(dt.hour, 15);
        let noonish = PackedDateTime::parse("2024-01-02 12:30:00pm", "");
        assert_eq!(noonish.hour, 12);
    }

    #[test]
    fn test_parse_two_digit_years() {
        assert_eq!(PackedDateTime::parse("24-01-02", "").year, 2024);
        assert_eq!(PackedDateTime::parse("74-01-02", "").year, 1974);
        assert!(PackedDateTime::parse("2050-01-02", "").error);
    }

    #[test]
    fn test_parse_structural_failures() {
        assert!(PackedDateTime::parse("", "").error);
        assert!(PackedDateTime::parse("2024-13-01", "").error);
        assert!(PackedDateTime::parse("2024-01-32", "").error);
        assert!(PackedDateTime::parse("2024-01-02 03:04", "").error);
        assert!(PackedDateTime::parse("hello", "").error);
    }

    #[test]
    fn test_epoch_round_trip() {
        let dt = PackedDateTime::parse("2024-01-02 03:04:05", "");
        let secs = dt.to_epoch_seconds();
        let back = PackedDateTime::from_epoch_seconds(secs);
        assert_eq!(dt.compare(&back), Ordering::Equal);
    }

    #[test]
    fn test_ordering() {
        let a = PackedDateTime::parse("2024-01-02 03:04:05", "");
        let b = PackedDateTime::parse("2024-01-02 03:04:06", "");
        let d = PackedDateTime::parse("2024-01-02", "");
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(d.compare(&a), Ordering::Less);
    }

    #[test]
    fn test_format_timestamp() {
        // 2024-01-02 03:04:05 UTC
        let secs = PackedDateTime::parse("2024-01-02 03:04:05", "").to_epoch_seconds();
        assert_eq!(
            format_timestamp(secs as f64, false),
            "2024-01-02 03:04:05.000"
        );
        assert_eq!(
            format_timestamp(secs as f64 * 1000.0 + 250.0, true),
            "2024-01-02 03:04:05.250"
        );
    }
}
