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

//! Tagged scalar values
//!
//! Conversion between kinds is total: numeric parses default to zero,
//! datetime conversions carry an `error` flag instead of failing, and
//! anything renders as text. Comparison across differing kinds orders by
//! ladder position; within a kind, by natural order.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use super::datetime::PackedDateTime;
use super::types::ValueType;

/// Default number of significant digits when rendering reals as text
pub const DEFAULT_PRECISION: usize = 10;

/// A tagged scalar
#[derive(Debug, Clone, Default)]
pub enum Value {
    Str(String),
    Real(f64),
    Int(i64),
    Bool(bool),
    DateTime(PackedDateTime),
    #[default]
    Unknown,
}

impl Value {
    /// The kind tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Str(_) => ValueType::String,
            Value::Real(_) => ValueType::Real,
            Value::Int(_) => ValueType::Integer,
            Value::Bool(_) => ValueType::Boolean,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Unknown => ValueType::Unknown,
        }
    }

    pub fn as_real(&self) -> f64 {
        match self {
            Value::Real(v) => *v,
            Value::Int(v) => *v as f64,
            Value::Bool(v) => *v as i64 as f64,
            Value::Str(s) => parse_real_prefix(s).0,
            Value::DateTime(dt) => dt.to_real(),
            Value::Unknown => 0.0,
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Real(v) => *v as i64,
            Value::Int(v) => *v,
            Value::Bool(v) => *v as i64,
            Value::Str(s) => parse_integer_prefix(s).0,
            Value::DateTime(dt) => dt.to_epoch_seconds(),
            Value::Unknown => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Real(v) => *v != 0.0,
            Value::Int(v) => *v != 0,
            Value::Bool(v) => *v,
            Value::Str(s) => !s.is_empty() && s != "false" && !s.starts_with('0'),
            // no conversion makes sense
            Value::DateTime(_) => false,
            Value::Unknown => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(s) => s,
            _ => "",
        }
    }

    pub fn as_datetime(&self) -> PackedDateTime {
        match self {
            Value::Real(v) => PackedDateTime::from_real(*v),
            Value::Int(v) => PackedDateTime::from_epoch_seconds(*v),
            Value::Str(s) => PackedDateTime::parse(s, ""),
            Value::DateTime(dt) => *dt,
            Value::Bool(_) | Value::Unknown => PackedDateTime::default(),
        }
    }

    /// Produce a value of kind `to`; never fails
    pub fn convert(&self, to: ValueType) -> Value {
        match to {
            ValueType::Real => Value::Real(self.as_real()),
            ValueType::Integer => Value::Int(self.as_int()),
            ValueType::Boolean => Value::Bool(self.as_bool()),
            ValueType::DateTime => Value::DateTime(self.as_datetime()),
            // untyped slots hold the textual rendering
            ValueType::String | ValueType::Unknown => Value::Str(self.render(true)),
        }
    }

    /// Render as text with the default precision
    pub fn render(&self, subsecond: bool) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Real(v) => format_real(*v, DEFAULT_PRECISION),
            Value::Int(v) => v.to_string(),
            Value::Bool(v) => if *v { "true" } else { "false" }.to_string(),
            Value::DateTime(dt) => dt.render(subsecond),
            Value::Unknown => String::new(),
        }
    }

    /// Render as text with an explicit number of significant digits
    pub fn render_with_precision(&self, precision: usize) -> String {
        match self {
            Value::Real(v) => format_real(*v, precision),
            other => other.render(true),
        }
    }

    /// Total comparison: ladder position across kinds, natural order within
    pub fn compare(a: &Value, b: &Value) -> Ordering {
        let (ta, tb) = (a.value_type(), b.value_type());
        if ta != tb {
            return ta.cmp(&tb);
        }
        match (a, b) {
            (Value::Real(x), Value::Real(y)) => {
                // IEEE equality first so 0.0 == -0.0, then a total order
                if x == y {
                    Ordering::Equal
                } else {
                    x.total_cmp(y)
                }
            }
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::DateTime(x), Value::DateTime(y)) => x.compare(y),
            (Value::Str(x), Value::Str(y)) => x.as_bytes().cmp(y.as_bytes()),
            _ => Ordering::Equal,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Value::compare(self, other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Str(s) => s.hash(state),
            Value::Real(v) => {
                // normalize zeros and NaN payloads to keep Hash consistent
                // with the comparison above
                let bits = if *v == 0.0 {
                    0u64
                } else if v.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    v.to_bits()
                };
                bits.hash(state);
            }
            Value::Int(v) => v.hash(state),
            Value::Bool(v) => v.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Unknown => {}
        }
    }
}

/// Render a real with `sig` significant digits, trimming trailing zeros
pub fn format_real(v: f64, sig: usize) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    let magnitude = v.abs().log10().floor() as i64;
    let decimals = (sig as i64 - 1 - magnitude).clamp(0, 17) as usize;
    let mut s = format!("{:.*}", decimals, v);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

/// `strtod`-style prefix parse. Returns the parsed value and whether the
/// whole token (up to a space) was consumed.
pub fn parse_real_prefix(s: &str) -> (f64, bool) {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut saw_digit = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        saw_digit = true;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            saw_digit = true;
        }
    }
    if saw_digit && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let mut exp_digit = false;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
            exp_digit = true;
        }
        if exp_digit {
            end = exp_end;
        }
    }
    if !saw_digit {
        return (0.0, false);
    }
    let value = t[..end].parse::<f64>().unwrap_or(0.0);
    let rest = &bytes[end..];
    (value, rest.is_empty() || rest[0] == b' ')
}

/// `strtoll`-style prefix parse
pub fn parse_integer_prefix(s: &str) -> (i64, bool) {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let start_digits = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start_digits {
        return (0, false);
    }
    let value = t[..end].parse::<i64>().unwrap_or_else(|_| {
        // saturate on overflow
        if t.starts_with('-') {
            i64::MIN
        } else {
            i64::MAX
        }
    });
    let rest = &bytes[end..];
    (value, rest.is_empty() || rest[0] == b' ')
}

/// Parse a boolean; `exact` reports whether the token was a literal spelling
pub fn parse_boolean(s: &str) -> (bool, bool) {
    if s.eq_ignore_ascii_case("false") || s == "0" {
        return (false, true);
    }
    if s.eq_ignore_ascii_case("true") || s == "1" {
        return (true, true);
    }
    let value = matches!(
        s.chars().next().map(|c| c.to_ascii_lowercase()),
        Some('1') | Some('y') | Some('t')
    );
    (value, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_totality() {
        assert_eq!(Value::Str("12.5".into()).as_real(), 12.5);
        assert_eq!(Value::Str("12abc".into()).as_int(), 12);
        assert_eq!(Value::Str("junk".into()).as_real(), 0.0);
        assert_eq!(Value::Unknown.as_int(), 0);
        assert!(Value::Str("yes".into()).as_bool());
        assert!(!Value::Str("false".into()).as_bool());
        assert!(!Value::Str("0abc".into()).as_bool());
        assert!(!Value::Str("".into()).as_bool());
    }

    #[test]
    fn test_conversion_idempotent() {
        let cases = [
            Value::Str("hello".into()),
            Value::Real(2.75),
            Value::Int(-3),
            Value::Bool(true),
            Value::Str("2024-05-06".into()),
        ];
        for v in cases {
            for ty in [
                ValueType::String,
                ValueType::Real,
                ValueType::Integer,
                ValueType::Boolean,
                ValueType::DateTime,
            ] {
                let once = v.convert(ty);
                let twice = once.convert(ty);
                assert_eq!(once, twice, "{:?} -> {:?}", v, ty);
            }
        }
    }

    #[test]
    fn test_cross_type_ordering_by_ladder() {
        let s = Value::Str("zzz".into());
        let r = Value::Real(1.0);
        let i = Value::Int(1);
        let b = Value::Bool(false);
        assert_eq!(Value::compare(&s, &r), Ordering::Less);
        assert_eq!(Value::compare(&r, &i), Ordering::Less);
        assert_eq!(Value::compare(&i, &b), Ordering::Less);
    }

    #[test]
    fn test_string_to_datetime_error_flag() {
        let dt = Value::Str("not a date".into()).as_datetime();
        assert!(dt.error);
        // error flag survives conversion to string and back
        let rendered = Value::DateTime(dt).render(true);
        assert_eq!(rendered, "");
    }

    #[test]
    fn test_format_real_significant_digits() {
        assert_eq!(format_real(40.0, 10), "40");
        assert_eq!(format_real(20.5, 10), "20.5");
        assert_eq!(format_real(0.125, 10), "0.125");
        assert_eq!(format_real(-3.0, 10), "-3");
        assert_eq!(format_real(1.0 / 3.0, 10), "0.3333333333");
        assert_eq!(format_real(0.0, 10), "0");
    }

    #[test]
    fn test_prefix_parses() {
        assert_eq!(parse_real_prefix("3.5x"), (3.5, false));
        assert_eq!(parse_real_prefix("3.5 trailing"), (3.5, true));
        assert_eq!(parse_integer_prefix("-42"), (-42, true));
        assert_eq!(parse_integer_prefix("abc"), (0, false));
        assert_eq!(parse_boolean("true"), (true, true));
        assert_eq!(parse_boolean("T"), (true, false));
        assert_eq!(parse_boolean("maybe"), (false, false));
    }

    #[test]
    fn test_value_hash_eq_consistency() {
        use rustc_hash::FxHashSet;
        let mut set = FxHashSet::default();
        set.insert(Value::Real(0.0));
        assert!(set.contains(&Value::Real(-0.0)));
        set.insert(Value::Int(5));
        assert!(!set.contains(&Value::Real(5.0))); // cross-type never equal
    }
}
