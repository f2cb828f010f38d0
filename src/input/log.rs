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

//! Log-line adapter
//!
//! Each record begins with a timestamp, then an optional level and an
//! optional `CATEGORY -` prefix. Records become `log` tags with `time`,
//! `level`, `category`, and `msg` children; embedded objects anywhere in
//! the message merge into the record. `TRACE START`/`END`/`ROOT` records
//! manage a tag scope carrying their embedded object instead.

use std::io::BufRead;

use crate::core::{PackedDateTime, Result};
use crate::engine::{QueryEngine, RowSink};

use super::object::parse_object_str;

/// Lines tolerated before the first recognizable log line
const MAX_SEEK_LINES: usize = 10;

#[derive(Debug)]
struct LogRecord {
    time: PackedDateTime,
    level: String,
    category: String,
    msg: String,
}

/// Drive the engine from timestamped log lines
pub fn run_log_input<R: BufRead>(
    engine: &mut QueryEngine,
    mut reader: R,
    sink: RowSink,
) -> Result<()> {
    let mut opened_scopes: Vec<String> = Vec::new();

    // scan past leading non-log lines
    let mut next: Option<LogRecord> = None;
    let mut seek = MAX_SEEK_LINES;
    while seek > 0 {
        let Some(line) = read_line(&mut reader)? else {
            return Ok(());
        };
        engine.add_lines(1);
        if let Some(record) = parse_log_line(&line) {
            next = Some(record);
            break;
        }
        seek -= 1;
    }
    let Some(mut current) = next else {
        return Ok(());
    };

    let mut eof = false;
    while !eof {
        // append continuation lines until the next log line
        let mut following: Option<LogRecord> = None;
        loop {
            let Some(line) = read_line(&mut reader)? else {
                eof = true;
                break;
            };
            engine.add_lines(1);
            if let Some(record) = parse_log_line(&line) {
                following = Some(record);
                break;
            }
            current.msg.push('\n');
            current.msg.push_str(&line);
        }

        emit_record(engine, &current, &mut opened_scopes, sink)?;
        if engine.stopped() {
            break;
        }

        match following {
            Some(record) => current = record,
            None => break,
        }
    }

    // close any scope left open by unbalanced START records
    while let Some(name) = opened_scopes.pop() {
        engine.close_tag(&name, sink)?;
    }
    Ok(())
}

fn emit_record(
    engine: &mut QueryEngine,
    record: &LogRecord,
    opened_scopes: &mut Vec<String>,
    sink: RowSink,
) -> Result<()> {
    let mut msg = record.msg.clone();
    let embedded = extract_embedded_object(&msg);

    if record.level == "TRACE" {
        match record.category.as_str() {
            "START" => {
                // the scope tag is the object's label; its members land
                // inside and stay open until the matching END
                let (label, body) = match &embedded {
                    Some(found) => (
                        found.label.clone().unwrap_or_else(|| "trace".to_string()),
                        Some(found.body.clone()),
                    ),
                    None => ("trace".to_string(), None),
                };
                match body {
                    Some(text) => {
                        if let Ok(Some(opened)) =
                            parse_object_str(engine, &text, &label, true, sink)
                        {
                            opened_scopes.push(opened);
                        }
                    }
                    None => {
                        engine.open_tag(&label, &[], sink)?;
                        opened_scopes.push(label);
                    }
                }
                return Ok(());
            }
            "END" => {
                if let Some(name) = opened_scopes.pop() {
                    engine.close_tag(&name, sink)?;
                }
                return Ok(());
            }
            "ROOT" => {
                // logs guard against unbalanced START/END by expecting to
                // be back at zero depth here
                while let Some(name) = opened_scopes.pop() {
                    engine.close_tag(&name, sink)?;
                }
                return Ok(());
            }
            _ => {}
        }
    }

    engine.open_tag("log", &[], sink)?;
    emit_field(engine, "time", &record.time.render(true), sink)?;
    emit_field(engine, "level", &record.level, sink)?;
    emit_field(engine, "category", &record.category, sink)?;
    if let Some(found) = &embedded {
        // merge the object into the record and drop it from the message
        let _ = parse_object_str(engine, &found.wrapped(), "json", false, sink);
        msg.replace_range(found.start..found.end, "");
    }
    emit_field(engine, "msg", msg.trim(), sink)?;
    engine.close_tag("log", sink)?;
    Ok(())
}

fn emit_field(engine: &mut QueryEngine, name: &str, value: &str, sink: RowSink) -> Result<()> {
    engine.open_tag(name, &[], sink)?;
    engine.text(value);
    engine.close_tag(name, sink)
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Tokenize one line on spaces and brackets, keeping byte offsets so the
/// message tail can be recovered verbatim
fn split_log_parts(line: &str) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in line.char_indices() {
        if c == ' ' || c == '[' || c == ']' {
            if let Some(s) = start.take() {
                parts.push((s, &line[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        parts.push((s, &line[s..]));
    }
    parts
}

fn parse_log_line(line: &str) -> Option<LogRecord> {
    let parts = split_log_parts(line);
    let num_parts = parts.len();
    let digit0 = num_parts >= 1 && parts[0].1.starts_with(|c: char| c.is_ascii_digit());
    let digit1 = num_parts >= 2 && parts[1].1.starts_with(|c: char| c.is_ascii_digit());

    let mut curr = 0;
    let time = if num_parts == 1 && digit0 {
        curr = 1;
        PackedDateTime::parse(parts[0].1, "")
    } else if num_parts >= 2 && digit0 && !digit1 {
        curr = 1;
        PackedDateTime::parse(parts[0].1, "")
    } else if num_parts >= 2 && digit0 && digit1 {
        curr = 2;
        PackedDateTime::parse(parts[0].1, parts[1].1)
    } else {
        return None;
    };
    if time.error {
        return None;
    }

    let level = if curr < num_parts {
        let level = parts[curr].1.to_string();
        curr += 1;
        level
    } else {
        String::new()
    };

    // categories are separated from the message by " - "
    let category = if curr + 1 < num_parts && parts[curr + 1].1 == "-" {
        let category = parts[curr].1.to_string();
        curr += 2;
        category
    } else {
        String::new()
    };

    let msg = if curr < num_parts {
        line[parts[curr].0..].to_string()
    } else {
        String::new()
    };

    Some(LogRecord {
        time,
        level,
        category,
        msg,
    })
}

/// A balanced `{...}` found in a message, possibly labeled `foo:{...}`
struct EmbeddedObject {
    label: Option<String>,
    body: String,
    /// Byte span in the message covering the label and object
    start: usize,
    end: usize,
}

impl EmbeddedObject {
    /// The object text to parse: `foo:{...}` reforms as `{foo:{...}}`
    fn wrapped(&self) -> String {
        match &self.label {
            Some(label) => format!("{{{}:{}}}", label, self.body),
            None => self.body.clone(),
        }
    }
}

/// Find the first balanced object expression in a message
fn extract_embedded_object(msg: &str) -> Option<EmbeddedObject> {
    let bytes = msg.as_bytes();
    let mut depth = 0usize;
    let mut begin = None;
    let mut end = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    begin = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth == 0 {
                    return None; // brace out of order
                }
                depth -= 1;
                if depth == 0 {
                    end = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let (begin, end) = (begin?, end?);

    // look back for `label:` immediately preceding the object
    let mut label_start = begin;
    let prefix = &msg[..begin];
    let trimmed = prefix.trim_end();
    let mut label = None;
    if let Some(stripped) = trimmed.strip_suffix(':') {
        let name_end = stripped.len();
        let name_start = stripped
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
            .map(|p| p + 1)
            .unwrap_or(0);
        if name_start < name_end {
            label = Some(stripped[name_start..name_end].to_string());
            label_start = name_start;
        }
    }

    Some(EmbeddedObject {
        label,
        body: msg[begin..end].to_string(),
        start: label_start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{collect_rows, CancelToken, PassType};

    fn run_query(args: &[&str], input: &str) -> Vec<Vec<String>> {
        let mut engine = QueryEngine::new(CancelToken::new());
        for arg in args {
            engine.add_column(arg);
        }
        engine.finish_columns().unwrap();
        engine.reset(PassType::Main);
        let mut rows = Vec::new();
        {
            let mut sink = collect_rows(&mut rows);
            run_log_input(
                &mut engine,
                std::io::BufReader::new(input.as_bytes()),
                &mut sink,
            )
            .unwrap();
        }
        rows.iter()
            .map(|row| row.iter().map(|v| v.render(true)).collect())
            .collect()
    }

    #[test]
    fn test_basic_log_line() {
        let rows = run_query(
            &["time", "level", "msg"],
            "2024-01-02 03:04:05 INFO hello world\n",
        );
        assert_eq!(
            rows,
            vec![vec!["2024-01-02 03:04:05", "INFO", "hello world"]]
        );
    }

    #[test]
    fn test_category_prefix() {
        let rows = run_query(
            &["level", "category", "msg"],
            "2024-01-02 03:04:05 WARN DISK - almost full\n",
        );
        assert_eq!(rows, vec![vec!["WARN", "DISK", "almost full"]]);
    }

    #[test]
    fn test_bracketed_timestamp() {
        let rows = run_query(
            &["time", "msg"],
            "[2024-01-02 03:04:05] started up\n",
        );
        assert_eq!(rows, vec![vec!["2024-01-02 03:04:05", "started up"]]);
    }

    #[test]
    fn test_continuation_lines_append_to_msg() {
        let rows = run_query(
            &["msg"],
            "2024-01-02 03:04:05 INFO first\n  continued here\n2024-01-02 03:04:06 INFO second\n",
        );
        assert_eq!(rows.len(), 2);
        assert!(rows[0][0].contains("first"));
        assert!(rows[0][0].contains("continued here"));
        assert_eq!(rows[1][0], "second");
    }

    #[test]
    fn test_embedded_object_merges_into_record() {
        let rows = run_query(
            &["msg", "user.name"],
            "2024-01-02 03:04:05 INFO login user:{name: alice} ok\n",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "alice");
        assert!(rows[0][0].contains("login"));
        assert!(!rows[0][0].contains("alice"));
    }

    #[test]
    fn test_leading_junk_lines_are_skipped() {
        let rows = run_query(
            &["msg"],
            "banner line\nanother\n2024-01-02 03:04:05 INFO real\n",
        );
        assert_eq!(rows, vec![vec!["real"]]);
    }

    #[test]
    fn test_parse_log_line_shapes() {
        assert!(parse_log_line("not a log line").is_none());
        let r = parse_log_line("2024-01-02 03:04:05.250 DEBUG x").unwrap();
        assert_eq!(r.level, "DEBUG");
        assert_eq!(r.time.ms, 2500);
        let r = parse_log_line("2024-01-02 note").unwrap();
        assert_eq!(r.level, "note");
        assert_eq!(r.msg, "");
    }

    #[test]
    fn test_extract_embedded_object() {
        let found = extract_embedded_object("before data:{a: {b: 1}} after").unwrap();
        assert_eq!(found.label.as_deref(), Some("data"));
        assert_eq!(found.body, "{a: {b: 1}}");
        assert_eq!(found.wrapped(), "{data:{a: {b: 1}}}");
        assert!(extract_embedded_object("no braces").is_none());
        assert!(extract_embedded_object("} bad {").is_none());
    }
}
