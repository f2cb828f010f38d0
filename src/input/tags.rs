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

//! Tag-tree scanner
//!
//! Scans `<tag attr="v">` markup out of a bounded, reused byte buffer and
//! feeds the engine's event stream. A single tag longer than the buffer is
//! an error. Standard character entities in text and attribute values are
//! decoded before they reach the engine.

use std::io::BufRead;

use crate::core::{Error, Result};
use crate::engine::{QueryEngine, RowSink};

/// Must hold the longest single tag, including attributes
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Drive the engine from tag markup
pub fn run_tag_input<R: BufRead>(engine: &mut QueryEngine, reader: R, sink: RowSink) -> Result<()> {
    run_with_buffer_size(engine, reader, sink, DEFAULT_BUFFER_SIZE)
}

fn run_with_buffer_size<R: BufRead>(
    engine: &mut QueryEngine,
    mut reader: R,
    sink: RowSink,
    buffer_size: usize,
) -> Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(buffer_size);
    let mut pos = 0usize;
    let mut eof = false;

    'outer: loop {
        // shift consumed bytes out and refill
        if pos > 0 {
            buf.drain(..pos);
            pos = 0;
        }
        while buf.len() < buffer_size && !eof {
            let mut chunk = [0u8; 8192];
            let want = (buffer_size - buf.len()).min(chunk.len());
            let n = reader.read(&mut chunk[..want])?;
            if n == 0 {
                eof = true;
            } else {
                buf.extend_from_slice(&chunk[..n]);
            }
        }
        if buf.is_empty() {
            break;
        }

        loop {
            if engine.stopped() {
                break 'outer;
            }
            let Some(lt) = find_byte(&buf, pos, b'<') else {
                // no tag start: the rest is character data
                if eof {
                    emit_text(engine, &buf[pos..]);
                    pos = buf.len();
                    break 'outer;
                }
                if pos == 0 && buf.len() >= buffer_size {
                    // flush a full buffer of text
                    emit_text(engine, &buf);
                    pos = buf.len();
                }
                continue 'outer;
            };
            if lt > pos {
                emit_text(engine, &buf[pos..lt]);
                pos = lt;
            }
            let Some(gt) = find_byte(&buf, lt + 1, b'>') else {
                if pos == 0 && buf.len() >= buffer_size {
                    return Err(Error::TagTooLong(buffer_size));
                }
                if eof {
                    // trailing junk with no closing bracket
                    break 'outer;
                }
                continue 'outer;
            };

            let raw = String::from_utf8_lossy(&buf[lt + 1..gt]).into_owned();
            pos = gt + 1;
            engine.add_lines(count_newlines(&buf[lt..gt]));
            process_tag(engine, &raw, sink)?;
        }
    }
    Ok(())
}

fn emit_text(engine: &mut QueryEngine, bytes: &[u8]) {
    engine.add_lines(count_newlines(bytes));
    if bytes.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(bytes);
    engine.text(&decode_entities(&text));
}

fn process_tag(engine: &mut QueryEngine, raw: &str, sink: RowSink) -> Result<()> {
    let mut label = raw.trim();
    if label.is_empty() {
        return Err(Error::MalformedTag(format!("<{}>", raw)));
    }

    // processing instructions and declarations carry no events
    if label.starts_with('?') || label.starts_with('!') {
        return Ok(());
    }

    if let Some(end_name) = label.strip_prefix('/') {
        engine.close_tag(end_name.trim(), sink)?;
        return Ok(());
    }

    let self_terminating = label.ends_with('/');
    if self_terminating {
        label = label[..label.len() - 1].trim_end();
    }

    let (name, attrs) = split_tag_label(label)?;
    engine.open_tag(&name, &attrs, sink)?;
    if self_terminating {
        engine.close_tag(&name, sink)?;
    }
    Ok(())
}

/// Split a start-tag label into its name and attribute pairs. Attributes
/// are recognized by the presence of a quote; otherwise the whole label is
/// the name (names may contain spaces).
fn split_tag_label(label: &str) -> Result<(String, Vec<(String, String)>)> {
    if !label.contains('"') && !label.contains('\'') {
        if label.is_empty() {
            return Err(Error::MalformedTag(format!("<{}>", label)));
        }
        return Ok((label.to_string(), Vec::new()));
    }
    let words = split_quoted(label);
    let Some(name) = words.first() else {
        return Err(Error::MalformedTag(format!("<{}>", label)));
    };
    let mut attrs = Vec::new();
    for word in &words[1..] {
        let Some((attr_name, attr_value)) = word.split_once('=') else {
            return Err(Error::MalformedTag(format!("<{}>", label)));
        };
        let attr_value = attr_value.trim();
        let unquoted = attr_value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| {
                attr_value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
            });
        let Some(value) = unquoted else {
            return Err(Error::MalformedTag(format!("<{}>", label)));
        };
        attrs.push((attr_name.trim().to_string(), decode_entities(value)));
    }
    Ok((name.clone(), attrs))
}

/// Split on whitespace, keeping quoted runs together
fn split_quoted(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                current.push(c);
                quote = Some(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Decode the standard character entities plus numeric references
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest[..rest.len().min(10)].find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn find_byte(buf: &[u8], from: usize, byte: u8) -> Option<usize> {
    buf[from.min(buf.len())..]
        .iter()
        .position(|&b| b == byte)
        .map(|p| p + from)
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp; c"), "a <b> & c");
        assert_eq!(decode_entities("&quot;x&quot;"), "\"x\"");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("no entities"), "no entities");
        assert_eq!(decode_entities("lone & stays"), "lone & stays");
    }

    #[test]
    fn test_split_tag_label() {
        let (name, attrs) = split_tag_label("foo a=\"1\" b='two'").unwrap();
        assert_eq!(name, "foo");
        assert_eq!(
            attrs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string())
            ]
        );
        // no quotes anywhere: the whole label is the name
        let (name, attrs) = split_tag_label("foo bare").unwrap();
        assert_eq!(name, "foo bare");
        assert!(attrs.is_empty());
        // quoted attributes make unquoted words malformed
        assert!(split_tag_label("foo a=\"1\" bare").is_err());
    }

    #[test]
    fn test_split_quoted_keeps_spaces_in_quotes() {
        assert_eq!(
            split_quoted("tag attr=\"a b\" c='d'"),
            vec!["tag", "attr=\"a b\"", "c='d'"]
        );
    }
}
