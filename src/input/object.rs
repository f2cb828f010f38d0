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

//! Object-dialect adapter
//!
//! Parses a nested object/array document into tag events: objects become
//! nested tags, arrays repeat the enclosing key name (positional ordinals
//! for nested arrays), and an `_attr` object leading its parent becomes the
//! parent's attributes. The grammar is deliberately lenient: keys and
//! scalar values may be unquoted, which log-embedded objects rely on.

use std::io::BufRead;

use crate::core::{Error, Result};
use crate::engine::{QueryEngine, RowSink};

/// Drive the engine from an object/array document (or a stream of them)
pub fn run_object_input<R: BufRead>(
    engine: &mut QueryEngine,
    mut reader: R,
    sink: RowSink,
) -> Result<()> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut parser = ObjectParser::new(&text);
    loop {
        parser.skip_ws();
        match parser.peek() {
            None => break,
            Some('{') => {
                parser.parse_object(engine, "json", false, sink)?;
            }
            Some('[') => {
                engine.open_tag("json", &[], sink)?;
                parser.parse_array(engine, "row", sink)?;
                engine.close_tag("json", sink)?;
            }
            Some(c) => return Err(Error::Unexpected(c.to_string())),
        }
        if engine.stopped() {
            break;
        }
    }
    Ok(())
}

/// Parse one embedded object expression (e.g. extracted from a log line).
/// With `leave_outer_open`, the enclosing tag stays open for a later
/// scope-closing event; its name is returned.
pub fn parse_object_str(
    engine: &mut QueryEngine,
    text: &str,
    outer_tag: &str,
    leave_outer_open: bool,
    sink: RowSink,
) -> Result<Option<String>> {
    let mut parser = ObjectParser::new(text);
    parser.skip_ws();
    if parser.peek() != Some('{') {
        return Err(Error::Unexpected(
            parser.peek().map(|c| c.to_string()).unwrap_or_default(),
        ));
    }
    if leave_outer_open {
        engine.open_tag(outer_tag, &[], sink)?;
        parser.parse_object_body(engine, sink)?;
        Ok(Some(outer_tag.to_string()))
    } else {
        parser.parse_object_members_inline(engine, sink)?;
        Ok(None)
    }
}

struct ObjectParser<'a> {
    chars: Vec<char>,
    pos: usize,
    text: &'a str,
}

impl<'a> ObjectParser<'a> {
    fn new(text: &'a str) -> Self {
        ObjectParser {
            chars: text.chars().collect(),
            pos: 0,
            text,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(Error::Expected {
                expected: expected.to_string(),
                got: c.to_string(),
            }),
            None => Err(Error::Expected {
                expected: expected.to_string(),
                got: "end of input".to_string(),
            }),
        }
    }

    /// `{ ... }` emitted as a tag named `name`
    fn parse_object(
        &mut self,
        engine: &mut QueryEngine,
        name: &str,
        _nested: bool,
        sink: RowSink,
    ) -> Result<()> {
        self.expect('{')?;

        // a leading `_attr` object becomes this tag's attributes
        let attrs = self.try_parse_leading_attrs()?;
        engine.open_tag(name, &attrs, sink)?;
        self.parse_members(engine, sink)?;
        self.expect('}')?;
        engine.close_tag(name, sink)?;
        Ok(())
    }

    /// `{` already consumed by the caller opening the tag itself
    fn parse_object_body(&mut self, engine: &mut QueryEngine, sink: RowSink) -> Result<()> {
        self.expect('{')?;
        self.parse_members(engine, sink)?;
        self.expect('}')?;
        Ok(())
    }

    /// `{ ... }` whose members merge into the current scope without an
    /// enclosing tag of their own
    fn parse_object_members_inline(
        &mut self,
        engine: &mut QueryEngine,
        sink: RowSink,
    ) -> Result<()> {
        self.parse_object_body(engine, sink)
    }

    fn try_parse_leading_attrs(&mut self) -> Result<Vec<(String, String)>> {
        let save = self.pos;
        self.skip_ws();
        let Some(key) = self.try_parse_key()? else {
            self.pos = save;
            return Ok(Vec::new());
        };
        if key != "_attr" {
            self.pos = save;
            return Ok(Vec::new());
        }
        self.skip_ws();
        self.expect(':')?;
        self.skip_ws();
        self.expect('{')?;
        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let Some(attr_key) = self.try_parse_key()? else {
                return Err(Error::Unexpected("attribute name".to_string()));
            };
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.parse_scalar()?;
            attrs.push((attr_key, value));
            self.skip_ws();
            if self.peek() == Some(',') {
                self.bump();
            }
        }
        // a comma after the _attr object belongs to the member list
        self.skip_ws();
        if self.peek() == Some(',') {
            self.bump();
        }
        Ok(attrs)
    }

    fn parse_members(&mut self, engine: &mut QueryEngine, sink: RowSink) -> Result<()> {
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') | None => return Ok(()),
                Some(',') => {
                    self.bump();
                    continue;
                }
                _ => {}
            }
            let Some(key) = self.try_parse_key()? else {
                return Err(Error::Unexpected(
                    self.peek().map(|c| c.to_string()).unwrap_or_default(),
                ));
            };
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            self.parse_value(engine, &key, sink)?;
        }
    }

    fn parse_value(&mut self, engine: &mut QueryEngine, key: &str, sink: RowSink) -> Result<()> {
        match self.peek() {
            Some('{') => self.parse_object(engine, key, true, sink),
            Some('[') => self.parse_array(engine, key, sink),
            _ => {
                let value = self.parse_scalar()?;
                engine.open_tag(key, &[], sink)?;
                engine.text(&value);
                engine.close_tag(key, sink)?;
                Ok(())
            }
        }
    }

    /// Arrays repeat the enclosing key name; nested arrays fall back to
    /// positional ordinals
    fn parse_array(&mut self, engine: &mut QueryEngine, name: &str, sink: RowSink) -> Result<()> {
        self.expect('[')?;
        let mut ordinal = 0usize;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(());
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                None => return Err(Error::Unexpected("end of input".to_string())),
                Some('[') => {
                    ordinal += 1;
                    self.parse_array(engine, &ordinal.to_string(), sink)?;
                }
                Some('{') => {
                    ordinal += 1;
                    self.parse_object(engine, name, true, sink)?;
                }
                _ => {
                    ordinal += 1;
                    let value = self.parse_scalar()?;
                    engine.open_tag(name, &[], sink)?;
                    engine.text(&value);
                    engine.close_tag(name, sink)?;
                }
            }
        }
    }

    fn try_parse_key(&mut self) -> Result<Option<String>> {
        self.skip_ws();
        match self.peek() {
            Some('"') | Some('\'') => Ok(Some(self.parse_quoted()?)),
            Some(c) if c.is_alphanumeric() || c == '_' => {
                let mut key = String::new();
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        key.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Ok(Some(key))
            }
            _ => Ok(None),
        }
    }

    fn parse_scalar(&mut self) -> Result<String> {
        match self.peek() {
            Some('"') | Some('\'') => self.parse_quoted(),
            _ => {
                // unquoted token: run to a delimiter
                let mut value = String::new();
                while let Some(c) = self.peek() {
                    if matches!(c, ',' | '}' | ']') || c == '\n' {
                        break;
                    }
                    value.push(c);
                    self.pos += 1;
                }
                Ok(value.trim().to_string())
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String> {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::UnterminatedString),
                Some('\\') => match self.bump() {
                    None => return Err(Error::DanglingEscape),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('u') => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            if let Some(c) = self.bump() {
                                code.push(c);
                            }
                        }
                        if let Some(c) =
                            u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
                        {
                            value.push(c);
                        }
                    }
                    Some(other) => value.push(other),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
            }
        }
    }

    /// Consumed portion, used by callers that splice text back out
    #[allow(dead_code)]
    fn consumed(&self) -> &'a str {
        let bytes: usize = self.chars[..self.pos].iter().map(|c| c.len_utf8()).sum();
        &self.text[..bytes]
    }
}
