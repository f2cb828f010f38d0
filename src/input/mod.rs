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

//! Input dialects
//!
//! An explicit byte probe classifies the input; each dialect has its own
//! adapter that normalizes records into the engine's tag event stream.

pub mod delim;
pub mod log;
pub mod object;
pub mod tags;

use std::io::{BufRead, Cursor, Read};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::Result;
use crate::engine::{QueryEngine, RowSink};

/// The recognized input shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `<tag>` tree
    TagTree,
    /// Nested object/array format (covers anonymous top-level arrays)
    Object,
    /// Timestamped log lines
    Log,
    /// Delimited table, tab or comma
    Delimited,
}

static LOG_LINE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[?\s*\d{1,4}-\d{1,2}-\d{1,2}([ T]\d{1,2}:\d{2}:\d{2})?").expect("log regex")
});

static BRACKET_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\s*\d{1,4}-\d{1,2}-\d{1,2}").expect("date regex")
});

/// Classify an input from its leading bytes
pub fn probe(prefix: &str) -> Dialect {
    let trimmed = prefix.trim_start();
    match trimmed.chars().next() {
        Some('<') => Dialect::TagTree,
        Some('{') => Dialect::Object,
        Some('[') => {
            if BRACKET_DATE.is_match(trimmed) {
                Dialect::Log
            } else {
                // anonymous top-level array
                Dialect::Object
            }
        }
        Some(_) => {
            let first_line = trimmed.lines().next().unwrap_or("");
            if LOG_LINE_START.is_match(first_line) {
                Dialect::Log
            } else {
                Dialect::Delimited
            }
        }
        None => Dialect::Delimited,
    }
}

/// Probe a reader, then run the matching adapter over the whole input
pub fn run_input<R: BufRead>(engine: &mut QueryEngine, mut reader: R, sink: RowSink) -> Result<()> {
    // pull a prefix for the probe, then stitch it back in front
    let mut prefix = vec![0u8; 4096];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    prefix.truncate(filled);
    let dialect = probe(&String::from_utf8_lossy(&prefix));
    let chained = std::io::BufReader::new(Cursor::new(prefix).chain(reader));

    match dialect {
        Dialect::TagTree => tags::run_tag_input(engine, chained, sink),
        Dialect::Object => object::run_object_input(engine, chained, sink),
        Dialect::Log => log::run_log_input(engine, chained, sink),
        Dialect::Delimited => delim::run_delim_input(engine, chained, sink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_tag_tree() {
        assert_eq!(probe("  <root><a>1</a></root>"), Dialect::TagTree);
    }

    #[test]
    fn test_probe_object() {
        assert_eq!(probe("{\"a\": 1}"), Dialect::Object);
        assert_eq!(probe("[1, 2, 3]"), Dialect::Object);
    }

    #[test]
    fn test_probe_log() {
        assert_eq!(probe("[2015-10-10 12:00:00] started"), Dialect::Log);
        assert_eq!(probe("2024-01-02 03:04:05 INFO hello"), Dialect::Log);
        assert_eq!(probe("2024-01-02 started"), Dialect::Log);
    }

    #[test]
    fn test_probe_delimited() {
        assert_eq!(probe("category,sales\nA,10"), Dialect::Delimited);
        assert_eq!(probe("a\tb\t c"), Dialect::Delimited);
        assert_eq!(probe(""), Dialect::Delimited);
    }
}
