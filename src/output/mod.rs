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

//! CSV row writer
//!
//! Emits output column names (when enabled) followed by one CSV-normalized
//! line per row. A `pivotpath` column expands each row into a sequence of
//! dotted-prefix roll-up rows.

use std::io::{self, Write};

use crate::core::Row;
use crate::parser::{Opcode, QuerySpec};

/// Writes emitted rows as CSV
pub struct CsvWriter<W: Write> {
    out: W,
    header_pending: bool,
    error: Option<io::Error>,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W, header: bool) -> Self {
        CsvWriter {
            out,
            header_pending: header,
            error: None,
        }
    }

    /// First I/O failure, if any; row sinks cannot propagate errors inline
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn write_row(&mut self, spec: &QuerySpec, row: &Row, repeat: usize) {
        if self.error.is_some() {
            return;
        }
        for _ in 0..repeat {
            if let Err(err) = self.print_row(spec, row) {
                self.error = Some(err);
                return;
            }
        }
    }

    fn print_row(&mut self, spec: &QuerySpec, row: &Row) -> io::Result<()> {
        if self.header_pending {
            let mut first = true;
            for id in spec.columns.ordered() {
                let col = spec.columns.col(id);
                if !col.is_output() {
                    continue;
                }
                if !first {
                    self.out.write_all(b",")?;
                }
                first = false;
                self.out.write_all(csv_normalize(&col.name).as_bytes())?;
            }
            self.out.write_all(b"\n")?;
            self.header_pending = false;
        }

        // a pivot-path value renders as a roll-up, one row per prefix depth
        let mut pivot_parts: Vec<String> = Vec::new();
        let mut pivot_index: Option<usize> = None;
        loop {
            let mut first = true;
            let mut more_rows = false;
            for id in spec.columns.ordered() {
                let col = spec.columns.col(id);
                if !col.is_output() {
                    continue;
                }
                let Some(value_idx) = col.value_idx else {
                    continue;
                };
                let mut value = row[value_idx].render(true);

                if spec.arena.node(col.expr).opcode() == Opcode::PivotPath {
                    if pivot_index.is_none() {
                        pivot_parts = value.split('.').map(str::to_string).collect();
                        pivot_index = Some(0);
                    }
                    let at = pivot_index.unwrap_or(0);
                    value = pivot_parts[at.min(pivot_parts.len())..].join(".");
                    if at + 1 < pivot_parts.len() {
                        pivot_index = Some(at + 1);
                        more_rows = true;
                    }
                }

                if !first {
                    self.out.write_all(b",")?;
                }
                first = false;
                self.out.write_all(csv_normalize(&value).as_bytes())?;
            }
            self.out.write_all(b"\n")?;
            if !more_rows {
                break;
            }
        }
        self.out.flush()
    }
}

/// Quote iff the value contains a comma, quote, or newline; embedded quotes
/// double
pub fn csv_normalize(s: &str) -> String {
    let needs_quotes = s.contains(',') || s.contains('"') || s.contains('\n');
    if !needs_quotes {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    #[test]
    fn test_csv_normalize() {
        assert_eq!(csv_normalize("plain"), "plain");
        assert_eq!(csv_normalize("a,b"), "\"a,b\"");
        assert_eq!(csv_normalize("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_normalize("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_header_then_rows() {
        let mut spec = QuerySpec::new();
        spec.parse_column_specs(&["a".to_string(), "b".to_string()])
            .unwrap();
        let mut buf = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut buf, true);
            writer.write_row(&spec, &vec![Value::Int(1), Value::Str("x,y".into())], 1);
            writer.write_row(&spec, &vec![Value::Int(2), Value::Str("z".into())], 2);
            assert!(writer.take_error().is_none());
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "a,b\n1,\"x,y\"\n2,z\n2,z\n");
    }
}
