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

//! Delimited-table adapter
//!
//! Streams a tab- or comma-delimited table as `table`/`row`/field events.
//! The delimiter is auto-detected from the first non-blank line; quoted
//! fields may contain delimiters, doubled quotes, and newlines. Without a
//! header line, fields are named by ordinal.

use std::io::BufRead;

use crate::core::Result;
use crate::engine::{QueryEngine, RowSink};

/// Drive the engine from a delimited table
pub fn run_delim_input<R: BufRead>(
    engine: &mut QueryEngine,
    mut reader: R,
    sink: RowSink,
) -> Result<()> {
    let header = engine.spec.input.header;

    let Some(first_line) = read_line(&mut reader)? else {
        return Ok(());
    };
    let first_line = first_line.trim_end().to_string();

    // tab wins when it splits the first line into two or more fields
    let delimiter = if split_fields(&first_line, '\t').len() >= 2 {
        '\t'
    } else {
        ','
    };

    let mut field_names: Vec<String> = Vec::new();
    let mut pending_first: Option<String> = None;
    if header {
        for mut name in split_fields(&first_line, delimiter) {
            // keep field names tag-friendly
            name = name.replace(['\t', '\n', '\r'], "_");
            if name.is_empty() {
                name = make_ordinal_name(&field_names, field_names.len());
            }
            field_names.push(name);
        }
        engine.add_lines(1);
    } else {
        pending_first = Some(first_line);
    }

    engine.open_tag("table", &[], sink)?;
    loop {
        if engine.stopped() {
            break;
        }
        let line = match pending_first.take() {
            Some(line) => line,
            None => {
                let Some(mut line) = read_line(&mut reader)? else {
                    break;
                };
                // keep reading while a quote spans the line break
                while quotes_open(&line) {
                    let Some(next) = read_line(&mut reader)? else {
                        break;
                    };
                    line.push('\n');
                    line.push_str(&next);
                }
                line
            }
        };
        let line = line.trim_end_matches(['\r']).to_string();
        engine.add_lines(1 + line.matches('\n').count());
        if line.is_empty() {
            continue;
        }

        let values = split_fields(&line, delimiter);
        engine.open_tag("row", &[], sink)?;
        let count = field_names.len().max(values.len());
        for i in 0..count {
            if i == field_names.len() {
                // no-header case and excess-value case both name by ordinal
                let name = make_ordinal_name(&field_names, i);
                field_names.push(name);
            }
            let name = field_names[i].clone();
            engine.open_tag(&name, &[], sink)?;
            if let Some(value) = values.get(i) {
                engine.text(value);
            }
            engine.close_tag(&name, sink)?;
        }
        engine.close_tag("row", sink)?;
    }
    engine.close_tag("table", sink)?;
    Ok(())
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

/// An odd number of unescaped quotes means the field continues on the next
/// physical line
fn quotes_open(line: &str) -> bool {
    let mut open = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => open = !open,
            _ => {}
        }
    }
    open
}

/// Split one logical line into fields, honoring quotes; doubled quotes
/// inside a quoted field collapse to one
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delimiter {
            out.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }
    out.push(field);
    out
}

fn make_ordinal_name(existing: &[String], idx: usize) -> String {
    let mut name = (idx + 1).to_string();
    while existing.contains(&name) {
        // keep prepending until unique
        name.insert(0, '_');
    }
    name
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
            run_delim_input(
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
    fn test_header_named_fields() {
        let rows = run_query(&["category", "sales"], "category,sales\nA,10\nB,20\n");
        assert_eq!(rows, vec![vec!["A", "10"], vec!["B", "20"]]);
    }

    #[test]
    fn test_tab_detection() {
        let rows = run_query(&["a", "b"], "a\tb\n1\t2\n");
        assert_eq!(rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_no_header_ordinal_names() {
        let rows = run_query(&["{1}", "{2}", "--inheader=false"], "x,10\ny,20\n");
        assert_eq!(rows, vec![vec!["x", "10"], vec!["y", "20"]]);
    }

    #[test]
    fn test_quoted_fields() {
        let rows = run_query(
            &["a", "b"],
            "a,b\n\"1,5\",\"say \"\"hi\"\"\"\n",
        );
        assert_eq!(rows, vec![vec!["1,5", "say \"hi\""]]);
    }

    #[test]
    fn test_quoted_newline_spans_lines() {
        let rows = run_query(&["a", "b"], "a,b\n\"line1\nline2\",x\n");
        assert_eq!(rows, vec![vec!["line1\nline2", "x"]]);
    }

    #[test]
    fn test_short_rows_pad_empty() {
        let rows = run_query(&["a", "b"], "a,b\n1\n2,3\n");
        assert_eq!(rows, vec![vec!["1", ""], vec!["2", "3"]]);
    }
}
