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

//! Driver glue
//!
//! Expands argument-inclusion files, assembles the join index with a
//! secondary engine, sequences the query passes over the selected input,
//! and wires emitted rows into the CSV writer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::core::{hash_row_indices, Error, IndexedRows, Result, Row};
use crate::engine::{CancelToken, PassType, QueryEngine};
use crate::input;
use crate::output::CsvWriter;
use crate::parser::{qflags, QuerySpec};

/// Where a pass reads its bytes from
enum InputSource {
    Stdin,
    File(String),
    /// In-memory input; reopenable, which multi-pass tests rely on
    Text(String),
}

impl InputSource {
    fn open(&self) -> Result<Box<dyn BufRead>> {
        match self {
            InputSource::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            InputSource::File(path) => {
                let file = File::open(path).map_err(|_| Error::InputOpen(path.clone()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            InputSource::Text(text) => Ok(Box::new(Cursor::new(text.clone().into_bytes()))),
        }
    }

    fn reopenable(&self) -> bool {
        !matches!(self, InputSource::Stdin)
    }
}

/// One query invocation
pub struct Driver {
    engine: QueryEngine,
    cancel: CancelToken,
    input_override: Option<String>,
}

impl Driver {
    pub fn new(cancel: CancelToken) -> Self {
        Driver {
            engine: QueryEngine::new(cancel.clone()),
            cancel,
            input_override: None,
        }
    }

    /// Use in-memory input instead of the `in[...]` file or standard input
    pub fn with_input(mut self, text: impl Into<String>) -> Self {
        self.input_override = Some(text.into());
        self
    }

    /// Parse column arguments (expanding `@` files). Returns true when the
    /// query only asks for the usage text.
    pub fn initialize(&mut self, args: &[String]) -> Result<bool> {
        let mut specs = Vec::new();
        expand_args(args, &mut specs)?;
        for spec in &specs {
            self.engine.add_column(spec);
        }
        self.engine.finish_columns()?;
        Ok(self.engine.spec.is_flag_set(qflags::SHOW_USAGE))
    }

    /// Run all passes, writing CSV rows to `out`
    pub fn run<W: Write>(&mut self, out: W) -> Result<()> {
        if self.engine.spec.is_flag_set(qflags::LEFT_SIDE_OF_JOIN) {
            let indexed = self.load_indexed_join()?;
            self.engine.pipeline.set_indexed_join(indexed);
        }

        let source = match &self.input_override {
            Some(text) => InputSource::Text(text.clone()),
            None => match &self.engine.spec.input.filename {
                Some(path) => InputSource::File(path.clone()),
                None => InputSource::Stdin,
            },
        };

        let mut writer = CsvWriter::new(out, self.engine.spec.output.header);
        let engine = &mut self.engine;
        let cancel = self.cancel.clone();
        let mut sink = |spec: &QuerySpec, row: &Row, repeat: usize| {
            writer.write_row(spec, row, repeat);
        };
        run_passes(engine, &source, &cancel, &mut sink)?;
        drop(sink);
        if let Some(err) = writer.take_error() {
            return Err(Error::Io(err));
        }
        Ok(())
    }

    /// Run the secondary query against the join input, hashing each row by
    /// its indexed columns into the bucket table the main pass probes.
    fn load_indexed_join(&mut self) -> Result<IndexedRows> {
        let join_spec = QuerySpec::for_join_side(&self.engine.spec)?;
        let indices: Vec<usize> = self
            .engine
            .spec
            .join
            .equalities
            .iter()
            .map(|&(join_idx, _)| join_idx)
            .collect();
        let source = InputSource::File(self.engine.spec.join.filename.clone());

        let mut join_engine = QueryEngine::from_spec(join_spec, self.cancel.clone());
        let mut buckets: FxHashMap<u64, Vec<Row>> = FxHashMap::default();
        {
            let mut sink = |_spec: &QuerySpec, row: &Row, _repeat: usize| {
                // equality re-checks make hash collisions harmless
                let hash = hash_row_indices(row, &indices);
                buckets.entry(hash).or_default().push(row.clone());
            };
            run_passes(&mut join_engine, &source, &self.cancel, &mut sink)?;
        }

        let mut indexed = IndexedRows::default();
        for (hash, rows) in buckets {
            indexed.insert(hash, Rc::new(rows));
        }
        Ok(indexed)
    }
}

fn run_passes(
    engine: &mut QueryEngine,
    source: &InputSource,
    cancel: &CancelToken,
    sink: &mut dyn FnMut(&QuerySpec, &Row, usize),
) -> Result<()> {
    let passes = engine.pass_types();
    if passes.len() > 1 && passes[0] == PassType::GatherData && !source.reopenable() {
        return Err(Error::GatherNeedsFile);
    }
    for pass in passes {
        if cancel.is_cancelled() && pass != PassType::StoredValues {
            break;
        }
        match pass {
            PassType::GatherData | PassType::Main => {
                engine.reset(pass);
                let reader = source.open()?;
                input::run_input(engine, reader, sink)?;
                engine.check_unreferenced()?;
            }
            PassType::StoredValues => {
                engine.output_stored_rows(sink);
            }
            PassType::NotSet => {}
        }
    }
    Ok(())
}

/// Expand the argument list: `@file` (or `file@`) pulls further column
/// specs from the file, whitespace-delimited, with `#` comments outside
/// quotes and braces.
fn expand_args(args: &[String], out: &mut Vec<String>) -> Result<()> {
    for arg in args {
        let arg_file = if let Some(name) = arg.strip_prefix('@') {
            Some(name)
        } else {
            arg.strip_suffix('@')
        };
        let Some(name) = arg_file else {
            out.push(arg.clone());
            continue;
        };
        if name.is_empty() {
            return Err(Error::ArgFileMissing);
        }
        let file = File::open(name).map_err(|_| Error::ArgFileOpen(name.to_string()))?;
        let mut text = String::new();
        BufReader::new(file).read_to_string(&mut text)?;
        for line in text.lines() {
            let stripped = strip_comment(line);
            let nested: Vec<String> = split_arg_line(stripped);
            expand_args(&nested, out)?;
        }
    }
    Ok(())
}

/// Truncate at the first `#` that sits outside quotes and braces
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut brace_depth = 0usize;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' => brace_depth += 1,
                '}' => brace_depth = brace_depth.saturating_sub(1),
                '#' if brace_depth == 0 => return &line[..i],
                _ => {}
            },
        }
    }
    line
}

/// Split a line of column specs on whitespace, keeping quoted and braced
/// runs together
fn split_arg_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut brace_depth = 0usize;
    for c in line.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    current.push(c);
                    quote = Some(c);
                }
                '{' => {
                    current.push(c);
                    brace_depth += 1;
                }
                '}' => {
                    current.push(c);
                    brace_depth = brace_depth.saturating_sub(1);
                }
                c if c.is_whitespace() && brace_depth == 0 => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// The `help`/`usage` directive's text
pub fn usage() -> &'static str {
    "usage: treeq [column-spec ...]\n\
     \n\
     Each argument is `expression` or `name[,name,...]:expression`. Quote\n\
     names or path segments with {braces}. An argument starting or ending\n\
     with @ names a file of further arguments. --flag[=value] is shorthand\n\
     for flag[value].\n\
     \n\
     Paths            a.b.c with * wildcards; join::path for the join side\n\
     Arithmetic       + - * / % neg abs round floor ceil sqrt pow log exp\n\
     Comparison       == != <= >= < >   logical: and or xor not\n\
     Strings          len left right upper lower contains find concat (&)\n\
     Casts            real int bool str datetime type\n\
     On-match         path pivotpath depth nodename nodenum nodestart\n\
     \u{20}                nodeend attr (..) linenum rownum\n\
     Aggregates       any sum avg min max stdev var cov corr count\n\
     Directives       in[file] join[file[,outer]] where[cond] sort[keys]\n\
     \u{20}                first[n] top[n] distinct pivot(names,values[,jagged])\n\
     \u{20}                sync[path] root[n] case inheader outheader\n\
     \u{20}                joinheader help\n"
}

/// Convenience entry point: run a query over in-memory input and collect
/// the CSV output. Used heavily by the integration tests.
pub fn run_to_string(args: &[&str], input: &str) -> Result<String> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let mut driver = Driver::new(CancelToken::new()).with_input(input);
    let show_usage = driver.initialize(&args)?;
    let mut out = Vec::new();
    if show_usage {
        out.extend_from_slice(usage().as_bytes());
    } else {
        driver.run(&mut out)?;
    }
    String::from_utf8(out).map_err(|_| Error::Unexpected("non-utf8 output".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("a b # comment"), "a b ");
        assert_eq!(strip_comment("a '#' b"), "a '#' b");
        assert_eq!(strip_comment("{a#b} c"), "{a#b} c");
    }

    #[test]
    fn test_split_arg_line() {
        assert_eq!(split_arg_line("a b"), vec!["a", "b"]);
        assert_eq!(split_arg_line("x:\"a b\" y"), vec!["x:\"a b\"", "y"]);
        assert_eq!(split_arg_line("{a b}:c d"), vec!["{a b}:c", "d"]);
    }
}
