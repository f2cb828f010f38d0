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

//! Path matcher
//!
//! Drives every path's state machine from the tag event stream, fires
//! immediate-evaluation expressions at the exact match events, enforces
//! left-to-right sibling discipline, and reports when a row can commit.

use crate::core::{Error, Result, Value};
use crate::parser::{prflags, QuerySpec};

use super::context::Context;
use super::evaluator::Evaluator;
use super::path::{pathflags, MatchState, MatchType, Path, RowMatchState};

/// Matcher over one query's input paths
#[derive(Debug, Default)]
pub struct Matcher {
    pub paths: Vec<Path>,
    pub row_state: RowMatchState,
}

impl Matcher {
    /// Rebuild the path state machines from the spec's path references and
    /// wrap the stream in a synthetic root so leading wildcards can match.
    pub fn reset(&mut self, ctx: &mut Context, spec: &mut QuerySpec) {
        self.paths.clear();
        for id in spec.input_paths.ids() {
            self.paths.push(Path::new(id, spec.input_paths.get(id)));
        }
        self.row_state.reset();
        for path in &mut self.paths {
            let binding = spec.input_paths.get_mut(path.path_ref);
            path.reset(-1, -1, binding);
        }
        self.match_start_tag("__root", ctx, spec);
    }

    /// Feed a start tag through every path
    pub fn match_start_tag(&mut self, name: &str, ctx: &mut Context, spec: &mut QuerySpec) -> bool {
        let mut match_detected = false;
        self.row_state.match_type = MatchType::NotAllMatched;

        if !self.paths.is_empty() {
            self.row_state.curr_parse_depth += 1;
            for path in &mut self.paths {
                let outcome =
                    path.match_start_tag(name, &mut self.row_state, ctx.case_sensitive);
                if let Some(relative_depth) = outcome {
                    match_detected = true;
                    path.flags |= pathflags::EXISTS_IN_INPUT;
                    ctx.relative_depth = relative_depth;
                    let binding = spec.input_paths.get_mut(path.path_ref);
                    binding.flags |= prflags::MATCHED;
                    let exprs = binding.start_match_exprs.clone();
                    let mut evaluator = Evaluator {
                        arena: &mut spec.arena,
                        columns: &spec.columns,
                        paths: &spec.input_paths,
                        ctx,
                        aggrs: None,
                    };
                    for expr in exprs {
                        evaluator.immed_evaluate(expr);
                    }
                }
            }

            if match_detected {
                // reset any sequentially-later matches to keep things in sync
                for path in &mut self.paths {
                    let binding = spec.input_paths.get_mut(path.path_ref);
                    path.reset(self.row_state.curr_parse_depth, self.row_state.match_order, binding);
                }
            }
        }

        ctx.appending_values |= self.row_state.searching_for_end_cnt > 0;
        match_detected
    }

    /// Feed an end tag through every path
    pub fn match_end_tag(&mut self, name: &str, ctx: &mut Context, spec: &mut QuerySpec) -> bool {
        let mut match_detected = false;
        if !self.paths.is_empty() {
            for path in &mut self.paths {
                let outcome = path.match_end_tag(name, &mut self.row_state, ctx.case_sensitive);
                if let Some(relative_depth) = outcome {
                    match_detected = true;
                    ctx.relative_depth = relative_depth;
                    // the accumulated character data becomes the bound value
                    let binding = spec.input_paths.get_mut(path.path_ref);
                    binding.value = Value::Str(path.text.clone());
                    let exprs = binding.end_match_exprs.clone();
                    let mut evaluator = Evaluator {
                        arena: &mut spec.arena,
                        columns: &spec.columns,
                        paths: &spec.input_paths,
                        ctx,
                        aggrs: None,
                    };
                    for expr in exprs {
                        evaluator.immed_evaluate(expr);
                    }
                }
            }
            self.row_state.curr_parse_depth -= 1;
        }
        ctx.appending_values |= self.row_state.searching_for_end_cnt > 0;
        match_detected
    }

    /// Append character data to every capturing path
    pub fn append_values(&mut self, chunk: &str) {
        for path in &mut self.paths {
            path.append_value(chunk);
        }
    }

    /// Classify the current record: all required paths matched, possibly
    /// relying on sync or no-data relaxations
    pub fn match_type(&mut self, spec: &QuerySpec) -> MatchType {
        let mut all_matched = !self.paths.is_empty();
        let mut with_no_data = false;
        for path in &self.paths {
            let binding = spec.input_paths.get(path.path_ref);
            if path.has_flag(pathflags::SYNC) && path.is_matched(binding) {
                // no other criteria needed once a sync path matches
                all_matched = true;
                break;
            }
            if path.has_flag(pathflags::NO_DATA)
                && binding.end_match_exprs.is_empty()
                && path.match_state == MatchState::SearchingForEndTag
            {
                // relaxed matching: the end tag is not needed when the path
                // carries no data (e.g. attribute lookup)
                all_matched = true;
                with_no_data = true;
            } else if path.is_matched(binding) {
                all_matched = true;
            } else {
                all_matched = false;
                with_no_data = false;
            }
            if !all_matched {
                break;
            }
        }

        self.row_state.match_type = if !all_matched {
            MatchType::NotAllMatched
        } else if with_no_data {
            MatchType::AllMatchedWithNoDataMatches
        } else {
            MatchType::AllMatched
        };
        self.row_state.match_type
    }

    /// Commit the record: strip value indents and re-arm every path.
    /// Bound values persist so sibling re-matches can reuse them.
    pub fn commit_match(&mut self, spec: &mut QuerySpec) {
        for path in &mut self.paths {
            let binding = spec.input_paths.get_mut(path.path_ref);
            if let Value::Str(s) = &binding.value {
                if let Some(stripped) = remove_value_indents(s) {
                    binding.value = Value::Str(stripped);
                }
            }
            path.start_match();
        }
    }

    /// Error for any path the input never matched
    pub fn check_unreferenced(&self, spec: &QuerySpec) -> Result<()> {
        for path in &self.paths {
            if !path.has_flag(pathflags::EXISTS_IN_INPUT) {
                let binding = spec.input_paths.get(path.path_ref);
                let side = if binding.has_flag(prflags::JOINED) {
                    "joined"
                } else {
                    "main"
                };
                return Err(Error::PathNotMatched {
                    spec: binding.spec.clone(),
                    side,
                });
            }
        }
        Ok(())
    }
}

/// If a bound value is an embedded tag subtree, it arrives with the source
/// indentation. Measure the first-order indent and strip it from every
/// subsequent line. Returns None when no rewrite applies.
fn remove_value_indents(value: &str) -> Option<String> {
    if !value.starts_with('<') {
        return None;
    }
    let newline = value.find('\n')?;
    let indent_len = value[newline + 1..]
        .chars()
        .take_while(|c| c.is_whitespace() && *c != '\n')
        .count()
        .saturating_sub(2);
    if indent_len == 0 {
        return None;
    }
    let mut out = String::with_capacity(value.len());
    for (i, line) in value.lines().enumerate() {
        if i == 0 {
            out.push_str(line);
        } else {
            out.push('\n');
            let strip = line
                .chars()
                .take_while(|c| c.is_whitespace())
                .count()
                .min(indent_len + 1);
            out.push_str(&line[char_offset(line, strip)..]);
        }
    }
    Some(out)
}

fn char_offset(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::CancelToken;

    fn setup(args: &[&str]) -> (Matcher, Context, QuerySpec) {
        let mut spec = QuerySpec::new();
        let specs: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        spec.parse_column_specs(&specs).unwrap();
        let mut ctx = Context::new(CancelToken::new());
        let mut matcher = Matcher::default();
        matcher.reset(&mut ctx, &mut spec);
        (matcher, ctx, spec)
    }

    fn bound(spec: &QuerySpec, path_spec: &str) -> String {
        for id in spec.input_paths.ids() {
            let binding = spec.input_paths.get(id);
            if binding.spec == path_spec {
                return binding.value.render(true);
            }
        }
        panic!("no binding for {}", path_spec);
    }

    #[test]
    fn test_sibling_paths_match_and_commit() {
        let (mut matcher, mut ctx, mut spec) = setup(&["id", "c"]);
        matcher.match_start_tag("r", &mut ctx, &mut spec);
        matcher.match_start_tag("o", &mut ctx, &mut spec);

        matcher.match_start_tag("id", &mut ctx, &mut spec);
        matcher.append_values("1");
        matcher.match_end_tag("id", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::NotAllMatched);

        matcher.match_start_tag("c", &mut ctx, &mut spec);
        matcher.append_values("x");
        matcher.match_end_tag("c", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::AllMatched);
        assert_eq!(bound(&spec, "id"), "1");
        assert_eq!(bound(&spec, "c"), "x");
        matcher.commit_match(&mut spec);

        // second record rebinds both values
        matcher.match_end_tag("o", &mut ctx, &mut spec);
        matcher.match_start_tag("o", &mut ctx, &mut spec);
        matcher.match_start_tag("id", &mut ctx, &mut spec);
        matcher.append_values("2");
        matcher.match_end_tag("id", &mut ctx, &mut spec);
        matcher.match_start_tag("c", &mut ctx, &mut spec);
        matcher.append_values("y");
        matcher.match_end_tag("c", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::AllMatched);
        assert_eq!(bound(&spec, "id"), "2");
        assert_eq!(bound(&spec, "c"), "y");
    }

    #[test]
    fn test_dotted_path_requires_ancestry() {
        let (mut matcher, mut ctx, mut spec) = setup(&["a.b"]);
        // b outside a does not match
        matcher.match_start_tag("x", &mut ctx, &mut spec);
        matcher.match_start_tag("b", &mut ctx, &mut spec);
        matcher.append_values("no");
        matcher.match_end_tag("b", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::NotAllMatched);
        matcher.match_end_tag("x", &mut ctx, &mut spec);

        // b under a matches
        matcher.match_start_tag("a", &mut ctx, &mut spec);
        matcher.match_start_tag("b", &mut ctx, &mut spec);
        matcher.append_values("yes");
        matcher.match_end_tag("b", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::AllMatched);
        assert_eq!(bound(&spec, "a.b"), "yes");
    }

    #[test]
    fn test_tag_counters_unwind_after_record() {
        let (mut matcher, mut ctx, mut spec) = setup(&["a.b"]);
        let before: Vec<_> = matcher.paths.iter().map(|p| p.tag_depths()).collect();
        matcher.match_start_tag("a", &mut ctx, &mut spec);
        matcher.match_start_tag("b", &mut ctx, &mut spec);
        matcher.match_end_tag("b", &mut ctx, &mut spec);
        matcher.match_end_tag("a", &mut ctx, &mut spec);
        let after: Vec<_> = matcher.paths.iter().map(|p| p.tag_depths()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_value_persists_across_sibling_commits() {
        // <o><id>1</id><c>x</c><c>y</c></o> emits rows (1,x) and (1,y)
        let (mut matcher, mut ctx, mut spec) = setup(&["id", "c"]);
        matcher.match_start_tag("o", &mut ctx, &mut spec);
        matcher.match_start_tag("id", &mut ctx, &mut spec);
        matcher.append_values("1");
        matcher.match_end_tag("id", &mut ctx, &mut spec);
        matcher.match_start_tag("c", &mut ctx, &mut spec);
        matcher.append_values("x");
        matcher.match_end_tag("c", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::AllMatched);
        matcher.commit_match(&mut spec);

        matcher.match_start_tag("c", &mut ctx, &mut spec);
        matcher.append_values("y");
        matcher.match_end_tag("c", &mut ctx, &mut spec);
        assert_eq!(matcher.match_type(&spec), MatchType::AllMatched);
        assert_eq!(bound(&spec, "id"), "1");
        assert_eq!(bound(&spec, "c"), "y");
    }

    #[test]
    fn test_unreferenced_path_reported() {
        let (matcher, _ctx, spec) = setup(&["nosuch"]);
        assert!(matches!(
            matcher.check_unreferenced(&spec),
            Err(Error::PathNotMatched { .. })
        ));
    }

    #[test]
    fn test_remove_value_indents() {
        let value = "<t>\n      <u>1</u>\n    </t>";
        let stripped = remove_value_indents(value).unwrap();
        assert!(stripped.contains("\n  <u>1</u>"));
        assert_eq!(remove_value_indents("plain"), None);
    }
}
