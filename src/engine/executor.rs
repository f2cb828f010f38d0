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

//! Query engine
//!
//! Consumes the normalized event stream — `open_tag` (with attributes),
//! character data, `close_tag` — drives the matcher and row pipeline, and
//! sequences the gather / main / stored-values passes.

use crate::core::{Result, Row};
use crate::parser::{qflags, PivotBinding, QuerySpec};

use super::context::{CancelToken, Context, NodeInfo, PassType};
use super::matcher::Matcher;
use super::path::MatchType;
use super::pipeline::{RowPipeline, RowSink};

/// One engine instance runs one query over one input
pub struct QueryEngine {
    pub ctx: Context,
    pub spec: QuerySpec,
    pub matcher: Matcher,
    pub pipeline: RowPipeline,
    column_specs: Vec<String>,
    pivot_binding: Option<PivotBinding>,
    found_root: bool,
    curr_depth: i32,
}

impl QueryEngine {
    pub fn new(cancel: CancelToken) -> Self {
        QueryEngine {
            ctx: Context::new(cancel),
            spec: QuerySpec::new(),
            matcher: Matcher::default(),
            pipeline: RowPipeline::default(),
            column_specs: Vec::new(),
            pivot_binding: None,
            found_root: true,
            curr_depth: 0,
        }
    }

    /// An engine around an already-built spec (the join side)
    pub fn from_spec(spec: QuerySpec, cancel: CancelToken) -> Self {
        let mut engine = Self::new(cancel);
        engine.spec = spec;
        engine
    }

    pub fn add_column(&mut self, column_spec: &str) {
        debug_assert!(!self.spec.is_flag_set(qflags::COLUMNS_ADDED));
        self.column_specs.push(column_spec.to_string());
    }

    /// Parse the collected column arguments and bind the pivoter
    pub fn finish_columns(&mut self) -> Result<()> {
        let specs = std::mem::take(&mut self.column_specs);
        self.pivot_binding = self.spec.parse_column_specs(&specs)?;
        if let Some(binding) = self.pivot_binding.clone() {
            self.pipeline.pivoter.bind_columns(&mut self.spec, &binding)?;
        }
        Ok(())
    }

    /// The ordered passes this query needs
    pub fn pass_types(&self) -> Vec<PassType> {
        let mut passes = Vec::new();
        if self.spec.is_flag_set(qflags::GATHER_PASS_REQUIRED)
            || self.pipeline.pivoter.require_prepass()
        {
            passes.push(PassType::GatherData);
        }
        passes.push(PassType::Main);
        if !self.pipeline.streaming(&self.spec) {
            passes.push(PassType::StoredValues);
        }
        passes
    }

    pub fn last_pass(&self) -> PassType {
        *self.pass_types().last().expect("at least one pass")
    }

    /// Reset matcher, context, and pipeline for a pass. The join index and
    /// pivoter-collected columns persist from gather to main.
    pub fn reset(&mut self, pass_type: PassType) {
        debug_assert!(self.spec.is_flag_set(qflags::COLUMNS_ADDED));
        self.ctx.reset(pass_type);
        self.ctx.case_sensitive = self.spec.case_sensitive;
        self.matcher.reset(&mut self.ctx, &mut self.spec);
        let last = self.last_pass();
        self.pipeline.reset(pass_type, last, &self.spec);
        self.found_root = self.spec.root_node_num == 0;
        self.curr_depth = 0;
    }

    pub fn stopped(&self) -> bool {
        self.pipeline.stopped()
    }

    pub fn streaming(&self) -> bool {
        self.pipeline.streaming(&self.spec)
    }

    /// Start-tag event, with the tag's attributes
    pub fn open_tag(
        &mut self,
        name: &str,
        attrs: &[(String, String)],
        sink: RowSink,
    ) -> Result<()> {
        self.ctx.num_nodes += 1;

        let root_num = self.spec.root_node_num;
        if root_num != 0 && !self.found_root && self.ctx.num_nodes == root_num {
            self.found_root = true;
        }

        // attribute frames stay balanced with close_tag pops even before
        // the query root is found
        if self.spec.is_flag_set(qflags::ATTRIBUTES_USED) {
            self.ctx.attr_count_stack.push(attrs.len());
            for (name, value) in attrs {
                self.ctx.attr_stack.push((name.clone(), value.clone()));
            }
        }

        if !self.found_root {
            return Ok(());
        }

        self.curr_depth += 1;
        self.ctx.curr_depth = self.curr_depth;

        if self.spec.is_flag_set(qflags::NODE_STACK_REQUIRED) {
            self.ctx.node_stack.push(NodeInfo {
                name: name.to_string(),
                node_start: self.ctx.num_nodes,
            });
        }

        if self.ctx.appending_values {
            // paths capturing an embedded subtree keep its markup
            self.matcher.append_values(&format!("<{}>", name));
            self.ctx.appending_values = false;
        }

        self.matcher.match_start_tag(name, &mut self.ctx, &mut self.spec);

        if self.matcher.match_type(&self.spec) == MatchType::AllMatchedWithNoDataMatches {
            // e.g. attribute-only matches need no end tag
            self.matcher.commit_match(&mut self.spec);
            self.pipeline.emit_row(&mut self.ctx, &mut self.spec, sink);
        }
        Ok(())
    }

    /// Character data between tags
    pub fn text(&mut self, chunk: &str) {
        if self.ctx.appending_values {
            self.matcher.append_values(chunk);
        }
    }

    /// End-tag event
    pub fn close_tag(&mut self, name: &str, sink: RowSink) -> Result<()> {
        if self.spec.is_flag_set(qflags::ATTRIBUTES_USED) {
            if let Some(count) = self.ctx.attr_count_stack.pop() {
                let keep = self.ctx.attr_stack.len().saturating_sub(count);
                self.ctx.attr_stack.truncate(keep);
            }
        }

        if !self.found_root {
            return Ok(());
        }

        self.curr_depth -= 1;
        self.ctx.curr_depth = self.curr_depth;
        if self.curr_depth == 0 && self.spec.root_node_num != 0 {
            // the requested root scope closed; the pass is over
            self.found_root = false;
            self.pipeline.stop();
        }

        self.pipeline
            .on_end_tag(&mut self.ctx, &mut self.spec, sink)?;

        self.ctx.appending_values = false;
        let matched = self.matcher.match_end_tag(name, &mut self.ctx, &mut self.spec);
        if self.ctx.appending_values {
            self.matcher.append_values(&format!("</{}>", name));
        }

        if matched && self.matcher.match_type(&self.spec) == MatchType::AllMatched {
            self.matcher.commit_match(&mut self.spec);
            self.pipeline.emit_row(&mut self.ctx, &mut self.spec, sink);
        }

        if self.spec.is_flag_set(qflags::NODE_STACK_REQUIRED) {
            self.ctx.node_stack.pop();
        }

        if self.ctx.cancel.is_cancelled() {
            self.pipeline.stop();
        }
        Ok(())
    }

    /// Line accounting for the `linenum` operator
    pub fn add_lines(&mut self, count: usize) {
        self.ctx.num_lines += count;
    }

    /// Run the stored-values pass over buffered rows
    pub fn output_stored_rows(&mut self, sink: RowSink) {
        self.reset(PassType::StoredValues);
        self.pipeline
            .output_stored_rows(&mut self.ctx, &mut self.spec, sink);
    }

    /// After a pass: every declared path must have matched somewhere
    pub fn check_unreferenced(&self) -> Result<()> {
        self.matcher.check_unreferenced(&self.spec)?;
        self.pipeline.pivoter.check_unreferenced(&self.spec)
    }
}

/// Convenience sink adapter for callers collecting rows
pub fn collect_rows(out: &mut Vec<Row>) -> impl FnMut(&QuerySpec, &Row, usize) + '_ {
    move |_spec, row, repeat| {
        for _ in 0..repeat {
            out.push(row.clone());
        }
    }
}
