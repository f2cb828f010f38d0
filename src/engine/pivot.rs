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

//! Pivoter
//!
//! Turns jagged name/value partitions into wide columns. A partition is a
//! contiguous run of captured (name, value) pairs; the boundary is detected
//! by watching the parse depth at accumulation points and closing the
//! partition when the depth falls below the trained minimum.

use crate::core::{Error, Result, Row, Value, ValueType};
use crate::parser::{
    cflags, ops, xflags, Column, ColumnId, ExprId, Opcode, PivotBinding, QuerySpec,
};

use super::context::Context;
use super::evaluator::Evaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionState {
    StartNewPartition,
    Partitioning,
}

/// Result of a pivot attempt at an end tag
#[derive(Debug, Default)]
pub struct PivotOutcome {
    pub pivoted: bool,
    /// Columns discovered through the spread marker this partition
    pub new_columns: Vec<ColumnId>,
}

/// Pivot state across a pass
#[derive(Debug)]
pub struct Pivoter {
    column: Option<ColumnId>,
    names_expr: Option<ExprId>,
    values_expr: Option<ExprId>,
    jagged: bool,
    /// Insertion position for spread-discovered columns
    spread_idx: Option<usize>,
    /// Captured pairs for the current partition
    names: Vec<String>,
    values: Vec<Value>,
    state: PartitionState,
    training_partition_depth: bool,
    partition_depth: i32,
    first_pass: bool,
    collecting_columns: bool,
}

impl Default for Pivoter {
    fn default() -> Self {
        Pivoter {
            column: None,
            names_expr: None,
            values_expr: None,
            jagged: false,
            spread_idx: None,
            names: Vec::new(),
            values: Vec::new(),
            state: PartitionState::StartNewPartition,
            training_partition_depth: true,
            partition_depth: 0,
            first_pass: true,
            collecting_columns: true,
        }
    }
}

impl Pivoter {
    /// Bind the pivot column: synthesize the literal result columns and
    /// record the spread insertion point.
    pub fn bind_columns(&mut self, spec: &mut QuerySpec, binding: &PivotBinding) -> Result<()> {
        if binding.names.is_empty() {
            return Err(Error::PivotRequiresNames);
        }

        let pivot_expr = spec.columns.col(binding.column).expr;
        let names_expr = spec.arena.arg(pivot_expr, 0);
        let values_expr = spec.arena.arg(pivot_expr, 1);
        for (expr, label) in [(names_expr, "names"), (values_expr, "values")] {
            let node = spec.arena.node(expr);
            if node.has_flag(xflags::SUBTREE_CONTAINS_AGGREGATE) {
                return Err(Error::PivotArgAggregate(label));
            }
            if node.has_flag(xflags::SUBTREE_CONTAINS_JOIN_PATH_REF) {
                return Err(Error::PivotArgJoined(label));
            }
        }

        self.spread_idx = None;
        let mut next_idx = spec.columns.col(binding.column).index;
        for name in &binding.names {
            if name == "..." {
                self.spread_idx = Some(next_idx);
            } else {
                let id = insert_pivot_column(spec, name, next_idx)?;
                next_idx = spec.columns.col(id).index + 1;
            }
        }

        self.column = Some(binding.column);
        self.names_expr = Some(names_expr);
        self.values_expr = Some(values_expr);
        self.jagged = spec.arena.num_args(pivot_expr) == 3
            && spec.arena.node(spec.arena.arg(pivot_expr, 2)).ty == ValueType::Boolean
            && spec
                .arena
                .node(spec.arena.arg(pivot_expr, 2))
                .value
                .as_bool();
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.column.is_some()
    }

    /// Jagged pivots discover their column set in a gather pass
    pub fn require_prepass(&self) -> bool {
        self.enabled() && self.jagged
    }

    pub fn reset(&mut self) {
        if self.enabled() {
            self.state = PartitionState::StartNewPartition;
            self.collecting_columns = self.first_pass;
            self.first_pass = false;
        }
    }

    pub fn partition_size(&self) -> usize {
        debug_assert_eq!(self.names.len(), self.values.len());
        self.names.len()
    }

    /// Capture one (name, value) pair for the current partition
    pub fn accumulate_row(&mut self, ctx: &Context, spec: &mut QuerySpec) {
        debug_assert!(self.enabled());
        let (Some(names_expr), Some(values_expr)) = (self.names_expr, self.values_expr) else {
            return;
        };

        if self.training_partition_depth {
            if self.state == PartitionState::StartNewPartition {
                self.partition_depth = ctx.curr_depth;
            } else {
                self.partition_depth = self.partition_depth.min(ctx.curr_depth);
            }
        }
        self.state = PartitionState::Partitioning;

        let mut evaluator = Evaluator {
            arena: &mut spec.arena,
            columns: &spec.columns,
            paths: &spec.input_paths,
            ctx,
            aggrs: None,
        };
        let name = evaluator.evaluate(names_expr).render(true);
        let value = evaluator.evaluate(values_expr);
        self.names.push(name);
        self.values.push(value);
    }

    /// Close the partition if the depth dropped below the trained minimum,
    /// writing captured values into their columns and collapsing the
    /// accumulated rows into one.
    pub fn try_pivot(
        &mut self,
        rows: &mut Vec<Row>,
        ctx: &Context,
        spec: &mut QuerySpec,
    ) -> Result<PivotOutcome> {
        let mut outcome = PivotOutcome::default();
        if !self.enabled() || !self.at_end_of_partition(ctx) {
            return Ok(outcome);
        }

        // clear previous values on the existing pivot columns
        for id in spec.columns.ordered() {
            let col = spec.columns.col(id);
            if col.is_pivot_result() {
                let expr = col.expr;
                spec.arena
                    .set_value_and_type(expr, Value::Str(String::new()));
            }
        }

        let partition_size = self.partition_size();
        debug_assert!(partition_size <= rows.len());
        let first_row_idx = rows.len() - partition_size;
        for idx in 0..partition_size {
            let col_name = &self.names[idx];
            let mut column = spec.columns.get(col_name);
            if column.is_none() && self.collecting_columns {
                if let Some(spread) = self.spread_idx {
                    let id = insert_pivot_column(spec, col_name, spread)?;
                    outcome.new_columns.push(id);
                    self.spread_idx = Some(spread + 1);
                    column = Some(id);
                }
            }
            if let Some(id) = column {
                spec.columns.col_mut(id).flags |= cflags::PIVOT_RESULT_REFERENCED;
                // the pipeline transfers this value into the stored row
                let expr = spec.columns.col(id).expr;
                spec.arena
                    .set_value_and_type(expr, self.values[idx].clone());
            }
        }

        self.names.clear();
        self.values.clear();

        if outcome.new_columns.is_empty() {
            // keep the first accumulated row to recycle; drop the rest
            rows.truncate(first_row_idx + 1);
        } else {
            // the row width changed; replace the partition's rows entirely
            rows.truncate(first_row_idx);
            rows.push(vec![Value::Unknown; spec.row_size()]);
        }

        outcome.pivoted = true;
        Ok(outcome)
    }

    /// The partition's collapsed row survived filtering
    pub fn accept(&mut self) {
        debug_assert!(self.enabled());
        if !self.jagged {
            self.collecting_columns = false;
        }
    }

    /// The collapsed row was filtered out: roll back spread columns added
    /// for it
    pub fn reject(&mut self, spec: &mut QuerySpec, outcome: &PivotOutcome) {
        debug_assert!(self.enabled());
        for &id in &outcome.new_columns {
            spec.delete_column(id);
            if let Some(spread) = self.spread_idx {
                debug_assert!(spread > 0);
                self.spread_idx = Some(spread - 1);
            }
        }
    }

    /// Error for literal pivot columns no partition ever produced
    pub fn check_unreferenced(&self, spec: &QuerySpec) -> Result<()> {
        let mut missing = Vec::new();
        for id in spec.columns.ordered() {
            let col = spec.columns.col(id);
            if col.is_pivot_result() && col.flags & cflags::PIVOT_RESULT_REFERENCED == 0 {
                missing.push(col.name.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::PivotColumnsNotFound(missing.join(", ")))
        }
    }

    fn at_end_of_partition(&mut self, ctx: &Context) -> bool {
        if self.enabled() && self.state == PartitionState::Partitioning {
            if self.partition_size() >= 2 || ctx.curr_depth == 0 {
                self.training_partition_depth = false;
            }
            if ctx.curr_depth < self.partition_depth {
                self.state = PartitionState::StartNewPartition;
                return true;
            }
        }
        false
    }
}

fn insert_pivot_column(spec: &mut QuerySpec, name: &str, idx: usize) -> Result<ColumnId> {
    let expr = spec.arena.alloc(ops::lookup_opcode(Opcode::Literal));
    spec.arena.set_type(expr, ValueType::String);
    let column = Column::new(
        name.to_string(),
        expr,
        cflags::OUTPUT | cflags::PIVOT_RESULT,
    );
    spec.insert_column(column, Some(idx))
}
