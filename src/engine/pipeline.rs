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

//! Row pipeline
//!
//! Per committed row: join lookup, first-N check, non-aggregate evaluation,
//! filtering, pivot accumulation, then streaming or storage. At the end of
//! the main pass the stored-values sweep finalizes aggregates, sorts,
//! limits, and emits.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::core::{hash_row_prefix, IndexedRows, Result, Row, Value};
use crate::parser::{cflags, qflags, xflags, ColumnId, ExprId, QuerySpec};

use super::aggregate::RowAggregates;
use super::context::{Context, PassType};
use super::evaluator::Evaluator;
use super::pivot::Pivoter;

/// Callback receiving each emitted row with its repeat count
pub type RowSink<'a> = &'a mut dyn FnMut(&QuerySpec, &Row, usize);

/// Pipeline flags
mod pflags {
    pub const STORE_ROWS: u32 = 0x2;
    pub const INVOKE_ROW_CALLBACK: u32 = 0x4;
    pub const PARSE_STOPPED: u32 = 0x8;
    pub const RECYCLE_STORAGE: u32 = 0x10;
}

/// Column facts snapshotted per row to keep evaluation borrows simple
struct ColMeta {
    id: ColumnId,
    expr: ExprId,
    flags: u32,
    value_idx: Option<usize>,
}

/// The row pipeline for one query
#[derive(Default)]
pub struct RowPipeline {
    flags: u32,
    /// Scratch, partition, and plain-storage rows
    seq_rows: Vec<Row>,
    /// Storage for distinct/aggregated rows
    distinct_store: Vec<Row>,
    /// Value-prefix key to index in `distinct_store`
    distinct_map: FxHashMap<Vec<Value>, usize>,
    /// (row index, repeat count); sortable
    row_refs: Vec<(usize, usize)>,
    /// Accumulators parallel to `distinct_store`
    aggregates: Vec<RowAggregates>,
    indexed_join: IndexedRows,
    pub pivoter: Pivoter,
    join_key: Row,
}

impl RowPipeline {
    pub fn set_flag(&mut self, flag: u32, set: bool) {
        if set {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    fn is_flag_set(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn stopped(&self) -> bool {
        self.is_flag_set(pflags::PARSE_STOPPED)
    }

    pub fn stop(&mut self) {
        self.flags |= pflags::PARSE_STOPPED;
    }

    pub fn set_indexed_join(&mut self, indexed_join: IndexedRows) {
        self.indexed_join = indexed_join;
    }

    /// No global state needed: rows can stream out as they commit
    pub fn streaming(&self, spec: &QuerySpec) -> bool {
        !self.distinct(spec) && !self.needs_sorting(spec) && !self.aggregated(spec)
    }

    fn aggregated(&self, spec: &QuerySpec) -> bool {
        spec.is_flag_set(qflags::AGGREGATES_EXIST)
    }

    fn distinct(&self, spec: &QuerySpec) -> bool {
        spec.is_flag_set(qflags::DISTINCT_USED) || self.aggregated(spec)
    }

    fn needs_sorting(&self, spec: &QuerySpec) -> bool {
        spec.sort_column.is_some() && spec.num_value_columns > 0
    }

    pub fn reset(&mut self, pass_type: PassType, last_pass: PassType, spec: &QuerySpec) {
        self.set_flag(pflags::PARSE_STOPPED, false);
        if pass_type == PassType::Main {
            self.set_flag(pflags::STORE_ROWS, !self.streaming(spec));
        } else {
            self.set_flag(pflags::STORE_ROWS, pass_type == PassType::StoredValues);
        }
        self.set_flag(pflags::INVOKE_ROW_CALLBACK, pass_type == last_pass);

        self.pivoter.reset();
        if pass_type == PassType::Main {
            self.seq_rows.clear();
            self.distinct_store.clear();
            self.distinct_map.clear();
            self.row_refs.clear();
            self.aggregates.clear();
        }
        self.set_flag(pflags::RECYCLE_STORAGE, false);
    }

    /// Pivot partitions close on end tags, before end-tag matching runs
    pub fn on_end_tag(
        &mut self,
        ctx: &mut Context,
        spec: &mut QuerySpec,
        sink: RowSink,
    ) -> Result<()> {
        if !self.pivoter.enabled() {
            return Ok(());
        }
        let outcome = self.pivoter.try_pivot(&mut self.seq_rows, ctx, spec)?;
        if outcome.pivoted {
            let row_idx = self.seq_rows.len() - 1;
            if self.join_and_commit(row_idx, ctx, spec, sink) {
                self.pivoter.accept();
            } else {
                self.pivoter.reject(spec, &outcome);
                self.set_flag(pflags::RECYCLE_STORAGE, true);
                self.remove_recycled_row();
            }
        }
        Ok(())
    }

    /// A record committed in the matcher: run it through the pipeline
    pub fn emit_row(&mut self, ctx: &mut Context, spec: &mut QuerySpec, sink: RowSink) {
        if self.pivoter.enabled() {
            let partition_size = self.pivoter.partition_size();
            self.alloc_row(spec, partition_size);
            self.pivoter.accumulate_row(ctx, spec);
        } else {
            let row_idx = self.alloc_row(spec, 0);
            if !self.join_and_commit(row_idx, ctx, spec, sink) {
                self.set_flag(pflags::RECYCLE_STORAGE, true);
                self.remove_recycled_row();
            }
        }
    }

    fn alloc_row(&mut self, spec: &QuerySpec, curr_partition_size: usize) -> usize {
        // Distinct and streaming modes recycle one row; otherwise a complete
        // table builds up. A pivot partition always extends the tail.
        let keep_all = !self.distinct(spec) && !self.streaming(spec);
        if (keep_all && !self.is_flag_set(pflags::RECYCLE_STORAGE))
            || curr_partition_size > 0
            || self.seq_rows.is_empty()
        {
            self.seq_rows.push(vec![Value::Unknown; spec.row_size()]);
        }
        self.set_flag(pflags::RECYCLE_STORAGE, !keep_all);
        self.seq_rows.len() - 1
    }

    fn remove_recycled_row(&mut self) {
        if self.is_flag_set(pflags::RECYCLE_STORAGE) && !self.seq_rows.is_empty() {
            self.seq_rows.pop();
        }
        self.set_flag(pflags::RECYCLE_STORAGE, false);
    }

    /// Returns false when every join iteration was filtered out
    fn join_and_commit(
        &mut self,
        row_idx: usize,
        ctx: &mut Context,
        spec: &mut QuerySpec,
        sink: RowSink,
    ) -> bool {
        let mut committed = false;
        let left_side = spec.is_flag_set(qflags::LEFT_SIDE_OF_JOIN);

        if left_side {
            // hash the left-side key expressions and find the bucket
            self.join_key.clear();
            for i in 0..spec.join.equalities.len() {
                let (_, expr) = spec.join.equalities[i];
                let mut evaluator = Evaluator {
                    arena: &mut spec.arena,
                    columns: &spec.columns,
                    paths: &spec.input_paths,
                    ctx,
                    aggrs: None,
                };
                let value = evaluator.evaluate(expr);
                self.join_key.push(value);
            }
            let hash = hash_row_prefix(&self.join_key, self.join_key.len());
            match self.indexed_join.get(&hash) {
                Some(bucket) => ctx.set_join_table(bucket.clone()),
                None if spec.join.outer => {
                    ctx.empty_outer_join = true;
                }
                None => {
                    // inner join with no bucket meeting the equality key
                    ctx.reset_join_table();
                    return false;
                }
            }
        }

        loop {
            if left_side {
                if let Some(table) = &ctx.join_table {
                    if ctx.join_row_idx == table.len() {
                        break;
                    }
                }
            }

            if self.check_first_n(ctx, spec) {
                self.stop();
                break;
            }

            self.evaluate_non_aggregate_and_sort_values(row_idx, ctx, spec);

            if self.test_filters_on_non_aggregate_columns(ctx, spec) {
                committed = true;
                if !self.store_row(row_idx, ctx, spec) {
                    if self.check_top_n(ctx, spec) {
                        self.stop();
                    } else if self.streaming(spec)
                        && self.is_flag_set(pflags::INVOKE_ROW_CALLBACK)
                    {
                        sink(spec, &self.seq_rows[row_idx], 1);
                    }
                }
            }

            if !left_side || ctx.empty_outer_join {
                break;
            }
            ctx.join_row_idx += 1;
        }

        ctx.reset_join_table();
        committed
    }

    fn column_meta(&self, spec: &QuerySpec) -> Vec<ColMeta> {
        spec.columns
            .ordered()
            .into_iter()
            .map(|id| {
                let col = spec.columns.col(id);
                ColMeta {
                    id,
                    expr: col.expr,
                    flags: col.flags,
                    value_idx: col.value_idx,
                }
            })
            .collect()
    }

    fn evaluate_non_aggregate_and_sort_values(
        &mut self,
        row_idx: usize,
        ctx: &Context,
        spec: &mut QuerySpec,
    ) {
        let metas = self.column_meta(spec);
        let sort_column = spec.sort_column;
        let num_value_columns = spec.num_value_columns;
        for meta in metas {
            if Some(meta.id) == sort_column {
                // non-aggregate sort keys land in the tail now; aggregate
                // keys wait for the stored-values sweep
                let mut value_idx = num_value_columns;
                for i in 0..spec.arena.num_args(meta.expr) {
                    let arg = spec.arena.arg(meta.expr, i);
                    if !spec
                        .arena
                        .node(arg)
                        .has_flag(xflags::SUBTREE_CONTAINS_AGGREGATE)
                    {
                        let mut evaluator = Evaluator {
                            arena: &mut spec.arena,
                            columns: &spec.columns,
                            paths: &spec.input_paths,
                            ctx,
                            aggrs: None,
                        };
                        let value = evaluator.evaluate(arg);
                        self.seq_rows[row_idx][value_idx] = value;
                    }
                    value_idx += 1;
                }
            } else if meta.flags & cflags::PIVOT_RESULT != 0 && meta.flags & cflags::OUTPUT != 0 {
                // the pivoter wrote the value onto the column expression
                if let Some(value_idx) = meta.value_idx {
                    self.seq_rows[row_idx][value_idx] = spec.arena.node(meta.expr).value.clone();
                }
            } else if meta.flags & cflags::AGGREGATE == 0 && meta.flags & cflags::OUTPUT != 0 {
                if let Some(value_idx) = meta.value_idx {
                    let mut evaluator = Evaluator {
                        arena: &mut spec.arena,
                        columns: &spec.columns,
                        paths: &spec.input_paths,
                        ctx,
                        aggrs: None,
                    };
                    let value = evaluator.evaluate(meta.expr);
                    self.seq_rows[row_idx][value_idx] = value;
                }
            }
        }
    }

    fn test_filters_on_non_aggregate_columns(&self, ctx: &Context, spec: &mut QuerySpec) -> bool {
        let metas = self.column_meta(spec);
        for meta in metas {
            if meta.flags & cflags::AGGREGATE != 0 || meta.flags & cflags::FILTER == 0 {
                continue;
            }
            if ctx.empty_outer_join
                && spec
                    .arena
                    .node(meta.expr)
                    .has_flag(xflags::JOIN_EQUALITY_WHERE)
            {
                // free pass: the empty outer iteration cannot satisfy the
                // join equality it exists to relax
                continue;
            }
            let mut evaluator = Evaluator {
                arena: &mut spec.arena,
                columns: &spec.columns,
                paths: &spec.input_paths,
                ctx,
                aggrs: None,
            };
            if !evaluator.evaluate(meta.expr).as_bool() {
                return false;
            }
        }
        true
    }

    /// Returns false for immediate (streaming) output
    fn store_row(&mut self, row_idx: usize, ctx: &mut Context, spec: &mut QuerySpec) -> bool {
        if !self.distinct(spec) && !self.needs_sorting(spec) {
            ctx.num_rows_output += 1;
            return false;
        }

        if !self.distinct(spec) {
            // sort-only: the row already sits in storage
            ctx.num_rows_output += 1;
            return true;
        }

        let key: Vec<Value> = self.seq_rows[row_idx][..spec.num_value_columns].to_vec();
        let stored_idx = match self.distinct_map.get(&key) {
            Some(&idx) => {
                self.row_refs[idx].1 += 1;
                idx
            }
            None => {
                let idx = self.row_refs.len();
                self.distinct_store.push(self.seq_rows[row_idx].clone());
                self.distinct_map.insert(key, idx);
                self.row_refs.push((idx, 1));
                if self.aggregated(spec) {
                    self.aggregates
                        .push(vec![Default::default(); spec.aggr_count]);
                }
                ctx.num_rows_output += 1;
                idx
            }
        };

        if self.aggregated(spec) {
            // ingest this row's values into the key's accumulators
            let metas = self.column_meta(spec);
            for meta in metas {
                if meta.flags & cflags::AGGREGATE != 0 {
                    let mut evaluator = Evaluator {
                        arena: &mut spec.arena,
                        columns: &spec.columns,
                        paths: &spec.input_paths,
                        ctx,
                        aggrs: Some(&mut self.aggregates[stored_idx]),
                    };
                    evaluator.evaluate(meta.expr);
                }
            }
        }

        debug_assert_eq!(self.distinct_map.len(), self.row_refs.len());
        true
    }

    fn check_first_n(&self, ctx: &mut Context, spec: &QuerySpec) -> bool {
        ctx.num_rows_matched += 1;
        spec.is_flag_set(qflags::FIRST_N_SPECIFIED) && ctx.num_rows_matched > spec.first_n
    }

    fn check_top_n(&self, ctx: &Context, spec: &QuerySpec) -> bool {
        !self.needs_sorting(spec)
            && spec.is_flag_set(qflags::TOP_N_SPECIFIED)
            && ctx.num_rows_output > spec.top_n
    }

    /// The stored-values sweep: finalize aggregates, sort, limit, emit
    pub fn output_stored_rows(&mut self, ctx: &mut Context, spec: &mut QuerySpec, sink: RowSink) {
        debug_assert!(self.is_flag_set(pflags::STORE_ROWS));
        if !self.is_flag_set(pflags::INVOKE_ROW_CALLBACK) {
            return;
        }

        let mut aggregate_filters: Vec<ColMeta> = Vec::new();
        if self.aggregated(spec) {
            let mut max_rows = self.row_refs.len();
            if !self.needs_sorting(spec) && spec.is_flag_set(qflags::TOP_N_SPECIFIED) {
                max_rows = max_rows.min(spec.top_n);
            }
            let metas = self.column_meta(spec);
            for meta in &metas {
                if meta.flags & cflags::AGGREGATE != 0 && meta.flags & cflags::FILTER != 0 {
                    aggregate_filters.push(ColMeta {
                        id: meta.id,
                        expr: meta.expr,
                        flags: meta.flags,
                        value_idx: meta.value_idx,
                    });
                }
            }
            for ref_idx in 0..max_rows {
                let row_idx = self.row_refs[ref_idx].0;
                for meta in &metas {
                    if meta.flags & cflags::AGGREGATE != 0 {
                        let mut evaluator = Evaluator {
                            arena: &mut spec.arena,
                            columns: &spec.columns,
                            paths: &spec.input_paths,
                            ctx,
                            aggrs: Some(&mut self.aggregates[row_idx]),
                        };
                        let value = evaluator.evaluate(meta.expr);
                        if let Some(value_idx) = meta.value_idx {
                            self.distinct_store[row_idx][value_idx] = value;
                        }
                    } else if meta.flags & cflags::OUTPUT != 0 {
                        // push stored values back onto the column expressions
                        // so sort keys referencing them see this row
                        if let Some(value_idx) = meta.value_idx {
                            let value = self.distinct_store[row_idx][value_idx].clone();
                            spec.arena.set_value(meta.expr, value);
                        }
                    }
                }
            }
        } else if !self.distinct(spec) {
            // plain stored rows: build the refs now that storage is final
            self.row_refs = (0..self.seq_rows.len()).map(|i| (i, 1)).collect();
        }

        if self.needs_sorting(spec) {
            self.sort_rows(ctx, spec);
        }

        let mut max_rows = self.row_refs.len();
        if spec.is_flag_set(qflags::TOP_N_SPECIFIED) {
            max_rows = max_rows.min(spec.top_n);
        }

        let use_distinct = self.distinct(spec);
        for ref_idx in 0..max_rows {
            let (row_idx, repeat) = self.row_refs[ref_idx];
            let row = if use_distinct {
                &self.distinct_store[row_idx]
            } else {
                &self.seq_rows[row_idx]
            };
            let mut pass = true;
            for meta in &aggregate_filters {
                if let Some(value_idx) = meta.value_idx {
                    pass &= row[value_idx].as_bool();
                }
            }
            if pass {
                let repeat = if use_distinct { 1 } else { repeat };
                sink(spec, row, repeat);
            }
        }
    }

    fn sort_rows(&mut self, ctx: &mut Context, spec: &mut QuerySpec) {
        debug_assert!(self.needs_sorting(spec));
        let Some(sort_column) = spec.sort_column else {
            return;
        };
        let sort_expr = spec.columns.col(sort_column).expr;

        if self.aggregated(spec) {
            // aggregate sort keys become evaluable only now
            for ref_idx in 0..self.row_refs.len() {
                let row_idx = self.row_refs[ref_idx].0;
                let mut value_idx = spec.num_value_columns;
                for i in 0..spec.arena.num_args(sort_expr) {
                    let arg = spec.arena.arg(sort_expr, i);
                    if spec
                        .arena
                        .node(arg)
                        .has_flag(xflags::SUBTREE_CONTAINS_AGGREGATE)
                    {
                        let mut evaluator = Evaluator {
                            arena: &mut spec.arena,
                            columns: &spec.columns,
                            paths: &spec.input_paths,
                            ctx,
                            aggrs: Some(&mut self.aggregates[row_idx]),
                        };
                        let value = evaluator.evaluate(arg);
                        self.distinct_store[row_idx][value_idx] = value;
                    }
                    value_idx += 1;
                }
            }
        }

        let first_sort_value = spec.num_value_columns;
        let num_sort_values = spec.num_sort_values();
        let reversed = spec.reversed_sorts.clone();
        let use_distinct = self.distinct(spec);
        let RowPipeline {
            row_refs,
            distinct_store,
            seq_rows,
            ..
        } = self;
        let store: &Vec<Row> = if use_distinct { distinct_store } else { seq_rows };

        row_refs.sort_by(|left, right| {
            let lrow = &store[left.0];
            let rrow = &store[right.0];
            for i in 0..num_sort_values {
                let cmp = Value::compare(
                    &lrow[first_sort_value + i],
                    &rrow[first_sort_value + i],
                );
                let cmp = if reversed[i] { cmp.reverse() } else { cmp };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
    }
}
