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

//! Parser context
//!
//! Mutable per-pass state shared between the matcher (which writes node and
//! attribute stacks) and the evaluator (which reads them during immediate
//! and regular evaluation).

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::Row;

/// The ordered passes a query may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassType {
    #[default]
    NotSet,
    /// Reads input to discover up-front state (jagged pivot names); no output
    GatherData,
    /// Reads input, evaluates rows, streams or stores them
    Main,
    /// Sweeps buffered rows: finalize aggregates, sort, limit, emit
    StoredValues,
}

/// Cooperative cancellation, polled at end-tag events
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One open ancestor tag
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    /// Ordinal of the node's start among all nodes seen
    pub node_start: usize,
}

/// Shared per-pass state
#[derive(Debug, Default)]
pub struct Context {
    pub pass_type: PassType,
    /// Some path is between its start and end match
    pub appending_values: bool,
    pub num_nodes: usize,
    pub num_lines: usize,
    /// Rows seen before filtering
    pub num_rows_matched: usize,
    /// Rows surviving filters
    pub num_rows_output: usize,
    /// Depth of the last path match, counted over its tag list
    pub relative_depth: i32,
    /// Current open-tag depth below the query root
    pub curr_depth: i32,
    pub node_stack: Vec<NodeInfo>,
    pub attr_count_stack: Vec<usize>,
    pub attr_stack: Vec<(String, String)>,
    /// Bucket of joined rows for the row being committed
    pub join_table: Option<Rc<Vec<Row>>>,
    pub join_row_idx: usize,
    /// Iterating once with empty join values (outer join, no bucket)
    pub empty_outer_join: bool,
    pub case_sensitive: bool,
    pub cancel: CancelToken,
}

impl Context {
    pub fn new(cancel: CancelToken) -> Self {
        Context {
            cancel,
            ..Default::default()
        }
    }

    pub fn reset(&mut self, pass_type: PassType) {
        self.pass_type = pass_type;
        self.appending_values = false;
        self.num_nodes = 0;
        self.num_lines = 1;
        self.num_rows_matched = 0;
        self.num_rows_output = 0;
        self.relative_depth = 0;
        self.curr_depth = 0;
        self.node_stack.clear();
        self.attr_count_stack.clear();
        self.attr_stack.clear();
        self.reset_join_table();
    }

    pub fn set_join_table(&mut self, table: Rc<Vec<Row>>) {
        self.join_table = Some(table);
        self.empty_outer_join = false;
        self.join_row_idx = 0;
    }

    pub fn reset_join_table(&mut self) {
        self.join_table = None;
        self.empty_outer_join = false;
        self.join_row_idx = 0;
    }

    /// Case-policy string comparison for tag and attribute names
    pub fn names_equal(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_stacks() {
        let mut ctx = Context::new(CancelToken::new());
        ctx.num_nodes = 5;
        ctx.node_stack.push(NodeInfo {
            name: "a".into(),
            node_start: 1,
        });
        ctx.reset(PassType::Main);
        assert_eq!(ctx.num_nodes, 0);
        assert_eq!(ctx.num_lines, 1);
        assert!(ctx.node_stack.is_empty());
        assert_eq!(ctx.pass_type, PassType::Main);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let ctx = Context::new(token.clone());
        assert!(!ctx.cancel.is_cancelled());
        token.cancel();
        assert!(ctx.cancel.is_cancelled());
    }

    #[test]
    fn test_case_policy() {
        let mut ctx = Context::new(CancelToken::new());
        assert!(ctx.names_equal("Foo", "foo"));
        ctx.case_sensitive = true;
        assert!(!ctx.names_equal("Foo", "foo"));
    }
}
