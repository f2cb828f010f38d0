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

//! Query specification
//!
//! Parses column arguments into expressions, classifies columns, validates
//! structure, and hoists join-side sub-expressions into a secondary query.
//! Column-argument parsing runs in two passes: pass A collects names so
//! forward column references bind; pass B parses the expressions.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::core::{parse_boolean, Error, Result, Value, ValueType};

use super::expr::{
    infer_types, xflags, ColumnId, ColumnRefTarget, ExprArena, ExprId, PathRefId,
};
use super::ops::{self, flags as opflags, Opcode};
use super::token::{Token, TokenKind, Tokenizer};

/// Path-reference flags
pub mod prflags {
    /// Start pattern matched and data (or no-data relaxation) completed
    pub const MATCHED: u32 = 0x1;
    /// No character data needs to accumulate for this path
    pub const NO_DATA: u32 = 0x2;
    /// At least one reference wants character data
    pub const APPEND_DATA: u32 = 0x4;
    /// Commit the row as soon as this path alone matches
    pub const SYNC: u32 = 0x8;
    /// Declared against the join input
    pub const JOINED: u32 = 0x10;
}

/// Column flags
pub mod cflags {
    pub const OUTPUT: u32 = 0x1;
    pub const FILTER: u32 = 0x2;
    pub const AGGREGATE: u32 = 0x4;
    pub const JOINED_COLUMN: u32 = 0x8;
    /// Joined column that is also a where[] equality operand
    pub const INDEXED: u32 = 0x10;
    pub const PIVOT_RESULT: u32 = 0x20;
    /// Some partition produced a value for this pivot column
    pub const PIVOT_RESULT_REFERENCED: u32 = 0x40;
}

/// Query-level flags
pub mod qflags {
    pub const LINE_NUM_USED: u32 = 0x1;
    pub const GATHER_PASS_REQUIRED: u32 = 0x2;
    pub const NODE_STACK_REQUIRED: u32 = 0x4;
    pub const AGGREGATES_EXIST: u32 = 0x8;
    pub const SHOW_USAGE: u32 = 0x10;
    pub const DISTINCT_USED: u32 = 0x20;
    pub const FIRST_N_SPECIFIED: u32 = 0x40;
    pub const TOP_N_SPECIFIED: u32 = 0x80;
    pub const ATTRIBUTES_USED: u32 = 0x100;
    pub const HAS_PIVOT: u32 = 0x200;
    pub const LEFT_SIDE_OF_JOIN: u32 = 0x400;
    pub const RIGHT_SIDE_OF_JOIN: u32 = 0x800;
    pub const COLUMNS_ADDED: u32 = 0x1000;
}

/// A path reference: dotted spec, flags, and the value the matcher binds
#[derive(Debug, Clone)]
pub struct PathRefData {
    pub spec: String,
    pub flags: u32,
    /// Written by the matcher, read by the evaluator
    pub value: Value,
    /// Expressions re-evaluated when the start pattern matches
    pub start_match_exprs: Vec<ExprId>,
    /// Expressions re-evaluated when the end pattern matches
    pub end_match_exprs: Vec<ExprId>,
}

impl PathRefData {
    fn new(spec: String, flags: u32) -> Self {
        PathRefData {
            spec,
            flags,
            value: Value::Str(String::new()),
            start_match_exprs: Vec::new(),
            end_match_exprs: Vec::new(),
        }
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Arena of path references keyed by textual spec
#[derive(Debug, Default, Clone)]
pub struct PathRefArena {
    refs: Vec<PathRefData>,
    by_spec: FxHashMap<String, PathRefId>,
}

impl PathRefArena {
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Reuse the entry for a spec or create one
    pub fn intern(&mut self, spec: &str, flags: u32) -> PathRefId {
        if let Some(&id) = self.by_spec.get(spec) {
            return id;
        }
        let id = PathRefId(self.refs.len() as u32);
        self.refs.push(PathRefData::new(spec.to_string(), flags));
        self.by_spec.insert(spec.to_string(), id);
        id
    }

    pub fn get(&self, id: PathRefId) -> &PathRefData {
        &self.refs[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PathRefId) -> &mut PathRefData {
        &mut self.refs[id.0 as usize]
    }

    pub fn ids(&self) -> Vec<PathRefId> {
        (0..self.refs.len() as u32).map(PathRefId).collect()
    }
}

/// One query column
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub expr: ExprId,
    pub flags: u32,
    /// Position in the ordered column list
    pub index: usize,
    /// Position in the flat row vector, when the column carries a value
    pub value_idx: Option<usize>,
}

impl Column {
    pub fn new(name: String, expr: ExprId, flags: u32) -> Self {
        Column {
            name,
            expr,
            flags,
            index: usize::MAX,
            value_idx: None,
        }
    }

    pub fn is_output(&self) -> bool {
        self.flags & cflags::OUTPUT != 0
    }

    pub fn is_filter(&self) -> bool {
        self.flags & cflags::FILTER != 0
    }

    pub fn is_aggregate(&self) -> bool {
        self.flags & cflags::AGGREGATE != 0
    }

    pub fn is_pivot_result(&self) -> bool {
        self.flags & cflags::PIVOT_RESULT != 0
    }
}

/// Column slab with a stable-id order list, so pivot insert/delete cannot
/// invalidate references held elsewhere
#[derive(Debug, Default, Clone)]
pub struct Columns {
    slots: Vec<Column>,
    order: Vec<ColumnId>,
    by_name: FxHashMap<String, ColumnId>,
}

impl Columns {
    pub fn get(&self, name: &str) -> Option<ColumnId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn col(&self, id: ColumnId) -> &Column {
        &self.slots[id.0 as usize]
    }

    pub fn col_mut(&mut self, id: ColumnId) -> &mut Column {
        &mut self.slots[id.0 as usize]
    }

    /// Ordered column ids
    pub fn ordered(&self) -> Vec<ColumnId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, column: Column, idx: Option<usize>) -> Result<ColumnId> {
        let key = column.name.to_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(Error::DuplicateColumn(column.name));
        }
        let idx = idx.unwrap_or(self.order.len());
        let id = ColumnId(self.slots.len() as u32);
        self.slots.push(column);
        self.order.insert(idx, id);
        self.by_name.insert(key, id);
        Ok(id)
    }

    fn delete(&mut self, id: ColumnId) {
        if let Some(pos) = self.order.iter().position(|&c| c == id) {
            self.order.remove(pos);
            let key = self.slots[id.0 as usize].name.to_lowercase();
            self.by_name.remove(&key);
        }
    }
}

/// Main-input configuration
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub header: bool,
    pub filename: Option<String>,
    pub scope_name: String,
}

impl Default for InputSpec {
    fn default() -> Self {
        InputSpec {
            header: true,
            filename: None,
            scope_name: "in".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub header: bool,
}

impl Default for OutputSpec {
    fn default() -> Self {
        OutputSpec { header: true }
    }
}

/// Join configuration, built on behalf of the left side. The right side
/// turns this into its own [`QuerySpec`] via [`QuerySpec::for_join_side`].
#[derive(Debug, Clone, Default)]
pub struct JoinSpec {
    /// Query flags to propagate into the join-side spec
    pub flags: u32,
    pub header: bool,
    pub outer: bool,
    pub filename: String,
    pub scope_name: String,
    /// Hoisted joined columns, in hoist order
    pub columns: Vec<Column>,
    /// (join column position, left-side key expression) pairs from
    /// `where[expr == joined]` filters, in detection order
    pub equalities: Vec<(usize, ExprId)>,
}

impl JoinSpec {
    fn new() -> Self {
        JoinSpec {
            header: true,
            scope_name: "join".to_string(),
            ..Default::default()
        }
    }
}

/// Pivot binding handed to the pivoter after parsing
#[derive(Debug, Clone)]
pub struct PivotBinding {
    pub column: ColumnId,
    pub names: Vec<String>,
}

/// The parsed, classified query
#[derive(Debug, Default)]
pub struct QuerySpec {
    pub arena: ExprArena,
    pub columns: Columns,
    pub input_paths: PathRefArena,
    pub join_paths: PathRefArena,
    pub input: InputSpec,
    pub output: OutputSpec,
    pub join: JoinSpec,
    pub flags: u32,
    /// All expression nodes in parse order
    pub exprs: Vec<ExprId>,
    pub sort_column: Option<ColumnId>,
    /// Per sort key: string key whose root is `neg` reverses direction
    pub reversed_sorts: Vec<bool>,
    pub pivot_column: Option<ColumnId>,
    pub root_node_num: usize,
    pub first_n: usize,
    pub top_n: usize,
    pub aggr_count: usize,
    pub num_value_columns: usize,
    pub case_sensitive: bool,
}

impl QuerySpec {
    pub fn new() -> Self {
        QuerySpec {
            join: JoinSpec::new(),
            ..Default::default()
        }
    }

    pub fn is_flag_set(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn num_sort_values(&self) -> usize {
        self.sort_column
            .map(|c| self.arena.num_args(self.columns.col(c).expr))
            .unwrap_or(0)
    }

    /// Slots per row: value columns plus the sort-key tail
    pub fn row_size(&self) -> usize {
        self.num_value_columns + self.num_sort_values()
    }

    /// Insert a column, keeping `index`/`value_idx` invariants
    pub fn insert_column(&mut self, column: Column, idx: Option<usize>) -> Result<ColumnId> {
        let id = self.columns.insert(column, idx)?;
        self.update_indices();
        Ok(id)
    }

    /// Delete a column (pivot rollback), compacting indices
    pub fn delete_column(&mut self, id: ColumnId) {
        self.columns.delete(id);
        self.update_indices();
    }

    fn update_indices(&mut self) {
        let mut value_idx = 0;
        let order = self.columns.ordered();
        for (idx, id) in order.iter().enumerate() {
            let col = self.columns.col_mut(*id);
            col.index = idx;
            if col.is_output() || col.is_aggregate() {
                col.value_idx = Some(value_idx);
                value_idx += 1;
            } else {
                col.value_idx = None;
            }
        }
        self.num_value_columns = value_idx;
    }

    /// Parse the column arguments. Returns the pivot binding when a pivot
    /// directive is present.
    pub fn parse_column_specs(&mut self, column_specs: &[String]) -> Result<Option<PivotBinding>> {
        let mut parser = ColumnParser {
            spec: self,
            tokens: Tokenizer::new(""),
            current_names: Vec::new(),
            all_names: Vec::new(),
            current_column: None,
        };
        parser.parse_all(column_specs)
    }

    /// Build the query spec for the join side from the left side's
    /// [`JoinSpec`]. Hoisted expressions are copied into a fresh arena; the
    /// joined path references become this spec's input paths.
    pub fn for_join_side(main: &QuerySpec) -> Result<QuerySpec> {
        if main.join.columns.is_empty() {
            return Err(Error::EmptyJoinColumns);
        }
        let mut spec = QuerySpec::new();
        spec.input.header = main.join.header;
        spec.input.filename = Some(main.join.filename.clone());
        spec.input.scope_name = main.join.scope_name.clone();
        spec.case_sensitive = main.case_sensitive;

        // Path-reference ids survive because the whole arena carries over.
        // Registered expression ids do not; they are rebuilt below.
        spec.input_paths = main.join_paths.clone();
        for id in spec.input_paths.ids() {
            let binding = spec.input_paths.get_mut(id);
            binding.start_match_exprs.clear();
            binding.end_match_exprs.clear();
            binding.flags &= !prflags::MATCHED;
        }

        for column in &main.join.columns {
            let expr = main.arena.copy_subtree(column.expr, &mut spec.arena);
            let col = Column::new(column.name.clone(), expr, column.flags);
            spec.insert_column(col, None)?;

            let mut ids = Vec::new();
            spec.arena.subtree_ids(expr, &mut ids);
            for id in ids {
                spec.exprs.push(id);
                let node = spec.arena.node(id);
                if node.op.has_flag(opflags::IMMED_EVALUATE) {
                    let start = node.op.has_flag(opflags::START_MATCH_EVAL);
                    let op_name = node.op.name;
                    let arg0 = spec.arena.arg(id, 0);
                    let path_ref = spec.arena.node(arg0).path_ref;
                    let Some(pr) = path_ref else {
                        return Err(Error::FirstArgNotPath(op_name.to_string()));
                    };
                    let binding = spec.input_paths.get_mut(pr);
                    if start {
                        binding.start_match_exprs.push(id);
                    } else {
                        binding.end_match_exprs.push(id);
                    }
                    spec.flags |= qflags::NODE_STACK_REQUIRED;
                }
            }
        }

        spec.flags |= main.join.flags | qflags::RIGHT_SIDE_OF_JOIN | qflags::COLUMNS_ADDED;
        Ok(spec)
    }
}

/// Working state for column-argument parsing
struct ColumnParser<'a> {
    spec: &'a mut QuerySpec,
    tokens: Tokenizer,
    current_names: Vec<String>,
    /// Explicitly declared names from pass A, bindable as column references
    all_names: Vec<String>,
    current_column: Option<ColumnId>,
}

impl ColumnParser<'_> {
    fn parse_all(&mut self, column_specs: &[String]) -> Result<Option<PivotBinding>> {
        // Pass A: collect names (and name-driven overrides) per argument
        let mut names_per_column = Vec::new();
        let mut overrides_per_column = Vec::new();
        for column_spec in column_specs {
            self.tokens = Tokenizer::new(column_spec);
            let (names, explicit) = self.parse_column_names(column_spec)?;
            let names = if explicit { names } else { Vec::new() };
            for name in &names {
                self.all_names.push(name.clone());
            }
            overrides_per_column.push(self.handle_column_name_overrides(&names)?);
            names_per_column.push(names);
        }

        // Pass B: parse the expressions and add the columns
        let mut pivot_names: Vec<String> = Vec::new();
        for (idx, column_spec) in column_specs.iter().enumerate() {
            let (override_name, override_opcode) = overrides_per_column[idx].clone();
            self.current_names = names_per_column[idx].clone();
            self.parse_column_expr(column_spec, override_name)?;
            if override_opcode == Some(Opcode::Pivot) {
                pivot_names = self.current_names.clone();
            }
            self.current_names.clear();
        }

        self.post_process_refs()?;

        let pivot_binding = match self.spec.pivot_column {
            Some(column) => Some(PivotBinding {
                column,
                names: pivot_names,
            }),
            None => None,
        };

        // Hoist join-dependent subtrees out of every column expression
        for id in self.spec.columns.ordered() {
            let expr = self.spec.columns.col(id).expr;
            self.validate_and_hoist(expr)?;
            if self
                .spec
                .arena
                .node(expr)
                .has_flag(xflags::SUBTREE_CONTAINS_JOIN_PATH_REF)
            {
                let replacement = self.hoist_join_expr(expr);
                self.spec.columns.col_mut(id).expr = replacement;
            }
        }

        self.detect_join_equality();

        self.spec.flags |= qflags::COLUMNS_ADDED;
        Ok(pivot_binding)
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Pass A of each argument: one or more names separated by `,` and
    /// terminated by `:`, else the whole argument is the default name.
    fn parse_column_names(&mut self, column_spec: &str) -> Result<(Vec<String>, bool)> {
        let mut names: Vec<String> = Vec::new();
        let mut explicit = false;
        let mut found_colon = false;
        let mut expect_more = false;
        loop {
            let mut name = String::new();
            match self.tokens.lookahead(0)?.kind {
                TokenKind::Id | TokenKind::StringLit | TokenKind::Spread => {
                    name = self.tokens.next_token()?.text;
                    if name.is_empty() {
                        name = "...".to_string();
                    }
                }
                TokenKind::LBrace => {
                    self.expect_next(TokenKind::LBrace)?;
                    name = self.parse_unquoted_string(TokenKind::RBrace, None)?;
                    self.expect_next(TokenKind::RBrace)?;
                }
                _ => {}
            }
            if name.is_empty() {
                if expect_more {
                    return Err(Error::MissingColumnName);
                }
                break;
            }
            if names.contains(&name) {
                return Err(Error::DuplicateColumn(name));
            }
            names.push(name);
            match self.tokens.lookahead(0)?.kind {
                TokenKind::Comma => {
                    self.tokens.next_token()?;
                    explicit = true;
                    expect_more = true;
                }
                TokenKind::Colon => {
                    self.tokens.next_token()?;
                    explicit = true;
                    found_colon = true;
                    expect_more = false;
                }
                _ => {
                    expect_more = false;
                }
            }
            if !expect_more {
                break;
            }
        }

        if !found_colon {
            // the tokens were expression tokens, not a name list; roll the
            // tokenizer back and use the argument text as the default name
            self.tokens = Tokenizer::new(column_spec);
            names.clear();
            names.push(column_spec.to_string());
            if self.spec.columns.get(column_spec).is_some() {
                return Err(Error::DuplicateColumn(column_spec.to_string()));
            }
            return Ok((names, false));
        }

        for name in &names {
            if self.spec.columns.get(name).is_some() {
                return Err(Error::DuplicateColumn(name.clone()));
            }
        }
        Ok((names, true))
    }

    /// Columns named after the `in`/`join`/`pivot` directives rename the
    /// scope (or mark the pivot) instead of naming an output column.
    fn handle_column_name_overrides(
        &mut self,
        names: &[String],
    ) -> Result<(Option<String>, Option<Opcode>)> {
        let tok0 = self.tokens.lookahead(0)?;
        let tok1 = self.tokens.lookahead(1)?;
        if tok0.kind != TokenKind::Id
            || !matches!(tok1.kind, TokenKind::LBracket | TokenKind::LParen)
        {
            return Ok((None, None));
        }
        let Ok(def) = ops::lookup(&tok0.text) else {
            return Ok((None, None));
        };
        match def.opcode {
            Opcode::In => {
                if let Some(first) = names.first() {
                    if !first.is_empty() {
                        self.spec.input.scope_name = first.clone();
                    }
                }
                Ok((Some("__column_in".to_string()), Some(Opcode::In)))
            }
            Opcode::Join => {
                if let Some(first) = names.first() {
                    if !first.is_empty() {
                        self.spec.join.scope_name = first.clone();
                    }
                }
                Ok((Some("__column_join".to_string()), Some(Opcode::Join)))
            }
            Opcode::Pivot => Ok((Some("__column_pivot".to_string()), Some(Opcode::Pivot))),
            _ => Ok((None, None)),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_column_expr(
        &mut self,
        column_spec: &str,
        override_name: Option<String>,
    ) -> Result<ColumnId> {
        self.tokens = Tokenizer::new(column_spec);
        let (names, _) = self.parse_column_names(column_spec)?;
        let column_name = override_name.unwrap_or_else(|| names[0].clone());

        let expr = self.spec.arena.alloc_empty();
        self.parse_expr(expr, None, false)?;
        self.expect_next(TokenKind::End)?;

        infer_types(&mut self.spec.arena, expr);

        let column = Column::new(column_name, expr, 0);
        let col_id = self.spec.insert_column(column, None)?;
        self.current_column = Some(col_id);
        self.postprocess_column_exprs(expr, 0, false)?;
        self.current_column = None;
        // classification may have added Output/Aggregate flags
        self.spec.update_indices();
        Ok(col_id)
    }

    fn parse_expr(&mut self, expr: ExprId, parent: Option<ExprId>, unary: bool) -> Result<()> {
        let mut infix = false;
        let mut is_first_token = true;
        loop {
            let tok0 = self.tokens.lookahead(0)?;
            let tok1 = self.tokens.lookahead(1)?;
            match tok0.kind {
                TokenKind::LBrace => {
                    // braces distinguish quoted path segments from literals
                    self.parse_ref(expr)?;
                }
                TokenKind::LBracket => {
                    self.expect_next(TokenKind::LBracket)?;
                    self.parse_expr(expr, None, false)?;
                    self.expect_next(TokenKind::RBracket)?;
                }
                TokenKind::LParen => {
                    self.expect_next(TokenKind::LParen)?;
                    self.parse_expr(expr, None, false)?;
                    self.expect_next(TokenKind::RParen)?;
                }
                TokenKind::OptionPrefix => {
                    // --x is shorthand for x[], --x=v for x[v]
                    self.expect_next(TokenKind::OptionPrefix)?;
                    self.parse_function_call(expr, TokenKind::Assign, TokenKind::End, true)?;
                }
                TokenKind::Id => {
                    if is_boolean_literal(&tok0) {
                        self.parse_literal(expr)?;
                    } else if tok1.kind == TokenKind::LParen {
                        self.parse_function_call(expr, TokenKind::LParen, TokenKind::RParen, false)?;
                    } else if tok1.kind == TokenKind::LBracket {
                        self.parse_function_call(
                            expr,
                            TokenKind::LBracket,
                            TokenKind::RBracket,
                            false,
                        )?;
                    } else {
                        self.parse_ref(expr)?;
                    }
                }
                TokenKind::Not => {
                    self.parse_unary_operator(expr)?;
                }
                TokenKind::Minus => {
                    if infix {
                        self.parse_infix_operator(expr, parent)?;
                    } else {
                        self.parse_unary_operator(expr)?;
                    }
                }
                TokenKind::Mult => {
                    if infix {
                        self.parse_infix_operator(expr, parent)?;
                    } else if tok1.kind == TokenKind::Dot {
                        self.parse_ref(expr)?;
                    } else {
                        return Err(Error::Unexpected(TokenKind::Mult.describe().to_string()));
                    }
                }
                TokenKind::NumberLit | TokenKind::StringLit => {
                    self.parse_literal(expr)?;
                }
                TokenKind::End => {
                    return Err(Error::MissingExpression);
                }
                TokenKind::Error => {
                    return Err(Error::Unexpected(tok0.text));
                }
                TokenKind::Plus if is_first_token => {
                    return Err(Error::PositiveUnary);
                }
                kind if kind.is_infix() && !is_first_token => {
                    self.parse_infix_operator(expr, parent)?;
                }
                _ => {
                    return Err(Error::Unexpected(tok0.describe()));
                }
            }
            is_first_token = false;
            infix = self.tokens.lookahead(0)?.kind.is_infix();
            if unary || !infix {
                return Ok(());
            }
        }
    }

    fn parse_literal(&mut self, expr: ExprId) -> Result<()> {
        let node = self.spec.arena.node_mut(expr);
        node.op = ops::lookup_opcode(Opcode::Literal);
        let token = self.tokens.next_token()?;
        match token.kind {
            TokenKind::NumberLit => {
                let value = crate::core::parse_real_prefix(&token.text).0;
                self.spec.arena.set_value_and_type(expr, Value::Real(value));
            }
            TokenKind::Id if is_boolean_literal(&token) => {
                let (value, _) = parse_boolean(&token.text);
                self.spec.arena.set_value_and_type(expr, Value::Bool(value));
            }
            TokenKind::StringLit => {
                self.spec
                    .arena
                    .set_value_and_type(expr, Value::Str(token.text));
            }
            _ => {
                return Err(Error::Expected {
                    expected: format!(
                        "{} or {}",
                        TokenKind::NumberLit.describe(),
                        TokenKind::StringLit.describe()
                    ),
                    got: token.describe(),
                });
            }
        }
        Ok(())
    }

    /// Parse a path or column reference, with optional `scope::` prefix and
    /// `{...}` quoted segments.
    fn parse_ref(&mut self, expr: ExprId) -> Result<()> {
        {
            let node = self.spec.arena.node_mut(expr);
            node.op = ops::lookup_opcode(Opcode::PathRef);
            node.ty = node.op.result;
        }

        let mut path_spec = String::new();
        let mut joined = false;
        while self.tokens.lookahead(0)?.kind != TokenKind::End {
            if path_spec.is_empty()
                && self.tokens.lookahead(0)?.kind == TokenKind::Id
                && self.tokens.lookahead(1)?.kind == TokenKind::Scope
            {
                // scoped reference (e.g. join::ref): peel off the scope name
                let token = self.expect_next(TokenKind::Id)?;
                self.expect_next(TokenKind::Scope)?;
                if token.text.eq_ignore_ascii_case(&self.spec.join.scope_name) {
                    joined = true;
                } else if token.text.eq_ignore_ascii_case(&self.spec.input.scope_name) {
                    // input scope adds no information; path refs default to
                    // the main input
                } else {
                    return Err(Error::UnknownScope(token.text));
                }
            }
            let next_kind = self.tokens.lookahead(0)?.kind;
            if next_kind == TokenKind::LBrace {
                path_spec.push_str(&self.expect_next(TokenKind::LBrace)?.text);
                path_spec.push_str(&self.parse_unquoted_string(TokenKind::RBrace, None)?);
                path_spec.push_str(&self.expect_next(TokenKind::RBrace)?.text);
            } else if !path_spec.is_empty() && next_kind == TokenKind::NumberLit {
                path_spec.push_str(&self.expect_next(TokenKind::NumberLit)?.text);
            } else {
                let token = self.tokens.next_token()?;
                if !matches!(token.kind, TokenKind::Id | TokenKind::Mult) {
                    return Err(Error::Expected {
                        expected: format!(
                            "{} or {}",
                            TokenKind::Id.describe(),
                            TokenKind::Mult.describe()
                        ),
                        got: token.describe(),
                    });
                }
                path_spec.push_str(&token.text);
            }
            // keep consuming segments joined by single dots; `..` and `...`
            // belong to the surrounding expression
            if self.tokens.lookahead(0)?.kind != TokenKind::Dot {
                break;
            }
            path_spec.push_str(&self.tokens.next_token()?.text);
        }

        // check that the spec splits cleanly
        for tag in split_path_spec(&path_spec) {
            if tag.starts_with('{') && !tag.ends_with('}') {
                return Err(Error::UnbalancedBraces(path_spec));
            }
        }

        if !joined && self.is_bindable_column_name(&path_spec) {
            let node = self.spec.arena.node_mut(expr);
            node.op = ops::lookup_opcode(Opcode::ColumnRef);
            node.ty = node.op.result;
            // resolved once all columns are parsed
            node.column_ref = Some(ColumnRefTarget::Unresolved(path_spec));
        } else {
            let arena = if joined {
                &mut self.spec.join_paths
            } else {
                &mut self.spec.input_paths
            };
            let flags = if joined { prflags::JOINED } else { 0 };
            let pr = arena.intern(&path_spec, flags);
            let node = self.spec.arena.node_mut(expr);
            node.path_ref = Some(pr);
            node.path_ref_joined = joined;
        }
        Ok(())
    }

    fn parse_unary_operator(&mut self, expr: ExprId) -> Result<()> {
        let token = self.tokens.next_token()?;
        let opcode = match token.kind {
            TokenKind::Not => Opcode::Not,
            TokenKind::Minus => Opcode::Neg,
            _ => {
                return Err(Error::Expected {
                    expected: "! or -".to_string(),
                    got: token.describe(),
                })
            }
        };
        {
            let node = self.spec.arena.node_mut(expr);
            node.op = ops::lookup_opcode(opcode);
            node.ty = node.op.result;
        }
        let child = self.spec.arena.alloc_empty();
        self.spec.arena.node_mut(expr).args.push(child);
        self.parse_expr(child, Some(expr), true)
    }

    fn parse_infix_operator(&mut self, expr: ExprId, parent: Option<ExprId>) -> Result<()> {
        let token = self.tokens.next_token()?;
        let op = ops::lookup(&token.text)?;

        // this expression becomes the left child of the new operator
        let left = {
            let node = self.spec.arena.node(expr).clone();
            let id = self.spec.arena.alloc_empty();
            *self.spec.arena.node_mut(id) = node;
            id
        };
        {
            let node = self.spec.arena.node_mut(expr);
            node.op = op;
            node.ty = op.result;
            node.args = SmallVec::new();
            node.value = Value::Unknown;
            node.flags = 0;
            node.path_ref = None;
            node.path_ref_joined = false;
            node.column_ref = None;
            node.args.push(left);
        }

        if op.opcode == Opcode::Attr {
            // the attribute accessor's right-hand identifier is a literal
            let token = self.expect_next(TokenKind::Id)?;
            let right = self.spec.arena.alloc(ops::lookup_opcode(Opcode::Literal));
            self.spec
                .arena
                .set_value_and_type(right, Value::Str(token.text));
            self.spec.arena.node_mut(expr).args.push(right);
        } else {
            let right = self.spec.arena.alloc_empty();
            self.spec.arena.node_mut(expr).args.push(right);
            self.parse_expr(right, Some(expr), false)?;
        }

        // Rotate for left associativity when a tighter-or-equal parent sits
        // above: 1*2+3 parses as *(1, +(2,3)) and must become +(*(1,2), 3).
        if let Some(parent) = parent {
            if self.spec.arena.node(parent).opcode() <= op.opcode {
                let save_top = self.spec.arena.node(parent).clone();
                let expr_arg0 = self.spec.arena.arg(expr, 0);
                let save_left = self.spec.arena.node(expr_arg0).clone();
                let expr_node = self.spec.arena.node(expr).clone();
                *self.spec.arena.node_mut(parent) = expr_node;
                let new_left = self.spec.arena.arg(parent, 0);
                *self.spec.arena.node_mut(new_left) = save_top;
                let restored = self.spec.arena.arg(new_left, 1);
                *self.spec.arena.node_mut(restored) = save_left;
            }
        }
        Ok(())
    }

    fn parse_function_call(
        &mut self,
        expr: ExprId,
        start: TokenKind,
        end: TokenKind,
        start_optional: bool,
    ) -> Result<()> {
        let token = self.expect_next(TokenKind::Id)?;
        let op = ops::lookup(&token.text)?;
        {
            let node = self.spec.arena.node_mut(expr);
            node.op = op;
            node.ty = op.result;
        }

        let mut token = token;
        if !start_optional || self.tokens.lookahead(0)?.kind == start {
            token = self.expect_next(start)?;
        }
        if self.tokens.lookahead(0)?.kind == TokenKind::Comma {
            return Err(Error::Unexpected(TokenKind::Comma.describe().to_string()));
        }
        if self.tokens.lookahead(0)?.kind == end {
            self.expect_next(end)?;
        } else if token.kind == start {
            loop {
                let arg = self.spec.arena.alloc_empty();
                self.spec.arena.node_mut(expr).args.push(arg);
                let num_args = self.spec.arena.num_args(expr);
                let kind = self.tokens.lookahead(0)?.kind;
                let unquoted = !matches!(kind, TokenKind::StringLit | TokenKind::NumberLit)
                    && ((num_args == 1 && op.has_flag(opflags::UNQUOTED_FIRST_ARG))
                        || (num_args == 2 && op.has_flag(opflags::UNQUOTED_SECOND_ARG)));
                if unquoted {
                    let text = self.parse_unquoted_string(end, Some(TokenKind::Comma))?;
                    let node = self.spec.arena.node_mut(arg);
                    node.op = ops::lookup_opcode(Opcode::Literal);
                    self.spec.arena.set_value_and_type(arg, Value::Str(text));
                } else {
                    self.parse_expr(arg, None, false)?;
                }
                token = self.tokens.next_token()?;
                if token.kind == end {
                    break;
                }
                if token.kind != TokenKind::Comma {
                    return Err(Error::Expected {
                        expected: format!(", or {}", end.describe()),
                        got: token.describe(),
                    });
                }
            }
        }

        // arity resolves the overloaded min/max into their aggregates
        let num_args = self.spec.arena.num_args(expr);
        let opcode = self.spec.arena.node(expr).opcode();
        if num_args == 1 && opcode == Opcode::Min {
            self.spec.arena.node_mut(expr).op = ops::lookup_opcode(Opcode::MinAggr);
        }
        if num_args == 1 && opcode == Opcode::Max {
            self.spec.arena.node_mut(expr).op = ops::lookup_opcode(Opcode::MaxAggr);
        }

        let op = self.spec.arena.node(expr).op;
        if num_args < op.min_args || num_args > op.max_args {
            return Err(Error::WrongArity(op.name.to_string()));
        }
        Ok(())
    }

    fn parse_unquoted_string(
        &mut self,
        end: TokenKind,
        alternative: Option<TokenKind>,
    ) -> Result<String> {
        let mut out = String::new();
        loop {
            let kind = self.tokens.lookahead(0)?.kind;
            if kind == TokenKind::End || kind == end || Some(kind) == alternative {
                break;
            }
            out.push_str(&self.tokens.next_token()?.text);
        }
        Ok(out)
    }

    fn expect_next(&mut self, expected: TokenKind) -> Result<Token> {
        let token = self.tokens.next_token()?;
        if token.kind != expected {
            return Err(Error::Expected {
                expected: expected.describe().to_string(),
                got: token.describe(),
            });
        }
        Ok(token)
    }

    fn is_bindable_column_name(&self, name: &str) -> bool {
        // never bind the current column's own names: [a]:a keeps `a` a path
        for current in &self.current_names {
            if current.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        self.all_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    }

    // =========================================================================
    // Classification
    // =========================================================================

    fn postprocess_column_exprs(
        &mut self,
        expr: ExprId,
        depth: usize,
        no_data_parent: bool,
    ) -> Result<()> {
        let op = self.spec.arena.node(expr).op;
        let col_id = self.current_column.expect("postprocess outside a column");

        if op.has_flag(opflags::TOP_LEVEL_ONLY) && depth > 0 {
            return Err(Error::TopLevelOnly(op.name.to_string()));
        }
        if op.has_flag(opflags::ONCE_ONLY) {
            for &prior in &self.spec.exprs {
                if self.spec.arena.node(prior).opcode() == op.opcode {
                    return Err(Error::OnceOnly(op.name.to_string()));
                }
            }
        }
        self.spec.exprs.push(expr);

        if op.is_aggregate() {
            self.spec.columns.col_mut(col_id).flags |= cflags::AGGREGATE;
            let idx = self.spec.aggr_count;
            self.spec.aggr_count += 1;
            let node = self.spec.arena.node_mut(expr);
            node.flags |= xflags::SUBTREE_CONTAINS_AGGREGATE;
            node.aggr_idx = Some(idx);
            self.spec.flags |= qflags::AGGREGATES_EXIST;
        }
        if op.has_flag(opflags::GATHER_DATA) {
            self.spec.flags |= qflags::GATHER_PASS_REQUIRED;
        }

        let num_args = self.spec.arena.num_args(expr);
        match op.opcode {
            Opcode::PathRef => {
                let joined = self.spec.arena.node(expr).path_ref_joined;
                self.spec.arena.node_mut(expr).flags |= if joined {
                    xflags::SUBTREE_CONTAINS_JOIN_PATH_REF
                } else {
                    xflags::SUBTREE_CONTAINS_INPUT_PATH_REF
                };
                if let Some(pr) = self.spec.arena.node(expr).path_ref {
                    let arena = if joined {
                        &mut self.spec.join_paths
                    } else {
                        &mut self.spec.input_paths
                    };
                    let binding = arena.get_mut(pr);
                    if no_data_parent {
                        binding.flags |= prflags::NO_DATA;
                    } else {
                        // voids the no-data flag once all refs are seen
                        binding.flags |= prflags::APPEND_DATA;
                        binding.flags &= !prflags::NO_DATA;
                    }
                }
            }
            Opcode::Case => {
                let on = num_args == 0
                    || self
                        .spec
                        .arena
                        .node(self.spec.arena.arg(expr, 0))
                        .value
                        .as_bool();
                self.spec.case_sensitive = on;
            }
            Opcode::Attr => {
                self.spec.flags |= qflags::ATTRIBUTES_USED;
            }
            Opcode::LineNum => {
                self.spec.flags |= qflags::LINE_NUM_USED;
            }
            Opcode::Distinct => {
                self.spec.flags |= qflags::DISTINCT_USED;
            }
            Opcode::First => {
                let n = self
                    .spec
                    .arena
                    .node(self.spec.arena.arg(expr, 0))
                    .value
                    .as_int();
                self.spec.first_n = n.max(0) as usize;
                self.spec.flags |= qflags::FIRST_N_SPECIFIED;
            }
            Opcode::Top => {
                let n = self
                    .spec
                    .arena
                    .node(self.spec.arena.arg(expr, 0))
                    .value
                    .as_int();
                self.spec.top_n = n.max(0) as usize;
                self.spec.flags |= qflags::TOP_N_SPECIFIED;
            }
            Opcode::Pivot => {
                self.spec.pivot_column = Some(col_id);
                self.spec.flags |= qflags::HAS_PIVOT;
            }
            Opcode::Sort => {
                self.spec.sort_column = Some(col_id);
                for i in 0..num_args {
                    let arg = self.spec.arena.arg(expr, i);
                    let node = self.spec.arena.node(arg);
                    self.spec.reversed_sorts.push(
                        matches!(node.ty, ValueType::Unknown | ValueType::String)
                            && node.opcode() == Opcode::Neg,
                    );
                }
            }
            Opcode::InputHeader => {
                self.spec.input.header = num_args == 0
                    || self
                        .spec
                        .arena
                        .node(self.spec.arena.arg(expr, 0))
                        .value
                        .as_bool();
            }
            Opcode::JoinHeader => {
                self.spec.join.header = num_args == 0
                    || self
                        .spec
                        .arena
                        .node(self.spec.arena.arg(expr, 0))
                        .value
                        .as_bool();
            }
            Opcode::OutputHeader => {
                self.spec.output.header = num_args == 0
                    || self
                        .spec
                        .arena
                        .node(self.spec.arena.arg(expr, 0))
                        .value
                        .as_bool();
            }
            Opcode::Help => {
                self.spec.flags |= qflags::SHOW_USAGE;
            }
            Opcode::In => {
                let name = self
                    .spec
                    .arena
                    .node(self.spec.arena.arg(expr, 0))
                    .value
                    .render(true);
                self.spec.input.filename = Some(name);
            }
            Opcode::Join => {
                self.spec.join.filename = self
                    .spec
                    .arena
                    .node(self.spec.arena.arg(expr, 0))
                    .value
                    .render(true);
                if num_args == 2 {
                    self.spec.join.outer = self
                        .spec
                        .arena
                        .node(self.spec.arena.arg(expr, 1))
                        .value
                        .as_bool();
                }
                self.spec.flags |= qflags::LEFT_SIDE_OF_JOIN;
            }
            Opcode::Sync => {
                let arg0 = self.spec.arena.arg(expr, 0);
                let node = self.spec.arena.node(arg0);
                let Some(pr) = node.path_ref else {
                    return Err(Error::FirstArgNotPath(op.name.to_string()));
                };
                let joined = node.path_ref_joined;
                let arena = if joined {
                    &mut self.spec.join_paths
                } else {
                    &mut self.spec.input_paths
                };
                arena.get_mut(pr).flags |= prflags::SYNC;
            }
            Opcode::Root => {
                let n = self
                    .spec
                    .arena
                    .node(self.spec.arena.arg(expr, 0))
                    .value
                    .as_int();
                self.spec.root_node_num = n.max(0) as usize;
            }
            _ => {}
        }

        if depth == 0 {
            if !op.is_directive() {
                self.spec.columns.col_mut(col_id).flags |= cflags::OUTPUT;
            }
            if op.opcode == Opcode::Where {
                self.spec.arena.change_type(expr, ValueType::Boolean);
                self.spec.columns.col_mut(col_id).flags |= cflags::FILTER;
            }
            if op.opcode != Opcode::Pivot {
                if self.current_names.len() > 1 {
                    return Err(Error::MultipleColumnNames);
                }
                if self.current_names.len() == 1 && self.current_names[0] == "..." {
                    return Err(Error::SpreadOutsidePivot);
                }
            }
        }

        // pivot consumes its paths' character data even though it is a
        // directive; every other no-data operator only positions its paths
        let child_no_data = op.has_flag(opflags::NO_DATA) && op.opcode != Opcode::Pivot;
        for i in 0..self.spec.arena.num_args(expr) {
            let arg = self.spec.arena.arg(expr, i);
            self.postprocess_column_exprs(arg, depth + 1, child_no_data)?;
        }
        Ok(())
    }

    /// Runs after all columns are parsed: cross-column checks, immediate
    /// registration, and column-reference resolution.
    fn post_process_refs(&mut self) -> Result<()> {
        if self.spec.input_paths.is_empty() {
            if self.spec.is_flag_set(qflags::LEFT_SIDE_OF_JOIN) {
                return Err(Error::JoinRequiresInputPaths);
            }
            if self.spec.sort_column.is_some() {
                return Err(Error::SortRequiresInputPaths);
            }
            if self.spec.is_flag_set(qflags::DISTINCT_USED) {
                return Err(Error::DistinctRequiresInputPaths);
            }
        }
        if !self.spec.join_paths.is_empty() && !self.spec.is_flag_set(qflags::LEFT_SIDE_OF_JOIN) {
            return Err(Error::JoinedPathWithoutJoin);
        }
        if self.spec.join_paths.is_empty() && self.spec.is_flag_set(qflags::LEFT_SIDE_OF_JOIN) {
            return Err(Error::JoinRequiresJoinedPaths);
        }

        for id in self.spec.input_paths.ids() {
            let binding = self.spec.input_paths.get_mut(id);
            if binding.has_flag(prflags::APPEND_DATA) {
                binding.flags &= !prflags::NO_DATA;
            }
        }

        for idx in 0..self.spec.exprs.len() {
            let expr = self.spec.exprs[idx];
            let op = self.spec.arena.node(expr).op;

            if op.has_flag(opflags::IMMED_EVALUATE) {
                let arg0 = self.spec.arena.arg(expr, 0);
                let node = self.spec.arena.node(arg0);
                let Some(pr) = node.path_ref else {
                    return Err(Error::FirstArgNotPath(op.name.to_string()));
                };
                let joined = node.path_ref_joined;
                let start = op.has_flag(opflags::START_MATCH_EVAL);
                let arena = if joined {
                    &mut self.spec.join_paths
                } else {
                    &mut self.spec.input_paths
                };
                let binding = arena.get_mut(pr);
                if start {
                    binding.start_match_exprs.push(expr);
                } else {
                    binding.end_match_exprs.push(expr);
                }
                if joined {
                    self.spec.join.flags |= qflags::NODE_STACK_REQUIRED;
                } else {
                    self.spec.flags |= qflags::NODE_STACK_REQUIRED;
                }
            }

            if self.spec.arena.node(expr).opcode() == Opcode::ColumnRef {
                self.resolve_column_ref(expr)?;
            }
        }
        Ok(())
    }

    fn resolve_column_ref(&mut self, expr: ExprId) -> Result<()> {
        let name = match self.spec.arena.node(expr).column_ref.clone() {
            Some(ColumnRefTarget::Unresolved(name)) => name,
            _ => return Ok(()),
        };
        let mut current = name.clone();
        let mut seen = vec![current.to_lowercase()];
        let mut target = self
            .spec
            .columns
            .get(&current)
            .ok_or_else(|| Error::UnresolvedColumnRef(name.clone()))?;
        loop {
            let target_expr = self.spec.columns.col(target).expr;
            match self.spec.arena.node(target_expr).column_ref.clone() {
                Some(ColumnRefTarget::Unresolved(next)) => {
                    if seen.contains(&next.to_lowercase()) {
                        return Err(Error::CircularColumnRef(name));
                    }
                    seen.push(next.to_lowercase());
                    current = next;
                    target = self
                        .spec
                        .columns
                        .get(&current)
                        .ok_or_else(|| Error::UnresolvedColumnRef(name.clone()))?;
                }
                Some(ColumnRefTarget::Local(next_id)) => {
                    let next_name = self.spec.columns.col(next_id).name.to_lowercase();
                    if seen.contains(&next_name) {
                        return Err(Error::CircularColumnRef(name));
                    }
                    seen.push(next_name);
                    target = next_id;
                }
                _ => break,
            }
        }
        self.spec.arena.node_mut(expr).column_ref = Some(ColumnRefTarget::Local(target));
        Ok(())
    }

    // =========================================================================
    // Structural validation and the join hoist
    // =========================================================================

    fn validate_and_hoist(&mut self, expr: ExprId) -> Result<()> {
        if self.spec.arena.node(expr).has_flag(xflags::VISITED) {
            // column references make the traversal DAG-like
            return Ok(());
        }
        self.spec.arena.node_mut(expr).flags |= xflags::VISITED;

        let op = self.spec.arena.node(expr).op;

        if let Some(ColumnRefTarget::Local(target)) = self.spec.arena.node(expr).column_ref.clone()
        {
            let target_expr = self.spec.columns.col(target).expr;
            self.validate_and_hoist(target_expr)?;
            self.rollup_flags(expr, target_expr)?;
        } else {
            for i in 0..self.spec.arena.num_args(expr) {
                let arg = self.spec.arena.arg(expr, i);
                self.validate_and_hoist(arg)?;
                self.rollup_flags(expr, arg)?;
            }
        }

        // Hoist join-dependent children before computing an aggregation or a
        // function that also depends on an input path. Larger join-only
        // subtrees accumulate before hoisting.
        let flags = self.spec.arena.node(expr).flags;
        if flags & xflags::SUBTREE_CONTAINS_JOIN_PATH_REF != 0
            && (flags & xflags::SUBTREE_CONTAINS_INPUT_PATH_REF != 0 || op.is_aggregate())
        {
            for i in 0..self.spec.arena.num_args(expr) {
                let arg = self.spec.arena.arg(expr, i);
                if self
                    .spec
                    .arena
                    .node(arg)
                    .has_flag(xflags::SUBTREE_CONTAINS_JOIN_PATH_REF)
                {
                    let replacement = self.hoist_join_expr(arg);
                    self.spec.arena.node_mut(expr).args[i] = replacement;
                }
            }
            self.spec.arena.node_mut(expr).flags &= !xflags::SUBTREE_CONTAINS_JOIN_PATH_REF;
        }

        // aggregations erase input-path dependencies
        if op.is_aggregate() {
            self.spec.arena.node_mut(expr).flags &= !xflags::SUBTREE_CONTAINS_INPUT_PATH_REF;
        }

        // A function of both an aggregate and a live path reference (e.g.
        // foo+sum[bar]) is unsupported; literals are fine. Sort handles the
        // mixture itself.
        let flags = self.spec.arena.node(expr).flags;
        if op.opcode != Opcode::Sort
            && flags & xflags::SUBTREE_CONTAINS_AGGREGATE != 0
            && flags & xflags::SUBTREE_CONTAINS_PATH_REF != 0
        {
            return Err(Error::MixedAggregate);
        }
        Ok(())
    }

    fn rollup_flags(&mut self, parent: ExprId, child: ExprId) -> Result<()> {
        let child_flags = self.spec.arena.node(child).flags;
        let parent_op = self.spec.arena.node(parent).op;
        if child_flags & xflags::SUBTREE_CONTAINS_AGGREGATE != 0 {
            if parent_op.is_aggregate() {
                return Err(Error::AggregateNesting);
            }
            self.spec.arena.node_mut(parent).flags |= xflags::SUBTREE_CONTAINS_AGGREGATE;
        }
        if child_flags & xflags::SUBTREE_CONTAINS_INPUT_PATH_REF != 0 {
            self.spec.arena.node_mut(parent).flags |= xflags::SUBTREE_CONTAINS_INPUT_PATH_REF;
        }
        if child_flags & xflags::SUBTREE_CONTAINS_JOIN_PATH_REF != 0 {
            self.spec.arena.node_mut(parent).flags |= xflags::SUBTREE_CONTAINS_JOIN_PATH_REF;
        }
        Ok(())
    }

    /// Move a join-only subtree into the secondary query and replace it with
    /// a reference to the synthesized joined column.
    fn hoist_join_expr(&mut self, expr: ExprId) -> ExprId {
        let col_idx = self.spec.join.columns.len();
        let name = format!("__joincolumn_{}", col_idx + 1);
        let mut column = Column::new(name, expr, cflags::OUTPUT | cflags::JOINED_COLUMN);
        column.index = col_idx;
        column.value_idx = Some(col_idx);
        self.spec.join.columns.push(column);

        let ty = self.spec.arena.node(expr).ty;
        let replacement = self.spec.arena.alloc(ops::lookup_opcode(Opcode::ColumnRef));
        let node = self.spec.arena.node_mut(replacement);
        node.ty = ty;
        node.column_ref = Some(ColumnRefTarget::Joined(col_idx));
        replacement
    }

    /// Collect `where[lhs == rhs]` filters with a joined-column operand.
    /// These drive the join hash index and get a free pass on the empty
    /// outer-join iteration.
    fn detect_join_equality(&mut self) {
        for col_id in self.spec.columns.ordered() {
            let col = self.spec.columns.col(col_id);
            if !col.is_filter() {
                continue;
            }
            let where_expr = col.expr;
            if self.spec.arena.node(where_expr).opcode() != Opcode::Where {
                continue;
            }
            let pred = self.spec.arena.arg(where_expr, 0);
            if self.spec.arena.node(pred).opcode() != Opcode::Eq {
                continue;
            }
            for operand in 0..2 {
                let side = self.spec.arena.arg(pred, operand);
                if let Some(ColumnRefTarget::Joined(join_idx)) =
                    self.spec.arena.node(side).column_ref
                {
                    self.spec.join.columns[join_idx].flags |= cflags::INDEXED;
                    let other = self.spec.arena.arg(pred, 1 - operand);
                    self.spec.join.equalities.push((join_idx, other));
                    self.spec.arena.node_mut(where_expr).flags |= xflags::JOIN_EQUALITY_WHERE;
                    break;
                }
            }
        }
    }
}

fn is_boolean_literal(token: &Token) -> bool {
    token.kind == TokenKind::Id
        && (token.text.eq_ignore_ascii_case("true") || token.text.eq_ignore_ascii_case("false"))
}

/// Split a dotted path spec, honoring `{...}` quoting
pub fn split_path_spec(spec: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_braces = false;
    for c in spec.chars() {
        match c {
            '{' if !in_braces => {
                in_braces = true;
                current.push(c);
            }
            '}' if in_braces => {
                in_braces = false;
                current.push(c);
            }
            '.' if !in_braces => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> QuerySpec {
        let mut spec = QuerySpec::new();
        let specs: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        spec.parse_column_specs(&specs).unwrap();
        spec
    }

    fn parse_err(args: &[&str]) -> Error {
        let mut spec = QuerySpec::new();
        let specs: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        spec.parse_column_specs(&specs).unwrap_err()
    }

    #[test]
    fn test_simple_projection() {
        let spec = parse(&["category", "sales"]);
        assert_eq!(spec.columns.len(), 2);
        assert_eq!(spec.num_value_columns, 2);
        assert_eq!(spec.input_paths.len(), 2);
        let ids = spec.columns.ordered();
        assert!(spec.columns.col(ids[0]).is_output());
        assert_eq!(spec.columns.col(ids[0]).value_idx, Some(0));
    }

    #[test]
    fn test_where_is_a_filter_not_output() {
        let spec = parse(&["a", "where[a>1]"]);
        let ids = spec.columns.ordered();
        assert!(spec.columns.col(ids[1]).is_filter());
        assert!(!spec.columns.col(ids[1]).is_output());
        assert_eq!(spec.num_value_columns, 1);
        // the shared path ref is interned once
        assert_eq!(spec.input_paths.len(), 1);
    }

    #[test]
    fn test_aggregate_column_classification() {
        let spec = parse(&["k", "sum[v]"]);
        let ids = spec.columns.ordered();
        assert!(spec.columns.col(ids[1]).is_aggregate());
        assert!(spec.is_flag_set(qflags::AGGREGATES_EXIST));
        assert_eq!(spec.aggr_count, 1);
    }

    #[test]
    fn test_infix_precedence_rotation() {
        let spec = parse(&["x:1*2+3"]);
        let ids = spec.columns.ordered();
        let root = spec.columns.col(ids[0]).expr;
        assert_eq!(spec.arena.node(root).opcode(), Opcode::Add);
        let left = spec.arena.arg(root, 0);
        assert_eq!(spec.arena.node(left).opcode(), Opcode::Mul);
    }

    #[test]
    fn test_explicit_names_and_column_refs() {
        let spec = parse(&["total:a+0", "where[total>1]"]);
        let ids = spec.columns.ordered();
        assert_eq!(spec.columns.col(ids[0]).name, "total");
        // `total` inside the filter resolves to a column reference
        let where_expr = spec.columns.col(ids[1]).expr;
        let pred = spec.arena.arg(where_expr, 0);
        let lhs = spec.arena.arg(pred, 0);
        assert!(matches!(
            spec.arena.node(lhs).column_ref,
            Some(ColumnRefTarget::Local(_))
        ));
    }

    #[test]
    fn test_duplicate_column_name_rejected() {
        assert!(matches!(
            parse_err(&["a:x", "a:y"]),
            Error::DuplicateColumn(_)
        ));
    }

    #[test]
    fn test_circular_column_reference_rejected() {
        assert!(matches!(
            parse_err(&["a:b", "b:a"]),
            Error::CircularColumnRef(_)
        ));
    }

    #[test]
    fn test_directives_set_flags() {
        let spec = parse(&["a", "--distinct", "first[5]", "top[3]"]);
        assert!(spec.is_flag_set(qflags::DISTINCT_USED));
        assert_eq!(spec.first_n, 5);
        assert_eq!(spec.top_n, 3);
    }

    #[test]
    fn test_once_only_directive_rejected_on_repeat() {
        assert!(matches!(
            parse_err(&["a", "first[1]", "first[2]"]),
            Error::OnceOnly(_)
        ));
    }

    #[test]
    fn test_sort_records_reversed_string_keys() {
        // numeric keys reverse through negation itself; only string keys
        // need the per-key reversal flag
        let spec = parse(&["k", "v", "sort[-str[k],v]"]);
        assert_eq!(spec.reversed_sorts, vec![true, false]);
        assert!(spec.sort_column.is_some());
        assert_eq!(spec.row_size(), 2 + 2);
    }

    #[test]
    fn test_join_hoist_produces_join_columns() {
        let spec = parse(&["id", "join::label", "join[file.csv]", "where[id==join::id]"]);
        assert!(spec.is_flag_set(qflags::LEFT_SIDE_OF_JOIN));
        // label projection and the where operand both hoisted
        assert_eq!(spec.join.columns.len(), 2);
        assert_eq!(spec.join.columns[0].name, "__joincolumn_1");
        assert!(spec.join.columns[1].flags & cflags::INDEXED != 0);
        assert_eq!(spec.join.equalities.len(), 1);

        // after hoisting no column expression mentions a join path
        for id in spec.columns.ordered() {
            let expr = spec.columns.col(id).expr;
            assert!(!spec
                .arena
                .node(expr)
                .has_flag(xflags::SUBTREE_CONTAINS_JOIN_PATH_REF));
        }
        // hoisted expressions contain no input path refs
        for jc in &spec.join.columns {
            assert!(!spec
                .arena
                .node(jc.expr)
                .has_flag(xflags::SUBTREE_CONTAINS_INPUT_PATH_REF));
        }
    }

    #[test]
    fn test_mixed_aggregate_rejected() {
        assert!(matches!(parse_err(&["v+sum[v]"]), Error::MixedAggregate));
    }

    #[test]
    fn test_aggregate_nesting_rejected() {
        assert!(matches!(
            parse_err(&["sum[max[v]]"]),
            Error::AggregateNesting
        ));
    }

    #[test]
    fn test_aggregate_with_literal_ok() {
        let spec = parse(&["x:1+sum[v]"]);
        assert!(spec.is_flag_set(qflags::AGGREGATES_EXIST));
    }

    #[test]
    fn test_join_without_joined_paths_rejected() {
        assert!(matches!(
            parse_err(&["a", "join[f.csv]", "where[a>1]"]),
            Error::JoinRequiresJoinedPaths
        ));
    }

    #[test]
    fn test_option_form_equals_bracket_form() {
        let spec = parse(&["a", "--outheader=false"]);
        assert!(!spec.output.header);
        let spec = parse(&["a", "outheader[false]"]);
        assert!(!spec.output.header);
    }

    #[test]
    fn test_min_by_arity() {
        let spec = parse(&["m:min[v]", "n:min(a,b)"]);
        let ids = spec.columns.ordered();
        let one = spec.columns.col(ids[0]).expr;
        assert_eq!(spec.arena.node(one).opcode(), Opcode::MinAggr);
        let two = spec.columns.col(ids[1]).expr;
        assert_eq!(spec.arena.node(two).opcode(), Opcode::Min);
    }

    #[test]
    fn test_split_path_spec_with_braces() {
        assert_eq!(split_path_spec("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_path_spec("{a.b}.c"), vec!["{a.b}", "c"]);
        assert_eq!(split_path_spec("*.x"), vec!["*", "x"]);
    }

    #[test]
    fn test_pivot_binding_names() {
        let mut spec = QuerySpec::new();
        let binding = spec
            .parse_column_specs(&["x,y,...:pivot(k,n)".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(binding.names, vec!["x", "y", "..."]);
        assert!(spec.is_flag_set(qflags::HAS_PIVOT));
    }

    #[test]
    fn test_spread_name_outside_pivot_rejected() {
        assert!(matches!(
            parse_err(&["...:a"]),
            Error::SpreadOutsidePivot
        ));
    }
}
