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

//! Expression tree
//!
//! Expressions live in an arena addressed by [`ExprId`]; path and column
//! references are indices into their owning arenas rather than shared
//! pointers. Each node carries a declared type and a cached value slot that
//! assignment converts into.

use smallvec::SmallVec;

use crate::core::{Value, ValueType};

use super::ops::{self, OpDef, Opcode};

/// Handle into an [`ExprArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Handle into a path-reference arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathRefId(pub u32);

/// Handle into the column slab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId(pub u32);

/// Subtree flags, set during post-processing
pub mod xflags {
    pub const VISITED: u32 = 0x1;
    pub const SUBTREE_CONTAINS_AGGREGATE: u32 = 0x2;
    pub const SUBTREE_CONTAINS_INPUT_PATH_REF: u32 = 0x4;
    pub const SUBTREE_CONTAINS_JOIN_PATH_REF: u32 = 0x8;
    pub const SUBTREE_CONTAINS_PATH_REF: u32 =
        SUBTREE_CONTAINS_INPUT_PATH_REF | SUBTREE_CONTAINS_JOIN_PATH_REF;
    /// Filter of the form `expr == joined-column`; drives the join index
    pub const JOIN_EQUALITY_WHERE: u32 = 0x10;
}

/// Resolution target of a column reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRefTarget {
    /// Recorded by name; resolved once all columns are parsed
    Unresolved(String),
    /// A column of this query
    Local(ColumnId),
    /// A column of the joined query, by position in the join row
    Joined(usize),
}

/// One expression node
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub op: OpDef,
    pub args: SmallVec<[ExprId; 2]>,
    /// Declared type; `set_value` converts into it
    pub ty: ValueType,
    /// Cached value slot
    pub value: Value,
    pub flags: u32,
    pub path_ref: Option<PathRefId>,
    /// Set when the path reference names the join side
    pub path_ref_joined: bool,
    pub column_ref: Option<ColumnRefTarget>,
    /// Accumulator slot for aggregate operators
    pub aggr_idx: Option<usize>,
}

impl ExprNode {
    fn new(op: OpDef) -> Self {
        ExprNode {
            ty: op.result,
            op,
            args: SmallVec::new(),
            value: Value::Unknown,
            flags: 0,
            path_ref: None,
            path_ref_joined: false,
            column_ref: None,
            aggr_idx: None,
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.op.opcode
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Arena of expression nodes
#[derive(Debug, Default, Clone)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node for the given operator
    pub fn alloc(&mut self, op: OpDef) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(ExprNode::new(op));
        id
    }

    /// Allocate a placeholder node; the parser fills in the operator
    pub fn alloc_empty(&mut self) -> ExprId {
        self.alloc(ops::lookup_opcode(Opcode::Literal))
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn arg(&self, id: ExprId, n: usize) -> ExprId {
        self.nodes[id.0 as usize].args[n]
    }

    pub fn num_args(&self, id: ExprId) -> usize {
        self.nodes[id.0 as usize].args.len()
    }

    /// Write a value into a node's slot, converting to its declared type
    pub fn set_value(&mut self, id: ExprId, value: Value) {
        let node = self.node_mut(id);
        node.value = if value.value_type() == node.ty {
            value
        } else {
            value.convert(node.ty)
        };
    }

    /// Write a value and adopt its type
    pub fn set_value_and_type(&mut self, id: ExprId, value: Value) {
        let node = self.node_mut(id);
        node.ty = value.value_type();
        node.value = value;
    }

    /// Change a node's declared type, converting its current value
    pub fn change_type(&mut self, id: ExprId, ty: ValueType) {
        let node = self.node_mut(id);
        if node.ty != ty {
            node.value = node.value.convert(ty);
            node.ty = ty;
        }
    }

    pub fn set_type(&mut self, id: ExprId, ty: ValueType) {
        self.node_mut(id).ty = ty;
    }

    /// Deep-copy the subtree rooted at `id` into `dst`. Path-reference ids
    /// carry over unchanged; the caller is responsible for ensuring the
    /// destination spec owns a compatible path arena.
    pub fn copy_subtree(&self, id: ExprId, dst: &mut ExprArena) -> ExprId {
        let mut node = self.node(id).clone();
        let args = std::mem::take(&mut node.args);
        let new_id = ExprId(dst.nodes.len() as u32);
        dst.nodes.push(node);
        let mut new_args = SmallVec::new();
        for arg in args {
            new_args.push(self.copy_subtree(arg, dst));
        }
        dst.nodes[new_id.0 as usize].args = new_args;
        new_id
    }

    /// Collect `id` and every node below it, depth-first
    pub fn subtree_ids(&self, id: ExprId, out: &mut Vec<ExprId>) {
        out.push(id);
        for i in 0..self.num_args(id) {
            self.subtree_ids(self.arg(id, i), out);
        }
    }
}

/// Bottom-up type inference.
///
/// Each opcode declares how it constrains its result and its arguments;
/// see the match arms for the exact rules.
pub fn infer_types(arena: &mut ExprArena, id: ExprId) {
    for i in 0..arena.num_args(id) {
        infer_types(arena, arena.arg(id, i));
    }

    let node = arena.node(id);
    let opcode = node.opcode();
    let num_args = node.args.len();
    let arg: Vec<ExprId> = (0..num_args).map(|i| arena.arg(id, i)).collect();

    use Opcode as Op;
    use ValueType as T;
    match opcode {
        Op::Real => {
            arena.set_type(id, T::Real);
            arena.change_type(arg[0], T::Real);
        }
        Op::Int => {
            arena.set_type(id, T::Integer);
            arena.change_type(arg[0], T::Integer);
        }
        Op::Bool => {
            arena.set_type(id, T::Boolean);
            arena.change_type(arg[0], T::Boolean);
        }
        Op::Str => {
            arena.set_type(id, T::String);
            if num_args == 1 {
                arena.change_type(arg[0], T::String);
            } else {
                // with an explicit precision the conversion happens at
                // evaluation time from the raw argument value
                arena.change_type(arg[1], T::Integer);
            }
        }
        Op::DateTime => {
            arena.set_type(id, T::DateTime);
            arena.change_type(arg[0], T::DateTime);
        }
        Op::Not => {
            arena.change_type(arg[0], T::Boolean);
        }
        Op::Neg => {
            // on strings this is a pass-through that only marks reverse
            // sort order
            let t = match arena.node(arg[0]).ty {
                T::String | T::Integer => arena.node(arg[0]).ty,
                _ => T::Real,
            };
            arena.set_type(id, t);
            arena.change_type(arg[0], t);
        }
        Op::Abs => {
            let t = if arena.node(arg[0]).ty == T::Integer {
                T::Integer
            } else {
                T::Real
            };
            arena.set_type(id, t);
            arena.change_type(arg[0], t);
        }
        Op::Concat => {
            arena.set_type(id, T::String);
            arena.change_type(arg[0], T::String);
            arena.change_type(arg[1], T::String);
        }
        Op::Add | Op::Sub | Op::Mul | Op::Div => {
            let t = if arena.node(arg[0]).ty == T::Integer && arena.node(arg[1]).ty == T::Integer {
                T::Integer
            } else {
                T::Real
            };
            arena.set_type(id, t);
            arena.change_type(arg[0], t);
            arena.change_type(arg[1], t);
        }
        Op::Mod => {
            arena.set_type(id, T::Integer);
            arena.change_type(arg[0], T::Integer);
            arena.change_type(arg[1], T::Integer);
        }
        Op::Or | Op::Xor | Op::And => {
            arena.set_type(id, T::Boolean);
            arena.change_type(arg[0], T::Boolean);
            arena.change_type(arg[1], T::Boolean);
        }
        Op::Min | Op::Max => {
            let t = T::constrain(arena.node(arg[0]).ty, arena.node(arg[1]).ty);
            arena.set_type(id, t);
            arena.change_type(arg[0], t);
            arena.change_type(arg[1], t);
        }
        Op::If => {
            let t = T::constrain(arena.node(arg[1]).ty, arena.node(arg[2]).ty);
            arena.set_type(id, t);
            arena.change_type(arg[0], T::Boolean);
            arena.change_type(arg[1], t);
            arena.change_type(arg[2], t);
        }
        Op::Sqrt | Op::Exp | Op::Log | Op::Pow => {
            arena.set_type(id, T::Real);
            for i in 0..num_args {
                arena.change_type(arg[i], T::Real);
            }
        }
        Op::Floor | Op::Ceil => {
            let t = T::constrain(arena.node(arg[0]).ty, T::Real);
            arena.set_type(id, T::Integer);
            arena.change_type(arg[0], t);
        }
        Op::Len => {
            arena.set_type(id, T::Integer);
            arena.change_type(arg[0], T::String);
        }
        Op::Left | Op::Right => {
            arena.set_type(id, T::String);
            arena.change_type(arg[0], T::String);
            arena.change_type(arg[1], T::Integer);
        }
        Op::Lower | Op::Upper => {
            arena.set_type(id, T::String);
            arena.change_type(arg[0], T::String);
        }
        Op::Contains => {
            arena.set_type(id, T::Boolean);
            arena.change_type(arg[0], T::String);
            arena.change_type(arg[1], T::String);
        }
        Op::Find => {
            arena.set_type(id, T::Integer);
            arena.change_type(arg[0], T::String);
            arena.change_type(arg[1], T::String);
        }
        Op::FormatSec | Op::FormatMs => {
            arena.change_type(arg[0], T::Real);
        }
        Op::Round => {
            let t = T::constrain(arena.node(arg[0]).ty, T::Real);
            arena.set_type(id, t);
            arena.change_type(arg[0], t);
            if num_args > 1 {
                arena.change_type(arg[1], T::Integer);
            }
        }
        Op::Eq | Op::Ne | Op::Le | Op::Ge | Op::Lt | Op::Gt => {
            // every kind is orderable, so unify at the lesser ladder rung
            let t = T::constrain(arena.node(arg[0]).ty, arena.node(arg[1]).ty);
            arena.set_type(id, T::Boolean);
            arena.change_type(arg[0], t);
            arena.change_type(arg[1], t);
        }
        Op::NodeNum => {
            // two flavors: numeric ancestor offset, or ancestor name lookup
            if num_args > 1 && arena.node(arg[1]).ty != T::String {
                arena.change_type(arg[1], T::Integer);
            }
        }
        Op::NodeName => {
            if num_args > 1 {
                arena.change_type(arg[1], T::Integer);
            }
        }
        Op::Sum | Op::MinAggr | Op::MaxAggr => {
            let t = if arena.node(arg[0]).ty == T::Integer {
                T::Integer
            } else {
                T::Real
            };
            arena.set_type(arg[0], t);
            arena.set_type(id, t);
        }
        Op::Avg | Op::Stdev | Op::Var | Op::Cov | Op::Corr => {
            for i in 0..num_args {
                arena.change_type(arg[i], T::Real);
            }
        }
        Op::Count => {} // argument type doesn't matter
        Op::First | Op::Top => {
            arena.change_type(arg[0], T::Integer);
        }
        Op::ColumnRef => {
            arena.set_type(id, T::String);
        }
        Op::Where | Op::Sync | Op::Any => {
            // identity: the expression takes on its argument's type
            let t = arena.node(arg[0]).ty;
            arena.set_type(id, t);
        }
        Op::Case | Op::InputHeader | Op::OutputHeader | Op::JoinHeader => {
            if num_args > 0 {
                arena.change_type(arg[0], T::Boolean);
            }
        }
        Op::In | Op::Join => {
            arena.change_type(arg[0], T::String);
        }
        Op::Root => {
            arena.change_type(arg[0], T::Integer);
        }
        Op::Pivot => {
            arena.change_type(arg[0], T::String);
            arena.change_type(arg[1], T::String);
            if num_args > 2 {
                arena.change_type(arg[2], T::Boolean);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ops::lookup_opcode;

    fn leaf(arena: &mut ExprArena, value: Value) -> ExprId {
        let id = arena.alloc(lookup_opcode(Opcode::Literal));
        arena.set_value_and_type(id, value);
        id
    }

    #[test]
    fn test_arithmetic_integer_promotion() {
        let mut arena = ExprArena::new();
        let a = leaf(&mut arena, Value::Int(2));
        let b = leaf(&mut arena, Value::Int(3));
        let add = arena.alloc(lookup_opcode(Opcode::Add));
        arena.node_mut(add).args.push(a);
        arena.node_mut(add).args.push(b);
        infer_types(&mut arena, add);
        assert_eq!(arena.node(add).ty, ValueType::Integer);

        let mut arena = ExprArena::new();
        let a = leaf(&mut arena, Value::Int(2));
        let b = leaf(&mut arena, Value::Real(3.5));
        let add = arena.alloc(lookup_opcode(Opcode::Add));
        arena.node_mut(add).args.push(a);
        arena.node_mut(add).args.push(b);
        infer_types(&mut arena, add);
        assert_eq!(arena.node(add).ty, ValueType::Real);
        assert_eq!(arena.node(a).ty, ValueType::Real);
    }

    #[test]
    fn test_comparison_constrains_to_ladder_min() {
        let mut arena = ExprArena::new();
        let a = leaf(&mut arena, Value::Str("x".into()));
        let b = leaf(&mut arena, Value::Real(1.0));
        let cmp = arena.alloc(lookup_opcode(Opcode::Lt));
        arena.node_mut(cmp).args.push(a);
        arena.node_mut(cmp).args.push(b);
        infer_types(&mut arena, cmp);
        assert_eq!(arena.node(cmp).ty, ValueType::Boolean);
        assert_eq!(arena.node(a).ty, ValueType::String);
        assert_eq!(arena.node(b).ty, ValueType::String);
    }

    #[test]
    fn test_neg_passes_strings_through() {
        let mut arena = ExprArena::new();
        let a = leaf(&mut arena, Value::Str("x".into()));
        let neg = arena.alloc(lookup_opcode(Opcode::Neg));
        arena.node_mut(neg).args.push(a);
        infer_types(&mut arena, neg);
        assert_eq!(arena.node(neg).ty, ValueType::String);
    }

    #[test]
    fn test_set_value_converts_to_slot_type() {
        let mut arena = ExprArena::new();
        let id = arena.alloc(lookup_opcode(Opcode::Literal));
        arena.set_type(id, ValueType::Integer);
        arena.set_value(id, Value::Str("42".into()));
        assert_eq!(arena.node(id).value, Value::Int(42));
    }

    #[test]
    fn test_copy_subtree() {
        let mut arena = ExprArena::new();
        let a = leaf(&mut arena, Value::Int(1));
        let b = leaf(&mut arena, Value::Int(2));
        let add = arena.alloc(lookup_opcode(Opcode::Add));
        arena.node_mut(add).args.push(a);
        arena.node_mut(add).args.push(b);

        let mut dst = ExprArena::new();
        let copied = arena.copy_subtree(add, &mut dst);
        assert_eq!(dst.num_args(copied), 2);
        assert_eq!(dst.node(dst.arg(copied, 0)).value, Value::Int(1));
    }
}
