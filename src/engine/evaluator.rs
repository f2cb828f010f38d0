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

//! Expression evaluation
//!
//! Recursive, bottom-up. Immediate operators are evaluated by the matcher at
//! the exact tag event and serve their cached value afterwards; aggregate
//! operators ingest during the main pass and yield their finalized result
//! during the stored-values pass. Numeric edge cases never fail: integer
//! division by zero yields 0, modulo by zero yields -1, real division by
//! zero yields NaN.

use crate::core::{format_timestamp, Value, ValueType};
use crate::parser::{
    opflags, xflags, ColumnRefTarget, Columns, ExprArena, ExprId, Opcode, PathRefArena,
};

use super::aggregate::RowAggregates;
use super::context::{Context, PassType};

/// Evaluator over one query's expression arena
pub struct Evaluator<'a> {
    pub arena: &'a mut ExprArena,
    pub columns: &'a Columns,
    pub paths: &'a PathRefArena,
    pub ctx: &'a Context,
    pub aggrs: Option<&'a mut RowAggregates>,
}

impl Evaluator<'_> {
    /// Evaluate an expression per row, returning its (converted) value
    pub fn evaluate(&mut self, id: ExprId) -> Value {
        let op = self.arena.node(id).op;
        if op.has_flag(opflags::IMMED_EVALUATE) {
            // already evaluated at the matching tag event
            return self.arena.node(id).value.clone();
        }

        let num_args = self.arena.num_args(id);
        for i in 0..num_args {
            let arg = self.arena.arg(id, i);
            self.evaluate(arg);
        }

        let arg_value = |s: &Self, n: usize| s.arena.node(s.arena.arg(id, n)).value.clone();
        let arg_ty = |s: &Self, n: usize| s.arena.node(s.arena.arg(id, n)).ty;

        use Opcode as Op;
        match op.opcode {
            Op::Literal => {}

            Op::PathRef => {
                if let Some(pr) = self.arena.node(id).path_ref {
                    let value = self.paths.get(pr).value.clone();
                    self.arena.set_value(id, value);
                }
            }

            Op::ColumnRef => match self.arena.node(id).column_ref.clone() {
                Some(ColumnRefTarget::Joined(col_idx)) => {
                    if self.ctx.empty_outer_join {
                        self.arena.node_mut(id).value = Value::Unknown;
                    } else if let Some(table) = &self.ctx.join_table {
                        let value = table
                            .get(self.ctx.join_row_idx)
                            .and_then(|row| row.get(col_idx))
                            .cloned()
                            .unwrap_or_default();
                        self.arena.set_value(id, value);
                    }
                }
                Some(ColumnRefTarget::Local(target)) => {
                    let target_expr = self.columns.col(target).expr;
                    // aggregate columns are recomputed on every stored row,
                    // so the cached value cannot be reused there
                    if self.ctx.pass_type == PassType::StoredValues
                        && self
                            .arena
                            .node(target_expr)
                            .has_flag(xflags::SUBTREE_CONTAINS_AGGREGATE)
                    {
                        self.evaluate(target_expr);
                    }
                    // the same reference can appear with different types
                    let value = self.arena.node(target_expr).value.clone();
                    self.arena.set_value(id, value);
                }
                _ => {}
            },

            Op::Type => {
                let name = arg_value(self, 0).value_type().query_name();
                self.arena.set_value(id, Value::Str(name.to_string()));
            }

            Op::Real | Op::Int | Op::Bool | Op::DateTime => {
                // the cast happened when the argument slot converted
                let value = arg_value(self, 0);
                self.arena.set_value(id, value);
            }

            Op::Str => {
                if num_args == 1 {
                    let value = arg_value(self, 0);
                    self.arena.set_value(id, value);
                } else {
                    let precision = arg_value(self, 1).as_int().max(0) as usize;
                    let text = arg_value(self, 0).render_with_precision(precision);
                    self.arena.set_value(id, Value::Str(text));
                }
            }

            Op::Not => {
                let value = !arg_value(self, 0).as_bool();
                self.arena.set_value(id, Value::Bool(value));
            }

            Op::Neg => {
                let value = match arg_value(self, 0) {
                    // pass-through, used to sort strings in reverse order
                    v @ (Value::Str(_) | Value::Unknown) => v,
                    Value::Int(v) => Value::Int(-v),
                    v => Value::Real(-v.as_real()),
                };
                self.arena.set_value(id, value);
            }

            Op::Abs => {
                let value = match arg_value(self, 0) {
                    Value::Int(v) => Value::Int(v.abs()),
                    v => Value::Real(v.as_real().abs()),
                };
                self.arena.set_value(id, value);
            }

            Op::Concat => {
                let mut text = arg_value(self, 0).render(true);
                text.push_str(&arg_value(self, 1).render(true));
                self.arena.set_value(id, Value::Str(text));
            }

            Op::Add | Op::Sub | Op::Mul => {
                let a = arg_value(self, 0);
                let b = arg_value(self, 1);
                let value = if arg_ty(self, 0) == ValueType::Integer {
                    let (x, y) = (a.as_int(), b.as_int());
                    Value::Int(match op.opcode {
                        Op::Add => x.wrapping_add(y),
                        Op::Sub => x.wrapping_sub(y),
                        _ => x.wrapping_mul(y),
                    })
                } else {
                    let (x, y) = (a.as_real(), b.as_real());
                    Value::Real(match op.opcode {
                        Op::Add => x + y,
                        Op::Sub => x - y,
                        _ => x * y,
                    })
                };
                self.arena.set_value(id, value);
            }

            Op::Div => {
                let a = arg_value(self, 0);
                let b = arg_value(self, 1);
                let value = if arg_ty(self, 0) == ValueType::Integer {
                    let y = b.as_int();
                    if y == 0 {
                        // no encoding for NaN in an integer slot
                        Value::Int(0)
                    } else {
                        Value::Int(a.as_int().wrapping_div(y))
                    }
                } else {
                    let y = b.as_real();
                    if y == 0.0 {
                        Value::Real(f64::NAN)
                    } else {
                        Value::Real(a.as_real() / y)
                    }
                };
                self.arena.set_value(id, value);
            }

            Op::Mod => {
                let y = arg_value(self, 1).as_int();
                let value = if y == 0 {
                    // committed to an integer representation; -1 stands in
                    Value::Int(-1)
                } else {
                    Value::Int(arg_value(self, 0).as_int().wrapping_rem(y))
                };
                self.arena.set_value(id, value);
            }

            Op::Or => {
                let value = arg_value(self, 0).as_bool() || arg_value(self, 1).as_bool();
                self.arena.set_value(id, Value::Bool(value));
            }

            Op::Xor => {
                let value = arg_value(self, 0).as_bool() ^ arg_value(self, 1).as_bool();
                self.arena.set_value(id, Value::Bool(value));
            }

            Op::And => {
                let value = arg_value(self, 0).as_bool() && arg_value(self, 1).as_bool();
                self.arena.set_value(id, Value::Bool(value));
            }

            Op::Min | Op::Max => {
                let a = arg_value(self, 0);
                let b = arg_value(self, 1);
                let take_a = match Value::compare(&a, &b) {
                    std::cmp::Ordering::Less | std::cmp::Ordering::Equal => {
                        op.opcode == Op::Min
                    }
                    std::cmp::Ordering::Greater => op.opcode == Op::Max,
                };
                self.arena.set_value(id, if take_a { a } else { b });
            }

            Op::If => {
                let value = if arg_value(self, 0).as_bool() {
                    arg_value(self, 1)
                } else {
                    arg_value(self, 2)
                };
                self.arena.set_value(id, value);
            }

            Op::Sqrt => {
                let value = arg_value(self, 0).as_real().sqrt();
                self.arena.set_value(id, Value::Real(value));
            }

            Op::Log => {
                let x = arg_value(self, 0).as_real();
                let value = if num_args == 1 {
                    x.ln()
                } else {
                    x.ln() / arg_value(self, 1).as_real().ln()
                };
                self.arena.set_value(id, Value::Real(value));
            }

            Op::Exp => {
                let value = arg_value(self, 0).as_real().exp();
                self.arena.set_value(id, Value::Real(value));
            }

            Op::Pow => {
                let value = arg_value(self, 0)
                    .as_real()
                    .powf(arg_value(self, 1).as_real());
                self.arena.set_value(id, Value::Real(value));
            }

            Op::Floor => {
                let value = match arg_value(self, 0) {
                    Value::Int(v) => v,
                    v => v.as_real().floor() as i64,
                };
                self.arena.set_value(id, Value::Int(value));
            }

            Op::Ceil => {
                let value = match arg_value(self, 0) {
                    Value::Int(v) => v,
                    v => v.as_real().ceil() as i64,
                };
                self.arena.set_value(id, Value::Int(value));
            }

            Op::Round => {
                let a = arg_value(self, 0);
                let places = if num_args > 1 {
                    arg_value(self, 1).as_int()
                } else {
                    0
                };
                let value = match a {
                    Value::Int(v) => Value::Int(v),
                    v => {
                        let x = v.as_real();
                        if x == 0.0 {
                            Value::Real(0.0)
                        } else if places == 0 {
                            // half away from zero
                            Value::Real(if x > 0.0 {
                                (x + 0.5).floor()
                            } else {
                                (x - 0.5).ceil()
                            })
                        } else {
                            let p = 10f64.powi(places as i32);
                            let adjusted = x + if x < 0.0 { -0.5 } else { 0.5 } / p;
                            Value::Real((adjusted * p).trunc() / p)
                        }
                    }
                };
                self.arena.set_value(id, value);
            }

            Op::Len => {
                let value = arg_value(self, 0).as_str().len() as i64;
                self.arena.set_value(id, Value::Int(value));
            }

            Op::Left => {
                let n = arg_value(self, 1).as_int();
                let value = if n <= 0 {
                    String::new()
                } else {
                    let s = arg_value(self, 0);
                    let s = s.as_str();
                    let take = (n as usize).min(s.len());
                    s[..char_boundary(s, take)].to_string()
                };
                self.arena.set_value(id, Value::Str(value));
            }

            Op::Right => {
                let n = arg_value(self, 1).as_int();
                let value = if n <= 0 {
                    String::new()
                } else {
                    let s = arg_value(self, 0);
                    let s = s.as_str();
                    let take = (n as usize).min(s.len());
                    s[char_boundary(s, s.len() - take)..].to_string()
                };
                self.arena.set_value(id, Value::Str(value));
            }

            Op::Lower => {
                let value = arg_value(self, 0).as_str().to_lowercase();
                self.arena.set_value(id, Value::Str(value));
            }

            Op::Upper => {
                let value = arg_value(self, 0).as_str().to_uppercase();
                self.arena.set_value(id, Value::Str(value));
            }

            Op::Contains => {
                let hay = arg_value(self, 0);
                let needle = arg_value(self, 1);
                let value = !needle.as_str().is_empty() && hay.as_str().contains(needle.as_str());
                self.arena.set_value(id, Value::Bool(value));
            }

            Op::Find => {
                let hay = arg_value(self, 0);
                let needle = arg_value(self, 1);
                let value = if needle.as_str().is_empty() {
                    -1
                } else {
                    hay.as_str()
                        .find(needle.as_str())
                        .map(|p| p as i64)
                        .unwrap_or(-1)
                };
                self.arena.set_value(id, Value::Int(value));
            }

            Op::FormatSec => {
                let text = format_timestamp(arg_value(self, 0).as_real(), false);
                self.arena.set_value(id, Value::Str(text));
            }

            Op::FormatMs => {
                let text = format_timestamp(arg_value(self, 0).as_real(), true);
                self.arena.set_value(id, Value::Str(text));
            }

            Op::Eq | Op::Ne | Op::Le | Op::Ge | Op::Lt | Op::Gt => {
                let ord = Value::compare(&arg_value(self, 0), &arg_value(self, 1));
                use std::cmp::Ordering;
                let value = match op.opcode {
                    Op::Eq => ord == Ordering::Equal,
                    Op::Ne => ord != Ordering::Equal,
                    Op::Le => ord != Ordering::Greater,
                    Op::Ge => ord != Ordering::Less,
                    Op::Lt => ord == Ordering::Less,
                    _ => ord == Ordering::Greater,
                };
                self.arena.set_value(id, Value::Bool(value));
            }

            Op::RowNum => {
                let value = self.ctx.num_rows_output as i64 + 1;
                self.arena.set_value(id, Value::Int(value));
            }

            Op::Any
            | Op::Sum
            | Op::MinAggr
            | Op::MaxAggr
            | Op::Avg
            | Op::Stdev
            | Op::Var
            | Op::Count
            | Op::Cov
            | Op::Corr => {
                let Some(aggr_idx) = self.arena.node(id).aggr_idx else {
                    return self.arena.node(id).value.clone();
                };
                match self.ctx.pass_type {
                    PassType::Main => {
                        let a0 = arg_value(self, 0);
                        let a0_ty = arg_ty(self, 0);
                        let a1_real = if num_args != 1 && op.opcode != Op::Any {
                            Some(arg_value(self, 1).as_real())
                        } else {
                            None
                        };
                        if let Some(aggrs) = self.aggrs.as_mut() {
                            let aggr = &mut aggrs[aggr_idx];
                            if op.opcode == Op::Any {
                                aggr.update_any(&a0);
                            } else if num_args == 1 {
                                let x = if a0_ty == ValueType::Integer {
                                    a0.as_int() as f64
                                } else {
                                    a0.as_real()
                                };
                                aggr.update(x);
                            } else {
                                let y = a1_real.unwrap();
                                aggr.update2(a0.as_real(), y);
                            }
                        }
                        self.arena.set_value(id, Value::Real(0.0));
                    }
                    PassType::StoredValues => {
                        let Some(kind) = op.aggr_kind() else {
                            return self.arena.node(id).value.clone();
                        };
                        let value = self
                            .aggrs
                            .as_ref()
                            .map(|aggrs| aggrs[aggr_idx].result(kind))
                            .unwrap_or_default();
                        self.arena.set_value(id, value);
                    }
                    _ => {}
                }
            }

            // identity operators
            Op::Where | Op::Sync => {
                let value = arg_value(self, 0);
                self.arena.set_value(id, value);
            }

            _ => {}
        }

        self.arena.node(id).value.clone()
    }

    /// Evaluate an immediate operator at a start- or end-tag event. These
    /// read the node stack, attribute stack, or line counter, not the row.
    pub fn immed_evaluate(&mut self, id: ExprId) {
        let op = self.arena.node(id).op;
        debug_assert!(op.has_flag(opflags::IMMED_EVALUATE));
        let num_args = self.arena.num_args(id);
        let arg1_value = if num_args >= 2 {
            self.arena.node(self.arena.arg(id, 1)).value.clone()
        } else {
            Value::Unknown
        };

        use Opcode as Op;
        match op.opcode {
            Op::Path
            | Op::PivotPath
            | Op::Depth
            | Op::NodeNum
            | Op::NodeName
            | Op::NodeStart
            | Op::NodeEnd => {
                // exclude the tags that made the match itself: path(bar.baz)
                // matched under <foo><bar><baz> refers to foo
                let curr_depth = self.ctx.node_stack.len() as i32;
                let relative_depth = self.ctx.relative_depth - 1;
                if curr_depth < relative_depth || curr_depth == 0 {
                    let empty = if self.arena.node(id).ty == ValueType::Integer {
                        Value::Int(0)
                    } else {
                        Value::Str(String::new())
                    };
                    self.arena.set_value(id, empty);
                    return;
                }
                let base_idx = (curr_depth - relative_depth).min(curr_depth - 1);

                match op.opcode {
                    Op::Path | Op::PivotPath => {
                        let mut text = String::new();
                        for i in 0..base_idx.max(0) {
                            if i > 0 {
                                text.push('.');
                            }
                            text.push_str(&self.ctx.node_stack[i as usize].name);
                        }
                        self.arena.set_value(id, Value::Str(text));
                    }
                    Op::Depth => {
                        self.arena.set_value(id, Value::Int(base_idx.max(0) as i64));
                    }
                    Op::NodeNum => {
                        let idx = if num_args == 1 {
                            base_idx
                        } else if self.arena.node(self.arena.arg(id, 1)).ty
                            == ValueType::Integer
                        {
                            // direct indexing of an ancestor
                            base_idx - arg1_value.as_int() as i32
                        } else {
                            // look the ancestor up by name, walking backward
                            let name = arg1_value.render(true);
                            let mut found = -1;
                            for i in (0..=base_idx.max(0)).rev() {
                                if (i as usize) < self.ctx.node_stack.len()
                                    && self
                                        .ctx
                                        .names_equal(&self.ctx.node_stack[i as usize].name, &name)
                                {
                                    found = i;
                                    break;
                                }
                            }
                            found
                        };
                        let result = if idx >= 0 && idx <= base_idx {
                            self.ctx
                                .node_stack
                                .get(idx as usize)
                                .map(|n| n.node_start)
                                .unwrap_or(0)
                        } else {
                            0
                        };
                        self.arena.set_value(id, Value::Int(result as i64));
                    }
                    Op::NodeName => {
                        let idx = if num_args == 1 {
                            base_idx
                        } else {
                            base_idx - arg1_value.as_int() as i32
                        };
                        let name = if idx >= 0 && idx <= base_idx {
                            self.ctx
                                .node_stack
                                .get(idx as usize)
                                .map(|n| n.name.clone())
                                .unwrap_or_default()
                        } else {
                            String::new()
                        };
                        self.arena.set_value(id, Value::Str(name));
                    }
                    Op::NodeStart => {
                        let result = self
                            .ctx
                            .node_stack
                            .get(base_idx.max(0) as usize)
                            .map(|n| n.node_start)
                            .unwrap_or(0);
                        self.arena.set_value(id, Value::Int(result as i64));
                    }
                    Op::NodeEnd => {
                        self.arena
                            .set_value(id, Value::Int(self.ctx.num_nodes as i64));
                    }
                    _ => {}
                }
            }

            Op::Attr => {
                let name = arg1_value.render(true);
                let mut found = None;
                for (attr_name, attr_value) in self.ctx.attr_stack.iter().rev() {
                    if self.ctx.names_equal(attr_name, &name) && !attr_value.is_empty() {
                        found = Some(attr_value.clone());
                        break;
                    }
                }
                self.arena
                    .set_value(id, Value::Str(found.unwrap_or_default()));
            }

            Op::LineNum => {
                self.arena
                    .set_value(id, Value::Int(self.ctx.num_lines as i64));
            }

            // registered for its end-match trigger; nothing to compute
            Op::Sync => {}

            _ => {}
        }
    }
}

/// Largest byte index `<= at` that falls on a char boundary
fn char_boundary(s: &str, at: usize) -> usize {
    let mut at = at.min(s.len());
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::CancelToken;
    use crate::parser::QuerySpec;

    fn eval_one(expr_text: &str) -> Value {
        let mut spec = QuerySpec::new();
        spec.parse_column_specs(&[format!("result:{}", expr_text)])
            .unwrap();
        let col = spec.columns.ordered()[0];
        let root = spec.columns.col(col).expr;
        let ctx = Context::new(CancelToken::new());
        let mut evaluator = Evaluator {
            arena: &mut spec.arena,
            columns: &spec.columns,
            paths: &spec.input_paths,
            ctx: &ctx,
            aggrs: None,
        };
        evaluator.evaluate(root)
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_one("1+2*3"), Value::Real(7.0));
        assert_eq!(eval_one("2*3+1"), Value::Real(7.0));
        assert_eq!(eval_one("10-2-3"), Value::Real(5.0));
    }

    #[test]
    fn test_integer_division() {
        assert_eq!(eval_one("int[10]/int[4]"), Value::Int(2));
        assert_eq!(eval_one("10/4"), Value::Real(2.5));
    }

    #[test]
    fn test_division_by_zero_fallbacks() {
        assert_eq!(eval_one("int[1]/int[0]"), Value::Int(0));
        assert_eq!(eval_one("int[1]%int[0]"), Value::Int(-1));
        let nan = eval_one("1/0");
        assert!(matches!(nan, Value::Real(v) if v.is_nan()));
    }

    #[test]
    fn test_string_operators() {
        assert_eq!(eval_one("len[\"hello\"]"), Value::Int(5));
        assert_eq!(
            eval_one("upper[\"hi\"] & lower[\"LO\"]"),
            Value::Str("HIlo".into())
        );
        assert_eq!(eval_one("left(\"hello\",2)"), Value::Str("he".into()));
        assert_eq!(eval_one("right(\"hello\",3)"), Value::Str("llo".into()));
        // clamped to [0, len]
        assert_eq!(eval_one("left(\"ab\",9)"), Value::Str("ab".into()));
        assert_eq!(eval_one("right(\"ab\",0)"), Value::Str("".into()));
        assert_eq!(eval_one("contains(\"hello\",\"ell\")"), Value::Bool(true));
        assert_eq!(eval_one("contains(\"hello\",\"\")"), Value::Bool(false));
        assert_eq!(eval_one("find(\"hello\",\"lo\")"), Value::Int(3));
        assert_eq!(eval_one("find(\"hello\",\"xy\")"), Value::Int(-1));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval_one("1<2"), Value::Bool(true));
        assert_eq!(eval_one("\"a\"==\"a\""), Value::Bool(true));
        assert_eq!(eval_one("true && false"), Value::Bool(false));
        assert_eq!(eval_one("true || false"), Value::Bool(true));
        assert_eq!(eval_one("true ^ true"), Value::Bool(false));
        assert_eq!(eval_one("!true"), Value::Bool(false));
    }

    #[test]
    fn test_if_selects_by_condition() {
        assert_eq!(eval_one("if(1<2,10,20)"), Value::Real(10.0));
        assert_eq!(eval_one("if(1>2,10,20)"), Value::Real(20.0));
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(eval_one("round[2.5]"), Value::Real(3.0));
        assert_eq!(eval_one("round[0-2.5]"), Value::Real(-3.0));
        assert_eq!(eval_one("round(2.346,2)"), Value::Real(2.35));
        assert_eq!(eval_one("floor[2.7]"), Value::Int(2));
        assert_eq!(eval_one("ceil[2.1]"), Value::Int(3));
    }

    #[test]
    fn test_casts_and_type() {
        assert_eq!(eval_one("int[\"42\"]"), Value::Int(42));
        assert_eq!(eval_one("real[\"2.5\"]"), Value::Real(2.5));
        assert_eq!(eval_one("bool[\"yes\"]"), Value::Bool(true));
        assert_eq!(eval_one("type[1]"), Value::Str("real".into()));
        assert_eq!(eval_one("type[int[1]]"), Value::Str("int".into()));
        assert_eq!(eval_one("type[\"x\"]"), Value::Str("str".into()));
    }

    #[test]
    fn test_min_max_binary() {
        assert_eq!(eval_one("min(3,5)"), Value::Real(3.0));
        assert_eq!(eval_one("max(3,5)"), Value::Real(5.0));
        assert_eq!(eval_one("min(\"b\",\"a\")"), Value::Str("a".into()));
    }

    #[test]
    fn test_path_ref_reads_bound_value() {
        let mut spec = QuerySpec::new();
        spec.parse_column_specs(&["v:a+0".to_string()]).unwrap();
        // bind the path value the matcher would have produced
        for id in spec.input_paths.ids() {
            spec.input_paths.get_mut(id).value = Value::Str("41".into());
        }
        let col = spec.columns.ordered()[0];
        let root = spec.columns.col(col).expr;
        let ctx = Context::new(CancelToken::new());
        let mut evaluator = Evaluator {
            arena: &mut spec.arena,
            columns: &spec.columns,
            paths: &spec.input_paths,
            ctx: &ctx,
            aggrs: None,
        };
        assert_eq!(evaluator.evaluate(root), Value::Real(41.0));
    }

    #[test]
    fn test_aggregate_main_then_stored() {
        let mut spec = QuerySpec::new();
        spec.parse_column_specs(&["s:sum[v]".to_string()]).unwrap();
        let col = spec.columns.ordered()[0];
        let root = spec.columns.col(col).expr;
        let mut aggrs: RowAggregates = vec![Default::default(); spec.aggr_count];

        let mut ctx = Context::new(CancelToken::new());
        ctx.pass_type = PassType::Main;
        for v in ["1", "3", "4"] {
            for id in spec.input_paths.ids() {
                spec.input_paths.get_mut(id).value = Value::Str(v.into());
            }
            let mut evaluator = Evaluator {
                arena: &mut spec.arena,
                columns: &spec.columns,
                paths: &spec.input_paths,
                ctx: &ctx,
                aggrs: Some(&mut aggrs),
            };
            assert_eq!(evaluator.evaluate(root), Value::Real(0.0));
        }

        ctx.pass_type = PassType::StoredValues;
        let mut evaluator = Evaluator {
            arena: &mut spec.arena,
            columns: &spec.columns,
            paths: &spec.input_paths,
            ctx: &ctx,
            aggrs: Some(&mut aggrs),
        };
        assert_eq!(evaluator.evaluate(root), Value::Real(8.0));
    }
}
