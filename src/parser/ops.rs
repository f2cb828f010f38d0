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

//! Operator catalog
//!
//! A fixed table maps operator names to opcode, arity, nominal result type,
//! and behavior flags. Name resolution is case-insensitive; `min`/`max`
//! resolve their aggregate variants by arity at parse time.

use crate::core::{Error, Result, ValueType};

/// Behavior flags carried by catalog entries
pub mod flags {
    /// Requires a preliminary input pass
    pub const GATHER_DATA: u32 = 0x1;
    /// One-pass accumulator; finalized in the stored-values pass
    pub const AGGREGATE: u32 = 0x2;
    /// Re-evaluated when the referenced path matches its start tag
    pub const START_MATCH_EVAL: u32 = 0x4;
    /// Re-evaluated when the referenced path matches its end tag
    pub const END_MATCH_EVAL: u32 = 0x8;
    pub const IMMED_EVALUATE: u32 = START_MATCH_EVAL | END_MATCH_EVAL;
    /// May appear at most once across the column list
    pub const ONCE_ONLY: u32 = 0x10;
    /// Must sit at the root of its column expression
    pub const TOP_LEVEL_ONLY: u32 = 0x20;
    /// Parsed as a binary infix operator
    pub const BINARY_INFIX: u32 = 0x80;
    /// A query directive rather than a value producer (implies NO_DATA)
    pub const DIRECTIVE: u32 = 0x100;
    /// Path arguments need no character data
    pub const NO_DATA: u32 = 0x200;
    /// First argument is read as an unquoted string
    pub const UNQUOTED_FIRST_ARG: u32 = 0x400;
    /// Second argument is read as an unquoted string
    pub const UNQUOTED_SECOND_ARG: u32 = 0x800;
}

/// Opcodes.
///
/// The infix opcodes `Mul` through `Gt` appear in decreasing precedence
/// order, so `lhs <= rhs` expresses "lhs binds at least as tight".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Opcode {
    ColumnRef,
    PathRef,
    Literal,
    Neg,
    Not,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Concat,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Or,
    Xor,
    And,
    Min,
    Max,
    Sqrt,
    Pow,
    Log,
    Exp,
    Abs,
    Round,
    Floor,
    Ceil,
    Len,
    Contains,
    Find,
    Left,
    Right,
    Upper,
    Lower,
    FormatSec,
    FormatMs,
    RowNum,
    If,
    Real,
    Int,
    Bool,
    Str,
    DateTime,
    Type,
    Path,
    PivotPath,
    Depth,
    Attr,
    NodeNum,
    NodeName,
    NodeStart,
    NodeEnd,
    LineNum,
    Any,
    Sum,
    MinAggr,
    MaxAggr,
    Avg,
    Stdev,
    Var,
    Cov,
    Corr,
    Count,
    First,
    Top,
    Sort,
    Pivot,
    Distinct,
    Where,
    Sync,
    Root,
    In,
    Join,
    Case,
    InputHeader,
    JoinHeader,
    OutputHeader,
    Help,
}

/// Kinds of aggregate accumulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggrKind {
    Any,
    Count,
    Min,
    Max,
    Sum,
    Avg,
    Stdev,
    Var,
    Cov,
    Corr,
}

/// Unbounded maximum arity
pub const ARITY_MAX: usize = usize::MAX;

/// One catalog entry
#[derive(Debug, Clone, Copy)]
pub struct OpDef {
    pub name: &'static str,
    pub opcode: Opcode,
    pub min_args: usize,
    pub max_args: usize,
    pub result: ValueType,
    pub flags: u32,
}

impl OpDef {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn is_directive(&self) -> bool {
        self.has_flag(flags::DIRECTIVE)
    }

    pub fn is_aggregate(&self) -> bool {
        self.has_flag(flags::AGGREGATE)
    }

    /// The accumulation kind of an aggregate opcode
    pub fn aggr_kind(&self) -> Option<AggrKind> {
        match self.opcode {
            Opcode::Any => Some(AggrKind::Any),
            Opcode::Sum => Some(AggrKind::Sum),
            Opcode::Avg => Some(AggrKind::Avg),
            Opcode::MinAggr => Some(AggrKind::Min),
            Opcode::MaxAggr => Some(AggrKind::Max),
            Opcode::Var => Some(AggrKind::Var),
            Opcode::Cov => Some(AggrKind::Cov),
            Opcode::Corr => Some(AggrKind::Corr),
            Opcode::Stdev => Some(AggrKind::Stdev),
            Opcode::Count => Some(AggrKind::Count),
            _ => None,
        }
    }
}

use flags::*;
use Opcode as Op;
use ValueType as T;

macro_rules! op {
    ($name:literal, $opcode:expr, $min:expr, $max:expr, $ty:expr) => {
        OpDef {
            name: $name,
            opcode: $opcode,
            min_args: $min,
            max_args: $max,
            result: $ty,
            flags: 0,
        }
    };
    ($name:literal, $opcode:expr, $min:expr, $max:expr, $ty:expr, $flags:expr) => {
        OpDef {
            name: $name,
            opcode: $opcode,
            min_args: $min,
            max_args: $max,
            result: $ty,
            flags: $flags,
        }
    };
}

/// The fixed operator table. Directive entries imply NO_DATA (see `lookup`).
#[rustfmt::skip]
static CATALOG: &[OpDef] = &[
    op!("<columnref>", Op::ColumnRef, 0, 0, T::Unknown),
    op!("<pathref>",   Op::PathRef,   0, 0, T::Unknown),
    op!("<literal>",   Op::Literal,   0, 0, T::Unknown),
    op!("case",        Op::Case,      0, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("help",        Op::Help,      0, 0, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("usage",       Op::Help,      0, 0, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("in",          Op::In,        1, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY | UNQUOTED_FIRST_ARG),
    op!("inheader",    Op::InputHeader, 0, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("outheader",   Op::OutputHeader, 0, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("header",      Op::OutputHeader, 0, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("join",        Op::Join,      1, 2, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY | UNQUOTED_FIRST_ARG),
    op!("joinheader",  Op::JoinHeader, 0, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("pivot",       Op::Pivot,     2, 3, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("..",          Op::Attr,      2, 2, T::String,  NO_DATA | START_MATCH_EVAL | BINARY_INFIX),
    op!("rownum",      Op::RowNum,    0, 0, T::Integer),
    op!("linenum",     Op::LineNum,   1, 1, T::Integer, NO_DATA | START_MATCH_EVAL),
    op!("depth",       Op::Depth,     1, 1, T::Integer, NO_DATA | START_MATCH_EVAL),
    op!("sync",        Op::Sync,      1, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY | END_MATCH_EVAL),
    op!("root",        Op::Root,      1, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY | UNQUOTED_FIRST_ARG),
    op!("path",        Op::Path,      1, 1, T::String,  NO_DATA | START_MATCH_EVAL),
    op!("pivotpath",   Op::PivotPath, 1, 1, T::String,  NO_DATA | START_MATCH_EVAL | TOP_LEVEL_ONLY | ONCE_ONLY),
    op!("nodenum",     Op::NodeNum,   1, 2, T::Integer, NO_DATA | START_MATCH_EVAL | UNQUOTED_SECOND_ARG),
    op!("nodename",    Op::NodeName,  1, 2, T::String,  NO_DATA | START_MATCH_EVAL),
    op!("nodestart",   Op::NodeStart, 1, 1, T::Integer, NO_DATA | START_MATCH_EVAL | UNQUOTED_SECOND_ARG),
    op!("nodeend",     Op::NodeEnd,   1, 1, T::Integer, NO_DATA | END_MATCH_EVAL | UNQUOTED_SECOND_ARG),
    op!("where",       Op::Where,     1, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE),
    op!("first",       Op::First,     1, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("top",         Op::Top,       1, 1, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("sort",        Op::Sort,      1, ARITY_MAX, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("distinct",    Op::Distinct,  0, 0, T::Unknown, TOP_LEVEL_ONLY | DIRECTIVE | ONCE_ONLY),
    op!("not",         Op::Not,       1, 1, T::Boolean),
    op!("!",           Op::Not,       1, 1, T::Boolean),
    op!("*",           Op::Mul,       2, 2, T::Real, BINARY_INFIX),
    op!("/",           Op::Div,       2, 2, T::Real, BINARY_INFIX),
    op!("%",           Op::Mod,       2, 2, T::Integer, BINARY_INFIX),
    op!("+",           Op::Add,       2, 2, T::Real, BINARY_INFIX),
    op!("-",           Op::Sub,       2, 2, T::Real, BINARY_INFIX),
    op!("neg",         Op::Neg,       1, 1, T::Real),
    op!("eq",          Op::Eq,        2, 2, T::Boolean),
    op!("==",          Op::Eq,        2, 2, T::Boolean, BINARY_INFIX),
    op!("ne",          Op::Ne,        2, 2, T::Boolean),
    op!("!=",          Op::Ne,        2, 2, T::Boolean, BINARY_INFIX),
    op!("le",          Op::Le,        2, 2, T::Boolean),
    op!("<=",          Op::Le,        2, 2, T::Boolean, BINARY_INFIX),
    op!("ge",          Op::Ge,        2, 2, T::Boolean),
    op!(">=",          Op::Ge,        2, 2, T::Boolean, BINARY_INFIX),
    op!("lt",          Op::Lt,        2, 2, T::Boolean),
    op!("<",           Op::Lt,        2, 2, T::Boolean, BINARY_INFIX),
    op!("gt",          Op::Gt,        2, 2, T::Boolean),
    op!(">",           Op::Gt,        2, 2, T::Boolean, BINARY_INFIX),
    op!("and",         Op::And,       2, 2, T::Boolean),
    op!("&&",          Op::And,       2, 2, T::Boolean, BINARY_INFIX),
    op!("or",          Op::Or,        2, 2, T::Boolean),
    op!("||",          Op::Or,        2, 2, T::Boolean, BINARY_INFIX),
    op!("xor",         Op::Xor,       2, 2, T::Boolean),
    op!("^",           Op::Xor,       2, 2, T::Boolean, BINARY_INFIX),
    op!("if",          Op::If,        3, 3, T::Real), // retyped as needed
    op!("abs",         Op::Abs,       1, 1, T::Real),
    op!("floor",       Op::Floor,     1, 1, T::Real),
    op!("ceil",        Op::Ceil,      1, 1, T::Real),
    op!("round",       Op::Round,     1, 2, T::Real),
    op!("min",         Op::Min,       2, 2, T::Real), // one argument resolves MinAggr
    op!("max",         Op::Max,       2, 2, T::Real),
    op!("sqrt",        Op::Sqrt,      1, 1, T::Real),
    op!("pow",         Op::Pow,       2, 2, T::Real),
    op!("log",         Op::Log,       1, 2, T::Real), // default base e
    op!("exp",         Op::Exp,       1, 1, T::Real),
    op!("&",           Op::Concat,    2, 2, T::String, BINARY_INFIX),
    op!("concat",      Op::Concat,    2, 2, T::String),
    op!("len",         Op::Len,       1, 1, T::Integer),
    op!("left",        Op::Left,      2, 2, T::String),
    op!("right",       Op::Right,     2, 2, T::String),
    op!("lower",       Op::Lower,     1, 1, T::String),
    op!("upper",       Op::Upper,     1, 1, T::String),
    op!("contains",    Op::Contains,  2, 2, T::Boolean),
    op!("find",        Op::Find,      2, 2, T::Integer),
    op!("formatsec",   Op::FormatSec, 1, 1, T::String),
    op!("formatms",    Op::FormatMs,  1, 1, T::String),
    op!("type",        Op::Type,      1, 1, T::String),
    op!("real",        Op::Real,      1, 1, T::Real),
    op!("int",         Op::Int,       1, 1, T::Integer),
    op!("bool",        Op::Bool,      1, 1, T::Boolean),
    op!("str",         Op::Str,       1, 2, T::String),
    op!("datetime",    Op::DateTime,  1, 1, T::DateTime),
    op!("any",         Op::Any,       1, 1, T::String,  AGGREGATE),
    op!("sum",         Op::Sum,       1, 1, T::Real,    AGGREGATE),
    op!("avg",         Op::Avg,       1, 1, T::Real,    AGGREGATE),
    // arity resolves the min/max collision: the one-argument forms become
    // these aggregate variants (name lookup finds the two-argument entries)
    op!("min",         Op::MinAggr,   1, 1, T::Real,    AGGREGATE),
    op!("max",         Op::MaxAggr,   1, 1, T::Real,    AGGREGATE),
    op!("var",         Op::Var,       1, 1, T::Real,    AGGREGATE),
    op!("cov",         Op::Cov,       2, 2, T::Real,    AGGREGATE),
    op!("corr",        Op::Corr,      2, 2, T::Real,    AGGREGATE),
    op!("stdev",       Op::Stdev,     1, 1, T::Real,    AGGREGATE),
    op!("count",       Op::Count,     1, 1, T::Integer, NO_DATA | AGGREGATE),
];

fn with_implied_flags(mut def: OpDef) -> OpDef {
    if def.flags & DIRECTIVE != 0 {
        def.flags |= NO_DATA;
    }
    def
}

/// Look up a catalog entry by name (case-insensitive)
pub fn lookup(name: &str) -> Result<OpDef> {
    for def in CATALOG {
        if def.name.eq_ignore_ascii_case(name) {
            return Ok(with_implied_flags(*def));
        }
    }
    Err(Error::UnknownFunction(name.to_string()))
}

/// Look up a catalog entry by opcode
pub fn lookup_opcode(opcode: Opcode) -> OpDef {
    for def in CATALOG {
        if def.opcode == opcode {
            return with_implied_flags(*def);
        }
    }
    unreachable!("opcode missing from catalog")
}
