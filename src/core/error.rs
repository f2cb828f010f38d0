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

//! Error types for treeq
//!
//! Every user-reachable failure surfaces as one of these variants. Runtime
//! numeric cases (divide by zero, malformed datetimes) are not errors; they
//! yield well-defined fallback values instead.

use thiserror::Error;

/// Result type alias for treeq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for query parsing and execution
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Argument / expression parse errors
    // =========================================================================
    /// Operator name not found in the catalog
    #[error("unrecognized function: {0}")]
    UnknownFunction(String),

    /// Argument count outside the operator's arity
    #[error("wrong number of arguments for {0}")]
    WrongArity(String),

    /// Parser expected a different token
    #[error("expected {expected}, got \"{got}\"")]
    Expected { expected: String, got: String },

    /// Parser hit a token it cannot use here
    #[error("unexpected \"{0}\"")]
    Unexpected(String),

    /// A column argument with no expression
    #[error("missing expression")]
    MissingExpression,

    /// Unary plus has no meaning
    #[error("positive operator not supported; use abs()")]
    PositiveUnary,

    /// String literal ran off the end of the argument
    #[error("unterminated string literal")]
    UnterminatedString,

    /// Escape character at end of input
    #[error("dangling escape character")]
    DanglingEscape,

    /// Column name appears more than once
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    /// Comma-separated name list cut short
    #[error("expected a column name after comma")]
    MissingColumnName,

    /// `{...}` path segment never closed
    #[error("unbalanced braces: {0}")]
    UnbalancedBraces(String),

    /// Column reference chain loops back on itself
    #[error("circular column reference: {0}")]
    CircularColumnRef(String),

    /// Column reference to a name that never became a column
    #[error("unresolved column reference: {0}")]
    UnresolvedColumnRef(String),

    /// Name lists are a pivot-only feature
    #[error("multiple column names only valid for pivot function")]
    MultipleColumnNames,

    /// `...` outside a pivot name list
    #[error("column name spread (...) only valid for pivot function")]
    SpreadOutsidePivot,

    // =========================================================================
    // Structural / semantic errors
    // =========================================================================
    /// Directive used below the top of a column expression
    #[error("top-level expression only: {0}")]
    TopLevelOnly(String),

    /// Directive repeated across the column list
    #[error("expression can only be used once: {0}")]
    OnceOnly(String),

    /// Aggregate inside another aggregate
    #[error("aggregate functions cannot be composed")]
    AggregateNesting,

    /// Aggregate and non-aggregate path references in one expression
    #[error("columns can't be functions of both aggregates and non-aggregates")]
    MixedAggregate,

    /// Immediate operators apply to a path
    #[error("first argument of {0} must be a path reference")]
    FirstArgNotPath(String),

    /// Scope prefix does not name the input or join side
    #[error("unknown scope name: {0}")]
    UnknownScope(String),

    /// Joined path used without a join directive
    #[error("can't reference joined paths without a join directive")]
    JoinedPathWithoutJoin,

    /// A join needs at least one main-input path
    #[error("a join requires at least one input path reference")]
    JoinRequiresInputPaths,

    /// A join needs at least one joined path
    #[error("a join requires at least one joined path reference")]
    JoinRequiresJoinedPaths,

    /// Sorting needs input paths to sort over
    #[error("a sort requires at least one input path reference")]
    SortRequiresInputPaths,

    /// Distinct needs input paths to compare
    #[error("use of distinct requires at least one input path reference")]
    DistinctRequiresInputPaths,

    /// Join side produced no columns
    #[error("missing joined path references")]
    EmptyJoinColumns,

    // =========================================================================
    // Pivot errors
    // =========================================================================
    /// pivot() without a name list
    #[error("pivot function requires column names, which can include spread (...)")]
    PivotRequiresNames,

    /// Aggregates cannot feed the pivot
    #[error("pivot {0} argument must not contain aggregate functions")]
    PivotArgAggregate(&'static str),

    /// Joined paths cannot feed the pivot
    #[error("pivot {0} argument must not contain joined paths")]
    PivotArgJoined(&'static str),

    /// Literal pivot columns the input never produced
    #[error("pivot columns not found in input: {0}")]
    PivotColumnsNotFound(String),

    // =========================================================================
    // Input errors
    // =========================================================================
    /// The byte probe matched no dialect
    #[error("input not recognized as object, tag-tree, delimited, or log format")]
    DialectUnrecognized,

    /// A single tag overflowed the scan buffer
    #[error("either input is not a tag tree or a tag exceeds {0} characters")]
    TagTooLong(usize),

    /// Tag markup that cannot be scanned
    #[error("invalid tag: {0}")]
    MalformedTag(String),

    /// Input file could not be opened
    #[error("input file could not be opened: {0}")]
    InputOpen(String),

    /// @file could not be opened
    #[error("argument-inclusion filename could not be opened: {0}")]
    ArgFileOpen(String),

    /// @ with no filename attached
    #[error("missing argument-inclusion filename after @")]
    ArgFileMissing,

    /// Multi-pass queries re-read their input
    #[error("given query requires two passes, so stdin cannot be used as an input")]
    GatherNeedsFile,

    // =========================================================================
    // Post-pass errors
    // =========================================================================
    /// A declared path never matched anything
    #[error("path not matched in {side} input: {spec}")]
    PathNotMatched { spec: String, side: &'static str },

    /// I/O failure reading input or writing output
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
