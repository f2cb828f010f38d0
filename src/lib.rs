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

//! # Treeq - streaming query engine over hierarchical records
//!
//! Treeq evaluates a column-oriented query, given as command-line
//! arguments, against semi-structured input in one pass. It auto-detects
//! the input dialect — a tag tree, a nested object/array document, a
//! delimited table, or timestamped log lines — normalizes everything to a
//! common tag event stream, and projects, filters, aggregates, sorts,
//! pivots, and joins over it. Output is CSV.
//!
//! ## Quick start
//!
//! ```rust
//! use treeq::driver::run_to_string;
//!
//! let input = "category,sales\nA,10\nB,20\nA,30\n";
//! let out = run_to_string(&["category", "sum[sales]"], input).unwrap();
//! assert_eq!(out, "category,sum[sales]\nA,40\nB,20\n");
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Values, the type ladder, date-times, rows, errors
//! - [`parser`] - Query tokenizer, operator catalog, expressions, planning
//! - [`engine`] - Matcher, evaluator, aggregates, pivoter, row pipeline
//! - [`input`] - Dialect probe and the four input adapters
//! - [`output`] - CSV row writer
//! - [`driver`] - Argument expansion, join assembly, pass sequencing

pub mod core;
pub mod driver;
pub mod engine;
pub mod input;
pub mod output;
pub mod parser;

// Re-export main types for convenience
pub use crate::core::{Error, PackedDateTime, Result, Row, Value, ValueType};
pub use crate::driver::{run_to_string, Driver};
pub use crate::engine::{CancelToken, PassType, QueryEngine};
pub use crate::input::Dialect;
pub use crate::parser::{Opcode, QuerySpec};
