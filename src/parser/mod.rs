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

//! Query parsing: tokenizer, operator catalog, expression tree, query spec

pub mod expr;
pub mod ops;
pub mod spec;
pub mod token;

pub use expr::{infer_types, xflags, ColumnId, ColumnRefTarget, ExprArena, ExprId, PathRefId};
pub use ops::{flags as opflags, AggrKind, OpDef, Opcode};
pub use spec::{
    cflags, prflags, qflags, split_path_spec, Column, Columns, InputSpec, JoinSpec, OutputSpec,
    PathRefArena, PathRefData, PivotBinding, QuerySpec,
};
pub use token::{Token, TokenKind, Tokenizer};
