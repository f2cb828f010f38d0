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

//! Core types: values, the type ladder, date-times, rows, and errors

pub mod datetime;
pub mod error;
pub mod row;
pub mod types;
pub mod value;

pub use datetime::{format_timestamp, PackedDateTime};
pub use error::{Error, Result};
pub use row::{hash_row_indices, hash_row_prefix, IndexedRows, Row};
pub use types::ValueType;
pub use value::{format_real, parse_boolean, parse_integer_prefix, parse_real_prefix, Value};
pub use value::DEFAULT_PRECISION;
