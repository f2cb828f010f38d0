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

//! Scalar type ladder
//!
//! The ladder orders the scalar kinds so that later kinds are convertible to
//! earlier kinds. Cross-type comparison orders by ladder position, and
//! operand unification takes the lesser of two kinds.

use std::fmt;

/// Scalar kinds in ladder order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ValueType {
    /// UTF-8 text
    String = 0,
    /// 64-bit floating point
    Real = 1,
    /// 64-bit signed integer
    Integer = 2,
    /// Packed calendar date-time
    DateTime = 3,
    /// Boolean true/false
    Boolean = 4,
    /// Untyped; renders as text
    #[default]
    Unknown = 5,
}

impl ValueType {
    /// Unify two kinds by taking the lesser ladder position
    pub fn constrain(a: ValueType, b: ValueType) -> ValueType {
        a.min(b)
    }

    /// The short name reported by the `type` operator
    pub fn query_name(&self) -> &'static str {
        match self {
            ValueType::Real => "real",
            ValueType::Integer => "int",
            ValueType::Boolean => "bool",
            ValueType::DateTime => "datetime",
            // untyped values render as text, so report them as such
            ValueType::String | ValueType::Unknown => "str",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "String",
            ValueType::Real => "Real",
            ValueType::Integer => "Integer",
            ValueType::DateTime => "DateTime",
            ValueType::Boolean => "Boolean",
            ValueType::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}
