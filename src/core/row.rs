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

//! Row representation
//!
//! A row is a flat ordered vector of values. Output and aggregate columns
//! occupy the leading slots; sort keys, when present, occupy the tail.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHasher};

use super::value::Value;

/// One result row
pub type Row = Vec<Value>;

/// Join index: row-key hash to the bucket of joined rows sharing it.
/// Hash collisions are tolerated; equality filters re-check joined values.
pub type IndexedRows = FxHashMap<u64, Rc<Vec<Row>>>;

/// Hash the row values at the given slot positions
pub fn hash_row_indices(row: &Row, indices: &[usize]) -> u64 {
    let mut seed: u64 = 0;
    for &i in indices {
        let mut hasher = FxHasher::default();
        row[i].hash(&mut hasher);
        let h = hasher.finish();
        seed ^= h
            .wrapping_add(0x9e3779b9)
            .wrapping_add(seed << 6)
            .wrapping_add(seed >> 2);
    }
    seed
}

/// Hash the first `len` values of a row
pub fn hash_row_prefix(row: &Row, len: usize) -> u64 {
    let mut seed: u64 = 0;
    for value in row.iter().take(len) {
        let mut hasher = FxHasher::default();
        value.hash(&mut hasher);
        let h = hasher.finish();
        seed ^= h
            .wrapping_add(0x9e3779b9)
            .wrapping_add(seed << 6)
            .wrapping_add(seed >> 2);
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_prefix_ignores_tail() {
        let a = vec![Value::Int(1), Value::Str("x".into()), Value::Real(9.0)];
        let b = vec![Value::Int(1), Value::Str("x".into()), Value::Real(7.0)];
        assert_eq!(hash_row_prefix(&a, 2), hash_row_prefix(&b, 2));
        assert_ne!(hash_row_prefix(&a, 3), hash_row_prefix(&b, 3));
    }

    #[test]
    fn test_hash_indices_order_sensitive() {
        let row = vec![Value::Int(1), Value::Int(2)];
        assert_ne!(
            hash_row_indices(&row, &[0, 1]),
            hash_row_indices(&row, &[1, 0])
        );
    }
}
