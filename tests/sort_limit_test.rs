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

//! Sorting, limiting, and distinct

use treeq::run_to_string;

const SALES: &str = "category,sales\nB,20\nA,30\nA,10\nC,20\n";

#[test]
fn test_sort_ascending_numeric() {
    let out = run_to_string(&["category", "sales", "sort[sales]"], SALES).unwrap();
    assert_eq!(out, "category,sales\nA,10\nB,20\nC,20\nA,30\n");
}

#[test]
fn test_sort_descending_via_negation() {
    let out = run_to_string(&["category", "sales", "sort[-sales]"], SALES).unwrap();
    assert_eq!(out, "category,sales\nA,30\nB,20\nC,20\nA,10\n");
}

#[test]
fn test_sort_reversed_string_key() {
    let out = run_to_string(&["category", "sort[-str[category]]"], SALES).unwrap();
    assert_eq!(out, "category\nC\nB\nA\nA\n");
}

#[test]
fn test_sort_composite_keys() {
    // sales ascending, then category descending for ties
    let out = run_to_string(
        &["category", "sales", "sort[sales,-str[category]]"],
        SALES,
    )
    .unwrap();
    assert_eq!(out, "category,sales\nA,10\nC,20\nB,20\nA,30\n");
}

#[test]
fn test_sort_is_stable_for_equal_keys() {
    let input = "k,v\nx,1\ny,1\nz,1\n";
    let out = run_to_string(&["k", "sort[v]"], input).unwrap();
    assert_eq!(out, "k\nx\ny\nz\n");
}

#[test]
fn test_top_after_sort() {
    let out = run_to_string(&["category", "sales", "sort[-sales]", "top[2]"], SALES).unwrap();
    assert_eq!(out, "category,sales\nA,30\nB,20\n");
}

#[test]
fn test_sort_by_non_output_expression() {
    // the sort key need not be projected
    let out = run_to_string(&["category", "sort[-sales]"], SALES).unwrap();
    assert_eq!(out, "category\nA\nB\nC\nA\n");
}

#[test]
fn test_distinct() {
    let input = "k\nx\ny\nx\nz\ny\n";
    let out = run_to_string(&["k", "--distinct"], input).unwrap();
    assert_eq!(out, "k\nx\ny\nz\n");
}

#[test]
fn test_distinct_with_sort() {
    let input = "k\nz\nx\ny\nx\n";
    let out = run_to_string(&["k", "--distinct", "sort[str[k]]"], input).unwrap();
    assert_eq!(out, "k\nx\ny\nz\n");
}

#[test]
fn test_first_caps_matched_rows() {
    let out = run_to_string(&["category", "sales", "first[3]", "sort[sales]"], SALES).unwrap();
    // only the first three input rows participate in the sort
    assert_eq!(out, "category,sales\nA,10\nB,20\nA,30\n");
}
