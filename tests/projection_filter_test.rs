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

//! Basic projection and filtering over delimited input

use treeq::run_to_string;

const SALES: &str = "category,sales\nA,10\nB,20\nA,30\n";

#[test]
fn test_projection() {
    let out = run_to_string(&["category", "sales"], SALES).unwrap();
    assert_eq!(out, "category,sales\nA,10\nB,20\nA,30\n");
}

#[test]
fn test_filter_drops_rows() {
    let out = run_to_string(&["category", "sales", "where[sales>15]"], SALES).unwrap();
    assert_eq!(out, "category,sales\nB,20\nA,30\n");
}

#[test]
fn test_aggregate_with_filter() {
    // scenario: filter applies per input row, before grouping
    let out = run_to_string(&["category", "sum[sales]", "where[sales>15]"], SALES).unwrap();
    assert_eq!(out, "category,sum[sales]\nB,20\nA,30\n");
}

#[test]
fn test_aggregate_groups_by_value_prefix() {
    let out = run_to_string(&["category", "sum[sales]"], SALES).unwrap();
    assert_eq!(out, "category,sum[sales]\nA,40\nB,20\n");
}

#[test]
fn test_no_output_header() {
    let out = run_to_string(&["category", "--outheader=false"], SALES).unwrap();
    assert_eq!(out, "A\nB\nA\n");
}

#[test]
fn test_computed_column() {
    let out = run_to_string(&["category", "double:sales*2"], SALES).unwrap();
    assert_eq!(out, "category,double\nA,20\nB,40\nA,60\n");
}

#[test]
fn test_column_reference_in_filter() {
    let out = run_to_string(
        &["category", "double:sales*2", "where[double>30]"],
        SALES,
    )
    .unwrap();
    assert_eq!(out, "category,double\nB,40\nA,60\n");
}

#[test]
fn test_rownum() {
    let out = run_to_string(&["n:rownum()", "category"], SALES).unwrap();
    assert_eq!(out, "n,category\n1,A\n2,B\n3,A\n");
}

#[test]
fn test_first_n_stops_early() {
    let out = run_to_string(&["category", "first[2]"], SALES).unwrap();
    assert_eq!(out, "category\nA\nB\n");
}

#[test]
fn test_top_n_without_sort() {
    let out = run_to_string(&["category", "top[2]"], SALES).unwrap();
    assert_eq!(out, "category\nA\nB\n");
}

#[test]
fn test_first_n_idempotent_on_own_output() {
    // running first[n] over its own output yields the same rows
    let args = &["category", "sales", "first[2]"];
    let once = run_to_string(args, SALES).unwrap();
    let twice = run_to_string(args, &once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_tsv_input() {
    let out = run_to_string(&["a", "b"], "a\tb\n1\tx\n2\ty\n").unwrap();
    assert_eq!(out, "a,b\n1,x\n2,y\n");
}

#[test]
fn test_csv_quoting_round_trip() {
    let input = "name,note\nwidget,\"has, comma\"\n";
    let out = run_to_string(&["name", "note"], input).unwrap();
    assert_eq!(out, "name,note\nwidget,\"has, comma\"\n");
}

#[test]
fn test_unmatched_path_is_an_error() {
    let err = run_to_string(&["category", "nosuch"], SALES).unwrap_err();
    assert!(err.to_string().contains("not matched"));
}
