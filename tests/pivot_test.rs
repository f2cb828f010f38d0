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

//! Pivoting jagged name/value partitions into wide columns

use treeq::run_to_string;

const ROWS: &str =
    "<r><row><k>x</k><n>1</n></row><row><k>y</k><n>2</n></row><row><k>x</k><n>3</n></row></r>";

#[test]
fn test_jagged_pivot_with_spread() {
    // jagged pivots discover their column set in a gather pass
    let out = run_to_string(&["...:pivot(k,n,true)"], ROWS).unwrap();
    assert_eq!(out, "x,y\n1,\n,2\n3,\n");
}

#[test]
fn test_pivot_with_literal_names() {
    let out = run_to_string(&["x,y,...:pivot(k,n,true)"], ROWS).unwrap();
    assert_eq!(out, "x,y\n1,\n,2\n3,\n");
}

#[test]
fn test_pivot_partitions_by_group() {
    // sibling pairs at the same depth stay in one partition; the partition
    // closes when the depth drops below where the pairs accumulate
    let input = "<r>\
        <grp><k>x</k><n>1</n><k>y</k><n>2</n></grp>\
        <grp><k>x</k><n>3</n></grp>\
        </r>";
    let out = run_to_string(&["...:pivot(k,n,true)"], input).unwrap();
    assert_eq!(out, "x,y\n1,2\n3,\n");
}

#[test]
fn test_pivot_alongside_regular_column() {
    let input = "<r>\
        <grp><id>g1</id><k>x</k><n>1</n><k>y</k><n>2</n></grp>\
        <grp><id>g2</id><k>y</k><n>9</n></grp>\
        </r>";
    let out = run_to_string(&["id", "...:pivot(k,n,true)"], input).unwrap();
    assert_eq!(out, "id,x,y\ng1,1,2\ng2,,9\n");
}

#[test]
fn test_pivot_requires_names() {
    let err = run_to_string(&["pivot(k,n,true)"], ROWS).unwrap_err();
    assert!(err.to_string().contains("column names"));
}

#[test]
fn test_pivot_unknown_literal_column_rejected() {
    let err = run_to_string(&["q,...:pivot(k,n,true)"], ROWS).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_pivot_names_must_not_aggregate() {
    let err = run_to_string(&["...:pivot(sum[k],n,true)"], ROWS).unwrap_err();
    assert!(err.to_string().contains("aggregate"));
}
