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

//! Aggregation, grouping, and aggregate sorting

use treeq::run_to_string;

const TAGGED: &str =
    "<r><t><k>a</k><v>1</v></t><t><k>b</k><v>3</v></t><t><k>a</k><v>4</v></t></r>";

#[test]
fn test_aggregate_sort_top() {
    let out = run_to_string(&["k", "sum[v]", "sort[-sum[v]]", "top[1]"], TAGGED).unwrap();
    assert_eq!(out, "k,sum[v]\na,5\n");
}

#[test]
fn test_group_by_key() {
    let out = run_to_string(&["k", "sum[v]"], TAGGED).unwrap();
    assert_eq!(out, "k,sum[v]\na,5\nb,3\n");
}

#[test]
fn test_min_max_avg_count() {
    let out = run_to_string(
        &["lo:min[v]", "hi:max[v]", "mean:avg[v]", "n:count[v]"],
        TAGGED,
    )
    .unwrap();
    assert_eq!(out, "lo,hi,mean,n\n1,4,2.666666667,3\n");
}

#[test]
fn test_stdev_var() {
    let input = "<r><t><v>2</v></t><t><v>4</v></t><t><v>6</v></t></r>";
    let out = run_to_string(&["sd:stdev[v]", "vr:var[v]"], input).unwrap();
    assert_eq!(out, "sd,vr\n2,4\n");
}

#[test]
fn test_corr_two_stream() {
    let input = "<r>\
        <t><x>1</x><y>3</y></t>\
        <t><x>2</x><y>5</y></t>\
        <t><x>3</x><y>7</y></t>\
        </r>";
    let out = run_to_string(&["c:corr(x,y)"], input).unwrap();
    assert_eq!(out, "c\n1\n");
}

#[test]
fn test_any_aggregate() {
    let out = run_to_string(&["k", "first_v:any[v]"], TAGGED).unwrap();
    assert_eq!(out, "k,first_v\na,1\nb,3\n");
}

#[test]
fn test_aggregate_filter_applies_at_output() {
    let out = run_to_string(&["k", "sum[v]", "where[sum[v]>3]"], TAGGED).unwrap();
    assert_eq!(out, "k,sum[v]\na,5\n");
}

#[test]
fn test_aggregate_over_expression() {
    let out = run_to_string(&["k", "s:sum[v*2]"], TAGGED).unwrap();
    assert_eq!(out, "k,s\na,10\nb,6\n");
}

#[test]
fn test_aggregate_nesting_rejected() {
    let err = run_to_string(&["sum[max[v]]"], TAGGED).unwrap_err();
    assert!(err.to_string().contains("composed"));
}

#[test]
fn test_mixed_aggregate_rejected() {
    let err = run_to_string(&["v+sum[v]"], TAGGED).unwrap_err();
    assert!(err
        .to_string()
        .contains("aggregates and non-aggregates"));
}

#[test]
fn test_count_groups_duplicates() {
    let input = "category,sales\nA,10\nB,20\nA,30\n";
    let out = run_to_string(&["category", "n:count[sales]"], input).unwrap();
    assert_eq!(out, "category,n\nA,2\nB,1\n");
}
