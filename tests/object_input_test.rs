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

//! Object-dialect inputs end to end

use treeq::run_to_string;

#[test]
fn test_object_dialect_detection_and_query() {
    let input = r#"{"orders": [{"id": 1, "total": 9.5}, {"id": 2, "total": 20}]}"#;
    let out = run_to_string(&["id", "total", "where[total>10]"], input).unwrap();
    assert_eq!(out, "id,total\n2,20\n");
}

#[test]
fn test_anonymous_top_level_array() {
    let input = r#"[{"name": "ant"}, {"name": "bee"}]"#;
    let out = run_to_string(&["name"], input).unwrap();
    assert_eq!(out, "name\nant\nbee\n");
}

#[test]
fn test_nested_path() {
    let input = r#"{"user": {"address": {"city": "Oslo"}}}"#;
    let out = run_to_string(&["user.address.city"], input).unwrap();
    assert_eq!(out, "user.address.city\nOslo\n");
}

#[test]
fn test_array_repeats_enclosing_key() {
    let input = r#"{"bag": {"item": ["a", "b", "c"]}}"#;
    let out = run_to_string(&["f:any[item]", "n:count[item]"], input).unwrap();
    assert_eq!(out, "f,n\na,3\n");
}

#[test]
fn test_attr_object() {
    let input = r#"{"thing": {"_attr": {"kind": "widget"}, "name": "t1"}}"#;
    let out = run_to_string(&["k:thing..kind", "name"], input).unwrap();
    assert_eq!(out, "k,name\nwidget,t1\n");
}

#[test]
fn test_aggregation_over_object_stream() {
    // a stream of top-level documents, one record each
    let input = "{\"v\": 1}\n{\"v\": 2}\n{\"v\": 3}\n";
    let out = run_to_string(&["s:sum[v]"], input).unwrap();
    assert_eq!(out, "s\n6\n");
}
