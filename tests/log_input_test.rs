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

//! Log-dialect inputs end to end

use treeq::run_to_string;

#[test]
fn test_log_detection_and_projection() {
    let input = "2024-01-02 03:04:05 INFO hello world\n";
    let out = run_to_string(&["time", "level", "msg"], input).unwrap();
    assert_eq!(
        out,
        "time,level,msg\n2024-01-02 03:04:05,INFO,hello world\n"
    );
}

#[test]
fn test_log_level_filter() {
    let input = "2024-01-02 03:04:05 INFO fine\n\
                 2024-01-02 03:04:06 ERROR broken\n\
                 2024-01-02 03:04:07 INFO fine again\n";
    let out = run_to_string(&["time", "msg", "where[level==\"ERROR\"]"], input).unwrap();
    assert_eq!(out, "time,msg\n2024-01-02 03:04:06,broken\n");
}

#[test]
fn test_log_embedded_object_fields() {
    let input = "2024-01-02 03:04:05 INFO request done req:{path: /api, ms: 42}\n\
                 2024-01-02 03:04:06 INFO request done req:{path: /health, ms: 3}\n";
    let out = run_to_string(&["req.path", "req.ms", "where[req.ms>10]"], input).unwrap();
    assert_eq!(out, "req.path,req.ms\n/api,42\n");
}

#[test]
fn test_trace_scope_carries_context() {
    let input = "2024-01-02 03:04:05 TRACE START - job:{name: nightly}\n\
                 2024-01-02 03:04:06 INFO step one\n\
                 2024-01-02 03:04:07 TRACE END - done\n";
    let out = run_to_string(&["job.name", "msg", "sync[msg]"], input).unwrap();
    assert_eq!(out, "job.name,msg\nnightly,step one\n");
}

#[test]
fn test_datetime_grouping_over_logs() {
    let input = "2024-01-02 03:04:05 INFO a\n\
                 2024-01-02 03:04:06 ERROR b\n\
                 2024-01-02 03:04:07 ERROR c\n";
    let out = run_to_string(&["level", "n:count[msg]", "sort[-n]"], input).unwrap();
    assert_eq!(out, "level,n\nERROR,2\nINFO,1\n");
}
