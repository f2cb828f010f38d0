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

//! Path matching over tag-tree input

use treeq::run_to_string;

#[test]
fn test_sibling_projection() {
    let input = "<r><o><id>1</id><c>x</c></o><o><id>2</id><c>y</c></o></r>";
    let out = run_to_string(&["id", "c"], input).unwrap();
    assert_eq!(out, "id,c\n1,x\n2,y\n");
}

#[test]
fn test_repeated_sibling_reuses_bound_value() {
    let input = "<r><o><id>1</id><c>x</c><c>y</c></o></r>";
    let out = run_to_string(&["id", "c"], input).unwrap();
    assert_eq!(out, "id,c\n1,x\n1,y\n");
}

#[test]
fn test_dotted_path_disambiguates() {
    let input = "<r><a><v>inner</v></a><b><v>other</v></b></r>";
    let out = run_to_string(&["a.v"], input).unwrap();
    assert_eq!(out, "a.v\ninner\n");
}

#[test]
fn test_wildcard_path() {
    let input = "<r><a><x><v>1</v></x></a><a><y><v>2</v></y></a></r>";
    let out = run_to_string(&["a.*.v"], input).unwrap();
    assert_eq!(out, "a.*.v\n1\n2\n");
}

#[test]
fn test_attributes() {
    let input = r#"<r><item kind="fruit"><name>apple</name></item></r>"#;
    let out = run_to_string(&["k:item..kind", "name"], input).unwrap();
    assert_eq!(out, "k,name\nfruit,apple\n");
}

#[test]
fn test_self_terminating_tag_with_attribute() {
    let input = r#"<r><item kind="tool"/><item kind="toy"/></r>"#;
    let out = run_to_string(&["k:item..kind"], input).unwrap();
    assert_eq!(out, "k\ntool\ntoy\n");
}

#[test]
fn test_depth_and_path_operators() {
    let input = "<a><b><c>1</c></b></a>";
    let out = run_to_string(
        &["c", "p:path[c]", "d:depth[c]", "ns:nodestart[c]", "ne:nodeend[c]"],
        input,
    )
    .unwrap();
    assert_eq!(out, "c,p,d,ns,ne\n1,a.b,2,3,3\n");
}

#[test]
fn test_nodename_operator() {
    let input = "<r><grp><item><v>1</v></item></grp></r>";
    let out = run_to_string(&["v", "own:nodename[v]", "parent:nodename(v,1)"], input).unwrap();
    assert_eq!(out, "v,own,parent\n1,v,item\n");
}

#[test]
fn test_linenum_operator() {
    let input = "<r>\n<a>1</a>\n<a>2</a>\n</r>";
    let out = run_to_string(&["a", "l:linenum[a]"], input).unwrap();
    assert_eq!(out, "a,l\n1,2\n2,3\n");
}

#[test]
fn test_entities_decoded() {
    let input = "<r><v>a &lt;b&gt; &amp; c</v></r>";
    let out = run_to_string(&["v", "--outheader=false"], input).unwrap();
    assert_eq!(out, "a <b> & c\n");
}

#[test]
fn test_embedded_subtree_capture() {
    // a path over a non-leaf tag captures the embedded markup
    let input = "<r><o><u>1</u></o></r>";
    let out = run_to_string(&["o", "--outheader=false"], input).unwrap();
    assert_eq!(out, "<u>1</u>\n");
}

#[test]
fn test_root_directive_scopes_matching() {
    // only the scope opened by node ordinal 3 (the second <r>) is queried
    let input = "<r><v>1</v></r><r><v>2</v></r>";
    let out = run_to_string(&["v", "root[3]", "--outheader=false"], input).unwrap();
    assert_eq!(out, "2\n");
}

#[test]
fn test_sync_commits_as_soon_as_path_matches() {
    let input = "<r><g><c>x</c><d>1</d></g></r>";
    // without sync only the complete row appears; sync[c] also commits the
    // moment c matches, before d arrives
    let out = run_to_string(&["c", "d", "--outheader=false"], input).unwrap();
    assert_eq!(out, "x,1\n");
    let out = run_to_string(&["c", "d", "sync[c]", "--outheader=false"], input).unwrap();
    assert_eq!(out, "x,\nx,1\n");
}

#[test]
fn test_case_directive() {
    let input = "<r><Val>1</Val></r>";
    // default matching is case-insensitive
    let out = run_to_string(&["val", "--outheader=false"], input).unwrap();
    assert_eq!(out, "1\n");
    // case-sensitive matching misses the differently-cased tag
    let err = run_to_string(&["val", "--case", "--outheader=false"], input).unwrap_err();
    assert!(err.to_string().contains("not matched"));
}
