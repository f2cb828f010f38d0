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

//! Path state machines over tag events
//!
//! Each path owns an ordered tag list; a leading `*` wildcard is synthesized
//! if absent so every path matches anywhere in the tree. Each tag position
//! tracks how many open tags currently satisfy it (`relative_parse_depth`);
//! the whole list is advanced and unwound as start and end tags stream by.

use crate::core::Value;
use crate::parser::{prflags, split_path_spec, PathRefData, PathRefId};

/// Path flags
pub mod pathflags {
    /// The path matched at least once somewhere in the input
    pub const EXISTS_IN_INPUT: u32 = 0x1;
    /// No character data accumulates for this path
    pub const NO_DATA: u32 = 0x2;
    /// Commit the row as soon as this path alone matches
    pub const SYNC: u32 = 0x4;
}

/// Progress of one path across a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Uninitialized,
    SearchingForStartTag,
    /// Some tag positions advanced but the last has not matched yet
    CompletingStartTag,
    /// Start matched; accumulating character data
    SearchingForEndTag,
    FoundEndTag,
}

/// One position in a path's tag list
#[derive(Debug, Clone)]
struct Tag {
    name: String,
    wildcard: bool,
    last: bool,
    relative_parse_depth: i32,
}

fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// A path pattern bound to one path reference
#[derive(Debug)]
pub struct Path {
    pub flags: u32,
    pub path_ref: PathRefId,
    tags: Vec<Tag>,
    /// Character data accumulated between the start and end match
    pub text: String,
    pub match_state: MatchState,
    /// Order this path matched within the record; -1 before the first match
    pub match_order: i32,
    match_depth: i32,
    /// Depth of open tags that failed to advance this path
    mismatch_depth: i32,
}

impl Path {
    /// Build the tag list from a path reference's dotted spec
    pub fn new(id: PathRefId, binding: &PathRefData) -> Self {
        let mut specs = split_path_spec(&binding.spec);
        if specs.first().map(String::as_str) != Some("*") {
            specs.insert(0, "*".to_string());
        }
        let count = specs.len();
        let tags = specs
            .into_iter()
            .enumerate()
            .map(|(i, mut name)| {
                let wildcard = name == "*";
                if name.starts_with('{') && name.ends_with('}') {
                    name = name[1..name.len() - 1].to_string();
                }
                Tag {
                    name,
                    wildcard,
                    last: i == count - 1,
                    relative_parse_depth: 0,
                }
            })
            .collect();

        let mut flags = 0;
        if binding.has_flag(prflags::NO_DATA) {
            flags |= pathflags::NO_DATA;
        }
        if binding.has_flag(prflags::SYNC) {
            flags |= pathflags::SYNC;
        }
        Path {
            flags,
            path_ref: id,
            tags,
            text: String::new(),
            match_state: MatchState::Uninitialized,
            match_order: -1,
            match_depth: -1,
            mismatch_depth: 0,
        }
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// React to a start tag. On a complete match, updates the row match
    /// order and returns the path's relative depth for the caller to record
    /// and to fire start-match expressions against.
    pub fn match_start_tag(
        &mut self,
        name: &str,
        row: &mut RowMatchState,
        case_sensitive: bool,
    ) -> Option<i32> {
        if matches!(
            self.match_state,
            MatchState::FoundEndTag | MatchState::SearchingForEndTag
        ) {
            return None;
        }

        let mut complete = false;
        if self.mismatch_depth > 0 {
            self.mismatch_depth += 1;
        } else if !taglist_match_start(
            &mut self.tags,
            0,
            name,
            row.curr_parse_depth,
            &mut complete,
            case_sensitive,
        ) {
            self.mismatch_depth += 1;
        } else if !complete {
            self.match_state = MatchState::CompletingStartTag;
        } else {
            // matched start tag: maintain the match order among the paths;
            // later matches cannot precede earlier ones
            if self.match_order == -1 {
                self.match_order = row.match_order;
                row.match_order += 1;
            } else if self.match_order < row.match_order {
                row.match_order = self.match_order + 1;
            }

            self.text.clear(); // appending begins now, until the end tag
            self.match_state = MatchState::SearchingForEndTag;
            self.match_depth = row.curr_parse_depth;
            row.searching_for_end_cnt += 1;
            return Some(self.relative_parse_depth(false));
        }
        None
    }

    /// React to an end tag. On the end match, trims the accumulated data
    /// and returns the relative depth for end-match expressions.
    pub fn match_end_tag(
        &mut self,
        name: &str,
        row: &mut RowMatchState,
        case_sensitive: bool,
    ) -> Option<i32> {
        if self.mismatch_depth > 0 {
            self.mismatch_depth -= 1;
            return None;
        }
        if !taglist_match_end(&mut self.tags, 0, name, case_sensitive) {
            return None;
        }
        if self.match_state != MatchState::SearchingForEndTag {
            return None;
        }
        let trimmed = self.text.trim().to_string();
        self.text = trimmed;
        row.searching_for_end_cnt -= 1;
        self.match_state = MatchState::FoundEndTag;
        Some(self.relative_parse_depth(false))
    }

    /// Append character data while between the start and end match
    pub fn append_value(&mut self, chunk: &str) {
        if !self.has_flag(pathflags::NO_DATA)
            && self.match_state == MatchState::SearchingForEndTag
            && !chunk.is_empty()
        {
            self.text.push_str(chunk);
        }
    }

    /// A path counts as matched once its start pattern matched and either
    /// the end arrived or a previous record left a bound value in place
    pub fn is_matched(&self, binding: &PathRefData) -> bool {
        !(self.match_state == MatchState::SearchingForEndTag
            || (!binding.has_flag(prflags::MATCHED) && self.text.is_empty()))
    }

    /// Reset sequentially-later matches so sibling order stays left-to-right
    pub fn reset(&mut self, parse_depth: i32, match_order_start: i32, binding: &mut PathRefData) {
        if self.match_order >= match_order_start {
            self.clear_values(binding);
        }
        taglist_reset(&mut self.tags, 0, parse_depth);
    }

    fn clear_values(&mut self, binding: &mut PathRefData) {
        binding.flags &= !prflags::MATCHED;
        binding.value = Value::Str(String::new());
        self.match_depth = -1;
        self.text.clear();
        self.match_order = -1;
        self.start_match();
    }

    /// Arm for the next record without clearing bound values
    pub fn start_match(&mut self) {
        self.match_state = MatchState::SearchingForStartTag;
    }

    fn relative_parse_depth(&self, include_initial_wildcard: bool) -> i32 {
        taglist_relative_depth(&self.tags, 0, include_initial_wildcard)
    }

    /// Tag-counter snapshot; used to verify matcher bookkeeping
    #[cfg(test)]
    pub fn tag_depths(&self) -> Vec<i32> {
        self.tags.iter().map(|t| t.relative_parse_depth).collect()
    }
}

fn taglist_match_start(
    tags: &mut [Tag],
    idx: usize,
    name: &str,
    curr_parse_depth: i32,
    complete: &mut bool,
    case_sensitive: bool,
) -> bool {
    let has_next = !tags[idx].last;
    if tags[idx].relative_parse_depth > 0 {
        if has_next {
            // check whether the next position gives us a match to advance to
            let remaining = curr_parse_depth - tags[idx].relative_parse_depth;
            if taglist_match_start(tags, idx + 1, name, remaining, complete, case_sensitive) {
                return true;
            }
            if tags[idx].wildcard && tags[idx + 1].relative_parse_depth == 0 {
                // stay at this wildcard
                if curr_parse_depth > 0 {
                    tags[idx].relative_parse_depth += 1;
                }
                return true;
            }
        }
        return false;
    }

    // zero-or-more wildcard: if the next position matches the incoming tag,
    // advance past the wildcard into it
    if tags[idx].wildcard && has_next && names_equal(&tags[idx + 1].name, name, case_sensitive) {
        if curr_parse_depth > 0 {
            tags[idx].relative_parse_depth += 1;
        }
        let remaining = curr_parse_depth - tags[idx].relative_parse_depth;
        return taglist_match_start(tags, idx + 1, name, remaining, complete, case_sensitive);
    }

    // one-or-more wildcard, or a literal match at this position
    if tags[idx].wildcard || names_equal(&tags[idx].name, name, case_sensitive) {
        if curr_parse_depth > 0 {
            tags[idx].relative_parse_depth += 1;
        }
        if tags[idx].last {
            *complete = true;
        }
        return true;
    }
    false
}

fn taglist_match_end(tags: &mut [Tag], idx: usize, name: &str, case_sensitive: bool) -> bool {
    let has_next = !tags[idx].last;
    if has_next && tags[idx + 1].relative_parse_depth > 0 {
        return taglist_match_end(tags, idx + 1, name, case_sensitive);
    }
    if tags[idx].relative_parse_depth > 0
        && (tags[idx].wildcard || names_equal(&tags[idx].name, name, case_sensitive))
    {
        tags[idx].relative_parse_depth -= 1;
        return true;
    }
    false
}

fn taglist_reset(tags: &mut [Tag], idx: usize, rollback_depth: i32) {
    let has_next = !tags[idx].last;
    if rollback_depth == -1 {
        // rollback started above; zero out the rest
        tags[idx].relative_parse_depth = 0;
        if has_next {
            taglist_reset(tags, idx + 1, -1);
        }
    } else if rollback_depth < tags[idx].relative_parse_depth {
        tags[idx].relative_parse_depth = rollback_depth;
        if has_next {
            taglist_reset(tags, idx + 1, -1);
        }
    } else if has_next {
        // keep looking deeper, relative to this position's depth
        let remaining = rollback_depth - tags[idx].relative_parse_depth;
        taglist_reset(tags, idx + 1, remaining);
    }
}

fn taglist_relative_depth(tags: &[Tag], idx: usize, include_initial_wildcard: bool) -> i32 {
    if tags[idx].last {
        return 1;
    }
    let initial_wildcard = idx == 0 && tags[idx].wildcard;
    let skip = initial_wildcard && !include_initial_wildcard;
    let own = if skip {
        0
    } else {
        tags[idx].relative_parse_depth
    };
    own + taglist_relative_depth(tags, idx + 1, false)
}

/// Match bookkeeping shared by all paths within a record
#[derive(Debug, Default)]
pub struct RowMatchState {
    pub match_order: i32,
    pub curr_parse_depth: i32,
    pub searching_for_end_cnt: i32,
    pub match_type: MatchType,
}

/// Outcome of a tag event across all paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    NotAllMatched,
    AllMatched,
    /// All matched, relying on the no-data relaxation at a start tag
    AllMatchedWithNoDataMatches,
}

impl RowMatchState {
    pub fn reset(&mut self) {
        self.match_order = 0;
        self.curr_parse_depth = 0;
        self.searching_for_end_cnt = 0;
        self.match_type = MatchType::NotAllMatched;
    }
}
