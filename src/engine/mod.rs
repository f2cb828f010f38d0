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

//! Query execution: matcher, evaluator, aggregates, pivoter, row pipeline,
//! and the pass-sequencing engine

pub mod aggregate;
pub mod context;
pub mod evaluator;
pub mod executor;
pub mod matcher;
pub mod path;
pub mod pipeline;
pub mod pivot;

pub use aggregate::{Aggregate, RowAggregates};
pub use context::{CancelToken, Context, NodeInfo, PassType};
pub use evaluator::Evaluator;
pub use executor::{collect_rows, QueryEngine};
pub use matcher::Matcher;
pub use path::{pathflags, MatchState, MatchType, Path, RowMatchState};
pub use pipeline::{RowPipeline, RowSink};
pub use pivot::{PivotOutcome, Pivoter};
