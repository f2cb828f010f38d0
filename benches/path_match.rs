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

//! Benchmark for the hot path-matching loop

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use treeq::run_to_string;

fn build_input(records: usize) -> String {
    let mut input = String::from("<r>");
    for i in 0..records {
        input.push_str(&format!(
            "<o><id>{}</id><grp><v>{}</v></grp><c>name{}</c></o>",
            i,
            i * 3,
            i
        ));
    }
    input.push_str("</r>");
    input
}

fn bench_path_matching(c: &mut Criterion) {
    let input = build_input(2000);
    c.bench_function("project_2000_records", |b| {
        b.iter(|| {
            let out = run_to_string(
                black_box(&["id", "grp.v", "c", "--outheader=false"]),
                black_box(&input),
            )
            .unwrap();
            black_box(out);
        })
    });

    c.bench_function("aggregate_2000_records", |b| {
        b.iter(|| {
            let out =
                run_to_string(black_box(&["c", "sum[grp.v]"]), black_box(&input)).unwrap();
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_path_matching);
criterion_main!(benches);
