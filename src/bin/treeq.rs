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

//! Treeq CLI - streaming queries over tag-tree, object, delimited, and log
//! inputs

use std::io::{self, Write};

use clap::Parser;

use treeq::driver::{usage, Driver};
use treeq::CancelToken;

/// Streaming query engine over hierarchical records
#[derive(Parser, Debug)]
#[command(name = "treeq")]
#[command(version)]
// column specs use --flag[=value] shorthand themselves; clap must not eat
// them, and `--help` is the query's own usage directive
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Column specifications: `expression` or `name[,name,...]:expression`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    columns: Vec<String>,
}

fn main() {
    let args = Args::parse();
    let cancel = CancelToken::new();

    let mut driver = Driver::new(cancel);
    let stdout = io::stdout();
    let result = driver.initialize(&args.columns).and_then(|show_usage| {
        if show_usage {
            let mut out = stdout.lock();
            let _ = out.write_all(usage().as_bytes());
            return Ok(());
        }
        driver.run(stdout.lock())
    });

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(-1);
    }
}
