use std::io::{self, Read};

use anyhow::{Context, Result};
use shared_counter_race::{RaceGraph, RaceReport};

/// 標準入力からThreadSanitizerのレポートを読み、競合のコールグラフをDOT形式で出力する。
///
/// ```text
/// ./race 2>&1 | tsan-graph | dot -Tsvg > race.svg
/// ```
fn main() -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read ThreadSanitizer report from stdin")?;

    let report = RaceReport::parse(&input)?;
    println!("{}", RaceGraph::build(&report).to_dot());
    Ok(())
}
