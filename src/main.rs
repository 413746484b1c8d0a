use anyhow::Result;
use shared_counter_race::{Config, Strategy, run_strategy};

fn main() -> Result<()> {
    let value = run_strategy(&Config::default(), Strategy::Racy)?;
    println!("Final value of shared_variable: {value}");
    Ok(())
}
