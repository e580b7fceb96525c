//! Prints the per-agent advantage leaderboard as JSON.
//! Thresholds come from AGENT_THRESH / ORACLE_THRESH.

use anyhow::Result;
use serde_json::json;
use std::path::Path;

use benchscope::config::Config;
use benchscope::data::{Dataset, MedianTable};
use benchscope::store::Explorer;

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let path = std::env::args().nth(1).unwrap_or_else(|| cfg.data_path.clone());

    let dataset = Dataset::load(Path::new(&path))?;
    let medians = MedianTable::load(Path::new(&cfg.median_path)).unwrap_or_default();
    let explorer = Explorer::with_thresholds(dataset, medians, cfg.thresholds());

    let payload = json!({
        "thresholds": explorer.thresholds(),
        "mean_advantage": explorer.derived().mean_advantage,
        "leaderboard": explorer.leaderboard(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
