use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::path::Path;

use benchscope::assets::FsAssetStore;
use benchscope::config::Config;
use benchscope::data::{Dataset, MedianTable};
use benchscope::logging::{log, obj, v_num, v_str, Domain, Level};
use benchscope::server::{self, AppState};
use benchscope::store::Explorer;

fn now_ts() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let data_path = std::env::args().nth(1).unwrap_or_else(|| cfg.data_path.clone());

    let (dataset, manifest) = Dataset::load_with_manifest(Path::new(&data_path), now_ts())?;
    for warning in &manifest.warnings {
        log(
            Level::Warn,
            Domain::Data,
            "dataset_warning",
            obj(&[("path", v_str(&manifest.path)), ("warning", v_str(warning))]),
        );
    }

    // the explorer still works without precomputed medians
    let medians = match MedianTable::load(Path::new(&cfg.median_path)) {
        Ok(table) => table,
        Err(err) => {
            log(
                Level::Warn,
                Domain::Data,
                "median_table_unavailable",
                obj(&[
                    ("path", v_str(&cfg.median_path)),
                    ("error", v_str(&format!("{:#}", err))),
                ]),
            );
            MedianTable::default()
        }
    };

    let explorer = Explorer::with_thresholds(dataset, medians, cfg.thresholds());
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("agents", json!(explorer.unique_agents())),
            ("levels", json!(explorer.unique_levels())),
            ("median_agents", json!(explorer.medians().len())),
            ("mean_advantage", v_num(explorer.derived().mean_advantage)),
            ("recordings_root", v_str(&cfg.recordings_root)),
        ]),
    );

    let state = AppState::new(explorer, FsAssetStore::new(&cfg.recordings_root));
    server::run(&cfg.bind_addr, state).await
}
