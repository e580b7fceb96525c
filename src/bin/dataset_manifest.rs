use benchscope::config::Config;
use benchscope::data::{default_manifest_path, Dataset, EXPECTED_COLUMNS};
use chrono::Utc;
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| Config::from_env().data_path);

    let now_ts = Utc::now().timestamp().max(0) as u64;

    let (dataset, manifest) = match Dataset::load_with_manifest(PathBuf::from(&path).as_path(), now_ts) {
        Ok(m) => m,
        Err(err) => {
            eprintln!("analysis failed: {:#}", err);
            std::process::exit(1);
        }
    };

    if !manifest.has_speedup_columns() {
        eprintln!("schema mismatch: {:?}", manifest.warnings);
        eprintln!("expected columns: {:?}", EXPECTED_COLUMNS);
        std::process::exit(2);
    }

    let out_path = default_manifest_path(PathBuf::from(&path).as_path());
    let payload = json!({
        "manifest": manifest,
        "dropped_ids": dataset
            .all
            .iter()
            .filter(|r| !r.has_speedups())
            .filter_map(|r| r.id)
            .collect::<Vec<_>>(),
    });
    let body = match serde_json::to_string_pretty(&payload) {
        Ok(body) => body,
        Err(err) => {
            eprintln!("failed to encode manifest: {}", err);
            std::process::exit(3);
        }
    };
    if let Err(err) = fs::write(&out_path, body) {
        eprintln!("failed to write {}: {}", out_path.display(), err);
        std::process::exit(4);
    }
    println!("wrote manifest {}", out_path.display());
}
