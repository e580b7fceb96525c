use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::logging::{log_dataset_loaded, log_malformed_field};

pub mod codes;
pub mod median;
pub mod record;

pub use codes::{code_names, main_code, parse_benchmark_codes};
pub use median::{AgentMedianStats, MedianTable};
pub use record::{coerce_speedup, BenchmarkRecord, RawRow, RawValue};

use record::{COL_AGENT_ID, COL_AGENT_NOP, COL_BENCHMARK_TYPE, COL_ID, COL_LEVEL, COL_ORACLE_NOP};

pub const EXPECTED_COLUMNS: [&str; 6] = [
    COL_ID,
    COL_AGENT_ID,
    COL_LEVEL,
    COL_BENCHMARK_TYPE,
    COL_AGENT_NOP,
    COL_ORACLE_NOP,
];

/// Header plus rows of a CSV file, empty cells read as null.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

pub fn read_rows(path: &Path) -> Result<CsvTable> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_rows_from(file)
}

pub fn read_rows_from<R: Read>(reader: R) -> Result<CsvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()
        .context("reading CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading CSV row {}", idx + 1))?;
        let row: RawRow = columns
            .iter()
            .zip(record.iter())
            .map(|(col, cell)| (col.clone(), RawValue::from(cell)))
            .collect();
        rows.push(row);
    }

    Ok(CsvTable { columns, rows })
}

/// The normalized benchmark dataset.
///
/// `all` keeps every row for direct lookup (player view); `scatter` keeps
/// only rows carrying both speedups and feeds every aggregation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    pub all: Vec<BenchmarkRecord>,
    pub scatter: Vec<BenchmarkRecord>,
    pub malformed_fields: u64,
}

impl Dataset {
    pub fn from_rows(rows: &[RawRow]) -> Self {
        let mut all = Vec::with_capacity(rows.len());
        let mut malformed_fields = 0u64;

        for (idx, row) in rows.iter().enumerate() {
            let record = BenchmarkRecord::from_row(row);
            for (column, parsed) in [
                (COL_AGENT_NOP, record.agent_nop),
                (COL_ORACLE_NOP, record.oracle_nop),
            ] {
                if let (Some(raw), None) = (row.get(column).and_then(RawValue::as_text), parsed) {
                    malformed_fields += 1;
                    log_malformed_field(idx, column, &raw);
                }
            }
            all.push(record);
        }

        Self::from_records(all, malformed_fields)
    }

    pub fn from_records(all: Vec<BenchmarkRecord>, malformed_fields: u64) -> Self {
        let scatter = all.iter().filter(|r| r.has_speedups()).cloned().collect();
        Self {
            all,
            scatter,
            malformed_fields,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::load_with_manifest(path, 0)?.0)
    }

    /// Reads, normalizes and fingerprints a dataset file.
    pub fn load_with_manifest(path: &Path, now_ts: u64) -> Result<(Self, DatasetManifest)> {
        let hash = file_sha256(path)?;
        let table = read_rows(path)
            .with_context(|| format!("reading dataset {}", path.display()))?;
        let dataset = Self::from_rows(&table.rows);
        let manifest = DatasetManifest::build(path, hash, &table.columns, &dataset, now_ts);
        log_dataset_loaded(
            &manifest.path,
            dataset.all.len(),
            dataset.scatter.len(),
            &manifest.hash_sha256,
        );
        Ok((dataset, manifest))
    }

    pub fn dropped(&self) -> usize {
        self.all.len() - self.scatter.len()
    }

    pub fn find_by_id(&self, id: f64) -> Option<&BenchmarkRecord> {
        self.all.iter().find(|r| r.lookup_id() == Some(id))
    }

    pub fn find_by_recording(&self, recording: &str) -> Option<&BenchmarkRecord> {
        self.all
            .iter()
            .find(|r| r.agent_recording.as_deref() == Some(recording))
    }

    /// Player view resolution: an explicit benchmark id wins, then the
    /// recording path (stored with a leading `/`).
    pub fn lookup_player(
        &self,
        recording_path: &str,
        benchmark: Option<&str>,
    ) -> Option<&BenchmarkRecord> {
        let by_id = benchmark
            .and_then(|b| b.trim().parse::<f64>().ok())
            .and_then(|id| self.find_by_id(id));
        if by_id.is_some() {
            return by_id;
        }
        if recording_path.is_empty() {
            return None;
        }
        self.find_by_recording(&format!("/{}", recording_path))
    }
}

fn unique<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    values
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn unique_agents(records: &[BenchmarkRecord]) -> Vec<String> {
    unique(records.iter().map(BenchmarkRecord::agent))
}

pub fn unique_levels(records: &[BenchmarkRecord]) -> Vec<String> {
    unique(records.iter().map(BenchmarkRecord::level))
}

pub fn unique_types(records: &[BenchmarkRecord]) -> Vec<String> {
    unique(records.iter().map(BenchmarkRecord::benchmark_type))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub scatter_count: u64,
    pub dropped_rows: u64,
    pub malformed_fields: u64,
    pub columns: Vec<String>,
    pub agents: Vec<String>,
    pub levels: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at_epoch: u64,
}

impl DatasetManifest {
    pub fn build(
        path: &Path,
        hash_sha256: String,
        columns: &[String],
        dataset: &Dataset,
        now_ts: u64,
    ) -> Self {
        let mut warnings: Vec<String> = EXPECTED_COLUMNS
            .iter()
            .filter(|c| !columns.iter().any(|have| have == *c))
            .map(|c| format!("missing_column: {}", c))
            .collect();
        if dataset.scatter.is_empty() {
            warnings.push("no_scatter_rows".to_string());
        }

        Self {
            path: path.display().to_string(),
            hash_sha256,
            row_count: dataset.all.len() as u64,
            scatter_count: dataset.scatter.len() as u64,
            dropped_rows: dataset.dropped() as u64,
            malformed_fields: dataset.malformed_fields,
            columns: columns.to_vec(),
            agents: unique_agents(&dataset.scatter),
            levels: unique_levels(&dataset.scatter),
            warnings,
            generated_at_epoch: now_ts,
        }
    }

    /// Both speedup columns are present.
    pub fn has_speedup_columns(&self) -> bool {
        [COL_AGENT_NOP, COL_ORACLE_NOP]
            .iter()
            .all(|c| self.columns.iter().any(|have| have == c))
    }
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_manifest_path(dataset_path: &Path) -> PathBuf {
    let mut p = dataset_path.to_path_buf();
    let fname = dataset_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset.csv");
    p.set_file_name(format!("{}.manifest.json", fname));
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
id,agent_id,level,benchmark_type,agent/nop,oracle/nop,agent_recording
1,\"terminus-2,claude\",func-level,time,2.0,1.0,/claude/run1.cast
2,\"terminus-2,claude\",func-level,time,0.5,1.0,
3,\"terminus-2,gpt-5\",class-level,mem,1.1,
4,\"terminus-2,gpt-5\",,time,bogus,1.2,/gpt5/run4.cast
";

    #[test]
    fn reads_rows_with_quoted_agent_ids() {
        let table = read_rows_from(CSV.as_bytes()).unwrap();
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(
            table.rows[0].get("agent_id"),
            Some(&RawValue::from("terminus-2,claude"))
        );
        assert_eq!(table.rows[2].get("oracle/nop"), Some(&RawValue::Null));
    }

    #[test]
    fn scatter_excludes_rows_missing_a_speedup() {
        let table = read_rows_from(CSV.as_bytes()).unwrap();
        let dataset = Dataset::from_rows(&table.rows);
        assert_eq!(dataset.all.len(), 4);
        assert_eq!(dataset.scatter.len(), 2);
        assert_eq!(dataset.dropped(), 2);
        assert_eq!(dataset.malformed_fields, 1);
    }

    #[test]
    fn dropped_rows_remain_resolvable() {
        let table = read_rows_from(CSV.as_bytes()).unwrap();
        let dataset = Dataset::from_rows(&table.rows);
        assert_eq!(dataset.find_by_id(3.0).map(|r| r.id), Some(Some(3)));
        assert_eq!(
            dataset.lookup_player("gpt5/run4.cast", None).and_then(|r| r.id),
            Some(4)
        );
    }

    #[test]
    fn player_lookup_prefers_benchmark_id() {
        let table = read_rows_from(CSV.as_bytes()).unwrap();
        let dataset = Dataset::from_rows(&table.rows);
        let hit = dataset.lookup_player("claude/run1.cast", Some("2")).unwrap();
        assert_eq!(hit.id, Some(2));
        let fallback = dataset.lookup_player("claude/run1.cast", Some("99")).unwrap();
        assert_eq!(fallback.id, Some(1));
        assert!(dataset.lookup_player("", None).is_none());
    }

    #[test]
    fn player_lookup_matches_fractional_ids() {
        let csv = "id,agent_id,agent_recording\n4.5,\"t,claude\",/claude/half.cast\n5,\"t,claude\",\n";
        let table = read_rows_from(csv.as_bytes()).unwrap();
        let dataset = Dataset::from_rows(&table.rows);
        let hit = dataset.lookup_player("", Some("4.50")).unwrap();
        assert_eq!(hit.agent_recording.as_deref(), Some("/claude/half.cast"));
        assert_eq!(dataset.find_by_id(5.0).and_then(|r| r.id), Some(5));
        assert!(dataset.find_by_id(4.0).is_none());
    }

    #[test]
    fn unique_values_are_sorted_and_skip_empty() {
        let table = read_rows_from(CSV.as_bytes()).unwrap();
        let dataset = Dataset::from_rows(&table.rows);
        assert_eq!(
            unique_agents(&dataset.all),
            vec!["terminus-2,claude", "terminus-2,gpt-5"]
        );
        assert_eq!(unique_levels(&dataset.all), vec!["class-level", "func-level"]);
        assert_eq!(unique_types(&dataset.all), vec!["mem", "time"]);
    }

    #[test]
    fn manifest_path_sits_next_to_dataset() {
        let p = default_manifest_path(Path::new("data/website_data.csv"));
        assert_eq!(p, PathBuf::from("data/website_data.csv.manifest.json"));
    }
}
