use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::read_rows;
use super::record::{RawRow, RawValue, COL_AGENT_ID};

/// Precomputed per-agent aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMedianStats {
    pub count: u64,
    pub median_agent_nop: f64,
    pub median_oracle_nop: f64,
}

/// `agent_id → AgentMedianStats`, one entry per distinct agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedianTable {
    stats: BTreeMap<String, AgentMedianStats>,
}

/// First non-null value among the column aliases, as a finite number.
/// Missing or unparseable sub-fields read as 0.
fn number(row: &RawRow, aliases: &[&str]) -> f64 {
    let value = aliases
        .iter()
        .find_map(|key| row.get(*key).filter(|v| !v.is_null()));
    let parsed = match value {
        Some(RawValue::Number(n)) => *n,
        Some(RawValue::Text(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

impl MedianTable {
    pub fn from_rows(rows: &[RawRow]) -> Self {
        let mut stats = BTreeMap::new();
        for row in rows {
            let Some(agent_id) = row.get(COL_AGENT_ID).and_then(RawValue::as_text) else {
                continue;
            };
            let count = number(row, &["count"]);
            let parsed = AgentMedianStats {
                count: if count > 0.0 { count as u64 } else { 0 },
                median_agent_nop: number(row, &["median_agent_nop", "medianAgentNop"]),
                median_oracle_nop: number(row, &["median_oracle_nop", "medianOracleNop"]),
            };
            // later rows win on duplicate agents
            stats.insert(agent_id, parsed);
        }
        Self { stats }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let table = read_rows(path)
            .with_context(|| format!("reading median table {}", path.display()))?;
        Ok(Self::from_rows(&table.rows))
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentMedianStats> {
        self.stats.get(agent_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AgentMedianStats)> {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
            .collect()
    }

    #[test]
    fn parses_rows_and_skips_missing_agent() {
        let table = MedianTable::from_rows(&[
            row(&[
                ("agent_id", "terminus-2,claude"),
                ("count", "120"),
                ("median_agent_nop", "1.02"),
                ("median_oracle_nop", "1.10"),
            ]),
            row(&[("agent_id", ""), ("count", "5")]),
            row(&[("count", "9")]),
        ]);
        assert_eq!(table.len(), 1);
        let stats = table.get("terminus-2,claude").unwrap();
        assert_eq!(stats.count, 120);
        assert_eq!(stats.median_agent_nop, 1.02);
        assert_eq!(stats.median_oracle_nop, 1.10);
    }

    #[test]
    fn missing_numbers_default_to_zero() {
        let table = MedianTable::from_rows(&[row(&[("agent_id", "terminus-2,gpt-5")])]);
        assert_eq!(
            table.get("terminus-2,gpt-5"),
            Some(&AgentMedianStats::default())
        );
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let table = MedianTable::from_rows(&[row(&[
            ("agent_id", "terminus-2,oracle"),
            ("medianAgentNop", "1.5"),
            ("medianOracleNop", "1.5"),
        ])]);
        assert_eq!(table.get("terminus-2,oracle").unwrap().median_agent_nop, 1.5);
    }

    #[test]
    fn duplicate_agents_keep_last_row() {
        let table = MedianTable::from_rows(&[
            row(&[("agent_id", "a,b"), ("count", "1")]),
            row(&[("agent_id", "a,b"), ("count", "2")]),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a,b").unwrap().count, 2);
    }
}
