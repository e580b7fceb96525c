//! Derived advantage statistics over the benchmark dataset.
//!
//! The advantage of a record is the signed perpendicular distance of its
//! `(agent/nop, oracle/nop)` point from the line through the origin with
//! direction `(agent_threshold, oracle_threshold)`. Points on the
//! agent-favoring side are positive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::{AgentMedianStats, BenchmarkRecord, Dataset};

/// The break-even line against which advantage is measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub agent: f64,
    pub oracle: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            agent: 1.0,
            oracle: 1.0,
        }
    }
}

impl Thresholds {
    pub fn new(agent: f64, oracle: f64) -> Self {
        Self { agent, oracle }
    }
}

pub type AdvantageByAgent = BTreeMap<String, f64>;
pub type AdvantageByAgentAndLevel = BTreeMap<String, BTreeMap<String, f64>>;

/// Signed distance from the threshold line. Absent inputs, and the
/// non-finite result of a degenerate `(0, 0)` threshold, yield `None`.
pub fn distance(agent: Option<f64>, oracle: Option<f64>, t: Thresholds) -> Option<f64> {
    let (a, o) = (agent?, oracle?);
    let numerator = (t.oracle * a) - (t.agent * o);
    let denominator = (t.agent.powi(2) + t.oracle.powi(2)).sqrt();
    let d = numerator / denominator;
    d.is_finite().then_some(d)
}

pub fn record_distance(record: &BenchmarkRecord, t: Thresholds) -> Option<f64> {
    distance(record.agent_nop, record.oracle_nop, t)
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Mean advantage over every record yielding a distance; 0 when none do.
pub fn mean_advantage(records: &[BenchmarkRecord], t: Thresholds) -> f64 {
    let mut mean = Mean::default();
    for d in records.iter().filter_map(|r| record_distance(r, t)) {
        mean.push(d);
    }
    mean.value().unwrap_or(0.0)
}

/// Per-agent mean. Agents without a single valid distance are omitted.
pub fn advantage_by_agent(records: &[BenchmarkRecord], t: Thresholds) -> AdvantageByAgent {
    let mut groups: BTreeMap<&str, Mean> = BTreeMap::new();
    for record in records {
        let Some(agent) = record.agent() else { continue };
        let group = groups.entry(agent).or_default();
        if let Some(d) = record_distance(record, t) {
            group.push(d);
        }
    }
    groups
        .into_iter()
        .filter_map(|(agent, mean)| Some((agent.to_string(), mean.value()?)))
        .collect()
}

/// Agent → level → mean. Records without an agent or a level take no part.
pub fn advantage_by_agent_and_level(
    records: &[BenchmarkRecord],
    t: Thresholds,
) -> AdvantageByAgentAndLevel {
    let mut groups: BTreeMap<&str, BTreeMap<&str, Mean>> = BTreeMap::new();
    for record in records {
        let (Some(agent), Some(level)) = (record.agent(), record.level()) else {
            continue;
        };
        let group = groups.entry(agent).or_default().entry(level).or_default();
        if let Some(d) = record_distance(record, t) {
            group.push(d);
        }
    }

    let mut result = AdvantageByAgentAndLevel::new();
    for (agent, levels) in groups {
        let means: BTreeMap<String, f64> = levels
            .into_iter()
            .filter_map(|(level, mean)| Some((level.to_string(), mean.value()?)))
            .collect();
        if !means.is_empty() {
            result.insert(agent.to_string(), means);
        }
    }
    result
}

/// Per-agent advantage over the whole scatter set, ignoring any filter.
pub fn overall_advantage_by_agent(dataset: &Dataset, t: Thresholds) -> AdvantageByAgent {
    advantage_by_agent(&dataset.scatter, t)
}

/// Median of already-sorted values; 0 for an empty slice.
pub fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 != 0 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v
}

/// Count and medians for one agent, computed from the records themselves.
pub fn agent_stats(records: &[BenchmarkRecord], agent_id: &str) -> AgentMedianStats {
    let rows: Vec<&BenchmarkRecord> = records
        .iter()
        .filter(|r| r.agent() == Some(agent_id))
        .collect();
    if rows.is_empty() {
        return AgentMedianStats::default();
    }

    let agent_nops = sorted(rows.iter().filter_map(|r| r.agent_nop));
    let oracle_nops = sorted(rows.iter().filter_map(|r| r.oracle_nop));

    AgentMedianStats {
        count: rows.len() as u64,
        median_agent_nop: median(&agent_nops),
        median_oracle_nop: median(&oracle_nops),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn rec(agent: &str, level: Option<&str>, a: Option<f64>, o: Option<f64>) -> BenchmarkRecord {
        BenchmarkRecord {
            agent_id: Some(agent.to_string()),
            level: level.map(str::to_string),
            agent_nop: a,
            oracle_nop: o,
            ..Default::default()
        }
    }

    #[test]
    fn distance_matches_reference_points() {
        let t = Thresholds::default();
        let d1 = distance(Some(2.0), Some(1.0), t).unwrap();
        let d2 = distance(Some(0.5), Some(1.0), t).unwrap();
        assert!((d1 - 1.0 / 2f64.sqrt()).abs() < EPS);
        assert!((d2 + 0.5 / 2f64.sqrt()).abs() < EPS);
    }

    #[test]
    fn distance_is_absent_for_missing_inputs() {
        let t = Thresholds::default();
        assert_eq!(distance(None, Some(1.0), t), None);
        assert_eq!(distance(Some(1.0), None, t), None);
    }

    #[test]
    fn degenerate_thresholds_yield_absent() {
        assert_eq!(distance(Some(2.0), Some(1.0), Thresholds::new(0.0, 0.0)), None);
        let records = vec![rec("x,claude", None, Some(2.0), Some(1.0))];
        assert_eq!(mean_advantage(&records, Thresholds::new(0.0, 0.0)), 0.0);
        assert!(advantage_by_agent(&records, Thresholds::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn distance_is_linear_in_each_speedup() {
        let t = Thresholds::new(1.3, 0.7);
        let (o, a1, a2, k) = (1.4, 0.9, 2.6, 3.0);
        let base = distance(Some(0.0), Some(o), t).unwrap();
        let lhs = distance(Some(a1 + k * a2), Some(o), t).unwrap() - base;
        let rhs = (distance(Some(a1), Some(o), t).unwrap() - base)
            + k * (distance(Some(a2), Some(o), t).unwrap() - base);
        assert!((lhs - rhs).abs() < EPS);

        let a = 1.1;
        let base = distance(Some(a), Some(0.0), t).unwrap();
        let lhs = distance(Some(a), Some(a1 + k * a2), t).unwrap() - base;
        let rhs = (distance(Some(a), Some(a1), t).unwrap() - base)
            + k * (distance(Some(a), Some(a2), t).unwrap() - base);
        assert!((lhs - rhs).abs() < EPS);
    }

    #[test]
    fn distance_is_scale_invariant_in_thresholds() {
        let t = Thresholds::new(1.2, 0.8);
        for scale in [0.01, 0.5, 3.0, 1000.0] {
            let scaled = Thresholds::new(t.agent * scale, t.oracle * scale);
            let d = distance(Some(1.7), Some(0.6), t).unwrap();
            let ds = distance(Some(1.7), Some(0.6), scaled).unwrap();
            assert!((d - ds).abs() < EPS, "scale {}", scale);
        }
    }

    #[test]
    fn empty_input_has_defined_defaults() {
        let t = Thresholds::default();
        assert_eq!(mean_advantage(&[], t), 0.0);
        assert!(advantage_by_agent(&[], t).is_empty());
        assert!(advantage_by_agent_and_level(&[], t).is_empty());
    }

    #[test]
    fn grouped_means_reproduce_overall_mean() {
        let t = Thresholds::new(1.0, 1.5);
        let records = vec![
            rec("a,one", None, Some(1.2), Some(0.9)),
            rec("a,one", None, Some(0.4), Some(1.3)),
            rec("b,two", None, Some(2.2), Some(1.0)),
            rec("c,three", None, Some(0.9), Some(0.95)),
            rec("c,three", None, Some(1.05), Some(3.0)),
            rec("c,three", None, Some(1.5), Some(1.1)),
        ];
        let by_agent = advantage_by_agent(&records, t);
        let weighted: f64 = by_agent
            .iter()
            .map(|(agent, mean)| {
                let n = records.iter().filter(|r| r.agent() == Some(agent)).count();
                n as f64 * mean
            })
            .sum();
        let overall = mean_advantage(&records, t);
        assert!((weighted / records.len() as f64 - overall).abs() < EPS);
    }

    #[test]
    fn two_record_example() {
        let t = Thresholds::default();
        let records = vec![
            rec("x,claude", Some("func-level"), Some(2.0), Some(1.0)),
            rec("x,claude", Some("func-level"), Some(0.5), Some(1.0)),
        ];
        let by_agent = advantage_by_agent(&records, t);
        assert!((by_agent["x,claude"] - 0.1767766952966369).abs() < 1e-12);
        let by_level = advantage_by_agent_and_level(&records, t);
        assert!((by_level["x,claude"]["func-level"] - 0.1767766952966369).abs() < 1e-12);
    }

    #[test]
    fn agents_without_valid_distances_are_omitted() {
        let t = Thresholds::default();
        let records = vec![
            rec("a,one", Some("func-level"), Some(1.0), None),
            rec("b,two", Some("func-level"), Some(1.5), Some(1.0)),
        ];
        let by_agent = advantage_by_agent(&records, t);
        assert_eq!(by_agent.keys().collect::<Vec<_>>(), vec!["b,two"]);
        let by_level = advantage_by_agent_and_level(&records, t);
        assert!(!by_level.contains_key("a,one"));
    }

    #[test]
    fn level_grouping_drops_records_without_level() {
        let t = Thresholds::default();
        let records = vec![
            rec("a,one", None, Some(3.0), Some(1.0)),
            rec("a,one", Some("class-level"), Some(1.0), Some(1.0)),
        ];
        let by_level = advantage_by_agent_and_level(&records, t);
        assert_eq!(by_level["a,one"].len(), 1);
        assert_eq!(by_level["a,one"]["class-level"], 0.0);
        // the per-agent grouping still counts the level-less record
        assert!(advantage_by_agent(&records, t)["a,one"] > 0.0);
    }

    #[test]
    fn median_handles_odd_even_and_empty() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[1.0, 2.0, 9.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 9.0]), 2.5);
    }

    #[test]
    fn agent_stats_counts_all_rows_and_medians_present_values() {
        let records = vec![
            rec("a,one", None, Some(3.0), Some(1.0)),
            rec("a,one", None, Some(1.0), None),
            rec("a,one", None, Some(2.0), Some(2.0)),
            rec("b,two", None, Some(9.0), Some(9.0)),
        ];
        let stats = agent_stats(&records, "a,one");
        assert_eq!(stats.count, 3);
        assert_eq!(stats.median_agent_nop, 2.0);
        assert_eq!(stats.median_oracle_nop, 1.5);
        assert_eq!(agent_stats(&records, "zzz"), AgentMedianStats::default());
    }
}
