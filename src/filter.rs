use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::{code_names, BenchmarkRecord};

/// Inclusive `[min, max]` bound on a speedup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedupRange {
    pub min: f64,
    pub max: f64,
}

impl SpeedupRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Slider extent offered for both speedup ranges.
pub const DEFAULT_SLIDER_RANGE: SpeedupRange = SpeedupRange { min: 0.0, max: 3.0 };

/// The user's exploratory subset. Empty sets and absent values do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub agents: BTreeSet<String>,
    pub types: BTreeSet<String>,
    pub levels: BTreeSet<String>,
    pub search: Option<String>,
    pub agent_range: Option<SpeedupRange>,
    pub oracle_range: Option<SpeedupRange>,
}

fn in_set(set: &BTreeSet<String>, value: Option<&str>) -> bool {
    set.is_empty() || value.is_some_and(|v| set.contains(v))
}

fn in_range(range: Option<SpeedupRange>, value: Option<f64>) -> bool {
    match range {
        None => true,
        Some(r) => value.is_some_and(|v| r.contains(v)),
    }
}

impl FilterCriteria {
    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_levels<I, S>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.levels = levels.into_iter().map(Into::into).collect();
        self
    }

    /// A blank term clears the search.
    pub fn with_search(mut self, term: &str) -> Self {
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_string());
        self
    }

    pub fn with_agent_range(mut self, range: SpeedupRange) -> Self {
        self.agent_range = Some(range);
        self
    }

    pub fn with_oracle_range(mut self, range: SpeedupRange) -> Self {
        self.oracle_range = Some(range);
        self
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    fn matches_search(&self, record: &BenchmarkRecord) -> bool {
        let Some(term) = self.search.as_deref() else {
            return true;
        };
        let needle = term.to_lowercase();
        let in_path = record
            .decomposition
            .as_deref()
            .is_some_and(|p| p.to_lowercase().contains(&needle));
        in_path
            || record
                .benchmark_codes
                .as_deref()
                .map(code_names)
                .unwrap_or_default()
                .iter()
                .any(|name| name.to_lowercase().contains(&needle))
    }

    pub fn passes(&self, record: &BenchmarkRecord) -> bool {
        in_set(&self.agents, record.agent())
            && in_set(&self.types, record.benchmark_type())
            && in_set(&self.levels, record.level())
            && in_range(self.agent_range, record.agent_nop)
            && in_range(self.oracle_range, record.oracle_nop)
            && self.matches_search(record)
    }

    /// Order-preserving subset of the records passing every constraint.
    pub fn apply(&self, records: &[BenchmarkRecord]) -> Vec<BenchmarkRecord> {
        records.iter().filter(|r| self.passes(r)).cloned().collect()
    }
}

pub fn passes_filter(record: &BenchmarkRecord, criteria: &FilterCriteria) -> bool {
    criteria.passes(record)
}
