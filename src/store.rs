//! Observable state and the explorer context.
//!
//! Each mutable input (filter criteria, thresholds, selected agent) lives in
//! its own [`Writable`]. The [`Explorer`] owns them together with the
//! immutable dataset and re-derives the aggregates after every write,
//! recomputing only what depends on the inputs whose version moved.

use serde::Serialize;
use std::fmt;

use crate::data::{unique_agents, unique_levels, unique_types, AgentMedianStats, BenchmarkRecord, Dataset, MedianTable};
use crate::filter::FilterCriteria;
use crate::logging::{log, log_recompute, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::present::{self, LeaderboardEntry};
use crate::stats::{self, AdvantageByAgent, AdvantageByAgentAndLevel, Thresholds};

pub type SubscriptionId = u64;

type Subscriber<T> = Box<dyn FnMut(&T) + Send + Sync>;

/// A typed publisher: one writer, any number of subscribers.
pub struct Writable<T> {
    value: T,
    version: u64,
    next_id: SubscriptionId,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
}

impl<T: fmt::Debug> fmt::Debug for Writable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writable")
            .field("value", &self.value)
            .field("version", &self.version)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq> Writable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: 0,
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stores `value` and notifies subscribers. Returns false, without
    /// notifying, when the value is unchanged.
    pub fn set(&mut self, value: T) -> bool {
        if value == self.value {
            return false;
        }
        self.value = value;
        self.version += 1;
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&self.value);
        }
        true
    }

    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.value.clone();
        f(&mut next);
        self.set(next)
    }

    /// The callback sees the current value immediately, then every change.
    pub fn subscribe(&mut self, mut f: impl FnMut(&T) + Send + Sync + 'static) -> SubscriptionId {
        f(&self.value);
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }
}

/// Everything the charts and tables read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedStats {
    #[serde(skip)]
    pub filtered: Vec<BenchmarkRecord>,
    pub filtered_count: usize,
    pub total_count: usize,
    pub thresholds: Thresholds,
    pub mean_advantage: f64,
    pub by_agent: AdvantageByAgent,
    pub by_agent_and_level: AdvantageByAgentAndLevel,
    pub overall_by_agent: AdvantageByAgent,
}

impl DerivedStats {
    /// Full derivation for one set of inputs, outside any store.
    pub fn compute(dataset: &Dataset, criteria: &FilterCriteria, t: Thresholds) -> Self {
        let filtered = criteria.apply(&dataset.scatter);
        Self {
            filtered_count: filtered.len(),
            total_count: dataset.scatter.len(),
            thresholds: t,
            mean_advantage: stats::mean_advantage(&filtered, t),
            by_agent: stats::advantage_by_agent(&filtered, t),
            by_agent_and_level: stats::advantage_by_agent_and_level(&dataset.scatter, t),
            overall_by_agent: stats::overall_advantage_by_agent(dataset, t),
            filtered,
        }
    }
}

/// Input versions the current derivation was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seen {
    criteria: u64,
    thresholds: u64,
}

/// Application context for one exploration session.
///
/// Initialization order: dataset and median table, then the input stores
/// at their defaults, then the first derivation.
#[derive(Debug)]
pub struct Explorer {
    dataset: Dataset,
    medians: MedianTable,
    agents: Vec<String>,
    levels: Vec<String>,
    types: Vec<String>,
    criteria: Writable<FilterCriteria>,
    thresholds: Writable<Thresholds>,
    selected_agent: Writable<Option<String>>,
    derived: Writable<DerivedStats>,
    seen: Option<Seen>,
}

impl Explorer {
    pub fn new(dataset: Dataset, medians: MedianTable) -> Self {
        Self::with_thresholds(dataset, medians, Thresholds::default())
    }

    pub fn with_thresholds(dataset: Dataset, medians: MedianTable, thresholds: Thresholds) -> Self {
        let mut explorer = Self {
            agents: unique_agents(&dataset.scatter),
            levels: unique_levels(&dataset.scatter),
            types: unique_types(&dataset.scatter),
            dataset,
            medians,
            criteria: Writable::new(FilterCriteria::default()),
            thresholds: Writable::new(thresholds),
            selected_agent: Writable::new(None),
            derived: Writable::new(DerivedStats::default()),
            seen: None,
        };
        explorer.refresh();
        explorer
    }

    fn refresh(&mut self) {
        let now = Seen {
            criteria: self.criteria.version(),
            thresholds: self.thresholds.version(),
        };
        if self.seen == Some(now) {
            return;
        }
        let _scope = ProfileScope::with_context(
            "explorer.refresh",
            &[("total", serde_json::json!(self.dataset.scatter.len()))],
        );

        let t = *self.thresholds.get();
        let mut next = self.derived.get().clone();
        let criteria_moved = self.seen.map_or(true, |s| s.criteria != now.criteria);
        let thresholds_moved = self.seen.map_or(true, |s| s.thresholds != now.thresholds);

        if criteria_moved {
            next.filtered = self.criteria.get().apply(&self.dataset.scatter);
            next.filtered_count = next.filtered.len();
            next.total_count = self.dataset.scatter.len();
        }
        next.thresholds = t;
        next.mean_advantage = stats::mean_advantage(&next.filtered, t);
        next.by_agent = stats::advantage_by_agent(&next.filtered, t);
        if thresholds_moved {
            // leaderboard views stay put while filters change
            next.by_agent_and_level = stats::advantage_by_agent_and_level(&self.dataset.scatter, t);
            next.overall_by_agent = stats::overall_advantage_by_agent(&self.dataset, t);
        }

        log_recompute(
            next.filtered_count,
            next.total_count,
            next.mean_advantage,
            next.by_agent.len(),
        );
        self.derived.set(next);
        self.seen = Some(now);
    }

    // -------------------------------------------------------------------------
    // Writers
    // -------------------------------------------------------------------------

    pub fn set_criteria(&mut self, criteria: FilterCriteria) -> bool {
        let changed = self.criteria.set(criteria);
        if changed {
            self.log_criteria();
            self.refresh();
        }
        changed
    }

    pub fn update_criteria(&mut self, f: impl FnOnce(&mut FilterCriteria)) -> bool {
        let changed = self.criteria.update(f);
        if changed {
            self.log_criteria();
            self.refresh();
        }
        changed
    }

    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> bool {
        let changed = self.thresholds.set(thresholds);
        if changed {
            log(
                Level::Info,
                Domain::Filter,
                "thresholds_changed",
                obj(&[
                    ("agent", v_num(thresholds.agent)),
                    ("oracle", v_num(thresholds.oracle)),
                ]),
            );
            self.refresh();
        }
        changed
    }

    pub fn select_agent(&mut self, agent_id: Option<String>) -> bool {
        self.selected_agent.set(agent_id)
    }

    fn log_criteria(&self) {
        let c = self.criteria.get();
        log(
            Level::Debug,
            Domain::Filter,
            "criteria_changed",
            obj(&[
                ("agents", serde_json::json!(c.agents)),
                ("types", serde_json::json!(c.types)),
                ("levels", serde_json::json!(c.levels)),
                ("search", c.search.as_deref().map(v_str).unwrap_or_default()),
                ("version", serde_json::json!(self.criteria.version())),
            ]),
        );
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn subscribe_derived(
        &mut self,
        f: impl FnMut(&DerivedStats) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.derived.subscribe(f)
    }

    pub fn unsubscribe_derived(&mut self, id: SubscriptionId) -> bool {
        self.derived.unsubscribe(id)
    }

    pub fn subscribe_criteria(
        &mut self,
        f: impl FnMut(&FilterCriteria) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.criteria.subscribe(f)
    }

    pub fn subscribe_selected_agent(
        &mut self,
        f: impl FnMut(&Option<String>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.selected_agent.subscribe(f)
    }

    // -------------------------------------------------------------------------
    // Readers
    // -------------------------------------------------------------------------

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn medians(&self) -> &MedianTable {
        &self.medians
    }

    pub fn derived(&self) -> &DerivedStats {
        self.derived.get()
    }

    pub fn filtered(&self) -> &[BenchmarkRecord] {
        &self.derived.get().filtered
    }

    pub fn criteria(&self) -> &FilterCriteria {
        self.criteria.get()
    }

    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.get()
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected_agent.get().as_deref()
    }

    pub fn unique_agents(&self) -> &[String] {
        &self.agents
    }

    pub fn unique_levels(&self) -> &[String] {
        &self.levels
    }

    pub fn unique_types(&self) -> &[String] {
        &self.types
    }

    /// Precomputed medians when the table has the agent, else computed
    /// from the scatter set.
    pub fn agent_stats(&self, agent_id: &str) -> AgentMedianStats {
        self.medians
            .get(agent_id)
            .copied()
            .unwrap_or_else(|| stats::agent_stats(&self.dataset.scatter, agent_id))
    }

    pub fn aggregation_label(&self) -> String {
        let levels: Vec<&String> = self.criteria.get().levels.iter().collect();
        present::aggregation_label(levels.as_slice())
    }

    pub fn agent_copy_key(&self) -> Option<&'static str> {
        self.selected_agent().and_then(present::copy_key)
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let derived = self.derived.get();
        present::leaderboard(
            &derived.overall_by_agent,
            &derived.by_agent_and_level,
            |agent| self.medians.get(agent).copied(),
        )
    }
}
