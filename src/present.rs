//! Display mapping for agent identifiers, aggregation levels and advantage values.

use serde::Serialize;

use crate::data::AgentMedianStats;
use crate::stats::{AdvantageByAgent, AdvantageByAgentAndLevel};

pub const AGENT_CLAUDE: &str = "terminus-2,claude";
pub const AGENT_GPT5: &str = "terminus-2,gpt-5";
pub const AGENT_HUMAN: &str = "terminus-2,oracle";

/// Benchmark used as the human reference point in the narrative.
pub const HUMAN_ANCHOR_BENCHMARK: &str = "dtypes.SelectDtypes.time_select_dtype_string_exclude";

pub const LEVEL_ORDER: [&str; 4] = ["param-level", "func-level", "class-level", "module-level"];

pub const ADVANTAGE_HIGH: f64 = 0.1;
pub const ADVANTAGE_MEDIUM: f64 = 0.0;

pub const NEUTRAL_MIN: f64 = 0.95;
pub const NEUTRAL_MAX: f64 = 1.05;

const MISSING: &str = "—";

/// Scroll steps that narrow the chart to a single agent.
pub fn step_agent_filter(step: u32) -> Option<&'static str> {
    match step {
        9 => Some(AGENT_HUMAN),
        10 => Some(AGENT_CLAUDE),
        11 => Some(AGENT_GPT5),
        _ => None,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capitalize_words(s: &str) -> String {
    s.split('-').map(capitalize).collect::<Vec<_>>().join(" ")
}

fn split_agent(agent_id: &str) -> (&str, &str) {
    let mut parts = agent_id.split(',').map(str::trim);
    let runner = parts.next().unwrap_or_default();
    let model = parts.next().unwrap_or_default();
    (runner, model)
}

/// `"terminus-2,gpt-5"` → `"Terminus 2 - GPT-5"`.
pub fn display_name(agent_id: &str) -> String {
    if agent_id.is_empty() {
        return String::new();
    }
    let (runner, model) = split_agent(agent_id);
    let model = match model.to_lowercase().as_str() {
        "oracle" => "Oracle".to_string(),
        "gpt-5" | "gpt5" => "GPT-5".to_string(),
        "gpt-4" | "gpt4" => "GPT-4".to_string(),
        "claude" => "Claude Sonnet 4.0".to_string(),
        "claude-3.5" | "claude-3-5" => "Claude Sonnet 3.5".to_string(),
        _ => capitalize_words(model),
    };
    format!("{} - {}", capitalize_words(runner), model)
}

/// The model half of an agent id, or the whole id when there is no comma.
pub fn short_name(agent_id: &str) -> String {
    match agent_id.split_once(',') {
        Some((_, model)) => model.split(',').next().unwrap_or_default().trim().to_string(),
        None => agent_id.to_string(),
    }
}

pub fn color_for(agent_id: &str) -> &'static str {
    match short_name(agent_id).to_lowercase().as_str() {
        "oracle" => "#2E7D32",
        "claude" | "claude-3.5" | "claude-3-5" => "#D97757",
        "gpt-5" | "gpt5" => "#1976D2",
        "gpt-4" | "gpt4" => "#7B1FA2",
        _ => "#9E9E9E",
    }
}

/// Narrative key for an agent's write-up.
pub fn copy_key(agent_id: &str) -> Option<&'static str> {
    let (_, model) = agent_id.split_once(',')?;
    match model.trim().to_lowercase().as_str() {
        "gpt-5" => Some("gpt5"),
        "claude" => Some("claude"),
        "oracle" => Some("oracle"),
        _ => None,
    }
}

pub fn level_label(level: &str) -> String {
    match level {
        "no-aggregation" => "No Aggregation",
        "param-level" => "L1: Parameter",
        "func-level" => "L2: Function",
        "class-level" => "L3: Class",
        "module-level" => "L4: Module",
        other => return other.to_string(),
    }
    .to_string()
}

/// Heading for the currently selected aggregation level (single select).
pub fn aggregation_label<S: AsRef<str>>(selected: &[S]) -> String {
    let Some(level) = selected.first().map(AsRef::as_ref) else {
        return "None".to_string();
    };
    match level {
        "no-aggregation" => "No Aggregation",
        "param-level" => "L1: Groupby params",
        "func-level" => "L2: Groupby func",
        "class-level" => "L3: Groupby class",
        "module-level" => "L4: Groupby module",
        other => return other.to_string(),
    }
    .to_string()
}

/// Four decimals with exact halves rounded away from zero.
fn fixed4(v: f64) -> String {
    // a double sits exactly halfway at the fifth decimal iff 32 * abs(v) is odd
    let scaled = v.abs() * 32.0;
    if scaled.fract() == 0.0 && scaled % 2.0 == 1.0 && scaled < 9.0e15 {
        let n = (v.abs() * 1e4).round() as u64;
        let sign = if v < 0.0 { "-" } else { "" };
        return format!("{}{}.{:04}", sign, n / 10_000, n % 10_000);
    }
    format!("{:.4}", v)
}

pub fn format_advantage(value: Option<f64>) -> String {
    match value {
        // avoid "-0.0000" for negative zero
        Some(v) if v == 0.0 => fixed4(0.0),
        Some(v) => fixed4(v),
        None => MISSING.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellClass {
    High,
    Medium,
    Low,
}

impl CellClass {
    pub fn classify(value: f64) -> Self {
        if value >= ADVANTAGE_HIGH {
            CellClass::High
        } else if value >= ADVANTAGE_MEDIUM {
            CellClass::Medium
        } else {
            CellClass::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CellClass::High => "high",
            CellClass::Medium => "medium",
            CellClass::Low => "low",
        }
    }
}

pub fn cell_class(value: Option<f64>) -> &'static str {
    value.map(|v| CellClass::classify(v).as_str()).unwrap_or("")
}

/// Ratio close enough to 1 to read as equivalent performance.
pub fn is_neutral_ratio(ratio: f64) -> bool {
    (NEUTRAL_MIN..=NEUTRAL_MAX).contains(&ratio)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCell {
    pub level: String,
    pub label: String,
    pub value: Option<f64>,
    pub formatted: String,
    pub cell_class: &'static str,
}

/// One leaderboard row, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub agent_id: String,
    pub display_name: String,
    pub short_name: String,
    pub color: &'static str,
    pub advantage: f64,
    pub formatted: String,
    pub cell_class: &'static str,
    pub levels: Vec<LevelCell>,
    pub medians: Option<AgentMedianStats>,
}

/// Agents ordered by overall advantage, best first, with one cell per
/// level in [`LEVEL_ORDER`].
pub fn leaderboard(
    overall: &AdvantageByAgent,
    by_level: &AdvantageByAgentAndLevel,
    medians: impl Fn(&str) -> Option<AgentMedianStats>,
) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<LeaderboardEntry> = overall
        .iter()
        .map(|(agent_id, &advantage)| {
            let levels = LEVEL_ORDER
                .iter()
                .map(|level| {
                    let value = by_level.get(agent_id).and_then(|m| m.get(*level)).copied();
                    LevelCell {
                        level: level.to_string(),
                        label: level_label(level),
                        value,
                        formatted: format_advantage(value),
                        cell_class: cell_class(value),
                    }
                })
                .collect();
            LeaderboardEntry {
                agent_id: agent_id.clone(),
                display_name: display_name(agent_id),
                short_name: short_name(agent_id),
                color: color_for(agent_id),
                advantage,
                formatted: format_advantage(Some(advantage)),
                cell_class: cell_class(Some(advantage)),
                levels,
                medians: medians(agent_id),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.advantage.total_cmp(&a.advantage));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_for_known_models() {
        assert_eq!(display_name("terminus-2,oracle"), "Terminus 2 - Oracle");
        assert_eq!(display_name("terminus-2,gpt-5"), "Terminus 2 - GPT-5");
        assert_eq!(display_name("terminus-2,claude"), "Terminus 2 - Claude Sonnet 4.0");
        assert_eq!(display_name("openhands, claude-3-5"), "Openhands - Claude Sonnet 3.5");
    }

    #[test]
    fn unknown_agents_fall_back_to_capitalization() {
        assert_eq!(display_name("my-runner,big-model"), "My Runner - Big Model");
        assert_eq!(display_name("solo"), "Solo - ");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn short_names() {
        assert_eq!(short_name("terminus-2, oracle"), "oracle");
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn colors_fall_back_to_grey() {
        assert_eq!(color_for(AGENT_CLAUDE), "#D97757");
        assert_eq!(color_for("x,unknown"), "#9E9E9E");
    }

    #[test]
    fn copy_keys() {
        assert_eq!(copy_key(AGENT_GPT5), Some("gpt5"));
        assert_eq!(copy_key(AGENT_HUMAN), Some("oracle"));
        assert_eq!(copy_key("terminus-2,gpt-4"), None);
        assert_eq!(copy_key("nocomma"), None);
    }

    #[test]
    fn level_labels() {
        assert_eq!(level_label("func-level"), "L2: Function");
        assert_eq!(level_label("weird"), "weird");
        assert_eq!(aggregation_label::<&str>(&[]), "None");
        assert_eq!(aggregation_label(&["class-level", "func-level"]), "L3: Groupby class");
    }

    #[test]
    fn advantage_formatting() {
        assert_eq!(format_advantage(None), "—");
        assert_eq!(format_advantage(Some(1.23456)), "1.2346");
        assert_eq!(format_advantage(Some(-0.0)), "0.0000");
        assert_eq!(format_advantage(Some(-0.353553)), "-0.3536");
    }

    #[test]
    fn exact_halves_round_away_from_zero() {
        assert_eq!(format_advantage(Some(0.03125)), "0.0313");
        assert_eq!(format_advantage(Some(-0.03125)), "-0.0313");
        assert_eq!(format_advantage(Some(1.15625)), "1.1563");
        assert_eq!(format_advantage(Some(0.5)), "0.5000");
        assert_eq!(format_advantage(Some(0.0625)), "0.0625");
    }

    #[test]
    fn cell_classes_use_fixed_tiers() {
        assert_eq!(cell_class(Some(0.1)), "high");
        assert_eq!(cell_class(Some(0.0)), "medium");
        assert_eq!(cell_class(Some(0.0999)), "medium");
        assert_eq!(cell_class(Some(-0.01)), "low");
        assert_eq!(cell_class(None), "");
    }

    #[test]
    fn neutral_band_is_inclusive() {
        assert!(is_neutral_ratio(0.95));
        assert!(is_neutral_ratio(1.05));
        assert!(!is_neutral_ratio(1.06));
    }

    #[test]
    fn leaderboard_orders_by_advantage_and_fills_levels() {
        let overall: AdvantageByAgent =
            [("t,gpt-5".to_string(), -0.2), ("t,claude".to_string(), 0.15)].into_iter().collect();
        let mut by_level = AdvantageByAgentAndLevel::new();
        by_level
            .entry("t,claude".to_string())
            .or_default()
            .insert("func-level".to_string(), 0.05);
        let rows = leaderboard(&overall, &by_level, |agent| {
            (agent == "t,claude").then(AgentMedianStats::default)
        });
        assert_eq!(rows[0].agent_id, "t,claude");
        assert_eq!(rows[0].cell_class, "high");
        assert_eq!(rows[0].levels.len(), 4);
        assert_eq!(rows[0].levels[1].formatted, "0.0500");
        assert_eq!(rows[0].levels[1].cell_class, "medium");
        assert_eq!(rows[0].levels[0].formatted, "—");
        assert!(rows[0].medians.is_some());
        assert_eq!(rows[1].formatted, "-0.2000");
        assert!(rows[1].medians.is_none());
    }

    #[test]
    fn scroll_steps() {
        assert_eq!(step_agent_filter(10), Some(AGENT_CLAUDE));
        assert_eq!(step_agent_filter(3), None);
    }
}
