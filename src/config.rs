use crate::stats::Thresholds;

#[derive(Clone, Debug)]
pub struct Config {
    pub data_path: String,
    pub median_path: String,
    pub recordings_root: String,
    pub bind_addr: String,
    pub agent_threshold: f64,
    pub oracle_threshold: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_path: std::env::var("BENCH_DATA").unwrap_or_else(|_| "data/website_data.csv".to_string()),
            median_path: std::env::var("MEDIAN_DATA").unwrap_or_else(|_| "data/median_data.csv".to_string()),
            recordings_root: std::env::var("RECORDINGS_ROOT").unwrap_or_else(|_| "data/recordings".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8766".to_string()),
            agent_threshold: std::env::var("AGENT_THRESH").ok().and_then(|v| v.parse().ok()).unwrap_or(1.0),
            oracle_threshold: std::env::var("ORACLE_THRESH").ok().and_then(|v| v.parse().ok()).unwrap_or(1.0),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.agent_threshold, self.oracle_threshold)
    }
}
