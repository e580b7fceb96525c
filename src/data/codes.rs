//! Decoding of the `benchmark_codes` column: a JSON object mapping
//! benchmark names to their source snippets.

use serde_json::{Map, Value};

use crate::logging::{log, obj, v_str, Domain, Level};

/// Name → code pairs in document order. Malformed JSON yields nothing.
pub fn parse_benchmark_codes(codes: &str) -> Vec<(String, String)> {
    if codes.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Map<String, Value>>(codes) {
        Ok(map) => map
            .into_iter()
            .map(|(name, code)| {
                let code = match code {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, code)
            })
            .collect(),
        Err(err) => {
            log(
                Level::Warn,
                Domain::Data,
                "benchmark_codes_invalid",
                obj(&[("msg", v_str("Failed to parse benchmark_codes")), ("error", v_str(&err.to_string()))]),
            );
            Vec::new()
        }
    }
}

/// The first snippet, or an empty string.
pub fn main_code(codes: &str) -> String {
    parse_benchmark_codes(codes)
        .into_iter()
        .next()
        .map(|(_, code)| code)
        .unwrap_or_default()
}

pub fn code_names(codes: &str) -> Vec<String> {
    parse_benchmark_codes(codes)
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}
