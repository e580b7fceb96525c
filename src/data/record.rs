use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const COL_ID: &str = "id";
pub const COL_AGENT_ID: &str = "agent_id";
pub const COL_LEVEL: &str = "level";
pub const COL_BENCHMARK_TYPE: &str = "benchmark_type";
pub const COL_AGENT_NOP: &str = "agent/nop";
pub const COL_ORACLE_NOP: &str = "oracle/nop";
pub const COL_BENCHMARK_CODES: &str = "benchmark_codes";
pub const COL_DECOMPOSED: &str = "benchmark_decomposed";
/// Misspelled header still present in published exports.
pub const COL_DECOMPOSED_LEGACY: &str = "benchmark_decoposed";
pub const COL_AGENT_RECORDING: &str = "agent_recording";

const KNOWN_COLUMNS: [&str; 10] = [
    COL_ID,
    COL_AGENT_ID,
    COL_LEVEL,
    COL_BENCHMARK_TYPE,
    COL_AGENT_NOP,
    COL_ORACLE_NOP,
    COL_BENCHMARK_CODES,
    COL_DECOMPOSED,
    COL_DECOMPOSED_LEGACY,
    COL_AGENT_RECORDING,
];

/// One cell of an ingested row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Null,
}

impl RawValue {
    /// Non-empty textual form; numbers are rendered the way they were parsed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Text(s) if !s.is_empty() => Some(s.clone()),
            RawValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            RawValue::Null
        } else {
            RawValue::Text(s.to_string())
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

pub type RawRow = BTreeMap<String, RawValue>;

/// Longest leading decimal literal of `s` after leading whitespace:
/// `[+-]?(digits[.digits]|.digits)([eE][+-]?digits)?`. Trailing text such
/// as a unit suffix is ignored; an incomplete exponent is left off.
fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_end = int_end;
    if bytes.get(int_end) == Some(&b'.') {
        mantissa_end = digits_from(int_end + 1);
    }
    // a lone sign or dot carries no digits
    if mantissa_end - end <= usize::from(mantissa_end > int_end) {
        return None;
    }
    end = mantissa_end;

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok()
}

/// Numbers are kept, strings are read up to their first non-numeric
/// character; anything non-finite is absent.
pub fn coerce_speedup(value: &RawValue) -> Option<f64> {
    let parsed = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => leading_float(s)?,
        RawValue::Null => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Exact numeric value of an id cell, integral or not.
pub fn coerce_numeric_id(value: &RawValue) -> Option<f64> {
    let parsed = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        RawValue::Null => return None,
    };
    parsed.is_finite().then_some(parsed)
}

pub fn coerce_id(value: &RawValue) -> Option<i64> {
    match value {
        RawValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| coerce_id(&RawValue::Number(s.parse::<f64>().ok()?)))
        }
        RawValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

/// One measured benchmark instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub id: Option<i64>,
    /// The id cell as a number, kept for lookups when it is not integral.
    #[serde(skip)]
    pub numeric_id: Option<f64>,
    pub agent_id: Option<String>,
    pub level: Option<String>,
    pub benchmark_type: Option<String>,
    #[serde(rename = "agent/nop")]
    pub agent_nop: Option<f64>,
    #[serde(rename = "oracle/nop")]
    pub oracle_nop: Option<f64>,
    pub benchmark_codes: Option<String>,
    #[serde(rename = "benchmark_decomposed")]
    pub decomposition: Option<String>,
    pub agent_recording: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, RawValue>,
}

impl BenchmarkRecord {
    pub fn from_row(row: &RawRow) -> Self {
        let text = |key: &str| row.get(key).and_then(RawValue::as_text);
        let speedup = |key: &str| row.get(key).and_then(coerce_speedup);

        let extra = row
            .iter()
            .filter(|(k, _)| !KNOWN_COLUMNS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            id: row.get(COL_ID).and_then(coerce_id),
            numeric_id: row.get(COL_ID).and_then(coerce_numeric_id),
            agent_id: text(COL_AGENT_ID),
            level: text(COL_LEVEL),
            benchmark_type: text(COL_BENCHMARK_TYPE),
            agent_nop: speedup(COL_AGENT_NOP),
            oracle_nop: speedup(COL_ORACLE_NOP),
            benchmark_codes: text(COL_BENCHMARK_CODES),
            decomposition: text(COL_DECOMPOSED).or_else(|| text(COL_DECOMPOSED_LEGACY)),
            agent_recording: text(COL_AGENT_RECORDING),
            extra,
        }
    }

    /// Both speedups present: eligible for scatter and statistics views.
    pub fn has_speedups(&self) -> bool {
        self.agent_nop.is_some() && self.oracle_nop.is_some()
    }

    /// Numeric id compared against a requested benchmark id.
    pub fn lookup_id(&self) -> Option<f64> {
        self.numeric_id.or(self.id.map(|v| v as f64))
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn benchmark_type(&self) -> Option<&str> {
        self.benchmark_type.as_deref()
    }
}
