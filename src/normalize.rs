//! Reshaping of management API payloads into flat event records.
//!
//! Every collector funnels its payloads through [`Normalizer::merge`], which
//! drops redundant identity keys, renames keys to a stable snake-case
//! vocabulary and stamps the canonical `timestamp` and `array_id`.
//!
//! Payloads are ordered maps of JSON values, so key order in an emitted
//! record follows the order the sources were merged in.

use serde::Serialize;
use serde_json::{Map, Value};

/// A loosely structured mapping returned by the management API.
pub type Payload = Map<String, Value>;

/// Value written in place of empty strings.
pub const NOT_AVAILABLE: &str = "N/A";

/// Snake-cased identity keys that every source repeats; only the canonical
/// values set by [`Normalizer`] survive a merge.
const IDENTITY_KEYS: &[&str] = &["array_id", "symmetrix_id", "symm_id", "array", "timestamp"];

/// Bookkeeping fields that wrap a performance result.
const PERFORMANCE_WRAPPER_KEYS: &[&str] = &[
    "result",
    "reporting_level",
    "count",
    "max_page_size",
    "expiration_time",
    "id",
    "from",
    "to",
];

/// Historical key inconsistencies and their stable replacements.
const KEY_RENAMES: &[(&str, &str)] = &[
    ("host_i_os", "host_ios"),
    ("host_m_bs", "host_mbs"),
    ("host_io_limit_i_os", "host_io_limit_ios"),
    ("host_io_limit_m_bs", "host_io_limit_mbs"),
    ("be_i_os", "be_ios"),
    ("be_m_bs", "be_mbs"),
    ("i_os", "ios"),
    ("m_bs", "mbs"),
    ("read_m_bs", "read_mbs"),
    ("write_m_bs", "write_mbs"),
    ("percent_re4ad_reqs", "percent_read_reqs"),
    ("compresion_ratio_to_one", "compression_ratio_to_one"),
    ("overall_efficency_ratio_to_one", "overall_efficiency_ratio_to_one"),
    ("num_of_masking_view", "num_of_masking_views"),
    ("num_of_initiator", "num_of_initiators"),
    ("num_of_host", "num_of_hosts"),
    ("num_of_port", "num_of_ports"),
    ("num_of_storage_group", "num_of_storage_groups"),
    ("num_of_child_sg", "num_of_child_sgs"),
    ("num_of_vol", "num_of_vols"),
];

/// Converts a mixed or camel case key to lower snake case.
///
/// An underscore is inserted before an upper-case letter that follows a
/// lower-case letter or digit, or that starts a capitalised word after an
/// acronym (`HostIOs` becomes `host_i_os`, `PercentBusy` becomes `percent_busy`).
pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    out
}

/// Maps a raw key onto the stable output vocabulary.
pub fn normalize_key(key: &str) -> String {
    let snake = to_snake_case(key);
    match KEY_RENAMES.iter().find(|(from, _)| *from == snake) {
        Some((_, to)) => (*to).to_string(),
        None => snake,
    }
}

fn is_identity_key(key: &str) -> bool {
    IDENTITY_KEYS.contains(&to_snake_case(key).as_str())
}

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.is_empty() => Value::String(NOT_AVAILABLE.to_string()),
        other => other.clone(),
    }
}

/// Renames every key of `record` and rewrites empty strings to `"N/A"`.
pub fn rename_keys(record: &Payload) -> Payload {
    record
        .iter()
        .map(|(k, v)| (normalize_key(k), normalize_value(v)))
        .collect()
}

/// Recursively hoists nested mappings into `parent_child` keys.
///
/// A list whose first element is a mapping is treated as that single mapping;
/// the API returns both shapes for the same field. Other lists stay lists of
/// scalars: nested items inside them are rendered as JSON text. Scalars pass
/// through unchanged.
pub fn flatten(nested: &Payload) -> Payload {
    let mut out = Payload::new();
    for (key, value) in nested {
        match value {
            Value::Object(child) => hoist(&mut out, key, child),
            Value::Array(items) => match items.first() {
                Some(Value::Object(child)) => hoist(&mut out, key, child),
                _ => {
                    out.insert(key.clone(), Value::Array(scalar_items(items)));
                }
            },
            scalar => {
                out.insert(key.clone(), scalar.clone());
            }
        }
    }
    out
}

fn scalar_items(items: &[Value]) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(_) | Value::Array(_) => Value::String(item.to_string()),
            scalar => scalar.clone(),
        })
        .collect()
}

fn hoist(out: &mut Payload, prefix: &str, child: &Payload) {
    for (sub_key, sub_value) in flatten(child) {
        out.insert(format!("{}_{}", prefix, sub_key), sub_value);
    }
}

/// Lifts the single performance result to the top level of `payload`.
///
/// Returns `None` when the payload holds no result, which callers treat as
/// "no performance data" rather than an error.
pub fn extract_performance_result(payload: &Payload) -> Option<Payload> {
    let result = payload
        .get("result")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)?;

    let mut out: Payload = payload
        .iter()
        .filter(|(k, _)| !PERFORMANCE_WRAPPER_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (k, v) in result {
        out.insert(k.clone(), v.clone());
    }
    Some(out)
}

/// Builds a `{<prefix>_details: false, <prefix>_message: msg}` stand-in.
pub fn stand_in(prefix: &str, message: &str) -> Payload {
    let mut out = Payload::new();
    out.insert(format!("{}_details", prefix), Value::Bool(false));
    out.insert(format!("{}_message", prefix), Value::String(message.to_string()));
    out
}

/// Stand-in merged when a category has no performance data.
pub fn performance_unavailable(prefix: &str, message: &str) -> Payload {
    stand_in(&format!("{}_perf", prefix), message)
}

/// Flat, renamed output record for one asset.
///
/// Always holds `reporting_level` (when a source set one), `array_id` and
/// `timestamp` in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: Payload,
}

impl NormalizedRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &Payload {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn reporting_level(&self) -> Option<&str> {
        self.get("reporting_level").and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.get("timestamp").and_then(Value::as_i64)
    }

    pub fn into_fields(self) -> Payload {
        self.fields
    }
}

/// Merges payloads into records stamped with one array's identity.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    array_id: &'a str,
    timestamp: i64,
}

impl<'a> Normalizer<'a> {
    pub fn new(array_id: &'a str, timestamp: i64) -> Self {
        Self { array_id, timestamp }
    }

    pub fn array_id(&self) -> &str {
        self.array_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Unions `sources` into one record.
    ///
    /// Identity keys are discarded from every source and the last value wins
    /// on a key collision. `timestamp` overrides the run timestamp for
    /// event-sourced records. Pass an `Option` iterator to skip absent sources.
    pub fn merge<'p, I>(&self, sources: I, timestamp: Option<i64>) -> NormalizedRecord
    where
        I: IntoIterator<Item = &'p Payload>,
    {
        let mut fields = Payload::new();
        for source in sources {
            for (k, v) in source {
                if is_identity_key(k) {
                    continue;
                }
                fields.insert(normalize_key(k), normalize_value(v));
            }
        }

        fields.insert(
            "timestamp".to_string(),
            Value::from(timestamp.unwrap_or(self.timestamp)),
        );
        fields.insert("array_id".to_string(), Value::from(self.array_id));

        NormalizedRecord { fields }
    }
}
