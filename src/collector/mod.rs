//! Per-category asset collectors.
//!
//! Every collector follows the same shape: one summary fetch, zero or more
//! auxiliary fetches, one performance fetch keyed by the run's metric
//! selection, then a single [`Normalizer::merge`] into a [`NormalizedRecord`].
//!
//! Collectors never emit records and never swallow errors; per-asset and
//! per-category isolation is the orchestrator's job.
//!
//! ## Modules
//! - `array` - array summary and auxiliaries
//! - `provisioning` - SRPs, storage groups, port groups, hosts, initiators, masking views
//! - `director` - directors and their ports
//! - `iscsi` - IP interfaces and iSCSI targets
//! - `replication` - RDF groups and pairs, Metro DR, snapshot policies
//! - `events` - alerts and audit log records

mod array;
pub mod classify;
mod director;
mod events;
mod iscsi;
mod provisioning;
mod replication;

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::category::PerfCategory;
use crate::client::{ApiError, Transport, UnisphereClient};
use crate::context::CollectionContext;
use crate::normalize::{Normalizer, Payload, extract_performance_result, performance_unavailable};

pub use classify::{DirectorKind, PortKind};
pub use iscsi::IpInterfaceKey;
pub use replication::{RdfGroupEntry, RdfMode};

/// Error type for collecting one asset or listing one category.
#[derive(Debug)]
pub enum CollectError {
    /// A management API call failed.
    Api(ApiError),
    /// The asset belongs to a hardware class the collector does not know.
    UnknownAssetType(String),
    /// A response lacked a field the collector cannot do without.
    MissingField { asset: String, field: &'static str },
}

impl CollectError {
    /// Fatal errors abort the run instead of being isolated to one asset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectError::UnknownAssetType(_))
    }
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Api(e) => write!(f, "{}", e),
            CollectError::UnknownAssetType(id) => {
                write!(f, "{} | Not able to determine asset type", id)
            }
            CollectError::MissingField { asset, field } => {
                write!(f, "{} | response has no '{}' field", asset, field)
            }
        }
    }
}

impl std::error::Error for CollectError {}

impl From<ApiError> for CollectError {
    fn from(e: ApiError) -> Self {
        CollectError::Api(e)
    }
}

/// A `directorId`/`portId` pair, rendered `D:P`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortKey {
    pub director_id: String,
    pub port_id: String,
}

impl PortKey {
    pub fn new(director_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self {
            director_id: director_id.into(),
            port_id: port_id.into(),
        }
    }

    /// Reads a `{directorId, portId}` object; the port may be numeric.
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        Some(Self {
            director_id: payload.get("directorId").and_then(value_text)?,
            port_id: payload.get("portId").and_then(value_text)?,
        })
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.director_id, self.port_id)
    }
}

/// Text form of a scalar JSON value.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Renders a list of port key objects as `D:P` strings.
pub(crate) fn port_list(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(PortKey::from_payload)
                .map(|key| Value::String(key.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Replaces comma separated flag strings with trimmed lists; absent flags become `[]`.
pub(crate) fn split_flags(payload: &mut Payload, keys: &[&str]) {
    for key in keys {
        let flags: Vec<Value> = payload
            .get(*key)
            .and_then(Value::as_str)
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(Value::from)
                    .collect()
            })
            .unwrap_or_default();
        payload.insert((*key).to_string(), Value::Array(flags));
    }
}

/// Sets `key` to `default` when it is absent, null or an empty string.
pub(crate) fn default_text(payload: &mut Payload, key: &str, default: &str) {
    let missing = match payload.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if missing {
        payload.insert(key.to_string(), Value::from(default));
    }
}

/// Asset ids with performance samples at the run timestamp.
///
/// Built once per category per run; assets outside the set skip their
/// performance query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveAssetSet {
    ids: HashSet<String>,
}

impl ActiveAssetSet {
    /// Reads `id_field` from every performance key entry.
    pub fn from_keys(keys: &[Payload], id_field: &str) -> Self {
        keys.iter()
            .filter_map(|key| key.get(id_field).and_then(value_text))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for ActiveAssetSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Collects assets of one array for one run.
pub struct Collector<'a, T: Transport> {
    client: &'a UnisphereClient<T>,
    ctx: &'a CollectionContext,
}

impl<'a, T: Transport> Collector<'a, T> {
    pub fn new(client: &'a UnisphereClient<T>, ctx: &'a CollectionContext) -> Self {
        Self { client, ctx }
    }

    pub fn context(&self) -> &CollectionContext {
        self.ctx
    }

    fn normalizer(&self) -> Normalizer<'a> {
        Normalizer::new(&self.ctx.array_id, self.ctx.timestamp)
    }

    fn fetch(&self, path: &str) -> Result<Payload, CollectError> {
        Ok(self.client.get_json(path, &[])?)
    }

    /// Like `fetch`, but a missing or empty resource is `None`.
    fn fetch_optional(&self, path: &str) -> Result<Option<Payload>, CollectError> {
        match self.client.get_json(path, &[]) {
            Ok(body) if body.is_empty() => Ok(None),
            Ok(body) => Ok(Some(body)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches the performance sample of one asset.
    ///
    /// `None` means no data: the category is not collected on this array or
    /// the backend has no sample at the run timestamp.
    fn fetch_performance(
        &self,
        category: PerfCategory,
        keys: &[(&str, Value)],
    ) -> Result<Option<Payload>, CollectError> {
        let Some(selection) = self.ctx.selection(category) else {
            debug!(
                "{} metrics are not collected for {:?} arrays",
                category, self.ctx.generation
            );
            return Ok(None);
        };
        let stats =
            self.client
                .performance_stats(category, keys, selection, self.ctx.timestamp)?;
        Ok(stats.as_ref().and_then(extract_performance_result))
    }

    /// Ids of `category` assets the performance subsystem has samples for.
    fn active_assets(
        &self,
        category: PerfCategory,
        list_key: &str,
        id_field: &str,
    ) -> Result<ActiveAssetSet, CollectError> {
        let keys =
            self.client
                .performance_keys(category, &[], list_key, Some(self.ctx.timestamp))?;
        let active = ActiveAssetSet::from_keys(&keys, id_field);
        debug!("{} active {} assets", active.len(), category);
        Ok(active)
    }

    /// Performance sample of one asset, or the `<prefix>_perf_*` stand-in.
    fn performance(
        &self,
        category: PerfCategory,
        keys: &[(&str, Value)],
        asset: &str,
    ) -> Result<Payload, CollectError> {
        match self.fetch_performance(category, keys)? {
            Some(perf) => Ok(perf),
            None => {
                let msg = format!("No {} performance data available.", category.parent());
                warn!("{} | {}", asset, msg);
                Ok(performance_unavailable(category.field_prefix(), &msg))
            }
        }
    }
}

/// `{"reporting_level": level}` merged into a payload.
pub(crate) fn set_level(payload: &mut Payload, level: &str) {
    payload.insert("reporting_level".to_string(), Value::from(level));
}
