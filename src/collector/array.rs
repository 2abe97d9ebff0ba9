//! Array-level collector: summary, auxiliaries and performance.

use serde_json::Value;
use tracing::debug;

use super::{CollectError, Collector, set_level};
use crate::category::PerfCategory;
use crate::client::Transport;
use crate::normalize::{NormalizedRecord, Payload, flatten, stand_in, to_snake_case};

/// Fields an array-scoped listing item may carry the array id under.
const ARRAY_ID_FIELDS: &[&str] = &["symmetrixId", "arrayId", "symmId"];

fn is_for_array(item: &Payload, array_id: &str) -> bool {
    ARRAY_ID_FIELDS
        .iter()
        .any(|field| item.get(*field).and_then(Value::as_str) == Some(array_id))
}

/// Turns `health_score_metric` entries into `health_<metric>` fields.
fn health_scores(body: &Payload) -> Option<Payload> {
    let metrics = body.get("health_score_metric").and_then(Value::as_array)?;
    let scores: Payload = metrics
        .iter()
        .filter_map(|m| {
            let name = m.get("metric").and_then(Value::as_str)?;
            let score = m.get("health_score")?;
            Some((format!("health_{}", to_snake_case(name)), score.clone()))
        })
        .collect();
    (!scores.is_empty()).then_some(scores)
}

/// Prefixes both alert summaries of one array.
fn alert_counts(summary: &Payload) -> Payload {
    let mut out = Payload::new();
    for (section, prefix) in [
        ("performanceAlertSummary", "array_performance_alert"),
        ("arrayAlertSummary", "array_alert"),
    ] {
        if let Some(counts) = summary.get(section).and_then(Value::as_object) {
            for (key, value) in counts {
                out.insert(format!("{}_{}", prefix, key), value.clone());
            }
        }
    }
    out
}

impl<T: Transport> Collector<'_, T> {
    /// Collects the array record.
    pub fn collect_array(&self) -> Result<NormalizedRecord, CollectError> {
        let array_id = self.client.array_id();
        let mut level = Payload::new();
        set_level(&mut level, "Array");

        let summary = self
            .fetch_optional(&self.client.provisioning_path(""))?
            .map(|body| flatten(&body))
            .unwrap_or_else(|| stand_in("array_summary", "No Array summary data available"));

        let system = self
            .fetch_optional(&self.client.system_path(""))?
            .map(|body| flatten(&body))
            .unwrap_or_else(|| stand_in("array_system", "No Array system data available"));

        let wlp = self
            .array_entry(
                &self.client.api_path(&format!("wlp/symmetrix/{}", array_id)),
                "symmetrixCapability",
            )?
            .map(|item| flatten(&item))
            .unwrap_or_else(|| stand_in("array_wlp", "No Array WLP data available"));

        let migration = self
            .fetch_optional(&self.client.api_path(&format!("migration/symmetrix/{}", array_id)))?
            .map(|body| flatten(&body))
            .unwrap_or_else(|| stand_in("array_migration", "No Array migration data available"));

        let migration_capabilities = self
            .array_entry(
                &self.client.api_path("migration/capabilities/symmetrix"),
                "storageArrayCapability",
            )?
            .map(|item| flatten(&item))
            .unwrap_or_else(|| {
                stand_in(
                    "array_migration_capabilities",
                    "No Array migration capabilities data available",
                )
            });

        let replication_capability = self
            .array_entry(
                &self.client.api_path("replication/capabilities/symmetrix"),
                "symmetrixCapability",
            )?
            .map(|item| flatten(&item))
            .unwrap_or_else(|| {
                stand_in(
                    "array_replication_capability",
                    "No Array replication capability data available",
                )
            });

        let alerts = self
            .array_entry(&self.client.api_path("system/alert_summary"), "symmAlertSummary")?
            .map(|item| alert_counts(&item))
            .filter(|counts| !counts.is_empty())
            .unwrap_or_else(|| stand_in("array_alert", "No Array alert summary data available"));

        let health = self
            .fetch_optional(&self.client.system_path("health"))?
            .and_then(|body| health_scores(&body))
            .unwrap_or_else(|| stand_in("array_health", "No Array health data available"));

        let perf = self.performance(PerfCategory::Array, &[], array_id)?;

        Ok(self.normalizer().merge(
            [
                &level,
                &summary,
                &system,
                &wlp,
                &migration,
                &migration_capabilities,
                &replication_capability,
                &alerts,
                &health,
                &perf,
            ],
            None,
        ))
    }

    /// Item of an array-scoped listing that belongs to the target array.
    fn array_entry(&self, path: &str, list_key: &str) -> Result<Option<Payload>, CollectError> {
        let Some(body) = self.fetch_optional(path)? else {
            return Ok(None);
        };
        let entry = body
            .get(list_key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .find(|item| is_for_array(item, self.client.array_id()))
            .cloned();
        if entry.is_none() {
            debug!("{} has no entry for array {}", path, self.client.array_id());
        }
        Ok(entry)
    }
}
