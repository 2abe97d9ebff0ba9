//! Event-sourced collectors: alerts and audit log records.
//!
//! Records carry the event's own time as `timestamp` instead of the run
//! timestamp.

use chrono::NaiveDateTime;
use serde_json::Value;

use super::{CollectError, Collector, default_text, set_level, value_text};
use crate::client::Transport;
use crate::normalize::{NOT_AVAILABLE, NormalizedRecord, Payload, flatten};

/// Layout of `created_date`, e.g. `Nov-14-2023 22:13:20.000` (UTC).
const ALERT_DATE_FORMAT: &str = "%b-%d-%Y %H:%M:%S%.3f";

/// Event time of an alert in milliseconds.
fn alert_timestamp(alert: &Payload) -> Option<i64> {
    if let Some(ms) = alert.get("created_date_milliseconds").and_then(Value::as_i64) {
        return Some(ms);
    }
    let created = alert.get("created_date").and_then(Value::as_str)?;
    NaiveDateTime::parse_from_str(created, ALERT_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Event time of an audit record; `entry_date` is in seconds.
fn audit_timestamp(record: &Payload) -> Option<i64> {
    record
        .get("entry_date")
        .and_then(Value::as_i64)
        .and_then(|secs| secs.checked_mul(1000))
}

impl<T: Transport> Collector<'_, T> {
    pub fn alert_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self.client.id_list(
            &self.client.api_path("system/alert"),
            &[("array", self.client.array_id().to_string())],
            "alertId",
        )?)
    }

    pub fn collect_alert(&self, alert_id: &str) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(&self.client.api_path(&format!("system/alert/{}", alert_id)))?;
        let mut details = flatten(&body);
        set_level(&mut details, "Alert");
        details.insert(
            "asset_id".to_string(),
            body.get("object")
                .cloned()
                .unwrap_or_else(|| Value::from(NOT_AVAILABLE)),
        );
        details.insert(
            "u4v_source".to_string(),
            Value::from(self.ctx.source_host.as_str()),
        );

        let timestamp = alert_timestamp(&body).unwrap_or(self.ctx.timestamp);
        Ok(self.normalizer().merge([&details], Some(timestamp)))
    }

    /// Audit records written during the last interval.
    pub fn audit_log_ids(&self) -> Result<Vec<String>, CollectError> {
        let to = self.ctx.timestamp;
        let from = to - (self.ctx.interval as i64) * 1000;
        let records = self.client.object_list(
            &self.client.system_path("audit_log_record"),
            &[
                ("entry_date_from", from.to_string()),
                ("entry_date_to", to.to_string()),
            ],
            "audit_log_record",
        )?;
        Ok(records
            .iter()
            .filter_map(|record| record.get("record_id").and_then(value_text))
            .collect())
    }

    pub fn collect_audit_log(&self, record_id: &str) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(
            &self
                .client
                .system_path(&format!("audit_log_record/{}", record_id)),
        )?;
        let mut details = flatten(&body);
        set_level(&mut details, "Audit Log");
        default_text(&mut details, "username", "None");
        default_text(&mut details, "activity_id", "None");

        let username = details
            .get("username")
            .and_then(Value::as_str)
            .map(|u| u.replace('\\', "/"));
        if let Some(username) = username {
            details.insert("username".to_string(), Value::from(username));
        }
        let message = details
            .get("message")
            .and_then(Value::as_str)
            .map(|m| m.trim().to_string());
        if let Some(message) = message {
            details.insert("message".to_string(), Value::from(message));
        }

        let timestamp = audit_timestamp(&body).unwrap_or(self.ctx.timestamp);
        Ok(self.normalizer().merge([&details], Some(timestamp)))
    }
}
