//! Replication collectors: RDF groups and pairs, Metro DR environments and
//! snapshot policies.

use serde_json::{Value, json};
use tracing::debug;

use super::{ActiveAssetSet, CollectError, Collector, set_level, value_text};
use crate::category::PerfCategory;
use crate::client::Transport;
use crate::normalize::{NOT_AVAILABLE, NormalizedRecord, Payload, flatten, performance_unavailable};

const NO_RDF_MODE: &str = "RDF group is neither synchronous nor asynchronous capable.";

/// Replication mode an RDF group has performance data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfMode {
    Synchronous,
    Asynchronous,
}

impl RdfMode {
    pub fn perf_category(self) -> PerfCategory {
        match self {
            RdfMode::Synchronous => PerfCategory::Rdfs,
            RdfMode::Asynchronous => PerfCategory::Rdfa,
        }
    }

    fn field(self) -> &'static str {
        match self {
            RdfMode::Synchronous => "rdfs",
            RdfMode::Asynchronous => "rdfa",
        }
    }
}

/// One RDF group from the listing, with its replication mode resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdfGroupEntry {
    pub number: u32,
    pub label: String,
    /// `None` when neither performance listing knows the group.
    pub mode: Option<RdfMode>,
}

impl RdfGroupEntry {
    /// Resolves a group's mode; a group in both listings is synchronous.
    pub fn new(
        number: u32,
        label: impl Into<String>,
        sync: &ActiveAssetSet,
        asynchronous: &ActiveAssetSet,
    ) -> Self {
        let id = number.to_string();
        let mode = if sync.contains(&id) {
            Some(RdfMode::Synchronous)
        } else if asynchronous.contains(&id) {
            Some(RdfMode::Asynchronous)
        } else {
            None
        };
        Self {
            number,
            label: label.into(),
            mode,
        }
    }
}

/// Removes commas and replaces spaces with underscores.
fn state_token(value: &str) -> String {
    value.replace(',', "").replace(' ', "_")
}

impl<T: Transport> Collector<'_, T> {
    /// Lists RDF groups with their mode.
    ///
    /// An array without synchronous or asynchronous groups has no key
    /// listing for that mode; its groups are simply not capable of it.
    pub fn rdf_groups(&self) -> Result<Vec<RdfGroupEntry>, CollectError> {
        let groups = self.client.object_list(
            &self.client.replication_path("rdf_group"),
            &[],
            "rdfGroupID",
        )?;
        let sync = ActiveAssetSet::from_keys(
            &self
                .client
                .performance_keys(PerfCategory::Rdfs, &[], "rdfsKeyResult", None)?,
            "raGroupId",
        );
        let asynchronous = ActiveAssetSet::from_keys(
            &self
                .client
                .performance_keys(PerfCategory::Rdfa, &[], "rdfaKeyResult", None)?,
            "raGroupId",
        );

        Ok(groups
            .iter()
            .filter_map(|group| {
                let number = group
                    .get("rdfgNumber")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok());
                let Some(number) = number else {
                    debug!("Skipping RDF group listing entry without a number: {:?}", group);
                    return None;
                };
                let label = group
                    .get("label")
                    .and_then(value_text)
                    .unwrap_or_default();
                Some(RdfGroupEntry::new(number, label, &sync, &asynchronous))
            })
            .collect())
    }

    pub fn collect_rdf_group(&self, group: &RdfGroupEntry) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(
            &self
                .client
                .replication_path(&format!("rdf_group/{}", group.number)),
        )?;
        let mut details = flatten(&body);
        set_level(&mut details, "RDF Group");
        for mode in [RdfMode::Synchronous, RdfMode::Asynchronous] {
            details.insert(mode.field().to_string(), Value::Bool(group.mode == Some(mode)));
        }

        let perf = match group.mode {
            Some(mode) => self.performance(
                mode.perf_category(),
                &[("raGroupId", json!(group.number.to_string()))],
                &group.label,
            )?,
            None => {
                debug!("{} | {}", group.label, NO_RDF_MODE);
                performance_unavailable("rdfg", NO_RDF_MODE)
            }
        };
        Ok(self.normalizer().merge([&details, &perf], None))
    }

    /// Device names replicated by one group.
    pub fn rdf_pair_devices(&self, group: &RdfGroupEntry) -> Result<Vec<String>, CollectError> {
        Ok(self.client.id_list(
            &self
                .client
                .replication_path(&format!("rdf_group/{}/volume", group.number)),
            &[],
            "name",
        )?)
    }

    /// Collects one device pair, labelled with its group's type and label.
    pub fn collect_rdf_pair(
        &self,
        group: &RdfGroupEntry,
        group_record: &NormalizedRecord,
        device: &str,
    ) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(&self.client.replication_path(&format!(
            "rdf_group/{}/volume/{}",
            group.number, device
        )))?;
        let mut details = flatten(&body);
        set_level(&mut details, "RDF Pair");
        details.insert(
            "type".to_string(),
            group_record
                .get("type")
                .cloned()
                .unwrap_or_else(|| Value::from(NOT_AVAILABLE)),
        );
        details.insert("rdfg_label".to_string(), Value::from(group.label.as_str()));

        Ok(self.normalizer().merge([&details], None))
    }

    pub fn metro_dr_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.replication_path("metrodr"), &[], "name")?)
    }

    pub fn collect_metro_dr(&self, name: &str) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(
            &self
                .client
                .replication_path(&format!("metrodr/{}", name)),
        )?;
        let mut details = flatten(&body);
        set_level(&mut details, "Metro DR");
        for key in ["environment_state", "dr_rdf_mode"] {
            let token = details.get(key).and_then(Value::as_str).map(state_token);
            if let Some(token) = token {
                details.insert(key.to_string(), Value::from(token));
            }
        }
        Ok(self.normalizer().merge([&details], None))
    }

    pub fn snapshot_policy_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.replication_path("snapshot_policy"), &[], "name")?)
    }

    pub fn collect_snapshot_policy(&self, name: &str) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(
            &self
                .client
                .replication_path(&format!("snapshot_policy/{}", name)),
        )?;
        let mut details = flatten(&body);
        set_level(&mut details, "Snapshot Policy");

        let is_cloud = details
            .get("provider_name")
            .and_then(Value::as_str)
            .is_some_and(|p| !p.is_empty());
        let mut policy = Payload::new();
        if is_cloud {
            policy.insert("policy_type".to_string(), Value::from("cloud"));
        } else {
            policy.insert("policy_type".to_string(), Value::from("local"));
            policy.insert("provider_name".to_string(), Value::from(NOT_AVAILABLE));
        }
        Ok(self.normalizer().merge([&details, &policy], None))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::testing;
    use super::*;
    use crate::client::UnisphereClient;
    use crate::client::mock::MockTransport;
    use crate::client::mock::scenarios::ARRAY_ID;
    use crate::client::transport::Response;

    fn ids(items: &[&str]) -> ActiveAssetSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rdf_mode_resolution() {
        let sync = ids(&["1", "4"]);
        let asynchronous = ids(&["2", "4"]);
        assert_eq!(
            RdfGroupEntry::new(1, "a", &sync, &asynchronous).mode,
            Some(RdfMode::Synchronous)
        );
        assert_eq!(
            RdfGroupEntry::new(2, "b", &sync, &asynchronous).mode,
            Some(RdfMode::Asynchronous)
        );
        assert_eq!(RdfGroupEntry::new(3, "c", &sync, &asynchronous).mode, None);
        assert_eq!(
            RdfGroupEntry::new(4, "d", &sync, &asynchronous).mode,
            Some(RdfMode::Synchronous)
        );
    }

    #[test]
    fn test_rdf_groups_listing() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);

        let groups = Collector::new(&client, &ctx).rdf_groups().unwrap();
        let modes: Vec<_> = groups.iter().map(|g| (g.number, g.mode)).collect();
        assert_eq!(
            modes,
            vec![
                (1, Some(RdfMode::Synchronous)),
                (2, Some(RdfMode::Asynchronous)),
                (3, None)
            ]
        );
        assert_eq!(groups[0].label, "RDFG_1");
    }

    #[test]
    fn test_rdf_groups_without_key_listings() {
        let mock = MockTransport::new();
        mock.add_get(
            &format!("/univmax/restapi/100/replication/symmetrix/{}/rdf_group", ARRAY_ID),
            Response::ok(json!({"rdfGroupID": [{"rdfgNumber": 7, "label": "X"}]})),
        );
        let client = UnisphereClient::new(mock, ARRAY_ID);
        let cfg = testing::all_enabled();
        let ctx = testing::context(&cfg, &client);

        let groups = Collector::new(&client, &ctx).rdf_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].mode, None);
    }

    #[test]
    fn test_rdf_group_and_pairs() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);
        let groups = collector.rdf_groups().unwrap();

        let sync = collector.collect_rdf_group(&groups[0]).unwrap();
        assert_eq!(sync.reporting_level(), Some("RDF Group"));
        assert_eq!(sync.get("rdfs"), Some(&json!(true)));
        assert_eq!(sync.get("rdfa"), Some(&json!(false)));
        assert_eq!(sync.get("percent_busy"), Some(&json!(12.5)));
        let body = client
            .transport()
            .last_body("/univmax/restapi/performance/RDFS/metrics")
            .unwrap();
        assert_eq!(body["raGroupId"], "1");

        let devices = collector.rdf_pair_devices(&groups[0]).unwrap();
        assert_eq!(devices, vec!["00001", "00002"]);
        let pair = collector.collect_rdf_pair(&groups[0], &sync, &devices[1]).unwrap();
        assert_eq!(pair.reporting_level(), Some("RDF Pair"));
        assert_eq!(pair.get("type"), Some(&json!("Dynamic")));
        assert_eq!(pair.get("rdfg_label"), Some(&json!("RDFG_1")));
        assert_eq!(pair.get("local_volume_name"), Some(&json!("00002")));

        let neither = collector.collect_rdf_group(&groups[2]).unwrap();
        assert_eq!(neither.get("rdfs"), Some(&json!(false)));
        assert_eq!(neither.get("rdfa"), Some(&json!(false)));
        assert_eq!(neither.get("rdfg_perf_details"), Some(&json!(false)));
        assert_eq!(neither.get("rdfg_perf_message"), Some(&json!(NO_RDF_MODE)));
    }

    #[test]
    fn test_metro_dr_state_tokens() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        assert_eq!(collector.metro_dr_ids().unwrap(), vec!["MDR_1"]);
        let record = collector.collect_metro_dr("MDR_1").unwrap();
        assert_eq!(record.reporting_level(), Some("Metro DR"));
        assert_eq!(record.get("environment_state"), Some(&json!("Active_HA")));
        assert_eq!(record.get("dr_rdf_mode"), Some(&json!("Adaptive_Copy")));
        assert_eq!(record.get("dr_state"), Some(&json!("Consistent")));
    }

    #[test]
    fn test_snapshot_policy_types() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        let local = collector.collect_snapshot_policy("Daily").unwrap();
        assert_eq!(local.reporting_level(), Some("Snapshot Policy"));
        assert_eq!(local.get("policy_type"), Some(&json!("local")));
        assert_eq!(local.get("provider_name"), Some(&json!("N/A")));

        let cloud = collector.collect_snapshot_policy("Cloud").unwrap();
        assert_eq!(cloud.get("policy_type"), Some(&json!("cloud")));
        assert_eq!(cloud.get("provider_name"), Some(&json!("ECS_1")));
    }

    #[test]
    fn test_state_token() {
        assert_eq!(state_token("Active, HA"), "Active_HA");
        assert_eq!(state_token("Adaptive Copy"), "Adaptive_Copy");
        assert_eq!(state_token("Consistent"), "Consistent");
    }
}
