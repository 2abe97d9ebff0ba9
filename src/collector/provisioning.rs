//! Provisioning collectors: SRPs, storage groups, port groups, hosts,
//! initiators and masking views.

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{
    ActiveAssetSet, CollectError, Collector, default_text, port_list, set_level, split_flags,
};
use crate::category::PerfCategory;
use crate::client::Transport;
use crate::normalize::{NormalizedRecord, Payload, flatten, performance_unavailable};

const HOST_INACTIVE: &str = "Host is not active, no performance data to collect.";
const INITIATOR_INACTIVE: &str = "No active Initiator performance data available.";
const ISCSI_INITIATOR: &str = "No iSCSI Initiator performance data available.";

fn performance_flag(collected: bool) -> Payload {
    let mut out = Payload::new();
    out.insert("performance_metrics".to_string(), Value::Bool(collected));
    out
}

impl<T: Transport> Collector<'_, T> {
    // ---- listings ----

    pub fn srp_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.provisioning_path("srp"), &[], "srpId")?)
    }

    pub fn storage_group_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self.client.id_list(
            &self.client.provisioning_path("storagegroup"),
            &[],
            "storageGroupId",
        )?)
    }

    pub fn port_group_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.provisioning_path("portgroup"), &[], "portGroupId")?)
    }

    pub fn host_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.provisioning_path("host"), &[], "hostId")?)
    }

    pub fn initiator_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.provisioning_path("initiator"), &[], "initiatorId")?)
    }

    pub fn masking_view_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self.client.id_list(
            &self.client.provisioning_path("maskingview"),
            &[],
            "maskingViewId",
        )?)
    }

    /// Hosts with performance samples at the run timestamp.
    pub fn active_hosts(&self) -> Result<ActiveAssetSet, CollectError> {
        self.active_assets(PerfCategory::Host, "hostInfo", "hostId")
    }

    /// Initiators with performance samples at the run timestamp.
    pub fn active_initiators(&self) -> Result<ActiveAssetSet, CollectError> {
        self.active_assets(PerfCategory::Initiator, "initiatorInfo", "initiatorId")
    }

    // ---- assets ----

    pub fn collect_srp(&self, srp_id: &str) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(&self.client.provisioning_path(&format!("srp/{}", srp_id)))?;
        let mut details = flatten(&body);
        set_level(&mut details, "SRP");

        let perf = self.performance(PerfCategory::Srp, &[("srpId", json!(srp_id))], srp_id)?;
        Ok(self.normalizer().merge([&details, &perf], None))
    }

    pub fn collect_storage_group(&self, sg_id: &str) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(
            &self
                .client
                .provisioning_path(&format!("storagegroup/{}", sg_id)),
        )?;
        let mut details = flatten(&body);
        set_level(&mut details, "SG");
        for key in ["service_level", "workload", "srp"] {
            default_text(&mut details, key, "NONE");
        }

        let perf = self.performance(
            PerfCategory::StorageGroup,
            &[("storageGroupId", json!(sg_id))],
            sg_id,
        )?;
        Ok(self.normalizer().merge([&details, &perf], None))
    }

    pub fn collect_port_group(&self, pg_id: &str) -> Result<NormalizedRecord, CollectError> {
        let mut body = self.fetch(&self.client.provisioning_path(&format!("portgroup/{}", pg_id)))?;
        let ports = port_list(body.get("symmetrixPortKey"));
        body.remove("symmetrixPortKey");
        let mut details = flatten(&body);
        set_level(&mut details, "Port Group");
        details.insert("port_list".to_string(), Value::Array(ports));

        let perf = self.performance(
            PerfCategory::PortGroup,
            &[("portGroupId", json!(pg_id))],
            pg_id,
        )?;
        Ok(self.normalizer().merge([&details, &perf], None))
    }

    /// Collects one host; performance is queried only for active hosts.
    pub fn collect_host(
        &self,
        host_id: &str,
        active: &ActiveAssetSet,
    ) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(&self.client.provisioning_path(&format!("host/{}", host_id)))?;
        let mut details = flatten(&body);
        set_level(&mut details, "Host");
        split_flags(&mut details, &["enabled_flags", "disabled_flags"]);

        let (perf, collected) = if active.contains(host_id) {
            match self.fetch_performance(PerfCategory::Host, &[("hostId", json!(host_id))])? {
                Some(perf) => (perf, true),
                None => {
                    let msg = "No Host performance data available.";
                    warn!("{} | {}", host_id, msg);
                    (performance_unavailable("host", msg), false)
                }
            }
        } else {
            debug!("{} | {}", host_id, HOST_INACTIVE);
            (performance_unavailable("host", HOST_INACTIVE), false)
        };

        Ok(self
            .normalizer()
            .merge([&details, &perf, &performance_flag(collected)], None))
    }

    /// Collects one initiator; performance is queried only for active initiators.
    pub fn collect_initiator(
        &self,
        initiator_id: &str,
        active: &ActiveAssetSet,
    ) -> Result<NormalizedRecord, CollectError> {
        let mut body = self.fetch(
            &self
                .client
                .provisioning_path(&format!("initiator/{}", initiator_id)),
        )?;
        let ports = port_list(body.get("symmetrixPortKey"));
        body.remove("symmetrixPortKey");
        let host = body.remove("host");

        let mut details = flatten(&body);
        set_level(&mut details, "Initiator");
        details.insert("dir_port_keys".to_string(), Value::Array(ports));
        details.insert(
            "host_id".to_string(),
            host.filter(|h| h.as_str().is_some_and(|s| !s.is_empty()))
                .unwrap_or_else(|| Value::from("No Host associated")),
        );
        split_flags(
            &mut details,
            &["flags_in_effect", "enabled_flags", "disabled_flags"],
        );
        let is_iscsi = details
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.eq_ignore_ascii_case("iscsi"));

        let performance = if active.contains(initiator_id) {
            self.fetch_performance(
                PerfCategory::Initiator,
                &[("initiatorId", json!(initiator_id))],
            )?
        } else {
            None
        };
        let (perf, collected) = match performance {
            Some(perf) => (perf, true),
            None => {
                let msg = if is_iscsi {
                    debug!("{} | {}", initiator_id, ISCSI_INITIATOR);
                    ISCSI_INITIATOR
                } else if !active.contains(initiator_id) {
                    debug!("{} | {}", initiator_id, INITIATOR_INACTIVE);
                    INITIATOR_INACTIVE
                } else {
                    let msg = "No Initiator performance data available.";
                    warn!("{} | {}", initiator_id, msg);
                    msg
                };
                (performance_unavailable("initiator", msg), false)
            }
        };

        Ok(self
            .normalizer()
            .merge([&details, &perf, &performance_flag(collected)], None))
    }

    /// Collects one masking view and its connection records.
    ///
    /// The view record comes first, followed by one record per
    /// device/initiator binding. Connection records carry the view's
    /// identity fields, which win over same-named connection fields.
    pub fn collect_masking_view(
        &self,
        mv_id: &str,
    ) -> Result<Vec<NormalizedRecord>, CollectError> {
        let body = self.fetch(
            &self
                .client
                .provisioning_path(&format!("maskingview/{}", mv_id)),
        )?;
        let mut base = flatten(&body);
        default_text(&mut base, "hostId", "None");
        default_text(&mut base, "hostGroupId", "None");

        let mut details = base.clone();
        set_level(&mut details, "Masking View");
        if let Some(pg_id) = base.get("portGroupId").and_then(Value::as_str) {
            let group = self.fetch(&self.client.provisioning_path(&format!("portgroup/{}", pg_id)))?;
            details.insert(
                "port_list".to_string(),
                Value::Array(port_list(group.get("symmetrixPortKey"))),
            );
        }

        let perf = self.performance(
            PerfCategory::MaskingView,
            &[("maskingViewId", json!(mv_id))],
            mv_id,
        )?;
        let mut records = vec![self.normalizer().merge([&details, &perf], None)];

        let connections = self.client.object_list(
            &self
                .client
                .provisioning_path(&format!("maskingview/{}/connections", mv_id)),
            &[],
            "maskingViewConnection",
        )?;
        for connection in &connections {
            let mut conn = flatten(connection);
            set_level(&mut conn, "Masking View Connection");
            records.push(self.normalizer().merge([&conn, &base], None));
        }
        debug!("{} | {} connection records", mv_id, connections.len());

        Ok(records)
    }
}
