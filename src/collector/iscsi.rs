//! iSCSI collectors: IP interfaces and iSCSI targets.
//!
//! IP interfaces have no array-wide listing. They are discovered by walking
//! the iSCSI directors, their ports, then each port's interfaces; each step
//! is its own call so a failed listing only loses its own subtree.

use std::fmt;

use serde_json::{Value, json};
use tracing::debug;

use super::classify::is_iscsi_director;
use super::director::insert_port_identity;
use super::{CollectError, Collector, PortKey, default_text, set_level, value_text};
use crate::category::PerfCategory;
use crate::client::Transport;
use crate::normalize::{NormalizedRecord, flatten};

/// Location of one IP interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpInterfaceKey {
    pub director_id: String,
    pub port_id: String,
    pub interface_id: String,
}

impl fmt::Display for IpInterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.director_id, self.port_id, self.interface_id)
    }
}

impl<T: Transport> Collector<'_, T> {
    /// iSCSI directors of the array.
    ///
    /// The director listing has no emulation filter, so iSCSI directors are
    /// picked out by identifier.
    pub fn iscsi_director_ids(&self) -> Result<Vec<String>, CollectError> {
        let ids: Vec<String> = self
            .director_ids()?
            .into_iter()
            .filter(|id| is_iscsi_director(id))
            .collect();
        debug!("{} iSCSI directors", ids.len());
        Ok(ids)
    }

    /// Ports of one iSCSI director.
    pub fn iscsi_ports(&self, director_id: &str) -> Result<Vec<PortKey>, CollectError> {
        let ports = self.client.object_list(
            &self
                .client
                .system_path(&format!("director/{}/port", director_id)),
            &[],
            "symmetrixPortKey",
        )?;
        Ok(ports.iter().filter_map(PortKey::from_payload).collect())
    }

    /// IP interfaces configured on one iSCSI port.
    pub fn ip_interface_keys(&self, port: &PortKey) -> Result<Vec<IpInterfaceKey>, CollectError> {
        let interfaces = self.client.id_list(
            &self.client.system_path(&format!(
                "director/{}/port/{}/ip_interface",
                port.director_id, port.port_id
            )),
            &[],
            "ipInterfaceId",
        )?;
        Ok(interfaces
            .into_iter()
            .map(|interface_id| IpInterfaceKey {
                director_id: port.director_id.clone(),
                port_id: port.port_id.clone(),
                interface_id,
            })
            .collect())
    }

    /// Every iSCSI target port of the array.
    pub fn iscsi_target_keys(&self) -> Result<Vec<PortKey>, CollectError> {
        let keys = self.client.object_list(
            &self.client.provisioning_path("port"),
            &[("iscsi_target", "true".to_string())],
            "symmetrixPortKey",
        )?;
        Ok(keys.iter().filter_map(PortKey::from_payload).collect())
    }

    /// Collects one IP interface, enriched with the IQN of its target.
    pub fn collect_ip_interface(
        &self,
        key: &IpInterfaceKey,
    ) -> Result<NormalizedRecord, CollectError> {
        let body = self.fetch(&self.client.system_path(&format!(
            "director/{}/port/{}/ip_interface/{}",
            key.director_id, key.port_id, key.interface_id
        )))?;
        let mut details = flatten(&body);
        set_level(&mut details, "IP Interface");
        details.insert("director_id".to_string(), Value::from(key.director_id.as_str()));
        details.insert("port_id".to_string(), Value::from(key.port_id.as_str()));

        let target_port = details
            .get("iscsi_target_port")
            .and_then(value_text)
            .map(|port_id| PortKey::new(key.director_id.as_str(), port_id));
        if let Some(target) = target_port {
            let port = self.port_details(&target)?;
            if let Some(iqn) = port.get("identifier") {
                details.insert("iscsi_target_iqn".to_string(), iqn.clone());
            }
        }
        default_text(&mut details, "iscsi_target_iqn", "None");

        let network_id = details
            .get("network_id")
            .and_then(value_text)
            .unwrap_or_default();
        let ip_address = details
            .get("ip_address")
            .and_then(value_text)
            .unwrap_or_default();
        let perf_key = format!(
            "{}:{}:{}:{}",
            key.director_id, key.port_id, network_id, ip_address
        );
        let mut perf = self.performance(
            PerfCategory::IpInterface,
            &[("ipInterfaceId", json!(perf_key))],
            &key.to_string(),
        )?;
        perf.remove("ipInterfaceId");
        perf.remove("ip_interface_id");

        Ok(self.normalizer().merge([&details, &perf], None))
    }

    /// Collects one iSCSI target port.
    pub fn collect_iscsi_target(&self, key: &PortKey) -> Result<NormalizedRecord, CollectError> {
        let mut details = flatten(&self.port_details(key)?);
        set_level(&mut details, "iSCSI Target");
        insert_port_identity(&mut details, key);

        let identifier = details
            .get("identifier")
            .and_then(value_text)
            .unwrap_or_default();
        let perf = self.performance(
            PerfCategory::IscsiTarget,
            &[("iSCSITargetId", json!(identifier))],
            &key.to_string(),
        )?;
        Ok(self.normalizer().merge([&details, &perf], None))
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

    const IP_METRICS: &str = "/univmax/restapi/performance/IPInterface/metrics";

    fn se_port() -> PortKey {
        PortKey::new("SE-1E", "4")
    }

    #[test]
    fn test_iscsi_directors_filtered_from_full_listing() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        assert_eq!(collector.iscsi_director_ids().unwrap(), vec!["SE-1E"]);
        let listing = client
            .transport()
            .calls()
            .into_iter()
            .find(|c| c.path.ends_with("/director"))
            .unwrap();
        assert!(listing.params.is_empty());
        assert!(
            client
                .transport()
                .calls()
                .iter()
                .all(|c| !c.path.ends_with("/DF-1C/port"))
        );
    }

    #[test]
    fn test_no_iscsi_directors() {
        let mock = MockTransport::typical_array();
        mock.add_get(
            &format!("/univmax/restapi/100/system/symmetrix/{}/director", ARRAY_ID),
            Response::ok(json!({"directorId": ["DF-1C", "FA-1D"]})),
        );
        let client = UnisphereClient::new(mock, ARRAY_ID);
        let cfg = testing::all_enabled();
        let ctx = testing::context(&cfg, &client);

        assert!(Collector::new(&client, &ctx).iscsi_director_ids().unwrap().is_empty());
    }

    #[test]
    fn test_discover_ip_interfaces() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        assert_eq!(collector.iscsi_ports("SE-1E").unwrap(), vec![se_port()]);
        let keys = collector.ip_interface_keys(&se_port()).unwrap();
        assert_eq!(
            keys,
            vec![IpInterfaceKey {
                director_id: "SE-1E".to_string(),
                port_id: "4".to_string(),
                interface_id: "192.168.1.10-0".to_string(),
            }]
        );
        assert_eq!(keys[0].to_string(), "SE-1E:4:192.168.1.10-0");
    }

    #[test]
    fn test_ip_interface_record() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);
        let keys = collector.ip_interface_keys(&se_port()).unwrap();

        let record = collector.collect_ip_interface(&keys[0]).unwrap();
        assert_eq!(record.reporting_level(), Some("IP Interface"));
        assert_eq!(record.get("director_id"), Some(&json!("SE-1E")));
        assert_eq!(record.get("port_id"), Some(&json!("4")));
        assert_eq!(
            record.get("iscsi_target_iqn"),
            Some(&json!("iqn.1992-04.com.emc:600009700bcbb70e3287017400000001"))
        );
        assert_eq!(record.get("ip_interface_id"), Some(&json!("192.168.1.10-0")));
        assert_eq!(record.get("percent_busy"), Some(&json!(12.5)));

        let body = client.transport().last_body(IP_METRICS).unwrap();
        assert_eq!(body["ipInterfaceId"], "SE-1E:4:0:192.168.1.10");
    }

    #[test]
    fn test_ip_interface_without_target_port() {
        let mock = MockTransport::typical_array();
        mock.add_get(
            &format!(
                "/univmax/restapi/100/system/symmetrix/{}/director/SE-1E/port/4/ip_interface/192.168.1.10-0",
                ARRAY_ID
            ),
            Response::ok(json!({"ip_interface_id": "192.168.1.10-0", "ip_address": "192.168.1.10", "network_id": 2})),
        );
        let client = UnisphereClient::new(mock, ARRAY_ID);
        let cfg = testing::all_enabled();
        let ctx = testing::context(&cfg, &client);
        let key = IpInterfaceKey {
            director_id: "SE-1E".to_string(),
            port_id: "4".to_string(),
            interface_id: "192.168.1.10-0".to_string(),
        };

        let record = Collector::new(&client, &ctx).collect_ip_interface(&key).unwrap();
        assert_eq!(record.get("iscsi_target_iqn"), Some(&json!("None")));
        assert_eq!(
            client.transport().last_body(IP_METRICS).unwrap()["ipInterfaceId"],
            "SE-1E:4:2:192.168.1.10"
        );
    }

    #[test]
    fn test_iscsi_target_record() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        let keys = collector.iscsi_target_keys().unwrap();
        assert_eq!(keys, vec![PortKey::new("SE-1E", "0")]);

        let record = collector.collect_iscsi_target(&keys[0]).unwrap();
        assert_eq!(record.reporting_level(), Some("iSCSI Target"));
        assert_eq!(record.get("dir_port_key"), Some(&json!("SE-1E:0")));
        assert_eq!(record.get("ip_addresses"), Some(&json!(["192.168.1.10"])));
        let body = client
            .transport()
            .last_body("/univmax/restapi/performance/ISCSITarget/metrics")
            .unwrap();
        assert_eq!(
            body["iSCSITargetId"],
            "iqn.1992-04.com.emc:600009700bcbb70e3287017400000001"
        );
    }
}
