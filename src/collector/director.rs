//! Director and port collectors.

use serde_json::{Value, json};

use super::{CollectError, Collector, DirectorKind, PortKey, PortKind, set_level};
use crate::client::Transport;
use crate::normalize::{NormalizedRecord, Payload, flatten};

impl<T: Transport> Collector<'_, T> {
    pub fn director_ids(&self) -> Result<Vec<String>, CollectError> {
        Ok(self
            .client
            .id_list(&self.client.system_path("director"), &[], "directorId")?)
    }

    /// Every port of the array as a `directorId`/`portId` pair.
    pub fn port_keys(&self) -> Result<Vec<PortKey>, CollectError> {
        let keys = self.client.object_list(
            &self.client.provisioning_path("port"),
            &[],
            "symmetrixPortKey",
        )?;
        Ok(keys.iter().filter_map(PortKey::from_payload).collect())
    }

    /// Collects one director.
    ///
    /// The director is classified before anything is fetched; an unknown
    /// emulation is fatal.
    pub fn collect_director(&self, director_id: &str) -> Result<NormalizedRecord, CollectError> {
        let kind = DirectorKind::classify(director_id)?;

        let mut body = self.fetch(
            &self
                .client
                .system_path(&format!("director/{}", director_id)),
        )?;
        let srdf_groups = body.remove("srdf_groups");
        let mut details = flatten(&body);
        set_level(&mut details, "Director");
        details.insert("director_type".to_string(), Value::from(kind.code()));
        match srdf_groups.as_ref().and_then(Value::as_array) {
            Some(groups) if !groups.is_empty() => {
                details.insert("num_srdf_groups".to_string(), Value::from(groups.len()));
            }
            _ => {}
        }

        let perf = self.performance(
            kind.perf_category(),
            &[("directorId", json!(director_id))],
            director_id,
        )?;
        Ok(self.normalizer().merge([&details, &perf], None))
    }

    /// Fetches the `symmetrixPort` object of one port.
    pub(super) fn port_details(&self, key: &PortKey) -> Result<Payload, CollectError> {
        let body = self.fetch(&self.client.system_path(&format!(
            "director/{}/port/{}",
            key.director_id, key.port_id
        )))?;
        let mut port = body
            .get("symmetrixPort")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| CollectError::MissingField {
                asset: key.to_string(),
                field: "symmetrixPort",
            })?;
        port.remove("symmetrixPortKey");
        Ok(port)
    }

    /// Collects one front-end, back-end or RDF port.
    pub fn collect_port(&self, key: &PortKey) -> Result<NormalizedRecord, CollectError> {
        let kind = PortKind::classify(&key.director_id)?;

        let mut details = flatten(&self.port_details(key)?);
        set_level(&mut details, "Port");
        insert_port_identity(&mut details, key);
        details.insert("port_dir_type".to_string(), Value::from(kind.label()));

        let perf = self.performance(
            kind.perf_category(),
            &[
                ("directorId", json!(key.director_id)),
                ("portId", json!(key.port_id)),
            ],
            &key.to_string(),
        )?;
        Ok(self.normalizer().merge([&details, &perf], None))
    }
}

/// Adds `port_id`, `director_id` and `dir_port_key` to a port payload.
pub(super) fn insert_port_identity(details: &mut Payload, key: &PortKey) {
    details.insert("port_id".to_string(), Value::from(key.port_id.as_str()));
    details.insert("director_id".to_string(), Value::from(key.director_id.as_str()));
    details.insert("dir_port_key".to_string(), Value::from(key.to_string()));
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

    fn system(rest: &str) -> String {
        format!("/univmax/restapi/100/system/symmetrix/{}/{}", ARRAY_ID, rest)
    }

    #[test]
    fn test_director_records() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        let ids = collector.director_ids().unwrap();
        assert_eq!(ids, vec!["DF-1C", "FA-1D", "RF-1F", "SE-1E"]);

        let be = collector.collect_director("DF-1C").unwrap();
        assert_eq!(be.reporting_level(), Some("Director"));
        assert_eq!(be.get("director_type"), Some(&json!("BE")));
        assert_eq!(be.get("director_id"), Some(&json!("DF-1C")));
        assert!(!be.contains_key("num_srdf_groups"));
        assert_eq!(be.get("percent_busy"), Some(&json!(12.5)));

        let rdf = collector.collect_director("RF-1F").unwrap();
        assert_eq!(rdf.get("director_type"), Some(&json!("RDF")));
        assert_eq!(rdf.get("num_srdf_groups"), Some(&json!(2)));
        assert!(!rdf.contains_key("srdf_groups_label"));

        let body = client
            .transport()
            .last_body("/univmax/restapi/performance/RDFDirector/metrics")
            .unwrap();
        assert_eq!(body["directorId"], "RF-1F");
    }

    #[test]
    fn test_unknown_director_fails_before_fetch() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);

        let err = Collector::new(&client, &ctx)
            .collect_director("ZZ-1A")
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(client.transport().call_count(&system("director/ZZ-1A")), 0);
    }

    #[test]
    fn test_port_records() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);
        let collector = Collector::new(&client, &ctx);

        let keys = collector.port_keys().unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0], PortKey::new("FA-1D", "4"));

        let fe = collector.collect_port(&keys[0]).unwrap();
        assert_eq!(fe.reporting_level(), Some("Port"));
        assert_eq!(fe.get("port_id"), Some(&json!("4")));
        assert_eq!(fe.get("director_id"), Some(&json!("FA-1D")));
        assert_eq!(fe.get("dir_port_key"), Some(&json!("FA-1D:4")));
        assert_eq!(fe.get("port_dir_type"), Some(&json!("Front End Director")));
        assert_eq!(fe.get("identifier"), Some(&json!("50000973b01bd004")));
        assert!(!fe.contains_key("symmetrix_port_key_director_id"));

        let be = collector.collect_port(&keys[1]).unwrap();
        assert_eq!(be.get("port_dir_type"), Some(&json!("Back End Director")));
        let body = client
            .transport()
            .last_body("/univmax/restapi/performance/BEPort/metrics")
            .unwrap();
        assert_eq!(body["directorId"], "DF-1C");
        assert_eq!(body["portId"], "8");
    }

    #[test]
    fn test_port_without_details_object() {
        let mock = MockTransport::typical_array();
        mock.add_get(&system("director/FA-1D/port/4"), Response::ok(json!({"other": 1})));
        let client = UnisphereClient::new(mock, ARRAY_ID);
        let cfg = testing::all_enabled();
        let ctx = testing::context(&cfg, &client);

        let err = Collector::new(&client, &ctx)
            .collect_port(&PortKey::new("FA-1D", "4"))
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("symmetrixPort"));
    }

    #[test]
    fn test_port_on_unsupported_director_is_fatal() {
        let cfg = testing::all_enabled();
        let client = testing::client();
        let ctx = testing::context(&cfg, &client);

        let err = Collector::new(&client, &ctx)
            .collect_port(&PortKey::new("IM-1A", "0"))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
