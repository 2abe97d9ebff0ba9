//! Unisphere REST client.
//!
//! `UnisphereClient` wraps a [`Transport`] with the endpoint layout of the
//! management API and decodes responses into [`Payload`] maps. It knows
//! nothing about categories being enabled or records being emitted; that is
//! the collectors' job.
//!
//! ## Sessions
//!
//! A [`Session`] owns the client for one collection run and closes the
//! transport when dropped, so every exit path of a run (success, validation
//! failure, fatal collection error) releases it.

pub mod mock;
pub mod transport;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::category::PerfCategory;
use crate::normalize::{Payload, to_snake_case};
use crate::resolver::{MetricCatalog, MetricSelection};

pub use transport::{Method, Response, RestTransport, Transport, TransportError};

/// Prefix shared by every REST resource.
const BASE_PATH: &str = "/univmax/restapi";

/// Versioned resource segment used for provisioning, system and replication.
pub const API_VERSION: &str = "100";

/// Oldest backend `(major, minor)` version the collector supports.
pub const MIN_VERSION: (u32, u32) = (10, 0);

/// Error type for management API calls.
#[derive(Debug)]
pub enum ApiError {
    /// No response was received.
    Transport(TransportError),
    /// The resource does not exist.
    NotFound(String),
    /// The server answered with a non-success status.
    Status {
        status: u16,
        path: String,
        message: String,
    },
    /// The response body did not have the expected shape.
    Decode { path: String, message: String },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(e) => write!(f, "{}", e),
            ApiError::NotFound(path) => write!(f, "resource not found: {}", path),
            ApiError::Status {
                status,
                path,
                message,
            } => write!(f, "{} returned status {}: {}", path, status, message),
            ApiError::Decode { path, message } => {
                write!(f, "unexpected response from {}: {}", path, message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        ApiError::Transport(e)
    }
}

/// Parses a backend version string such as `V10.0.0.1` or `T10.1.0.5`
/// into `(major, minor)`. Tuples compare in version order.
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let trimmed = version.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let mut parts = trimmed.split('.');
    let major = parts.next().filter(|p| !p.is_empty())?;
    let minor = parts.next().unwrap_or("0");
    if !major.bytes().all(|b| b.is_ascii_digit()) || !minor.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Turns a JSON list of scalars into strings; other items are skipped.
fn scalar_strings(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Client for one target array on one management server.
pub struct UnisphereClient<T: Transport> {
    transport: T,
    array_id: String,
    /// Metric catalogs fetched during this session, keyed by (category, kpi_only).
    catalog_cache: RefCell<HashMap<(PerfCategory, bool), Vec<String>>>,
}

impl<T: Transport> UnisphereClient<T> {
    pub fn new(transport: T, array_id: impl Into<String>) -> Self {
        Self {
            transport,
            array_id: array_id.into(),
            catalog_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn array_id(&self) -> &str {
        &self.array_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Releases the underlying transport session.
    pub fn close(&self) {
        self.transport.close();
    }

    // ---- paths ----

    /// `/univmax/restapi/100/<rest>`
    pub fn api_path(&self, rest: &str) -> String {
        format!("{}/{}/{}", BASE_PATH, API_VERSION, rest)
    }

    /// Provisioning resource of the target array.
    pub fn provisioning_path(&self, rest: &str) -> String {
        self.array_resource("sloprovisioning", rest)
    }

    /// System resource of the target array.
    pub fn system_path(&self, rest: &str) -> String {
        self.array_resource("system", rest)
    }

    /// Replication resource of the target array.
    pub fn replication_path(&self, rest: &str) -> String {
        self.array_resource("replication", rest)
    }

    fn array_resource(&self, section: &str, rest: &str) -> String {
        if rest.is_empty() {
            self.api_path(&format!("{}/symmetrix/{}", section, self.array_id))
        } else {
            self.api_path(&format!("{}/symmetrix/{}/{}", section, self.array_id, rest))
        }
    }

    /// Unversioned performance resource.
    pub fn performance_path(&self, rest: &str) -> String {
        format!("{}/performance/{}", BASE_PATH, rest)
    }

    // ---- raw access ----

    fn decode(&self, path: &str, response: Response) -> Result<Payload, ApiError> {
        if response.status == 404 {
            return Err(ApiError::NotFound(path.to_string()));
        }
        if !response.is_success() {
            let message = match &response.body {
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Value::String(s) => s.clone(),
                _ => String::new(),
            };
            return Err(ApiError::Status {
                status: response.status,
                path: path.to_string(),
                message,
            });
        }
        match response.body {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Payload::new()),
            other => Err(ApiError::Decode {
                path: path.to_string(),
                message: format!("expected an object, got {}", other),
            }),
        }
    }

    /// GET `path` and decode the JSON object it returns.
    pub fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Payload, ApiError> {
        trace!("GET {}", path);
        let response = self.transport.get(path, params)?;
        self.decode(path, response)
    }

    /// POST `body` to `path` and decode the JSON object it returns.
    pub fn post_json(&self, path: &str, body: &Value) -> Result<Payload, ApiError> {
        trace!("POST {}", path);
        let response = self.transport.post(path, body)?;
        self.decode(path, response)
    }

    /// GET a listing and return the scalar ids under `key`.
    pub fn id_list(
        &self,
        path: &str,
        params: &[(&str, String)],
        key: &str,
    ) -> Result<Vec<String>, ApiError> {
        let body = self.get_json(path, params)?;
        Ok(body
            .get(key)
            .and_then(Value::as_array)
            .map(|items| scalar_strings(items))
            .unwrap_or_default())
    }

    /// GET a listing and return the objects under `key`.
    pub fn object_list(
        &self,
        path: &str,
        params: &[(&str, String)],
        key: &str,
    ) -> Result<Vec<Payload>, ApiError> {
        let body = self.get_json(path, params)?;
        Ok(body
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default())
    }

    // ---- environment ----

    /// Backend version string, e.g. `V10.0.0.1`.
    pub fn version(&self) -> Result<String, ApiError> {
        let path = format!("{}/version", BASE_PATH);
        let body = self.get_json(&path, &[])?;
        body.get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ApiError::Decode {
                path,
                message: "missing version".to_string(),
            })
    }

    /// Arrays this backend can provision, i.e. the supported arrays.
    pub fn supported_arrays(&self) -> Result<Vec<String>, ApiError> {
        let path = self.api_path("sloprovisioning/symmetrix");
        self.id_list(&path, &[], "symmetrixId")
    }

    /// System description of the target array (model, microcode, locality).
    pub fn array_system(&self) -> Result<Payload, ApiError> {
        self.get_json(&self.system_path(""), &[])
    }

    /// Whether the array is registered for diagnostic performance collection.
    pub fn is_performance_registered(&self) -> Result<bool, ApiError> {
        let path = self.performance_path(&format!(
            "Array/registrationdetails/{}",
            self.array_id
        ));
        let body = match self.get_json(&path, &[]) {
            Ok(body) => body,
            Err(ApiError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(body
            .get("registrationDetailsInfo")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|info| info.get("diagnostic"))
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Most recent timestamp (ms) with performance data for the target array.
    pub fn last_available_timestamp(&self) -> Result<Option<i64>, ApiError> {
        let path = self.performance_path("Array/keys");
        let arrays = self.object_list(&path, &[], "arrayInfo")?;
        Ok(arrays
            .iter()
            .find(|info| {
                info.get("symmetrixId").and_then(Value::as_str) == Some(self.array_id.as_str())
            })
            .and_then(|info| info.get("lastAvailableDate"))
            .and_then(Value::as_i64))
    }

    // ---- performance ----

    /// Metric names of `category`; only KPI metrics when `kpi_only` is set.
    ///
    /// Catalogs are cached for the lifetime of the client.
    pub fn metric_catalog(
        &self,
        category: PerfCategory,
        kpi_only: bool,
    ) -> Result<Vec<String>, ApiError> {
        if let Some(cached) = self.catalog_cache.borrow().get(&(category, kpi_only)) {
            return Ok(cached.clone());
        }

        let path = self.performance_path(&format!("{}/metrics", category.catalog_name()));
        let names = self.id_list(&path, &[("kpi", kpi_only.to_string())], "metricName")?;
        debug!(
            "Loaded {} {} metric names for {}",
            names.len(),
            if kpi_only { "KPI" } else { "available" },
            category
        );

        self.catalog_cache
            .borrow_mut()
            .insert((category, kpi_only), names.clone());
        Ok(names)
    }

    /// Metric names a selection expands to.
    pub fn selection_metrics(
        &self,
        category: PerfCategory,
        selection: &MetricSelection,
    ) -> Result<Vec<String>, ApiError> {
        match selection {
            MetricSelection::All => self.metric_catalog(category, false),
            MetricSelection::Kpi => self.metric_catalog(category, true),
            MetricSelection::Custom(metrics) => Ok(metrics.clone()),
        }
    }

    /// Fetches one sample of `category` for the asset identified by `keys`.
    ///
    /// Returns `None` when the backend has no data for the asset. The result
    /// keeps the wrapper fields (`reporting_level`, `result`, pagination) so
    /// callers extract it with [`crate::normalize::extract_performance_result`].
    pub fn performance_stats(
        &self,
        category: PerfCategory,
        keys: &[(&str, Value)],
        selection: &MetricSelection,
        timestamp: i64,
    ) -> Result<Option<Payload>, ApiError> {
        let metrics = self.selection_metrics(category, selection)?;

        let mut body = Payload::new();
        body.insert("symmetrixId".to_string(), Value::from(self.array_id.as_str()));
        for (key, value) in keys {
            body.insert((*key).to_string(), value.clone());
        }
        body.insert("startDate".to_string(), Value::from(timestamp));
        body.insert("endDate".to_string(), Value::from(timestamp));
        body.insert("dataFormat".to_string(), Value::from("Average"));
        body.insert("metrics".to_string(), json!(metrics));

        let path = self.performance_path(&format!("{}/metrics", category.catalog_name()));
        let response = match self.post_json(&path, &Value::Object(body)) {
            Ok(response) => response,
            Err(ApiError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if response.is_empty() {
            return Ok(None);
        }

        let mut shaped = Payload::new();
        shaped.insert(
            "reporting_level".to_string(),
            Value::from(category.catalog_name()),
        );
        for (key, value) in &response {
            match (key.as_str(), value) {
                ("resultList", Value::Object(list)) => {
                    for (k, v) in list {
                        shaped.insert(to_snake_case(k), v.clone());
                    }
                }
                _ => {
                    shaped.insert(to_snake_case(key), value.clone());
                }
            }
        }
        Ok(Some(shaped))
    }

    /// Lists the performance keys of `category` at `timestamp`.
    ///
    /// A missing listing means the array has no such assets and yields an
    /// empty list.
    pub fn performance_keys(
        &self,
        category: PerfCategory,
        extra: &[(&str, Value)],
        list_key: &str,
        timestamp: Option<i64>,
    ) -> Result<Vec<Payload>, ApiError> {
        let mut body = Payload::new();
        body.insert("symmetrixId".to_string(), Value::from(self.array_id.as_str()));
        for (key, value) in extra {
            body.insert((*key).to_string(), value.clone());
        }
        if let Some(ts) = timestamp {
            body.insert("startDate".to_string(), Value::from(ts));
            body.insert("endDate".to_string(), Value::from(ts));
        }

        let path = self.performance_path(&format!("{}/keys", category.catalog_name()));
        let response = match self.post_json(&path, &Value::Object(body)) {
            Ok(response) => response,
            Err(ApiError::NotFound(_)) => {
                debug!("No {} performance keys registered", category);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(response
            .get(list_key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default())
    }
}

impl<T: Transport> MetricCatalog for UnisphereClient<T> {
    fn metric_names(&self, category: PerfCategory) -> Result<Vec<String>, ApiError> {
        self.metric_catalog(category, false)
    }
}

/// A client scoped to one collection run.
///
/// Dropping the session closes the transport.
pub struct Session<T: Transport> {
    client: UnisphereClient<T>,
}

impl<T: Transport> Session<T> {
    pub fn open(client: UnisphereClient<T>) -> Self {
        debug!("Opened session for array {}", client.array_id());
        Self { client }
    }
}

impl<T: Transport> Deref for Session<T> {
    type Target = UnisphereClient<T>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.client.close();
        debug!("Closed session for array {}", self.client.array_id());
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use std::sync::Arc;

    const ARRAY: &str = "000197600123";

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("V10.0.0.1"), Some((10, 0)));
        assert_eq!(parse_version("T10.1.0.5"), Some((10, 1)));
        assert_eq!(parse_version("V9.2.1.4"), Some((9, 2)));
        assert_eq!(parse_version("10"), Some((10, 0)));
        assert_eq!(parse_version("garbage"), None);
        assert_eq!(parse_version("V10.x"), None);
    }

    #[test]
    fn test_two_digit_minor_is_not_a_newer_major() {
        let old = parse_version("V9.10.0.1").unwrap();
        assert_eq!(old, (9, 10));
        assert!(old < MIN_VERSION);
        assert!(parse_version("V10.0.0.1").unwrap() >= MIN_VERSION);
        assert!(parse_version("V11.0").unwrap() >= MIN_VERSION);
    }

    #[test]
    fn test_paths() {
        let client = UnisphereClient::new(MockTransport::new(), ARRAY);
        assert_eq!(
            client.provisioning_path("host"),
            "/univmax/restapi/100/sloprovisioning/symmetrix/000197600123/host"
        );
        assert_eq!(
            client.system_path(""),
            "/univmax/restapi/100/system/symmetrix/000197600123"
        );
        assert_eq!(
            client.performance_path("Array/keys"),
            "/univmax/restapi/performance/Array/keys"
        );
    }

    #[test]
    fn test_status_errors() {
        let mock = MockTransport::new();
        mock.add_get("/missing", Response::new(404, json!({"message": "nope"})));
        mock.add_get("/broken", Response::new(500, json!({"message": "boom"})));
        mock.add_get("/list", Response::ok(json!([1, 2])));
        let client = UnisphereClient::new(mock, ARRAY);

        assert!(client.get_json("/missing", &[]).unwrap_err().is_not_found());
        match client.get_json("/broken", &[]).unwrap_err() {
            ApiError::Status { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(matches!(
            client.get_json("/list", &[]).unwrap_err(),
            ApiError::Decode { .. }
        ));
    }

    #[test]
    fn test_transport_failure() {
        let mock = MockTransport::new();
        mock.fail_get("/down", "connection refused");
        let client = UnisphereClient::new(mock, ARRAY);
        assert!(matches!(
            client.get_json("/down", &[]).unwrap_err(),
            ApiError::Transport(_)
        ));
    }

    #[test]
    fn test_id_list_accepts_numbers() {
        let mock = MockTransport::new();
        mock.add_get("/rdfg", Response::ok(json!({"rdfgNumbers": [1, "2", {"x": 3}]})));
        let client = UnisphereClient::new(mock, ARRAY);
        assert_eq!(
            client.id_list("/rdfg", &[], "rdfgNumbers").unwrap(),
            vec!["1".to_string(), "2".to_string()]
        );
    }

    #[test]
    fn test_metric_catalog_is_cached() {
        let mock = Arc::new(MockTransport::new());
        mock.add_get(
            "/univmax/restapi/performance/Array/metrics",
            Response::ok(json!({"metricName": ["PercentBusy", "HostIOs"]})),
        );
        let client = UnisphereClient::new(Arc::clone(&mock), ARRAY);

        let first = client.metric_names(PerfCategory::Array).unwrap();
        let second = client.metric_names(PerfCategory::Array).unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.call_count("/univmax/restapi/performance/Array/metrics"), 1);
    }

    #[test]
    fn test_performance_stats_shape() {
        let mock = Arc::new(MockTransport::new());
        mock.add_post(
            "/univmax/restapi/performance/Host/metrics",
            Response::ok(json!({
                "expirationTime": 1,
                "count": 1,
                "maxPageSize": 1000,
                "id": "abc",
                "resultList": {"result": [{"HostIOs": 4.0, "timestamp": 7}], "from": 1, "to": 1}
            })),
        );
        let client = UnisphereClient::new(Arc::clone(&mock), ARRAY);
        let stats = client
            .performance_stats(
                PerfCategory::Host,
                &[("hostId", json!("h1"))],
                &MetricSelection::Custom(vec!["HostIOs".to_string()]),
                7,
            )
            .unwrap()
            .unwrap();

        assert_eq!(stats.get("reporting_level"), Some(&json!("Host")));
        assert_eq!(stats.get("max_page_size"), Some(&json!(1000)));
        assert!(stats.get("result").is_some());

        let sent = mock.last_body("/univmax/restapi/performance/Host/metrics").unwrap();
        assert_eq!(sent["hostId"], json!("h1"));
        assert_eq!(sent["metrics"], json!(["HostIOs"]));
        assert_eq!(sent["startDate"], json!(7));
        assert_eq!(sent["symmetrixId"], json!(ARRAY));
    }

    #[test]
    fn test_performance_stats_not_found_is_none() {
        let client = UnisphereClient::new(MockTransport::new(), ARRAY);
        let stats = client
            .performance_stats(
                PerfCategory::Srp,
                &[],
                &MetricSelection::Custom(vec!["HostIOs".to_string()]),
                7,
            )
            .unwrap();
        assert!(stats.is_none());
    }

    #[test]
    fn test_performance_keys_missing_listing_is_empty() {
        let client = UnisphereClient::new(MockTransport::new(), ARRAY);
        let keys = client
            .performance_keys(PerfCategory::Rdfs, &[], "rdfsKeyResult", None)
            .unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_session_closes_on_drop() {
        let mock = Arc::new(MockTransport::new());
        {
            let session = Session::open(UnisphereClient::new(Arc::clone(&mock), ARRAY));
            assert_eq!(session.array_id(), ARRAY);
            assert!(!mock.is_closed());
        }
        assert!(mock.is_closed());
    }
}
