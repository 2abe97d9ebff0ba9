//! One collection run, from validation to the closing duration diagnostic.
//!
//! A run opens one [`Session`], validates the environment, resolves the
//! collection context and then visits every enabled category in the fixed
//! order of [`Category::ALL`]. Records are handed to the sink as soon as they
//! are built.
//!
//! Failure scopes:
//! - a validation failure aborts the run before any asset is touched;
//! - a failed category listing is logged and the next category runs;
//! - a failed asset is logged and the next asset runs; an iSCSI director or
//!   port whose listing fails counts as a failed asset;
//! - an unknown asset type aborts the run.
//!
//! The session is closed on every exit path.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn};

use crate::category::Category;
use crate::client::{Session, Transport, UnisphereClient};
use crate::collector::{CollectError, Collector};
use crate::config::{ConfigError, ConfigStore, InputConfig};
use crate::context::CollectionContext;
use crate::normalize::NormalizedRecord;
use crate::sink::EventSink;
use crate::validator::{EnvironmentValidator, SAMPLE_GRANULARITY_SECS, ValidationError};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Validating,
    /// Validation failed or a fatal collection error occurred.
    Failed,
    Validated,
    Collecting(Category),
    Finalizing,
    Done,
}

/// Error type for a run that did not complete.
#[derive(Debug)]
pub enum RunError {
    Validation(ValidationError),
    Collection(CollectError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Validation(e) => write!(f, "{}", e),
            RunError::Collection(e) => write!(f, "collection aborted: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

impl From<ValidationError> for RunError {
    fn from(e: ValidationError) -> Self {
        RunError::Validation(e)
    }
}

impl From<CollectError> for RunError {
    fn from(e: CollectError) -> Self {
        RunError::Collection(e)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Records handed to the sink.
    pub records: u64,
    pub asset_failures: u64,
    pub category_failures: u64,
    /// Run timestamp (ms) every performance query used.
    pub timestamp: i64,
    pub duration: Duration,
    /// Smallest valid interval the run would fit in.
    pub suggested_interval: u64,
}

/// Smallest multiple of the sample granularity that covers `elapsed`.
pub fn suggested_interval(elapsed: Duration) -> u64 {
    let slots = (elapsed.as_secs_f64() / SAMPLE_GRANULARITY_SECS as f64).ceil() as u64;
    slots.max(1) * SAMPLE_GRANULARITY_SECS
}

/// Hands records to the sink and keeps the run's counters.
struct Emitter<'s> {
    sink: &'s mut dyn EventSink,
    summary: RunSummary,
}

impl Emitter<'_> {
    fn emit(&mut self, record: NormalizedRecord) {
        self.summary.records += 1;
        self.sink.emit(record);
    }

    /// Logs and counts a failed asset. Fatal errors are returned instead.
    fn attempt<R>(
        &mut self,
        category: Category,
        asset: &str,
        result: Result<R, CollectError>,
    ) -> Result<Option<R>, CollectError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(category = %category, asset = %asset, "Unable to collect asset: {}", e);
                self.summary.asset_failures += 1;
                Ok(None)
            }
        }
    }

    /// Logs and counts a failed listing inside a category, which then
    /// continues with what it could list. Fatal errors are returned instead.
    fn listing<K>(
        &mut self,
        category: Category,
        what: &str,
        result: Result<Vec<K>, CollectError>,
    ) -> Result<Vec<K>, CollectError> {
        match result {
            Ok(keys) => Ok(keys),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(category = %category, "Unable to list {}: {}", what, e);
                self.summary.category_failures += 1;
                Ok(Vec::new())
            }
        }
    }

    /// Collects and emits one record per key.
    fn each<K, F>(&mut self, category: Category, keys: &[K], mut collect: F) -> Result<(), CollectError>
    where
        K: fmt::Display,
        F: FnMut(&K) -> Result<NormalizedRecord, CollectError>,
    {
        for key in keys {
            if let Some(record) = self.attempt(category, &key.to_string(), collect(key))? {
                self.emit(record);
            }
        }
        Ok(())
    }
}

/// Runs every asset of one category through its collector.
fn collect_category<T: Transport>(
    collector: &Collector<'_, T>,
    category: Category,
    out: &mut Emitter<'_>,
) -> Result<(), CollectError> {
    match category {
        Category::Array => {
            let array_id = collector.context().array_id.clone();
            if let Some(record) = out.attempt(category, &array_id, collector.collect_array())? {
                out.emit(record);
            }
        }
        Category::Srp => {
            out.each(category, &collector.srp_ids()?, |id| collector.collect_srp(id))?
        }
        Category::StorageGroup => out.each(category, &collector.storage_group_ids()?, |id| {
            collector.collect_storage_group(id)
        })?,
        Category::Director => out.each(category, &collector.director_ids()?, |id| {
            collector.collect_director(id)
        })?,
        Category::Port => {
            out.each(category, &collector.port_keys()?, |key| collector.collect_port(key))?
        }
        Category::PortGroup => out.each(category, &collector.port_group_ids()?, |id| {
            collector.collect_port_group(id)
        })?,
        Category::Host => {
            let ids = collector.host_ids()?;
            let active = collector.active_hosts()?;
            out.each(category, &ids, |id| collector.collect_host(id, &active))?
        }
        Category::Initiator => {
            let ids = collector.initiator_ids()?;
            let active = collector.active_initiators()?;
            out.each(category, &ids, |id| collector.collect_initiator(id, &active))?
        }
        Category::MaskingView => {
            for id in collector.masking_view_ids()? {
                if let Some(records) =
                    out.attempt(category, &id, collector.collect_masking_view(&id))?
                {
                    for record in records {
                        out.emit(record);
                    }
                }
            }
        }
        Category::Iscsi => {
            let directors =
                out.listing(category, "iSCSI directors", collector.iscsi_director_ids())?;
            for director_id in &directors {
                let Some(ports) =
                    out.attempt(category, director_id, collector.iscsi_ports(director_id))?
                else {
                    continue;
                };
                for port in &ports {
                    let Some(interfaces) = out.attempt(
                        category,
                        &port.to_string(),
                        collector.ip_interface_keys(port),
                    )?
                    else {
                        continue;
                    };
                    out.each(category, &interfaces, |key| collector.collect_ip_interface(key))?;
                }
            }
            let targets = out.listing(category, "iSCSI targets", collector.iscsi_target_keys())?;
            out.each(category, &targets, |key| collector.collect_iscsi_target(key))?;
        }
        Category::Rdf => {
            for group in collector.rdf_groups()? {
                let Some(record) =
                    out.attempt(category, &group.label, collector.collect_rdf_group(&group))?
                else {
                    continue;
                };
                out.emit(record.clone());
                if let Some(devices) =
                    out.attempt(category, &group.label, collector.rdf_pair_devices(&group))?
                {
                    out.each(category, &devices, |device| {
                        collector.collect_rdf_pair(&group, &record, device)
                    })?;
                }
            }
        }
        Category::MetroDr => out.each(category, &collector.metro_dr_ids()?, |name| {
            collector.collect_metro_dr(name)
        })?,
        Category::SnapshotPolicy => out.each(category, &collector.snapshot_policy_ids()?, |name| {
            collector.collect_snapshot_policy(name)
        })?,
        Category::Alert => out.each(category, &collector.alert_ids()?, |id| {
            collector.collect_alert(id)
        })?,
        Category::AuditLog => out.each(category, &collector.audit_log_ids()?, |id| {
            collector.collect_audit_log(id)
        })?,
    }
    Ok(())
}

/// Drives collection runs for one data input.
pub struct Orchestrator<'a> {
    config: &'a dyn ConfigStore,
    input_name: String,
    array_id: String,
    source_host: String,
    now_ms: Option<i64>,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a dyn ConfigStore,
        input_name: impl Into<String>,
        array_id: impl Into<String>,
        source_host: impl Into<String>,
    ) -> Self {
        Self {
            config,
            input_name: input_name.into(),
            array_id: array_id.into(),
            source_host: source_host.into(),
            now_ms: None,
            state: RunState::NotStarted,
        }
    }

    /// Orchestrator for the array and management server named by `input`.
    pub fn from_input(input: &'a InputConfig) -> Result<Self, ConfigError> {
        let conn = input.connection()?;
        Ok(Self::new(input, input.name(), conn.array_id, conn.host))
    }

    /// Validates freshness against `now_ms` instead of the wall clock.
    pub fn at(mut self, now_ms: i64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Performs one collection run over `transport`.
    ///
    /// The transport is closed before this returns, whatever the outcome.
    pub fn run<T: Transport>(
        &mut self,
        transport: T,
        sink: &mut dyn EventSink,
    ) -> Result<RunSummary, RunError> {
        let span = info_span!("run", input = %self.input_name, array = %self.array_id);
        let _enter = span.enter();
        let started = Instant::now();

        let session = Session::open(UnisphereClient::new(transport, self.array_id.as_str()));
        let client: &UnisphereClient<T> = &session;

        self.state = RunState::Validating;
        let validator = EnvironmentValidator::new(client, self.config.interval());
        let validated = match self.now_ms {
            Some(now) => validator.validate_at(now),
            None => validator.validate(),
        };
        let env = match validated {
            Ok(env) => env,
            Err(e) => {
                error!(critical = true, "{}", e);
                self.state = RunState::Failed;
                return Err(e.into());
            }
        };
        self.state = RunState::Validated;

        let ctx = CollectionContext::resolve(
            &self.input_name,
            &self.array_id,
            &self.source_host,
            self.config,
            &env,
            client,
        );
        let collector = Collector::new(client, &ctx);
        let mut out = Emitter {
            sink,
            summary: RunSummary {
                timestamp: ctx.timestamp,
                ..RunSummary::default()
            },
        };

        for category in Category::ALL {
            if !ctx.is_enabled(category) {
                continue;
            }
            self.state = RunState::Collecting(category);
            match collect_category(&collector, category, &mut out) {
                Ok(()) => info!("{} collection complete.", category),
                Err(e) if e.is_fatal() => {
                    error!(critical = true, category = %category, "{}", e);
                    self.state = RunState::Failed;
                    return Err(e.into());
                }
                Err(e) => {
                    error!(category = %category, "Unable to list {} assets: {}", category, e);
                    out.summary.category_failures += 1;
                }
            }
        }

        self.state = RunState::Finalizing;
        out.sink.flush();
        let mut summary = out.summary;
        drop(session);

        summary.duration = started.elapsed();
        summary.suggested_interval = suggested_interval(summary.duration);
        let interval = ctx.interval;
        if summary.suggested_interval > interval {
            warn!(
                "Run took {:.0} seconds, longer than the configured interval of {} seconds. \
                 Suggested interval: {} seconds.",
                summary.duration.as_secs_f64(),
                interval,
                summary.suggested_interval
            );
        } else {
            info!(
                "Completed metrics collection run in {:.0} seconds.",
                summary.duration.as_secs_f64()
            );
        }
        info!(
            records = summary.records,
            asset_failures = summary.asset_failures,
            category_failures = summary.category_failures,
            "Run finished"
        );

        self.state = RunState::Done;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::client::mock::MockTransport;
    use crate::client::mock::scenarios::{ARRAY_ID, LAST_AVAILABLE};
    use crate::client::transport::Response;
    use crate::collector::testing;
    use crate::sink::MemorySink;

    const NOW: i64 = LAST_AVAILABLE + 60_000;

    fn system(rest: &str) -> String {
        format!("/univmax/restapi/100/system/symmetrix/{}/{}", ARRAY_ID, rest)
    }

    fn run(config: &InputConfig, mock: Arc<MockTransport>) -> (Result<RunSummary, RunError>, MemorySink, RunState) {
        let mut sink = MemorySink::new();
        let mut orchestrator = Orchestrator::new(config, "test", ARRAY_ID, "10.0.0.5").at(NOW);
        let result = orchestrator.run(mock, &mut sink);
        (result, sink, orchestrator.state())
    }

    fn levels(sink: &MemorySink) -> Vec<&str> {
        sink.records
            .iter()
            .filter_map(|r| r.reporting_level())
            .collect()
    }

    #[test]
    fn test_full_run_emits_every_category_in_order() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        let (result, sink, state) = run(&cfg, mock.clone());

        let summary = result.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(summary.asset_failures, 0);
        assert_eq!(summary.category_failures, 0);
        assert_eq!(summary.timestamp, LAST_AVAILABLE);
        assert_eq!(summary.records as usize, sink.records.len());
        assert_eq!(summary.suggested_interval, 300);
        assert!(mock.is_closed());

        assert_eq!(
            levels(&sink),
            vec![
                "Array",
                "SRP",
                "SG",
                "SG",
                "Director",
                "Director",
                "Director",
                "Director",
                "Port",
                "Port",
                "Port",
                "Port Group",
                "Host",
                "Host",
                "Initiator",
                "Initiator",
                "Masking View",
                "Masking View Connection",
                "Masking View Connection",
                "IP Interface",
                "iSCSI Target",
                "RDF Group",
                "RDF Pair",
                "RDF Pair",
                "RDF Group",
                "RDF Group",
                "Metro DR",
                "Snapshot Policy",
                "Snapshot Policy",
                "Alert",
                "Alert",
                "Audit Log",
                "Audit Log",
            ]
        );
        for record in &sink.records {
            assert_eq!(record.get("array_id"), Some(&json!(ARRAY_ID)));
            assert!(record.timestamp().is_some());
            assert!(record.fields().values().all(|v| !v.is_object()));
        }
    }

    #[test]
    fn test_array_only_end_to_end() {
        let cfg = InputConfig::new()
            .with("interval", "300")
            .with("select_array", "array_all");
        let mock = Arc::new(MockTransport::typical_array());
        let v = "/univmax/restapi/100";
        mock.add_get(
            &format!("{}/sloprovisioning/symmetrix/{}", v, ARRAY_ID),
            Response::ok(json!({"device_count": 10})),
        );
        mock.add_get(
            &format!("{}/wlp/symmetrix/{}", v, ARRAY_ID),
            Response::ok(json!({"symmetrixCapability": []})),
        );
        mock.add_post(
            "/univmax/restapi/performance/Array/metrics",
            Response::ok(json!({"resultList": {"result": [{"PercentBusy": 12.5}]}})),
        );

        let (result, sink, _) = run(&cfg, mock.clone());
        result.unwrap();
        assert_eq!(sink.records.len(), 1);

        let record = &sink.records[0];
        let expected = json!({
            "reporting_level": "Array",
            "array_id": ARRAY_ID,
            "timestamp": LAST_AVAILABLE,
            "device_count": 10,
            "array_wlp_details": false,
            "array_wlp_message": "No Array WLP data available",
            "percent_busy": 12.5
        });
        for (key, value) in expected.as_object().unwrap() {
            assert_eq!(record.get(key), Some(value), "{}", key);
        }
        assert_eq!(
            mock.call_count(&format!("{}/sloprovisioning/symmetrix/{}/srp", v, ARRAY_ID)),
            0
        );
    }

    #[test]
    fn test_failed_asset_is_isolated() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        mock.add_get(
            &system("director/FA-1D"),
            Response::new(500, json!({"message": "director service down"})),
        );

        let (result, sink, _) = run(&cfg, mock);
        let summary = result.unwrap();
        assert_eq!(summary.asset_failures, 1);
        let directors: Vec<_> = sink
            .with_level("Director")
            .iter()
            .filter_map(|r| r.get("director_id").cloned())
            .collect();
        assert_eq!(directors, vec![json!("DF-1C"), json!("RF-1F"), json!("SE-1E")]);
        assert_eq!(sink.with_level("Port").len(), 3);
    }

    #[test]
    fn test_failed_listing_is_isolated() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        mock.fail_get(
            &format!("/univmax/restapi/100/sloprovisioning/symmetrix/{}/srp", ARRAY_ID),
            "connection reset",
        );

        let (result, sink, _) = run(&cfg, mock);
        let summary = result.unwrap();
        assert_eq!(summary.category_failures, 1);
        assert!(sink.with_level("SRP").is_empty());
        assert_eq!(sink.with_level("Array").len(), 1);
        assert_eq!(sink.with_level("Audit Log").len(), 2);
    }

    #[test]
    fn test_rdf_pair_failure_keeps_group() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        mock.add_get(
            &format!(
                "/univmax/restapi/100/replication/symmetrix/{}/rdf_group/1/volume/00001",
                ARRAY_ID
            ),
            Response::new(500, json!({"message": "pair unavailable"})),
        );

        let (result, sink, _) = run(&cfg, mock);
        assert_eq!(result.unwrap().asset_failures, 1);
        assert_eq!(sink.with_level("RDF Group").len(), 3);
        assert_eq!(sink.with_level("RDF Pair").len(), 1);
    }

    #[test]
    fn test_failed_iscsi_port_listing_keeps_targets() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        mock.add_get(
            &system("director/SE-1E/port"),
            Response::new(500, json!({"message": "port service down"})),
        );

        let (result, sink, _) = run(&cfg, mock);
        let summary = result.unwrap();
        assert_eq!(summary.asset_failures, 1);
        assert_eq!(summary.category_failures, 0);
        assert!(sink.with_level("IP Interface").is_empty());
        let targets = sink.with_level("iSCSI Target");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].get("dir_port_key"), Some(&json!("SE-1E:0")));
    }

    #[test]
    fn test_failed_ip_interface_listing_keeps_targets() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        mock.fail_get(&system("director/SE-1E/port/4/ip_interface"), "connection reset");

        let (result, sink, _) = run(&cfg, mock);
        assert_eq!(result.unwrap().asset_failures, 1);
        assert!(sink.with_level("IP Interface").is_empty());
        assert_eq!(sink.with_level("iSCSI Target").len(), 1);
    }

    #[test]
    fn test_iscsi_discovery_skips_other_directors() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());

        let (result, sink, _) = run(&cfg, mock.clone());
        assert_eq!(result.unwrap().asset_failures, 0);
        assert_eq!(sink.with_level("IP Interface").len(), 1);
        for director in ["DF-1C", "FA-1D", "RF-1F"] {
            assert_eq!(mock.call_count(&system(&format!("director/{}/port", director))), 0);
        }
    }

    #[test]
    fn test_validation_failure_emits_nothing() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        let mut sink = MemorySink::new();
        let mut orchestrator =
            Orchestrator::new(&cfg, "test", ARRAY_ID, "10.0.0.5").at(LAST_AVAILABLE + 3_600_000);

        let err = orchestrator.run(mock.clone(), &mut sink).unwrap_err();
        assert!(matches!(err, RunError::Validation(ValidationError::Environment(_))));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(sink.records.is_empty());
        assert!(mock.is_closed());
    }

    #[test]
    fn test_bad_interval_aborts_before_any_call() {
        let cfg = testing::all_enabled().with("interval", "450");
        let mock = Arc::new(MockTransport::typical_array());

        let (result, sink, state) = run(&cfg, mock.clone());
        assert!(matches!(result, Err(RunError::Validation(ValidationError::Config(_)))));
        assert_eq!(state, RunState::Failed);
        assert!(sink.records.is_empty());
        assert!(mock.calls().is_empty());
        assert!(mock.is_closed());
    }

    #[test]
    fn test_unknown_director_aborts_run() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        mock.add_get(
            &system("director"),
            Response::ok(json!({"directorId": ["DF-1C", "ZZ-1A", "RF-1F"]})),
        );

        let (result, sink, state) = run(&cfg, mock.clone());
        let err = result.unwrap_err();
        assert!(matches!(err, RunError::Collection(CollectError::UnknownAssetType(_))));
        assert_eq!(state, RunState::Failed);
        assert_eq!(sink.with_level("Director").len(), 1);
        assert!(sink.with_level("Port").is_empty());
        assert!(mock.is_closed());
    }

    #[test]
    fn test_inactive_host_has_no_performance_query() {
        let cfg = testing::all_enabled();
        let mock = Arc::new(MockTransport::typical_array());
        let (result, sink, _) = run(&cfg, mock.clone());
        result.unwrap();

        let host_queries: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|c| c.path == "/univmax/restapi/performance/Host/metrics")
            .filter_map(|c| c.body)
            .collect();
        assert_eq!(host_queries.len(), 1);
        assert_eq!(host_queries[0]["hostId"], "host_a");

        let hosts = sink.with_level("Host");
        assert_eq!(hosts[1].get("host_id"), Some(&json!("host_b")));
        assert_eq!(hosts[1].get("performance_metrics"), Some(&json!(false)));
    }

    #[test]
    fn test_suggested_interval() {
        assert_eq!(suggested_interval(Duration::ZERO), 300);
        assert_eq!(suggested_interval(Duration::from_secs(42)), 300);
        assert_eq!(suggested_interval(Duration::from_secs(300)), 300);
        assert_eq!(suggested_interval(Duration::from_secs(301)), 600);
        assert_eq!(suggested_interval(Duration::from_secs(1000)), 1200);
    }
}
