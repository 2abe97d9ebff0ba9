//! Pre-built mock management servers for testing.
//!
//! These scenarios return realistic payloads for one PowerMax array so that
//! collectors and the orchestrator can be exercised end to end.

use serde_json::{Value, json};

use super::transport::MockTransport;
use crate::category::PerfCategory;
use crate::client::transport::Response;

/// Array served by [`MockTransport::typical_array`].
pub const ARRAY_ID: &str = "000197600123";

/// Last available performance timestamp of the typical array (ms).
pub const LAST_AVAILABLE: i64 = 1_700_000_100_000;

const V: &str = "/univmax/restapi/100";
const PERF: &str = "/univmax/restapi/performance";

/// Every metric in the mock catalog.
pub const ALL_METRICS: &[&str] = &[
    "PercentBusy",
    "HostIOs",
    "HostMBs",
    "ReadResponseTime",
    "WriteResponseTime",
];

/// KPI subset of [`ALL_METRICS`].
pub const KPI_METRICS: &[&str] = &["PercentBusy", "HostIOs"];

fn ok(body: Value) -> Response {
    Response::ok(body)
}

fn not_found() -> Response {
    Response::new(404, json!({"message": "No performance data found"}))
}

fn prov(rest: &str) -> String {
    format!("{}/sloprovisioning/symmetrix/{}/{}", V, ARRAY_ID, rest)
}

fn system(rest: &str) -> String {
    format!("{}/system/symmetrix/{}/{}", V, ARRAY_ID, rest)
}

fn replication(rest: &str) -> String {
    format!("{}/replication/symmetrix/{}/{}", V, ARRAY_ID, rest)
}

fn perf(rest: &str) -> String {
    format!("{}/{}", PERF, rest)
}

impl MockTransport {
    /// A healthy V3 array with one or more assets in every category.
    ///
    /// Includes: four directors (BE, FE, RDF, iSCSI), three ports, two hosts (one
    /// active), two initiators (one iSCSI), a masking view with two
    /// connections, three RDF groups (sync, async, neither), alerts and
    /// audit records inside the first interval.
    pub fn typical_array() -> Self {
        let mock = Self::new();
        mock.add_environment();
        mock.add_metric_catalogs();
        mock.add_array();
        mock.add_provisioning();
        mock.add_directors();
        mock.add_iscsi();
        mock.add_replication();
        mock.add_events();
        mock
    }

    fn add_environment(&self) {
        self.add_get(
            "/univmax/restapi/version",
            ok(json!({"version": "V10.0.0.1", "api_version": "100"})),
        );
        self.add_get(
            &format!("{}/sloprovisioning/symmetrix", V),
            ok(json!({"symmetrixId": [ARRAY_ID, "000197600999"]})),
        );
        self.add_get(
            &format!("{}/system/symmetrix/{}", V, ARRAY_ID),
            ok(json!({
                "symmetrixId": ARRAY_ID,
                "model": "PowerMax_8000",
                "ucode": "5978.711.711",
                "local": true,
                "device_count": 1024,
                "disk_count": 64
            })),
        );
        self.add_get(
            &perf(&format!("Array/registrationdetails/{}", ARRAY_ID)),
            ok(json!({"registrationDetailsInfo": [{
                "symmetrixId": ARRAY_ID,
                "realtime": true,
                "message": "",
                "collectionintervalmins": 5,
                "diagnostic": true
            }]})),
        );
        self.add_get(
            &perf("Array/keys"),
            ok(json!({"arrayInfo": [
                {
                    "symmetrixId": "000197600999",
                    "firstAvailableDate": 1_600_000_000_000_i64,
                    "lastAvailableDate": 1_600_000_000_000_i64
                },
                {
                    "symmetrixId": ARRAY_ID,
                    "firstAvailableDate": 1_690_000_000_000_i64,
                    "lastAvailableDate": LAST_AVAILABLE
                }
            ]})),
        );
    }

    fn add_metric_catalogs(&self) {
        for category in PerfCategory::ALL {
            let path = perf(&format!("{}/metrics", category.catalog_name()));
            self.add_get_when(&path, &[("kpi", "false")], ok(json!({"metricName": ALL_METRICS})));
            self.add_get_when(&path, &[("kpi", "true")], ok(json!({"metricName": KPI_METRICS})));
            // Catch-all sample for every asset of the category.
            self.add_post(
                &path,
                ok(json!({
                    "expirationTime": LAST_AVAILABLE + 600_000,
                    "count": 1,
                    "maxPageSize": 1000,
                    "id": format!("{}-query", category.catalog_name()),
                    "resultList": {
                        "result": [{
                            "PercentBusy": 12.5,
                            "HostIOs": 340.0,
                            "HostMBs": 21.75,
                            "timestamp": LAST_AVAILABLE
                        }],
                        "from": 1,
                        "to": 1
                    }
                })),
            );
        }
    }

    fn add_array(&self) {
        self.add_get(
            &format!("{}/sloprovisioning/symmetrix/{}", V, ARRAY_ID),
            ok(json!({
                "symmetrixId": ARRAY_ID,
                "device_count": 1024,
                "ucode": "5978.711.711",
                "model": "PowerMax_8000",
                "local": true,
                "physicalCapacity": {"total_capacity_gb": 1000.0, "used_capacity_gb": 400.0},
                "sloCompliance": {"slo_stable": 3, "slo_marginal": 0, "slo_critical": 1}
            })),
        );
        self.add_get(
            &format!("{}/wlp/symmetrix/{}", V, ARRAY_ID),
            ok(json!({"symmetrixCapability": [{
                "symmetrixId": ARRAY_ID,
                "workloadPlannerCapable": true,
                "fastCapable": true
            }]})),
        );
        self.add_get(
            &format!("{}/migration/symmetrix/{}", V, ARRAY_ID),
            ok(json!({
                "symmetrixId": ARRAY_ID,
                "local": true,
                "migrationSessionCount": 0,
                "storageGroupCount": 0
            })),
        );
        self.add_get(
            &format!("{}/migration/capabilities/symmetrix", V),
            ok(json!({"storageArrayCapability": [{
                "arrayId": ARRAY_ID,
                "srdfsTarget": true,
                "compression": true
            }]})),
        );
        self.add_get(
            &format!("{}/replication/capabilities/symmetrix", V),
            ok(json!({"symmetrixCapability": [
                {"symmetrixId": "000197600999", "rdfCapable": false},
                {"symmetrixId": ARRAY_ID, "rdfCapable": true, "snapVxCapable": true}
            ]})),
        );
        self.add_get(
            &system("health"),
            ok(json!({"health_score_metric": [
                {"metric": "OVERALL", "health_score": 100.0, "data_date": 1_700_000_000_000_i64},
                {"metric": "CONFIGURATION", "health_score": 95.0, "data_date": 1_700_000_000_000_i64}
            ]})),
        );
        self.add_get(
            &format!("{}/system/alert_summary", V),
            ok(json!({"symmAlertSummary": [{
                "symmId": ARRAY_ID,
                "performanceAlertSummary": {"all_unacknowledged_count": 1, "fatal_unacknowledged_count": 0},
                "arrayAlertSummary": {"all_unacknowledged_count": 3, "fatal_unacknowledged_count": 0}
            }]})),
        );
    }

    fn add_provisioning(&self) {
        // SRPs
        self.add_get(&prov("srp"), ok(json!({"srpId": ["SRP_1"]})));
        self.add_get(
            &prov("srp/SRP_1"),
            ok(json!({
                "srpId": "SRP_1",
                "num_of_disk_groups": 1,
                "emulation": "FBA",
                "srp_capacity": {"usable_total_tb": 100.5, "usable_used_tb": 40.25},
                "srp_efficiency": {"compression_state": "Enabled"}
            })),
        );

        // Storage groups; SG_2 has no performance data.
        self.add_get(&prov("storagegroup"), ok(json!({"storageGroupId": ["SG_1", "SG_2"]})));
        self.add_get(
            &prov("storagegroup/SG_1"),
            ok(json!({
                "storageGroupId": "SG_1",
                "service_level": "Diamond",
                "srp": "SRP_1",
                "num_of_vols": 4,
                "cap_gb": 100.0,
                "device_emulation": "FBA"
            })),
        );
        self.add_get(
            &prov("storagegroup/SG_2"),
            ok(json!({"storageGroupId": "SG_2", "num_of_vols": 0, "cap_gb": 0.0})),
        );
        self.add_post_when(
            &perf("StorageGroup/metrics"),
            &[("storageGroupId", "SG_2")],
            not_found(),
        );

        // Port groups
        self.add_get(&prov("portgroup"), ok(json!({"portGroupId": ["PG_1"]})));
        self.add_get(
            &prov("portgroup/PG_1"),
            ok(json!({
                "portGroupId": "PG_1",
                "num_of_ports": 2,
                "num_of_masking_views": 1,
                "type": "Fibre",
                "symmetrixPortKey": [
                    {"directorId": "FA-1D", "portId": "4"},
                    {"directorId": "FA-2D", "portId": "4"}
                ]
            })),
        );

        // Hosts; only host_a has performance keys.
        self.add_get(&prov("host"), ok(json!({"hostId": ["host_a", "host_b"]})));
        self.add_get(
            &prov("host/host_a"),
            ok(json!({
                "hostId": "host_a",
                "num_of_masking_views": 1,
                "num_of_initiators": 1,
                "port_flags_override": false,
                "enabled_flags": "SPC2_Protocol_Version, SCSI_Support1",
                "disabled_flags": "",
                "type": "Fibre",
                "initiator": ["10000090fa123456"]
            })),
        );
        self.add_get(
            &prov("host/host_b"),
            ok(json!({
                "hostId": "host_b",
                "num_of_masking_views": 0,
                "num_of_initiators": 0,
                "type": "Fibre"
            })),
        );
        self.add_post(
            &perf("Host/keys"),
            ok(json!({"hostInfo": [{
                "hostId": "host_a",
                "firstAvailableDate": 1_690_000_000_000_i64,
                "lastAvailableDate": LAST_AVAILABLE
            }]})),
        );

        // Initiators; the iSCSI one has no host and no performance keys.
        self.add_get(
            &prov("initiator"),
            ok(json!({"initiatorId": ["10000090fa123456", "iqn.1998-01.com.vmware:esx01"]})),
        );
        self.add_get(
            &prov("initiator/10000090fa123456"),
            ok(json!({
                "initiatorId": "10000090fa123456",
                "symmetrixPortKey": [{"directorId": "FA-1D", "portId": "4"}],
                "type": "FIBRE",
                "host": "host_a",
                "flags_in_effect": "Common_Serial_Number, SCSI_3",
                "logged_in": true,
                "on_fabric": true
            })),
        );
        self.add_get(
            &prov("initiator/iqn.1998-01.com.vmware:esx01"),
            ok(json!({
                "initiatorId": "iqn.1998-01.com.vmware:esx01",
                "symmetrixPortKey": [{"directorId": "SE-1E", "portId": "0"}],
                "type": "iSCSI",
                "logged_in": false
            })),
        );
        self.add_post(
            &perf("Initiator/keys"),
            ok(json!({"initiatorInfo": [{"initiatorId": "10000090fa123456"}]})),
        );

        // Masking views
        self.add_get(&prov("maskingview"), ok(json!({"maskingViewId": ["MV_1"]})));
        self.add_get(
            &prov("maskingview/MV_1"),
            ok(json!({
                "maskingViewId": "MV_1",
                "hostId": "host_a",
                "portGroupId": "PG_1",
                "storageGroupId": "SG_1"
            })),
        );
        self.add_get(
            &prov("maskingview/MV_1/connections"),
            ok(json!({"maskingViewConnection": [
                {
                    "volumeId": "00123",
                    "host_lun_address": "0001",
                    "cap_gb": "10.0",
                    "initiatorId": "10000090fa123456",
                    "dir_port": "FA-1D:4",
                    "logged_in": true
                },
                {
                    "volumeId": "00124",
                    "host_lun_address": "0002",
                    "cap_gb": "10.0",
                    "initiatorId": "10000090fa123456",
                    "dir_port": "FA-1D:4",
                    "logged_in": true
                }
            ]})),
        );
    }

    fn add_directors(&self) {
        self.add_get(
            &system("director"),
            ok(json!({"directorId": ["DF-1C", "FA-1D", "RF-1F", "SE-1E"]})),
        );
        self.add_get(
            &system("director/DF-1C"),
            ok(json!({"directorId": "DF-1C", "director_number": 1, "num_of_ports": 2, "availability": "Online"})),
        );
        self.add_get(
            &system("director/FA-1D"),
            ok(json!({"directorId": "FA-1D", "director_number": 1, "num_of_ports": 4, "availability": "Online"})),
        );
        self.add_get(
            &system("director/RF-1F"),
            ok(json!({
                "directorId": "RF-1F",
                "director_number": 1,
                "num_of_ports": 2,
                "availability": "Online",
                "srdf_groups": [
                    {"rdf_group_number": 1, "label": "RDFG_1"},
                    {"rdf_group_number": 2, "label": "RDFG_2"}
                ]
            })),
        );

        self.add_get(
            &prov("port"),
            ok(json!({"symmetrixPortKey": [
                {"directorId": "FA-1D", "portId": "4"},
                {"directorId": "DF-1C", "portId": "8"},
                {"directorId": "RF-1F", "portId": "10"}
            ]})),
        );
        for (director, port, identifier, kind) in [
            ("FA-1D", "4", "50000973b01bd004", "FibreChannel (563)"),
            ("DF-1C", "8", "C:8", "Back End"),
            ("RF-1F", "10", "50000973b01bd00a", "GigE"),
        ] {
            self.add_get(
                &system(&format!("director/{}/port/{}", director, port)),
                ok(json!({"symmetrixPort": {
                    "symmetrixPortKey": {"directorId": director, "portId": port},
                    "identifier": identifier,
                    "port_status": "ON",
                    "type": kind,
                    "num_of_cores": 6
                }})),
            );
        }
    }

    fn add_iscsi(&self) {
        self.add_get(
            &system("director/SE-1E"),
            ok(json!({"directorId": "SE-1E", "director_number": 1, "num_of_ports": 2, "availability": "Online"})),
        );
        self.add_get(
            &system("director/SE-1E/port"),
            ok(json!({"symmetrixPortKey": [{"directorId": "SE-1E", "portId": "4"}]})),
        );
        self.add_get(
            &system("director/SE-1E/port/4/ip_interface"),
            ok(json!({"ipInterfaceId": ["192.168.1.10-0"]})),
        );
        self.add_get(
            &system("director/SE-1E/port/4/ip_interface/192.168.1.10-0"),
            ok(json!({
                "ip_interface_id": "192.168.1.10-0",
                "ip_address": "192.168.1.10",
                "network_id": 0,
                "ip_prefix_length": 24,
                "vlan_id": 0,
                "mtu": 1500,
                "iscsi_target_director": "SE-1E",
                "iscsi_target_port": 0
            })),
        );
        self.add_get(
            &system("director/SE-1E/port/0"),
            ok(json!({"symmetrixPort": {
                "symmetrixPortKey": {"directorId": "SE-1E", "portId": "0"},
                "identifier": "iqn.1992-04.com.emc:600009700bcbb70e3287017400000001",
                "iscsi_target": true,
                "port_status": "ON",
                "ip_addresses": ["192.168.1.10"]
            }})),
        );
        self.add_get_when(
            &prov("port"),
            &[("iscsi_target", "true")],
            ok(json!({"symmetrixPortKey": [{"directorId": "SE-1E", "portId": "0"}]})),
        );
    }

    fn add_replication(&self) {
        self.add_get(
            &replication("rdf_group"),
            ok(json!({"rdfGroupID": [
                {"rdfgNumber": 1, "label": "RDFG_1"},
                {"rdfgNumber": 2, "label": "RDFG_2"},
                {"rdfgNumber": 3, "label": "RDFG_3"}
            ]})),
        );
        self.add_post(&perf("RDFS/keys"), ok(json!({"rdfsKeyResult": [{"raGroupId": "1"}]})));
        self.add_post(&perf("RDFA/keys"), ok(json!({"rdfaKeyResult": [{"raGroupId": "2"}]})));
        for (number, mode, devices) in [
            (1, "Synchronous", json!(["00001", "00002"])),
            (2, "Asynchronous", json!([])),
            (3, "Adaptive Copy", json!([])),
        ] {
            self.add_get(
                &replication(&format!("rdf_group/{}", number)),
                ok(json!({
                    "rdfgNumber": number,
                    "label": format!("RDFG_{}", number),
                    "remoteRdfgNumber": number,
                    "remoteSymmetrix": "000197600456",
                    "numDevices": 2,
                    "type": "Dynamic",
                    "modes": [mode],
                    "localPorts": [{"directorId": "RF-1F", "portId": "10"}]
                })),
            );
            self.add_get(
                &replication(&format!("rdf_group/{}/volume", number)),
                ok(json!({"name": devices})),
            );
        }
        for device in ["00001", "00002"] {
            self.add_get(
                &replication(&format!("rdf_group/1/volume/{}", device)),
                ok(json!({
                    "localVolumeName": device,
                    "remoteVolumeName": device,
                    "localRdfGroupNumber": 1,
                    "rdfMode": "Synchronous",
                    "rdfpairState": "Synchronized"
                })),
            );
        }

        self.add_get(&replication("metrodr"), ok(json!({"name": ["MDR_1"]})));
        self.add_get(
            &replication("metrodr/MDR_1"),
            ok(json!({
                "name": "MDR_1",
                "environment_state": "Active, HA",
                "dr_rdf_mode": "Adaptive Copy",
                "capacity_gb": 10.0,
                "dr_state": "Consistent"
            })),
        );

        self.add_get(
            &replication("snapshot_policy"),
            ok(json!({"name": ["Daily", "Cloud"]})),
        );
        self.add_get(
            &replication("snapshot_policy/Daily"),
            ok(json!({
                "snapshot_policy_name": "Daily",
                "interval_minutes": 1440,
                "snapshot_count": 7,
                "secure": false
            })),
        );
        self.add_get(
            &replication("snapshot_policy/Cloud"),
            ok(json!({
                "snapshot_policy_name": "Cloud",
                "provider_name": "ECS_1",
                "interval_minutes": 1440
            })),
        );
    }

    fn add_events(&self) {
        self.add_get(&format!("{}/system/alert", V), ok(json!({"alertId": ["a1", "a2"]})));
        self.add_get(
            &format!("{}/system/alert/a1", V),
            ok(json!({
                "alertId": "a1",
                "state": "New",
                "severity": "WARNING",
                "type": "Array",
                "array": ARRAY_ID,
                "object": "SRP_1",
                "object_type": "SRP",
                "created_date": "Nov-14-2023 22:13:20.000",
                "created_date_milliseconds": 1_700_000_000_000_i64,
                "description": "SRP_1 usage above threshold",
                "acknowledged": false
            })),
        );
        self.add_get(
            &format!("{}/system/alert/a2", V),
            ok(json!({
                "alertId": "a2",
                "state": "New",
                "severity": "INFORMATION",
                "type": "Server",
                "array": ARRAY_ID,
                "object": "host_a",
                "created_date": "Nov-14-2023 22:10:00.000",
                "description": "Host rediscovered"
            })),
        );

        self.add_get(
            &system("audit_log_record"),
            ok(json!({"audit_log_record": [{"record_id": 101}, {"record_id": 102}]})),
        );
        self.add_get(
            &system("audit_log_record/101"),
            ok(json!({
                "record_id": 101,
                "entry_date": 1_700_000_050_i64,
                "username": "DOMAIN\\admin",
                "activity_id": "",
                "message": "  Created storage group SG_1  ",
                "function_class": "Provisioning",
                "action_code": "Create"
            })),
        );
        self.add_get(
            &system("audit_log_record/102"),
            ok(json!({
                "record_id": 102,
                "entry_date": 1_700_000_060_i64,
                "message": "Login"
            })),
        );
    }
}
