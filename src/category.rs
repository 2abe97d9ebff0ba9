//! Asset categories tracked by the collector.
//!
//! Two closely related enumerations live here:
//! - [`Category`] is a collection level, gated by one `select_*` configuration
//!   key and driven by one collector.
//! - [`PerfCategory`] is a performance-metric category as the management API
//!   names it. Several performance categories share the selector key of their
//!   parent collection level (all director flavours use `select_director`).

use std::fmt;

/// Hardware generation of the target array.
///
/// Some performance categories only exist on one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayGeneration {
    V3,
    V4,
}

impl ArrayGeneration {
    /// Models introduced with the V4 platform.
    const V4_MODELS: &'static [&'static str] = &["PowerMax_2500", "PowerMax_8500"];

    /// Derives the generation from the model string reported by the array.
    pub fn from_model(model: &str) -> Self {
        if Self::V4_MODELS.iter().any(|m| model.eq_ignore_ascii_case(m)) {
            ArrayGeneration::V4
        } else {
            ArrayGeneration::V3
        }
    }
}

/// A collection level: one asset class collected per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Array,
    /// Storage resource pools.
    Srp,
    StorageGroup,
    Director,
    Port,
    PortGroup,
    Host,
    Initiator,
    MaskingView,
    /// iSCSI targets and IP interfaces.
    Iscsi,
    /// Replication (RDF) groups and their device pairs.
    Rdf,
    MetroDr,
    SnapshotPolicy,
    Alert,
    AuditLog,
}

impl Category {
    /// Every category, in the fixed order a run visits them.
    pub const ALL: [Category; 15] = [
        Category::Array,
        Category::Srp,
        Category::StorageGroup,
        Category::Director,
        Category::Port,
        Category::PortGroup,
        Category::Host,
        Category::Initiator,
        Category::MaskingView,
        Category::Iscsi,
        Category::Rdf,
        Category::MetroDr,
        Category::SnapshotPolicy,
        Category::Alert,
        Category::AuditLog,
    ];

    /// Configuration key that enables this category.
    pub fn config_key(self) -> &'static str {
        match self {
            Category::Array => "select_array",
            Category::Srp => "select_srp",
            Category::StorageGroup => "select_sg",
            Category::Director => "select_director",
            Category::Port => "select_port",
            Category::PortGroup => "select_pg",
            Category::Host => "select_host",
            Category::Initiator => "select_initiator",
            Category::MaskingView => "select_mv",
            Category::Iscsi => "select_iscsi",
            Category::Rdf => "select_rdf",
            Category::MetroDr => "select_metro_dr",
            Category::SnapshotPolicy => "select_snap_policy",
            Category::Alert => "select_alerts",
            Category::AuditLog => "select_audit_logs",
        }
    }

    /// Human readable label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            Category::Array => "Array",
            Category::Srp => "SRP",
            Category::StorageGroup => "Storage Group",
            Category::Director => "Director",
            Category::Port => "Port",
            Category::PortGroup => "Port Group",
            Category::Host => "Host",
            Category::Initiator => "Initiator",
            Category::MaskingView => "Masking View",
            Category::Iscsi => "iSCSI",
            Category::Rdf => "RDF Group",
            Category::MetroDr => "Metro DR",
            Category::SnapshotPolicy => "Snapshot Policy",
            Category::Alert => "Alert",
            Category::AuditLog => "Audit Log",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A performance-metric category of the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PerfCategory {
    Array,
    Srp,
    StorageGroup,
    FeDirector,
    BeDirector,
    RdfDirector,
    ImDirector,
    EdsDirector,
    EmDirector,
    FePort,
    BePort,
    RdfPort,
    PortGroup,
    Host,
    Initiator,
    MaskingView,
    IscsiTarget,
    IpInterface,
    Rdfs,
    Rdfa,
}

impl PerfCategory {
    pub const ALL: [PerfCategory; 20] = [
        PerfCategory::Array,
        PerfCategory::Srp,
        PerfCategory::StorageGroup,
        PerfCategory::FeDirector,
        PerfCategory::BeDirector,
        PerfCategory::RdfDirector,
        PerfCategory::ImDirector,
        PerfCategory::EdsDirector,
        PerfCategory::EmDirector,
        PerfCategory::FePort,
        PerfCategory::BePort,
        PerfCategory::RdfPort,
        PerfCategory::PortGroup,
        PerfCategory::Host,
        PerfCategory::Initiator,
        PerfCategory::MaskingView,
        PerfCategory::IscsiTarget,
        PerfCategory::IpInterface,
        PerfCategory::Rdfs,
        PerfCategory::Rdfa,
    ];

    /// The collection level whose selector key governs this category.
    pub fn parent(self) -> Category {
        match self {
            PerfCategory::Array => Category::Array,
            PerfCategory::Srp => Category::Srp,
            PerfCategory::StorageGroup => Category::StorageGroup,
            PerfCategory::FeDirector
            | PerfCategory::BeDirector
            | PerfCategory::RdfDirector
            | PerfCategory::ImDirector
            | PerfCategory::EdsDirector
            | PerfCategory::EmDirector => Category::Director,
            PerfCategory::FePort | PerfCategory::BePort | PerfCategory::RdfPort => Category::Port,
            PerfCategory::PortGroup => Category::PortGroup,
            PerfCategory::Host => Category::Host,
            PerfCategory::Initiator => Category::Initiator,
            PerfCategory::MaskingView => Category::MaskingView,
            PerfCategory::IscsiTarget | PerfCategory::IpInterface => Category::Iscsi,
            PerfCategory::Rdfs | PerfCategory::Rdfa => Category::Rdf,
        }
    }

    /// Selector key holding `<prefix>_off|kpi|all|custom`.
    pub fn config_key(self) -> &'static str {
        self.parent().config_key()
    }

    /// Name of this category in the performance metric catalog.
    pub fn catalog_name(self) -> &'static str {
        match self {
            PerfCategory::Array => "Array",
            PerfCategory::Srp => "SRP",
            PerfCategory::StorageGroup => "StorageGroup",
            PerfCategory::FeDirector => "FEDirector",
            PerfCategory::BeDirector => "BEDirector",
            PerfCategory::RdfDirector => "RDFDirector",
            PerfCategory::ImDirector => "IMDirector",
            PerfCategory::EdsDirector => "EDSDirector",
            PerfCategory::EmDirector => "EMDirector",
            PerfCategory::FePort => "FEPort",
            PerfCategory::BePort => "BEPort",
            PerfCategory::RdfPort => "RDFPort",
            PerfCategory::PortGroup => "PortGroup",
            PerfCategory::Host => "Host",
            PerfCategory::Initiator => "Initiator",
            PerfCategory::MaskingView => "MaskingView",
            PerfCategory::IscsiTarget => "ISCSITarget",
            PerfCategory::IpInterface => "IPInterface",
            PerfCategory::Rdfs => "RDFS",
            PerfCategory::Rdfa => "RDFA",
        }
    }

    /// Key holding the comma separated custom metric list.
    pub fn metrics_key(self) -> &'static str {
        match self {
            PerfCategory::Array => "select_array_metrics",
            PerfCategory::Srp => "select_srp_metrics",
            PerfCategory::StorageGroup => "select_sg_metrics",
            PerfCategory::FeDirector => "select_fe_dir_metrics",
            PerfCategory::BeDirector => "select_be_dir_metrics",
            PerfCategory::RdfDirector => "select_rdf_dir_metrics",
            PerfCategory::ImDirector => "select_im_dir_metrics",
            PerfCategory::EdsDirector => "select_eds_dir_metrics",
            PerfCategory::EmDirector => "select_em_dir_metrics",
            PerfCategory::FePort => "select_fe_port_metrics",
            PerfCategory::BePort => "select_be_port_metrics",
            PerfCategory::RdfPort => "select_rdf_port_metrics",
            PerfCategory::PortGroup => "select_pg_metrics",
            PerfCategory::Host => "select_host_metrics",
            PerfCategory::Initiator => "select_initiator_metrics",
            PerfCategory::MaskingView => "select_mv_metrics",
            PerfCategory::IscsiTarget => "select_iscsi_target_metrics",
            PerfCategory::IpInterface => "select_ip_interface_metrics",
            PerfCategory::Rdfs => "select_rdfs_metrics",
            PerfCategory::Rdfa => "select_rdfa_metrics",
        }
    }

    /// Prefix used for the `<prefix>_perf_details` stand-in fields.
    pub fn field_prefix(self) -> &'static str {
        match self {
            PerfCategory::Array => "array",
            PerfCategory::Srp => "srp",
            PerfCategory::StorageGroup => "sg",
            PerfCategory::FeDirector
            | PerfCategory::BeDirector
            | PerfCategory::RdfDirector
            | PerfCategory::ImDirector
            | PerfCategory::EdsDirector
            | PerfCategory::EmDirector => "dir",
            PerfCategory::FePort | PerfCategory::BePort | PerfCategory::RdfPort => "port",
            PerfCategory::PortGroup => "pg",
            PerfCategory::Host => "host",
            PerfCategory::Initiator => "initiator",
            PerfCategory::MaskingView => "mv",
            PerfCategory::IscsiTarget => "iscsi_tgt",
            PerfCategory::IpInterface => "ip_interface",
            PerfCategory::Rdfs | PerfCategory::Rdfa => "rdfg",
        }
    }

    /// Whether the category exists on the given array generation.
    pub fn supported_on(self, generation: ArrayGeneration) -> bool {
        match generation {
            ArrayGeneration::V4 => !matches!(
                self,
                PerfCategory::BePort | PerfCategory::ImDirector | PerfCategory::EdsDirector
            ),
            ArrayGeneration::V3 => self != PerfCategory::EmDirector,
        }
    }
}

impl fmt::Display for PerfCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_name())
    }
}
