//! Director and port sub-type classification.
//!
//! The management API does not report a director's emulation directly; it is
//! encoded in the identifier prefix (`FA-1D`, `DF-2C`, `RF-3E`, ...). Rules are
//! checked in order and the first rule with a matching substring wins.

use crate::category::PerfCategory;

use super::CollectError;

/// Emulation class of a director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectorKind {
    BackEnd,
    FrontEnd,
    Rdf,
    /// Infrastructure manager.
    Im,
    /// Embedded data services.
    Eds,
    /// Embedded management.
    Em,
}

const DIRECTOR_RULES: &[(&[&str], DirectorKind)] = &[
    (&["DF", "DX"], DirectorKind::BackEnd),
    (&["EF", "FA", "FE", "SE", "OR"], DirectorKind::FrontEnd),
    (&["RF", "RE"], DirectorKind::Rdf),
    (&["IM"], DirectorKind::Im),
    (&["ED"], DirectorKind::Eds),
    (&["EM"], DirectorKind::Em),
];

impl DirectorKind {
    /// Classifies a director by its identifier.
    pub fn classify(director_id: &str) -> Result<Self, CollectError> {
        DIRECTOR_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| director_id.contains(n)))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| CollectError::UnknownAssetType(format!("Director: {}", director_id)))
    }

    /// Short code written to `director_type`.
    pub fn code(self) -> &'static str {
        match self {
            DirectorKind::BackEnd => "BE",
            DirectorKind::FrontEnd => "FE",
            DirectorKind::Rdf => "RDF",
            DirectorKind::Im => "IM",
            DirectorKind::Eds => "EDS",
            DirectorKind::Em => "EM",
        }
    }

    pub fn perf_category(self) -> PerfCategory {
        match self {
            DirectorKind::BackEnd => PerfCategory::BeDirector,
            DirectorKind::FrontEnd => PerfCategory::FeDirector,
            DirectorKind::Rdf => PerfCategory::RdfDirector,
            DirectorKind::Im => PerfCategory::ImDirector,
            DirectorKind::Eds => PerfCategory::EdsDirector,
            DirectorKind::Em => PerfCategory::EmDirector,
        }
    }
}

/// Whether `director_id` names an iSCSI director: `SE-` then one digit and
/// one uppercase letter, e.g. `SE-1E`.
pub fn is_iscsi_director(director_id: &str) -> bool {
    match director_id.strip_prefix("SE-").map(str::as_bytes) {
        Some([slot, board]) => slot.is_ascii_digit() && board.is_ascii_uppercase(),
        _ => false,
    }
}

/// Class of the director a port belongs to. Only these three carry ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    BackEnd,
    FrontEnd,
    Rdf,
}

impl PortKind {
    /// Classifies a port by the identifier of its director.
    pub fn classify(director_id: &str) -> Result<Self, CollectError> {
        match DirectorKind::classify(director_id) {
            Ok(DirectorKind::BackEnd) => Ok(PortKind::BackEnd),
            Ok(DirectorKind::FrontEnd) => Ok(PortKind::FrontEnd),
            Ok(DirectorKind::Rdf) => Ok(PortKind::Rdf),
            Ok(DirectorKind::Im | DirectorKind::Eds | DirectorKind::Em) | Err(_) => Err(
                CollectError::UnknownAssetType(format!("Port director: {}", director_id)),
            ),
        }
    }

    /// Value written to `port_dir_type`.
    pub fn label(self) -> &'static str {
        match self {
            PortKind::BackEnd => "Back End Director",
            PortKind::FrontEnd => "Front End Director",
            PortKind::Rdf => "RDF Director",
        }
    }

    pub fn perf_category(self) -> PerfCategory {
        match self {
            PortKind::BackEnd => PerfCategory::BePort,
            PortKind::FrontEnd => PerfCategory::FePort,
            PortKind::Rdf => PerfCategory::RdfPort,
        }
    }
}
