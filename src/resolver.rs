//! Metric selection: which performance categories run and which metrics they request.
//!
//! A selector key holds either a legacy boolean or a `<prefix>_<mode>` string:
//!
//! | Value            | Enabled | Selection          |
//! |------------------|---------|--------------------|
//! | `true`           | yes     | `All`              |
//! | `false`          | no      | -                  |
//! | `*_off`          | no      | -                  |
//! | `*_all`          | yes     | `All`              |
//! | `*_kpi`          | yes     | `Kpi`              |
//! | `*_custom`       | yes     | `Custom` or `Kpi`  |
//! | any other string | yes     | `All`              |
//!
//! A custom list is validated against the metric catalog of the category.
//! Invalid entries are dropped; if nothing valid remains the selection
//! degrades to `Kpi`, never to an empty list.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, warn};

use crate::category::{ArrayGeneration, Category, PerfCategory};
use crate::client::ApiError;
use crate::config::{ConfigStore, ConfigValue};

/// Scope of performance metrics requested for a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSelection {
    All,
    Kpi,
    /// Explicit metric names; never empty.
    Custom(Vec<String>),
}

impl fmt::Display for MetricSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSelection::All => f.write_str("ALL"),
            MetricSelection::Kpi => f.write_str("KPI"),
            MetricSelection::Custom(metrics) => write!(f, "[{}]", metrics.join(", ")),
        }
    }
}

/// Outcome of resolving one performance category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The category does not exist on the detected array generation.
    Unsupported,
    Disabled,
    Enabled(MetricSelection),
}

impl Resolution {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Resolution::Enabled(_))
    }

    pub fn selection(&self) -> Option<&MetricSelection> {
        match self {
            Resolution::Enabled(selection) => Some(selection),
            _ => None,
        }
    }
}

/// Source of valid metric names per performance category.
pub trait MetricCatalog {
    /// Returns every metric name the category supports.
    fn metric_names(&self, category: PerfCategory) -> Result<Vec<String>, ApiError>;
}

/// Returns true if `value` matches `^[a-z_]*off$`.
fn is_off_value(value: &str) -> bool {
    value.ends_with("off") && value.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
}

/// Decides whether a selector value enables its category.
///
/// Missing keys are disabled. Any string other than `*_off` enables the
/// category, so unknown future values keep collecting rather than dropping data.
pub fn is_category_enabled(value: Option<&ConfigValue>) -> bool {
    match value {
        Some(ConfigValue::Bool(enabled)) => *enabled,
        Some(ConfigValue::Text(s)) => !is_off_value(s),
        None => false,
    }
}

/// Enablement of every collection category.
pub fn enabled_categories(config: &dyn ConfigStore) -> BTreeMap<Category, bool> {
    Category::ALL
        .iter()
        .map(|&category| {
            let enabled = is_category_enabled(config.get_arg(category.config_key()));
            debug!("Performance category {} enabled: {}", category, enabled);
            (category, enabled)
        })
        .collect()
}

/// Resolves one performance category, ignoring array generation.
pub fn resolve(
    category: PerfCategory,
    config: &dyn ConfigStore,
    catalog: &dyn MetricCatalog,
) -> Resolution {
    let value = config.get_arg(category.config_key());
    if !is_category_enabled(value) {
        return Resolution::Disabled;
    }

    let selection = match value {
        Some(ConfigValue::Text(s)) if s.ends_with("_kpi") => MetricSelection::Kpi,
        Some(ConfigValue::Text(s)) if s.ends_with("_custom") => {
            load_custom_metrics(category, config, catalog)
        }
        // Legacy `true`, `*_all` and unrecognised strings.
        _ => MetricSelection::All,
    };

    debug!("{} metric configuration setting: {}", category, selection);
    Resolution::Enabled(selection)
}

/// Resolves one performance category for a specific array generation.
pub fn resolve_for_generation(
    category: PerfCategory,
    generation: ArrayGeneration,
    config: &dyn ConfigStore,
    catalog: &dyn MetricCatalog,
) -> Resolution {
    if !category.supported_on(generation) {
        debug!(
            "Category {} not supported on {:?} arrays, removing from enabled category targets",
            category, generation
        );
        return Resolution::Unsupported;
    }
    resolve(category, config, catalog)
}

/// Resolves every performance category and keeps the enabled ones.
pub fn enabled_metrics(
    generation: ArrayGeneration,
    config: &dyn ConfigStore,
    catalog: &dyn MetricCatalog,
) -> BTreeMap<PerfCategory, MetricSelection> {
    PerfCategory::ALL
        .iter()
        .filter_map(|&category| {
            match resolve_for_generation(category, generation, config, catalog) {
                Resolution::Enabled(selection) => Some((category, selection)),
                Resolution::Disabled | Resolution::Unsupported => None,
            }
        })
        .collect()
}

/// Loads and validates the user's custom metric list for `category`.
fn load_custom_metrics(
    category: PerfCategory,
    config: &dyn ConfigStore,
    catalog: &dyn MetricCatalog,
) -> MetricSelection {
    let mut requested: Vec<String> = Vec::new();
    for metric in config
        .get_text(category.metrics_key())
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
    {
        if !requested.iter().any(|m| m == metric) {
            requested.push(metric.to_string());
        }
    }

    let mut valid = Vec::with_capacity(requested.len());
    if !requested.is_empty() {
        match catalog.metric_names(category) {
            Ok(known) => {
                for metric in requested {
                    if known.iter().any(|k| *k == metric) {
                        valid.push(metric);
                    } else {
                        warn!(
                            "{} metric {} from custom metric list is not valid, removing from targeted level metrics",
                            category, metric
                        );
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "{} metric catalog unavailable, custom metric list cannot be validated", category);
            }
        }
    }

    if valid.is_empty() {
        error!(
            "There have been no valid performance metrics specified for reporting level {}. Defaulting to KPI metrics only",
            category
        );
        MetricSelection::Kpi
    } else {
        MetricSelection::Custom(valid)
    }
}
