//! Per-run collection state.

use std::collections::BTreeMap;

use crate::category::{ArrayGeneration, Category, PerfCategory};
use crate::config::ConfigStore;
use crate::resolver::{self, MetricCatalog, MetricSelection};
use crate::validator::ValidatedEnvironment;

/// Read-only state shared by every collector during one run.
///
/// Built once after validation; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct CollectionContext {
    pub input_name: String,
    pub array_id: String,
    /// Management server host, stamped on alert records.
    pub source_host: String,
    /// Collection interval in seconds.
    pub interval: u64,
    /// Run timestamp in milliseconds, used for every performance query.
    pub timestamp: i64,
    pub generation: ArrayGeneration,
    pub enabled_categories: BTreeMap<Category, bool>,
    pub enabled_metrics: BTreeMap<PerfCategory, MetricSelection>,
}

impl CollectionContext {
    /// Resolves category enablement and metric selections for a validated array.
    pub fn resolve(
        input_name: &str,
        array_id: &str,
        source_host: &str,
        config: &dyn ConfigStore,
        env: &ValidatedEnvironment,
        catalog: &dyn MetricCatalog,
    ) -> Self {
        Self {
            input_name: input_name.to_string(),
            array_id: array_id.to_string(),
            source_host: source_host.to_string(),
            interval: config.interval(),
            timestamp: env.timestamp,
            generation: env.generation,
            enabled_categories: resolver::enabled_categories(config),
            enabled_metrics: resolver::enabled_metrics(env.generation, config, catalog),
        }
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.enabled_categories
            .get(&category)
            .copied()
            .unwrap_or(false)
    }

    /// Metric selection of a performance category, if it is collected.
    pub fn selection(&self, category: PerfCategory) -> Option<&MetricSelection> {
        self.enabled_metrics.get(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiError;
    use crate::config::InputConfig;

    struct NoCatalog;

    impl MetricCatalog for NoCatalog {
        fn metric_names(&self, category: PerfCategory) -> Result<Vec<String>, ApiError> {
            Err(ApiError::NotFound(category.to_string()))
        }
    }

    #[test]
    fn test_resolve_context() {
        let cfg = InputConfig::new()
            .with("interval", "600")
            .with("select_array", "array_kpi")
            .with("select_director", true)
            .with("select_host", "host_off");
        let env = ValidatedEnvironment {
            timestamp: 1_700_000_000_000,
            version: "V10.1.0.0".to_string(),
            model: "PowerMax_2500".to_string(),
            generation: ArrayGeneration::V4,
        };
        let ctx = CollectionContext::resolve("lab", "000120000456", "10.0.0.5", &cfg, &env, &NoCatalog);

        assert_eq!(ctx.interval, 600);
        assert_eq!(ctx.timestamp, 1_700_000_000_000);
        assert!(ctx.is_enabled(Category::Array));
        assert!(ctx.is_enabled(Category::Director));
        assert!(!ctx.is_enabled(Category::Host));
        assert_eq!(ctx.selection(PerfCategory::Array), Some(&MetricSelection::Kpi));
        assert_eq!(ctx.selection(PerfCategory::EmDirector), Some(&MetricSelection::All));
        assert_eq!(ctx.selection(PerfCategory::EdsDirector), None);
        assert_eq!(ctx.selection(PerfCategory::Host), None);
    }
}
