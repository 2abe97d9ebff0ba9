//! Preflight checks that gate every collection run.
//!
//! Five checks run in order and the first failure stops validation:
//!
//! 1. the interval is a positive multiple of 300 seconds,
//! 2. the backend answers and is at least [`MIN_VERSION`],
//! 3. the target array is one of the backend's supported arrays,
//! 4. the array is local and registered for performance collection,
//! 5. its last performance sample is no older than one interval.
//!
//! The timestamp accepted by check 5 becomes the run timestamp.

use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use crate::category::ArrayGeneration;
use crate::client::{ApiError, MIN_VERSION, Transport, UnisphereClient, parse_version};

/// Granularity of performance samples, in seconds.
pub const SAMPLE_GRANULARITY_SECS: u64 = 300;

/// Error type for preflight validation. Always fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The data input is misconfigured.
    Config(String),
    /// The backend or the array is not in a collectable state.
    Environment(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Config(msg) => write!(f, "configuration error: {}", msg),
            ValidationError::Environment(msg) => write!(f, "environment error: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn environment(msg: impl Into<String>) -> ValidationError {
    ValidationError::Environment(msg.into())
}

/// Facts established by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEnvironment {
    /// Backend-reported last available performance timestamp (ms).
    pub timestamp: i64,
    pub version: String,
    pub model: String,
    pub generation: ArrayGeneration,
}

/// Check 1: interval must be a positive multiple of 300 seconds.
pub fn check_interval(interval: u64) -> Result<(), ValidationError> {
    if interval >= SAMPLE_GRANULARITY_SECS && interval % SAMPLE_GRANULARITY_SECS == 0 {
        Ok(())
    } else {
        Err(ValidationError::Config(format!(
            "interval {} is not a multiple of {} seconds, please correct the data input configuration",
            interval, SAMPLE_GRANULARITY_SECS
        )))
    }
}

/// Whether `timestamp` is within `window_minutes` of `now_ms`.
pub fn is_timestamp_current(timestamp: i64, now_ms: i64, window_minutes: u64) -> bool {
    let window_ms = (window_minutes as i64).saturating_mul(60_000);
    now_ms.saturating_sub(timestamp) <= window_ms
}

/// Runs the preflight checks against one array.
pub struct EnvironmentValidator<'a, T: Transport> {
    client: &'a UnisphereClient<T>,
    interval: u64,
}

impl<'a, T: Transport> EnvironmentValidator<'a, T> {
    pub fn new(client: &'a UnisphereClient<T>, interval: u64) -> Self {
        Self { client, interval }
    }

    /// Validates against the current wall clock.
    pub fn validate(&self) -> Result<ValidatedEnvironment, ValidationError> {
        self.validate_at(chrono::Utc::now().timestamp_millis())
    }

    /// Validates as if the current time were `now_ms`.
    pub fn validate_at(&self, now_ms: i64) -> Result<ValidatedEnvironment, ValidationError> {
        // 1. Interval
        check_interval(self.interval)?;
        info!("Passed interval check.");

        // 2. Backend reachability and version
        let version = self
            .client
            .version()
            .map_err(|e| environment(format!("Unisphere is not responding: {}", e)))?;
        match parse_version(&version) {
            Some(parsed) if parsed >= MIN_VERSION => {
                info!("Passed Unisphere version check: {}.", version);
            }
            _ => {
                return Err(environment(format!(
                    "Unisphere version {} is not supported, minimum version is {}.{}",
                    version, MIN_VERSION.0, MIN_VERSION.1
                )));
            }
        }

        // 3. Array model
        let array_id = self.client.array_id();
        let supported = self.client.supported_arrays().map_err(|e| {
            environment(format!("cannot list arrays managed by Unisphere: {}", e))
        })?;
        if !supported.iter().any(|id| id == array_id) {
            return Err(environment(format!(
                "array {} is not a supported array on this Unisphere instance, check array ID in data input configuration",
                array_id
            )));
        }
        let system = self
            .client
            .array_system()
            .map_err(|e| environment(format!("cannot read array {} details: {}", array_id, e)))?;
        let model = system
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let generation = ArrayGeneration::from_model(&model);
        info!("Passed array model check: {} ({:?}).", model, generation);

        // 4. Locality and performance registration
        let local = system.get("local").and_then(Value::as_bool).unwrap_or(true);
        let registered = self
            .client
            .is_performance_registered()
            .map_err(|e| environment(format!("cannot read performance registration: {}", e)))?;
        if !local || !registered {
            return Err(environment(
                "array not performance registered or is not local to Unisphere",
            ));
        }
        info!("Passed performance registration check.");

        // 5. Timestamp freshness
        let timestamp = self
            .client
            .last_available_timestamp()
            .map_err(|e: ApiError| {
                environment(format!("cannot read last performance timestamp: {}", e))
            })?
            .ok_or_else(|| environment("array has no performance timestamp"))?;
        let window_minutes = self.interval / 60;
        if !is_timestamp_current(timestamp, now_ms, window_minutes) {
            return Err(environment(format!(
                "array performance timestamp {} not current",
                timestamp
            )));
        }
        debug!(
            "Performance timestamp {} is {} ms old",
            timestamp,
            now_ms - timestamp
        );
        info!("Passed performance timestamp recency check: {}.", timestamp);

        Ok(ValidatedEnvironment {
            timestamp,
            version,
            model,
            generation,
        })
    }
}
