//! Data input configuration.
//!
//! An input is a flat key/value document. Values are decoded once into
//! [`ConfigValue`] so downstream code pattern-matches a typed value instead of
//! inspecting JSON at runtime. Legacy inputs still carry booleans for the
//! `select_*` keys, newer ones carry `<prefix>_off|kpi|all|custom` strings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default REST request timeout when the input does not set one.
const DEFAULT_REST_TIMEOUT_SECS: u64 = 60;
/// Default management API port.
const DEFAULT_PORT: &str = "8443";

/// A configuration value as stored in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
}

impl ConfigValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            ConfigValue::Bool(_) => None,
        }
    }

    /// Interprets the value as a flag. Text values accept the usual spellings.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            },
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

/// Shape accepted on disk; numbers collapse into text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawValue> for ConfigValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Bool(b) => ConfigValue::Bool(b),
            RawValue::Int(n) => ConfigValue::Text(n.to_string()),
            RawValue::Float(n) => ConfigValue::Text(n.to_string()),
            RawValue::Text(s) => ConfigValue::Text(s),
        }
    }
}

/// Error type for loading a data input.
#[derive(Debug)]
pub enum ConfigError {
    /// The input file could not be read.
    Io(PathBuf, std::io::Error),
    /// The input is not a JSON object of scalar values.
    Parse(String),
    /// A required key is absent or empty.
    Missing(&'static str),
    /// A key holds a value of the wrong shape.
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {}", path.display(), e),
            ConfigError::Parse(msg) => write!(f, "invalid input configuration: {}", msg),
            ConfigError::Missing(key) => write!(f, "required key '{}' is not set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "key '{}' has invalid value '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Read access to the data input's key/value settings.
pub trait ConfigStore {
    /// Returns the raw value stored under `key`.
    fn get_arg(&self, key: &str) -> Option<&ConfigValue>;

    /// Collection interval in seconds.
    fn interval(&self) -> u64;

    /// Returns the value under `key` if it is text.
    fn get_text(&self, key: &str) -> Option<&str> {
        self.get_arg(key).and_then(ConfigValue::as_text)
    }
}

/// How the REST client verifies the server certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsVerify {
    Disabled,
    System,
    CaBundle(PathBuf),
}

/// Connection parameters for the management API.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub array_id: String,
    pub timeout: Duration,
    pub verify: TlsVerify,
}

impl ConnectionSettings {
    /// Base URL of the REST API.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// One data input, loaded from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct InputConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl InputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an input from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_json_str(&content)
    }

    /// Parses an input from a JSON object of scalar values.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, Option<RawValue>> =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let values = raw
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, ConfigValue::from(v))))
            .collect();
        Ok(Self { values })
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder form of [`InputConfig::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Input name, used to label log lines.
    pub fn name(&self) -> &str {
        self.get_text("name").unwrap_or("default")
    }

    fn required_text(&self, key: &'static str) -> Result<String, ConfigError> {
        match self.get_text(key).map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(ConfigError::Missing(key)),
        }
    }

    /// Checks that the interval is a whole number of seconds.
    ///
    /// Whether it is a valid *collection* interval is decided by the
    /// environment validator, so a bad multiple is not an error here.
    pub fn parse_interval(&self) -> Result<u64, ConfigError> {
        let raw = self.required_text("interval")?;
        raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
            key: "interval",
            value: raw,
        })
    }

    /// Extracts the connection parameters.
    pub fn connection(&self) -> Result<ConnectionSettings, ConfigError> {
        let timeout = match self.get_text("rest_request_timeout") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| ConfigError::Invalid {
                    key: "rest_request_timeout",
                    value: raw.to_string(),
                })?,
            None => Duration::from_secs(DEFAULT_REST_TIMEOUT_SECS),
        };

        let enable_ssl = self
            .get_arg("enable_ssl")
            .and_then(ConfigValue::as_flag)
            .unwrap_or(true);
        let verify = if !enable_ssl {
            TlsVerify::Disabled
        } else {
            match self.get_text("ssl_cert_location").map(str::trim) {
                Some(path) if !path.is_empty() => TlsVerify::CaBundle(PathBuf::from(path)),
                _ => TlsVerify::System,
            }
        };

        Ok(ConnectionSettings {
            host: self.required_text("u4v_ip_address")?,
            port: self
                .get_text("u4v_port")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PORT.to_string()),
            username: self.required_text("u4v_username")?,
            password: self.get_text("u4v_password").unwrap_or_default().to_string(),
            array_id: self.required_text("u4v_vmax_id")?,
            timeout,
            verify,
        })
    }
}

impl ConfigStore for InputConfig {
    fn get_arg(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    fn interval(&self) -> u64 {
        self.parse_interval().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "name": "lab-array",
        "interval": 300,
        "u4v_ip_address": "10.0.0.5",
        "u4v_port": 8443,
        "u4v_username": "smc",
        "u4v_password": "smc",
        "u4v_vmax_id": "000197600123",
        "rest_request_timeout": "120",
        "enable_ssl": false,
        "select_array": "array_custom",
        "select_array_metrics": "PercentBusy, HostIOs",
        "select_host": true,
        "select_alerts": null
    }"#;

    #[test]
    fn test_decode_values() {
        let cfg = InputConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            cfg.get_arg("select_array"),
            Some(&ConfigValue::Text("array_custom".to_string()))
        );
        assert_eq!(cfg.get_arg("select_host"), Some(&ConfigValue::Bool(true)));
        assert_eq!(cfg.get_arg("select_alerts"), None);
        assert_eq!(cfg.get_text("u4v_port"), Some("8443"));
        assert_eq!(cfg.interval(), 300);
        assert_eq!(cfg.name(), "lab-array");
    }

    #[test]
    fn test_connection_settings() {
        let cfg = InputConfig::from_json_str(SAMPLE).unwrap();
        let conn = cfg.connection().unwrap();
        assert_eq!(conn.base_url(), "https://10.0.0.5:8443");
        assert_eq!(conn.array_id, "000197600123");
        assert_eq!(conn.timeout, Duration::from_secs(120));
        assert_eq!(conn.verify, TlsVerify::Disabled);
    }

    #[test]
    fn test_connection_ca_bundle() {
        let cfg = InputConfig::from_json_str(SAMPLE)
            .unwrap()
            .with("enable_ssl", true)
            .with("ssl_cert_location", "/etc/pki/u4v.pem");
        let conn = cfg.connection().unwrap();
        assert_eq!(conn.verify, TlsVerify::CaBundle(PathBuf::from("/etc/pki/u4v.pem")));
    }

    #[test]
    fn test_missing_required_key() {
        let cfg = InputConfig::new().with("u4v_ip_address", "10.0.0.5");
        match cfg.connection() {
            Err(ConfigError::Missing(key)) => assert_eq!(key, "u4v_username"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unrepresentable_timeout_rejected() {
        for raw in ["inf", "NaN", "1e300", "-5", "0", "soon"] {
            let cfg = InputConfig::from_json_str(SAMPLE)
                .unwrap()
                .with("rest_request_timeout", raw);
            assert!(
                matches!(
                    cfg.connection(),
                    Err(ConfigError::Invalid { key: "rest_request_timeout", .. })
                ),
                "{}",
                raw
            );
        }
        let cfg = InputConfig::from_json_str(SAMPLE)
            .unwrap()
            .with("rest_request_timeout", "2.5");
        assert_eq!(cfg.connection().unwrap().timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_interval() {
        let cfg = InputConfig::new().with("interval", "five minutes");
        assert!(matches!(
            cfg.parse_interval(),
            Err(ConfigError::Invalid { key: "interval", .. })
        ));
        assert_eq!(cfg.interval(), 0);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = InputConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.get_text("u4v_vmax_id"), Some("000197600123"));
    }

    #[test]
    fn test_rejects_nested_values() {
        let err = InputConfig::from_json_str(r#"{"select_array": {"nested": 1}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_flag_spellings() {
        assert_eq!(ConfigValue::from("Yes").as_flag(), Some(true));
        assert_eq!(ConfigValue::from("0").as_flag(), Some(false));
        assert_eq!(ConfigValue::from("maybe").as_flag(), None);
    }
}
