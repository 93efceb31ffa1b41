//! Process configuration.
//!
//! One YAML document with `${VAR}` expansion applied before parsing:
//!
//! ```yaml
//! app:
//!   name: topicgate
//!   listen: 0.0.0.0:8080
//! log:
//!   level: info
//!   json: true
//! kafka:
//!   brokers: [localhost:9092]
//!   allow_create_new: false
//!   tls:
//!     ca_cert_path: /etc/kafka/ca.pem
//!     keystore_path: /etc/kafka/client.p12
//!     keystore_password: ${KEYSTORE_PASSWORD}
//!     on_invalid: degrade
//!   client_conf:
//!     compression.type: zstd
//! schema_registry:
//!   hosts: [http://localhost:8081]
//! ```

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("expanding environment in config: {details}")]
    Env { details: String },

    #[error("parsing yaml: {source}")]
    Parse {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {details}")]
    Invalid { details: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppCfg,
    pub log: LogCfg,
    pub kafka: KafkaCfg,
    pub schema_registry: SchemaRegistryCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub name: String,
    /// Socket address the HTTP ingress binds to.
    pub listen: String,
    pub debug: bool,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            name: "topicgate".into(),
            listen: "0.0.0.0:8080".into(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCfg {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaCfg {
    pub brokers: Vec<String>,

    pub client_id: String,

    /// Let the broker create unknown topics on first publish.
    pub allow_create_new: bool,

    /// Upper bound on waiting for a broker acknowledgement.
    pub send_timeout_ms: u64,

    /// Upper bound on the bootstrap metadata probe.
    pub connect_timeout_ms: u64,

    /// Producer statistics period; 0 turns statistics off.
    pub statistics_interval_ms: u64,

    pub tls: Option<TlsCfg>,

    /// Raw librdkafka overrides, applied after our own settings so user
    /// values win.
    pub client_conf: HashMap<String, String>,
}

impl Default for KafkaCfg {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".into()],
            client_id: "topicgate".into(),
            allow_create_new: false,
            send_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            statistics_interval_ms: 5_000,
            tls: None,
            client_conf: HashMap::new(),
        }
    }
}

impl KafkaCfg {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Mutual TLS material for the broker connection.
///
/// All three paths must be present for TLS to be attempted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsCfg {
    pub ca_cert_path: Option<String>,
    /// PKCS#12 bundle holding the client certificate and key.
    pub keystore_path: Option<String>,
    pub keystore_password: Option<String>,
    pub on_invalid: OnInvalidTls,
}

/// What to do when TLS is requested but cannot be set up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnInvalidTls {
    /// Log a warning and connect in plaintext.
    #[default]
    Degrade,
    /// Refuse to start.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRegistryCfg {
    /// Tried in order; empty means `http://localhost:8081`.
    pub hosts: Vec<String>,
    pub request_timeout_ms: u64,
}

impl Default for SchemaRegistryCfg {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            request_timeout_ms: 5_000,
        }
    }
}

impl SchemaRegistryCfg {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                details: "kafka.brokers must list at least one broker".into(),
            });
        }
        if self.kafka.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                details: "kafka.send_timeout_ms must be positive".into(),
            });
        }
        Ok(())
    }
}

pub fn parse(raw: &str) -> Result<Config, ConfigError> {
    let with_env = shellexpand::env(raw).map_err(|e| ConfigError::Env {
        details: e.to_string(),
    })?;
    let cfg: Config = serde_yaml::from_str(&with_env)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_path(file_path: &str) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(file_path).map_err(|source| ConfigError::Io {
        path: file_path.to_string(),
        source,
    })?;
    parse(&raw)
}
