//! Configuration schema.
//!
//! Every section carries serde defaults, so a config file only has to name
//! the settings it changes.

use serde::{Deserialize, Serialize};

/// Root configuration for the health-check proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HealthgateConfig {
    /// Listener configuration (bind address, ports).
    pub listener: ListenerConfig,

    /// Admission spool settings.
    pub spool: SpoolConfig,

    /// Verdict cache settings.
    pub cache: CacheConfig,

    /// Probe settings shared by every checker.
    pub checks: CheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for every listener (e.g., "0.0.0.0").
    pub bind_address: String,

    /// HTTP listen ports. Each port serves the full route table.
    pub ports: Vec<u16>,

    /// Optional port for the line-protocol agent listener.
    pub agent_port: Option<u16>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            ports: vec![3333],
            agent_port: None,
        }
    }
}

/// Admission spool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpoolConfig {
    /// Directory holding one admission file per service key.
    pub root: String,

    /// Accept POST /spool mutations over HTTP. When disabled the spool is
    /// only writable through the CLI on the host itself.
    pub allow_remote_changes: bool,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            root: "/var/spool/healthgate".to_string(),
            allow_remote_changes: false,
        }
    }
}

/// Verdict cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a probe verdict may be served from cache, in seconds.
    pub ttl_secs: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 10.0 }
    }
}

/// Probe configuration shared by every checker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Deadline for one probe, connection setup included, in seconds.
    pub timeout_secs: u64,

    /// Header carrying the service name on forwarded HTTP probes.
    pub service_name_header: Option<String>,

    /// Username for the MySQL handshake probe.
    pub mysql_username: Option<String>,

    /// Password for the MySQL handshake probe.
    pub mysql_password: Option<String>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            service_name_header: None,
            mysql_username: None,
            mysql_password: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
