//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the server runtime.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Server mode. Production sanitizes errors before they leave the server.
    pub mode: ServerMode,

    /// Future flags resolved into the build.
    pub future: FutureConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// React server component endpoint settings.
    pub rsc: RscConfig,

    /// Render the root only and let the client load everything.
    pub spa_mode: bool,

    /// Critical CSS inlined into the server hand-off.
    pub critical_css: Option<String>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for in-flight requests on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Development,
    #[default]
    Production,
    Test,
}

impl ServerMode {
    pub fn is_production(&self) -> bool {
        matches!(self, ServerMode::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Development => "development",
            ServerMode::Production => "production",
            ServerMode::Test => "test",
        }
    }
}

/// Named future flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FutureConfig {
    /// Consolidated `.data` requests instead of per-route `?_data=` fetches.
    #[serde(rename = "v3_singleFetch", alias = "v3_single_fetch")]
    pub v3_single_fetch: bool,

    /// Align argument objects across server and client functions.
    #[serde(rename = "unstable_alignRouteSignatures", alias = "unstable_align_route_signatures")]
    pub unstable_align_route_signatures: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// React server component endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RscConfig {
    pub enabled: bool,

    /// Path prefix the RSC handler is mounted under.
    pub path_prefix: String,
}

impl Default for RscConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path_prefix: "/_rsc".to_string(),
        }
    }
}
