//! Configuration types for docker-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Zone the container authority answers for (e.g. "." or "docker.internal").
    #[serde(default = "default_origin")]
    pub origin: String,

    /// TTL for address records in seconds. Kept short since containers
    /// come and go at any time.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Container label holding the DNS hostname.
    #[serde(default = "default_hostname_label")]
    pub hostname_label: String,

    /// Path to the Docker Engine unix socket. Local defaults (and
    /// `DOCKER_HOST`) are used when unset.
    #[serde(default)]
    pub docker_socket: Option<String>,

    /// Resubscribe to the event feed after it fails or ends.
    #[serde(default = "default_resubscribe")]
    pub resubscribe: bool,

    /// Initial resubscribe backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum resubscribe backoff in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// SOA record configuration.
    #[serde(default)]
    pub soa: SoaConfig,
}

impl DnsConfig {
    /// Resubscribe policy derived from this configuration.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            enabled: self.resubscribe,
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5353)),
            origin: default_origin(),
            ttl: default_ttl(),
            hostname_label: default_hostname_label(),
            docker_socket: None,
            resubscribe: default_resubscribe(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            soa: SoaConfig::default(),
        }
    }
}

/// Event feed resubscription policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// When false the reconciler stops once the feed dies.
    pub enabled: bool,
    /// First delay after a failure.
    pub initial: Duration,
    /// Upper bound for the doubling delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        DnsConfig::default().backoff()
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "docker_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "docker-dns".to_string()
}

/// SOA (Start of Authority) record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Primary nameserver hostname.
    #[serde(default = "default_mname")]
    pub mname: String,

    /// Admin email in DNS format (e.g., "admin.docker.local" for admin@docker.local).
    #[serde(default = "default_rname")]
    pub rname: String,

    /// Refresh interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u32,

    /// Retry interval in seconds.
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Expire time in seconds.
    #[serde(default = "default_expire")]
    pub expire: u32,

    /// Minimum TTL in seconds.
    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

fn default_origin() -> String {
    ".".to_string()
}

fn default_ttl() -> u32 {
    10
}

fn default_hostname_label() -> String {
    "hostname".to_string()
}

fn default_resubscribe() -> bool {
    true
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_mname() -> String {
    "ns1.docker.local".to_string()
}

fn default_rname() -> String {
    "admin.docker.local".to_string()
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    600
}

fn default_expire() -> u32 {
    604800
}

fn default_minimum() -> u32 {
    10
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            mname: default_mname(),
            rname: default_rname(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_clamps_max_to_initial() {
        let config = DnsConfig {
            initial_backoff_ms: 5_000,
            max_backoff_ms: 100,
            ..DnsConfig::default()
        };

        let backoff = config.backoff();
        assert_eq!(backoff.initial, Duration::from_secs(5));
        assert_eq!(backoff.max, Duration::from_secs(5));
    }

    #[test]
    fn test_defaults() {
        let config = DnsConfig::default();
        assert_eq!(config.ttl, 10);
        assert_eq!(config.origin, ".");
        assert_eq!(config.hostname_label, "hostname");
        assert!(config.backoff().enabled);
    }
}
