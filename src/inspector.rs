//! Resolve a container id to the hostname and address it should be served under.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::runtime::{ContainerDetails, ContainerRuntime};
use crate::table::ContainerRecord;

/// Looks up containers and derives their DNS entry.
///
/// The hostname comes from a container label (`hostname` by default); the
/// container's own network hostname is not consulted.
#[derive(Clone)]
pub struct ContainerInspector {
    runtime: Arc<dyn ContainerRuntime>,
    hostname_label: String,
}

impl ContainerInspector {
    /// Create an inspector reading the hostname from `hostname_label`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, hostname_label: impl Into<String>) -> Self {
        Self {
            runtime,
            hostname_label: hostname_label.into(),
        }
    }

    /// Resolve a container to its hostname and address.
    ///
    /// Returns `None` when the container has no hostname label, no parseable
    /// address yet, or cannot be inspected at all. None of these are errors.
    pub async fn resolve(&self, container_id: &str) -> Option<ContainerRecord> {
        let details = match self.runtime.inspect(container_id).await {
            Ok(details) => details,
            Err(e) => {
                info!(container_id, error = %e, "Skipping container: inspect failed");
                return None;
            }
        };

        let record = record_from_details(&details, &self.hostname_label);
        if record.is_none() {
            info!(
                container_id,
                label = %self.hostname_label,
                "Skipping container: no hostname label or address"
            );
        }
        record
    }
}

/// Derive the table record from a container descriptor.
pub fn record_from_details(details: &ContainerDetails, hostname_label: &str) -> Option<ContainerRecord> {
    let hostname = details.labels.get(hostname_label)?;
    let address = primary_address(details)?;
    ContainerRecord::new(hostname, address)
}

/// The default-bridge address, falling back to the first network (by name)
/// with a parseable address.
pub fn primary_address(details: &ContainerDetails) -> Option<IpAddr> {
    if let Some(ip) = details.ip_address.as_deref().and_then(parse_address) {
        return Some(ip);
    }

    details.network_addresses.iter().find_map(|(network, ip)| {
        let parsed = parse_address(ip);
        if parsed.is_some() {
            debug!(network = %network, address = %ip, "using per-network address");
        }
        parsed
    })
}

fn parse_address(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}
