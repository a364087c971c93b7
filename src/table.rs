//! In-memory hostname table kept in sync with running containers.
//!
//! A hostname maps to a set of addresses so replicas that share a name are
//! all answered. The table also remembers which container contributed which
//! `(hostname, address)` pair, so a stopped container can be withdrawn by id
//! even when the runtime no longer reports its address.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;

/// The hostname and address a running container contributes to the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRecord {
    /// Normalized hostname.
    pub hostname: String,
    /// Primary address of the container.
    pub address: IpAddr,
}

impl ContainerRecord {
    /// Build a record, normalizing the hostname. Returns `None` for an empty name.
    pub fn new(hostname: &str, address: IpAddr) -> Option<Self> {
        Some(Self {
            hostname: normalize_hostname(hostname)?,
            address,
        })
    }
}

/// Normalize a hostname for use as a table key.
///
/// Trims whitespace and the trailing root label, and lowercases ASCII.
/// Returns `None` when nothing is left.
pub fn normalize_hostname(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

/// Thread-safe hostname table.
///
/// Cloning is cheap and every clone shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct HostnameTable {
    inner: Arc<RwLock<TableInner>>,
}

#[derive(Debug, Default)]
struct TableInner {
    /// hostname -> addresses
    names: HashMap<String, BTreeSet<IpAddr>>,

    /// container_id -> record it contributed
    containers: HashMap<String, ContainerRecord>,

    /// Incremented on every effective change
    serial: u32,

    /// True after the first complete scan of running containers
    synced: bool,
}

impl HostnameTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `address` with `hostname`.
    ///
    /// Returns false if the association already existed or the hostname is empty.
    pub fn put(&self, hostname: &str, address: IpAddr) -> bool {
        let Some(hostname) = normalize_hostname(hostname) else {
            return false;
        };
        let mut inner = self.inner.write();
        let added = Self::add_address(&mut inner, hostname, address);
        if added {
            inner.serial = inner.serial.wrapping_add(1);
        }
        added
    }

    /// Withdraw one address from `hostname`, dropping the hostname once it has none left.
    ///
    /// Returns false if the association did not exist.
    pub fn remove(&self, hostname: &str, address: IpAddr) -> bool {
        let Some(hostname) = normalize_hostname(hostname) else {
            return false;
        };
        let mut inner = self.inner.write();
        let removed = Self::remove_address(&mut inner, &hostname, address);
        if removed {
            inner.serial = inner.serial.wrapping_add(1);
        }
        removed
    }

    /// Lookup the addresses for a hostname.
    ///
    /// Returns `None` on a miss; a hit always carries at least one address.
    pub fn lookup(&self, hostname: &str) -> Option<Vec<IpAddr>> {
        let hostname = normalize_hostname(hostname)?;
        let inner = self.inner.read();
        inner
            .names
            .get(&hostname)
            .map(|addrs| addrs.iter().copied().collect())
    }

    /// Check if the given hostname has at least one address.
    pub fn contains(&self, hostname: &str) -> bool {
        self.lookup(hostname).is_some()
    }

    /// Record a running container.
    ///
    /// Re-inserting the same record is a no-op. If the container was recorded
    /// with a different hostname or address, the old association is withdrawn.
    pub fn insert_container(&self, container_id: &str, record: ContainerRecord) -> bool {
        let mut inner = self.inner.write();
        if inner.containers.get(container_id) == Some(&record) {
            return false;
        }

        debug!(
            container_id,
            hostname = %record.hostname,
            address = %record.address,
            "inserting container"
        );
        let previous = inner
            .containers
            .insert(container_id.to_string(), record.clone());
        if let Some(previous) = previous {
            Self::release(&mut inner, &previous);
        }
        Self::add_address(&mut inner, record.hostname, record.address);
        inner.serial = inner.serial.wrapping_add(1);
        true
    }

    /// Forget a container, withdrawing its address unless another container
    /// still backs the same hostname and address.
    pub fn remove_container(&self, container_id: &str) -> Option<ContainerRecord> {
        let mut inner = self.inner.write();
        let record = inner.containers.remove(container_id)?;
        debug!(
            container_id,
            hostname = %record.hostname,
            address = %record.address,
            "removing container"
        );
        Self::release(&mut inner, &record);
        inner.serial = inner.serial.wrapping_add(1);
        Some(record)
    }

    /// Withdraw an association reported for a container the table does not track.
    ///
    /// Left in place while a tracked container still backs the same hostname
    /// and address. Returns true if the address was withdrawn.
    pub fn remove_untracked(&self, container_id: &str, record: &ContainerRecord) -> bool {
        let mut inner = self.inner.write();
        if inner.containers.contains_key(container_id) {
            return false;
        }
        if inner.containers.values().any(|r| r == record) {
            debug!(
                container_id,
                hostname = %record.hostname,
                address = %record.address,
                "address still backed by a tracked container"
            );
            return false;
        }
        let removed = Self::remove_address(&mut inner, &record.hostname, record.address);
        if removed {
            inner.serial = inner.serial.wrapping_add(1);
        }
        removed
    }

    /// Record contributed by a tracked container.
    pub fn container(&self, container_id: &str) -> Option<ContainerRecord> {
        self.inner.read().containers.get(container_id).cloned()
    }

    /// Replace the whole table with the result of a full container scan.
    ///
    /// Readers observe either the old or the new table, never a mix.
    pub fn replace_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = (String, ContainerRecord)>,
    {
        let containers: HashMap<String, ContainerRecord> = records.into_iter().collect();
        let mut names: HashMap<String, BTreeSet<IpAddr>> = HashMap::new();
        for record in containers.values() {
            names
                .entry(record.hostname.clone())
                .or_default()
                .insert(record.address);
        }

        let mut inner = self.inner.write();
        inner.names = names;
        inner.containers = containers;
        inner.serial = inner.serial.wrapping_add(1);
        debug!(
            hostnames = inner.names.len(),
            containers = inner.containers.len(),
            "replaced hostname table"
        );
    }

    /// Get current serial.
    pub fn serial(&self) -> u32 {
        self.inner.read().serial
    }

    /// Check if the table is ready to serve DNS queries.
    pub fn is_synced(&self) -> bool {
        self.inner.read().synced
    }

    /// Mark the initial sync as complete.
    pub fn mark_synced(&self) {
        let mut inner = self.inner.write();
        inner.synced = true;
        debug!(hostnames = inner.names.len(), "hostname table synced");
    }

    /// Clear all entries and the synced flag.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.names.clear();
        inner.containers.clear();
        inner.synced = false;
        inner.serial = inner.serial.wrapping_add(1);
        debug!("cleared hostname table");
    }

    /// Get count of hostnames with at least one address.
    pub fn hostnames_count(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Get count of hostname/address associations.
    pub fn addresses_count(&self) -> usize {
        self.inner.read().names.values().map(BTreeSet::len).sum()
    }

    /// Get count of tracked containers.
    pub fn containers_count(&self) -> usize {
        self.inner.read().containers.len()
    }

    /// Emit current table metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_table_counts(
            inner.names.len(),
            inner.names.values().map(BTreeSet::len).sum(),
            inner.containers.len(),
        );
        metrics::record_synced(inner.synced);
        metrics::record_serial(inner.serial);
    }

    fn add_address(inner: &mut TableInner, hostname: String, address: IpAddr) -> bool {
        inner.names.entry(hostname).or_default().insert(address)
    }

    fn remove_address(inner: &mut TableInner, hostname: &str, address: IpAddr) -> bool {
        let Some(addrs) = inner.names.get_mut(hostname) else {
            return false;
        };
        let removed = addrs.remove(&address);
        if addrs.is_empty() {
            inner.names.remove(hostname);
        }
        removed
    }

    /// Withdraw a record's address unless another container still backs it.
    fn release(inner: &mut TableInner, record: &ContainerRecord) {
        if inner.containers.values().any(|r| r == record) {
            return;
        }
        Self::remove_address(inner, &record.hostname, record.address);
    }
}
