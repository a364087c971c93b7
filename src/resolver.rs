//! Per-query read path over the hostname table.

use std::net::IpAddr;

use crate::table::HostnameTable;

/// Outcome of resolving a query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// The name is known; at least one address.
    Hit(Vec<IpAddr>),
    /// The name is unknown and should be handed to the next handler.
    Miss,
}

impl Answer {
    /// Addresses of a hit, empty for a miss.
    pub fn addresses(&self) -> &[IpAddr] {
        match self {
            Answer::Hit(addrs) => addrs,
            Answer::Miss => &[],
        }
    }

    /// IPv4 addresses of a hit.
    pub fn ipv4(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.addresses().iter().copied().filter(IpAddr::is_ipv4)
    }

    /// IPv6 addresses of a hit.
    pub fn ipv6(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.addresses().iter().copied().filter(IpAddr::is_ipv6)
    }
}

/// Answers query names from the hostname table. Never touches the runtime.
#[derive(Debug, Clone)]
pub struct QueryResolver {
    table: HostnameTable,
}

impl QueryResolver {
    /// Create a resolver reading from `table`.
    pub fn new(table: HostnameTable) -> Self {
        Self { table }
    }

    /// The table this resolver reads from.
    pub fn table(&self) -> &HostnameTable {
        &self.table
    }

    /// Resolve a query name. A trailing root label is ignored.
    pub fn answer(&self, query_name: &str) -> Answer {
        match self.table.lookup(query_name) {
            Some(addrs) => Answer::Hit(addrs),
            None => Answer::Miss,
        }
    }
}
