//! Error types for docker-dns.

use thiserror::Error;

/// Errors that can occur in the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Docker Engine API error
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Container runtime error not originating from the Docker client
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Initial container scan failed; nothing can be served
    #[error("Initial container sync failed: {0}")]
    InitialSync(String),

    /// Table not ready
    #[error("Hostname table not ready - initial sync incomplete")]
    NotReady,
}
