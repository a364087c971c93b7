//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::handler::ContainerRequestHandler;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::service::ContainerDnsService;
use crate::table::HostnameTable;

/// Interval for emitting table metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Timeout for idle TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodically emit table metrics.
async fn metrics_loop(table: HostnameTable, token: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                table.emit_metrics();
                debug!(
                    hostnames = table.hostnames_count(),
                    addresses = table.addresses_count(),
                    containers = table.containers_count(),
                    "emitted table metrics"
                );
            }
            _ = token.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Standalone DNS server answering for container hostnames.
pub struct DnsServer {
    config: DnsConfig,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl DnsServer {
    /// Create a new DNS server backed by the Docker daemon.
    pub fn new(config: DnsConfig) -> Self {
        Self {
            config,
            runtime: None,
        }
    }

    /// Create a DNS server over an existing runtime.
    pub fn with_runtime(config: DnsConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime: Some(runtime),
        }
    }

    /// Run the DNS server until the token is cancelled.
    ///
    /// Returns an error without serving anything if the initial container
    /// sync fails.
    pub async fn run(self, token: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.listen_addr,
            origin = %self.config.origin,
            ttl = self.config.ttl,
            hostname_label = %self.config.hostname_label,
            "Starting docker-dns server"
        );

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Arc::new(DockerRuntime::connect(self.config.docker_socket.as_deref())?),
        };

        // Sockets first, so a bind failure leaves nothing running
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;

        // Initial sync must succeed before anything is served
        let mut service = ContainerDnsService::new(self.config.clone(), runtime);
        info!("Syncing running containers...");
        service.start().await?;

        let authority = match service.authority() {
            Ok(authority) => authority,
            Err(e) => {
                service.stop().await;
                return Err(e);
            }
        };
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        let mut catalog = Catalog::new();
        catalog.upsert(authority.origin().clone(), vec![authority]);

        let mut server = ServerFuture::new(ContainerRequestHandler::new(catalog));

        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!(
            origin = %self.config.origin,
            hostnames = service.table().hostnames_count(),
            "DNS server ready to serve queries"
        );

        let metrics_handle = tokio::spawn(metrics_loop(service.table().clone(), token.clone()));
        service.table().emit_metrics();

        tokio::select! {
            _ = token.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        token.cancel();
        let _ = metrics_handle.await;

        info!("Stopping container DNS service...");
        service.stop().await;

        info!("DNS server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::FakeRuntime;

    #[tokio::test]
    async fn test_run_fails_when_initial_sync_fails() {
        let runtime = Arc::new(FakeRuntime::new());
        let _feed = runtime.feed();
        *runtime.fail_list.lock() = true;

        let config = DnsConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..DnsConfig::default()
        };
        let server = DnsServer::with_runtime(config, runtime);

        let result = server.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(DnsError::InitialSync(_))));
    }

    #[tokio::test]
    async fn test_bind_failure_starts_nothing() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.add("c1", Some("web"), Some("10.0.0.2"), true);
        let _feed = runtime.feed();

        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = DnsConfig {
            listen_addr: taken.local_addr().unwrap(),
            ..DnsConfig::default()
        };
        let server = DnsServer::with_runtime(config, runtime.clone());

        let result = server.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(DnsError::Io(_))));
        // No subscription was opened and no container was inspected
        assert_eq!(runtime.feeds.lock().len(), 1);
        assert!(runtime.inspect_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.add("c1", Some("web"), Some("10.0.0.2"), true);
        let _feed = runtime.feed();

        let config = DnsConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..DnsConfig::default()
        };
        let server = DnsServer::with_runtime(config, runtime);
        let token = CancellationToken::new();
        let handle = tokio::spawn(server.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
