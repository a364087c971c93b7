//! Lifecycle of the container DNS core: start, serve, stop.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::authority::ContainerAuthority;
use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::reconciler::Reconciler;
use crate::resolver::QueryResolver;
use crate::runtime::ContainerRuntime;
use crate::table::HostnameTable;

/// Owns the hostname table and the background reconciler.
///
/// Host adapters call [`start`](Self::start) once before serving queries and
/// [`stop`](Self::stop) on shutdown.
pub struct ContainerDnsService {
    config: DnsConfig,
    runtime: Arc<dyn ContainerRuntime>,
    table: HostnameTable,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ContainerDnsService {
    /// Create a stopped service.
    pub fn new(config: DnsConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            table: HostnameTable::new(),
            token: CancellationToken::new(),
            task: None,
        }
    }

    /// The shared hostname table.
    pub fn table(&self) -> &HostnameTable {
        &self.table
    }

    /// A read-only resolver over the table.
    pub fn resolver(&self) -> QueryResolver {
        QueryResolver::new(self.table.clone())
    }

    /// Build a hickory authority bound to the table.
    pub fn authority(&self) -> Result<ContainerAuthority, DnsError> {
        Ok(ContainerAuthority::new(self.config.clone(), self.table.clone())?)
    }

    /// True while the background reconciler is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Run the initial sync and spawn the event loop.
    ///
    /// Fails if the runtime cannot be reached or its containers cannot be
    /// listed; the table is not marked synced in that case. Calling `start`
    /// on a started service does nothing.
    pub async fn start(&mut self) -> Result<(), DnsError> {
        if self.task.is_some() {
            return Ok(());
        }

        let reconciler = Reconciler::new(
            self.runtime.clone(),
            self.table.clone(),
            &self.config.hostname_label,
            self.config.backoff(),
        );
        let stream = reconciler.start().await?;

        if self.token.is_cancelled() {
            self.token = CancellationToken::new();
        }
        let token = self.token.clone();
        self.task = Some(tokio::spawn(reconciler.run(stream, token)));

        info!(
            hostnames = self.table.hostnames_count(),
            "Container DNS service started"
        );
        Ok(())
    }

    /// Cancel the event loop and wait for it to exit.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Reconciler task panicked: {}", e);
            }
        }
        info!("Container DNS service stopped");
    }
}
