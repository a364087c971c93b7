//! Keeps the hostname table in line with the set of running containers.
//!
//! Startup subscribes to the runtime's event feed, then scans every running
//! container into the table. After that the event loop applies start/stop
//! transitions as they arrive. If the feed dies the reconciler resubscribes
//! with backoff and rescans, since events may have been missed meanwhile.

use futures::StreamExt;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BackoffConfig;
use crate::error::DnsError;
use crate::inspector::ContainerInspector;
use crate::metrics::{self, EventOutcome, ResubscribeReason};
use crate::runtime::{ContainerRuntime, EventAction, EventStream, RuntimeEvent};
use crate::table::{ContainerRecord, HostnameTable};

/// Owns all writes to the hostname table.
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    inspector: ContainerInspector,
    table: HostnameTable,
    backoff: BackoffConfig,
}

impl Reconciler {
    /// Create a reconciler writing into `table`.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        table: HostnameTable,
        hostname_label: &str,
        backoff: BackoffConfig,
    ) -> Self {
        let inspector = ContainerInspector::new(runtime.clone(), hostname_label);
        Self {
            runtime,
            inspector,
            table,
            backoff,
        }
    }

    /// The table this reconciler maintains.
    pub fn table(&self) -> &HostnameTable {
        &self.table
    }

    /// Subscribe to the event feed and perform the initial scan.
    ///
    /// Subscribing first means a container starting during the scan is seen
    /// by at least one of the two. Any failure here is fatal: the returned
    /// error means nothing can be served.
    pub async fn start(&self) -> Result<EventStream, DnsError> {
        let stream = self
            .runtime
            .events()
            .await
            .map_err(|e| DnsError::InitialSync(format!("event subscription failed: {e}")))?;
        metrics::record_resubscribe(ResubscribeReason::InitialConnect);

        let count = self
            .bulk_sync()
            .await
            .map_err(|e| DnsError::InitialSync(format!("listing running containers failed: {e}")))?;

        info!(
            containers = count,
            hostnames = self.table.hostnames_count(),
            "Initial container sync complete"
        );
        Ok(stream)
    }

    /// Scan all running containers and replace the table contents.
    ///
    /// Returns the number of containers that resolved to a DNS entry.
    pub async fn bulk_sync(&self) -> Result<usize, DnsError> {
        let ids = self.runtime.list_running().await?;
        debug!(running = ids.len(), "scanning running containers");

        let mut records: Vec<(String, ContainerRecord)> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.inspector.resolve(&id).await {
                info!(
                    container_id = %id,
                    hostname = %record.hostname,
                    address = %record.address,
                    "Cached container"
                );
                records.push((id, record));
            }
        }

        let count = records.len();
        self.table.replace_all(records);
        self.table.mark_synced();
        metrics::record_resync(count);
        Ok(count)
    }

    /// Apply a single lifecycle event to the table.
    pub async fn apply(&self, event: &RuntimeEvent) -> EventOutcome {
        let outcome = match event.action {
            EventAction::Start => self.apply_start(&event.container_id).await,
            EventAction::Stop => self.apply_stop(&event.container_id).await,
            EventAction::Other(ref action) => {
                debug!(action = %action, container_id = %event.container_id, "ignoring event");
                EventOutcome::Ignored
            }
        };
        metrics::record_runtime_event(event.action.as_str(), outcome);
        outcome
    }

    async fn apply_start(&self, container_id: &str) -> EventOutcome {
        let Some(record) = self.inspector.resolve(container_id).await else {
            return EventOutcome::Skipped;
        };
        info!(
            container_id,
            hostname = %record.hostname,
            address = %record.address,
            "Cached container"
        );
        self.table.insert_container(container_id, record);
        EventOutcome::Applied
    }

    async fn apply_stop(&self, container_id: &str) -> EventOutcome {
        if let Some(record) = self.table.remove_container(container_id) {
            info!(
                container_id,
                hostname = %record.hostname,
                address = %record.address,
                "Removed container"
            );
            return EventOutcome::Applied;
        }

        // Not tracked (e.g. a duplicate stop); fall back to the runtime's view.
        match self.inspector.resolve(container_id).await {
            Some(record) => {
                if self.table.remove_untracked(container_id, &record) {
                    info!(
                        container_id,
                        hostname = %record.hostname,
                        address = %record.address,
                        "Removed untracked container"
                    );
                }
                EventOutcome::Applied
            }
            None => EventOutcome::Skipped,
        }
    }

    /// Consume events until `token` is cancelled.
    ///
    /// `stream` is the subscription returned by [`Reconciler::start`].
    pub async fn run(self, stream: EventStream, token: CancellationToken) {
        let mut pending = Some(stream);

        loop {
            let mut events = match pending.take() {
                Some(stream) => stream,
                None => match self.resubscribe(&token).await {
                    Some(stream) => stream,
                    None => {
                        info!("Reconciler shutting down");
                        return;
                    }
                },
            };

            let reason = loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        info!("Reconciler received shutdown signal");
                        return;
                    }

                    next = events.next() => {
                        match next {
                            Some(Ok(event)) => {
                                self.apply(&event).await;
                            }
                            Some(Err(e)) => {
                                warn!("Event feed error: {}", e);
                                break ResubscribeReason::Error;
                            }
                            None => {
                                info!("Event feed ended");
                                break ResubscribeReason::StreamEnded;
                            }
                        }
                    }
                }
            };
            metrics::record_resubscribe(reason);

            if !self.backoff.enabled {
                warn!("Event feed lost and resubscription is disabled; hostname table will no longer be updated");
                return;
            }
        }
    }

    /// Resubscribe with exponential backoff, rescanning on success.
    ///
    /// Returns `None` if cancelled first.
    async fn resubscribe(&self, token: &CancellationToken) -> Option<EventStream> {
        let mut delay = self.backoff.initial;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => return None,
                _ = sleep(delay) => {}
            }

            info!("Resubscribing to container events");
            match self.runtime.events().await {
                Ok(stream) => match self.bulk_sync().await {
                    Ok(count) => {
                        info!(containers = count, "Resubscribed and rescanned containers");
                        return Some(stream);
                    }
                    Err(e) => {
                        warn!("Rescan after resubscribe failed: {}", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to resubscribe to container events: {}", e);
                    metrics::record_resubscribe(ResubscribeReason::Error);
                }
            }

            delay = (delay * 2).min(self.backoff.max);
        }
    }
}
