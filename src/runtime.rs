//! Container runtime access.
//!
//! The reconciler only talks to the runtime through [`ContainerRuntime`];
//! [`DockerRuntime`] is the Docker Engine implementation.

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, EventMessage};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::error::DnsError;

/// Timeout for Docker API requests, in seconds.
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Stream of lifecycle events, already filtered to container start/stop.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent, DnsError>>;

/// The parts of a container descriptor needed to derive a DNS entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Runtime-assigned container id.
    pub id: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Hostname configured for the container.
    pub hostname: Option<String>,
    /// Address on the default bridge network.
    pub ip_address: Option<String>,
    /// Address per attached network, keyed by network name.
    pub network_addresses: BTreeMap<String, String>,
}

/// Lifecycle action reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Container started.
    Start,
    /// Container stopped.
    Stop,
    /// Anything else.
    Other(String),
}

impl EventAction {
    /// Parse the runtime's action string.
    pub fn parse(action: &str) -> Self {
        match action {
            "start" => Self::Start,
            "stop" => Self::Stop,
            other => Self::Other(other.to_string()),
        }
    }

    /// Action name as reported by the runtime.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// What happened.
    pub action: EventAction,
    /// Container the event is about.
    pub container_id: String,
}

impl RuntimeEvent {
    /// Build an event from an action string and container id.
    pub fn new(action: &str, container_id: impl Into<String>) -> Self {
        Self {
            action: EventAction::parse(action),
            container_id: container_id.into(),
        }
    }
}

/// Read-only capability over the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ids of all currently running containers.
    async fn list_running(&self) -> Result<Vec<String>, DnsError>;

    /// Fetch the descriptor of one container.
    async fn inspect(&self, container_id: &str) -> Result<ContainerDetails, DnsError>;

    /// Subscribe to container start/stop events.
    async fn events(&self) -> Result<EventStream, DnsError>;
}

/// Docker Engine backed runtime.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon.
    ///
    /// Uses the given unix socket path, or the local defaults (which honour
    /// `DOCKER_HOST`) when none is configured. Connecting is lazy; the first
    /// request surfaces an unreachable daemon.
    pub fn connect(socket: Option<&str>) -> Result<Self, DnsError> {
        let docker = match socket {
            Some(path) => {
                info!(socket = path, "Connecting to Docker socket");
                Docker::connect_with_socket(path, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            None => {
                info!("Connecting to Docker with local defaults");
                Docker::connect_with_local_defaults()?
            }
        };
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<String>, DnsError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerDetails, DnsError> {
        let response = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(details_from_inspect(container_id, response))
    }

    async fn events(&self) -> Result<EventStream, DnsError> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert(
            "event".to_string(),
            vec!["start".to_string(), "stop".to_string()],
        );
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        let stream = self
            .docker
            .events(Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(message) => event_from_message(message).map(Ok),
                    Err(e) => Some(Err(DnsError::from(e))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

/// Flatten the Docker inspect response.
fn details_from_inspect(container_id: &str, response: ContainerInspectResponse) -> ContainerDetails {
    let (labels, hostname) = match response.config {
        Some(config) => (config.labels.unwrap_or_default(), config.hostname),
        None => (HashMap::new(), None),
    };

    let (ip_address, network_addresses) = match response.network_settings {
        Some(settings) => {
            let networks = settings
                .networks
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(name, endpoint)| endpoint.ip_address.map(|ip| (name, ip)))
                .collect();
            (settings.ip_address, networks)
        }
        None => (None, BTreeMap::new()),
    };

    ContainerDetails {
        id: response.id.unwrap_or_else(|| container_id.to_string()),
        labels,
        hostname,
        ip_address,
        network_addresses,
    }
}

/// Convert a Docker event message; events without an actor id are dropped.
fn event_from_message(message: EventMessage) -> Option<RuntimeEvent> {
    let action = message.action?;
    let Some(container_id) = message.actor.and_then(|actor| actor.id) else {
        debug!(action = %action, "Docker event without actor id");
        return None;
    };
    Some(RuntimeEvent::new(&action, container_id))
}
