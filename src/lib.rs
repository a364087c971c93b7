//! Docker DNS - authoritative answers for container hostnames.
//!
//! This crate keeps an in-memory table from hostname to container address,
//! driven by the Docker event stream, and serves it through Hickory DNS.
//! Queries are answered from memory only; the container runtime is never
//! called on the query path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           docker-dns                             │
//! │                                                                  │
//! │  ┌──────────────────┐    ┌──────────────────┐                    │
//! │  │ Docker daemon    │───▶│   Reconciler     │                    │
//! │  │ list / inspect / │    │ scan + events    │                    │
//! │  │ events           │    └────────┬─────────┘                    │
//! │  └──────────────────┘             │ writes                       │
//! │                                   ▼                              │
//! │                         ┌──────────────────┐                     │
//! │                         │  Hostname Table  │                     │
//! │                         └────────┬─────────┘                     │
//! │                                  │ reads                         │
//! │                                  ▼                               │
//! │                         ┌──────────────────┐                     │
//! │                         │  Hickory DNS     │◀── UDP/TCP          │
//! │                         │  Authority       │──▶ next authority   │
//! │                         └──────────────────┘    on miss          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! web.
//!   → container labelled hostname=web, running, 10.0.0.2
//!   → A 10.0.0.2 (TTL 10)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use docker_dns::{DnsConfig, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig {
//!         listen_addr: "127.0.0.1:5353".parse().unwrap(),
//!         ..DnsConfig::default()
//!     };
//!
//!     let token = CancellationToken::new();
//!     let server = DnsServer::new(config);
//!     server.run(token).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod handler;
pub mod inspector;
pub mod metrics;
pub mod reconciler;
pub mod resolver;
pub mod runtime;
pub mod server;
pub mod service;
pub mod table;
pub mod telemetry;

// Re-export main types
pub use authority::ContainerAuthority;
pub use config::{BackoffConfig, Config, DnsConfig, SoaConfig, TelemetryConfig};
pub use error::DnsError;
pub use handler::ContainerRequestHandler;
pub use resolver::{Answer, QueryResolver};
pub use runtime::{ContainerRuntime, DockerRuntime};
pub use server::DnsServer;
pub use service::ContainerDnsService;
pub use table::HostnameTable;
