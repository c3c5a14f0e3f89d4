//! Client for participating in a DHT via HTTP streaming requests to a
//! single configured proxy server, rather than by joining the DHT overlay
//! directly.
//!
//! The public surface lives on [`client::ProxyClient`]: [`client::ProxyClient::start`]
//! to configure and connect, `get`/`put`/`listen`/`cancel_listen` for the DHT
//! operations themselves, `periodic` to drive the scheduler and callback
//! drain, and `shutdown` to tear everything down. Push-enabled builds also
//! call `push_notification_received` when the host platform delivers an
//! out-of-band wake-up.

pub mod client;
pub mod codec;
mod connectivity;
pub mod config;
pub mod drain;
pub mod error;
pub mod http_client;
pub mod metrics;
mod push;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use client::ProxyClient;
pub use codec::Value;
pub use config::ProxyClientConfig;
pub use error::{Error, Result};
pub use types::{Family, InfoHash, NodeStats, NodeStatus, Platform, ProxyEndpoint};
