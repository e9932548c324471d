//! msghub - multi-tenant publish/subscribe message hub
//!
//! Clients subscribe to named topics over WebSocket and receive every
//! message published on them; publishers use the same WebSocket protocol
//! or a one-shot HTTP API. Recent messages per topic are kept in a bounded
//! replay buffer that HTTP clients can drain.

pub mod auth;
pub mod config;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod replay;
pub mod server;
pub mod session;
pub mod transport;

pub use auth::AuthProvider;
pub use config::Config;
pub use hub::{Hub, HubOptions, TenantHubMap};
pub use metrics::Metrics;
pub use protocol::{Message, MessageType, Outbound, Request};
pub use replay::ReplayBuffer;
pub use server::Server;
pub use session::{Session, SessionId};
