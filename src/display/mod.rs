//! Display side: a read-only replica of controller state, kept current over
//! a channel that reconnects with backoff.

pub mod client;
pub mod discovery;
pub mod reconnect;
pub mod replica;

pub use client::{DisplayClient, DisplayCommand, DisplayOptions, DisplayView};
pub use discovery::{ChainedDiscovery, EndpointDiscovery, NoDiscovery, PortFileDiscovery, PortScanDiscovery};
pub use reconnect::{Backoff, BackoffPolicy, ConnectionState, ReconnectPlan};
pub use replica::{DisplayReplica, ViewRefresh};
