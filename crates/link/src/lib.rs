//! # Link
//!
//! Resilient duplex connections to sorter hardware.
//!
//! Responsibilities:
//! - Open TCP / serial transports with a bounded connect timeout
//! - Serialize concurrent writes per link
//! - Forward inbound bytes from a per-link read loop
//! - Reconnect with exponential backoff after unexpected loss
//! - Pool links by hardware address and broadcast state transitions
//!
//! ## Feature Flags
//!
//! - `serial`: Enable local serial ports (requires tokio-serial)

pub mod backoff;
pub mod connector;
pub mod duplex;
pub mod error;
pub mod mock_connector;
pub mod pool;

pub use backoff::ReconnectPolicy;
pub use connector::{Connector, LinkIo, LinkStream, SystemConnector};
pub use contracts::{LinkAddress, LinkConfig, LinkEvent, LinkState};
pub use duplex::DuplexLink;
pub use error::{LinkError, Result};
pub use mock_connector::{MockConnector, MockPeer, MockPeers};
pub use pool::LinkPool;
