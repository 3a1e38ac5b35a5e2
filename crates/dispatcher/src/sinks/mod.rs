//! Sink implementations
//!
//! Contains LogSink, FileSink (JSON lines) and NetworkSink (UDP).

mod file;
mod log;
mod network;

pub use self::file::FileSink;
pub use self::log::LogSink;
pub use self::network::NetworkSink;
pub use self::file::FileSinkConfig;
pub use self::network::{NetworkFormat, NetworkSinkConfig};
