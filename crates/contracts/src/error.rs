//! Layered error definitions
//!
//! Categorized by source: config / link / signal / routing / actuation / sink

use thiserror::Error;

use crate::{ChuteId, LinkAddress, PackageId};

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Link Errors =====
    /// No open transport on the link; sends fail fast
    #[error("link {address} unavailable")]
    LinkUnavailable { address: LinkAddress },

    /// Transport could not be established within the connect timeout
    #[error("connect to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout { address: LinkAddress, timeout_ms: u64 },

    /// Transport establishment was rejected by the peer or the OS
    #[error("connect to {address} refused: {message}")]
    ConnectRefused {
        address: LinkAddress,
        message: String,
    },

    // ===== Signal Errors =====
    /// Trigger payload could not be parsed
    #[error("malformed trigger frame: {message}")]
    MalformedFrame { message: String },

    // ===== Routing Errors =====
    /// Chute has no module binding
    #[error("chute {chute} has no module binding")]
    UnboundChute { chute: ChuteId },

    // ===== Actuation Errors =====
    /// One package's engage/release sequence was aborted
    #[error("actuation of package '{package}' on chute {chute} failed: {message}")]
    ActuationFailure {
        package: PackageId,
        chute: ChuteId,
        message: String,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create malformed frame error
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Create actuation failure
    pub fn actuation_failure(
        package: PackageId,
        chute: ChuteId,
        message: impl Into<String>,
    ) -> Self {
        Self::ActuationFailure {
            package,
            chute,
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the error only concerns one link and will be retried by its supervisor
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Self::LinkUnavailable { .. } | Self::ConnectTimeout { .. } | Self::ConnectRefused { .. }
        )
    }
}
