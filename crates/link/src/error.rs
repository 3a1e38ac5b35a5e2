//! Link error types

use contracts::{ContractError, LinkAddress};
use thiserror::Error;

/// Link specific error
#[derive(Debug, Error)]
pub enum LinkError {
    /// No open transport
    #[error("link {address} is not connected")]
    NotConnected { address: LinkAddress },

    /// Transport not established within the connect timeout
    #[error("connect to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout { address: LinkAddress, timeout_ms: u64 },

    /// Transport rejected by the peer or the OS
    #[error("connect to {address} refused: {message}")]
    ConnectRefused {
        address: LinkAddress,
        message: String,
    },

    /// Write on an open transport failed; the transport is torn down
    #[error("write to {address} failed: {message}")]
    WriteFailed {
        address: LinkAddress,
        message: String,
    },

    /// Address is not in the pool
    #[error("no link registered for {address}")]
    UnknownLink { address: LinkAddress },

    /// Link was permanently retired
    #[error("link {address} has been disposed")]
    Disposed { address: LinkAddress },
}

impl LinkError {
    /// Create connect refused error
    pub fn refused(address: &LinkAddress, message: impl Into<String>) -> Self {
        Self::ConnectRefused {
            address: address.clone(),
            message: message.into(),
        }
    }

    /// Address of the link the error concerns
    pub fn address(&self) -> &LinkAddress {
        match self {
            Self::NotConnected { address }
            | Self::ConnectTimeout { address, .. }
            | Self::ConnectRefused { address, .. }
            | Self::WriteFailed { address, .. }
            | Self::UnknownLink { address }
            | Self::Disposed { address } => address,
        }
    }
}

impl From<LinkError> for ContractError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::ConnectTimeout {
                address,
                timeout_ms,
            } => ContractError::ConnectTimeout {
                address,
                timeout_ms,
            },
            LinkError::ConnectRefused { address, message } => {
                ContractError::ConnectRefused { address, message }
            }
            LinkError::NotConnected { address }
            | LinkError::WriteFailed { address, .. }
            | LinkError::UnknownLink { address }
            | LinkError::Disposed { address } => ContractError::LinkUnavailable { address },
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, LinkError>;
