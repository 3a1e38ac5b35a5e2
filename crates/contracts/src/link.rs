//! Link identity and state
//!
//! A link is one point-to-point connection to a hardware device: the
//! trigger sensor or one actuator module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Hardware address of a link
///
/// Used as the key of the link pool: two chutes bound to the same address
/// share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkAddress {
    /// TCP socket (serial-to-ethernet converters, network IO modules)
    Tcp { host: String, port: u16 },
    /// Local serial port
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        #[serde(default)]
        parity: Parity,
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Serial parity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl LinkAddress {
    /// TCP address
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Serial address with 8N1 framing
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self::Serial {
            port: port.into(),
            baud_rate,
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: default_stop_bits(),
        }
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Serial {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let p = match parity {
                    Parity::None => 'N',
                    Parity::Odd => 'O',
                    Parity::Even => 'E',
                };
                write!(f, "serial://{port}@{baud_rate}-{data_bits}{p}{stop_bits}")
            }
        }
    }
}

impl FromStr for LinkAddress {
    type Err = ContractError;

    /// Accepts `tcp://host:port`, bare `host:port` and
    /// `serial://port[@baud[-framing]]`, framing like `8N1` or `7E2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("serial://") {
            let (port, settings) = match rest.split_once('@') {
                Some((port, settings)) => (port, Some(settings)),
                None => (rest, None),
            };
            if port.is_empty() {
                return Err(ContractError::config_parse(format!(
                    "missing serial port in '{s}'"
                )));
            }
            let Some(settings) = settings else {
                return Ok(Self::serial(port, default_baud_rate()));
            };
            let (baud_text, framing) = match settings.split_once('-') {
                Some((baud, framing)) => (baud, Some(framing)),
                None => (settings, None),
            };
            let baud_rate = baud_text.parse::<u32>().map_err(|e| {
                ContractError::config_parse(format!("invalid baud rate in '{s}': {e}"))
            })?;
            let (data_bits, parity, stop_bits) = match framing {
                Some(framing) => parse_framing(framing).ok_or_else(|| {
                    ContractError::config_parse(format!("invalid serial framing in '{s}'"))
                })?,
                None => (default_data_bits(), Parity::None, default_stop_bits()),
            };
            return Ok(Self::Serial {
                port: port.to_string(),
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            });
        }

        let rest = s.strip_prefix("tcp://").unwrap_or(s);
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| ContractError::config_parse(format!("missing port in '{s}'")))?;
        if host.is_empty() {
            return Err(ContractError::config_parse(format!("missing host in '{s}'")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| ContractError::config_parse(format!("invalid port in '{s}': {e}")))?;
        Ok(Self::tcp(host, port))
    }
}

/// `8N1` style framing: data bits, parity letter, stop bits
fn parse_framing(framing: &str) -> Option<(u8, Parity, u8)> {
    let bytes = framing.as_bytes();
    let [data, parity, stop] = bytes else {
        return None;
    };
    let data_bits = match data {
        b'5'..=b'8' => data - b'0',
        _ => return None,
    };
    let parity = match parity.to_ascii_uppercase() {
        b'N' => Parity::None,
        b'O' => Parity::Odd,
        b'E' => Parity::Even,
        _ => return None,
    };
    let stop_bits = match stop {
        b'1' | b'2' => stop - b'0',
        _ => return None,
    };
    Some((data_bits, parity, stop_bits))
}

/// Connection state of a single link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl LinkState {
    /// Whether writes can currently succeed
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// One state transition of one link
///
/// Emitted exactly once per transition; `from != to` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub address: LinkAddress,
    pub from: LinkState,
    pub to: LinkState,
}
