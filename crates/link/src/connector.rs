//! Transport abstraction
//!
//! Separates "how bytes get to the device" from link lifecycle, so the
//! same link logic drives TCP sockets, serial ports and in-memory mocks.

use std::future::Future;
use std::time::Duration;

use contracts::LinkAddress;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

use crate::error::{LinkError, Result};

/// Byte stream a link runs over
pub trait LinkIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkIo for T {}

/// Boxed transport handed from a connector to a link
pub type LinkStream = Box<dyn LinkIo>;

/// Transport factory
///
/// Each call creates a fresh transport; a link never reuses one after loss.
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `address`, giving up after `timeout`
    ///
    /// # Errors
    /// `ConnectTimeout` or `ConnectRefused`; no half-open transport is left behind.
    fn connect(
        &self,
        address: &LinkAddress,
        timeout: Duration,
    ) -> impl Future<Output = Result<LinkStream>> + Send;
}

/// Connector for real hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    #[instrument(name = "link_transport_open", skip(self), fields(address = %address))]
    async fn connect(&self, address: &LinkAddress, timeout: Duration) -> Result<LinkStream> {
        match address {
            LinkAddress::Tcp { host, port } => {
                let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port)))
                    .await
                    .map_err(|_| LinkError::ConnectTimeout {
                        address: address.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    })?
                    .map_err(|e| LinkError::refused(address, e.to_string()))?;

                if let Err(e) = stream.set_nodelay(true) {
                    warn!(error = %e, "failed to set TCP_NODELAY");
                }
                debug!("tcp transport opened");
                Ok(Box::new(stream) as LinkStream)
            }
            LinkAddress::Serial { .. } => open_serial(address),
        }
    }
}

#[cfg(feature = "serial")]
fn open_serial(address: &LinkAddress) -> Result<LinkStream> {
    use tokio_serial::SerialPortBuilderExt;

    let LinkAddress::Serial {
        port,
        baud_rate,
        data_bits,
        parity,
        stop_bits,
    } = address
    else {
        return Err(LinkError::refused(address, "not a serial address"));
    };

    let data_bits = match data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let parity = match parity {
        contracts::Parity::None => tokio_serial::Parity::None,
        contracts::Parity::Odd => tokio_serial::Parity::Odd,
        contracts::Parity::Even => tokio_serial::Parity::Even,
    };
    let stop_bits = match stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };

    let stream = tokio_serial::new(port.as_str(), *baud_rate)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(stop_bits)
        .open_native_async()
        .map_err(|e| LinkError::refused(address, e.to_string()))?;

    debug!("serial transport opened");
    Ok(Box::new(stream) as LinkStream)
}

#[cfg(not(feature = "serial"))]
fn open_serial(address: &LinkAddress) -> Result<LinkStream> {
    Err(LinkError::refused(
        address,
        "serial support not enabled (build with feature `serial`)",
    ))
}
