//! LinkPool - links keyed by hardware address
//!
//! Chutes sharing one module share one link. All links publish their state
//! transitions on the pool's broadcast channel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use contracts::{LinkAddress, LinkConfig, LinkEvent, LinkState};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::connector::{Connector, SystemConnector};
use crate::duplex::DuplexLink;
use crate::error::{LinkError, Result};

/// Pool of duplex links
pub struct LinkPool<C: Connector = SystemConnector> {
    connector: Arc<C>,
    config: LinkConfig,
    links: RwLock<HashMap<LinkAddress, DuplexLink<C>>>,
    events: broadcast::Sender<LinkEvent>,
}

impl<C: Connector> LinkPool<C> {
    pub fn new(connector: Arc<C>, config: LinkConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            connector,
            config,
            links: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register a link for `address`, returning the existing one if present
    ///
    /// The link starts disconnected; call `open` on it (or `open_all`).
    pub fn add(&self, address: LinkAddress) -> DuplexLink<C> {
        let mut links = self.links.write().unwrap_or_else(PoisonError::into_inner);
        links
            .entry(address)
            .or_insert_with_key(|address| {
                DuplexLink::with_events(
                    address.clone(),
                    self.config.clone(),
                    Arc::clone(&self.connector),
                    self.events.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, address: &LinkAddress) -> Option<DuplexLink<C>> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    /// Remove and dispose the link for `address`
    #[instrument(name = "link_pool_remove", skip(self), fields(address = %address))]
    pub async fn remove(&self, address: &LinkAddress) -> bool {
        let removed = self
            .links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
        match removed {
            Some(link) => {
                link.dispose().await;
                true
            }
            None => false,
        }
    }

    /// Make the pool hold exactly `addresses`
    ///
    /// New addresses get a link that is opened immediately (falling back to
    /// its reconnect supervisor); links no longer referenced are disposed.
    #[instrument(name = "link_pool_reconcile", skip_all, fields(wanted = addresses.len()))]
    pub async fn reconcile(&self, addresses: &HashSet<LinkAddress>) {
        let stale: Vec<LinkAddress> = self
            .addresses()
            .into_iter()
            .filter(|address| !addresses.contains(address))
            .collect();
        for address in &stale {
            self.remove(address).await;
        }

        let mut added = 0usize;
        for address in addresses {
            if self.get(address).is_some() {
                continue;
            }
            let link = self.add(address.clone());
            added += 1;
            if let Err(e) = link.open().await {
                warn!(address = %address, error = %e, "new link not yet reachable");
            }
        }
        info!(added, removed = stale.len(), "link pool reconciled");
    }

    /// Send on the link for `address`
    ///
    /// # Errors
    /// `UnknownLink` if the address is not pooled, otherwise the link's send error.
    pub async fn send(&self, address: &LinkAddress, bytes: &[u8]) -> Result<()> {
        let link = self.get(address).ok_or_else(|| LinkError::UnknownLink {
            address: address.clone(),
        })?;
        link.send(bytes).await
    }

    /// Subscribe to state transitions of every pooled link
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Current state of every pooled link
    pub fn states(&self) -> HashMap<LinkAddress, LinkState> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(address, link)| (address.clone(), link.state()))
            .collect()
    }

    pub fn addresses(&self) -> Vec<LinkAddress> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open every pooled link; failures fall back to each link's supervisor
    ///
    /// Returns the number of links connected on the first attempt.
    #[instrument(name = "link_pool_open_all", skip(self))]
    pub async fn open_all(&self) -> usize {
        let links: Vec<DuplexLink<C>> = self
            .links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut connected = 0;
        for link in links {
            match link.open().await {
                Ok(()) => connected += 1,
                Err(e) => warn!(address = %link.address(), error = %e, "link not reachable at startup"),
            }
        }
        connected
    }

    /// Dispose every link: stops every read loop and supervisor
    #[instrument(name = "link_pool_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let links: Vec<DuplexLink<C>> = self
            .links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, link)| link)
            .collect();
        let count = links.len();
        for link in links {
            link.dispose().await;
        }
        info!(count, "link pool shut down");
    }
}
