//! DuplexLink - one resilient connection to one device
//!
//! Lifecycle:
//! - `connect` / `open` establish a fresh transport (at most one at a time)
//! - a read loop forwards inbound chunks to the registered consumer
//! - unexpected loss starts the reconnect supervisor
//! - `disconnect` is a manual stop; `dispose` retires the link for good

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use contracts::{LinkAddress, LinkConfig, LinkEvent, LinkState};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::backoff::ReconnectPolicy;
use crate::connector::{Connector, LinkStream, SystemConnector};
use crate::error::{LinkError, Result};

/// Handle to one duplex link
///
/// Cheap to clone; all clones drive the same connection.
pub struct DuplexLink<C: Connector = SystemConnector> {
    inner: Arc<LinkInner<C>>,
}

impl<C: Connector> Clone for DuplexLink<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct LinkInner<C> {
    address: LinkAddress,
    config: LinkConfig,
    policy: ReconnectPolicy,
    connector: Arc<C>,
    state: Mutex<LinkState>,
    events: broadcast::Sender<LinkEvent>,
    /// Write half tagged with the generation of the transport it belongs to
    writer: tokio::sync::Mutex<Option<(u64, WriteHalf<LinkStream>)>>,
    /// Serializes transport establishment and teardown
    connect_lock: tokio::sync::Mutex<()>,
    /// Bumped whenever the current transport is replaced or torn down
    generation: AtomicU64,
    tasks: Mutex<LinkTasks>,
    consumer: Mutex<Option<mpsc::Sender<Bytes>>>,
    /// Set by `disconnect`; suppresses the supervisor
    manual_stop: AtomicBool,
    disposed: AtomicBool,
}

#[derive(Default)]
struct LinkTasks {
    reader: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
    supervising: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Connector> DuplexLink<C> {
    /// Create a disconnected link with its own event channel
    pub fn new(address: LinkAddress, config: LinkConfig, connector: Arc<C>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self::with_events(address, config, connector, events)
    }

    /// Create a disconnected link that publishes transitions on a shared channel
    pub fn with_events(
        address: LinkAddress,
        config: LinkConfig,
        connector: Arc<C>,
        events: broadcast::Sender<LinkEvent>,
    ) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            inner: Arc::new(LinkInner {
                address,
                config,
                policy,
                connector,
                state: Mutex::new(LinkState::Disconnected),
                events,
                writer: tokio::sync::Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                tasks: Mutex::new(LinkTasks::default()),
                consumer: Mutex::new(None),
                manual_stop: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn address(&self) -> &LinkAddress {
        &self.inner.address
    }

    pub fn state(&self) -> LinkState {
        *lock(&self.inner.state)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Subscribe to state transitions of this link
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    /// Register the consumer of inbound chunks
    ///
    /// Chunks read while no consumer is registered are discarded.
    pub fn set_consumer(&self, consumer: mpsc::Sender<Bytes>) {
        *lock(&self.inner.consumer) = Some(consumer);
    }

    /// Establish the transport
    ///
    /// No-op if already connected.
    ///
    /// # Errors
    /// `ConnectTimeout` / `ConnectRefused` on failure (state returns to
    /// `Disconnected`), `Disposed` after `dispose`.
    #[instrument(name = "link_connect", skip(self), fields(address = %self.inner.address))]
    pub async fn connect(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        self.inner.manual_stop.store(false, Ordering::Release);
        self.establish(false).await
    }

    /// Connect, falling back to the reconnect supervisor on failure
    ///
    /// Returns the initial attempt's result; on error the link keeps
    /// retrying in the background.
    #[instrument(name = "link_open", skip(self), fields(address = %self.inner.address))]
    pub async fn open(&self) -> Result<()> {
        let result = self.connect().await;
        if let Err(e) = &result {
            if !self.is_disposed() {
                warn!(error = %e, "initial connect failed, starting reconnect supervisor");
                self.start_supervisor();
            }
        }
        result
    }

    /// Write `bytes` as one unit
    ///
    /// Concurrent senders are serialized; bytes of two sends never interleave.
    ///
    /// # Errors
    /// `NotConnected` immediately if no transport is open; `WriteFailed` if
    /// the transport broke (it is then torn down).
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_not_disposed()?;

        let mut guard = self.inner.writer.lock().await;
        let Some((generation, writer)) = guard.as_mut() else {
            return Err(LinkError::NotConnected {
                address: self.inner.address.clone(),
            });
        };
        let generation = *generation;

        let written = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                trace!(address = %self.inner.address, len = bytes.len(), "sent");
                Ok(())
            }
            Err(e) => {
                drop(guard);
                warn!(address = %self.inner.address, error = %e, "write failed, dropping transport");
                self.on_transport_lost(generation).await;
                Err(LinkError::WriteFailed {
                    address: self.inner.address.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Close the transport without reconnecting
    ///
    /// Idempotent.
    #[instrument(name = "link_disconnect", skip(self), fields(address = %self.inner.address))]
    pub async fn disconnect(&self) {
        self.inner.manual_stop.store(true, Ordering::Release);
        self.stop_supervisor();

        let _guard = self.inner.connect_lock.lock().await;
        self.teardown().await;
    }

    /// Disconnect and retire the link permanently
    #[instrument(name = "link_dispose", skip(self), fields(address = %self.inner.address))]
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.disconnect().await;
        lock(&self.inner.consumer).take();
        debug!("link disposed");
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(LinkError::Disposed {
                address: self.inner.address.clone(),
            });
        }
        Ok(())
    }

    /// Suppressed by manual stop or disposal
    fn is_retired(&self) -> bool {
        self.inner.manual_stop.load(Ordering::Acquire) || self.is_disposed()
    }

    fn set_state(&self, to: LinkState) {
        let mut state = lock(&self.inner.state);
        let from = *state;
        if from == to {
            return;
        }
        *state = to;
        debug!(address = %self.inner.address, %from, %to, "link state changed");
        // no subscribers is fine
        let _ = self.inner.events.send(LinkEvent {
            address: self.inner.address.clone(),
            from,
            to,
        });
    }

    /// Open a fresh transport under the connect lock
    async fn establish(&self, from_supervisor: bool) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;
        self.ensure_not_disposed()?;
        if self.state().is_connected() {
            return Ok(());
        }
        if !from_supervisor {
            self.set_state(LinkState::Connecting);
        }

        let connected = self
            .inner
            .connector
            .connect(&self.inner.address, self.inner.config.connect_timeout())
            .await;

        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                if !from_supervisor {
                    self.set_state(LinkState::Disconnected);
                }
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (reader, writer) = tokio::io::split(stream);
        *self.inner.writer.lock().await = Some((generation, writer));

        let link = self.clone();
        let handle = tokio::spawn(async move { link.read_loop(generation, reader).await });
        if let Some(previous) = lock(&self.inner.tasks).reader.replace(handle) {
            previous.abort();
        }

        self.set_state(LinkState::Connected);
        info!(address = %self.inner.address, generation, "link connected");
        Ok(())
    }

    /// Drop the current transport; caller holds the connect lock
    async fn teardown(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if let Some((_, mut writer)) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(reader) = lock(&self.inner.tasks).reader.take() {
            reader.abort();
        }
        self.set_state(LinkState::Disconnected);
    }

    async fn read_loop(self, generation: u64, mut reader: ReadHalf<LinkStream>) {
        let mut buf = vec![0u8; self.inner.config.read_buffer_size.max(1)];
        let poll = self.inner.config.read_poll();

        loop {
            if self.inner.generation.load(Ordering::Acquire) != generation {
                // transport replaced or torn down elsewhere
                return;
            }
            match tokio::time::timeout(poll, reader.read(&mut buf)).await {
                // no data yet
                Err(_) => continue,
                Ok(Ok(0)) => {
                    debug!(address = %self.inner.address, "peer closed transport");
                    break;
                }
                Ok(Ok(n)) => self.forward(Bytes::copy_from_slice(&buf[..n])).await,
                Ok(Err(e)) => {
                    warn!(address = %self.inner.address, error = %e, "read failed");
                    break;
                }
            }
        }

        self.on_transport_lost(generation).await;
    }

    async fn forward(&self, chunk: Bytes) {
        let consumer = lock(&self.inner.consumer).clone();
        match consumer {
            Some(tx) => {
                if tx.send(chunk).await.is_err() {
                    debug!(address = %self.inner.address, "consumer gone, discarding inbound data");
                    lock(&self.inner.consumer).take();
                }
            }
            None => trace!(address = %self.inner.address, len = chunk.len(), "inbound data discarded"),
        }
    }

    /// React to an unexpected loss of the transport tagged `generation`
    ///
    /// Stale generations are ignored, so concurrent detection by the read
    /// loop and a failing writer produce one transition.
    async fn on_transport_lost(&self, generation: u64) {
        {
            let _guard = self.inner.connect_lock.lock().await;
            if self.inner.generation.load(Ordering::Acquire) != generation {
                return;
            }
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            self.inner.writer.lock().await.take();
            self.set_state(LinkState::Disconnected);
        }
        metrics::counter!("sorter_link_lost_total", "address" => self.inner.address.to_string())
            .increment(1);

        if !self.is_retired() {
            warn!(address = %self.inner.address, "transport lost, starting reconnect supervisor");
            self.start_supervisor();
        }
    }

    /// Start the supervisor unless one is already running
    fn start_supervisor(&self) {
        let mut tasks = lock(&self.inner.tasks);
        if tasks.supervising {
            return;
        }
        tasks.supervising = true;
        let link = self.clone();
        tasks.supervisor = Some(tokio::spawn(async move { link.supervise().await }));
    }

    fn stop_supervisor(&self) {
        let mut tasks = lock(&self.inner.tasks);
        tasks.supervising = false;
        if let Some(handle) = tasks.supervisor.take() {
            handle.abort();
        }
    }

    async fn supervise(self) {
        loop {
            let connected = self.reconnect().await;

            let mut tasks = lock(&self.inner.tasks);
            // the fresh transport may already have been lost before we got here;
            // its loss handler saw `supervising` and left recovery to us
            let lost_again = connected
                && self.state() == LinkState::Disconnected
                && !self.is_retired();
            if !lost_again {
                tasks.supervising = false;
                tasks.supervisor = None;
                return;
            }
        }
    }

    /// Bounded backoff loop; true once connected
    async fn reconnect(&self) -> bool {
        self.set_state(LinkState::Reconnecting);

        for attempt in 0..self.inner.policy.max_attempts {
            let delay = self.inner.policy.delay(attempt);
            debug!(address = %self.inner.address, attempt, ?delay, "reconnect scheduled");
            tokio::time::sleep(delay).await;

            if self.is_retired() {
                return false;
            }
            metrics::counter!(
                "sorter_link_reconnect_attempts_total",
                "address" => self.inner.address.to_string()
            )
            .increment(1);

            match self.establish(true).await {
                Ok(()) => {
                    info!(address = %self.inner.address, attempt, "reconnected");
                    return true;
                }
                Err(e) => {
                    warn!(address = %self.inner.address, attempt, error = %e, "reconnect attempt failed");
                }
            }
        }

        warn!(
            address = %self.inner.address,
            attempts = self.inner.policy.max_attempts,
            "giving up reconnecting"
        );
        self.set_state(LinkState::Disconnected);
        false
    }
}
