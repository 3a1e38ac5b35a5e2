//! SortingEngine - owns the link pool, queue, dispatcher, reporter and
//! trigger pipeline for one sorter line

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use config_loader::ConfigLoader;
use contracts::{
    Admission, BindingTable, ContractError, LinkAddress, LinkEvent, LinkState, Package, PulseEvent,
    SorterBlueprint,
};
use dispatcher::{ActuationSnapshot, ActuatorDispatcher, MetricsSnapshot, Reporter, ShutdownSummary};
use link::{Connector, LinkPool, SystemConnector};
use observability::{PulseStatsAggregator, PulseSummary};
use sorting_queue::{QueueStats, SortingQueue};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use trigger::{SharedInterval, SignalInterpreter, TriggerMetrics, TriggerMetricsSnapshot, TriggerPipeline};

use crate::error::EngineError;

/// Buffered trigger chunks between the link read loop and the interpreter
pub const TRIGGER_CHANNEL_CAPACITY: usize = 256;

/// Current time on the runtime clock
///
/// Package creation times and pulse timestamps must come from the same
/// clock; under a paused test runtime this follows the mocked time.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Point-in-time view of every component
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub uptime: Duration,
    pub interval: Duration,
    pub queue: QueueStats,
    pub trigger: TriggerMetricsSnapshot,
    pub actuation: ActuationSnapshot,
    pub sinks: Vec<(String, MetricsSnapshot)>,
    pub links: HashMap<LinkAddress, LinkState>,
    pub pulses: PulseSummary,
}

/// Running sorter engine
pub struct SortingEngine<C: Connector = SystemConnector> {
    links: Arc<LinkPool<C>>,
    queue: Arc<SortingQueue>,
    dispatcher: Arc<ActuatorDispatcher<C>>,
    reporter: Arc<Reporter>,
    pipeline: Mutex<Option<TriggerPipeline>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    interval: SharedInterval,
    trigger_metrics: Arc<TriggerMetrics>,
    pulse_stats: Arc<Mutex<PulseStatsAggregator>>,
    trigger_address: LinkAddress,
    shutdown_grace: Duration,
    started_at: Instant,
    /// Cleared when shutdown begins
    accepting: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Connector> SortingEngine<C> {
    /// Validate `blueprint`, build every component and open all links
    ///
    /// Links that cannot be reached yet are left to their reconnect
    /// supervisors; only an invalid blueprint or a sink that cannot be
    /// created fails the start.
    #[instrument(
        name = "engine_start",
        skip(blueprint, connector),
        fields(chutes = blueprint.chutes.len(), trigger = %blueprint.trigger.address)
    )]
    pub async fn start(blueprint: &SorterBlueprint, connector: Arc<C>) -> Result<Self, EngineError> {
        ConfigLoader::validate(blueprint)?;

        let reporter = Arc::new(Reporter::build(&blueprint.sinks).await?);
        let links = Arc::new(LinkPool::new(connector, blueprint.links.clone()));

        let trigger_address = blueprint.trigger.address.clone();
        let (chunk_tx, chunk_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        links.add(trigger_address.clone()).set_consumer(chunk_tx);
        for module in blueprint.module_addresses() {
            links.add(module);
        }

        let queue = Arc::new(SortingQueue::new(blueprint.to_binding_table()));
        let dispatcher = Arc::new(ActuatorDispatcher::new(
            Arc::clone(&links),
            Arc::clone(&reporter),
        ));

        let interpreter =
            SignalInterpreter::new(blueprint.trigger.channel, blueprint.default_interval());
        let pulse_stats = Arc::new(Mutex::new(PulseStatsAggregator::new()));
        let pipeline = {
            let queue = Arc::clone(&queue);
            let dispatcher = Arc::clone(&dispatcher);
            let pulse_stats = Arc::clone(&pulse_stats);
            let handler = move |event: PulseEvent, interval: Duration| {
                let ready = queue.on_pulse(&event);
                observability::record_pulse(&event, interval);
                observability::record_released(ready.len());
                lock(&pulse_stats).update(&event, ready.len());
                for tracker in ready {
                    dispatcher.dispatch(tracker, interval, &event);
                }
            };
            TriggerPipeline::spawn_with_link_events(
                interpreter,
                chunk_rx,
                links.subscribe(),
                trigger_address.clone(),
                handler,
            )
        };
        let interval = pipeline.interval_handle();
        let trigger_metrics = pipeline.metrics();

        let monitor = tokio::spawn(watch_links(links.subscribe()));

        let connected = links.open_all().await;
        info!(connected, total = links.len(), "sorting engine started");

        Ok(Self {
            links,
            queue,
            dispatcher,
            reporter,
            pipeline: Mutex::new(Some(pipeline)),
            monitor: Mutex::new(Some(monitor)),
            interval,
            trigger_metrics,
            pulse_stats,
            trigger_address,
            shutdown_grace: blueprint.dispatch.shutdown_grace(),
            started_at: now(),
            accepting: AtomicBool::new(true),
        })
    }

    /// Admit a package; actuation happens later, on the pulse that brings
    /// it to its chute
    ///
    /// Refused once shutdown has begun.
    pub fn enqueue(&self, package: Package) -> Admission {
        if !self.accepting.load(Ordering::Acquire) {
            warn!(package = %package.id, chute = package.chute, "engine shut down, package refused");
            return Admission::Refused;
        }
        self.queue.enqueue(package, self.interval.get(), now())
    }

    /// Current inter-package interval estimate
    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    pub fn link_states(&self) -> HashMap<LinkAddress, LinkState> {
        self.links.states()
    }

    pub fn subscribe_link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.links.subscribe()
    }

    pub fn trigger_address(&self) -> &LinkAddress {
        &self.trigger_address
    }

    /// Swap the routing table and reconcile module links
    ///
    /// Packages already in flight keep the binding they were admitted with.
    /// An invalid table is rejected and the current one stays in place.
    #[instrument(name = "engine_apply_bindings", skip_all, fields(chutes = table.len()))]
    pub async fn apply_bindings(&self, table: BindingTable) -> Result<(), EngineError> {
        ConfigLoader::validate_bindings(&table)?;
        let mut addresses: HashSet<LinkAddress> = table.module_addresses();
        if addresses.contains(&self.trigger_address) {
            return Err(ContractError::config_validation(
                "bindings",
                "trigger sensor cannot share a link with an actuator module",
            )
            .into());
        }
        addresses.insert(self.trigger_address.clone());
        self.queue.replace_bindings(table);
        self.links.reconcile(&addresses).await;
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            uptime: now().saturating_duration_since(self.started_at),
            interval: self.interval(),
            queue: self.queue.stats(),
            trigger: self.trigger_metrics.snapshot(),
            actuation: self.dispatcher.metrics().snapshot(),
            sinks: self.reporter.metrics(),
            links: self.links.states(),
            pulses: lock(&self.pulse_stats).summary(),
        }
    }

    /// Stop the trigger task, give in-flight actuations the configured
    /// grace period, dispose every link and flush every sink
    ///
    /// Safe to call more than once.
    #[instrument(name = "engine_shutdown", skip(self))]
    pub async fn shutdown(&self) -> ShutdownSummary {
        self.accepting.store(false, Ordering::Release);
        let pipeline = lock(&self.pipeline).take();
        if let Some(pipeline) = pipeline {
            pipeline.stop().await;
        }

        let summary = self.dispatcher.shutdown(self.shutdown_grace).await;
        self.links.shutdown().await;
        self.reporter.shutdown().await;

        let monitor = lock(&self.monitor).take();
        if let Some(monitor) = monitor {
            monitor.abort();
        }

        info!(
            completed = summary.completed,
            abandoned = summary.abandoned,
            in_flight = self.queue.len(),
            "sorting engine stopped"
        );
        summary
    }
}

/// Log link transitions and keep the per-device connected gauge current
async fn watch_links(mut events: broadcast::Receiver<LinkEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                observability::record_link_transition(&event);
                if event.to == LinkState::Disconnected {
                    warn!(address = %event.address, from = %event.from, "link down");
                } else {
                    info!(address = %event.address, from = %event.from, to = %event.to, "link state changed");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "link event monitor lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::ConfigFormat;
    use link::{MockConnector, MockPeers};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::sleep;

    const BLUEPRINT: &str = r#"
error_chute = 99

[trigger]
address = { kind = "tcp", host = "10.0.0.2", port = 4001 }

[timing]
default_interval_ms = 500

[[chutes]]
chute = 1
module = { kind = "tcp", host = "10.0.0.10", port = 4001 }
pin = 1
pulse_distance = 3
delay_factor = 0.5
magnet_hold_ms = 200

[[chutes]]
chute = 2
module = { kind = "tcp", host = "10.0.0.10", port = 4001 }
pin = 2
pulse_distance = 1
delay_factor = 0.0
magnet_hold_ms = 100
"#;

    fn trigger() -> LinkAddress {
        LinkAddress::tcp("10.0.0.2", 4001)
    }

    fn module() -> LinkAddress {
        LinkAddress::tcp("10.0.0.10", 4001)
    }

    async fn start() -> (SortingEngine<MockConnector>, MockPeers) {
        let blueprint = ConfigLoader::load_from_str(BLUEPRINT, ConfigFormat::Toml).unwrap();
        let (connector, peers) = MockConnector::new();
        let engine = SortingEngine::start(&blueprint, Arc::new(connector))
            .await
            .unwrap();
        (engine, peers)
    }

    async fn read_command(stream: &mut tokio::io::DuplexStream) -> String {
        let mut buf = [0u8; 13];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_package_actuated_on_third_pulse() {
        let (engine, mut peers) = start().await;
        let mut sensor = peers.accept_for(&trigger()).await.unwrap();
        let mut module_peer = peers.accept_for(&module()).await.unwrap();

        let admission = engine.enqueue(Package::new("PKG-1", 1, now()));
        assert_eq!(admission, Admission::Tracked { seeded_count: 0 });

        let mut third = None;
        for _ in 0..3 {
            sleep(Duration::from_millis(500)).await;
            sensor.stream.write_all(b"+OCCH1:1\r\n").await.unwrap();
            third = Some(tokio::time::Instant::now());
        }

        assert_eq!(read_command(&mut module_peer.stream).await, "AT+STACH1=1\r\n");
        let delay = third.unwrap().elapsed();
        assert!(delay >= Duration::from_millis(250), "engaged after {delay:?}");
        assert!(delay < Duration::from_millis(300), "engaged after {delay:?}");
        assert_eq!(read_command(&mut module_peer.stream).await, "AT+STACH1=0\r\n");

        let summary = engine.shutdown().await;
        assert_eq!(summary.abandoned, 0);

        let stats = engine.stats();
        assert_eq!(stats.trigger.real_events, 3);
        assert_eq!(stats.actuation.succeeded, 1);
        assert_eq!(stats.queue.released, 1);
        assert_eq!(stats.interval, Duration::from_millis(500));
        assert_eq!(stats.pulses.total_pulses, 3);
        assert_eq!(stats.pulses.released, 1);
        assert_eq!(stats.pulses.interval_ms.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbound_chute_is_rerouted() {
        let (engine, _peers) = start().await;
        let admission = engine.enqueue(Package::new("PKG-X", 7, now()));
        assert_eq!(
            admission,
            Admission::Rerouted {
                requested: 7,
                error_chute: 99
            }
        );
        assert_eq!(engine.stats().queue.in_flight, 0);
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_bindings_reconciles_module_links() {
        let (engine, _peers) = start().await;
        let moved = LinkAddress::tcp("10.0.0.11", 4001);

        let table = BindingTable::new(
            vec![contracts::ChuteBinding {
                chute: 1,
                module: moved.clone(),
                pin: 4,
                pulse_distance: 2,
                delay_factor: 0.5,
                magnet_hold: Duration::from_millis(200),
            }],
            99,
        );
        engine.apply_bindings(table).await.unwrap();

        let states = engine.link_states();
        assert_eq!(states.len(), 2);
        assert!(states.contains_key(&trigger()));
        assert!(states[&moved].is_connected());
        assert!(!states.contains_key(&module()));

        assert_eq!(
            engine.enqueue(Package::new("PKG-2", 2, now())),
            Admission::Rerouted {
                requested: 2,
                error_chute: 99
            }
        );
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disposes_links_and_is_idempotent() {
        let (engine, _peers) = start().await;
        let mut events = engine.subscribe_link_events();
        assert_eq!(engine.link_states().len(), 2);

        engine.shutdown().await;
        assert!(engine.link_states().is_empty());
        let event = events.recv().await.unwrap();
        assert_eq!(event.to, LinkState::Disconnected);

        let again = engine.shutdown().await;
        assert_eq!(again, ShutdownSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_refused_after_shutdown() {
        let (engine, _peers) = start().await;
        engine.shutdown().await;

        assert_eq!(
            engine.enqueue(Package::new("PKG-LATE", 1, now())),
            Admission::Refused
        );
        let stats = engine.stats();
        assert_eq!(stats.queue.in_flight, 0);
        assert_eq!(stats.queue.admitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_binding_table_keeps_current() {
        let (engine, _peers) = start().await;
        let broken = BindingTable::new(
            vec![contracts::ChuteBinding {
                chute: 1,
                module: LinkAddress::tcp("10.0.0.11", 4001),
                pin: 4,
                pulse_distance: 0,
                delay_factor: 0.5,
                magnet_hold: Duration::from_millis(200),
            }],
            99,
        );
        let err = engine.apply_bindings(broken).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let on_trigger = BindingTable::new(
            vec![contracts::ChuteBinding {
                chute: 1,
                module: trigger(),
                pin: 4,
                pulse_distance: 2,
                delay_factor: 0.5,
                magnet_hold: Duration::from_millis(200),
            }],
            99,
        );
        assert!(engine.apply_bindings(on_trigger).await.is_err());

        // old table and links untouched
        assert!(engine.link_states().contains_key(&module()));
        assert_eq!(
            engine.enqueue(Package::new("PKG-3", 2, now())),
            Admission::Tracked { seeded_count: 0 }
        );
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_blueprint_rejected() {
        let mut blueprint = ConfigLoader::load_from_str(BLUEPRINT, ConfigFormat::Toml).unwrap();
        blueprint.error_chute = 1;
        let (connector, _peers) = MockConnector::new();
        let err = SortingEngine::start(&blueprint, Arc::new(connector))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
