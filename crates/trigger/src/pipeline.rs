//! Trigger pipeline task
//!
//! Consumes the trigger link's inbound chunks strictly in arrival order,
//! frames and interprets them, and hands each pulse event to a handler on
//! the same task. When the trigger link drops, the partial line and the
//! pending LOW are discarded so nothing pairs across the outage.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{LinkAddress, LinkEvent, LinkState, PulseEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::framer::LineFramer;
use crate::interpreter::{SharedInterval, SignalInterpreter};
use crate::metrics::TriggerMetrics;

/// Receives pulse events synchronously, in order
///
/// Runs on the interpreter's task: implementations must not block.
pub trait PulseHandler: Send + 'static {
    /// `interval` is the estimate after `event` was accounted for
    fn on_pulse(&mut self, event: PulseEvent, interval: Duration);
}

impl<F> PulseHandler for F
where
    F: FnMut(PulseEvent, Duration) + Send + 'static,
{
    fn on_pulse(&mut self, event: PulseEvent, interval: Duration) {
        self(event, interval)
    }
}

/// Running trigger pipeline
pub struct TriggerPipeline {
    task: JoinHandle<()>,
    interval: SharedInterval,
    metrics: Arc<TriggerMetrics>,
}

impl TriggerPipeline {
    /// Spawn the pipeline task
    ///
    /// The task ends when every sender of `chunks` is dropped, or on `stop`.
    pub fn spawn<H: PulseHandler>(
        interpreter: SignalInterpreter,
        chunks: mpsc::Receiver<Bytes>,
        handler: H,
    ) -> Self {
        Self::start(interpreter, chunks, None, handler)
    }

    /// Spawn the pipeline task, resetting whenever `address` leaves `Connected`
    ///
    /// `events` must be subscribed before the link is opened.
    pub fn spawn_with_link_events<H: PulseHandler>(
        interpreter: SignalInterpreter,
        chunks: mpsc::Receiver<Bytes>,
        events: broadcast::Receiver<LinkEvent>,
        address: LinkAddress,
        handler: H,
    ) -> Self {
        Self::start(interpreter, chunks, Some(LinkWatch { events, address }), handler)
    }

    fn start<H: PulseHandler>(
        interpreter: SignalInterpreter,
        chunks: mpsc::Receiver<Bytes>,
        watch: Option<LinkWatch>,
        handler: H,
    ) -> Self {
        let interval = interpreter.interval_handle();
        let metrics = interpreter.metrics();
        let task = tokio::spawn(run(interpreter, LineFramer::default(), chunks, watch, handler));
        Self {
            task,
            interval,
            metrics,
        }
    }

    /// Current interval estimate
    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    pub fn interval_handle(&self) -> SharedInterval {
        self.interval.clone()
    }

    pub fn metrics(&self) -> Arc<TriggerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pipeline task
    pub async fn stop(self) {
        self.task.abort();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "trigger pipeline task failed");
            }
        }
    }
}

struct LinkWatch {
    events: broadcast::Receiver<LinkEvent>,
    address: LinkAddress,
}

enum Input {
    Chunk(Option<Bytes>),
    Link(Result<LinkEvent, broadcast::error::RecvError>),
}

#[instrument(name = "trigger_pipeline", skip_all)]
async fn run<H: PulseHandler>(
    mut interpreter: SignalInterpreter,
    mut framer: LineFramer,
    mut chunks: mpsc::Receiver<Bytes>,
    mut watch: Option<LinkWatch>,
    mut handler: H,
) {
    info!("trigger pipeline started");
    loop {
        // chunks first: data read before a loss is queued ahead of its event
        let input = match watch.as_mut() {
            Some(watch) => tokio::select! {
                biased;
                chunk = chunks.recv() => Input::Chunk(chunk),
                event = watch.events.recv() => Input::Link(event),
            },
            None => Input::Chunk(chunks.recv().await),
        };

        match input {
            Input::Chunk(Some(chunk)) => {
                let arrival = tokio::time::Instant::now().into_std();
                process_chunk(&mut interpreter, &mut framer, &chunk, arrival, &mut handler);
            }
            Input::Chunk(None) => break,
            Input::Link(Ok(event)) => {
                let lost = event.from == LinkState::Connected;
                let ours = watch.as_ref().is_some_and(|w| w.address == event.address);
                if lost && ours {
                    info!(address = %event.address, to = %event.to, "trigger link lost, interpreter reset");
                    framer.clear();
                    interpreter.reset();
                }
            }
            Input::Link(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(skipped, "link events lagged, interpreter reset");
                framer.clear();
                interpreter.reset();
            }
            Input::Link(Err(broadcast::error::RecvError::Closed)) => watch = None,
        }
    }
    info!("trigger pipeline stopped: input closed");
}

fn process_chunk<H: PulseHandler>(
    interpreter: &mut SignalInterpreter,
    framer: &mut LineFramer,
    chunk: &[u8],
    arrival: std::time::Instant,
    handler: &mut H,
) {
    for frame in framer.feed(chunk) {
        match frame {
            Ok(line) => {
                if let Some(event) = interpreter.process(&line, arrival) {
                    debug!(kind = ?event.kind, "pulse event");
                    handler.on_pulse(event, interpreter.interval());
                }
            }
            Err(e) => {
                warn!(error = %e, "trigger frame dropped");
                interpreter.on_malformed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PulseKind;

    #[tokio::test(start_paused = true)]
    async fn test_events_delivered_in_order() {
        let (tx, rx) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let pipeline = TriggerPipeline::spawn(
            SignalInterpreter::new(1, Duration::from_millis(500)),
            rx,
            move |event: PulseEvent, interval: Duration| {
                let _ = events_tx.send((event.kind, interval));
            },
        );

        tx.send(Bytes::from_static(b"+OCCH1:1\r\n+OCC")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(Bytes::from_static(b"H1:0\r\n")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(Bytes::from_static(b"+OCCH1:1\r\n")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(Bytes::from_static(b"+OCCH1:0\r\n")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;
        // lost HIGH
        tx.send(Bytes::from_static(b"+OCCH1:0\r\n")).await.unwrap();
        drop(tx);

        let (kind, interval) = events_rx.recv().await.unwrap();
        assert_eq!(kind, PulseKind::Real);
        assert_eq!(interval, Duration::from_millis(500));

        let (kind, interval) = events_rx.recv().await.unwrap();
        assert_eq!(kind, PulseKind::Real);
        assert_eq!(interval, Duration::from_millis(400));

        let (kind, interval) = events_rx.recv().await.unwrap();
        assert_eq!(kind, PulseKind::Compensated);
        // midpoint of LOWs at 500 and 950 is 725; 725 - 400 = 325
        assert_eq!(interval, Duration::from_millis(325));

        assert!(events_rx.recv().await.is_none());
        assert!(pipeline.is_finished());
        assert_eq!(pipeline.metrics().snapshot().total_events(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_resets_interpreter() {
        let sensor = LinkAddress::tcp("10.0.0.2", 4001);
        let (tx, rx) = mpsc::channel(16);
        let (link_tx, link_rx) = broadcast::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let pipeline = TriggerPipeline::spawn_with_link_events(
            SignalInterpreter::new(1, Duration::from_millis(500)),
            rx,
            link_rx,
            sensor.clone(),
            move |event: PulseEvent, _: Duration| {
                let _ = events_tx.send(event);
            },
        );

        tx.send(Bytes::from_static(b"+OCCH1:1\r\n+OCCH1:0\r\n+OCC")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(events_rx.recv().await.unwrap().kind, PulseKind::Real);

        // another link going down changes nothing
        link_tx
            .send(LinkEvent {
                address: LinkAddress::tcp("10.0.0.10", 4001),
                from: LinkState::Connected,
                to: LinkState::Disconnected,
            })
            .unwrap();
        link_tx
            .send(LinkEvent {
                address: sensor.clone(),
                from: LinkState::Connected,
                to: LinkState::Disconnected,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // LOW after the outage must not pair with the LOW before it,
        // and the partial "+OCC" must not prefix the next line
        tx.send(Bytes::from_static(b"+OCCH1:0\r\n")).await.unwrap();
        tx.send(Bytes::from_static(b"+OCCH1:1\r\n")).await.unwrap();
        drop(tx);

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.kind, PulseKind::Real);
        assert!(event.interval_sample.is_none());
        assert!(events_rx.recv().await.is_none());

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.compensated_events, 0);
        assert_eq!(snapshot.malformed_frames, 0);
    }

    #[tokio::test]
    async fn test_overlong_line_counts_as_malformed() {
        let (tx, rx) = mpsc::channel(4);
        let pipeline = TriggerPipeline::spawn(
            SignalInterpreter::new(1, Duration::from_millis(500)),
            rx,
            |_: PulseEvent, _: Duration| {},
        );
        tx.send(Bytes::from(vec![b'x'; 1000])).await.unwrap();
        drop(tx);
        while !pipeline.is_finished() {
            tokio::task::yield_now().await;
        }
        assert_eq!(pipeline.metrics().snapshot().malformed_frames, 1);
    }
}
