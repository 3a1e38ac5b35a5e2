//! SortingQueue 核心实现
//!
//! 所有修改在同一把锁下串行：接入、脉冲推进与到位取出互不交错，
//! 因此同一包裹不会被取出两次。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{Admission, BindingTable, Package, PulseEvent};
use slab::Slab;
use tracing::{debug, info, instrument, warn};

use crate::tracker::PackageTracker;

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Trackers currently in flight
    pub in_flight: usize,
    /// Packages tracked since start
    pub admitted: u64,
    /// Packages rewritten to the error chute
    pub rerouted: u64,
    /// Trackers handed to the dispatcher
    pub released: u64,
}

struct QueueState {
    trackers: Slab<PackageTracker>,
    bindings: Arc<BindingTable>,
    next_seq: u64,
    stats: QueueStats,
}

/// Sorting Queue
pub struct SortingQueue {
    state: Mutex<QueueState>,
}

impl SortingQueue {
    pub fn new(bindings: BindingTable) -> Self {
        Self {
            state: Mutex::new(QueueState {
                trackers: Slab::new(),
                bindings: Arc::new(bindings),
                next_seq: 0,
                stats: QueueStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a package
    ///
    /// Unbound chutes are rewritten to the error chute and not tracked.
    /// Otherwise the count is seeded with the pulses that have likely
    /// passed since `package.created_at`: `floor(elapsed / interval)`,
    /// clamped below the pulse distance.
    #[instrument(
        name = "sorting_queue_enqueue",
        skip(self, package, interval, now),
        fields(package = %package.id, chute = package.chute)
    )]
    pub fn enqueue(&self, package: Package, interval: Duration, now: Instant) -> Admission {
        let mut state = self.lock();

        let Some(binding) = state.bindings.resolve(package.chute).cloned() else {
            let error_chute = state.bindings.error_chute();
            state.stats.rerouted += 1;
            metrics::counter!("sorter_packages_admitted_total", "result" => "rerouted")
                .increment(1);
            warn!(
                requested = package.chute,
                error_chute, "chute has no binding, package falls through to error chute"
            );
            return Admission::Rerouted {
                requested: package.chute,
                error_chute,
            };
        };

        let mut seed = seed_count(now.saturating_duration_since(package.created_at), interval);
        if seed >= binding.pulse_distance {
            warn!(
                seed,
                distance = binding.pulse_distance,
                "admitted late, releasing on next pulse"
            );
            seed = binding.pulse_distance.saturating_sub(1);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.trackers.insert(PackageTracker::new(
            package.id,
            binding,
            seed,
            package.created_at,
            seq,
        ));
        state.stats.admitted += 1;
        let depth = state.trackers.len();
        drop(state);

        metrics::counter!("sorter_packages_admitted_total", "result" => "tracked").increment(1);
        metrics::gauge!("sorter_queue_depth").set(depth as f64);
        debug!(seed, depth, "package tracked");
        Admission::Tracked { seeded_count: seed }
    }

    /// Advance every tracker by one pulse and take out the ready ones
    ///
    /// Returned trackers are in admission order and already removed.
    pub fn on_pulse(&self, event: &PulseEvent) -> Vec<PackageTracker> {
        let mut state = self.lock();

        let mut ready_keys = Vec::new();
        for (key, tracker) in state.trackers.iter_mut() {
            tracker.advance(event.timestamp);
            if tracker.is_ready() {
                ready_keys.push(key);
            }
        }

        let mut ready: Vec<PackageTracker> = ready_keys
            .into_iter()
            .map(|key| state.trackers.remove(key))
            .collect();
        ready.sort_by_key(|t| t.seq);

        state.stats.released += ready.len() as u64;
        let depth = state.trackers.len();
        drop(state);

        metrics::gauge!("sorter_queue_depth").set(depth as f64);
        if !ready.is_empty() {
            debug!(released = ready.len(), depth, "trackers reached their chute");
        }
        ready
    }

    /// Swap the binding table for future admissions
    #[instrument(name = "sorting_queue_replace_bindings", skip_all, fields(chutes = bindings.len()))]
    pub fn replace_bindings(&self, bindings: BindingTable) {
        self.lock().bindings = Arc::new(bindings);
        info!("binding table replaced");
    }

    pub fn bindings(&self) -> Arc<BindingTable> {
        Arc::clone(&self.lock().bindings)
    }

    pub fn len(&self) -> usize {
        self.lock().trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the in-flight trackers, in admission order
    pub fn snapshot(&self) -> Vec<PackageTracker> {
        let mut trackers: Vec<PackageTracker> =
            self.lock().trackers.iter().map(|(_, t)| t.clone()).collect();
        trackers.sort_by_key(|t| t.seq);
        trackers
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            in_flight: state.trackers.len(),
            ..state.stats
        }
    }
}

/// Pulses expected to have passed during `elapsed`
fn seed_count(elapsed: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 0;
    }
    let pulses = elapsed.as_nanos() / interval.as_nanos();
    u32::try_from(pulses).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChuteBinding, LinkAddress};
    use rand::Rng;

    const INTERVAL: Duration = Duration::from_millis(500);

    fn binding(chute: u32, pin: u16, distance: u32) -> ChuteBinding {
        ChuteBinding {
            chute,
            module: LinkAddress::tcp("10.0.0.10", 4001),
            pin,
            pulse_distance: distance,
            delay_factor: 0.5,
            magnet_hold: Duration::from_millis(200),
        }
    }

    fn queue() -> SortingQueue {
        SortingQueue::new(BindingTable::new(
            vec![binding(1, 1, 3), binding(2, 2, 5), binding(3, 3, 1)],
            99,
        ))
    }

    fn pulse(at: Instant) -> PulseEvent {
        PulseEvent::real(at)
    }

    #[test]
    fn test_released_exactly_on_distance() {
        let q = queue();
        let t0 = Instant::now();
        let admission = q.enqueue(Package::new("PKG-1", 1, t0), INTERVAL, t0);
        assert_eq!(admission, Admission::Tracked { seeded_count: 0 });

        assert!(q.on_pulse(&pulse(t0 + INTERVAL)).is_empty());
        assert!(q.on_pulse(&pulse(t0 + INTERVAL * 2)).is_empty());
        let ready = q.on_pulse(&pulse(t0 + INTERVAL * 3));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].package, "PKG-1");
        assert_eq!(ready[0].count, 3);
        assert_eq!(ready[0].last_pulse_at, Some(t0 + INTERVAL * 3));

        // removed exactly once
        assert!(q.on_pulse(&pulse(t0 + INTERVAL * 4)).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn test_randomized_distances() {
        let mut rng = rand::rng();
        let t0 = Instant::now();

        for _ in 0..20 {
            let mut table = Vec::new();
            for chute in 1..=10u32 {
                table.push(binding(chute, chute as u16, rng.random_range(1..30)));
            }
            let distances: Vec<u32> = table.iter().map(|b| b.pulse_distance).collect();
            let q = SortingQueue::new(BindingTable::new(table, 99));
            for chute in 1..=10u32 {
                q.enqueue(Package::new(format!("P{chute}"), chute, t0), INTERVAL, t0);
            }

            let mut released_at = vec![0u32; 10];
            for n in 1..=30u32 {
                for tracker in q.on_pulse(&pulse(t0)) {
                    released_at[(tracker.chute() - 1) as usize] = n;
                }
            }
            assert_eq!(released_at, distances);
        }
    }

    #[test]
    fn test_unbound_chute_rerouted_untracked() {
        let q = queue();
        let t0 = Instant::now();
        let admission = q.enqueue(Package::new("PKG-X", 42, t0), INTERVAL, t0);
        assert_eq!(
            admission,
            Admission::Rerouted {
                requested: 42,
                error_chute: 99
            }
        );
        assert!(q.is_empty());
        assert_eq!(q.stats().rerouted, 1);
    }

    #[test]
    fn test_late_admission_is_backfilled() {
        let q = queue();
        let t0 = Instant::now();
        // created 1.2 s ago at 500 ms interval: two pulses already passed
        let admission = q.enqueue(
            Package::new("PKG-2", 2, t0),
            INTERVAL,
            t0 + Duration::from_millis(1_200),
        );
        assert_eq!(admission, Admission::Tracked { seeded_count: 2 });
        assert_eq!(q.snapshot()[0].remaining(), 3);
    }

    #[test]
    fn test_seed_clamped_below_distance() {
        let q = queue();
        let t0 = Instant::now();
        let admission = q.enqueue(
            Package::new("PKG-3", 1, t0),
            INTERVAL,
            t0 + Duration::from_secs(60),
        );
        assert_eq!(admission, Admission::Tracked { seeded_count: 2 });
        assert_eq!(q.on_pulse(&pulse(t0 + Duration::from_secs(61))).len(), 1);
    }

    #[test]
    fn test_zero_distance_released_on_next_pulse() {
        let q = SortingQueue::new(BindingTable::new(vec![binding(5, 5, 0)], 99));
        let t0 = Instant::now();
        let admission = q.enqueue(
            Package::new("PKG-0", 5, t0),
            INTERVAL,
            t0 + Duration::from_secs(2),
        );
        assert_eq!(admission, Admission::Tracked { seeded_count: 0 });
        assert_eq!(q.on_pulse(&pulse(t0)).len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_batch_release_in_admission_order() {
        let q = queue();
        let t0 = Instant::now();
        q.enqueue(Package::new("A", 3, t0), INTERVAL, t0);
        q.enqueue(Package::new("B", 1, t0), INTERVAL, t0);
        q.enqueue(Package::new("C", 3, t0), INTERVAL, t0);

        let ready: Vec<String> = q
            .on_pulse(&pulse(t0))
            .into_iter()
            .map(|t| t.package.to_string())
            .collect();
        assert_eq!(ready, vec!["A", "C"]);

        // slot of A is reused by D; order still follows admission
        q.enqueue(Package::new("D", 3, t0), INTERVAL, t0);
        q.on_pulse(&pulse(t0));
        let ready: Vec<String> = q
            .on_pulse(&pulse(t0))
            .into_iter()
            .map(|t| t.package.to_string())
            .collect();
        assert_eq!(ready, vec!["B"]);
        assert_eq!(q.stats().released, 4);
    }

    #[test]
    fn test_replace_bindings_keeps_in_flight() {
        let q = queue();
        let t0 = Instant::now();
        q.enqueue(Package::new("OLD", 2, t0), INTERVAL, t0);

        q.replace_bindings(BindingTable::new(vec![binding(2, 7, 1)], 99));
        q.enqueue(Package::new("NEW", 2, t0), INTERVAL, t0);

        let ready = q.on_pulse(&pulse(t0));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].package, "NEW");
        assert_eq!(ready[0].binding.pin, 7);

        let old = &q.snapshot()[0];
        assert_eq!(old.package, "OLD");
        assert_eq!(old.binding.pulse_distance, 5);
    }

    #[test]
    fn test_zero_interval_seeds_nothing() {
        assert_eq!(seed_count(Duration::from_secs(5), Duration::ZERO), 0);
        assert_eq!(
            seed_count(Duration::from_millis(999), Duration::from_millis(500)),
            1
        );
    }
}
