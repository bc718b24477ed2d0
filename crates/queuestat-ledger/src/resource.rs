//! Queue-length bookkeeping for a single resource.
//!
//! [`ResourceLedger`] wraps the engine's resource and records the observed
//! queue length whenever an entity requests the resource or starts service on
//! it. The sparse event log is turned into a dense per-tick series by
//! [`ResourceLedger::queue_size_over_time`].

use queuestat_common::{Clock, Priority, RequestHandle, Resource, SimTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

/// The checkpoint at which a queue length was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    /// Observed right after an entity requested the resource.
    Request,
    /// Observed when an entity began service.
    Start,
}

/// A single queue-length observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueEvent {
    /// When the observation was made.
    pub time: SimTime,
    /// Number of waiting requests at that moment.
    pub queue_len: usize,
    /// Which checkpoint produced the observation.
    pub kind: QueueEventKind,
}

/// A resource together with its queue-length event log.
///
/// The ledger's name is the key entities use for their visit records, so only
/// one ledger per name should exist in a simulation.
#[derive(Debug)]
pub struct ResourceLedger<R> {
    name: String,
    resource: R,
    queue_events: Vec<QueueEvent>,
}

impl<R: Resource> ResourceLedger<R> {
    /// Wrap a resource under the given name.
    pub fn new(name: impl Into<String>, resource: R) -> Self {
        Self {
            name: name.into(),
            resource,
            queue_events: Vec::new(),
        }
    }

    /// Stable identifier of this resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped resource.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Mutable access to the wrapped resource.
    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// Request the underlying resource and record the queue length it leaves behind.
    pub fn request(&mut self, clock: &impl Clock, priority: Priority) -> RequestHandle {
        let handle = self.resource.request(priority);
        self.record_request(clock);
        handle
    }

    /// Release a request on the underlying resource.
    pub fn release(&mut self, handle: RequestHandle) -> Option<RequestHandle> {
        self.resource.release(handle)
    }

    /// Record the current queue length as a `request` observation.
    pub fn record_request(&mut self, clock: &impl Clock) {
        self.record(clock.now(), QueueEventKind::Request);
    }

    /// Record the current queue length as a `start` observation.
    pub fn record_service_start(&mut self, clock: &impl Clock) {
        self.record(clock.now(), QueueEventKind::Start);
    }

    fn record(&mut self, time: SimTime, kind: QueueEventKind) {
        let queue_len = self.resource.queue_len();
        trace!("Resource[{}]: {:?} observed queue length {} at {}", self.name, kind, queue_len, time);
        self.queue_events.push(QueueEvent {
            time,
            queue_len,
            kind,
        });
    }

    /// All observations in recording order.
    pub fn queue_events(&self) -> &[QueueEvent] {
        &self.queue_events
    }

    /// Queue length at every integer tick in `0..floor(now)`.
    ///
    /// Observations are floored to the tick containing them. A tick with
    /// observations takes the largest length seen in it; a tick without any
    /// holds the previous tick's value. The series starts from 0.
    pub fn queue_size_over_time(&self, clock: &impl Clock) -> Vec<usize> {
        let mut peaks: BTreeMap<u64, usize> = BTreeMap::new();
        for event in &self.queue_events {
            let peak = peaks.entry(event.time.tick()).or_insert(0);
            *peak = (*peak).max(event.queue_len);
        }

        let mut current = 0;
        (0..clock.now().tick())
            .map(|tick| {
                if let Some(&peak) = peaks.get(&tick) {
                    current = peak;
                }
                current
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Resource whose queue length is set directly by the test.
    #[derive(Debug, Default)]
    pub(crate) struct StubResource {
        pub(crate) waiting: usize,
        pub(crate) next_id: u64,
        pub(crate) capacity_used: bool,
    }

    impl Resource for StubResource {
        fn request(&mut self, _priority: Priority) -> RequestHandle {
            self.next_id += 1;
            if self.capacity_used {
                self.waiting += 1;
            } else {
                self.capacity_used = true;
            }
            RequestHandle(self.next_id)
        }

        fn is_granted(&self, _handle: RequestHandle) -> bool {
            true
        }

        fn release(&mut self, _handle: RequestHandle) -> Option<RequestHandle> {
            if self.waiting > 0 {
                self.waiting -= 1;
            } else {
                self.capacity_used = false;
            }
            None
        }

        fn queue_len(&self) -> usize {
            self.waiting
        }

        fn next_service_time(&mut self) -> SimTime {
            SimTime::from_secs(1.0)
        }
    }

    fn at(secs: f64) -> SimTime {
        SimTime::from_secs(secs)
    }

    fn observe(ledger: &mut ResourceLedger<StubResource>, time: f64, len: usize, kind: QueueEventKind) {
        ledger.resource_mut().waiting = len;
        match kind {
            QueueEventKind::Request => ledger.record_request(&at(time)),
            QueueEventKind::Start => ledger.record_service_start(&at(time)),
        }
    }

    #[test]
    fn test_series_length_is_floor_of_now() {
        let ledger = ResourceLedger::new("Counter", StubResource::default());
        assert_eq!(ledger.queue_size_over_time(&at(10.7)).len(), 10);
        assert_eq!(ledger.queue_size_over_time(&at(0.5)).len(), 0);
        assert!(ledger.queue_size_over_time(&at(4.0)).iter().all(|&len| len == 0));
    }

    #[test]
    fn test_same_tick_takes_maximum() {
        let mut ledger = ResourceLedger::new("Counter", StubResource::default());
        observe(&mut ledger, 5.0, 2, QueueEventKind::Request);
        observe(&mut ledger, 5.0, 3, QueueEventKind::Start);
        assert_eq!(ledger.queue_size_over_time(&at(7.0))[5], 3);

        let mut reversed = ResourceLedger::new("Counter", StubResource::default());
        observe(&mut reversed, 5.0, 3, QueueEventKind::Start);
        observe(&mut reversed, 5.0, 2, QueueEventKind::Request);
        assert_eq!(reversed.queue_size_over_time(&at(7.0))[5], 3);
    }

    #[test]
    fn test_value_holds_between_observations() {
        let mut ledger = ResourceLedger::new("Counter", StubResource::default());
        observe(&mut ledger, 2.0, 1, QueueEventKind::Request);
        observe(&mut ledger, 4.0, 3, QueueEventKind::Request);
        observe(&mut ledger, 7.0, 0, QueueEventKind::Start);
        assert_eq!(
            ledger.queue_size_over_time(&at(9.0)),
            vec![0, 0, 1, 1, 3, 3, 3, 0, 0]
        );
    }

    #[test]
    fn test_fractional_timestamps_are_floored() {
        let mut ledger = ResourceLedger::new("Counter", StubResource::default());
        observe(&mut ledger, 3.6, 4, QueueEventKind::Request);
        observe(&mut ledger, 3.2, 1, QueueEventKind::Start);
        assert_eq!(ledger.queue_size_over_time(&at(5.0)), vec![0, 0, 0, 4, 4]);
    }

    #[test]
    fn test_observations_at_or_after_now_are_not_reported() {
        let mut ledger = ResourceLedger::new("Counter", StubResource::default());
        observe(&mut ledger, 1.0, 2, QueueEventKind::Request);
        observe(&mut ledger, 3.0, 5, QueueEventKind::Request);
        assert_eq!(ledger.queue_size_over_time(&at(3.0)), vec![0, 2, 2]);
    }

    #[test]
    fn test_request_observes_queue_after_enqueue() {
        let mut ledger = ResourceLedger::new("Counter", StubResource::default());
        ledger.request(&at(0.0), 0);
        ledger.request(&at(1.0), 0);
        ledger.request(&at(1.0), 0);

        let lens: Vec<usize> = ledger.queue_events().iter().map(|e| e.queue_len).collect();
        assert_eq!(lens, vec![0, 1, 2]);
        assert!(ledger
            .queue_events()
            .iter()
            .all(|e| e.kind == QueueEventKind::Request));
    }
}
