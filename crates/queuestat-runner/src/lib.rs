//! # queuestat-runner library
//!
//! Reference event loop for queuestat models.
//!
//! The ledgers in `queuestat-ledger` only observe a simulation. This crate
//! provides a small discrete-event engine that drives them from a YAML model:
//! sources create entities, entities walk their route through priority
//! resources, and at the end of the run the ledgers are turned into a
//! [`SimulationReport`].
//!
//! Events at the same time are processed in the order they were scheduled,
//! and every random draw comes from a seeded stream, so a model and seed
//! always produce the same report.

pub mod report;
pub mod resource;
pub mod source;

pub use report::{
    export_csv, export_json, DistributionSummary, ResourceReport, SampleSet, SimulationReport,
    SimulationStats, SourceReport,
};
pub use resource::ModelResource;
pub use source::{ModelEntity, ModelSource};

use queuestat_common::{Clock, EntityId, Process, RequestHandle, Resource, SimTime, StatsError};
use queuestat_ledger::{QueueEventKind, ResourceLedger, SourceAggregator};
use queuestat_model::{Model, ModelError};
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, trace};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during simulation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Model error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Bookkeeping error.
    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// `run` was called on an event loop that has already run.
    #[error("Event loop has already run until {0}s")]
    AlreadyRun(SimTime),
}

// ============================================================================
// Events
// ============================================================================

/// Random stream offset for sources, keeping them apart from resource streams.
const SOURCE_STREAM_BASE: u64 = 1 << 32;

/// An entity at a given position along its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Visit {
    source: usize,
    entity: EntityId,
    stage: usize,
}

#[derive(Debug, Clone, Copy)]
enum EventPayload {
    /// Ask a source for its next entity.
    SourceTick { source: usize },
    /// Move an entity to the resource at `visit.stage`, or dispose it past the end of its route.
    Step(Visit),
    /// A granted request begins service.
    ServiceStart {
        visit: Visit,
        resource: usize,
        handle: RequestHandle,
    },
    /// Service is complete and the resource is released.
    ServiceEnd {
        visit: Visit,
        resource: usize,
        handle: RequestHandle,
    },
}

#[derive(Debug, Clone, Copy)]
struct Event {
    id: u64,
    time: SimTime,
    payload: EventPayload,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap (earliest time first, then FIFO)
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Discrete-event engine driving the ledgers of one model.
pub struct EventLoop {
    now: SimTime,
    event_queue: BinaryHeap<Event>,
    next_event_id: u64,
    resources: Vec<ResourceLedger<ModelResource>>,
    resource_index: HashMap<String, usize>,
    sources: Vec<SourceAggregator<ModelSource>>,
    source_names: Vec<String>,
    /// Queued requests, keyed by resource index and handle.
    waiting: HashMap<(usize, RequestHandle), Visit>,
    seed: u64,
    stats: SimulationStats,
    finished: bool,
}

impl Clock for EventLoop {
    fn now(&self) -> SimTime {
        self.now
    }
}

impl EventLoop {
    /// Validate a model and build its resources and sources.
    pub fn new(model: &Model) -> Result<Self, RunnerError> {
        model.validate()?;
        let seed = model.simulation.seed;

        let mut resources = Vec::with_capacity(model.resources.len());
        let mut resource_index = HashMap::new();
        for (idx, config) in model.resources.iter().enumerate() {
            let resource = ModelResource::new(config, seed, idx as u64)?;
            resource_index.insert(config.name.clone(), idx);
            resources.push(ResourceLedger::new(config.name.clone(), resource));
        }

        let mut sources = Vec::with_capacity(model.sources.len());
        let mut source_names = Vec::with_capacity(model.sources.len());
        for (idx, config) in model.sources.iter().enumerate() {
            let source = ModelSource::new(config, seed, SOURCE_STREAM_BASE + idx as u64)?;
            sources.push(SourceAggregator::new(
                source,
                config.first_creation.map(SimTime::from_secs),
                config.number,
            ));
            source_names.push(config.name.clone());
        }

        Ok(Self {
            now: SimTime::ZERO,
            event_queue: BinaryHeap::new(),
            next_event_id: 0,
            resources,
            resource_index,
            sources,
            source_names,
            waiting: HashMap::new(),
            seed,
            stats: SimulationStats::default(),
            finished: false,
        })
    }

    /// Current simulation time.
    pub fn current_time(&self) -> SimTime {
        self.now
    }

    /// Event loop counters.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Resource ledgers, in model order.
    pub fn resources(&self) -> &[ResourceLedger<ModelResource>] {
        &self.resources
    }

    /// Source aggregators, in model order.
    pub fn sources(&self) -> &[SourceAggregator<ModelSource>] {
        &self.sources
    }

    fn schedule(&mut self, time: SimTime, payload: EventPayload) {
        let event = Event {
            id: self.next_event_id,
            time,
            payload,
        };
        self.next_event_id += 1;
        self.event_queue.push(event);
    }

    /// Run the simulation until `duration`.
    ///
    /// Events scheduled at or after `duration` are not processed. The clock
    /// ends at `duration`. An event loop runs once; a second call fails with
    /// [`RunnerError::AlreadyRun`].
    pub fn run(&mut self, duration: SimTime) -> Result<&SimulationStats, RunnerError> {
        if self.finished {
            return Err(RunnerError::AlreadyRun(self.now));
        }
        self.finished = true;
        let start_time = Instant::now();
        info!(
            "Running {} sources through {} resources for {}s",
            self.sources.len(),
            self.resources.len(),
            duration
        );

        for source in 0..self.sources.len() {
            self.schedule(self.now, EventPayload::SourceTick { source });
        }

        while let Some(event) = self.event_queue.peek() {
            if event.time.total_cmp(&duration).is_ge() {
                break;
            }
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.now = event.time;
            trace!("t={} processing {:?}", self.now, event.payload);
            self.handle_event(event.payload)?;
            self.stats.total_events += 1;
        }

        self.now = duration;
        self.stats.simulation_time_s = duration.as_secs_f64();
        self.stats.wall_time_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Finished: {} events, {} entities created, {} disposed",
            self.stats.total_events, self.stats.entities_created, self.stats.entities_disposed
        );
        Ok(&self.stats)
    }

    fn handle_event(&mut self, payload: EventPayload) -> Result<(), RunnerError> {
        match payload {
            EventPayload::SourceTick { source } => {
                let Some(arrival) = self.sources[source].next_entity(&self.now)? else {
                    debug!("Source[{}]: exhausted at {}", self.source_names[source], self.now);
                    return Ok(());
                };
                self.stats.entities_created += 1;
                let at = self.now + arrival.delay;
                let visit = Visit {
                    source,
                    entity: arrival.id,
                    stage: 0,
                };
                self.schedule(at, EventPayload::Step(visit));
                self.schedule(at, EventPayload::SourceTick { source });
            }

            EventPayload::Step(visit) => {
                let entity = self.sources[visit.source].entity_mut(visit.entity)?;
                let Some(resource_name) = entity.kind().process().into_iter().nth(visit.stage)
                else {
                    entity.dispose(&self.now)?;
                    self.stats.entities_disposed += 1;
                    return Ok(());
                };
                let resource = *self.resource_index.get(&resource_name).ok_or_else(|| {
                    RunnerError::ConfigError(format!("unknown resource '{}'", resource_name))
                })?;

                let ledger = &mut self.resources[resource];
                let handle = entity.request_resource(ledger, &self.now)?;
                if ledger.resource().is_granted(handle) {
                    self.schedule(
                        self.now,
                        EventPayload::ServiceStart {
                            visit,
                            resource,
                            handle,
                        },
                    );
                } else {
                    self.waiting.insert((resource, handle), visit);
                }
            }

            EventPayload::ServiceStart {
                visit,
                resource,
                handle,
            } => {
                let entity = self.sources[visit.source].entity_mut(visit.entity)?;
                let ledger = &mut self.resources[resource];
                entity.start_service(ledger, &self.now)?;
                let service_time = ledger.resource_mut().next_service_time();
                self.schedule(
                    self.now + service_time,
                    EventPayload::ServiceEnd {
                        visit,
                        resource,
                        handle,
                    },
                );
            }

            EventPayload::ServiceEnd {
                visit,
                resource,
                handle,
            } => {
                let entity = self.sources[visit.source].entity_mut(visit.entity)?;
                let granted = entity.release_resource(&mut self.resources[resource], handle, &self.now)?;
                if let Some(next) = granted {
                    if let Some(waiter) = self.waiting.remove(&(resource, next)) {
                        self.schedule(
                            self.now,
                            EventPayload::ServiceStart {
                                visit: waiter,
                                resource,
                                handle: next,
                            },
                        );
                    }
                }
                self.schedule(
                    self.now,
                    EventPayload::Step(Visit {
                        stage: visit.stage + 1,
                        ..visit
                    }),
                );
            }
        }
        Ok(())
    }

    /// Collect the ledgers into a report.
    pub fn report(&self) -> Result<SimulationReport, RunnerError> {
        let sources = self
            .sources
            .iter()
            .zip(&self.source_names)
            .map(|(aggregator, name)| {
                Ok(SourceReport {
                    name: name.clone(),
                    entities_created: aggregator.count(),
                    entities_disposed: aggregator.disposed_entities().count(),
                    total_times: SampleSet::new(aggregator.total_times()?),
                    waiting_times: SampleSet::new(aggregator.waiting_times()?),
                    processing_times: SampleSet::new(aggregator.processing_times()?),
                })
            })
            .collect::<Result<Vec<_>, StatsError>>()?;

        let resources = self
            .resources
            .iter()
            .map(|ledger| {
                let events = ledger.queue_events();
                ResourceReport {
                    name: ledger.name().to_string(),
                    capacity: ledger.resource().capacity(),
                    requests: events
                        .iter()
                        .filter(|e| e.kind == QueueEventKind::Request)
                        .count(),
                    max_queue_len: events.iter().map(|e| e.queue_len).max().unwrap_or(0),
                    queue_size_over_time: ledger.queue_size_over_time(self),
                }
            })
            .collect();

        Ok(SimulationReport {
            seed: self.seed,
            duration_s: self.now.as_secs_f64(),
            stats: self.stats.clone(),
            sources,
            resources,
        })
    }
}

/// Build, run and report on a model.
pub fn run_model(model: &Model) -> Result<SimulationReport, RunnerError> {
    let mut event_loop = EventLoop::new(model)?;
    event_loop.run(model.simulation.duration())?;
    event_loop.report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuestat_model::{load_model_from_str, Distribution};

    const SINGLE_COUNTER: &str = r#"
simulation: { duration_s: 20.0, seed: 1 }
resources:
  - name: Counter
    service_time: { distribution: constant, value: 3.0 }
sources:
  - name: Walk-ins
    class_name: Customer
    interarrival_time: { distribution: constant, value: 2.0 }
    first_creation: 0.0
    number: 3
    route: [Counter]
"#;

    #[test]
    fn test_single_counter_timeline() {
        let model = load_model_from_str(SINGLE_COUNTER).unwrap();
        let mut event_loop = EventLoop::new(&model).unwrap();
        event_loop.run(model.simulation.duration()).unwrap();

        let walk_ins = &event_loop.sources()[0];
        let names: Vec<&str> = walk_ins.entities().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["Customer 1", "Customer 2", "Customer 3"]);
        assert_eq!(walk_ins.waiting_times().unwrap(), vec![0.0, 1.0, 2.0]);
        assert_eq!(walk_ins.processing_times().unwrap(), vec![3.0, 3.0, 3.0]);
        assert_eq!(walk_ins.total_times().unwrap(), vec![3.0, 4.0, 5.0]);

        let counter = &event_loop.resources()[0];
        let mut expected = vec![0; 20];
        expected[2] = 1;
        expected[4] = 1;
        expected[5] = 1;
        assert_eq!(counter.queue_size_over_time(&event_loop), expected);
        assert_eq!(event_loop.current_time(), SimTime::from_secs(20.0));
    }

    #[test]
    fn test_second_run_is_rejected() {
        let model = load_model_from_str(SINGLE_COUNTER).unwrap();
        let mut event_loop = EventLoop::new(&model).unwrap();
        event_loop.run(SimTime::from_secs(5.0)).unwrap();
        let created = event_loop.stats().entities_created;

        assert!(matches!(
            event_loop.run(SimTime::from_secs(20.0)),
            Err(RunnerError::AlreadyRun(t)) if t == SimTime::from_secs(5.0)
        ));
        assert_eq!(event_loop.stats().entities_created, created);
        assert_eq!(event_loop.sources()[0].count(), created);
    }

    #[test]
    fn test_invalid_model_is_not_built() {
        let mut model = load_model_from_str(SINGLE_COUNTER).unwrap();
        model.sources[0].interarrival_time = Distribution::Constant { value: 0.0 };
        model.sources[0].number = None;
        assert!(matches!(
            EventLoop::new(&model),
            Err(RunnerError::Model(ModelError::InvalidConfig(_)))
        ));

        model.sources[0].route = vec!["Kitchen".to_string()];
        model.sources[0].number = Some(1);
        assert!(matches!(
            run_model(&model),
            Err(RunnerError::Model(ModelError::UnknownResource { .. }))
        ));
    }

    #[test]
    fn test_priority_overtakes_queue() {
        let model = load_model_from_str(
            r#"
simulation: { duration_s: 50.0 }
resources:
  - name: Desk
    service_time: { distribution: constant, value: 10.0 }
sources:
  - name: Regular
    interarrival_time: { distribution: constant, value: 1.0 }
    first_creation: 0.0
    number: 3
    priority: 5
    route: [Desk]
  - name: Urgent
    interarrival_time: { distribution: constant, value: 100.0 }
    first_creation: 2.5
    number: 1
    priority: 0
    route: [Desk]
"#,
        )
        .unwrap();
        let report = run_model(&model).unwrap();

        assert_eq!(report.sources[1].waiting_times.samples, vec![7.5]);
        assert_eq!(report.sources[0].waiting_times.samples, vec![0.0, 19.0, 28.0]);
        assert_eq!(report.stats.entities_disposed, 4);
    }

    #[test]
    fn test_unfinished_entities_are_excluded() {
        let yaml = SINGLE_COUNTER.replace("duration_s: 20.0", "duration_s: 7.0");
        let report = run_model(&load_model_from_str(&yaml).unwrap()).unwrap();

        let walk_ins = &report.sources[0];
        assert_eq!(walk_ins.entities_created, 3);
        assert_eq!(walk_ins.entities_disposed, 2);
        assert_eq!(walk_ins.total_times.samples, vec![3.0, 4.0]);
        assert_eq!(report.resources[0].queue_size_over_time.len(), 7);
    }

    #[test]
    fn test_same_seed_same_report() {
        let yaml = r#"
simulation: { duration_s: 200.0, seed: 99 }
resources:
  - name: Counter
    capacity: 2
    service_time: { distribution: exponential, mean: 3.0 }
sources:
  - name: Walk-ins
    interarrival_time: { distribution: exponential, mean: 2.0 }
    route: [Counter]
"#;
        let model = load_model_from_str(yaml).unwrap();
        let first = run_model(&model).unwrap();
        let second = run_model(&model).unwrap();
        assert_eq!(first.sources[0].total_times.samples, second.sources[0].total_times.samples);
        assert_eq!(
            first.resources[0].queue_size_over_time,
            second.resources[0].queue_size_over_time
        );
        assert!(first.sources[0].entities_disposed > 0);
    }

    #[test]
    fn test_total_time_is_waiting_plus_processing_for_direct_routes() {
        let yaml = r#"
simulation: { duration_s: 300.0, seed: 5 }
resources:
  - name: Order
    service_time: { distribution: uniform, low: 0.5, high: 2.0 }
  - name: Pickup
    capacity: 2
    service_time: { distribution: normal, mean: 2.0, std_dev: 0.5 }
sources:
  - name: Diners
    interarrival_time: { distribution: exponential, mean: 1.5 }
    route: [Order, Pickup]
"#;
        let report = run_model(&load_model_from_str(yaml).unwrap()).unwrap();
        let diners = &report.sources[0];
        assert!(diners.entities_disposed > 0);
        for ((total, waiting), processing) in diners
            .total_times
            .samples
            .iter()
            .zip(&diners.waiting_times.samples)
            .zip(&diners.processing_times.samples)
        {
            assert!((total - (waiting + processing)).abs() < 1e-9);
        }
    }
}
