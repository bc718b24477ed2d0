//! Entity generation and sample collection.
//!
//! A [`SourceAggregator`] drives a model's [`Source`]: it stamps and names each
//! new entity, keeps every entity it has produced, and maps the entity-level
//! statistics over the disposed ones for reporting.

use crate::entity::Entity;
use queuestat_common::{Clock, EntityId, Process, SimTime, Source, StatsError};
use tracing::debug;

/// An entity produced by [`SourceAggregator::next_entity`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    /// Delay after the current time at which the entity enters the system.
    pub delay: SimTime,
    /// The new entity.
    pub id: EntityId,
}

/// Collects the entities created by a source.
///
/// Generation is single-pass: the interarrival sequence is taken from the
/// source once, at construction, and is not restarted.
pub struct SourceAggregator<S: Source> {
    source: S,
    interarrival_times: Option<Box<dyn Iterator<Item = SimTime>>>,
    number: Option<usize>,
    entities: Vec<Entity<S::Kind>>,
    count: u64,
}

impl<S: Source> SourceAggregator<S> {
    /// Wrap a source.
    ///
    /// `first_creation`, if given, is emitted as the first delay, ahead of the
    /// source's own schedule. `number` bounds how many entities are created;
    /// `None` is unbounded.
    pub fn new(mut source: S, first_creation: Option<SimTime>, number: Option<usize>) -> Self {
        let template = source.interarrival_time_generator();
        let interarrival_times: Box<dyn Iterator<Item = SimTime>> = match first_creation {
            Some(first) => Box::new(std::iter::once(first).chain(template)),
            None => template,
        };
        Self {
            source,
            interarrival_times: Some(interarrival_times),
            number,
            entities: Vec::new(),
            count: 0,
        }
    }

    /// Produce the next entity.
    ///
    /// The entity is named `"{class_name} {count}"` and its creation time is
    /// stamped as `now + delay`. Returns `None` once the interarrival sequence
    /// ends or `number` entities exist; after that it keeps returning `None`.
    pub fn next_entity(&mut self, clock: &impl Clock) -> Result<Option<Arrival>, StatsError> {
        if self.number.is_some_and(|n| self.entities.len() >= n) {
            self.interarrival_times = None;
        }
        let Some(delay) = self.interarrival_times.as_mut().and_then(|times| times.next()) else {
            self.interarrival_times = None;
            return Ok(None);
        };

        self.count += 1;
        let (kind, attributes) = self.source.build_entity();
        let name = format!("{} {}", kind.class_name(), self.count);
        let creation_time = clock.now() + delay;
        let entity = Entity::new(name, kind, attributes, creation_time)?;
        debug!("Source: created {} for {}", entity.name(), creation_time);

        let id = EntityId(self.entities.len());
        self.entities.push(entity);
        Ok(Some(Arrival { delay, id }))
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of entities created so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Every entity created so far, in creation order.
    pub fn entities(&self) -> &[Entity<S::Kind>] {
        &self.entities
    }

    /// Look up an entity.
    pub fn entity(&self, id: EntityId) -> Result<&Entity<S::Kind>, StatsError> {
        self.entities.get(id.0).ok_or(StatsError::UnknownEntity(id))
    }

    /// Look up an entity for mutation.
    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity<S::Kind>, StatsError> {
        self.entities.get_mut(id.0).ok_or(StatsError::UnknownEntity(id))
    }

    /// Entities that have been disposed, in creation order.
    pub fn disposed_entities(&self) -> impl Iterator<Item = &Entity<S::Kind>> {
        self.entities.iter().filter(|e| e.is_disposed())
    }

    /// Total time in system of every disposed entity.
    pub fn total_times(&self) -> Result<Vec<f64>, StatsError> {
        self.collect_disposed(Entity::total_time)
    }

    /// Total waiting time of every disposed entity.
    pub fn waiting_times(&self) -> Result<Vec<f64>, StatsError> {
        self.collect_disposed(Entity::total_waiting_time)
    }

    /// Total processing time of every disposed entity.
    pub fn processing_times(&self) -> Result<Vec<f64>, StatsError> {
        self.collect_disposed(Entity::total_processing_time)
    }

    fn collect_disposed<F>(&self, accessor: F) -> Result<Vec<f64>, StatsError>
    where
        F: Fn(&Entity<S::Kind>) -> Result<SimTime, StatsError>,
    {
        self.disposed_entities()
            .map(|e| accessor(e).map(|t| t.as_secs_f64()))
            .collect()
    }
}
