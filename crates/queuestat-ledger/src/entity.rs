//! Per-entity timestamp bookkeeping.
//!
//! An [`Entity`] stamps arrival, service start and service finish for every
//! resource it visits, plus its own creation and disposal. Once disposed, its
//! total, waiting and processing times can be queried; they are computed on
//! first access and cached.

use crate::resource::ResourceLedger;
use queuestat_common::{
    AttributeValue, Attributes, Clock, Priority, Process, RequestHandle, Resource, SimTime,
    StatsError, PRIORITY_ATTRIBUTE,
};
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Timestamps of one entity's visit to one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VisitRecord {
    /// When the resource was requested.
    pub arrival_time: SimTime,
    /// When service began.
    pub start_service_time: SimTime,
    /// When service finished and the resource was released.
    pub finish_service_time: SimTime,
}

impl VisitRecord {
    fn arrived(time: SimTime) -> Self {
        Self {
            arrival_time: time,
            ..Self::default()
        }
    }

    /// Time spent queued for the resource.
    pub fn waiting_time(&self) -> SimTime {
        self.start_service_time - self.arrival_time
    }

    /// Time spent in service.
    pub fn processing_time(&self) -> SimTime {
        self.finish_service_time - self.start_service_time
    }
}

/// Aggregate durations of a disposed entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntityStatistics {
    /// Disposal time minus creation time.
    pub total_time: SimTime,
    /// Sum of waiting times over all visited resources.
    pub waiting_time: SimTime,
    /// Sum of processing times over all visited resources.
    pub processing_time: SimTime,
}

/// A simulated actor and its resource-visit ledger.
#[derive(Debug)]
pub struct Entity<K> {
    name: String,
    kind: K,
    attributes: Attributes,
    creation_time: SimTime,
    disposal_time: Option<SimTime>,
    /// Visit records in first-visit order.
    visits: Vec<(String, VisitRecord)>,
    /// Resource name -> position in `visits`.
    visit_index: HashMap<String, usize>,
    statistics: OnceCell<EntityStatistics>,
}

impl<K: Process> Entity<K> {
    /// Create an entity.
    ///
    /// The `priority` attribute is resolved from the explicit attribute, then
    /// the kind's default, then 0, and written back into the attributes.
    pub fn new(
        name: impl Into<String>,
        kind: K,
        mut attributes: Attributes,
        creation_time: SimTime,
    ) -> Result<Self, StatsError> {
        let name = name.into();
        let priority = match attributes.get(PRIORITY_ATTRIBUTE) {
            Some(AttributeValue::Int(p)) => *p,
            Some(other) => {
                return Err(StatsError::InvalidPriority {
                    entity: name,
                    value: other.clone(),
                })
            }
            None => kind.default_priority().unwrap_or(0),
        };
        attributes.insert(PRIORITY_ATTRIBUTE.to_string(), AttributeValue::Int(priority));

        Ok(Self {
            name,
            kind,
            attributes,
            creation_time,
            disposal_time: None,
            visits: Vec::new(),
            visit_index: HashMap::new(),
            statistics: OnceCell::new(),
        })
    }
}

impl<K> Entity<K> {
    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity's behavior.
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// All attributes, including `priority`.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Look up a single attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Record an arbitrary attribute. A `priority` attribute must be an integer.
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), StatsError> {
        let name = name.into();
        let value = value.into();
        if name == PRIORITY_ATTRIBUTE && !matches!(value, AttributeValue::Int(_)) {
            return Err(StatsError::InvalidPriority {
                entity: self.name.clone(),
                value,
            });
        }
        self.attributes.insert(name, value);
        Ok(())
    }

    /// Current service priority.
    pub fn priority(&self) -> Priority {
        match self.attributes.get(PRIORITY_ATTRIBUTE) {
            Some(AttributeValue::Int(p)) => *p,
            _ => 0,
        }
    }

    /// When the entity was created.
    pub fn creation_time(&self) -> SimTime {
        self.creation_time
    }

    /// When the entity was disposed, if it has been.
    pub fn disposal_time(&self) -> Option<SimTime> {
        self.disposal_time
    }

    /// Whether the entity has finished.
    pub fn is_disposed(&self) -> bool {
        self.disposal_time.is_some()
    }

    /// Visit records in the order resources were first visited.
    pub fn visits(&self) -> impl Iterator<Item = (&str, &VisitRecord)> {
        self.visits.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// The visit record for a resource, if it was visited.
    pub fn visit(&self, resource_name: &str) -> Option<&VisitRecord> {
        self.visit_index
            .get(resource_name)
            .map(|&idx| &self.visits[idx].1)
    }

    // ------------------------------------------------------------------------
    // Resource interaction
    // ------------------------------------------------------------------------

    /// Request a resource, stamping the arrival time.
    ///
    /// A repeat visit to the same resource replaces the earlier record.
    pub fn request_resource<R: Resource>(
        &mut self,
        resource: &mut ResourceLedger<R>,
        clock: &impl Clock,
    ) -> Result<RequestHandle, StatsError> {
        self.ensure_active(resource.name())?;
        let now = clock.now();
        debug!("Entity[{}]: requesting {} at {}", self.name, resource.name(), now);

        let record = VisitRecord::arrived(now);
        match self.visit_index.get(resource.name()) {
            Some(&idx) => self.visits[idx].1 = record,
            None => {
                self.visit_index
                    .insert(resource.name().to_string(), self.visits.len());
                self.visits.push((resource.name().to_string(), record));
            }
        }

        Ok(resource.request(clock, self.priority()))
    }

    /// Stamp the start of service at a resource.
    pub fn start_service<R: Resource>(
        &mut self,
        resource: &mut ResourceLedger<R>,
        clock: &impl Clock,
    ) -> Result<(), StatsError> {
        self.ensure_active(resource.name())?;
        let now = clock.now();
        debug!("Entity[{}]: started service at {} at {}", self.name, resource.name(), now);
        self.visit_mut(resource.name())?.start_service_time = now;
        resource.record_service_start(clock);
        Ok(())
    }

    /// Stamp the end of service and release the resource.
    ///
    /// Returns the waiting request granted by the release, if any.
    pub fn release_resource<R: Resource>(
        &mut self,
        resource: &mut ResourceLedger<R>,
        handle: RequestHandle,
        clock: &impl Clock,
    ) -> Result<Option<RequestHandle>, StatsError> {
        self.ensure_active(resource.name())?;
        let now = clock.now();
        debug!("Entity[{}]: finished at {} at {}", self.name, resource.name(), now);
        self.visit_mut(resource.name())?.finish_service_time = now;
        Ok(resource.release(handle))
    }

    /// Mark the entity finished. Fails if it was already disposed.
    pub fn dispose(&mut self, clock: &impl Clock) -> Result<SimTime, StatsError> {
        if let Some(disposal_time) = self.disposal_time {
            return Err(StatsError::AlreadyDisposed {
                entity: self.name.clone(),
                disposal_time,
            });
        }
        let now = clock.now();
        debug!("Entity[{}]: disposed at {}", self.name, now);
        self.disposal_time = Some(now);
        Ok(now)
    }

    fn ensure_active(&self, resource_name: &str) -> Result<(), StatsError> {
        if self.is_disposed() {
            return Err(StatsError::EntityDisposed {
                entity: self.name.clone(),
                resource: resource_name.to_string(),
            });
        }
        Ok(())
    }

    fn visit_mut(&mut self, resource_name: &str) -> Result<&mut VisitRecord, StatsError> {
        match self.visit_index.get(resource_name) {
            Some(&idx) => Ok(&mut self.visits[idx].1),
            None => Err(self.not_visited(resource_name)),
        }
    }

    fn not_visited(&self, resource_name: &str) -> StatsError {
        StatsError::ResourceNotVisited {
            entity: self.name.clone(),
            resource: resource_name.to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Aggregate durations, computed once after disposal.
    pub fn statistics(&self) -> Result<&EntityStatistics, StatsError> {
        let disposal_time = self.disposal_time.ok_or_else(|| StatsError::NotDisposed {
            entity: self.name.clone(),
        })?;

        Ok(self.statistics.get_or_init(|| EntityStatistics {
            total_time: disposal_time - self.creation_time,
            waiting_time: self.visits.iter().map(|(_, r)| r.waiting_time()).sum(),
            processing_time: self.visits.iter().map(|(_, r)| r.processing_time()).sum(),
        }))
    }

    /// Time from creation to disposal.
    pub fn total_time(&self) -> Result<SimTime, StatsError> {
        Ok(self.statistics()?.total_time)
    }

    /// Total time spent queued across all visited resources.
    pub fn total_waiting_time(&self) -> Result<SimTime, StatsError> {
        Ok(self.statistics()?.waiting_time)
    }

    /// Total time spent in service across all visited resources.
    pub fn total_processing_time(&self) -> Result<SimTime, StatsError> {
        Ok(self.statistics()?.processing_time)
    }

    /// Time spent queued for one resource.
    pub fn waiting_time_for_resource<R>(
        &self,
        resource: &ResourceLedger<R>,
    ) -> Result<SimTime, StatsError>
    where
        R: Resource,
    {
        self.visit(resource.name())
            .map(VisitRecord::waiting_time)
            .ok_or_else(|| self.not_visited(resource.name()))
    }

    /// Time spent in service at one resource.
    pub fn processing_time_for_resource<R>(
        &self,
        resource: &ResourceLedger<R>,
    ) -> Result<SimTime, StatsError>
    where
        R: Resource,
    {
        self.visit(resource.name())
            .map(VisitRecord::processing_time)
            .ok_or_else(|| self.not_visited(resource.name()))
    }
}

impl<K> fmt::Display for Entity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} created_at: {} attributes: {{", self.name, self.creation_time)?;
        for (i, (key, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}
