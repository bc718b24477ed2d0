//! # queuestat-common
//!
//! Common types and traits shared by the queuestat crates.
//!
//! This crate provides:
//! - Time representation ([`SimTime`]) and the [`Clock`] the engine exposes
//! - Entity and request identification ([`EntityId`], [`RequestHandle`])
//! - Entity attributes ([`AttributeValue`], [`Attributes`])
//! - Capability traits model authors implement ([`Resource`], [`Process`], [`Source`])
//! - Bookkeeping errors ([`StatsError`])

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by entity and source bookkeeping.
///
/// All of these indicate a programming error in the surrounding model and are
/// returned to the immediate caller without any recovery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// Statistics were queried before the entity was disposed.
    #[error("Entity '{entity}' has not been disposed")]
    NotDisposed {
        /// Entity name.
        entity: String,
    },

    /// The entity was disposed a second time.
    #[error("Entity '{entity}' was already disposed at {disposal_time}")]
    AlreadyDisposed {
        /// Entity name.
        entity: String,
        /// Time of the first disposal.
        disposal_time: SimTime,
    },

    /// A per-resource query or service stamp named a resource the entity never requested.
    #[error("Entity '{entity}' never visited resource '{resource}'")]
    ResourceNotVisited {
        /// Entity name.
        entity: String,
        /// Resource name.
        resource: String,
    },

    /// A resource interaction was attempted after disposal.
    #[error("Entity '{entity}' is disposed and cannot use resource '{resource}'")]
    EntityDisposed {
        /// Entity name.
        entity: String,
        /// Resource name.
        resource: String,
    },

    /// The `priority` attribute is not an integer.
    #[error("Entity '{entity}' has a non-integer priority attribute: {value}")]
    InvalidPriority {
        /// Entity name.
        entity: String,
        /// Offending attribute value.
        value: AttributeValue,
    },

    /// No entity with this ID exists in the source.
    #[error("Entity not found: {0:?}")]
    UnknownEntity(EntityId),
}

// ============================================================================
// Time Types
// ============================================================================

/// Simulation time in seconds since simulation start.
///
/// Timestamps and the durations derived from them share this type. No rounding
/// or clamping is applied; [`SimTime::tick`] is the only place time is made
/// discrete.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    /// Zero time.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create from seconds.
    pub fn from_secs(s: f64) -> Self {
        SimTime(s)
    }

    /// Get as seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    /// The integer tick containing this time (floor). Negative times map to tick 0.
    pub fn tick(&self) -> u64 {
        self.0.floor().max(0.0) as u64
    }

    /// Total ordering, for use in event queues.
    pub fn total_cmp(&self, other: &SimTime) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::ops::Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Self) -> Self::Output {
        SimTime(self.0 + rhs.0)
    }
}

impl std::ops::Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: Self) -> Self::Output {
        SimTime(self.0 - rhs.0)
    }
}

impl std::iter::Sum for SimTime {
    fn sum<I: Iterator<Item = SimTime>>(iter: I) -> Self {
        iter.fold(SimTime::ZERO, |acc, t| acc + t)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of the current virtual time, owned by the scheduling engine.
pub trait Clock {
    /// Current simulation time.
    fn now(&self) -> SimTime;
}

/// A bare timestamp acts as a clock frozen at that instant.
impl Clock for SimTime {
    fn now(&self) -> SimTime {
        *self
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Index of an entity within the source that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub usize);

/// Handle for a pending or granted resource acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestHandle(pub u64);

/// Service priority. Lower values are served first.
pub type Priority = i64;

// ============================================================================
// Attributes
// ============================================================================

/// Attribute key holding an entity's service priority.
pub const PRIORITY_ATTRIBUTE: &str = "priority";

/// An arbitrary value recorded about an entity (type, age, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Free-form text.
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

/// Named attributes of an entity.
pub type Attributes = BTreeMap<String, AttributeValue>;

// ============================================================================
// Capability Traits
// ============================================================================

/// A capacity-limited server with a priority-ordered waiting line.
///
/// The acquisition mechanics belong to the scheduling engine; the ledgers only
/// call through this interface and observe [`Resource::queue_len`].
pub trait Resource {
    /// Request the resource. The handle is either granted immediately or queued.
    fn request(&mut self, priority: Priority) -> RequestHandle;

    /// Whether the request has been granted.
    fn is_granted(&self, handle: RequestHandle) -> bool;

    /// Release a granted request (or withdraw a queued one).
    ///
    /// Returns the waiting request granted as a result, if any.
    fn release(&mut self, handle: RequestHandle) -> Option<RequestHandle>;

    /// Number of requests currently waiting (not yet granted).
    fn queue_len(&self) -> usize;

    /// Duration of the next service performed by this resource.
    fn next_service_time(&mut self) -> SimTime;
}

/// Behavior of a kind of entity.
pub trait Process {
    /// Class name used to derive entity names (`"{class_name} {count}"`).
    fn class_name(&self) -> &str;

    /// Priority used when the entity carries no explicit `priority` attribute.
    fn default_priority(&self) -> Option<Priority> {
        None
    }

    /// Names of the resources the entity visits, in order.
    fn process(&self) -> Vec<String>;
}

/// Producer of entities for a simulation.
pub trait Source {
    /// Kind of entity this source builds.
    type Kind: Process;

    /// Delays between successive creations. Called once per run.
    fn interarrival_time_generator(&mut self) -> Box<dyn Iterator<Item = SimTime>>;

    /// Build the next entity's behavior and initial attributes.
    fn build_entity(&mut self) -> (Self::Kind, Attributes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_time_tick_floors() {
        assert_eq!(SimTime::from_secs(5.0).tick(), 5);
        assert_eq!(SimTime::from_secs(5.99).tick(), 5);
        assert_eq!(SimTime::from_secs(0.2).tick(), 0);
        assert_eq!(SimTime::from_secs(-1.0).tick(), 0);
    }

    #[test]
    fn test_sim_time_arithmetic() {
        let t1 = SimTime::from_secs(5.0);
        let t2 = SimTime::from_secs(2.0);
        assert_eq!((t1 - t2).as_secs_f64(), 3.0);
        assert_eq!((t1 + t2).as_secs_f64(), 7.0);
        let total: SimTime = vec![t1, t2].into_iter().sum();
        assert_eq!(total.as_secs_f64(), 7.0);
    }

    #[test]
    fn test_sim_time_is_a_frozen_clock() {
        let t = SimTime::from_secs(12.5);
        assert_eq!(t.now(), t);
    }

    #[test]
    fn test_attribute_value_untagged() {
        let attrs: Attributes =
            serde_json::from_str(r#"{"vip": true, "age": 42, "weight": 71.5, "kind": "takeout"}"#)
                .unwrap();
        assert_eq!(attrs["vip"], AttributeValue::Bool(true));
        assert_eq!(attrs["age"], AttributeValue::Int(42));
        assert_eq!(attrs["weight"], AttributeValue::Float(71.5));
        assert_eq!(attrs["kind"], AttributeValue::Text("takeout".to_string()));
    }
}
