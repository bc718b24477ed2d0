//! # queuestat-ledger
//!
//! Timestamp bookkeeping for source → queue → resource → disposal models.
//!
//! - [`ResourceLedger`] wraps a resource and logs queue-length observations,
//!   reconstructing a per-tick queue length series on demand.
//! - [`Entity`] records arrival, service start and service finish per visited
//!   resource and derives total, waiting and processing time after disposal.
//! - [`SourceAggregator`] creates entities from a source's interarrival
//!   schedule and collects the statistics of the disposed ones.
//!
//! None of these types schedule anything. The engine calls them right before
//! or after its own suspension points, from a single task.

pub mod entity;
pub mod resource;
pub mod source;

pub use entity::{Entity, EntityStatistics, VisitRecord};
pub use resource::{QueueEvent, QueueEventKind, ResourceLedger};
pub use source::{Arrival, SourceAggregator};
