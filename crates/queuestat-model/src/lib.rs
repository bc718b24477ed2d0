//! # queuestat-model
//!
//! YAML model loading for queuestat simulations.
//!
//! A model names the resources of a system, the sources that feed entities
//! into it, the route each source's entities take, and the run settings:
//!
//! ```yaml
//! simulation:
//!   duration_s: 100.0
//!   seed: 42
//! resources:
//!   - name: Counter
//!     capacity: 1
//!     service_time: { distribution: exponential, mean: 3.0 }
//! sources:
//!   - name: Walk-ins
//!     class_name: Customer
//!     interarrival_time: { distribution: exponential, mean: 4.0 }
//!     number: 50
//!     route: [Counter]
//! ```

pub mod distribution;

pub use distribution::{Distribution, Sampler};

use queuestat_common::{Attributes, Priority, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Two resources share a name.
    #[error("Duplicate resource name: {0}")]
    DuplicateResource(String),

    /// Two sources share a name.
    #[error("Duplicate source name: {0}")]
    DuplicateSource(String),

    /// A route names a resource that is not defined.
    #[error("Source '{source_name}' routes through unknown resource '{resource}'")]
    UnknownResource {
        /// Source whose route is invalid.
        source_name: String,
        /// Missing resource name.
        resource: String,
    },

    /// Invalid distribution parameters.
    #[error("Invalid distribution for {owner}: {reason}")]
    InvalidDistribution {
        /// What the distribution belongs to (e.g. `resource 'Counter' service_time`).
        owner: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// Model Types
// ============================================================================

fn default_duration_s() -> f64 {
    100.0
}

fn default_capacity() -> usize {
    1
}

/// Run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// How long to run, in simulated seconds.
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
    /// Seed for all random draws.
    #[serde(default)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            duration_s: default_duration_s(),
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Duration as simulation time.
    pub fn duration(&self) -> SimTime {
        SimTime::from_secs(self.duration_s)
    }
}

/// A server with limited capacity and a priority queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Unique resource name.
    pub name: String,
    /// Number of entities served at once.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Duration of each service.
    pub service_time: Distribution,
}

/// A generator of entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Unique source name.
    pub name: String,
    /// Class name used for entity names. Defaults to the source name.
    #[serde(default)]
    pub class_name: Option<String>,
    /// Delay between successive entities.
    pub interarrival_time: Distribution,
    /// Delay before the first entity, emitted ahead of the interarrival draws.
    #[serde(default)]
    pub first_creation: Option<f64>,
    /// Maximum number of entities to create. Unbounded when absent.
    #[serde(default)]
    pub number: Option<usize>,
    /// Default priority of this source's entities.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Attributes given to every entity.
    #[serde(default)]
    pub attributes: Attributes,
    /// Resources visited, in order.
    #[serde(default)]
    pub route: Vec<String>,
}

impl SourceConfig {
    /// Class name of this source's entities.
    pub fn class_name(&self) -> &str {
        self.class_name.as_deref().unwrap_or(&self.name)
    }
}

/// A loaded and validated simulation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    /// Run settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Resource definitions.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Source definitions.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Model {
    /// Check names, routes, capacities and distribution parameters.
    pub fn validate(&self) -> Result<(), ModelError> {
        let duration = self.simulation.duration_s;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "simulation duration_s must be positive, got {}",
                duration
            )));
        }

        let mut resource_names = HashSet::new();
        for resource in &self.resources {
            if !resource_names.insert(resource.name.as_str()) {
                return Err(ModelError::DuplicateResource(resource.name.clone()));
            }
            if resource.capacity == 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "resource '{}' must have a capacity of at least 1",
                    resource.name
                )));
            }
            resource
                .service_time
                .sampler()
                .map_err(|reason| ModelError::InvalidDistribution {
                    owner: format!("resource '{}' service_time", resource.name),
                    reason,
                })?;
        }

        let mut source_names = HashSet::new();
        for source in &self.sources {
            if !source_names.insert(source.name.as_str()) {
                return Err(ModelError::DuplicateSource(source.name.clone()));
            }
            source
                .interarrival_time
                .sampler()
                .map_err(|reason| ModelError::InvalidDistribution {
                    owner: format!("source '{}' interarrival_time", source.name),
                    reason,
                })?;
            if source.number.is_none() && source.interarrival_time.is_always_zero() {
                return Err(ModelError::InvalidConfig(format!(
                    "source '{}' has a zero interarrival time and no number limit",
                    source.name
                )));
            }
            if let Some(first) = source.first_creation {
                if !first.is_finite() || first < 0.0 {
                    return Err(ModelError::InvalidConfig(format!(
                        "source '{}' first_creation must be non-negative, got {}",
                        source.name, first
                    )));
                }
            }
            if let Some(resource) = source.route.iter().find(|r| !resource_names.contains(r.as_str())) {
                return Err(ModelError::UnknownResource {
                    source_name: source.name.clone(),
                    resource: resource.clone(),
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Model Loading
// ============================================================================

/// Load a simulation model from a file.
pub fn load_model(path: &Path) -> Result<Model, ModelError> {
    let yaml = std::fs::read_to_string(path)?;
    load_model_from_str(&yaml)
}

/// Parse and validate a simulation model from a YAML string.
pub fn load_model_from_str(yaml_str: &str) -> Result<Model, ModelError> {
    let model: Model = serde_yaml::from_str(yaml_str)?;
    model.validate()?;
    Ok(model)
}
