//! Time distributions for interarrival and service times.

use queuestat_common::SimTime;
use rand::Rng;
use rand_distr::{Distribution as _, Exp, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// A distribution of non-negative durations, as written in a model file.
///
/// ```yaml
/// service_time: { distribution: exponential, mean: 3.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum Distribution {
    /// Always the same value.
    Constant {
        /// The value.
        value: f64,
    },
    /// Exponential with the given mean.
    Exponential {
        /// Mean duration.
        mean: f64,
    },
    /// Uniform over `[low, high)`.
    Uniform {
        /// Lower bound.
        low: f64,
        /// Upper bound (exclusive).
        high: f64,
    },
    /// Gaussian; negative draws are clamped to zero.
    Normal {
        /// Mean duration.
        mean: f64,
        /// Standard deviation.
        std_dev: f64,
    },
}

impl Distribution {
    /// Build a sampler, checking the parameters.
    pub fn sampler(&self) -> Result<Sampler, String> {
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(format!("{} must be finite, got {}", name, v))
            }
        };

        match *self {
            Distribution::Constant { value } => {
                if finite("value", value)? < 0.0 {
                    return Err(format!("value must be non-negative, got {}", value));
                }
                Ok(Sampler::Constant(value))
            }
            Distribution::Exponential { mean } => {
                if finite("mean", mean)? <= 0.0 {
                    return Err(format!("mean must be positive, got {}", mean));
                }
                Exp::new(1.0 / mean)
                    .map(Sampler::Exponential)
                    .map_err(|e| e.to_string())
            }
            Distribution::Uniform { low, high } => {
                if finite("low", low)? < 0.0 || finite("high", high)? <= low {
                    return Err(format!(
                        "uniform bounds must satisfy 0 <= low < high, got [{}, {})",
                        low, high
                    ));
                }
                Ok(Sampler::Uniform(Uniform::new(low, high)))
            }
            Distribution::Normal { mean, std_dev } => {
                if finite("std_dev", std_dev)? < 0.0 {
                    return Err(format!("std_dev must be non-negative, got {}", std_dev));
                }
                Normal::new(finite("mean", mean)?, std_dev)
                    .map(Sampler::Normal)
                    .map_err(|e| e.to_string())
            }
        }
    }

    /// Whether every draw is zero.
    pub fn is_always_zero(&self) -> bool {
        match *self {
            Distribution::Constant { value } => value == 0.0,
            Distribution::Normal { mean, std_dev } => std_dev == 0.0 && mean <= 0.0,
            Distribution::Exponential { .. } | Distribution::Uniform { .. } => false,
        }
    }
}

/// A validated, ready-to-sample [`Distribution`].
#[derive(Debug, Clone)]
pub enum Sampler {
    /// Fixed value.
    Constant(f64),
    /// Exponential.
    Exponential(Exp<f64>),
    /// Uniform.
    Uniform(Uniform<f64>),
    /// Normal, clamped at zero.
    Normal(Normal<f64>),
}

impl Sampler {
    /// Draw one duration.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        let secs = match self {
            Sampler::Constant(value) => *value,
            Sampler::Exponential(exp) => exp.sample(rng),
            Sampler::Uniform(uniform) => uniform.sample(rng),
            Sampler::Normal(normal) => normal.sample(rng).max(0.0),
        };
        SimTime::from_secs(secs)
    }
}
