//! Entity kinds and sources built from a model file.

use queuestat_common::{Attributes, Priority, Process, SimTime, Source};
use queuestat_model::{ModelError, Sampler, SourceConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// An entity that walks a fixed route of resources.
#[derive(Debug, Clone)]
pub struct ModelEntity {
    class_name: String,
    route: Vec<String>,
    priority: Option<Priority>,
}

impl Process for ModelEntity {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn default_priority(&self) -> Option<Priority> {
        self.priority
    }

    fn process(&self) -> Vec<String> {
        self.route.clone()
    }
}

/// A source whose interarrival delays come from a model distribution.
#[derive(Debug)]
pub struct ModelSource {
    template: ModelEntity,
    attributes: Attributes,
    interarrival_time: Sampler,
    rng: Option<ChaCha8Rng>,
}

impl ModelSource {
    /// Build a source from its model definition.
    ///
    /// `stream` selects an independent random stream under `seed`.
    pub fn new(config: &SourceConfig, seed: u64, stream: u64) -> Result<Self, ModelError> {
        let interarrival_time =
            config
                .interarrival_time
                .sampler()
                .map_err(|reason| ModelError::InvalidDistribution {
                    owner: format!("source '{}' interarrival_time", config.name),
                    reason,
                })?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);

        Ok(Self {
            template: ModelEntity {
                class_name: config.class_name().to_string(),
                route: config.route.clone(),
                priority: config.priority,
            },
            attributes: config.attributes.clone(),
            interarrival_time,
            rng: Some(rng),
        })
    }
}

impl Source for ModelSource {
    type Kind = ModelEntity;

    /// The random stream moves into the returned sequence; a second call
    /// yields an empty sequence.
    fn interarrival_time_generator(&mut self) -> Box<dyn Iterator<Item = SimTime>> {
        let Some(mut rng) = self.rng.take() else {
            return Box::new(std::iter::empty());
        };
        let sampler = self.interarrival_time.clone();
        Box::new(std::iter::repeat_with(move || sampler.sample(&mut rng)))
    }

    fn build_entity(&mut self) -> (ModelEntity, Attributes) {
        (self.template.clone(), self.attributes.clone())
    }
}
