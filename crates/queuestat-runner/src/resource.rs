//! Priority resource used by the reference event loop.

use queuestat_common::{Priority, RequestHandle, Resource, SimTime};
use queuestat_model::{ModelError, ResourceConfig, Sampler};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// A capacity-limited server with a priority waiting line.
///
/// Lower priorities are served first; equal priorities are served in request
/// order.
#[derive(Debug)]
pub struct ModelResource {
    capacity: usize,
    in_service: BTreeSet<RequestHandle>,
    waiting: BinaryHeap<Reverse<(Priority, RequestHandle)>>,
    next_request_id: u64,
    service_time: Sampler,
    rng: ChaCha8Rng,
}

impl ModelResource {
    /// Build a resource from its model definition.
    ///
    /// `stream` selects an independent random stream under `seed`.
    pub fn new(config: &ResourceConfig, seed: u64, stream: u64) -> Result<Self, ModelError> {
        let service_time =
            config
                .service_time
                .sampler()
                .map_err(|reason| ModelError::InvalidDistribution {
                    owner: format!("resource '{}' service_time", config.name),
                    reason,
                })?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);

        Ok(Self {
            capacity: config.capacity,
            in_service: BTreeSet::new(),
            waiting: BinaryHeap::new(),
            next_request_id: 0,
            service_time,
            rng,
        })
    }

    /// Number of entities that can be served at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Resource for ModelResource {
    fn request(&mut self, priority: Priority) -> RequestHandle {
        let handle = RequestHandle(self.next_request_id);
        self.next_request_id += 1;
        if self.in_service.len() < self.capacity {
            self.in_service.insert(handle);
        } else {
            self.waiting.push(Reverse((priority, handle)));
        }
        handle
    }

    fn is_granted(&self, handle: RequestHandle) -> bool {
        self.in_service.contains(&handle)
    }

    fn release(&mut self, handle: RequestHandle) -> Option<RequestHandle> {
        if !self.in_service.remove(&handle) {
            self.waiting.retain(|Reverse((_, waiting))| *waiting != handle);
            return None;
        }
        let Reverse((_, next)) = self.waiting.pop()?;
        self.in_service.insert(next);
        Some(next)
    }

    fn queue_len(&self) -> usize {
        self.waiting.len()
    }

    fn next_service_time(&mut self) -> SimTime {
        self.service_time.sample(&mut self.rng)
    }
}
