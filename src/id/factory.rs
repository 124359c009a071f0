//! Id generator factory
//!
//! One generator per id type, all sharing the member's acquirer and reuse
//! gate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{FreeIdFilteredIdGenerator, IdGenerator, IdRangeAcquirer, IdType, ReplicatedIdGenerator, ReuseGate};

pub struct ReplicatedIdGeneratorFactory {
    acquirer: Arc<dyn IdRangeAcquirer>,
    gate: Arc<dyn ReuseGate>,
    generators: Mutex<HashMap<IdType, Arc<dyn IdGenerator>>>,
}

impl ReplicatedIdGeneratorFactory {
    pub fn new(acquirer: Arc<dyn IdRangeAcquirer>, gate: Arc<dyn ReuseGate>) -> Self {
        Self {
            acquirer,
            gate,
            generators: Mutex::new(HashMap::new()),
        }
    }

    /// Open the generator for `id_type`, replacing (and closing) any open one
    pub fn open(&self, id_type: IdType, high_id: u64) -> Arc<dyn IdGenerator> {
        let replicated: Arc<dyn IdGenerator> =
            Arc::new(ReplicatedIdGenerator::new(id_type, high_id, Arc::clone(&self.acquirer)));
        let generator: Arc<dyn IdGenerator> =
            Arc::new(FreeIdFilteredIdGenerator::new(replicated, Arc::clone(&self.gate)));

        if let Some(previous) = self.generators.lock().insert(id_type, Arc::clone(&generator)) {
            previous.close();
        }
        tracing::debug!(id_type = ?id_type, high_id, "Opened id generator");
        generator
    }

    pub fn get(&self, id_type: IdType) -> Option<Arc<dyn IdGenerator>> {
        self.generators.lock().get(&id_type).cloned()
    }

    pub fn close_all(&self) {
        for (_, generator) in self.generators.lock().drain() {
            generator.close();
        }
    }
}
