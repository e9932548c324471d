//! One hub per tenant key, created on first use and kept for the life of
//! the process.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::info;

use super::{FanoutPool, Hub, HubOptions};
use crate::metrics::Metrics;

pub struct TenantHubMap {
    hubs: Mutex<AHashMap<String, Arc<Hub>>>,
    options: HubOptions,
    fanout: FanoutPool,
    metrics: Option<Arc<Metrics>>,
}

impl TenantHubMap {
    pub fn new(options: HubOptions, fanout: FanoutPool, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            hubs: Mutex::new(AHashMap::new()),
            options,
            fanout,
            metrics,
        }
    }

    pub fn get_or_create_hub(&self, tenant: &str) -> Arc<Hub> {
        let mut hubs = self.hubs.lock();
        if let Some(hub) = hubs.get(tenant) {
            return hub.clone();
        }

        info!("Creating hub for tenant {:?}", tenant);
        let hub = Arc::new(Hub::with_shared(
            self.options.clone(),
            self.fanout.clone(),
            self.metrics.clone(),
        ));
        hubs.insert(tenant.to_string(), hub.clone());
        hub
    }

    pub fn len(&self) -> usize {
        self.hubs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.lock().is_empty()
    }
}
