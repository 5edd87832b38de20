//! Ownership of prefetch resources per subgraph instantiation.
//!
//! Whoever manages subgraph lifecycles holds a [`ResourceRegistry`]. The
//! execution node and its prefetcher both look up the same
//! [`PrefetchSharedResource`] through it; removing the entry shuts the
//! resource down so neither side stays blocked.

use crate::pipeline::shared::{PrefetchSharedResource, ResourceKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Container the prefetch resources are grouped under
pub const CONTAINER_NAME: &str = "TENSOR_PREFETCH_DATA_CONTAINER";

/// Name prefix of a prefetch resource
pub const RESOURCE_NAME: &str = "TENSOR_PREFETCH_DATA";

/// Maps instantiation identities to their shared prefetch resource.
pub struct ResourceRegistry<T> {
    resources: Mutex<HashMap<ResourceKey, Arc<PrefetchSharedResource<T>>>>,
}

impl<T> Default for ResourceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResourceRegistry<T> {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Return the resource for `key`, creating it on first use.
    pub fn create_or_fetch(&self, key: ResourceKey) -> Arc<PrefetchSharedResource<T>> {
        let mut resources = self.lock();
        if let Some(existing) = resources.get(&key) {
            return Arc::clone(existing);
        }
        tracing::info!(container = CONTAINER_NAME, resource = %key, "Creating prefetch resource");
        let resource = Arc::new(PrefetchSharedResource::new(key.clone()));
        resources.insert(key, Arc::clone(&resource));
        resource
    }

    pub fn get(&self, key: &ResourceKey) -> Option<Arc<PrefetchSharedResource<T>>> {
        self.lock().get(key).cloned()
    }

    /// Remove the resource for `key` and shut it down.
    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<PrefetchSharedResource<T>>> {
        let removed = self.lock().remove(key);
        if let Some(resource) = &removed {
            resource.shutdown();
        }
        removed
    }

    /// Remove and shut down every resource.
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, r)| r).collect();
        for resource in drained {
            resource.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Fully qualified resource name for `key`
    pub fn resource_name(key: &ResourceKey) -> String {
        format!("{}_{}", RESOURCE_NAME, key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceKey, Arc<PrefetchSharedResource<T>>>> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Drop for ResourceRegistry<T> {
    fn drop(&mut self) {
        self.clear();
    }
}
